//! # lcm
//!
//! CLI entry point wiring the hook subcommands (`capture`/`inject`/`init`) and the
//! direct-call subcommands (`status`/`grep`/`describe`/`expand`/`llm-map`/
//! `agentic-map`/`serve`) to the core library.
//!
//! ## Usage
//!
//! ```sh
//! # Ingest new transcript lines for the current session
//! CLAUDE_SESSION_ID=abc123 lcm capture
//!
//! # Build the injection block for the live context
//! lcm inject
//!
//! # Search across everything captured so far
//! lcm grep "authentication bug"
//! ```
//!
//! Preferences can be persisted in `~/.config/lcm/config.toml`.

use clap::{Parser, Subcommand};
use eyre::{Result, eyre};
use lcm::config::{Config, ConfigOverrides, load_file_config};
use lcm::llm::http::HttpGateway;
use lcm::store::Store;
use lcm::{compaction, explorer, ingest, injection, retrieval, rpc};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the LCM SQLite database. Defaults to $LCM_DB_PATH or ~/.lcm/lcm.db.
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    /// Directory holding per-session capture cursors. Defaults to ~/.lcm/state.
    #[arg(long, value_name = "PATH", global = true)]
    state_dir: Option<PathBuf>,

    /// Path to a specific configuration file.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest any transcript lines appended since the last capture.
    Capture {
        /// Override transcript path; otherwise read from CLAUDE_TRANSCRIPT_PATH or
        /// the default layout.
        #[arg(long, value_name = "PATH")]
        transcript: Option<PathBuf>,
        /// Also run the compaction controller immediately after capturing.
        #[arg(long)]
        compact: bool,
    },
    /// Print the injection block that recovers condensed context.
    Inject {
        #[arg(long, default_value_t = injection::DEFAULT_MAX_TOKENS)]
        max_tokens: i64,
    },
    /// Report how many messages already exist for the session.
    Init,
    /// Message/summary counts, DAG depth, and total tokens for the session.
    Status,
    /// Search message content.
    Grep {
        pattern: String,
        #[arg(long)]
        summary_id: Option<i64>,
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long)]
        regex: bool,
    },
    /// Describe an `S<id>` / `F<id>` / bare message id.
    Describe { lcm_id: String },
    /// Page through a summary's covered messages and child summaries.
    Expand {
        summary_id: i64,
        #[arg(long, default_value_t = 1)]
        page: i64,
    },
    /// Run an LLM classification pass over a JSONL file.
    LlmMap {
        input_path: PathBuf,
        prompt: String,
        #[arg(long)]
        output_schema: Option<String>,
        #[arg(long, default_value_t = 16)]
        concurrency: usize,
    },
    /// Run an agentic (tool-calling) pass over a JSONL file.
    AgenticMap {
        input_path: PathBuf,
        prompt: String,
        #[arg(long)]
        read_only: bool,
        #[arg(long, default_value_t = 16)]
        concurrency: usize,
        #[arg(long, default_value_t = 16)]
        max_turns: u32,
    },
    /// Analyze a single file via the filetype-aware explorer.
    Explore { path: PathBuf },
    /// Run a stdio JSON-RPC 2.0 listener over stdin/stdout.
    Serve,
}

fn session_id() -> String {
    std::env::var("CLAUDE_SESSION_ID").unwrap_or_else(|_| "default".to_string())
}

fn transcript_path_from_env() -> Option<PathBuf> {
    std::env::var("CLAUDE_TRANSCRIPT_PATH").ok().map(PathBuf::from)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let file_cfg = load_file_config(cli.config.as_deref())?;
    let config = Config::resolve(
        ConfigOverrides { db_path: cli.db, state_dir: cli.state_dir },
        file_cfg,
    )?;

    let store = Store::open(&config.db_path).map_err(|e| eyre!("{e}"))?;
    let gateway = HttpGateway::new(config.llm_base_url.clone(), config.llm_model.clone(), &config.llm_api_key_env);
    let session = session_id();

    match cli.command {
        Command::Capture { transcript, compact } => {
            let path = transcript.or_else(transcript_path_from_env);
            let stats = ingest::capture_new(&store, &config.state_dir, &session, path.as_deref())
                .map_err(|e| eyre!("{e}"))?;
            if stats.captured > 0 {
                eprintln!("{}", serde_json::to_string(&stats)?);
            }
            if compact {
                let thresholds = compaction::Thresholds {
                    tau_soft: config.tau_soft,
                    tau_hard: config.tau_hard,
                    block_min: config.block_min,
                    block_max: config.block_max,
                    condensation_threshold: config.condensation_threshold,
                };
                compaction::check_and_compact(&store, &gateway, &session, &thresholds)
                    .map_err(|e| eyre!("{e}"))?;
            }
            Ok(())
        }
        Command::Inject { max_tokens } => {
            let text = injection::build_injection(&store, &session, max_tokens).map_err(|e| eyre!("{e}"))?;
            println!("{text}");
            Ok(())
        }
        Command::Init => {
            let count = store.count_messages(Some(&session)).map_err(|e| eyre!("{e}"))?;
            eprintln!("{{\"session_id\": \"{session}\", \"message_count\": {count}}}");
            Ok(())
        }
        Command::Status => {
            let status = rpc::status(&store, &session).map_err(|e| eyre!("{e}"))?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Command::Grep { pattern, summary_id, page, regex } => {
            let result = retrieval::grep(&store, &pattern, Some(&session), summary_id, page, regex)
                .map_err(|e| eyre!("{e}"))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Describe { lcm_id } => {
            let result = retrieval::describe(&store, &lcm_id).map_err(|e| eyre!("{e}"))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Expand { summary_id, page } => {
            let result = retrieval::expand(&store, summary_id, page).map_err(|e| eyre!("{e}"))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::LlmMap { input_path, prompt, output_schema, concurrency } => {
            let cancel = AtomicBool::new(false);
            let outcome = lcm::parallel_map::classify_map(
                &gateway,
                &input_path,
                &prompt,
                output_schema.as_deref(),
                concurrency,
                3,
                &cancel,
            )
            .map_err(|e| eyre!("{e}"))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Command::AgenticMap { input_path, prompt, read_only, concurrency, max_turns } => {
            let cancel = AtomicBool::new(false);
            let outcome = lcm::parallel_map::agentic_map(
                &gateway,
                &input_path,
                &prompt,
                read_only,
                concurrency,
                3,
                max_turns,
                &cancel,
            )
            .map_err(|e| eyre!("{e}"))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Command::Explore { path } => {
            let analysis = explorer::analyze_file(&gateway, &path);
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            Ok(())
        }
        Command::Serve => {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            rpc::serve(&store, &gateway, &config, stdin.lock(), stdout.lock())?;
            Ok(())
        }
    }
}
