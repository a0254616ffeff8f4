//! # lcm
//!
//! A lossless, long-horizon context condensation engine: an append-only store of
//! messages, hierarchical summaries, DAG edges, and large-file references, sitting
//! behind a two-threshold compaction controller that escalates summarization
//! effort only as far as each block needs.
//!
//! ## What it does
//!
//! A conversational agent's context window is finite; this crate keeps a durable,
//! queryable record of everything said and done, condenses the oldest parts of it
//! into progressively higher-level summaries as the live transcript grows, and
//! gives callers `grep`/`describe`/`expand` operations to drill back into anything
//! that's been condensed out. Nothing is ever deleted: the original messages stay
//! in the store underneath their summaries.
//!
//! The store is opened **read-write**, unlike a pure export tool's read-only
//! connection, since ingestion and compaction both append to it continuously.
//!
//! ## Architecture
//!
//! - [`store`] — the append-only SQLite-backed store: messages, summaries, DAG
//!   edges, and large-file references (C1)
//! - [`llm`] — the [`llm::LlmGateway`] trait the rest of the crate calls through,
//!   plus the bundled HTTP backend and tool-calling surface (C2)
//! - [`escalation`] — the three-level summarization escalation cascade (C3)
//! - [`compaction`] — the two-threshold compaction controller (C4)
//! - [`ingest`] — transcript capture: cursor-tracked, idempotent re-ingestion (C5)
//! - [`retrieval`] — `grep`/`describe`/`expand` over the store (C6)
//! - [`injection`] — builds the summary block injected back into a live context (C7)
//! - [`parallel_map`] — the bounded-concurrency fan-out executor over LLM calls (C8)
//! - [`explorer`] — filetype-aware file analysis, deterministic or LLM-driven (C9)
//! - [`rpc`] — a thin stdio JSON-RPC façade over the six core operations
//! - [`config`] — configuration layering: CLI flags, config file, built-in defaults
//! - [`error`] — the crate's typed error kinds

pub mod compaction;
pub mod config;
pub mod error;
pub mod escalation;
pub mod explorer;
pub mod ingest;
pub mod injection;
pub mod llm;
pub mod parallel_map;
pub mod retrieval;
pub mod rpc;
pub mod store;
