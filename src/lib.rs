//! # Triage Harness
//!
//! Grounded, evidence-first troubleshooting of infrastructure failure
//! symptoms.
//!
//! The domain logic (ranking, service routing, the reasoning loop) lives
//! in [`triage_harness_core`]. This crate supplies the concrete pieces
//! around it: configuration, a file-backed index, embedding and
//! completion clients, deadlines, logging and the `triage` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ chunks.jsonl│──▶│ VectorIndex │──▶│    Router    │
//! │ (+vectors)  │   │  (Embedder) │   │ rank + route │
//! └─────────────┘   └─────────────┘   └──────┬───────┘
//!                                            │
//!                   ┌─────────────┐   ┌──────▼───────┐
//!                   │   Oracle    │◀──│  Controller  │
//!                   │ Ollama/OAI  │   │ Thought/Act/ │
//!                   └─────────────┘   │ Obs/Final    │
//!                                     └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`embedding`] | Embedding backends (OpenAI, Ollama, local fastembed) |
//! | [`vector_index`] | JSONL chunk file loaded into an in-memory index |
//! | [`oracle`] | Ollama and OpenAI completion clients |
//! | [`timeout`] | Deadlines for oracle and index calls |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`triage`] | The `run` command |
//! | [`search`] | The `search` and `route` commands |
//! | [`sources`] | The `sources` command |

pub mod config;
pub mod embedding;
pub mod logging;
pub mod oracle;
pub mod search;
pub mod sources;
pub mod timeout;
pub mod triage;
pub mod vector_index;
