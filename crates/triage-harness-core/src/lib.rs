//! # Triage Harness Core
//!
//! Runtime-agnostic logic for Triage Harness: the evidence data model,
//! the ranking engine, the service router, the oracle-reply parser and
//! the grounded reasoning controller.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. Retrieval and
//! text completion are reached only through the [`index::EvidenceIndex`]
//! and [`oracle::Oracle`] traits, which the application crate implements.
//!
//! ```text
//!   symptom ──▶ Controller ──▶ Oracle (reasoning step)
//!                   │
//!                   ▼ Action
//!               Router ──▶ EvidenceIndex ──▶ Ranking ──▶ EvidenceBundle
//!                   │
//!                   ▼ Observation folded into the next prompt
//!               Final / forced synthesis / refusal
//! ```

pub mod agent;
pub mod embedding;
pub mod error;
pub mod evidence;
pub mod index;
pub mod models;
pub mod oracle;
pub mod parse;
pub mod rank;
pub mod router;
pub mod text;
