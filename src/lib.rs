//! Household Ledger Agent
//!
//! Answers natural-language questions about household transactions:
//! - Refines follow-up questions into self-contained ones
//! - Routes each question to the relational store, the graph store, or neither
//! - Gates generated SQL behind a deterministic denylist and a model syntax check
//! - Synthesizes a prose answer with an optional chart payload
//! - Keeps a bounded per-session history
//!
//! STATE MACHINE:
//! REFINE → ROUTE → (SQL_GEN ⇄ VALIDATE | GRAPH_GEN) → EXECUTE → SYNTHESIZE → RECORD_HISTORY → DONE

pub mod agent;
pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod execution;
pub mod llm;
pub mod memory;
pub mod models;
pub mod query;
pub mod refiner;
pub mod schema;
pub mod synthesis;
pub mod verification;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use agent::Orchestrator;
pub use config::Settings;
pub use models::*;
