//! # custodian
//!
//! A storage-maintenance agent for chat homeservers. It reclaims space by
//! retiring stale rooms and media under two policies:
//!
//! - **Retention** deletes content strictly older than a configured age.
//! - **Pressure** deletes the least-valuable content (oldest, then
//!   largest) until a free-space target is met.
//!
//! The engine runs scan → evaluate → execute → report. Evaluation is pure
//! so dry-runs report exactly the plan a real run would execute, and the
//! executor isolates every per-item failure: one stuck room never blocks
//! cleanup of the rest of the server.
//!
//! The single entry point is [`cleanup::run_cleanup`]; the homeserver
//! sits behind the [`client::HomeserverClient`] trait so the engine can be
//! driven against the real admin API or the in-memory recording fake.

pub mod cleanup;
pub mod client;
pub mod config;
pub mod observability;

#[cfg(test)]
mod tests;

pub use cleanup::{PolicyMode, RunReport, run_cleanup};
pub use config::CustodianConfig;
