//! Budget-constrained refinement of documents into scored invention records.
//!
//! A run sends one source document through three oracle-driven phases
//! (extraction, validation, refinement) under a fixed call budget and a request
//! pacer, then scores the result deterministically. The crate is split:
//!
//! - **[`core`]**: Pure, deterministic logic (record merging, scoring, reply
//!   interpretation, budget caps). No I/O.
//! - **[`io`]**: Side effects (config files, pacing clock, the generation
//!   gateway process, prompt rendering, run artifacts).
//! - **[`agents`]**: The decide/execute loop, its tool set and the three phase
//!   policies.
//!
//! [`orchestrate`] sequences the phases and owns the budget.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrate;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
