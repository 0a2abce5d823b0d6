//! Phase agents and the loop, tools and metered oracle they share.
//!
//! Each phase is a [`session::PhasePolicy`] driven by [`session::run_phase`]:
//! [`extractor::Extractor`] builds the record, [`validator::Validator`] scores it
//! and [`refiner::Refiner`] works the validator's feedback.

pub mod extractor;
pub mod oracle;
pub mod refiner;
pub mod session;
pub mod tools;
pub mod validator;
