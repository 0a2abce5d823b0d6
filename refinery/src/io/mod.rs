//! I/O helpers: configuration, pacing, the generation gateway and run artifacts.

pub mod config;
pub mod gateway;
pub mod pacer;
pub mod process;
pub mod prompt;
pub mod run_log;
