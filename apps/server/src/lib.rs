//! Patrimoine server: configuration, state wiring and the daily materializer scheduler.

pub mod config;
pub mod main_lib;
pub mod scheduler;
pub mod secrets;

pub use main_lib::{build_state, init_tracing, AppState};
