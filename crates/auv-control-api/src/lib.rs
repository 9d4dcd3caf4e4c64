//! AUV fleet control plane — library crate.
//!
//! Re-exports the modules the binary (`main.rs`) and `auv-e2e-tests`
//! need: `AppState`, `build_router`, `ApiConfig`, and the background
//! expiration sweep.

pub mod config;
pub mod db;
pub mod error;
pub mod pagination;
pub mod routes;
pub mod state;
pub mod sweep;
pub mod trajectory;
