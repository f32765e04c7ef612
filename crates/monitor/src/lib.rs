//! Docker Monitor daemon
//!
//! Configuration, the authenticated dashboard API and the runtime settings
//! store. The binary in `main.rs` wires these to the collection loop from
//! `monitor_lib`.

pub mod api;
pub mod auth;
pub mod config;
pub mod settings;
