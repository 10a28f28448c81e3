pub mod assessment;
pub mod config;
pub mod database;
pub mod profile;
pub mod proctor;
pub mod session;

#[cfg(feature = "desktop")]
mod commands; // tauri command surface over the session orchestrator

#[cfg(feature = "desktop")]
pub use commands::run;
