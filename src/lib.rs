// Store auth service
// Library root; the binary in main.rs wires these modules together

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod maintenance;
pub mod validation;

pub use app::{create_router, AppState};
pub use config::AppConfig;
pub use error::{ErrorResponse, StartupError};
