//! HTTP gateway and process wiring of the tinylink URL shortener.

pub mod app;
pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
pub mod state;
pub mod subnet;

pub use app::App;
pub use config::Config;
pub use state::AppState;
