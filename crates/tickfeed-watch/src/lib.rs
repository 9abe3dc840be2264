//! Console watcher for the live ticker feed aggregator.

pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod seed;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use logging::init_logging;
