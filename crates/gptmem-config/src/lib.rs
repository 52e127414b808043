pub mod loader;
pub mod model;

pub use loader::ConfigLoader;
pub use model::{AppConfig, DEFAULT_LOG_LEVEL};
