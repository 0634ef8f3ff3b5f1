pub mod config;
pub mod config_toml;
pub mod logger;
pub mod tools;

pub use config::*;
pub use config_toml::{ConfigToml, apply_file_to_config, load_config_toml, parse_config_toml};
pub use logger::setup_logging;
pub use tools::now_ms;
