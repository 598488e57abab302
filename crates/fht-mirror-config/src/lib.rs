//! Configuration parsing for fht-mirror
//!
//! The configuration is a KDL file with a single `global` block. Every
//! setting is optional, and a missing file yields the defaults.

mod error;
mod model;
mod parser;

pub use error::ConfigError;
pub use model::*;
pub use parser::{load_config, parse_config, parse_config_str};
