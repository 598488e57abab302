//! KDL configuration parser

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::model::*;

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse the file at `path`, or return the defaults if it does not exist
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::debug!("No configuration at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    parse_config(path)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl reports spans with its own miette version
        let span = miette::SourceSpan::from((e.span.offset(), e.span.len()));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node)?;
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

fn parse_global(node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    let Some(children) = node.children() else {
        return Ok(global);
    };

    for child in children.nodes() {
        match child.name().value() {
            "log-level" => {
                let val = string_arg(child)?;
                global.log_level = val
                    .parse()
                    .map_err(|message| ConfigError::Invalid { message })?;
            }
            "socket-env" => {
                let val = string_arg(child)?;
                if val.is_empty() {
                    return Err(ConfigError::Invalid {
                        message: "socket-env must not be empty".to_string(),
                    });
                }
                global.socket_env = Some(val.to_string());
            }
            "socket-path" => {
                let val = string_arg(child)?;
                global.socket_path = Some(PathBuf::from(shellexpand::tilde(val).into_owned()));
            }
            "pacing-ms" => {
                global.pacing_ms = millis_arg(child)?;
            }
            "initial-state-timeout-ms" => {
                global.initial_state_timeout_ms = millis_arg(child)?;
            }
            name => {
                tracing::warn!("Unknown global config option: {}", name);
            }
        }
    }

    Ok(global)
}

fn first_arg<'a>(node: &'a kdl::KdlNode) -> Result<&'a kdl::KdlValue, ConfigError> {
    node.entries()
        .iter()
        .find(|entry| entry.name().is_none())
        .map(|entry| entry.value())
        .ok_or_else(|| ConfigError::MissingField {
            field: format!("value for global.{}", node.name().value()),
        })
}

fn string_arg(node: &kdl::KdlNode) -> Result<&str, ConfigError> {
    first_arg(node)?
        .as_string()
        .ok_or_else(|| ConfigError::Invalid {
            message: format!("{} expects a string", node.name().value()),
        })
}

fn millis_arg(node: &kdl::KdlNode) -> Result<u64, ConfigError> {
    let name = node.name().value();
    let value = first_arg(node)?
        .as_i64()
        .ok_or_else(|| ConfigError::Invalid {
            message: format!("{} expects an integer number of milliseconds", name),
        })?;

    u64::try_from(value).map_err(|_| ConfigError::Invalid {
        message: format!("{} must not be negative, got {}", name, value),
    })
}
