//! MySQL option file (`my.cnf`) reader
//!
//! Toolforge-style replicas hand out credentials as a `replica.my.cnf`:
//!
//! ```text
//! [client]
//! user = s51234
//! password = 'secret'
//! ```
//!
//! Only `user`, `password` and `port` from the `[client]` group are read.
//! Host and database always come from configuration. Other groups,
//! `!include` directives and unknown keys are ignored.

use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, Result};

/// Connection settings read from the `[client]` group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientOptions {
    pub user: Option<String>,
    pub password: Option<String>,
    /// Used when configuration leaves the port unset
    pub port: Option<u16>,
}

impl ClientOptions {
    /// Read and parse an option file
    ///
    /// # Arguments
    /// * `path` - Path to the option file
    ///
    /// # Returns
    /// * `Result<ClientOptions>` - Parsed `[client]` settings or error
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let content = std::fs::read_to_string(path)?;
        let options = Self::parse(&content)?;
        debug!(
            "Read client options from {} (user set: {})",
            path.display(),
            options.user.is_some()
        );
        Ok(options)
    }

    /// Parse option file text
    pub fn parse(content: &str) -> Result<Self> {
        let mut options = ClientOptions::default();
        let mut in_client = false;

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') || line.starts_with('!') {
                continue;
            }

            if let Some(group) = line.strip_prefix('[') {
                let group = group.strip_suffix(']').ok_or_else(|| {
                    ConfigError::InvalidFormat(format!("line {}: unterminated group header", lineno + 1))
                })?;
                in_client = group.trim().eq_ignore_ascii_case("client");
                continue;
            }

            if !in_client {
                continue;
            }

            let (key, value) = match line.split_once('=') {
                Some((k, v)) => (k.trim(), unquote(v.trim())),
                None => (line, String::new()),
            };

            // Option names accept '-' and '_' interchangeably.
            match key.replace('-', "_").as_str() {
                "user" => options.user = Some(value),
                "password" => options.password = Some(value),
                "port" => {
                    let port = value.parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                        field: "port".into(),
                        value: value.clone(),
                    })?;
                    options.port = Some(port);
                }
                _ => {}
            }
        }

        Ok(options)
    }
}

/// Strip one level of matching single or double quotes
fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'\'' || first == b'"') && first == last {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}
