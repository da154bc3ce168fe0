// ABOUTME: Parsing of operator environment declarations into KEY=VALUE assignments
// ABOUTME: Accepts either a file path or an inline colon-separated list

use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvParseError {
    #[error("Environment file {path} not found")]
    FileNotFound { path: String },

    #[error("Failed to read environment file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid environment variable format '{entry}', expected KEY=VALUE")]
    InvalidEntry { entry: String },
}

/// Turn an `--env` value into assignments
///
/// A value with neither `:` nor `=` names a file holding one `KEY=VALUE` per
/// line. Anything else is an inline list such as `A=1:B=2`. Blank lines and
/// empty list items are skipped.
pub fn parse_env_declarations(value: &str) -> Result<Vec<String>, EnvParseError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(Vec::new());
    }

    if is_file_reference(value) {
        parse_env_file(Path::new(value))
    } else {
        value
            .split(':')
            .filter(|entry| !entry.trim().is_empty())
            .map(validate_entry)
            .collect()
    }
}

fn is_file_reference(value: &str) -> bool {
    !value.contains(':') && !value.contains('=')
}

fn parse_env_file(path: &Path) -> Result<Vec<String>, EnvParseError> {
    let contents = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            EnvParseError::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            EnvParseError::Read {
                path: path.display().to_string(),
                source,
            }
        }
    })?;

    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(validate_entry)
        .collect()
}

/// Exactly one `=` with a non-empty key
fn validate_entry(entry: &str) -> Result<String, EnvParseError> {
    match entry.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() && !value.contains('=') => {
            Ok(entry.to_string())
        }
        _ => Err(EnvParseError::InvalidEntry {
            entry: entry.to_string(),
        }),
    }
}
