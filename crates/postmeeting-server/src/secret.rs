//! Secret reference resolver.
//!
//! Secret values in `config.toml` (client secrets, API keys, the cron secret)
//! can point outside the file:
//!
//! - `pass::path/in/store` runs `pass show path/in/store` and takes the first line
//! - `env::VAR_NAME` reads `$VAR_NAME`
//! - anything else is used as-is

use crate::error::{ServerError, ServerResult};

/// Resolves a value that may carry a secret reference prefix.
pub fn resolve(value: &str) -> ServerResult<String> {
    if let Some(path) = value.strip_prefix("pass::") {
        resolve_pass(path)
    } else if let Some(var) = value.strip_prefix("env::") {
        resolve_env(var)
    } else {
        Ok(value.to_string())
    }
}

/// Resolves an optional value; `None` and blank values stay `None`.
pub fn resolve_optional(value: Option<&str>) -> ServerResult<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => resolve(v).map(Some),
        None => Ok(None),
    }
}

fn resolve_pass(path: &str) -> ServerResult<String> {
    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| ServerError::config(format!("failed to run `pass show {}`: {}", path, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ServerError::config(format!(
            "`pass show {}` failed (exit {}): {}",
            path,
            output.status,
            stderr.trim()
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| ServerError::config(format!("`pass show {}` produced no output", path)))
}

fn resolve_env(var: &str) -> ServerResult<String> {
    std::env::var(var)
        .map_err(|_| ServerError::config(format!("environment variable `{}` is not set", var)))
}
