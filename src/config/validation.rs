use super::{AppConfig, ConfigError};

const LOG_LEVELS: [&str; 7] = ["DEBUG", "INFO", "WARN", "WARNING", "ERROR", "CRITICAL", "DISABLED"];

/// Check the fully resolved config (file plus command-line overrides).
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] naming the first offending key.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    let zeroed = [
        ("server.port", server.port == 0),
        ("server.timeout", server.timeout == 0),
        ("server.http_pool_max_idle_per_host", server.http_pool_max_idle_per_host == 0),
        ("server.max_request_body_bytes", server.max_request_body_bytes == 0),
        ("server.runtime_worker_threads", server.runtime_worker_threads == Some(0)),
    ];
    if let Some((key, _)) = zeroed.iter().find(|(_, is_zero)| *is_zero) {
        return Err(invalid(format!("{key} must be greater than 0")));
    }
    if server.host.trim().is_empty() {
        return Err(invalid("server.host cannot be empty"));
    }
    check_target_url(server.target_url.trim())?;

    let level = config.features.log_level.to_ascii_uppercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(invalid(format!("features.log_level must be one of {LOG_LEVELS:?}")));
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

/// Only a bare http(s) base is usable; request paths are appended to it.
fn check_target_url(raw: &str) -> Result<(), ConfigError> {
    let url = url::Url::parse(raw)
        .map_err(|err| invalid(format!("server.target_url is not a valid URL: {err}")))?;
    match url.scheme() {
        "http" | "https" if url.query().is_none() && url.fragment().is_none() => Ok(()),
        "http" | "https" => Err(invalid("server.target_url must not carry a query or fragment")),
        _ => Err(invalid("server.target_url must use http:// or https://")),
    }
}
