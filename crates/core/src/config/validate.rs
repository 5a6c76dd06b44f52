use super::{types::Config, ConfigError};

/// Validate configuration.
///
/// Checks that the server port is usable, upstream credentials are present
/// and the sync defaults sit inside their own upper bounds.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let upstream = &config.upstream;
    for (name, value) in [
        ("upstream.zone_url", &upstream.zone_url),
        ("upstream.username", &upstream.username),
        ("upstream.secret", &upstream.secret),
        ("upstream.integration_code", &upstream.integration_code),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                name
            )));
        }
    }
    if upstream.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "upstream.timeout_secs cannot be 0".to_string(),
        ));
    }

    let sync = &config.sync;
    if sync.max_tickets_per_request == 0 || sync.max_tickets_per_request > sync.max_fetch_limit {
        return Err(ConfigError::ValidationError(format!(
            "sync.max_tickets_per_request must be between 1 and {}",
            sync.max_fetch_limit
        )));
    }
    if sync.max_concurrent_requests == 0
        || sync.max_concurrent_requests > sync.max_concurrency_limit
    {
        return Err(ConfigError::ValidationError(format!(
            "sync.max_concurrent_requests must be between 1 and {}",
            sync.max_concurrency_limit
        )));
    }
    if sync.max_retries == 0 {
        return Err(ConfigError::ValidationError(
            "sync.max_retries cannot be 0".to_string(),
        ));
    }
    if sync.detail_page_size == 0 {
        return Err(ConfigError::ValidationError(
            "sync.detail_page_size cannot be 0".to_string(),
        ));
    }

    if let Some(llm) = &config.llm {
        if llm.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "llm.model cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[upstream]
username = "api@example.com"
secret = "secret"
integration_code = "CODE"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = base_config();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_empty_secret_fails() {
        let mut config = base_config();
        config.upstream.secret = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("upstream.secret"));
    }

    #[test]
    fn test_validate_page_size_above_fetch_limit_fails() {
        let mut config = base_config();
        config.sync.max_tickets_per_request = 5000;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("max_tickets_per_request"));
    }

    #[test]
    fn test_validate_zero_concurrency_fails() {
        let mut config = base_config();
        config.sync.max_concurrent_requests = 0;
        assert!(validate_config(&config).is_err());
    }
}
