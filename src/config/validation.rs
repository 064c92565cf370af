use crate::checker::ErrorKind;
use crate::config::types::{
    CheckingConfig, ClassificationConfig, Config, FilteringConfig, LinkPattern, OutputConfig,
};
use crate::ConfigError;
use regex::Regex;

/// Upper bound on worker threads
const MAX_THREADS: usize = 1000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_checking_config(&config.checking)?;
    validate_filtering_config(&config.filtering)?;
    validate_classification_config(&config.classification)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates checking limits and timeouts
fn validate_checking_config(config: &CheckingConfig) -> Result<(), ConfigError> {
    if config.threads > MAX_THREADS {
        return Err(ConfigError::Validation(format!(
            "threads must be between 0 and {}, got {}",
            MAX_THREADS, config.threads
        )));
    }

    if config.timeout == 0 {
        return Err(ConfigError::Validation(
            "timeout must be at least 1 second".to_string(),
        ));
    }

    if config.abort_timeout == 0 {
        return Err(ConfigError::Validation(
            "abort-timeout must be at least 1 second".to_string(),
        ));
    }

    if config.max_file_size == 0 {
        return Err(ConfigError::Validation(
            "max-file-size must be > 0".to_string(),
        ));
    }

    if config.max_parse_size > config.max_file_size {
        return Err(ConfigError::Validation(format!(
            "max-parse-size ({}) cannot exceed max-file-size ({})",
            config.max_parse_size, config.max_file_size
        )));
    }

    if config.status_wait_seconds == 0 {
        return Err(ConfigError::Validation(
            "status-wait-seconds must be >= 1".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if let Some(pattern) = &config.warning_regex {
        if pattern.is_empty() {
            return Err(ConfigError::InvalidPattern(
                "warning-regex cannot be empty".to_string(),
            ));
        }
        Regex::new(pattern)
            .map_err(|e| ConfigError::InvalidPattern(format!("warning-regex '{}': {}", pattern, e)))?;
        if config.warning_regex_max == 0 {
            return Err(ConfigError::Validation(
                "warning-regex-max must be >= 1".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates link patterns and warning tags
fn validate_filtering_config(config: &FilteringConfig) -> Result<(), ConfigError> {
    for entry in config.extern_links.iter().chain(&config.intern_links) {
        validate_link_pattern(entry)?;
    }

    for scheme in &config.ignored_schemes {
        if scheme.is_empty() || scheme.contains(':') {
            return Err(ConfigError::Validation(format!(
                "ignored scheme '{}' must be a bare scheme name",
                scheme
            )));
        }
    }

    Ok(())
}

/// Validates that a link pattern is a compilable regular expression
fn validate_link_pattern(entry: &LinkPattern) -> Result<(), ConfigError> {
    if entry.pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Link pattern cannot be empty".to_string(),
        ));
    }

    Regex::new(&entry.pattern)
        .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", entry.pattern, e)))?;

    Ok(())
}

/// Validates error kind names
fn validate_classification_config(config: &ClassificationConfig) -> Result<(), ConfigError> {
    for name in config.no_cache.iter().chain(&config.fatal) {
        if ErrorKind::from_name(name).is_none() {
            return Err(ConfigError::Validation(format!(
                "unknown error kind '{}' in [classification]",
                name
            )));
        }
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    for output in &config.file {
        if output.path.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{} output path cannot be empty",
                output.kind
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FileOutput, SinkKind};

    fn pattern(p: &str) -> LinkPattern {
        LinkPattern {
            pattern: p.to_string(),
            negate: false,
            strict: false,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_synchronous_mode_is_valid() {
        let mut config = Config::default();
        config.checking.threads = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_reject_zero_timeouts() {
        let mut config = Config::default();
        config.checking.timeout = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.checking.abort_timeout = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_reject_parse_size_above_file_size() {
        let mut config = Config::default();
        config.checking.max_file_size = 100;
        config.checking.max_parse_size = 200;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_link_pattern() {
        assert!(validate_link_pattern(&pattern("^https://example\\.com/")).is_ok());
        assert!(validate_link_pattern(&pattern("")).is_err());
        assert!(matches!(
            validate_link_pattern(&pattern("(unclosed")),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_validate_warning_regex() {
        let mut config = Config::default();
        config.checking.warning_regex = Some("Internal Server Error|TODO".to_string());
        assert!(validate(&config).is_ok());

        config.checking.warning_regex = Some("[unclosed".to_string());
        assert!(matches!(validate(&config), Err(ConfigError::InvalidPattern(_))));

        config.checking.warning_regex = Some("ok".to_string());
        config.checking.warning_regex_max = 0;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_reject_unknown_error_kind() {
        let mut config = Config::default();
        config.classification.no_cache.push("sunspots".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_reject_empty_output_path() {
        let mut config = Config::default();
        config.output.file.push(FileOutput {
            kind: SinkKind::Sql,
            path: "  ".to_string(),
        });
        assert!(validate(&config).is_err());
    }
}
