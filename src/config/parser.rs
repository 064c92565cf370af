use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so that two reports can be matched to the
/// configuration that produced them.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(content_hash(&std::fs::read(path)?))
}

fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Loads a configuration and returns both the config and the hash of the
/// exact text it was parsed from
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, content_hash(content.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SinkKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[checking]
threads = 4
recursion-level = 2
timeout = 15
max-num-urls = 1000
anchors = true
warning-regex = "Oracle DB Error"
warning-regex-max = 2

[filtering]
ignore-warnings = ["url-whitespace"]

[[filtering.extern-links]]
pattern = "^https?://ads\\."
strict = true

[classification]
no-cache = ["timeout", "connection-reset"]

[output]
verbose = true

[[output.file]]
type = "csv"
path = "results.csv"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.checking.threads, 4);
        assert_eq!(config.checking.recursion_limit(), Some(2));
        assert_eq!(config.checking.timeout, 15);
        assert_eq!(config.checking.max_num_urls, Some(1000));
        assert!(config.checking.anchors);
        assert_eq!(config.checking.warning_regex.as_deref(), Some("Oracle DB Error"));
        assert_eq!(config.checking.warning_regex_max, 2);
        assert_eq!(config.filtering.extern_links.len(), 1);
        assert!(config.filtering.extern_links[0].strict);
        assert!(!config.filtering.extern_links[0].negate);
        assert_eq!(config.classification.no_cache.len(), 2);
        assert!(config.output.verbose);
        assert_eq!(config.output.file[0].kind, SinkKind::Csv);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let file = create_temp_config("");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.checking.threads, 10);
        assert_eq!(config.checking.recursion_limit(), None);
        assert_eq!(config.classification.no_cache, vec!["timeout".to_string()]);
        assert!(config.output.warnings);
        assert!(config.checking.robots_txt);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[checking]
threads = 5000
"#;
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_hash_tracks_content() {
        let first = create_temp_config("[checking]\nthreads = 1\n");
        let second = create_temp_config("[checking]\nthreads = 2\n");

        let hash = compute_config_hash(first.path()).unwrap();
        let (_, loaded_hash) = load_config_with_hash(first.path()).unwrap();

        assert_eq!(hash, loaded_hash);
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, compute_config_hash(second.path()).unwrap());
    }
}
