//! Loads the TOML config file.

use std::path::{Path, PathBuf};

use titanic_upload::StorageConfig;

/// Errors loading the config file. Both are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid TOML or misses a required key.
    #[error("Invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Reads and parses the config at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] if the file cannot be read and
/// [`ConfigError::Parse`] if it is malformed or incomplete.
pub fn load(path: &Path) -> Result<StorageConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse(text: &str) -> Result<StorageConfig, toml::de::Error> {
    toml::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
region = "eu-west-1"
access_key = "AKIDEXAMPLE"
secret_key = "hunter2"
bucket = "backups"
prefix = "laptop/"
endpoint = "http://localhost:9000"
"#;

    #[test]
    fn parses_all_keys() {
        let config = parse(FULL).unwrap();
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.bucket, "backups");
        assert_eq!(config.prefix.as_deref(), Some("laptop/"));
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
    }

    #[test]
    fn optional_keys_default_to_none() {
        let config = parse(
            r#"
region = "us-east-1"
access_key = "a"
secret_key = "s"
bucket = "b"
"#,
        )
        .unwrap();
        assert!(config.prefix.is_none());
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let err = parse("region = \"us-east-1\"\nbucket = \"b\"\n").unwrap_err();
        assert!(err.to_string().contains("access_key"));
    }

    #[test]
    fn load_reports_path_on_failure() {
        let missing = std::env::temp_dir().join("titanic_config_missing.toml");
        let _ = std::fs::remove_file(&missing);
        let err = load(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("titanic_config_missing.toml"));

        let broken = std::env::temp_dir().join("titanic_config_broken.toml");
        std::fs::write(&broken, "region = ").unwrap();
        assert!(matches!(load(&broken), Err(ConfigError::Parse { .. })));
        let _ = std::fs::remove_file(&broken);
    }

    #[test]
    fn load_reads_file() {
        let path = std::env::temp_dir().join("titanic_config_full.toml");
        std::fs::write(&path, FULL).unwrap();
        let config = load(&path).unwrap();
        assert_eq!(config.access_key, "AKIDEXAMPLE");
        assert!(!format!("{config:?}").contains("hunter2"));
        let _ = std::fs::remove_file(&path);
    }
}
