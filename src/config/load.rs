use std::fs;
use std::path::Path;

use super::{Config, ConfigError};

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Load the config, falling back to the hardcoded defaults when the file is
/// missing, unparsable or invalid. A rejected file is logged and must never
/// fail the triggering write.
pub fn load_or_default(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }
    match load(path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("config load failed, using defaults: {err}");
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NumberStrategy;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(&dir.path().join("absent.toml"));
        assert_eq!(
            config.department_full_code,
            vec!["territory", "-", "department"]
        );
    }

    #[test]
    fn valid_file_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "department_full_code = [\"department\"]\n\
             [order_number_generation]\n\
             method = \"incremental\"\n\
             min = 50\n",
        )
        .unwrap();
        let config = load_or_default(&path);
        assert_eq!(config.department_full_code, vec!["department"]);
        assert_eq!(
            config.order_number_generation,
            NumberStrategy::Incremental { min: 50 }
        );
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[accession_generation]\n\
             method = \"random_range\"\n\
             min = 0\n\
             max = 10\n",
        )
        .unwrap();
        let config = load_or_default(&path);
        assert_eq!(
            config.accession_generation,
            NumberStrategy::RandomRange {
                min: 7_000_000,
                max: 7_999_999
            }
        );
    }
}
