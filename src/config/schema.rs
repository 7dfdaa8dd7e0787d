use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `random_range` is only allowed on ranges big enough to keep the
/// collision probability low.
pub const MIN_RANDOM_SPAN: i64 = 100_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("department_full_code template must not be empty")]
    EmptyTemplate,
    #[error("department_full_code template must contain the \"department\" part")]
    TemplateMissingDepartment,
    #[error("{field}: random_range requires max - min >= {MIN_RANDOM_SPAN}, got {span}")]
    RangeTooSmall { field: &'static str, span: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ordered parts of `Department.full_code`. `"territory"` and
    /// `"department"` expand to the respective codes, anything else is a
    /// literal.
    pub department_full_code: Vec<String>,
    pub accession_generation: NumberStrategy,
    pub order_number_generation: NumberStrategy,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            department_full_code: vec![
                "territory".to_string(),
                "-".to_string(),
                "department".to_string(),
            ],
            accession_generation: NumberStrategy::RandomRange {
                min: 7_000_000,
                max: 7_999_999,
            },
            order_number_generation: NumberStrategy::IncrementalTight { min: 1_000 },
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.department_full_code.is_empty() {
            return Err(ConfigError::EmptyTemplate);
        }
        if !self.department_full_code.iter().any(|p| p == "department") {
            return Err(ConfigError::TemplateMissingDepartment);
        }
        self.accession_generation.validate("accession_generation")?;
        self.order_number_generation
            .validate("order_number_generation")?;
        Ok(())
    }
}

/// Identifier allocation strategy. Deserialization already rejects unknown
/// methods and missing bounds; `validate` checks the range policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum NumberStrategy {
    RandomRange { min: i64, max: i64 },
    Incremental { min: i64 },
    IncrementalTight { min: i64 },
}

impl NumberStrategy {
    pub fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if let Self::RandomRange { min, max } = self {
            let span = max - min;
            if span < MIN_RANDOM_SPAN {
                return Err(ConfigError::RangeTooSmall { field, span });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overriding the verbosity default.
    pub filter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn parses_strategy_table() {
        let cfg: Config = toml::from_str(
            "department_full_code = [\"department\"]\n\
             [accession_generation]\n\
             method = \"incremental\"\n\
             min = 5\n",
        )
        .unwrap();
        assert_eq!(
            cfg.accession_generation,
            NumberStrategy::Incremental { min: 5 }
        );
        // untouched section keeps its default
        assert_eq!(
            cfg.order_number_generation,
            NumberStrategy::IncrementalTight { min: 1_000 }
        );
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_unknown_method() {
        let parsed = toml::from_str::<Config>(
            "[accession_generation]\n\
             method = \"fibonacci\"\n\
             min = 1\n",
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn rejects_small_random_range() {
        let cfg = Config {
            accession_generation: NumberStrategy::RandomRange { min: 0, max: 10 },
            ..Config::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::RangeTooSmall {
                field: "accession_generation",
                span: 10
            })
        ));
    }

    #[test]
    fn rejects_template_without_department() {
        let cfg = Config {
            department_full_code: vec!["territory".to_string()],
            ..Config::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::TemplateMissingDepartment)
        ));

        let cfg = Config {
            department_full_code: Vec::new(),
            ..Config::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyTemplate)));
    }
}
