use std::path::PathBuf;

use thiserror::Error;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SPARK_JWT_SECRET is unset or still a placeholder")]
    InsecureSecret,
    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub page_size: u32,
    pub max_page_size: u32,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("SPARK_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::InsecureSecret);
        }

        let page_size = parse(&lookup, "SPARK_PAGE_SIZE", 20)?;
        let max_page_size = parse(&lookup, "SPARK_MAX_PAGE_SIZE", 100)?;
        if page_size == 0 || page_size > max_page_size {
            return Err(ConfigError::Invalid {
                var: "SPARK_PAGE_SIZE",
                value: page_size.to_string(),
            });
        }

        Ok(Self {
            host: lookup("SPARK_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&lookup, "SPARK_PORT", 3000)?,
            db_path: lookup("SPARK_DB_PATH")
                .unwrap_or_else(|| "spark.db".into())
                .into(),
            jwt_secret,
            page_size,
            max_page_size,
        })
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("SPARK_JWT_SECRET", "s3cret-value")]).unwrap();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.db_path, PathBuf::from("spark.db"));
        assert_eq!(cfg.page_size, 20);
        assert_eq!(cfg.max_page_size, 100);
    }

    #[test]
    fn placeholder_or_missing_secret_is_refused() {
        assert_eq!(config(&[]).unwrap_err(), ConfigError::InsecureSecret);
        assert_eq!(
            config(&[("SPARK_JWT_SECRET", "dev-secret-change-me")]).unwrap_err(),
            ConfigError::InsecureSecret
        );
    }

    #[test]
    fn bad_numbers_are_reported() {
        let err = config(&[("SPARK_JWT_SECRET", "x1"), ("SPARK_PORT", "http")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: "SPARK_PORT",
                value: "http".into()
            }
        );

        let err = config(&[("SPARK_JWT_SECRET", "x1"), ("SPARK_PAGE_SIZE", "500")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SPARK_PAGE_SIZE", .. }));
    }
}
