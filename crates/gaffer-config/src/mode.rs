//! Build mode selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }

    /// Read the mode from `GAFFER_MODE`, then `NODE_ENV`.
    ///
    /// Unset or unrecognised values fall back to development.
    pub fn from_env() -> Self {
        Self::from_env_vars(
            std::env::var("GAFFER_MODE").ok().as_deref(),
            std::env::var("NODE_ENV").ok().as_deref(),
        )
    }

    /// Resolution used by [`Mode::from_env`], without touching the process
    /// environment.
    pub fn from_env_vars(gaffer_mode: Option<&str>, node_env: Option<&str>) -> Self {
        [gaffer_mode, node_env]
            .into_iter()
            .flatten()
            .find_map(|raw| raw.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_names() {
        assert_eq!("production".parse::<Mode>().unwrap(), Mode::Production);
        assert_eq!("PROD".parse::<Mode>().unwrap(), Mode::Production);
        assert_eq!("dev".parse::<Mode>().unwrap(), Mode::Development);
        assert!("staging".parse::<Mode>().is_err());
    }

    #[test]
    fn gaffer_mode_takes_precedence() {
        assert_eq!(
            Mode::from_env_vars(Some("development"), Some("production")),
            Mode::Development
        );
        assert_eq!(Mode::from_env_vars(None, Some("production")), Mode::Production);
        assert_eq!(Mode::from_env_vars(None, None), Mode::Development);
    }

    #[test]
    fn unknown_values_fall_through() {
        assert_eq!(
            Mode::from_env_vars(Some("qa"), Some("production")),
            Mode::Production
        );
        assert_eq!(Mode::from_env_vars(Some("qa"), None), Mode::Development);
    }
}
