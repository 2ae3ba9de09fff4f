//! [`Strategy`]: an immutable value object parameterizing one correlation
//! attempt (spec §3, §4.4).

use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub intersection_occurrences_col: Column,
    pub intersection_col: Column,
    pub hidden_occurrences_col: Column,
    pub uniqueness_col: Column,
    pub window_seconds: u64,
    pub max_noise: u64,
}

/// The string-keyed shape `Strategy` arrives in from TOML/CLI config,
/// before column names are validated against `{content,
/// service_template_id}` (spec §4.4: construction fails with *BadStrategy*
/// otherwise).
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_intersection_occurrences_col")]
    pub intersection_occurrences_col: String,
    #[serde(default = "default_intersection_col")]
    pub intersection_col: String,
    #[serde(default = "default_hidden_occurrences_col")]
    pub hidden_occurrences_col: String,
    #[serde(default = "default_uniqueness_col")]
    pub uniqueness_col: String,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_max_noise")]
    pub max_noise: u64,
}

fn default_intersection_occurrences_col() -> String {
    "content".to_string()
}
fn default_intersection_col() -> String {
    "service_template_id".to_string()
}
fn default_hidden_occurrences_col() -> String {
    "service_template_id".to_string()
}
fn default_uniqueness_col() -> String {
    "content".to_string()
}
fn default_window_seconds() -> u64 {
    2
}
fn default_max_noise() -> u64 {
    1
}

impl Strategy {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        intersection_occurrences_col: &str,
        intersection_col: &str,
        hidden_occurrences_col: &str,
        uniqueness_col: &str,
        window_seconds: u64,
        max_noise: u64,
    ) -> Result<Self> {
        Ok(Self {
            intersection_occurrences_col: Column::parse(intersection_occurrences_col)?,
            intersection_col: Column::parse(intersection_col)?,
            hidden_occurrences_col: Column::parse(hidden_occurrences_col)?,
            uniqueness_col: Column::parse(uniqueness_col)?,
            window_seconds,
            max_noise,
        })
    }
}

impl TryFrom<StrategyConfig> for Strategy {
    type Error = crate::error::Error;

    fn try_from(cfg: StrategyConfig) -> Result<Self> {
        Strategy::new(
            &cfg.intersection_occurrences_col,
            &cfg.intersection_col,
            &cfg.hidden_occurrences_col,
            &cfg.uniqueness_col,
            cfg.window_seconds,
            cfg.max_noise,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_columns() {
        let err = Strategy::new("content", "nonsense", "content", "content", 2, 0).unwrap_err();
        assert!(matches!(err, crate::error::Error::BadStrategy(_)));
    }

    #[test]
    fn accepts_allowed_columns() {
        let s = Strategy::new("content", "service_template_id", "service_template_id", "content", 2, 1).unwrap();
        assert_eq!(s.window_seconds, 2);
        assert_eq!(s.max_noise, 1);
    }
}
