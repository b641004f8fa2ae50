//! Configuration management for RFM scoring and reporting

use crate::error::{RfmError, RfmResult};
use crate::model::{Direction, QuartileMethod};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub fields: FieldsConfig,
    pub scoring: ScoringConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

/// Input table format
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Field separator, a single ASCII character (tab by default)
    pub separator: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            separator: "\t".to_string(),
        }
    }
}

impl InputConfig {
    /// Separator as the byte expected by the CSV reader
    pub fn separator_byte(&self) -> RfmResult<u8> {
        match self.separator.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(RfmError::invalid_input(
                "input.separator",
                format!("expected a single ASCII character, got {:?}", self.separator),
            )),
        }
    }
}

/// Names of the columns the derivation reads
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    /// Days since last purchase
    pub recency: String,
    /// Purchase-count columns summed into TotalFrequency
    pub purchases: Vec<String>,
    /// Spend columns summed into TotalMonetary
    pub spend: Vec<String>,
    /// Optional customer identifier; sample IDs per segment go into `summary.json`
    pub id: Option<String>,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            recency: "Recency".to_string(),
            purchases: vec![
                "NumWebPurchases".to_string(),
                "NumCatalogPurchases".to_string(),
                "NumStorePurchases".to_string(),
            ],
            spend: vec![
                "MntWines".to_string(),
                "MntFruits".to_string(),
                "MntMeatProducts".to_string(),
                "MntFishProducts".to_string(),
                "MntSweetProducts".to_string(),
                "MntGoldProds".to_string(),
            ],
            id: Some("ID".to_string()),
        }
    }
}

/// Quartile policy per metric
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScoringConfig {
    pub method: QuartileMethod,
    pub recency_favorable: Direction,
    pub frequency_favorable: Direction,
    pub monetary_favorable: Direction,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            method: QuartileMethod::Interpolated,
            recency_favorable: Direction::Lower,
            frequency_favorable: Direction::Higher,
            monetary_favorable: Direction::Higher,
        }
    }
}

/// Report output settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: String,
    /// File name of the augmented table inside `output_dir`
    pub derived_csv: String,
    pub histogram_bins: usize,
    pub chart_width: u32,
    pub chart_height: u32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: "rfm_report".to_string(),
            derived_csv: "rfm_segments.csv".to_string(),
            histogram_bins: 20,
            chart_width: 800,
            chart_height: 600,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, with `RFM__SECTION__KEY` environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> RfmResult<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("RFM").separator("__"))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Load from `path` when given, otherwise fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> RfmResult<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    /// Reject configurations the derivation cannot run with
    pub fn validate(&self) -> RfmResult<()> {
        self.input.separator_byte()?;
        if self.fields.purchases.is_empty() {
            return Err(RfmError::invalid_input(
                "fields.purchases",
                "at least one purchase-count column is required",
            ));
        }
        if self.fields.spend.is_empty() {
            return Err(RfmError::invalid_input(
                "fields.spend",
                "at least one spend column is required",
            ));
        }
        if self.report.histogram_bins == 0 {
            return Err(RfmError::invalid_input(
                "report.histogram_bins",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.input.separator_byte().unwrap(), b'\t');
        assert_eq!(config.fields.recency, "Recency");
        assert_eq!(config.fields.purchases.len(), 3);
        assert_eq!(config.fields.spend.len(), 6);
        assert_eq!(config.scoring.recency_favorable, Direction::Lower);
        assert_eq!(config.scoring.monetary_favorable, Direction::Higher);
        assert_eq!(config.scoring.method, QuartileMethod::Interpolated);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[input]").unwrap();
        writeln!(file, "separator = \",\"").unwrap();
        writeln!(file, "[scoring]").unwrap();
        writeln!(file, "method = \"ranked\"").unwrap();
        writeln!(file, "[report]").unwrap();
        writeln!(file, "histogram_bins = 10").unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.input.separator_byte().unwrap(), b',');
        assert_eq!(config.scoring.method, QuartileMethod::Ranked);
        assert_eq!(config.scoring.frequency_favorable, Direction::Higher);
        assert_eq!(config.report.histogram_bins, 10);
        assert_eq!(config.report.chart_width, 800);
        assert_eq!(config.fields.spend.len(), 6);
    }

    #[test]
    fn test_invalid_separator() {
        let mut config = AppConfig::default();
        config.input.separator = ";;".to_string();
        assert!(matches!(
            config.validate(),
            Err(RfmError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_empty_field_lists_rejected() {
        let mut config = AppConfig::default();
        config.fields.spend.clear();
        assert!(config.validate().is_err());
    }
}
