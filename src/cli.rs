//! Command-line interface definitions and argument parsing

use crate::config::AppConfig;
use crate::data::ColumnSelector;
use crate::model::QuartileMethod;
use crate::segment::RfmScore;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Quartile splitting rule accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    /// Percentile edges; fails on heavily tied metrics
    Interpolated,
    /// Sorted position; ties broken by row order
    Ranked,
}

impl From<MethodArg> for QuartileMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Interpolated => QuartileMethod::Interpolated,
            MethodArg::Ranked => QuartileMethod::Ranked,
        }
    }
}

/// Customer segmentation CLI using quartile-based RFM scoring
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input customer table
    #[arg(short, long, default_value = "data/Customer analysis.csv")]
    pub input: PathBuf,

    /// Optional TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the derived table, summary and charts (overrides config)
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Field separator of the input table, e.g. "," (overrides config)
    #[arg(short, long)]
    pub separator: Option<String>,

    /// Quartile splitting rule (overrides config)
    #[arg(short, long, value_enum)]
    pub method: Option<MethodArg>,

    /// Column to histogram; exact name or "re:<pattern>". Repeatable.
    /// Defaults to Recency plus all purchase and spend columns and their totals.
    #[arg(long = "histogram")]
    pub histograms: Vec<String>,

    /// Classify a single RFM score such as "131" and exit
    #[arg(long)]
    pub classify: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the score given to `--classify`
    pub fn parse_score(&self) -> crate::Result<Option<RfmScore>> {
        match self.classify {
            Some(ref score) => Ok(Some(score.parse()?)),
            None => Ok(None),
        }
    }

    /// Parse the `--histogram` selectors
    pub fn histogram_selectors(&self) -> crate::Result<Vec<ColumnSelector>> {
        self.histograms
            .iter()
            .map(|s| s.parse::<ColumnSelector>().map_err(anyhow::Error::from))
            .collect()
    }

    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) -> crate::Result<()> {
        if let Some(ref dir) = self.output_dir {
            config.report.output_dir = dir.clone();
        }
        if let Some(ref separator) = self.separator {
            config.input.separator = separator.clone();
        }
        if let Some(method) = self.method {
            config.scoring.method = method.into();
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
        config.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            input: PathBuf::from("customers.tsv"),
            config: None,
            output_dir: None,
            separator: None,
            method: None,
            histograms: Vec::new(),
            classify: None,
            verbose: false,
        }
    }

    #[test]
    fn test_parse_score() {
        let mut args = base_args();
        assert_eq!(args.parse_score().unwrap(), None);

        args.classify = Some("131".to_string());
        assert_eq!(args.parse_score().unwrap().unwrap().to_string(), "131");

        args.classify = Some("invalid".to_string());
        assert!(args.parse_score().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut args = base_args();
        args.output_dir = Some("out".to_string());
        args.separator = Some(",".to_string());
        args.method = Some(MethodArg::Ranked);
        args.verbose = true;

        let mut config = AppConfig::default();
        args.apply_overrides(&mut config).unwrap();
        assert_eq!(config.report.output_dir, "out");
        assert_eq!(config.input.separator_byte().unwrap(), b',');
        assert_eq!(config.scoring.method, QuartileMethod::Ranked);
        assert_eq!(config.logging.level, "debug");

        args.separator = Some("ab".to_string());
        assert!(args.apply_overrides(&mut config).is_err());
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "rfmforge",
            "--input",
            "customers.csv",
            "--histogram",
            "Recency",
            "--histogram",
            "re:^Mnt",
            "--method",
            "ranked",
        ])
        .unwrap();

        assert_eq!(args.input, PathBuf::from("customers.csv"));
        assert_eq!(args.method, Some(MethodArg::Ranked));
        let selectors = args.histogram_selectors().unwrap();
        assert_eq!(selectors.len(), 2);
        assert!(matches!(selectors[1], ColumnSelector::Pattern(_)));
    }
}
