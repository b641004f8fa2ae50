//! Data loading, record extraction and the augmented table, using Polars

use crate::config::{AppConfig, FieldsConfig};
use crate::error::{RfmError, RfmResult};
use crate::model::{CustomerRecord, Derivation, DerivedRecord};
use polars::prelude::*;
use regex::Regex;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Names of the columns appended by the derivation
pub const TOTAL_MONETARY: &str = "TotalMonetary";
pub const TOTAL_FREQUENCY: &str = "TotalFrequency";
pub const RECENCY_QUARTILE: &str = "RecencyQuartile";
pub const FREQUENCY_QUARTILE: &str = "FrequencyQuartile";
pub const MONETARY_QUARTILE: &str = "MonetaryQuartile";
pub const RFM_SCORE: &str = "RFMScore";
pub const RFM_CATEGORY: &str = "RFMCategory";

/// Loaded table together with the customer records extracted from it
#[derive(Debug, Clone)]
pub struct RfmDataset {
    /// All columns of the input file, untouched
    pub frame: DataFrame,
    /// One record per row, in row order
    pub records: Vec<CustomerRecord>,
}

impl RfmDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Load a delimited file and extract customer records
///
/// # Arguments
/// * `file_path` - Path to the CSV/TSV file
/// * `config` - Separator and field names
///
/// # Returns
/// * `RfmDataset` with the raw frame and validated records
pub fn load_dataset(file_path: &Path, config: &AppConfig) -> RfmResult<RfmDataset> {
    let frame = load_table(file_path, config.input.separator_byte()?)?;
    let records = extract_records(&frame, &config.fields)?;

    info!(
        path = %file_path.display(),
        rows = frame.height(),
        columns = frame.width(),
        "Loaded customer table"
    );

    Ok(RfmDataset { frame, records })
}

/// Read a delimited file with a header row
///
/// Column types are inferred from every row, so a stray text cell anywhere in
/// a numeric column turns that column into text instead of failing the read.
pub fn load_table(file_path: &Path, separator: u8) -> RfmResult<DataFrame> {
    let frame = LazyCsvReader::new(file_path)
        .with_has_header(true)
        .with_separator(separator)
        .with_infer_schema_length(None)
        .finish()?
        .collect()?;
    Ok(frame)
}

/// Read a required column as finite floats
///
/// Fails with `InvalidInput` when the column is missing, not an integer or
/// float column, or has null/non-finite entries.
pub fn numeric_column(frame: &DataFrame, name: &str) -> RfmResult<Vec<f64>> {
    let column = frame
        .column(name)
        .map_err(|_| RfmError::invalid_input(name, "column not found"))?;

    match column.dtype() {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64
        | DataType::Float32
        | DataType::Float64 => {}
        DataType::String => return Err(non_numeric_text(column, name)),
        other => {
            return Err(RfmError::invalid_input(
                name,
                format!("column has type {} instead of a number", other),
            ))
        }
    }

    let floats = column.cast(&DataType::Float64)?;
    let values = floats.as_materialized_series().f64()?;

    let mut out = Vec::with_capacity(values.len());
    for (row, value) in values.into_iter().enumerate() {
        match value {
            Some(v) if v.is_finite() => out.push(v),
            Some(v) => {
                return Err(RfmError::invalid_input(
                    name,
                    format!("row {} holds non-finite value {}", row, v),
                ))
            }
            None => {
                return Err(RfmError::invalid_input(
                    name,
                    format!("row {} is missing a value", row),
                ))
            }
        }
    }
    Ok(out)
}

/// Describe the first cell of a text column that does not parse as a number
fn non_numeric_text(column: &Column, name: &str) -> RfmError {
    let offending = column.as_materialized_series().str().ok().and_then(|values| {
        values
            .into_iter()
            .enumerate()
            .find_map(|(row, value)| match value {
                Some(text) if text.trim().parse::<f64>().is_err() => Some((row, text.to_string())),
                _ => None,
            })
    });
    match offending {
        Some((row, text)) => {
            RfmError::invalid_input(name, format!("row {} holds non-numeric value {:?}", row, text))
        }
        None => RfmError::invalid_input(name, "column is not numeric"),
    }
}

/// Read a column as text, one entry per row
///
/// Numbers are rendered in their usual decimal form. Missing entries fail
/// with `InvalidInput`.
pub fn text_column(frame: &DataFrame, name: &str) -> RfmResult<Vec<String>> {
    let column = frame
        .column(name)
        .map_err(|_| RfmError::invalid_input(name, "column not found"))?;
    let text = column.cast(&DataType::String)?;
    let values = text.as_materialized_series().str()?;

    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value
                .map(str::to_string)
                .ok_or_else(|| RfmError::invalid_input(name, format!("row {} is missing a value", row)))
        })
        .collect()
}

/// Build one `CustomerRecord` per row from the configured columns
pub fn extract_records(frame: &DataFrame, fields: &FieldsConfig) -> RfmResult<Vec<CustomerRecord>> {
    let recency = numeric_column(frame, &fields.recency)?;
    let purchases = fields
        .purchases
        .iter()
        .map(|name| numeric_column(frame, name))
        .collect::<RfmResult<Vec<_>>>()?;
    let spend = fields
        .spend
        .iter()
        .map(|name| numeric_column(frame, name))
        .collect::<RfmResult<Vec<_>>>()?;

    let records = (0..frame.height())
        .map(|row| CustomerRecord {
            recency: recency[row],
            purchases: purchases.iter().map(|column| column[row]).collect(),
            spend: spend.iter().map(|column| column[row]).collect(),
        })
        .collect();

    debug!(
        purchase_fields = fields.purchases.len(),
        spend_fields = fields.spend.len(),
        "Extracted customer records"
    );
    Ok(records)
}

/// Append the derived columns to a copy of `frame`
pub fn augment(frame: &DataFrame, derivation: &Derivation) -> RfmResult<DataFrame> {
    if frame.height() != derivation.len() {
        return Err(RfmError::invalid_input(
            RFM_SCORE,
            format!(
                "table has {} rows but derivation has {} records",
                frame.height(),
                derivation.len()
            ),
        ));
    }

    let records = &derivation.records;
    let quartile = |pick: fn(&DerivedRecord) -> u8| -> Vec<u32> {
        records.iter().map(|r| pick(r) as u32).collect()
    };

    let mut out = frame.clone();
    out.with_column(Series::new(
        TOTAL_MONETARY.into(),
        derivation.total_monetary(),
    ))?;
    out.with_column(Series::new(
        TOTAL_FREQUENCY.into(),
        derivation.total_frequency(),
    ))?;
    out.with_column(Series::new(
        RECENCY_QUARTILE.into(),
        quartile(|r| r.recency_quartile),
    ))?;
    out.with_column(Series::new(
        FREQUENCY_QUARTILE.into(),
        quartile(|r| r.frequency_quartile),
    ))?;
    out.with_column(Series::new(
        MONETARY_QUARTILE.into(),
        quartile(|r| r.monetary_quartile),
    ))?;
    out.with_column(Series::new(
        RFM_SCORE.into(),
        records
            .iter()
            .map(|r| r.score.to_string())
            .collect::<Vec<_>>(),
    ))?;
    out.with_column(Series::new(
        RFM_CATEGORY.into(),
        records
            .iter()
            .map(|r| r.category.as_str())
            .collect::<Vec<_>>(),
    ))?;

    Ok(out)
}

/// Write a frame as comma-separated text with a header row
pub fn write_csv(frame: &DataFrame, output_path: &Path) -> RfmResult<()> {
    let mut file = File::create(output_path)?;
    let mut frame = frame.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut frame)?;
    info!(path = %output_path.display(), rows = frame.height(), "Wrote derived table");
    Ok(())
}

/// Column names of a frame, in table order
pub fn column_names(frame: &DataFrame) -> Vec<String> {
    frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Picks columns either by exact name or by regular expression (`re:` prefix)
#[derive(Debug, Clone)]
pub enum ColumnSelector {
    Name(String),
    Pattern(Regex),
}

impl FromStr for ColumnSelector {
    type Err = RfmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RfmError::InvalidSelector("empty selector".to_string()));
        }
        match s.strip_prefix("re:") {
            Some(pattern) => Ok(ColumnSelector::Pattern(Regex::new(pattern)?)),
            None => Ok(ColumnSelector::Name(s.to_string())),
        }
    }
}

/// Resolve selectors against the available columns
///
/// The result keeps table order and holds no duplicates. An exact name that
/// does not exist is an error; a pattern that matches nothing selects nothing.
pub fn select_columns(available: &[String], selectors: &[ColumnSelector]) -> RfmResult<Vec<String>> {
    for selector in selectors {
        if let ColumnSelector::Name(name) = selector {
            if !available.iter().any(|column| column == name) {
                return Err(RfmError::InvalidSelector(format!(
                    "no column named '{}'",
                    name
                )));
            }
        }
    }

    Ok(available
        .iter()
        .filter(|column| {
            selectors.iter().any(|selector| match selector {
                ColumnSelector::Name(name) => name == *column,
                ColumnSelector::Pattern(pattern) => pattern.is_match(column),
            })
        })
        .cloned()
        .collect())
}
