//! Report generation: distribution charts, correlation heatmaps and segment sizes using Plotters

use crate::config::{AppConfig, ScoringConfig};
use crate::data::{self, TOTAL_FREQUENCY, TOTAL_MONETARY};
use crate::error::{RfmError, RfmResult};
use crate::model::{Derivation, RfmBoundaries, SegmentShare};
use crate::segment::RfmCategory;
use crate::stats::{histogram, spearman_matrix, CorrelationMatrix, HistogramBin};
use anyhow::Context;
use chrono::{DateTime, Utc};
use plotters::prelude::*;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Color palette for the segment bars, in rule order
const SEGMENT_COLORS: [RGBColor; 9] = [
    RGBColor(31, 119, 180),
    RGBColor(44, 160, 44),
    RGBColor(148, 103, 189),
    RGBColor(255, 127, 14),
    RGBColor(23, 190, 207),
    RGBColor(188, 189, 34),
    RGBColor(214, 39, 40),
    RGBColor(127, 127, 127),
    RGBColor(140, 86, 75),
];

/// Customer IDs listed per segment in the summary
pub const SAMPLE_IDS: usize = 5;

/// Contents of `summary.json`
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub generated_at: DateTime<Utc>,
    pub customers: usize,
    pub scoring: ScoringConfig,
    pub boundaries: RfmBoundaries,
    pub segments: Vec<SegmentShare>,
    /// Present only when an ID field is configured
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub samples: Vec<SegmentSample>,
}

/// The first customers of one segment, in row order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSample {
    pub category: RfmCategory,
    pub ids: Vec<String>,
}

impl ReportSummary {
    pub fn new(derivation: &Derivation) -> Self {
        Self {
            generated_at: Utc::now(),
            customers: derivation.len(),
            scoring: derivation.scoring,
            boundaries: derivation.boundaries,
            segments: derivation.segment_summary(),
            samples: Vec::new(),
        }
    }

    /// Attach up to [`SAMPLE_IDS`] customer IDs per non-empty segment
    ///
    /// `ids` holds one entry per derived record, in the same order.
    pub fn with_samples(mut self, derivation: &Derivation, ids: &[String]) -> RfmResult<Self> {
        if ids.len() != derivation.len() {
            return Err(RfmError::invalid_input(
                "fields.id",
                format!("{} IDs for {} records", ids.len(), derivation.len()),
            ));
        }

        self.samples = RfmCategory::ALL
            .iter()
            .filter_map(|&category| {
                let picked: Vec<String> = derivation
                    .records
                    .iter()
                    .zip(ids)
                    .filter(|(record, _)| record.category == category)
                    .map(|(_, id)| id.clone())
                    .take(SAMPLE_IDS)
                    .collect();
                (!picked.is_empty()).then_some(SegmentSample {
                    category,
                    ids: picked,
                })
            })
            .collect();
        Ok(self)
    }
}

/// Files written by [`generate_report`]
#[derive(Debug, Clone, Default)]
pub struct ReportOutputs {
    pub derived_csv: PathBuf,
    pub summary_json: PathBuf,
    pub charts: Vec<PathBuf>,
}

/// Columns histogrammed when none are selected: Recency, purchase channels with
/// their total, spend categories with their total
pub fn default_histogram_columns(config: &AppConfig) -> Vec<String> {
    let mut columns = vec![config.fields.recency.clone()];
    columns.extend(config.fields.purchases.iter().cloned());
    columns.push(TOTAL_FREQUENCY.to_string());
    columns.extend(config.fields.spend.iter().cloned());
    columns.push(TOTAL_MONETARY.to_string());
    columns
}

/// Replace characters that are awkward in file names
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Draw a histogram of one column
///
/// # Arguments
/// * `column` - Column name, used as the x axis description
/// * `bins` - Pre-computed histogram bins
/// * `output_path` - Path to save the PNG plot
/// * `size` - Width and height in pixels
pub fn create_histogram_chart(
    column: &str,
    bins: &[HistogramBin],
    output_path: &Path,
    size: (u32, u32),
) -> crate::Result<()> {
    let x_min = bins.first().map(|b| b.lower).unwrap_or(0.0);
    let x_max = bins.last().map(|b| b.upper).unwrap_or(1.0);
    let y_max = bins.iter().map(|b| b.count).max().unwrap_or(0).max(1) as f64;

    let root = BitMapBackend::new(output_path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Distribution of {}", column), ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, 0f64..(y_max * 1.1))?;

    chart
        .configure_mesh()
        .x_desc(column)
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(bins.iter().map(|bin| {
        Rectangle::new(
            [(bin.lower, 0.0), (bin.upper, bin.count as f64)],
            SEGMENT_COLORS[0].mix(0.8).filled(),
        )
    }))?;

    root.present()?;
    info!(path = %output_path.display(), "Histogram saved");
    Ok(())
}

/// Map a correlation in [-1, 1] to white..red for positive and white..blue for negative
fn correlation_color(value: f64) -> RGBColor {
    if value.is_nan() {
        return RGBColor(200, 200, 200);
    }
    let strength = value.abs().min(1.0);
    let fade = (255.0 * (1.0 - strength)) as u8;
    if value >= 0.0 {
        RGBColor(255, fade, fade)
    } else {
        RGBColor(fade, fade, 255)
    }
}

/// Draw a correlation matrix as an annotated heatmap
pub fn create_correlation_heatmap(
    matrix: &CorrelationMatrix,
    title: &str,
    output_path: &Path,
    size: (u32, u32),
) -> crate::Result<()> {
    let k = matrix.columns.len() as i32;
    let names = &matrix.columns;
    let label = |value: &SegmentValue<i32>| match value {
        SegmentValue::CenterOf(i) => names.get(*i as usize).cloned().unwrap_or_default(),
        _ => String::new(),
    };

    let root = BitMapBackend::new(output_path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(140)
        .build_cartesian_2d((0..k).into_segmented(), (0..k).into_segmented())?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(k as usize)
        .y_labels(k as usize)
        .x_label_formatter(&label)
        .y_label_formatter(&label)
        .draw()?;

    for i in 0..k {
        for j in 0..k {
            let value = matrix.values[[i as usize, j as usize]];
            chart.draw_series(std::iter::once(Rectangle::new(
                [
                    (SegmentValue::Exact(j), SegmentValue::Exact(i)),
                    (SegmentValue::Exact(j + 1), SegmentValue::Exact(i + 1)),
                ],
                correlation_color(value).filled(),
            )))?;
            chart.draw_series(std::iter::once(Text::new(
                format!("{:.2}", value),
                (SegmentValue::CenterOf(j), SegmentValue::CenterOf(i)),
                ("sans-serif", 15),
            )))?;
        }
    }

    root.present()?;
    info!(path = %output_path.display(), "Correlation heatmap saved");
    Ok(())
}

/// Bar chart of customers per segment
pub fn create_segment_chart(
    segments: &[SegmentShare],
    output_path: &Path,
    size: (u32, u32),
) -> crate::Result<()> {
    let n = segments.len() as i32;
    let max_count = segments.iter().map(|s| s.count).max().unwrap_or(0).max(1) as f64;
    let label = |value: &SegmentValue<i32>| match value {
        SegmentValue::CenterOf(i) => segments
            .get(*i as usize)
            .map(|s| s.category.to_string())
            .unwrap_or_default(),
        _ => String::new(),
    };

    let root = BitMapBackend::new(output_path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Customers per RFM Segment", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d((0..n).into_segmented(), 0f64..(max_count * 1.1))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(n as usize)
        .x_label_formatter(&label)
        .x_desc("Segment")
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (i, segment) in segments.iter().enumerate() {
        let color = SEGMENT_COLORS[i % SEGMENT_COLORS.len()];
        let i = i as i32;
        chart.draw_series(std::iter::once(Rectangle::new(
            [
                (SegmentValue::Exact(i), 0.0),
                (SegmentValue::Exact(i + 1), segment.count as f64),
            ],
            color.filled(),
        )))?;
    }

    root.present()?;
    info!(path = %output_path.display(), "Segment chart saved");
    Ok(())
}

/// Print segment sizes and quartile boundaries to the console
pub fn print_segment_statistics(derivation: &Derivation) {
    let total = derivation.len();
    println!("\n=== RFM Segments ===");
    println!("Total customers: {}", total);
    println!("Quartile method: {:?}", derivation.scoring.method);

    println!("\nQuartile boundaries:");
    println!("  Metric    |      Min |       Q1 |   Median |       Q3 |      Max");
    println!("  ----------|----------|----------|----------|----------|---------");
    for b in [
        &derivation.boundaries.recency,
        &derivation.boundaries.frequency,
        &derivation.boundaries.monetary,
    ] {
        println!(
            "  {:9} | {:8.2} | {:8.2} | {:8.2} | {:8.2} | {:8.2}",
            b.metric.name(),
            b.min,
            b.q1,
            b.median,
            b.q3,
            b.max
        );
    }

    println!("\nSegment sizes:");
    for segment in derivation.segment_summary() {
        println!(
            "  {:10} {:6} customers ({:.1}%)",
            segment.category.as_str(),
            segment.count,
            segment.share * 100.0
        );
    }
}

/// Generate the full report into `config.report.output_dir`
///
/// Writes the augmented table, `summary.json`, one histogram per column in
/// `histogram_columns`, the purchase and spend correlation heatmaps and the
/// segment size chart.
///
/// # Arguments
/// * `augmented` - Input table with derived columns appended
/// * `derivation` - Derivation the table was augmented with
/// * `config` - Field names and report settings
/// * `histogram_columns` - Columns to histogram (must exist in `augmented`)
pub fn generate_report(
    augmented: &DataFrame,
    derivation: &Derivation,
    config: &AppConfig,
    histogram_columns: &[String],
) -> crate::Result<ReportOutputs> {
    let output_dir = Path::new(&config.report.output_dir);
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let size = (config.report.chart_width, config.report.chart_height);
    let mut outputs = ReportOutputs {
        derived_csv: output_dir.join(&config.report.derived_csv),
        summary_json: output_dir.join("summary.json"),
        charts: Vec::new(),
    };

    // Step 1: Derived table and summary
    data::write_csv(augmented, &outputs.derived_csv)?;
    let mut summary = ReportSummary::new(derivation);
    if let Some(id_field) = &config.fields.id {
        let ids = data::text_column(augmented, id_field)?;
        summary = summary.with_samples(derivation, &ids)?;
    }
    fs::write(&outputs.summary_json, serde_json::to_string_pretty(&summary)?)?;

    // Step 2: Distributions
    for column in histogram_columns {
        let values = data::numeric_column(augmented, column)?;
        let bins = histogram(&values, config.report.histogram_bins)?;
        let path = output_dir.join(format!("hist_{}.png", file_stem(column)));
        create_histogram_chart(column, &bins, &path, size)?;
        outputs.charts.push(path);
    }

    // Step 3: Rank correlations between purchase channels and between products
    for (title, file_name, columns) in [
        (
            "Correlation between places (number of purchases)",
            "corr_purchases.png",
            &config.fields.purchases,
        ),
        (
            "Correlation between products (amount spent)",
            "corr_spend.png",
            &config.fields.spend,
        ),
    ] {
        let named = columns
            .iter()
            .map(|name| Ok((name.clone(), data::numeric_column(augmented, name)?)))
            .collect::<crate::Result<Vec<_>>>()?;
        let matrix = spearman_matrix(&named)?;
        let path = output_dir.join(file_name);
        create_correlation_heatmap(&matrix, title, &path, size)?;
        outputs.charts.push(path);
    }

    // Step 4: Segment sizes
    let path = output_dir.join("segments.png");
    create_segment_chart(&summary.segments, &path, size)?;
    outputs.charts.push(path);

    print_segment_statistics(derivation);

    Ok(outputs)
}
