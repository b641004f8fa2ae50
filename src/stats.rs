//! Distribution and rank-correlation helpers for the report

use crate::error::{RfmError, RfmResult};
use ndarray::Array2;
use serde::Serialize;
use std::cmp::Ordering;

/// One equal-width histogram bin, `[lower, upper)` except the last which is closed
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Count `values` into `bins` equal-width bins spanning their min..max
///
/// A constant column produces a single bin of width one centred on the value.
pub fn histogram(values: &[f64], bins: usize) -> RfmResult<Vec<HistogramBin>> {
    if bins == 0 {
        return Err(RfmError::invalid_input("bins", "must be greater than zero"));
    }
    if values.is_empty() {
        return Ok(Vec::new());
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(RfmError::invalid_input(
            "histogram",
            "values must be finite numbers",
        ));
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if min == max {
        return Ok(vec![HistogramBin {
            lower: min - 0.5,
            upper: max + 0.5,
            count: values.len(),
        }]);
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &value in values {
        let index = (((value - min) / width) as usize).min(bins - 1);
        counts[index] += 1;
    }

    Ok(counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min + width * i as f64,
            upper: if i + 1 == bins {
                max
            } else {
                min + width * (i + 1) as f64
            },
            count,
        })
        .collect())
}

/// Ranks starting at 1, tied values share the average of their positions
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(Ordering::Equal)
    });

    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start;
        while end + 1 < n && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        // positions start..=end are 0-based, ranks are 1-based
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &index in &order[start..=end] {
            ranks[index] = rank;
        }
        start = end + 1;
    }
    ranks
}

/// Pearson correlation, NaN when either side has zero variance
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    covariance / (var_x.sqrt() * var_y.sqrt())
}

/// Spearman rank correlation between two columns
pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    pearson(&average_ranks(x), &average_ranks(y))
}

/// Square matrix of pairwise correlations with its column labels
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Array2<f64>,
}

impl CorrelationMatrix {
    /// Correlation between two named columns
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        Some(self.values[[i, j]])
    }
}

/// Pairwise Spearman correlations of named columns
///
/// Diagonal entries are 1.0; pairs involving a constant column are NaN.
pub fn spearman_matrix(columns: &[(String, Vec<f64>)]) -> RfmResult<CorrelationMatrix> {
    if let Some((first_name, first)) = columns.first() {
        if let Some((name, _)) = columns.iter().find(|(_, v)| v.len() != first.len()) {
            return Err(RfmError::invalid_input(
                name.as_str(),
                format!("length differs from column '{}'", first_name),
            ));
        }
    }

    let ranks: Vec<Vec<f64>> = columns.iter().map(|(_, v)| average_ranks(v)).collect();
    let k = columns.len();
    let mut values = Array2::<f64>::zeros((k, k));

    for i in 0..k {
        values[[i, i]] = 1.0;
        for j in (i + 1)..k {
            let rho = pearson(&ranks[i], &ranks[j]);
            values[[i, j]] = rho;
            values[[j, i]] = rho;
        }
    }

    Ok(CorrelationMatrix {
        columns: columns.iter().map(|(name, _)| name.clone()).collect(),
        values,
    })
}
