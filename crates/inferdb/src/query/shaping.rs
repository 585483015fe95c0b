//! Output reshaping: summarize, frequency tables, and histograms.
//!
//! These reduce a computed result set after the pipeline runs; they never
//! touch the backend.

use indexmap::IndexMap;

use crate::value::Value;

/// How a finished result set should be reshaped before it is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputShape {
    /// Rows as computed.
    #[default]
    Plain,
    /// Per-column descriptive statistics.
    Summarize,
    /// Distinct-value counts for the first output column.
    Freq,
    /// Binned counts for the first output column.
    Hist,
}

/// Number of bins used for numeric histograms.
const HIST_BINS: usize = 10;

/// Apply a shape to a computed result set, producing new labels and rows.
pub fn apply(
    shape: OutputShape,
    labels: Vec<String>,
    data: Vec<Vec<Value>>,
) -> (Vec<String>, Vec<Vec<Value>>) {
    match shape {
        OutputShape::Plain => (labels, data),
        OutputShape::Summarize => summarize(labels, &data),
        OutputShape::Freq => freq(labels, &data),
        OutputShape::Hist => hist(labels, &data),
    }
}

/// One statistics row per output column: count, unique count, and for
/// numeric columns min/max/mean, for the rest the modal value.
fn summarize(labels: Vec<String>, data: &[Vec<Value>]) -> (Vec<String>, Vec<Vec<Value>>) {
    let out_labels = vec![
        "column".to_string(),
        "count".to_string(),
        "unique".to_string(),
        "min".to_string(),
        "max".to_string(),
        "mean".to_string(),
        "mode".to_string(),
    ];

    let mut rows = Vec::with_capacity(labels.len());
    for (position, label) in labels.iter().enumerate() {
        let cells: Vec<&Value> = data
            .iter()
            .map(|row| &row[position])
            .filter(|v| !v.is_missing())
            .collect();

        let numbers: Vec<f64> = cells.iter().filter_map(|v| v.as_f64()).collect();
        let (min, max, mean) = if numbers.len() == cells.len() && !numbers.is_empty() {
            let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
            let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
            (Value::Number(min), Value::Number(max), Value::Number(mean))
        } else {
            (Value::Missing, Value::Missing, Value::Missing)
        };

        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for cell in &cells {
            *counts.entry(cell.to_string()).or_insert(0) += 1;
        }
        let unique = counts.len();
        let mode = counts
            .iter()
            .max_by_key(|&(_, &count)| count)
            .map(|(value, _)| Value::Text(value.clone()))
            .unwrap_or(Value::Missing);

        rows.push(vec![
            Value::Text(label.clone()),
            Value::Number(cells.len() as f64),
            Value::Number(unique as f64),
            min,
            max,
            mean,
            mode,
        ]);
    }

    (out_labels, rows)
}

/// Distinct-value counts for the first output column, most frequent first.
/// Ties keep first-seen order.
fn freq(labels: Vec<String>, data: &[Vec<Value>]) -> (Vec<String>, Vec<Vec<Value>>) {
    let Some(label) = labels.into_iter().next() else {
        return (Vec::new(), Vec::new());
    };

    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for row in data {
        if row[0].is_missing() {
            continue;
        }
        *counts.entry(row[0].to_string()).or_insert(0) += 1;
    }
    let total: usize = counts.values().sum();

    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|(_, a), (_, b)| b.cmp(a));

    let rows = entries
        .into_iter()
        .map(|(value, count)| {
            vec![
                Value::Text(value),
                Value::Number(count as f64),
                Value::Number(count as f64 / total.max(1) as f64),
            ]
        })
        .collect();

    (
        vec![label, "frequency".to_string(), "probability".to_string()],
        rows,
    )
}

/// Binned counts for the first output column. Numeric values are split into
/// equal-width bins over the observed range; non-numeric data falls back to
/// a frequency table.
fn hist(labels: Vec<String>, data: &[Vec<Value>]) -> (Vec<String>, Vec<Vec<Value>>) {
    let Some(label) = labels.first().cloned() else {
        return (Vec::new(), Vec::new());
    };

    let numbers: Vec<f64> = data
        .iter()
        .filter_map(|row| row[0].as_f64())
        .collect();
    let observed: usize = data.iter().filter(|row| !row[0].is_missing()).count();
    if numbers.len() != observed || numbers.is_empty() {
        return freq(labels, data);
    }

    let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
    let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = if max > min {
        (max - min) / HIST_BINS as f64
    } else {
        1.0
    };

    let mut bins = vec![0usize; HIST_BINS];
    for &value in &numbers {
        let index = (((value - min) / width) as usize).min(HIST_BINS - 1);
        bins[index] += 1;
    }

    let rows = bins
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let lo = min + width * i as f64;
            let hi = min + width * (i + 1) as f64;
            vec![
                Value::Text(format!("[{:.3}, {:.3})", lo, hi)),
                Value::Number(count as f64),
            ]
        })
        .collect();

    (vec![label, "count".to_string()], rows)
}
