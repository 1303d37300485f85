//! Box-plot summaries and histogram bins over accumulated series.

use serde::Serialize;

use crate::stats::{DeviationStats, Metric, View};

/// Histogram resolution used by the reports unless configured otherwise.
pub const DEFAULT_BINS: usize = 75;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FiveNumberSummary {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub count: usize,
}

impl FiveNumberSummary {
    /// Summarize the finite values of `data`. `None` when there are none.
    pub fn from_values(data: &[f64]) -> Option<Self> {
        let sorted = finite_sorted(data);
        if sorted.is_empty() {
            return None;
        }
        Some(Self {
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
            count: sorted.len(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub bin_width: f64,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Equal-width bins spanning the finite values of `data`. The maximum
    /// lands in the last bin. `None` for empty input or zero bins.
    pub fn from_values(data: &[f64], bins: usize) -> Option<Self> {
        if bins == 0 {
            return None;
        }
        let sorted = finite_sorted(data);
        let (&min, &max) = (sorted.first()?, sorted.last()?);

        let range = max - min;
        if range == 0.0 {
            return Some(Self {
                min,
                max,
                bin_width: 0.0,
                counts: vec![sorted.len()],
            });
        }

        let bin_width = range / bins as f64;
        let mut counts = vec![0usize; bins];
        for v in &sorted {
            let idx = (((v - min) / bin_width).floor() as usize).min(bins - 1);
            counts[idx] += 1;
        }

        Some(Self {
            min,
            max,
            bin_width,
            counts,
        })
    }

    /// Lower edge of bin `i`.
    pub fn bin_start(&self, i: usize) -> f64 {
        self.min + self.bin_width * i as f64
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Linear-interpolation quantile over sorted data, `pos = p × (n − 1)`.
/// NaN for empty input.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    match n {
        0 => return f64::NAN,
        1 => return sorted[0],
        _ => {}
    }
    let pos = p.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn finite_sorted(data: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// One view of one metric: per-file summaries plus the pooled histogram.
#[derive(Debug, Clone, Serialize)]
pub struct ViewReport {
    pub view: View,
    pub per_file: Vec<Option<FiveNumberSummary>>,
    pub histogram: Option<Histogram>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricReport {
    pub metric: Metric,
    pub unit: &'static str,
    pub views: Vec<ViewReport>,
}

impl MetricReport {
    pub fn view(&self, view: View) -> Option<&ViewReport> {
        self.views.iter().find(|v| v.view == view)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub files: Vec<String>,
    pub out_of_order_notes: usize,
    pub metrics: Vec<MetricReport>,
}

impl SessionReport {
    pub fn build(stats: &DeviationStats, files: &[String], bins: usize) -> Self {
        let metrics = Metric::ALL
            .iter()
            .map(|&metric| MetricReport {
                metric,
                unit: metric.unit(),
                views: View::ALL
                    .iter()
                    .map(|&view| {
                        let per_file = stats.get(metric, view, |_| true).per_file();
                        let pooled: Vec<f64> = per_file.iter().flatten().copied().collect();
                        ViewReport {
                            view,
                            per_file: per_file
                                .iter()
                                .map(|s| FiveNumberSummary::from_values(s))
                                .collect(),
                            histogram: Histogram::from_values(&pooled, bins),
                        }
                    })
                    .collect(),
            })
            .collect();

        Self {
            files: files.to_vec(),
            out_of_order_notes: stats.out_of_order_notes(),
            metrics,
        }
    }

    pub fn metric(&self, metric: Metric) -> Option<&MetricReport> {
        self.metrics.iter().find(|m| m.metric == metric)
    }
}
