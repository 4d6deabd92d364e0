//! Windowed-quantile summary collectors.
//!
//! The prometheus crate ships no summary type, so these implement
//! `prometheus::core::Collector` directly: each series keeps the most
//! recent observations in a sliding window and computes quantiles from the
//! sorted window at collect time. `sample_count` and `sample_sum` cover all
//! observations ever made, not just the window.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto;

use promux_core::error::{PromuxError, Result};

/// Observations retained per series for quantile estimation.
const WINDOW: usize = 1024;

#[derive(Default)]
struct Series {
    count: u64,
    sum: f64,
    window: VecDeque<f64>,
}

impl Series {
    fn observe(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
        if self.window.len() == WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(v);
    }

    fn to_proto(&self, quantiles: &[f64]) -> proto::Summary {
        let mut sorted: Vec<f64> = self.window.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let mut summary = proto::Summary::default();
        summary.set_sample_count(self.count);
        summary.set_sample_sum(self.sum);
        for &q in quantiles {
            let mut quantile = proto::Quantile::default();
            quantile.set_quantile(q);
            quantile.set_value(window_quantile(&sorted, q));
            summary.mut_quantile().push(quantile);
        }
        summary
    }
}

// NaN when the window is empty, matching summary exposition conventions.
fn window_quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (q * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Scalar summary collector.
#[derive(Clone)]
pub struct Summary {
    inner: Arc<SummaryInner>,
}

struct SummaryInner {
    desc: Desc,
    quantiles: Vec<f64>,
    series: Mutex<Series>,
}

impl Summary {
    pub fn new(name: &str, help: &str, quantiles: Vec<f64>) -> Result<Self> {
        let desc = Desc::new(name.to_string(), help.to_string(), Vec::new(), HashMap::new())
            .map_err(|e| PromuxError::Registration(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(SummaryInner {
                desc,
                quantiles,
                series: Mutex::new(Series::default()),
            }),
        })
    }

    pub fn observe(&self, v: f64) {
        self.inner.series.lock().observe(v);
    }
}

impl Collector for Summary {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.inner.desc]
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let mut metric = proto::Metric::default();
        metric.set_summary(self.inner.series.lock().to_proto(&self.inner.quantiles));

        let mut family = proto::MetricFamily::default();
        family.set_name(self.inner.desc.fq_name.clone());
        family.set_help(self.inner.desc.help.clone());
        family.set_field_type(proto::MetricType::SUMMARY);
        family.mut_metric().push(metric);
        vec![family]
    }
}

/// Summary collector keyed by label values, one independent series per
/// distinct tuple.
#[derive(Clone)]
pub struct SummaryVec {
    inner: Arc<SummaryVecInner>,
}

struct SummaryVecInner {
    desc: Desc,
    quantiles: Vec<f64>,
    children: Mutex<HashMap<Vec<String>, Series>>,
}

impl SummaryVec {
    pub fn new(name: &str, help: &str, labels: &[String], quantiles: Vec<f64>) -> Result<Self> {
        let desc = Desc::new(
            name.to_string(),
            help.to_string(),
            labels.to_vec(),
            HashMap::new(),
        )
        .map_err(|e| PromuxError::Registration(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(SummaryVecInner {
                desc,
                quantiles,
                children: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Record an observation for one label-value tuple. The caller has
    /// already checked the arity against the spec.
    pub fn observe(&self, label_values: &[String], v: f64) {
        let mut children = self.inner.children.lock();
        children
            .entry(label_values.to_vec())
            .or_default()
            .observe(v);
    }
}

impl Collector for SummaryVec {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.inner.desc]
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let children = self.inner.children.lock();
        // deterministic series order for scrapes and tests
        let mut entries: Vec<(&Vec<String>, &Series)> = children.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut family = proto::MetricFamily::default();
        family.set_name(self.inner.desc.fq_name.clone());
        family.set_help(self.inner.desc.help.clone());
        family.set_field_type(proto::MetricType::SUMMARY);
        for (label_values, series) in entries {
            let mut metric = proto::Metric::default();
            for (name, value) in self.inner.desc.variable_labels.iter().zip(label_values) {
                let mut pair = proto::LabelPair::default();
                pair.set_name(name.clone());
                pair.set_value(value.clone());
                metric.mut_label().push(pair);
            }
            metric.set_summary(series.to_proto(&self.inner.quantiles));
            family.mut_metric().push(metric);
        }
        vec![family]
    }
}
