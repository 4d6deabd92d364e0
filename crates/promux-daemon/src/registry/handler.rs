//! Runtime pairing of a metric definition and a live collector.
//!
//! Eight variants behind one flat enum: {counter, gauge, histogram, summary}
//! x {scalar, vector}. A handler validates an update against its own spec
//! (method legality first, then label arity) before touching the collector,
//! so a rejected update has no side effects.

use std::time::{SystemTime, UNIX_EPOCH};

use prometheus::core::Collector;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts,
};

use promux_core::error::{PromuxError, Result};
use promux_core::protocol::spec::{MetricSpec, MetricType};
use promux_core::protocol::update::MetricUpdate;

use super::summary::{Summary, SummaryVec};

/// Fixed bucket ladder applied when a histogram spec omits `buckets`.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Fixed quantile objectives applied when a summary spec omits them.
pub const DEFAULT_OBJECTIVES: [(f64, f64); 3] = [(0.5, 0.05), (0.9, 0.01), (0.99, 0.001)];

/// One live collector plus the spec it was built from. Owned exclusively by
/// the registry.
pub enum MetricHandler {
    Counter { spec: MetricSpec, counter: Counter },
    CounterVec { spec: MetricSpec, counters: CounterVec },
    Gauge { spec: MetricSpec, gauge: Gauge },
    GaugeVec { spec: MetricSpec, gauges: GaugeVec },
    Histogram { spec: MetricSpec, histogram: Histogram },
    HistogramVec { spec: MetricSpec, histograms: HistogramVec },
    Summary { spec: MetricSpec, summary: Summary },
    SummaryVec { spec: MetricSpec, summaries: SummaryVec },
}

impl MetricHandler {
    /// Build a handler for `spec`. Label grammar and uniqueness, and
    /// objective keys, are validated here rather than at parse time, so one
    /// bad spec fails independently of its siblings.
    pub fn build(spec: MetricSpec) -> Result<Self> {
        spec.validate_labels()?;

        match spec.metric_type {
            MetricType::Counter => {
                let opts = Opts::new(spec.name.clone(), spec.help.clone());
                if spec.labels.is_empty() {
                    let counter = Counter::with_opts(opts).map_err(registration)?;
                    Ok(MetricHandler::Counter { spec, counter })
                } else {
                    let names: Vec<&str> = spec.labels.iter().map(String::as_str).collect();
                    let counters = CounterVec::new(opts, &names).map_err(registration)?;
                    Ok(MetricHandler::CounterVec { spec, counters })
                }
            }
            MetricType::Gauge => {
                let opts = Opts::new(spec.name.clone(), spec.help.clone());
                if spec.labels.is_empty() {
                    let gauge = Gauge::with_opts(opts).map_err(registration)?;
                    Ok(MetricHandler::Gauge { spec, gauge })
                } else {
                    let names: Vec<&str> = spec.labels.iter().map(String::as_str).collect();
                    let gauges = GaugeVec::new(opts, &names).map_err(registration)?;
                    Ok(MetricHandler::GaugeVec { spec, gauges })
                }
            }
            MetricType::Histogram => {
                let buckets = if spec.buckets.is_empty() {
                    DEFAULT_BUCKETS.to_vec()
                } else {
                    spec.buckets.clone()
                };
                let opts = HistogramOpts::new(spec.name.clone(), spec.help.clone()).buckets(buckets);
                if spec.labels.is_empty() {
                    let histogram = Histogram::with_opts(opts).map_err(registration)?;
                    Ok(MetricHandler::Histogram { spec, histogram })
                } else {
                    let names: Vec<&str> = spec.labels.iter().map(String::as_str).collect();
                    let histograms = HistogramVec::new(opts, &names).map_err(registration)?;
                    Ok(MetricHandler::HistogramVec { spec, histograms })
                }
            }
            MetricType::Summary => {
                let quantiles = objective_quantiles(&spec)?;
                if spec.labels.is_empty() {
                    let summary = Summary::new(&spec.name, &spec.help, quantiles)?;
                    Ok(MetricHandler::Summary { spec, summary })
                } else {
                    let summaries =
                        SummaryVec::new(&spec.name, &spec.help, &spec.labels, quantiles)?;
                    Ok(MetricHandler::SummaryVec { spec, summaries })
                }
            }
        }
    }

    /// The spec this handler was built from, for fingerprint comparison.
    pub fn spec(&self) -> &MetricSpec {
        match self {
            MetricHandler::Counter { spec, .. }
            | MetricHandler::CounterVec { spec, .. }
            | MetricHandler::Gauge { spec, .. }
            | MetricHandler::GaugeVec { spec, .. }
            | MetricHandler::Histogram { spec, .. }
            | MetricHandler::HistogramVec { spec, .. }
            | MetricHandler::Summary { spec, .. }
            | MetricHandler::SummaryVec { spec, .. } => spec,
        }
    }

    /// Cloned collector handle for exposition register/unregister.
    pub fn collector(&self) -> Box<dyn Collector> {
        match self {
            MetricHandler::Counter { counter, .. } => Box::new(counter.clone()),
            MetricHandler::CounterVec { counters, .. } => Box::new(counters.clone()),
            MetricHandler::Gauge { gauge, .. } => Box::new(gauge.clone()),
            MetricHandler::GaugeVec { gauges, .. } => Box::new(gauges.clone()),
            MetricHandler::Histogram { histogram, .. } => Box::new(histogram.clone()),
            MetricHandler::HistogramVec { histograms, .. } => Box::new(histograms.clone()),
            MetricHandler::Summary { summary, .. } => Box::new(summary.clone()),
            MetricHandler::SummaryVec { summaries, .. } => Box::new(summaries.clone()),
        }
    }

    /// Apply one update event against this handler's collector.
    pub fn apply(&self, update: &MetricUpdate) -> Result<()> {
        match self {
            MetricHandler::Counter { counter, .. } => {
                let op = counter_op(update)?;
                require_scalar(update)?;
                apply_counter(counter, op, update.value);
            }
            MetricHandler::CounterVec { spec, counters } => {
                let op = counter_op(update)?;
                let values = require_vector(spec, update)?;
                let counter = counters
                    .get_metric_with_label_values(&values)
                    .map_err(registration)?;
                apply_counter(&counter, op, update.value);
            }
            MetricHandler::Gauge { gauge, .. } => {
                let op = gauge_op(update)?;
                require_scalar(update)?;
                apply_gauge(gauge, op, update.value);
            }
            MetricHandler::GaugeVec { spec, gauges } => {
                let op = gauge_op(update)?;
                let values = require_vector(spec, update)?;
                let gauge = gauges
                    .get_metric_with_label_values(&values)
                    .map_err(registration)?;
                apply_gauge(&gauge, op, update.value);
            }
            MetricHandler::Histogram { histogram, .. } => {
                observe_op(update, "histogram")?;
                require_scalar(update)?;
                histogram.observe(update.value);
            }
            MetricHandler::HistogramVec { spec, histograms } => {
                observe_op(update, "histogram")?;
                let values = require_vector(spec, update)?;
                let histogram = histograms
                    .get_metric_with_label_values(&values)
                    .map_err(registration)?;
                histogram.observe(update.value);
            }
            MetricHandler::Summary { summary, .. } => {
                observe_op(update, "summary")?;
                require_scalar(update)?;
                summary.observe(update.value);
            }
            MetricHandler::SummaryVec { spec, summaries } => {
                observe_op(update, "summary")?;
                require_vector(spec, update)?;
                summaries.observe(&update.label_values, update.value);
            }
        }
        Ok(())
    }
}

enum CounterOp {
    Inc,
    Add,
}

enum GaugeOp {
    Set,
    Inc,
    Dec,
    Add,
    Sub,
    SetToCurrentTime,
}

fn counter_op(update: &MetricUpdate) -> Result<CounterOp> {
    match update.method.as_str() {
        "inc" => Ok(CounterOp::Inc),
        "add" => Ok(CounterOp::Add),
        method => Err(unknown_method(method, "counter")),
    }
}

fn gauge_op(update: &MetricUpdate) -> Result<GaugeOp> {
    match update.method.as_str() {
        "set" => Ok(GaugeOp::Set),
        "inc" => Ok(GaugeOp::Inc),
        "dec" => Ok(GaugeOp::Dec),
        "add" => Ok(GaugeOp::Add),
        "sub" => Ok(GaugeOp::Sub),
        "set_to_current_time" => Ok(GaugeOp::SetToCurrentTime),
        method => Err(unknown_method(method, "gauge")),
    }
}

fn observe_op(update: &MetricUpdate, family: &str) -> Result<()> {
    if update.method == "observe" {
        Ok(())
    } else {
        Err(unknown_method(&update.method, family))
    }
}

fn apply_counter(counter: &Counter, op: CounterOp, value: f64) {
    match op {
        CounterOp::Inc => counter.inc(),
        CounterOp::Add => counter.inc_by(value),
    }
}

fn apply_gauge(gauge: &Gauge, op: GaugeOp, value: f64) {
    match op {
        GaugeOp::Set => gauge.set(value),
        GaugeOp::Inc => gauge.inc(),
        GaugeOp::Dec => gauge.dec(),
        GaugeOp::Add => gauge.add(value),
        GaugeOp::Sub => gauge.sub(value),
        // value is ignored for this method
        GaugeOp::SetToCurrentTime => gauge.set(unix_seconds()),
    }
}

fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// Scalar targets reject label values outright instead of ignoring them;
// a sender that forgot to configure a vector target should hear about it.
fn require_scalar(update: &MetricUpdate) -> Result<()> {
    if update.label_values.is_empty() {
        Ok(())
    } else {
        Err(PromuxError::Validation(format!(
            "metric '{}' takes no label values but got {}",
            update.name,
            update.label_values.len()
        )))
    }
}

fn require_vector<'a>(spec: &MetricSpec, update: &'a MetricUpdate) -> Result<Vec<&'a str>> {
    if update.label_values.len() != spec.labels.len() {
        return Err(PromuxError::Validation(format!(
            "metric '{}' expects {} label values but got {}",
            update.name,
            spec.labels.len(),
            update.label_values.len()
        )));
    }
    Ok(update.label_values.iter().map(String::as_str).collect())
}

fn unknown_method(method: &str, family: &str) -> PromuxError {
    PromuxError::Validation(format!(
        "method '{method}' is not valid for {family} metrics"
    ))
}

fn objective_quantiles(spec: &MetricSpec) -> Result<Vec<f64>> {
    if spec.objectives.is_empty() {
        return Ok(DEFAULT_OBJECTIVES.iter().map(|(q, _)| *q).collect());
    }
    let mut quantiles = Vec::with_capacity(spec.objectives.len());
    for key in spec.objectives.keys() {
        let q: f64 = key.parse().map_err(|_| {
            PromuxError::Validation(format!(
                "objective quantile '{key}' in metric '{}' is not a number",
                spec.name
            ))
        })?;
        quantiles.push(q);
    }
    quantiles.sort_by(f64::total_cmp);
    Ok(quantiles)
}

fn registration(e: prometheus::Error) -> PromuxError {
    PromuxError::Registration(e.to_string())
}
