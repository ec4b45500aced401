//! Request outcome counters and generation latency.
//!
//! Every observation goes to two places: the global `metrics` recorder (scraped
//! from `/metrics`) and a local histogram served as JSON from `/v1/stats`.

use hdrhistogram::Histogram;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the process-wide Prometheus recorder. Later calls return the same handle.
pub fn prometheus_handle() -> anyhow::Result<PrometheusHandle> {
    PROMETHEUS
        .get_or_try_init(|| PrometheusBuilder::new().install_recorder())
        .cloned()
        .map_err(|e| anyhow::anyhow!("install prometheus recorder: {e}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    InvalidInput,
    BackendFailure,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::InvalidInput => "invalid_input",
            Outcome::BackendFailure => "backend_failure",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub success: u64,
    pub invalid_input: u64,
    pub backend_failure: u64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub max_ms: u64,
}

struct Inner {
    hist: Histogram<u64>,
    success: u64,
    invalid_input: u64,
    backend_failure: u64,
}

pub struct Stats {
    inner: Mutex<Inner>,
}

impl Stats {
    pub fn new() -> anyhow::Result<Self> {
        // 1 ms .. 1 h, 3 significant figures
        let hist = Histogram::new_with_bounds(1, 3_600_000, 3)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                hist,
                success: 0,
                invalid_input: 0,
                backend_failure: 0,
            }),
        })
    }

    pub fn record(&self, outcome: Outcome, elapsed: Option<Duration>) {
        metrics::counter!("blogbot_requests_total", "outcome" => outcome.label()).increment(1);
        if let Some(d) = elapsed {
            metrics::histogram!("blogbot_generation_seconds").record(d.as_secs_f64());
        }

        let mut inner = self.inner.lock();
        match outcome {
            Outcome::Success => inner.success += 1,
            Outcome::InvalidInput => inner.invalid_input += 1,
            Outcome::BackendFailure => inner.backend_failure += 1,
        }
        if let Some(d) = elapsed {
            let ms = (d.as_millis() as u64).max(1);
            inner.hist.saturating_record(ms);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock();
        let q = |p: f64| {
            if inner.hist.is_empty() {
                0
            } else {
                inner.hist.value_at_quantile(p)
            }
        };
        StatsSnapshot {
            success: inner.success,
            invalid_input: inner.invalid_input,
            backend_failure: inner.backend_failure,
            p50_ms: q(0.50),
            p95_ms: q(0.95),
            p99_ms: q(0.99),
            max_ms: if inner.hist.is_empty() { 0 } else { inner.hist.max() },
        }
    }
}
