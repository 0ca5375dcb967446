/*!
Observability infrastructure for Prefstore.

This module provides:
- Structured logging setup on top of `tracing-subscriber`
- Prometheus metrics for the auto-save engine (behind the `metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Instant;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{PrefError, Result};

/// Directive applied on top of `RUST_LOG`
pub const DEFAULT_DIRECTIVE: &str = "prefstore=info";

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<PrefStoreMetrics> = OnceLock::new();

/// Metrics collection for the auto-save engine
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct PrefStoreMetrics {
    pub autosave_writes_total: Counter,
    pub autosave_write_failures_total: Counter,
    pub autosave_coalesced_total: Counter,
    pub autosave_write_seconds: Histogram,
    pub document_size_bytes: Histogram,

    // Prometheus registry for scraping
    registry: Registry,
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| PrefError::storage(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| PrefError::storage(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
fn histogram(registry: &Registry, opts: HistogramOpts) -> Result<Histogram> {
    let name = opts.common_opts.name.clone();
    let histogram = Histogram::with_opts(opts)
        .map_err(|e| PrefError::storage(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(histogram.clone()))
        .map_err(|e| PrefError::storage(format!("Failed to register {name}: {e}")))?;
    Ok(histogram)
}

#[cfg(feature = "metrics")]
impl PrefStoreMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let autosave_writes_total = counter(
            &registry,
            "prefstore_autosave_writes_total",
            "Rotation file writes completed by the auto-save engine",
        )?;
        let autosave_write_failures_total = counter(
            &registry,
            "prefstore_autosave_write_failures_total",
            "Rotation file writes that failed and were left for retry",
        )?;
        let autosave_coalesced_total = counter(
            &registry,
            "prefstore_autosave_coalesced_total",
            "Queued snapshots superseded before they were written",
        )?;
        let autosave_write_seconds = histogram(
            &registry,
            HistogramOpts::new(
                "prefstore_autosave_write_seconds",
                "Duration of one rotation write including fsync",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        let document_size_bytes = histogram(
            &registry,
            HistogramOpts::new(
                "prefstore_document_size_bytes",
                "Size of serialized settings documents in bytes",
            )
            .buckets(prometheus::exponential_buckets(256.0, 4.0, 8).map_err(|e| {
                PrefError::storage(format!("Failed to build size buckets: {e}"))
            })?),
        )?;

        Ok(Self {
            autosave_writes_total,
            autosave_write_failures_total,
            autosave_coalesced_total,
            autosave_write_seconds,
            document_size_bytes,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static PrefStoreMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize Prefstore metrics"))
    }

    pub fn record_write(&self, duration: std::time::Duration, size_bytes: usize) {
        self.autosave_writes_total.inc();
        self.autosave_write_seconds.observe(duration.as_secs_f64());
        self.document_size_bytes.observe(size_bytes as f64);
    }

    pub fn record_write_failure(&self, duration: std::time::Duration) {
        self.autosave_write_failures_total.inc();
        self.autosave_write_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_coalesced(&self, count: u64) {
        if count > 0 {
            self.autosave_coalesced_total.inc_by(count as f64);
        }
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| PrefError::storage(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| PrefError::storage(format!("Failed to convert metrics to string: {e}")))
    }
}

/// Gather the global metrics in Prometheus text format
#[cfg(feature = "metrics")]
pub fn gather_metrics() -> Result<String> {
    PrefStoreMetrics::global().gather_metrics()
}

/// Times one rotation write
#[cfg(feature = "metrics")]
pub struct MetricsTimer {
    start: Instant,
}

#[cfg(feature = "metrics")]
impl MetricsTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Complete the timer, recording a successful write of `size_bytes`
    pub fn finish(self, size_bytes: usize) {
        PrefStoreMetrics::global().record_write(self.start.elapsed(), size_bytes);
    }

    /// Complete the timer, recording a failed write
    pub fn finish_with_error(self) {
        PrefStoreMetrics::global().record_write_failure(self.start.elapsed());
    }
}

/// Initialize the global tracing subscriber
///
/// Honours `RUST_LOG` and adds the `prefstore=info` directive on top of it.
///
/// # Arguments
/// * `json` - Emit JSON lines instead of human-readable text
///
/// # Returns
/// An error if a global subscriber was already installed
pub fn init_observability(json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    PrefStoreMetrics::global();

    let directive = DEFAULT_DIRECTIVE
        .parse()
        .map_err(|e| PrefError::config(format!("Invalid log directive: {e}")))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let result = if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(false);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    };
    result.map_err(|e| PrefError::config(format!("Failed to set global tracing subscriber: {e}")))?;

    tracing::debug!("Prefstore observability initialized");
    Ok(())
}

/// Initialize observability with default settings
pub fn init_default_observability() -> Result<()> {
    init_observability(false)
}
