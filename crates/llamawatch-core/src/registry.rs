//! Exported metric values and their Prometheus text exposition.
//!
//! Each named value is a `prometheus` atomic (`Gauge` holds an f64,
//! `IntCounter` a u64), so a write replaces one value as a unit and a
//! concurrent `render` can never observe a half-written sample. Values of
//! different metrics may come from different cycles within one render.
//!
//! Metric names form a closed enum: an unknown name cannot be passed in.

use prometheus::{Encoder, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder};
use tracing::error;

/// Content type of [`MetricsRegistry::render`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Gauges exported by the watchdog (last write wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gauge {
    Up,
    ActiveSlots,
    TotalSlots,
    CpuUsagePercent,
    MemoryUsageBytes,
    ModelLoaded,
    ProcessObserved,
    CycleDurationSeconds,
}

impl Gauge {
    pub const ALL: [Gauge; 8] = [
        Gauge::Up,
        Gauge::ActiveSlots,
        Gauge::TotalSlots,
        Gauge::CpuUsagePercent,
        Gauge::MemoryUsageBytes,
        Gauge::ModelLoaded,
        Gauge::ProcessObserved,
        Gauge::CycleDurationSeconds,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Gauge::Up => "up",
            Gauge::ActiveSlots => "active_slots",
            Gauge::TotalSlots => "total_slots",
            Gauge::CpuUsagePercent => "cpu_usage_percent",
            Gauge::MemoryUsageBytes => "memory_usage_bytes",
            Gauge::ModelLoaded => "model_loaded",
            Gauge::ProcessObserved => "process_observed",
            Gauge::CycleDurationSeconds => "watchdog_cycle_duration_seconds",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Gauge::Up => "Whether the inference server answered its health endpoint (1) or not (0).",
            Gauge::ActiveSlots => "Number of server slots currently processing a request.",
            Gauge::TotalSlots => "Number of slots reported by the server.",
            Gauge::CpuUsagePercent => "CPU usage of the server process in percent of one core.",
            Gauge::MemoryUsageBytes => "Resident memory of the server process in bytes.",
            Gauge::ModelLoaded => "Whether the server reports its model as loaded (1) or not (0).",
            Gauge::ProcessObserved => "Whether the server process was sampled in the last cycle.",
            Gauge::CycleDurationSeconds => "Wall time of the last watchdog cycle in seconds.",
        }
    }
}

/// Counters exported by the watchdog (monotonic for the process lifetime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    RequestsTotal,
    ProcessRestartsTotal,
    CyclesCompletedTotal,
}

impl Counter {
    pub const ALL: [Counter; 3] = [
        Counter::RequestsTotal,
        Counter::ProcessRestartsTotal,
        Counter::CyclesCompletedTotal,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::RequestsTotal => "requests_total",
            Counter::ProcessRestartsTotal => "process_restarts_total",
            Counter::CyclesCompletedTotal => "watchdog_cycles_completed_total",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Counter::RequestsTotal => "HTTP requests issued by the watchdog to the inference server.",
            Counter::ProcessRestartsTotal => "Times the server process was found under a new identity.",
            Counter::CyclesCompletedTotal => "Watchdog collection cycles completed.",
        }
    }
}

/// Static labels of the `llamawatch_info` record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildInfo {
    pub version: String,
    pub model_path: String,
    pub target_url: String,
}

/// Holds the current value of every exported metric.
///
/// Shared between the watchdog (sole writer) and the exposition endpoint
/// behind an `Arc`; no method takes `&mut self`.
pub struct MetricsRegistry {
    registry: Registry,
    gauges: Vec<prometheus::Gauge>,
    counters: Vec<IntCounter>,
}

impl MetricsRegistry {
    /// Creates a registry with every metric registered at its zero value
    /// and the info record set to 1.
    pub fn new(info: &BuildInfo) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let mut gauges = Vec::with_capacity(Gauge::ALL.len());
        for gauge in Gauge::ALL {
            let metric = prometheus::Gauge::with_opts(Opts::new(gauge.name(), gauge.help()))?;
            registry.register(Box::new(metric.clone()))?;
            gauges.push(metric);
        }

        let mut counters = Vec::with_capacity(Counter::ALL.len());
        for counter in Counter::ALL {
            let metric = IntCounter::with_opts(Opts::new(counter.name(), counter.help()))?;
            registry.register(Box::new(metric.clone()))?;
            counters.push(metric);
        }

        let info_gauge = IntGaugeVec::new(
            Opts::new("llamawatch_info", "Static watchdog build and target information."),
            &["version", "model_path", "target_url"],
        )?;
        registry.register(Box::new(info_gauge.clone()))?;
        info_gauge
            .with_label_values(&[
                info.version.as_str(),
                info.model_path.as_str(),
                info.target_url.as_str(),
            ])
            .set(1);

        Ok(Self {
            registry,
            gauges,
            counters,
        })
    }

    /// Replaces the value of `gauge`.
    pub fn set_gauge(&self, gauge: Gauge, value: f64) {
        self.gauges[gauge as usize].set(value);
    }

    /// Sets a 0/1 gauge.
    pub fn set_flag(&self, gauge: Gauge, on: bool) {
        self.set_gauge(gauge, if on { 1.0 } else { 0.0 });
    }

    /// Adds `delta` to `counter`.
    pub fn increment_counter(&self, counter: Counter, delta: u64) {
        if delta > 0 {
            self.counters[counter as usize].inc_by(delta);
        }
    }

    pub fn gauge(&self, gauge: Gauge) -> f64 {
        self.gauges[gauge as usize].get()
    }

    pub fn counter(&self, counter: Counter) -> u64 {
        self.counters[counter as usize].get()
    }

    /// Renders every metric in Prometheus text format.
    ///
    /// Never fails: an encoding error is logged and yields an empty body so
    /// the endpoint can still answer.
    pub fn render(&self) -> String {
        let families = self.registry.gather();
        let mut buffer = Vec::with_capacity(4096);
        if let Err(e) = TextEncoder::new().encode(&families, &mut buffer) {
            error!(error = %e, "failed to encode metrics");
            return String::new();
        }
        match String::from_utf8(buffer) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "metrics output is not valid UTF-8");
                String::new()
            }
        }
    }
}
