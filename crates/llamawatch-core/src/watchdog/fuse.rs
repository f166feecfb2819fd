//! Fusion of one cycle's evidence into the metrics registry.
//!
//! This is the only place that decides what a cycle writes. Absent evidence
//! leaves the previous value in place; it is never read as zero.

use crate::collector::{ProcessObservation, UsageSample};
use crate::probe::HealthSnapshot;
use crate::registry::{Counter, Gauge, MetricsRegistry};

/// What the process side of a cycle produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessOutcome {
    Sampled {
        usage: UsageSample,
        restarted: bool,
    },
    /// Not found, lost mid-cycle, or the sampling task failed.
    NotObserved,
}

impl From<&ProcessObservation> for ProcessOutcome {
    fn from(observation: &ProcessObservation) -> Self {
        match observation {
            ProcessObservation::Sampled {
                usage, restarted, ..
            } => ProcessOutcome::Sampled {
                usage: *usage,
                restarted: *restarted,
            },
            ProcessObservation::NotFound | ProcessObservation::Lost { .. } => {
                ProcessOutcome::NotObserved
            }
        }
    }
}

/// Evidence gathered by one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub process: ProcessOutcome,
    pub health: HealthSnapshot,
}

/// Writes `report` into `registry`.
///
/// - `up` always follows the latest probe.
/// - `model_loaded`, `active_slots`, `total_slots` change only when known.
/// - CPU and memory change only on a successful sample; a process that
///   cannot be seen is not evidence of zero usage.
pub fn fuse(registry: &MetricsRegistry, report: &CycleReport) {
    match report.process {
        ProcessOutcome::Sampled { usage, restarted } => {
            registry.set_gauge(Gauge::CpuUsagePercent, usage.cpu_percent);
            registry.set_gauge(Gauge::MemoryUsageBytes, usage.rss_bytes as f64);
            registry.set_flag(Gauge::ProcessObserved, true);
            if restarted {
                registry.increment_counter(Counter::ProcessRestartsTotal, 1);
            }
        }
        ProcessOutcome::NotObserved => {
            registry.set_flag(Gauge::ProcessObserved, false);
        }
    }

    let health = &report.health;
    registry.set_flag(Gauge::Up, health.reachable);
    if let Some(loaded) = health.model_loaded {
        registry.set_flag(Gauge::ModelLoaded, loaded);
    }
    if let Some(active) = health.active_slots {
        registry.set_gauge(Gauge::ActiveSlots, active as f64);
    }
    if let Some(total) = health.total_slots {
        registry.set_gauge(Gauge::TotalSlots, total as f64);
    }
    registry.increment_counter(Counter::RequestsTotal, health.requests_issued);
}
