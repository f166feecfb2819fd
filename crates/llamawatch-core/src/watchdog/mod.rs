//! Periodic collection loop.
//!
//! Each cycle samples the server process and probes its HTTP endpoints
//! concurrently, then fuses both into the registry. One cycle runs at a time;
//! a tick that arrives while a cycle is still running is skipped.
//!
//! ```text
//!   Idle ──tick──► Collecting ──► Publishing ──► Idle
//!    │                                             │
//!    └──────────── shutdown (between cycles) ──────┴──► Stopped
//! ```

mod fuse;

pub use fuse::{CycleReport, ProcessOutcome, fuse};

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::collector::{FileSystem, ProcessLocator};
use crate::probe::{HealthProbe, HealthSnapshot};
use crate::registry::{Counter, Gauge, MetricsRegistry};

/// Where the watchdog is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Collecting,
    Publishing,
    Stopped,
}

pub struct Watchdog<F: FileSystem + 'static, P: HealthProbe + 'static> {
    locator: Arc<Mutex<ProcessLocator<F>>>,
    probe: Arc<P>,
    registry: Arc<MetricsRegistry>,
    interval: Duration,
    state: CycleState,
    last_up: Option<bool>,
}

impl<F: FileSystem + 'static, P: HealthProbe + 'static> Watchdog<F, P> {
    pub fn new(
        locator: ProcessLocator<F>,
        probe: P,
        registry: Arc<MetricsRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            locator: Arc::new(Mutex::new(locator)),
            probe: Arc::new(probe),
            registry,
            interval,
            state: CycleState::Idle,
            last_up: None,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// Shared handle to the locator, e.g. to alter a mock filesystem between cycles.
    pub fn locator(&self) -> Arc<Mutex<ProcessLocator<F>>> {
        self.locator.clone()
    }

    /// Runs one collection cycle and publishes its result.
    ///
    /// Never fails. A panic while sampling the process counts as "not
    /// observed", a panic while probing as "unreachable"; the cycle still
    /// completes and is counted.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        self.state = CycleState::Collecting;

        // Process sampling reads procfs synchronously; keep it off the runtime.
        let locator = self.locator.clone();
        let sampling = tokio::task::spawn_blocking(move || {
            let mut locator = locator.lock().unwrap_or_else(PoisonError::into_inner);
            locator.observe(Instant::now())
        });
        let probe = self.probe.clone();
        let probing = tokio::spawn(async move { probe.check_health().await });
        let (observation, health) = tokio::join!(sampling, probing);

        let process = match observation {
            Ok(observation) => ProcessOutcome::from(&observation),
            Err(e) => {
                error!(error = %e, "process sampling panicked");
                ProcessOutcome::NotObserved
            }
        };
        let health = match health {
            Ok(health) => health,
            Err(e) => {
                error!(error = %e, "health probe panicked");
                HealthSnapshot::unreachable(0)
            }
        };
        let report = CycleReport { process, health };

        self.state = CycleState::Publishing;
        fuse(&self.registry, &report);
        self.log_transition(report.health.reachable);

        self.registry
            .set_gauge(Gauge::CycleDurationSeconds, started.elapsed().as_secs_f64());
        self.registry.increment_counter(Counter::CyclesCompletedTotal, 1);
        self.state = CycleState::Idle;
        report
    }

    fn log_transition(&mut self, up: bool) {
        if self.last_up == Some(up) {
            return;
        }
        if up {
            info!("inference server is reachable");
        } else {
            warn!("inference server is unreachable");
        }
        self.last_up = Some(up);
    }

    /// Runs cycles on the configured interval until `shutdown` turns true
    /// or its sender is dropped. Returns the number of cycles run.
    ///
    /// Shutdown is only observed between cycles; a cycle in progress always
    /// completes and publishes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let interval = self.interval;
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut cycles: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                _ = tick.tick() => {}
            }

            let report = self.run_cycle().await;
            cycles += 1;
            let elapsed = self.registry.gauge(Gauge::CycleDurationSeconds);

            if cycles == 1 {
                info!(
                    duration_ms = (elapsed * 1000.0) as u64,
                    up = report.health.reachable,
                    process_observed = matches!(report.process, ProcessOutcome::Sampled { .. }),
                    "first cycle completed"
                );
            } else {
                debug!(
                    duration_ms = (elapsed * 1000.0) as u64,
                    up = report.health.reachable,
                    cycles,
                    "cycle completed"
                );
            }

            if elapsed > interval.as_secs_f64() {
                warn!(
                    duration_ms = (elapsed * 1000.0) as u64,
                    interval_ms = interval.as_millis() as u64,
                    "cycle overran interval, next tick skipped"
                );
            }
        }

        self.state = CycleState::Stopped;
        info!(cycles, "watchdog stopped");
        cycles
    }
}

/// Resolves once shutdown is signalled or the sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
