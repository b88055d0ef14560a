//! End-to-end simulation: provision the catalog, then run the fleet.

use crate::catalog::{Catalog, CatalogBuilder};
use crate::config::Config;
use crate::dispatch::FleetDispatcher;
use crate::error::{Result, SimulatorError};
use crate::report::{DeviceFailure, FleetReport, RunMode};
use crate::stats::{collect_latencies, compute_latency_stats, new_histogram, DispatchStats};
use fleetsim_core::{Clock, EnvelopeBuilder, HubConnectionString, SystemClock};
use fleetsim_registry::DeviceRegistry;
use fleetsim_transport::Transport;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A configured simulator bound to a registry and a transport.
pub struct Simulation {
    config: Config,
    hub: HubConnectionString,
    registry: Arc<dyn DeviceRegistry>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
}

impl Simulation {
    /// Validates `config` and binds it to the given backends.
    pub fn new(
        config: Config,
        registry: Arc<dyn DeviceRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        let hub = config.hub_connection_string()?;

        Ok(Self {
            config,
            hub,
            registry,
            transport,
            clock: Arc::new(SystemClock),
        })
    }

    /// Builder method to replace the clock used for envelope timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds the catalog for every configured device kind.
    pub async fn provision(&self) -> Catalog {
        CatalogBuilder::new(
            Arc::clone(&self.registry),
            self.config.fleet.provision_concurrency,
        )
        .build_all(&self.config.fleet.device_kinds)
        .await
    }

    /// Provisions the fleet and, in [`RunMode::Run`], sends telemetry until
    /// `cancel` fires, the configured duration elapses, or every device
    /// reaches its message limit.
    pub async fn run(&self, mode: RunMode, cancel: CancellationToken) -> Result<FleetReport> {
        let settings = self.config.dispatch_settings();
        let requested = self.config.fleet.device_count();
        let start = Instant::now();

        info!("Starting fleet in {} mode", mode);
        info!(
            "Configuration: {} device(s) on {}, interval {:?}",
            requested,
            self.hub.host_name(),
            settings.interval
        );

        let catalog = self.provision().await;
        let mut report = FleetReport::from_catalog(mode, requested, settings.interval, &catalog);

        if catalog.is_empty() {
            return Err(SimulatorError::EmptyFleet {
                failed: catalog.failed_ids(),
            });
        }
        if !catalog.is_complete() {
            warn!(
                "{} device(s) failed to provision: {}",
                catalog.failures.len(),
                catalog.failed_ids().join(", ")
            );
        }

        let devices = if self.config.fleet.fail_on_partial_catalog {
            catalog.ensure_complete()?
        } else {
            catalog.devices
        };

        if mode == RunMode::Provision {
            report.duration = start.elapsed();
            return Ok(report);
        }

        let run_token = cancel.child_token();
        let timer = self.config.duration().map(|limit| {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(limit) => {
                        info!("Run duration of {:?} elapsed, stopping fleet", limit);
                        token.cancel();
                    }
                }
            })
        });

        let stats = Arc::new(DispatchStats::new());
        let (latency_tx, latency_rx) = mpsc::unbounded_channel();
        let collector = tokio::spawn(collect_latencies(latency_rx));

        let dispatch_start = Instant::now();
        let outcome = {
            let dispatcher = FleetDispatcher::new(
                Arc::clone(&self.registry),
                Arc::clone(&self.transport),
                self.hub.clone(),
                settings,
            )
            .with_concurrency(self.config.fleet.dispatch_concurrency)
            .with_envelope_builder(EnvelopeBuilder::new(Arc::clone(&self.clock)))
            .with_stats(Arc::clone(&stats))
            .with_latency_sender(latency_tx);

            dispatcher.run(devices, run_token.clone()).await
        };
        let dispatch_duration = dispatch_start.elapsed();

        // Stop the duration timer if every device finished on its own
        run_token.cancel();
        if let Some(timer) = timer {
            let _ = timer.await;
        }

        if !outcome.panicked.is_empty() {
            error!("{} device task(s) panicked", outcome.panicked.len());
        }

        let histogram = match collector.await {
            Ok(histogram) => histogram?,
            Err(e) => {
                error!("Latency collector failed: {}", e);
                new_histogram()?
            }
        };

        report.devices_connected = stats.devices_connected.load(Ordering::Relaxed);
        report.connection_failures = outcome
            .failures
            .iter()
            .map(|e| DeviceFailure {
                device_id: e.device_id().unwrap_or("unknown").to_string(),
                reason: e.to_string(),
            })
            .collect();
        report.panicked_devices = outcome
            .panicked
            .iter()
            .map(|d| d.id().to_string())
            .collect();
        report.messages_sent = outcome.messages_sent();
        report.send_failures = outcome.send_failures();
        report.bytes_sent = stats.bytes_sent.load(Ordering::Relaxed);
        report.send_latency = compute_latency_stats(&histogram);
        report.duration = dispatch_duration;

        info!(
            "Fleet stopped: {} message(s) sent, {} send failure(s), {} connection failure(s)",
            report.messages_sent,
            report.send_failures,
            report.connection_failures.len()
        );

        Ok(report)
    }
}
