//! Fleet dispatch: one telemetry loop per device.
//!
//! Each device runs its own loop:
//!
//! ```text
//! Provisioned -> Connecting -> Connected -> Sending <-> Pacing -> Stopped
//!                     |
//!                     +-> Failed
//! ```
//!
//! A connection failure ends only that device's loop. Send failures are
//! logged and counted, and the loop keeps going. Every loop watches a shared
//! cancellation token at its pacing point, so the fleet can be stopped cleanly.

use crate::error::{Result, SimulatorError};
use crate::parallel::for_each_bounded;
use crate::stats::DispatchStats;
use fleetsim_core::{
    DeviceIdentity, EnvelopeBuilder, HubConnectionString, PayloadGenerator, Properties,
};
use fleetsim_registry::DeviceRegistry;
use fleetsim_transport::{Connection, Transport};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default dispatch concurrency
pub const DEFAULT_DISPATCH_CONCURRENCY: usize = 100;

/// Upper bound for connect backoff
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Per-device dispatch settings.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Pause between successive sends of one device
    pub interval: Duration,
    /// Stop a device after this many send attempts (None = run until cancelled)
    pub max_messages: Option<u64>,
    /// Extra connect attempts after the first failure (0 = fail immediately)
    pub connect_retries: u32,
    /// Backoff base; doubles on every retry
    pub retry_delay: Duration,
    /// Run seed for reproducible payloads (None = OS entropy)
    pub seed: Option<u64>,
    /// Properties attached to every envelope
    pub extra_properties: Properties,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_messages: None,
            connect_retries: 0,
            retry_delay: Duration::from_millis(500),
            seed: None,
            extra_properties: Properties::new(),
        }
    }
}

/// Lifecycle state of one device loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Provisioned,
    Connecting,
    Connected,
    Sending,
    Pacing,
    Stopped,
    Failed,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceState::Provisioned => "provisioned",
            DeviceState::Connecting => "connecting",
            DeviceState::Connected => "connected",
            DeviceState::Sending => "sending",
            DeviceState::Pacing => "pacing",
            DeviceState::Stopped => "stopped",
            DeviceState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How a device loop ended, when it ended without a connection failure.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceOutcome {
    pub device: DeviceIdentity,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub state: DeviceState,
}

/// Result of running the whole fleet.
#[derive(Debug, Default)]
pub struct FleetOutcome {
    pub outcomes: Vec<DeviceOutcome>,
    /// Devices that ended in `Failed`
    pub failures: Vec<SimulatorError>,
    /// Devices whose task panicked
    pub panicked: Vec<DeviceIdentity>,
}

impl FleetOutcome {
    pub fn messages_sent(&self) -> u64 {
        self.outcomes.iter().map(|o| o.messages_sent).sum()
    }

    pub fn send_failures(&self) -> u64 {
        self.outcomes.iter().map(|o| o.send_failures).sum()
    }
}

/// Shared, read-only state handed to every device loop.
struct DispatchContext {
    registry: Arc<dyn DeviceRegistry>,
    transport: Arc<dyn Transport>,
    hub: HubConnectionString,
    envelopes: EnvelopeBuilder,
    settings: DispatchSettings,
    stats: Arc<DispatchStats>,
    latency_tx: Option<mpsc::UnboundedSender<Duration>>,
}

/// Runs device loops over a catalog with bounded concurrency.
pub struct FleetDispatcher {
    registry: Arc<dyn DeviceRegistry>,
    transport: Arc<dyn Transport>,
    hub: HubConnectionString,
    envelopes: EnvelopeBuilder,
    settings: DispatchSettings,
    concurrency: usize,
    stats: Arc<DispatchStats>,
    latency_tx: Option<mpsc::UnboundedSender<Duration>>,
}

impl FleetDispatcher {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        transport: Arc<dyn Transport>,
        hub: HubConnectionString,
        settings: DispatchSettings,
    ) -> Self {
        let envelopes =
            EnvelopeBuilder::default().with_extra_properties(settings.extra_properties.clone());
        Self {
            registry,
            transport,
            hub,
            envelopes,
            settings,
            concurrency: DEFAULT_DISPATCH_CONCURRENCY,
            stats: Arc::new(DispatchStats::new()),
            latency_tx: None,
        }
    }

    /// Builder method to set the maximum number of concurrently running devices.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Builder method to replace the envelope builder (e.g., to change the clock).
    /// The dispatch settings' extra properties are applied on top.
    pub fn with_envelope_builder(mut self, envelopes: EnvelopeBuilder) -> Self {
        self.envelopes = envelopes.with_extra_properties(self.settings.extra_properties.clone());
        self
    }

    /// Builder method to share counters with the caller.
    pub fn with_stats(mut self, stats: Arc<DispatchStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Builder method to receive the latency of every accepted send.
    pub fn with_latency_sender(mut self, tx: mpsc::UnboundedSender<Duration>) -> Self {
        self.latency_tx = Some(tx);
        self
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    fn context(&self) -> Arc<DispatchContext> {
        Arc::new(DispatchContext {
            registry: Arc::clone(&self.registry),
            transport: Arc::clone(&self.transport),
            hub: self.hub.clone(),
            envelopes: self.envelopes.clone(),
            settings: self.settings.clone(),
            stats: Arc::clone(&self.stats),
            latency_tx: self.latency_tx.clone(),
        })
    }

    /// Creates the loop for a single device.
    pub fn device_loop(&self, identity: DeviceIdentity) -> DeviceLoop {
        DeviceLoop::new(identity, self.context())
    }

    /// Runs every device until it stops, fails, or `cancel` fires.
    ///
    /// Devices beyond the concurrency bound wait for a free slot, which with
    /// unbounded loops means they never start.
    pub async fn run(&self, devices: Vec<DeviceIdentity>, cancel: CancellationToken) -> FleetOutcome {
        if devices.len() > self.concurrency && self.settings.max_messages.is_none() {
            warn!(
                "{} device(s) exceed the dispatch concurrency of {} and will not start",
                devices.len() - self.concurrency,
                self.concurrency
            );
        }
        info!(
            "Starting telemetry for {} device(s) every {:?} (concurrency {})",
            devices.len(),
            self.settings.interval,
            self.concurrency
        );

        let ctx = self.context();
        let outcomes = Arc::new(Mutex::new(Vec::with_capacity(devices.len())));
        let collected = Arc::clone(&outcomes);

        let result = for_each_bounded(devices, self.concurrency, move |identity| {
            let ctx = Arc::clone(&ctx);
            let cancel = cancel.clone();
            let collected = Arc::clone(&collected);
            async move {
                let outcome = DeviceLoop::new(identity, ctx).run(cancel).await?;
                collected.lock().push(outcome);
                Ok::<(), SimulatorError>(())
            }
        })
        .await;

        let (failures, panicked) = match result {
            Ok(()) => (Vec::new(), Vec::new()),
            Err(batch) => (batch.errors, batch.panicked),
        };
        let outcomes = std::mem::take(&mut *outcomes.lock());

        FleetOutcome {
            outcomes,
            failures,
            panicked,
        }
    }
}

/// The telemetry loop of one device. Sends are strictly sequential.
pub struct DeviceLoop {
    identity: DeviceIdentity,
    ctx: Arc<DispatchContext>,
    state: DeviceState,
    generator: PayloadGenerator,
}

impl DeviceLoop {
    fn new(identity: DeviceIdentity, ctx: Arc<DispatchContext>) -> Self {
        let generator = PayloadGenerator::for_device(ctx.settings.seed, &identity);
        Self {
            identity,
            ctx,
            state: DeviceState::Provisioned,
            generator,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    fn transition(&mut self, next: DeviceState) {
        debug!(
            device_id = %self.identity.id(),
            from = %self.state,
            to = %next,
            "Device state transition"
        );
        self.state = next;
    }

    /// Connects, then sends until cancelled or `max_messages` is reached.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<DeviceOutcome> {
        let mut connection = match self.connect(&cancel).await {
            Ok(Some(connection)) => connection,
            Ok(None) => {
                self.transition(DeviceState::Stopped);
                return Ok(self.outcome(0, 0));
            }
            Err(e) => {
                self.transition(DeviceState::Failed);
                self.ctx.stats.record_connection_failure();
                error!(device_id = %self.identity.id(), "{}", e);
                return Err(e);
            }
        };

        self.transition(DeviceState::Connected);
        self.ctx.stats.record_connected();
        info!(device_id = %self.identity.id(), "Device connected");

        let (sent, failed) = self.send_loop(connection.as_mut(), &cancel).await;

        self.transition(DeviceState::Stopped);
        if let Err(e) = connection.close().await {
            debug!(device_id = %self.identity.id(), "Close failed: {}", e);
        }
        info!(
            device_id = %self.identity.id(),
            sent,
            failed,
            "Device stopped"
        );

        Ok(self.outcome(sent, failed))
    }

    /// Returns `Ok(None)` when cancelled before a connection was opened.
    async fn connect(&mut self, cancel: &CancellationToken) -> Result<Option<Box<dyn Connection>>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        self.transition(DeviceState::Connecting);

        let device_id = self.identity.id().to_string();
        let key = self
            .ctx
            .registry
            .get_credential(&device_id)
            .await
            .map_err(|e| SimulatorError::Connection {
                device_id: device_id.clone(),
                reason: format!("credential lookup failed: {}", e),
            })?;
        let descriptor = self.ctx.hub.device(&device_id, &key.primary);

        let retries = self.ctx.settings.connect_retries;
        let mut attempt = 0u32;
        loop {
            match self.ctx.transport.connect(&descriptor).await {
                Ok(connection) => return Ok(Some(connection)),
                Err(e) if attempt < retries => {
                    let delay = self
                        .ctx
                        .settings
                        .retry_delay
                        .checked_mul(2u32.saturating_pow(attempt))
                        .unwrap_or(MAX_RETRY_DELAY)
                        .min(MAX_RETRY_DELAY);
                    attempt += 1;
                    warn!(
                        device_id = %device_id,
                        attempt,
                        "Connect failed: {}; retrying in {:?}", e, delay
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(None),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    return Err(SimulatorError::Connection {
                        device_id,
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    async fn send_loop(
        &mut self,
        connection: &mut dyn Connection,
        cancel: &CancellationToken,
    ) -> (u64, u64) {
        let interval = self.ctx.settings.interval;
        let max_messages = self.ctx.settings.max_messages;
        let (mut attempts, mut sent, mut failed) = (0u64, 0u64, 0u64);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.transition(DeviceState::Sending);
            match self.send_one(connection).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    failed += 1;
                    self.ctx.stats.record_send_failure();
                    warn!("{}", e);
                }
            }

            attempts += 1;
            if max_messages.is_some_and(|max| attempts >= max) {
                break;
            }

            self.transition(DeviceState::Pacing);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        (sent, failed)
    }

    async fn send_one(&mut self, connection: &mut dyn Connection) -> Result<()> {
        let payload = self.generator.generate(&self.identity);
        let envelope = self.ctx.envelopes.build(&payload, &self.identity)?;

        let start = Instant::now();
        connection
            .send(&envelope)
            .await
            .map_err(|source| SimulatorError::Send {
                device_id: self.identity.id().to_string(),
                source,
            })?;

        self.ctx.stats.record_sent(envelope.len() as u64);
        if let Some(tx) = &self.ctx.latency_tx {
            let _ = tx.send(start.elapsed());
        }
        debug!(
            device_id = %self.identity.id(),
            correlation_id = envelope.correlation_id().unwrap_or_default(),
            "Sent telemetry"
        );
        Ok(())
    }

    fn outcome(&self, messages_sent: u64, send_failures: u64) -> DeviceOutcome {
        DeviceOutcome {
            device: self.identity.clone(),
            messages_sent,
            send_failures,
            state: self.state,
        }
    }
}
