// Polling scheduler: one fixed-rate loop per trigger flow

use crate::config::PollConfig;
use crate::launch::LaunchGateway;
use crate::telemetry;
use crate::trigger::{RequestBuilder, TriggerSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

/// A trigger source paired with the builder that turns its events into launches
pub struct TriggerFlow {
    name: String,
    source: Box<dyn TriggerSource>,
    builder: Arc<dyn RequestBuilder>,
    period: Duration,
    initial_delay: Duration,
}

impl TriggerFlow {
    pub fn new(
        name: impl Into<String>,
        source: Box<dyn TriggerSource>,
        builder: Arc<dyn RequestBuilder>,
        poll: &PollConfig,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            builder,
            period: poll.period(),
            initial_delay: poll.initial_delay(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Poll once and launch a job for every event. Returns the number of
    /// executions admitted.
    ///
    /// Poll failures, builder rejections and launch errors are logged and
    /// never propagate. An event whose launch failed transiently is released
    /// back to its source; whether it is redelivered depends on the source
    /// (files are, already-acknowledged records are not).
    #[instrument(skip(self, gateway), fields(flow = %self.name, job_name = %self.builder.job_name()))]
    pub async fn tick(&mut self, gateway: &LaunchGateway) -> usize {
        let events = match self.source.poll().await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Trigger poll failed, retrying next tick");
                return 0;
            }
        };

        if events.is_empty() {
            debug!("No trigger events");
            return 0;
        }
        telemetry::record_trigger_events(self.source.kind(), events.len());

        let mut launched = 0;
        for event in &events {
            let request = match self.builder.build(event) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Discarding trigger event");
                    continue;
                }
            };

            match gateway.launch(request).await {
                Ok(handle) => {
                    launched += 1;
                    debug!(execution_id = %handle.id(), "Launched job for trigger event");
                }
                Err(e) if e.is_transient() => {
                    error!(error = %e, "Failed to launch job, event handed back to its source");
                    self.source.release(event);
                }
                Err(e) => error!(error = %e, "Failed to launch job"),
            }
        }

        info!(events = events.len(), launched, "Trigger events processed");
        launched
    }
}

/// Runs every registered flow on its own task until stopped
pub struct PollingScheduler {
    gateway: Arc<LaunchGateway>,
    flows: Vec<TriggerFlow>,
    tasks: Vec<JoinHandle<()>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl PollingScheduler {
    pub fn new(gateway: Arc<LaunchGateway>) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        Self {
            gateway,
            flows: Vec::new(),
            tasks: Vec::new(),
            shutdown_tx,
        }
    }

    pub fn add_flow(&mut self, flow: TriggerFlow) {
        self.flows.push(flow);
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len() + self.tasks.len()
    }

    /// Spawn the polling loops of all pending flows
    pub fn start(&mut self) {
        for flow in self.flows.drain(..) {
            info!(
                flow = %flow.name,
                period_ms = flow.period.as_millis() as u64,
                initial_delay_ms = flow.initial_delay.as_millis() as u64,
                "Starting trigger flow"
            );
            let gateway = Arc::clone(&self.gateway);
            let shutdown_rx = self.shutdown_tx.subscribe();
            self.tasks.push(tokio::spawn(run_flow(flow, gateway, shutdown_rx)));
        }
    }

    /// Signal every loop to stop and wait for in-flight polls to finish.
    /// Running job executions are not touched.
    pub async fn stop(&mut self) {
        info!(flows = self.tasks.len(), "Stopping polling scheduler");
        let _ = self.shutdown_tx.send(());

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!(error = %e, "Trigger flow task ended abnormally");
            }
        }
        info!("Polling scheduler stopped");
    }
}

async fn run_flow(
    mut flow: TriggerFlow,
    gateway: Arc<LaunchGateway>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + flow.initial_delay, flow.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                info!(flow = %flow.name, "Shutdown signal received, stopping trigger flow");
                break;
            }
            _ = ticker.tick() => {
                flow.tick(&gateway).await;
            }
        }
    }
}
