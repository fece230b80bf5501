//! Poll scheduling and the HTTP fetch path.
//!
//! A [`PollScheduler`] ticks at the configured period and asks the registry
//! for due tickets (one per committed patient with no poll outstanding).
//! Every ticket becomes a detached fetch task, so patient polls are never
//! synchronized with one another and a slow sensor cannot delay the rest.
//! Completions funnel through one mpsc channel into a single apply loop,
//! which keeps per-patient completions in issuance order.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::alert::{self, Alert};
use crate::error::PollError;
use crate::parse::{parse_vitals, VitalsReading};
use crate::patient::{PatientId, PollApplied};
use crate::registry::MonitorRegistry;

/// Queue depth for poll completions.
const OUTCOME_CAPACITY: usize = 64;

/// One completed poll attempt, ready to be applied.
#[derive(Debug)]
pub struct PollOutcome {
    pub id: PatientId,
    pub seq: u64,
    pub result: Result<VitalsReading, PollError>,
}

/// Fires one poll attempt per committed patient on a fixed period.
pub struct PollScheduler {
    registry: Arc<MonitorRegistry>,
    client: Client,
    period: Duration,
    outcome_tx: mpsc::Sender<PollOutcome>,
}

impl PollScheduler {
    /// Build a scheduler and the completion receiver to hand to
    /// [`run_apply_loop`].
    ///
    /// `timeout` bounds each request; a timed-out attempt is classified as a
    /// transport failure. It should stay under `period` so an attempt is
    /// always resolved before the patient's next tick.
    pub fn new(
        registry: Arc<MonitorRegistry>,
        period: Duration,
        timeout: Duration,
    ) -> Result<(Self, mpsc::Receiver<PollOutcome>), reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_CAPACITY);
        Ok((
            Self {
                registry,
                client,
                period,
                outcome_tx,
            },
            outcome_rx,
        ))
    }

    /// Run the tick loop. Never returns; abort the task to stop it.
    pub async fn run(self) {
        info!(period_secs = self.period.as_secs_f64(), "poll scheduler started");
        let mut ticker = tokio::time::interval(self.period);

        loop {
            ticker.tick().await;

            for ticket in self.registry.begin_due_polls() {
                let client = self.client.clone();
                let tx = self.outcome_tx.clone();
                tokio::spawn(async move {
                    let result = fetch_vitals(&client, &ticket.url).await;
                    // Receiver gone means the engine is shutting down.
                    let _ = tx
                        .send(PollOutcome {
                            id: ticket.id,
                            seq: ticket.seq,
                            result,
                        })
                        .await;
                });
            }
        }
    }
}

/// Perform one poll attempt and classify the outcome.
pub async fn fetch_vitals(client: &Client, url: &str) -> Result<VitalsReading, PollError> {
    let response = client.get(url).send().await.map_err(PollError::from)?;

    let status = response.status();
    if !status.is_success() {
        return Err(PollError::Application(format!("endpoint returned {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| PollError::Application(e.to_string()))?;

    Ok(parse_vitals(&body)?)
}

/// Drain poll completions into the registry and evaluate alerts.
///
/// Runs until the scheduler (and every in-flight fetch task) has dropped its
/// sender. Completions for deleted patients and stale sequences are dropped
/// inside the registry; they produce a debug line and nothing else.
pub async fn run_apply_loop(
    registry: Arc<MonitorRegistry>,
    mut outcome_rx: mpsc::Receiver<PollOutcome>,
    alert_tx: mpsc::Sender<Alert>,
) {
    while let Some(outcome) = outcome_rx.recv().await {
        let PollOutcome { id, seq, result } = outcome;
        if let Err(e) = &result {
            debug!(%id, seq, error = %e, "poll attempt failed");
        }

        match registry.apply_poll(id, seq, result) {
            None => debug!(%id, seq, "completion for deleted patient dropped"),
            Some(PollApplied::Stale) => debug!(%id, seq, "stale completion dropped"),
            Some(PollApplied::Vitals(reading)) => {
                // Name lookup after the fact: the patient may have been
                // renamed or removed since the poll was issued.
                let Some(patient) = registry.get(id) else { continue };
                if let Some(alert) = alert::evaluate(&patient.name, reading.spo2) {
                    if alert_tx.send(alert).await.is_err() {
                        warn!("alert dispatcher gone; dropping alert");
                    }
                }
            }
            Some(PollApplied::Disconnected) => {
                debug!(%id, "patient disconnected; readings retained");
            }
            Some(PollApplied::NotConnected) => {
                warn!(%id, "transport failure; patient disabled until re-commit");
            }
        }
    }
}
