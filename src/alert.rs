//! Threshold alerting.
//!
//! After every successful poll the oxygen reading is checked against the
//! accepted range; a qualifying reading produces one [`Alert`]. There is no
//! cooldown or deduplication window, so a persistently out-of-range sensor
//! re-alerts on every poll cycle.
//!
//! Delivery is offloaded: alerts are queued to a dispatcher task that hands
//! them to an [`AlertSink`], so notification latency never delays poll
//! processing.

use tokio::sync::mpsc;
use tracing::{info, warn};

/// Inclusive range of acceptable SpO2 readings.
pub const OXYGEN_NORMAL_MIN: u32 = 95;
pub const OXYGEN_NORMAL_MAX: u32 = 100;

/// How long a delivered notification should stay visible.
const ALERT_TIMEOUT_SECS: u64 = 10;

/// One threshold alert, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub timeout_secs: u64,
}

impl Alert {
    fn oxygen(name: &str, oxygen: u32) -> Self {
        Self {
            title: "Alert".to_string(),
            message: format!("{name} is currently at {oxygen}%"),
            timeout_secs: ALERT_TIMEOUT_SECS,
        }
    }
}

/// Evaluate one successful poll's oxygen reading against the thresholds.
///
/// Returns an alert iff the reading falls outside `[95, 100]`.
pub fn evaluate(name: &str, oxygen: u32) -> Option<Alert> {
    if oxygen < OXYGEN_NORMAL_MIN || oxygen > OXYGEN_NORMAL_MAX {
        Some(Alert::oxygen(name, oxygen))
    } else {
        None
    }
}

/// Destination for alerts.
///
/// Delivery is fire-and-forget: no return value is consumed, and a failing
/// sink must handle (and at most log) its own errors.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: &Alert);

    /// Human-readable description of the sink, for the startup log line.
    fn description(&self) -> &str;
}

/// Sink that emits alerts as warn-level log events.
///
/// This is the default for the headless binary, where no local notification
/// service is wired up.
#[derive(Debug, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn deliver(&self, alert: &Alert) {
        warn!(title = %alert.title, timeout_secs = alert.timeout_secs, "{}", alert.message);
    }

    fn description(&self) -> &str {
        "log"
    }
}

/// Sink that forwards alerts over a channel, for tests and for embedding the
/// engine under a real notification service.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelSink {
    /// Create a sink/receiver pair.
    pub fn create() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelSink {
    fn deliver(&self, alert: &Alert) {
        // Receiver gone means nobody wants alerts anymore; not an error.
        let _ = self.tx.send(alert.clone());
    }

    fn description(&self) -> &str {
        "channel"
    }
}

/// Background worker that drains queued alerts into a sink.
pub struct AlertDispatcher {
    rx: mpsc::Receiver<Alert>,
    sink: Box<dyn AlertSink>,
}

impl AlertDispatcher {
    /// Create a dispatcher and the sender the poll path uses to queue alerts.
    pub fn channel(sink: Box<dyn AlertSink>, capacity: usize) -> (mpsc::Sender<Alert>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx, sink })
    }

    /// Drain alerts until all senders are dropped.
    pub async fn run(mut self) {
        info!(sink = self.sink.description(), "alert dispatcher started");
        while let Some(alert) = self.rx.recv().await {
            self.sink.deliver(&alert);
        }
    }
}
