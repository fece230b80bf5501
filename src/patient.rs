//! Per-patient state and the connectivity state machine.
//!
//! A [`Patient`] is one monitored sensor endpoint together with its latest
//! readings. Polling is gated on an explicit commit: an uncommitted patient
//! never issues requests and never appears in the persisted log. Each issued
//! poll carries a sequence number so that late completions from superseded
//! attempts can be detected and dropped instead of regressing state.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::PollError;
use crate::parse::VitalsReading;

/// Battery percentage reported after a successful poll.
///
/// The sensor does not expose a real battery level over the status page; a
/// reachable sensor is shown as fully powered, an unreachable one as dead.
const BATTERY_FULL: u32 = 100;

/// Stable identity for a patient, minted by the registry.
///
/// Never derived from the (mutable) name or address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatientId(pub u64);

impl std::fmt::Display for PatientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "patient#{}", self.0)
    }
}

/// Connectivity state of one monitored sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatientStatus {
    /// Created or reset; not yet committed.
    Idle,
    /// A poll is in flight.
    Connecting,
    /// Last poll returned a usable payload.
    Connected,
    /// The endpoint answered but the request failed; polling continues.
    Disconnected,
    /// Transport-level failure; polling is halted until re-commit.
    NotConnected,
}

impl PatientStatus {
    /// Display label for reports and log entries.
    pub fn label(&self) -> &'static str {
        match self {
            PatientStatus::Idle => "Idle",
            PatientStatus::Connecting => "Connecting",
            PatientStatus::Connected => "Connected",
            PatientStatus::Disconnected => "Disconnected",
            PatientStatus::NotConnected => "Not connected",
        }
    }
}

/// One monitored sensor endpoint and its latest readings.
#[derive(Debug, Clone)]
pub struct Patient {
    pub id: PatientId,
    /// Display label; user-settable until committed.
    pub name: String,
    /// Network endpoint (bare IP or URL); fixed while committed.
    pub address: String,
    pub oxygen: u32,
    pub pulse: u32,
    pub battery: u32,
    pub status: PatientStatus,
    /// Polling and persistence are gated on this flag.
    pub committed: bool,
    /// When the most recent poll was issued.
    pub last_poll_at: Option<Instant>,
    /// Sequence number of the most recently issued poll.
    poll_seq: u64,
    /// Sequence of the outstanding poll, if any. A completion is applied
    /// only when its sequence matches this value.
    in_flight: Option<u64>,
}

/// Everything a fetch task needs to perform one poll attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTicket {
    pub id: PatientId,
    pub seq: u64,
    pub url: String,
}

/// What happened when a poll completion was fed back into a patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollApplied {
    /// Readings updated from a parsed payload.
    Vitals(VitalsReading),
    /// Application-level failure; readings retained.
    Disconnected,
    /// Transport-level failure; patient auto-uncommitted.
    NotConnected,
    /// The completion belonged to a superseded poll and was dropped.
    Stale,
}

impl Patient {
    pub fn new(id: PatientId) -> Self {
        Self {
            id,
            name: String::new(),
            address: String::new(),
            oxygen: 0,
            pulse: 0,
            battery: 0,
            status: PatientStatus::Idle,
            committed: false,
            last_poll_at: None,
            poll_seq: 0,
            in_flight: None,
        }
    }

    /// Fix name and address and enable polling.
    pub fn commit(&mut self, name: impl Into<String>, address: impl Into<String>) {
        self.name = name.into();
        self.address = address.into();
        self.committed = true;
    }

    /// Return to the uncommitted state, clearing fields and re-enabling
    /// editing. Any outstanding poll becomes stale.
    pub fn reset(&mut self) {
        self.name.clear();
        self.address.clear();
        self.oxygen = 0;
        self.pulse = 0;
        self.battery = 0;
        self.status = PatientStatus::Idle;
        self.committed = false;
        self.last_poll_at = None;
        self.in_flight = None;
    }

    /// True when a poll has been issued and not yet completed.
    pub fn poll_outstanding(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Issue a poll attempt.
    ///
    /// Returns `None` when the patient is uncommitted or a poll is already
    /// outstanding, so a scheduler tick that fires while the previous attempt
    /// is still in flight does not duplicate the request.
    pub fn begin_poll(&mut self) -> Option<PollTicket> {
        if !self.committed || self.in_flight.is_some() {
            return None;
        }

        self.poll_seq += 1;
        self.in_flight = Some(self.poll_seq);
        self.status = PatientStatus::Connecting;
        self.last_poll_at = Some(Instant::now());

        Some(PollTicket {
            id: self.id,
            seq: self.poll_seq,
            url: self.poll_url(),
        })
    }

    /// Feed one poll completion into the state machine.
    ///
    /// A completion whose sequence does not match the outstanding poll is
    /// dropped without touching any state, so out-of-date results never
    /// overwrite newer ones.
    pub fn apply_poll(
        &mut self,
        seq: u64,
        outcome: Result<VitalsReading, PollError>,
    ) -> PollApplied {
        if self.in_flight != Some(seq) {
            return PollApplied::Stale;
        }
        self.in_flight = None;

        match outcome {
            Ok(reading) => {
                self.oxygen = reading.spo2;
                self.pulse = reading.heart_rate;
                self.battery = BATTERY_FULL;
                self.status = PatientStatus::Connected;
                PollApplied::Vitals(reading)
            }
            // The endpoint was reached but the payload is unusable; same
            // handling as any other application-level failure.
            Err(PollError::Application(_)) | Err(PollError::Parse(_)) => {
                self.status = PatientStatus::Disconnected;
                PollApplied::Disconnected
            }
            Err(PollError::Transport(_)) => {
                self.status = PatientStatus::NotConnected;
                self.battery = 0;
                // Transport failures disable the sensor until the user
                // explicitly re-commits it.
                self.committed = false;
                PollApplied::NotConnected
            }
        }
    }

    /// The URL a poll attempt should request.
    ///
    /// An address with no scheme and a leading digit is treated as a bare
    /// sensor IP and prefixed with `http://`; anything else is used verbatim,
    /// which allows explicit HTTPS or custom schemes.
    pub fn poll_url(&self) -> String {
        let addr = self.address.trim();
        let bare_host = !addr.contains("://")
            && addr.chars().next().is_some_and(|c| c.is_ascii_digit());
        if bare_host {
            format!("http://{addr}")
        } else {
            addr.to_string()
        }
    }
}
