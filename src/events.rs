//! State-change notifications emitted by the registry.
//!
//! A presentation layer subscribes to these instead of observing patient
//! fields directly; the engine never blocks on a subscriber being present.

use crate::parse::VitalsReading;
use crate::patient::{PatientId, PatientStatus};

/// Notification of a registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A new uncommitted patient slot was created.
    Added { id: PatientId },
    /// The patient's name/address were fixed and polling enabled.
    Committed { id: PatientId, name: String },
    /// The patient was returned to the uncommitted state.
    Reset { id: PatientId },
    /// The patient was removed from the registry.
    Removed { id: PatientId },
    /// A poll completed with a usable payload.
    VitalsUpdated {
        id: PatientId,
        name: String,
        reading: VitalsReading,
    },
    /// Connectivity status changed without new readings.
    StatusChanged { id: PatientId, status: PatientStatus },
}
