//! The process-wide collection of monitored patients.
//!
//! [`MonitorRegistry`] is the single point of truth for which patients exist.
//! Mutations (add/commit/reset/remove, poll application) go through its
//! methods; the flush worker reads via [`MonitorRegistry::snapshot`], which
//! copies under a brief read lock so no lock is ever held across I/O.

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::error::PollError;
use crate::events::MonitorEvent;
use crate::parse::VitalsReading;
use crate::patient::{Patient, PatientId, PatientStatus, PollApplied, PollTicket};

/// Capacity of the event fan-out channel. Slow subscribers lag rather than
/// backpressure the engine.
const EVENT_CAPACITY: usize = 256;

/// Copy of one committed patient's loggable state, taken for the flush
/// worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientSnapshot {
    pub id: PatientId,
    pub name: String,
    pub status: PatientStatus,
    pub oxygen: u32,
}

#[derive(Debug, Default)]
struct Inner {
    /// Insertion-ordered; ids are unique.
    patients: Vec<Patient>,
    next_id: u64,
}

/// Owner of all active [`Patient`] instances.
#[derive(Debug)]
pub struct MonitorRegistry {
    inner: RwLock<Inner>,
    events: broadcast::Sender<MonitorEvent>,
}

impl Default for MonitorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    /// Subscribe to registry mutation events.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: MonitorEvent) {
        // No subscribers is fine; the engine never depends on one.
        let _ = self.events.send(event);
    }

    /// Create a new uncommitted patient slot.
    pub fn add(&self) -> PatientId {
        let id = {
            let mut inner = self.inner.write();
            inner.next_id += 1;
            let id = PatientId(inner.next_id);
            inner.patients.push(Patient::new(id));
            id
        };
        self.emit(MonitorEvent::Added { id });
        id
    }

    /// Fix a patient's name and address and enable polling.
    ///
    /// Returns `false` when the id is no longer present.
    pub fn commit(&self, id: PatientId, name: &str, address: &str) -> bool {
        let committed = {
            let mut inner = self.inner.write();
            match inner.patients.iter_mut().find(|p| p.id == id) {
                Some(p) => {
                    p.commit(name, address);
                    true
                }
                None => false,
            }
        };
        if committed {
            self.emit(MonitorEvent::Committed {
                id,
                name: name.to_string(),
            });
        }
        committed
    }

    /// Add and immediately commit, as when restoring a saved roster.
    pub fn add_committed(&self, name: &str, address: &str) -> PatientId {
        let id = self.add();
        self.commit(id, name, address);
        id
    }

    /// Return a patient to the uncommitted state.
    pub fn reset(&self, id: PatientId) -> bool {
        let done = {
            let mut inner = self.inner.write();
            match inner.patients.iter_mut().find(|p| p.id == id) {
                Some(p) => {
                    p.reset();
                    true
                }
                None => false,
            }
        };
        if done {
            self.emit(MonitorEvent::Reset { id });
        }
        done
    }

    /// Remove a patient entirely. In-flight polls for it are discarded on
    /// completion by [`MonitorRegistry::apply_poll`].
    pub fn remove(&self, id: PatientId) -> bool {
        let removed = {
            let mut inner = self.inner.write();
            let before = inner.patients.len();
            inner.patients.retain(|p| p.id != id);
            inner.patients.len() != before
        };
        if removed {
            self.emit(MonitorEvent::Removed { id });
        }
        removed
    }

    /// Issue poll tickets for every committed patient without an outstanding
    /// poll. Called by the scheduler each tick.
    pub fn begin_due_polls(&self) -> Vec<PollTicket> {
        let tickets: Vec<PollTicket> = {
            let mut inner = self.inner.write();
            inner
                .patients
                .iter_mut()
                .filter_map(|p| p.begin_poll())
                .collect()
        };
        for ticket in &tickets {
            self.emit(MonitorEvent::StatusChanged {
                id: ticket.id,
                status: PatientStatus::Connecting,
            });
        }
        tickets
    }

    /// Apply one poll completion.
    ///
    /// Returns `None` when the patient has been removed in the meantime; the
    /// late completion then has no observable effect. Stale completions are
    /// reported as [`PollApplied::Stale`] and also change nothing.
    pub fn apply_poll(
        &self,
        id: PatientId,
        seq: u64,
        outcome: Result<VitalsReading, PollError>,
    ) -> Option<PollApplied> {
        let (applied, name, status) = {
            let mut inner = self.inner.write();
            let patient = inner.patients.iter_mut().find(|p| p.id == id)?;
            let applied = patient.apply_poll(seq, outcome);
            (applied, patient.name.clone(), patient.status)
        };

        match applied {
            PollApplied::Vitals(reading) => {
                self.emit(MonitorEvent::VitalsUpdated { id, name, reading });
            }
            PollApplied::Disconnected | PollApplied::NotConnected => {
                self.emit(MonitorEvent::StatusChanged { id, status });
            }
            PollApplied::Stale => {}
        }
        Some(applied)
    }

    /// Copy the loggable state of all committed patients.
    ///
    /// The lock is released before the caller does any I/O.
    pub fn snapshot(&self) -> Vec<PatientSnapshot> {
        let inner = self.inner.read();
        inner
            .patients
            .iter()
            .filter(|p| p.committed)
            .map(|p| PatientSnapshot {
                id: p.id,
                name: p.name.clone(),
                status: p.status,
                oxygen: p.oxygen,
            })
            .collect()
    }

    /// Name/address pairs in display order (newest first), for the settings
    /// round trip.
    ///
    /// Every patient with a configured address is included, whatever its
    /// connection state: the auto-uncommit after a transport failure is a
    /// within-session polling gate, not roster deletion. Only never-saved
    /// (or reset) patients are left out.
    pub fn roster(&self) -> Vec<(String, String)> {
        let inner = self.inner.read();
        inner
            .patients
            .iter()
            .rev()
            .filter(|p| !p.address.is_empty())
            .map(|p| (p.name.clone(), p.address.clone()))
            .collect()
    }

    /// Copy of a single patient, for inspection.
    pub fn get(&self, id: PatientId) -> Option<Patient> {
        self.inner.read().patients.iter().find(|p| p.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().patients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PollError;

    fn reading(spo2: u32, heart_rate: u32) -> VitalsReading {
        VitalsReading { spo2, heart_rate }
    }

    #[test]
    fn test_add_commit_remove_membership() {
        let registry = MonitorRegistry::new();
        let a = registry.add();
        let b = registry.add();
        assert_eq!(registry.len(), 2);
        assert_ne!(a, b);

        assert!(registry.commit(a, "P1", "192.0.2.5"));
        assert!(registry.remove(b));
        assert_eq!(registry.len(), 1);
        assert!(!registry.commit(b, "P2", "192.0.2.6"));
        assert!(!registry.remove(b));
    }

    #[test]
    fn test_due_polls_only_for_committed() {
        let registry = MonitorRegistry::new();
        registry.add();
        let committed = registry.add_committed("P1", "192.0.2.5");

        let tickets = registry.begin_due_polls();
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].id, committed);
        assert_eq!(tickets[0].url, "http://192.0.2.5");

        // The committed patient now has a poll outstanding; nothing is due.
        assert!(registry.begin_due_polls().is_empty());
    }

    #[test]
    fn test_apply_poll_for_removed_patient_is_noop() {
        let registry = MonitorRegistry::new();
        let id = registry.add_committed("P1", "192.0.2.5");
        let ticket = registry.begin_due_polls().remove(0);

        assert!(registry.remove(id));
        // The in-flight completion arrives after the delete.
        assert_eq!(registry.apply_poll(id, ticket.seq, Ok(reading(88, 72))), None);
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_committed_only_and_no_lock_held() {
        let registry = MonitorRegistry::new();
        registry.add();
        registry.add_committed("P1", "192.0.2.5");
        registry.add_committed("P2", "192.0.2.6");

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].name, "P1");
        assert_eq!(snap[1].name, "P2");

        // The snapshot is a copy; mutating afterwards is fine.
        registry.remove(snap[0].id);
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_transport_failure_drops_patient_from_due_polls() {
        let registry = MonitorRegistry::new();
        let id = registry.add_committed("P1", "192.0.2.5");
        let ticket = registry.begin_due_polls().remove(0);

        let applied = registry.apply_poll(id, ticket.seq, Err(PollError::Transport("dns".into())));
        assert_eq!(applied, Some(PollApplied::NotConnected));

        // Auto-uncommitted: no longer polled.
        assert!(registry.begin_due_polls().is_empty());
        assert!(registry.snapshot().is_empty());

        let p = registry.get(id).unwrap();
        assert_eq!(p.status, PatientStatus::NotConnected);
        assert_eq!(p.battery, 0);
    }

    #[test]
    fn test_events_emitted_on_mutations() {
        let registry = MonitorRegistry::new();
        let mut rx = registry.subscribe();

        let id = registry.add_committed("P1", "192.0.2.5");
        let ticket = registry.begin_due_polls().remove(0);
        registry.apply_poll(id, ticket.seq, Ok(reading(88, 72)));
        registry.remove(id);

        assert_eq!(rx.try_recv().unwrap(), MonitorEvent::Added { id });
        assert_eq!(
            rx.try_recv().unwrap(),
            MonitorEvent::Committed { id, name: "P1".to_string() }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            MonitorEvent::StatusChanged { id, status: PatientStatus::Connecting }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            MonitorEvent::VitalsUpdated { id, name: "P1".to_string(), reading: reading(88, 72) }
        );
        assert_eq!(rx.try_recv().unwrap(), MonitorEvent::Removed { id });
    }

    #[test]
    fn test_roster_is_newest_first() {
        let registry = MonitorRegistry::new();
        registry.add_committed("P1", "192.0.2.5");
        registry.add_committed("P2", "192.0.2.6");
        registry.add(); // uncommitted, excluded

        let roster = registry.roster();
        assert_eq!(
            roster,
            vec![
                ("P2".to_string(), "192.0.2.6".to_string()),
                ("P1".to_string(), "192.0.2.5".to_string()),
            ]
        );
    }

    #[test]
    fn test_roster_keeps_transport_failed_patient() {
        let registry = MonitorRegistry::new();
        let id = registry.add_committed("P1", "192.0.2.5");
        let ticket = registry.begin_due_polls().remove(0);
        registry.apply_poll(id, ticket.seq, Err(PollError::Transport("refused".into())));

        // Unreachable sensors stop being polled but stay on the saved roster.
        assert_eq!(
            registry.roster(),
            vec![("P1".to_string(), "192.0.2.5".to_string())]
        );
    }

    #[test]
    fn test_reset_drops_patient_from_roster() {
        let registry = MonitorRegistry::new();
        let id = registry.add_committed("P1", "192.0.2.5");
        assert!(registry.reset(id));
        assert!(registry.roster().is_empty());
    }

    #[test]
    fn test_reset_reenables_editing() {
        let registry = MonitorRegistry::new();
        let id = registry.add_committed("P1", "192.0.2.5");
        assert!(registry.reset(id));

        let p = registry.get(id).unwrap();
        assert!(!p.committed);
        assert!(p.name.is_empty());
        assert!(registry.begin_due_polls().is_empty());
    }
}
