//! In-memory implementation of [`AlertBuffer`].

use std::{
    collections::HashMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use super::{
    error::BufferError,
    traits::{AlertBuffer, AlertSnapshot},
};
use crate::models::{Alert, Fingerprint};

#[derive(Debug)]
struct Entry {
    alert: Alert,
    revision: u64,
}

/// An [`AlertBuffer`] backed by a mutex-guarded map.
///
/// Revisions come from a buffer-wide counter, so an entry that is deleted and
/// set again never reuses a revision seen by an older snapshot.
#[derive(Debug, Default)]
pub struct MemoryAlertBuffer {
    entries: Mutex<HashMap<Fingerprint, Entry>>,
    next_revision: AtomicU64,
}

impl MemoryAlertBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored alerts.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<Fingerprint, Entry>>, BufferError> {
        self.entries.lock().map_err(|_| BufferError::Poisoned)
    }
}

impl AlertBuffer for MemoryAlertBuffer {
    fn set(&self, alert: Alert) -> Result<(), BufferError> {
        let revision = self.next_revision.fetch_add(1, Ordering::Relaxed) + 1;
        let mut entries = self.entries()?;
        entries.insert(alert.fingerprint(), Entry { alert, revision });
        Ok(())
    }

    fn list(&self) -> Vec<AlertSnapshot> {
        match self.entries() {
            Ok(entries) => entries
                .values()
                .map(|e| AlertSnapshot { alert: e.alert.clone(), revision: e.revision })
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to list buffered alerts.");
                Vec::new()
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.entries().map(|e| e.is_empty()).unwrap_or(true)
    }

    fn delete_if_not_modified(&self, snapshots: &[AlertSnapshot]) -> Result<(), BufferError> {
        let mut entries = self.entries()?;
        for snapshot in snapshots {
            let fp = snapshot.alert.fingerprint();
            if entries.get(&fp).is_some_and(|e| e.revision == snapshot.revision) {
                entries.remove(&fp);
            }
        }
        Ok(())
    }
}
