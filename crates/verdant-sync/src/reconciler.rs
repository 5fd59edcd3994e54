// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use time::OffsetDateTime;
use verdant_db::TieredStore;

use crate::error::{Result, SyncError};
use crate::remote::CollectionRemote;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Fetching,
    Downloading,
    Uploading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Downloaded { at: OffsetDateTime },
    Uploaded { at: OffsetDateTime },
    Synced,
}

impl SyncOutcome {
    pub fn display(self) -> String {
        match self {
            Self::Downloaded { at } => format!("downloaded remote garden from {at}"),
            Self::Uploaded { at } => format!("uploaded garden; remote stamped {at}"),
            Self::Synced => "already in sync".to_owned(),
        }
    }
}

/// Keeps the local collection and the per-user remote snapshot consistent
/// with timestamp-based, whole-collection last-write-wins. Concurrent edits
/// from a second device between syncs are discarded on the older side; that
/// is the designed trade-off, not a defect to patch around.
#[derive(Debug)]
pub struct Reconciler {
    phase: SyncPhase,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Idle,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// One sync attempt. Rejects re-entry while another attempt is in
    /// flight; any failure returns to idle without mutating local state.
    pub fn sync(
        &mut self,
        store: &mut TieredStore,
        remote: &dyn CollectionRemote,
        user_id: &str,
    ) -> Result<SyncOutcome> {
        if self.phase != SyncPhase::Idle {
            return Err(SyncError::InProgress);
        }

        self.phase = SyncPhase::Fetching;
        let outcome = self.run_attempt(store, remote, user_id);
        self.phase = SyncPhase::Idle;
        outcome
    }

    fn run_attempt(
        &mut self,
        store: &mut TieredStore,
        remote: &dyn CollectionRemote,
        user_id: &str,
    ) -> Result<SyncOutcome> {
        let state = store
            .sync_state()
            .map_err(|error| SyncError::Storage(format!("{error:#}")))?;

        let snapshot = remote.fetch(user_id)?;

        match snapshot {
            Some(snapshot) if is_after(Some(snapshot.last_updated), state.last_synced_at) => {
                self.phase = SyncPhase::Downloading;
                store
                    .save_collection(&snapshot.collection)
                    .map_err(|error| SyncError::Storage(format!("{error:#}")))?;
                store
                    .put_last_synced(snapshot.last_updated)
                    .map_err(|error| SyncError::Storage(format!("{error:#}")))?;
                Ok(SyncOutcome::Downloaded {
                    at: snapshot.last_updated,
                })
            }
            Some(snapshot) if is_after(state.last_local_update_at, Some(snapshot.last_updated)) => {
                self.upload_local(store, remote, user_id)
            }
            Some(_) => Ok(SyncOutcome::Synced),
            None => self.upload_local(store, remote, user_id),
        }
    }

    fn upload_local(
        &mut self,
        store: &mut TieredStore,
        remote: &dyn CollectionRemote,
        user_id: &str,
    ) -> Result<SyncOutcome> {
        self.phase = SyncPhase::Uploading;
        let collection = store.load_collection();
        let at = remote.upload(user_id, &collection)?;
        store
            .put_last_synced(at)
            .map_err(|error| SyncError::Storage(format!("{error:#}")))?;
        Ok(SyncOutcome::Uploaded { at })
    }
}

fn is_after(candidate: Option<OffsetDateTime>, baseline: Option<OffsetDateTime>) -> bool {
    match (candidate, baseline) {
        (Some(candidate), Some(baseline)) => candidate > baseline,
        (Some(_), None) => true,
        (None, _) => false,
    }
}
