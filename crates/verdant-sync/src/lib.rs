// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod error;
pub mod reconciler;
pub mod remote;

pub use error::{ApiRetryClass, Result, SyncError};
pub use reconciler::{Reconciler, SyncOutcome, SyncPhase};
pub use remote::{CollectionRemote, HttpRemote, RemoteSnapshot};
