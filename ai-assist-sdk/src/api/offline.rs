//! Durable offline operation queue
//!
//! Writes issued while disconnected are kept here until connectivity
//! returns. The in-memory list is the working copy; the full list is written
//! to the key-value store after every mutation and read back at startup, so
//! the store is the durable record of pending writes.
//!
//! When the store runs out of space the queue falls back to persisting only
//! high-priority operations.

use std::cmp::Reverse;
use std::sync::Arc;

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{ApiError, StorageError};
use crate::storage::{KeyValueStore, KeyValueStoreExt, OFFLINE_QUEUE_KEY};
use crate::util::generate_request_id;

use super::types::{HttpMethod, RequestOptions};

/// Failed replays after which an operation is discarded
pub const MAX_REPLAY_ATTEMPTS: u32 = 3;

/// Replay precedence, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Auth and login calls first, then other writes, then reads
    pub fn classify(endpoint: &str, method: HttpMethod) -> Self {
        let endpoint = endpoint.to_lowercase();
        if endpoint.contains("auth") || endpoint.contains("login") {
            Priority::High
        } else if method.is_mutating() {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

/// A request waiting for connectivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineOperation {
    pub id: String,

    pub endpoint: String,

    pub options: RequestOptions,

    /// Enqueue time in epoch milliseconds
    pub timestamp: i64,

    /// Failed replays so far
    #[serde(default)]
    pub attempts: u32,

    pub priority: Priority,
}

impl OfflineOperation {
    pub fn new(endpoint: impl Into<String>, options: RequestOptions) -> Self {
        let endpoint = endpoint.into();
        let priority = Priority::classify(&endpoint, options.method);

        Self {
            id: generate_request_id(),
            endpoint,
            options,
            timestamp: chrono::Utc::now().timestamp_millis(),
            attempts: 0,
            priority,
        }
    }
}

/// Sort into replay order: priority descending, then oldest first
fn sort_for_replay(operations: &mut [OfflineOperation]) {
    operations.sort_by_key(|op| (Reverse(op.priority), op.timestamp));
}

/// Result of recording a failed replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayFailure {
    /// Kept for another try
    Retained,
    /// Reached the attempt limit and was removed
    Dropped,
    /// No operation with that id
    Unknown,
}

pub struct OfflineQueue {
    store: Arc<dyn KeyValueStore>,
    operations: Mutex<Vec<OfflineOperation>>,
}

impl OfflineQueue {
    /// Restore the queue persisted in `store`; unreadable data starts empty
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let mut operations = match store.get_json::<Vec<OfflineOperation>>(OFFLINE_QUEUE_KEY) {
            Ok(Some(operations)) => operations,
            Ok(None) => Vec::new(),
            Err(e) => {
                error!("Discarding unreadable offline queue: {}", e);
                Vec::new()
            }
        };
        sort_for_replay(&mut operations);

        if !operations.is_empty() {
            debug!("Restored {} offline operation(s)", operations.len());
        }

        Self {
            store,
            operations: Mutex::new(operations),
        }
    }

    /// Queue a request and persist the queue
    pub async fn enqueue(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<OfflineOperation, ApiError> {
        let operation = OfflineOperation::new(endpoint, options);

        let mut operations = self.operations.lock().await;
        operations.push(operation.clone());
        sort_for_replay(&mut operations);
        if let Err(e) = self.persist(&operations) {
            // Not durable, so not queued
            operations.retain(|op| op.id != operation.id);
            return Err(e);
        }

        debug!(
            "Queued {} {} ({:?} priority), {} pending",
            operation.options.method,
            operation.endpoint,
            operation.priority,
            operations.len()
        );
        Ok(operation)
    }

    /// Snapshot of pending operations in replay order
    pub async fn pending(&self) -> Vec<OfflineOperation> {
        self.operations.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.operations.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.operations.lock().await.is_empty()
    }

    /// Remove a replayed operation
    pub async fn remove(&self, id: &str) -> Result<bool, ApiError> {
        let mut operations = self.operations.lock().await;
        let before = operations.len();
        operations.retain(|op| op.id != id);

        if operations.len() == before {
            return Ok(false);
        }
        self.persist(&operations)?;
        Ok(true)
    }

    /// Count a failed replay, dropping the operation at the attempt limit
    pub async fn record_failure(&self, id: &str) -> Result<ReplayFailure, ApiError> {
        let mut operations = self.operations.lock().await;

        let Some(index) = operations.iter().position(|op| op.id == id) else {
            return Ok(ReplayFailure::Unknown);
        };

        operations[index].attempts += 1;
        let outcome = if operations[index].attempts >= MAX_REPLAY_ATTEMPTS {
            let dropped = operations.remove(index);
            warn!(
                "Dropping offline operation {} {} after {} failed replays",
                dropped.options.method, dropped.endpoint, dropped.attempts
            );
            ReplayFailure::Dropped
        } else {
            ReplayFailure::Retained
        };

        self.persist(&operations)?;
        Ok(outcome)
    }

    /// Remove every pending operation
    pub async fn clear(&self) -> Result<(), ApiError> {
        let mut operations = self.operations.lock().await;
        operations.clear();
        self.store.remove(OFFLINE_QUEUE_KEY)?;
        Ok(())
    }

    fn persist(&self, operations: &[OfflineOperation]) -> Result<(), ApiError> {
        match self.store.set_json(OFFLINE_QUEUE_KEY, operations) {
            Ok(()) => Ok(()),
            Err(StorageError::QuotaExceeded(reason)) => {
                warn!(
                    "Offline queue exceeds storage quota ({}), persisting high-priority operations only",
                    reason
                );
                let essential: Vec<&OfflineOperation> = operations
                    .iter()
                    .filter(|op| op.priority == Priority::High)
                    .collect();
                self.store.set_json(OFFLINE_QUEUE_KEY, &essential)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
