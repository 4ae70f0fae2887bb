//! Optimistic local edits with exact rollback.
//!
//! A view applies a change to its local copy immediately, sends the request,
//! and then either adopts the server's version of the record or puts the
//! pre-edit snapshot back. The collection lock is never held while the
//! request is in flight.

use std::{fmt, future::Future};

use shared::protocol::{Appointment, Client, LineItem, Location, Technician, TechnicianBlock};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};

pub trait Keyed {
    type Key: Clone + PartialEq + fmt::Display;

    fn key(&self) -> &Self::Key;
}

macro_rules! keyed_by_id {
    ($record:ty, $key:ty) => {
        impl Keyed for $record {
            type Key = $key;

            fn key(&self) -> &Self::Key {
                &self.id
            }
        }
    };
}

keyed_by_id!(Location, shared::domain::LocationId);
keyed_by_id!(Technician, shared::domain::TechnicianId);
keyed_by_id!(Client, shared::domain::ClientId);
keyed_by_id!(Appointment, shared::domain::AppointmentId);
keyed_by_id!(LineItem, shared::domain::LineItemId);
keyed_by_id!(TechnicianBlock, shared::domain::BlockId);

/// Placeholder id for a record that exists locally but not yet on the server.
pub fn temp_id() -> String {
    format!("temp-{}", Uuid::new_v4())
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with("temp-")
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticCollection<T> {
    items: Vec<T>,
}

impl<T> Default for OptimisticCollection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

#[must_use = "a staged update must be settled"]
#[derive(Debug)]
pub struct PendingUpdate<T: Keyed> {
    key: T::Key,
    snapshot: T,
    applied: T,
}

impl<T: Keyed> PendingUpdate<T> {
    pub fn applied(&self) -> &T {
        &self.applied
    }

    pub fn snapshot(&self) -> &T {
        &self.snapshot
    }
}

#[must_use = "a staged removal must be settled"]
#[derive(Debug)]
pub struct PendingRemoval<T> {
    index: usize,
    item: T,
}

impl<T> PendingRemoval<T> {
    pub fn item(&self) -> &T {
        &self.item
    }
}

#[must_use = "a staged insert must be settled"]
#[derive(Debug)]
pub struct PendingInsert<K> {
    temp_key: K,
}

impl<T: Keyed + Clone> OptimisticCollection<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.items.iter().find(|item| item.key() == key)
    }

    fn position(&self, key: &T::Key) -> Option<usize> {
        self.items.iter().position(|item| item.key() == key)
    }

    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items = items;
    }

    /// Replace the record with the same key, or append it.
    pub fn upsert(&mut self, item: T) {
        match self.position(item.key()) {
            Some(index) => self.items[index] = item,
            None => self.items.push(item),
        }
    }

    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.items.retain(keep);
    }

    pub fn stage_update(
        &mut self,
        key: &T::Key,
        patch: impl FnOnce(&mut T),
    ) -> Option<PendingUpdate<T>> {
        let index = self.position(key)?;
        let snapshot = self.items[index].clone();
        patch(&mut self.items[index]);
        Some(PendingUpdate {
            key: key.clone(),
            snapshot,
            applied: self.items[index].clone(),
        })
    }

    /// Adopt the server record on success; restore the exact snapshot on failure.
    pub fn settle_update<E>(
        &mut self,
        pending: PendingUpdate<T>,
        outcome: Result<T, E>,
    ) -> Result<T, E> {
        match outcome {
            Ok(server) => {
                match self.position(&pending.key) {
                    Some(index) => self.items[index] = server.clone(),
                    None => debug!(
                        "optimistic: updated record left the view before settling key={}",
                        pending.key
                    ),
                }
                Ok(server)
            }
            Err(err) => {
                if let Some(index) = self.position(&pending.key) {
                    self.items[index] = pending.snapshot;
                }
                debug!("optimistic: rolled back update key={}", pending.key);
                Err(err)
            }
        }
    }

    pub fn stage_remove(&mut self, key: &T::Key) -> Option<PendingRemoval<T>> {
        let index = self.position(key)?;
        let item = self.items.remove(index);
        Some(PendingRemoval { index, item })
    }

    /// On failure the record goes back where it was.
    pub fn settle_remove<E>(
        &mut self,
        pending: PendingRemoval<T>,
        outcome: Result<(), E>,
    ) -> Result<(), E> {
        if outcome.is_err() && self.position(pending.item.key()).is_none() {
            let index = pending.index.min(self.items.len());
            self.items.insert(index, pending.item);
        }
        outcome
    }

    pub fn stage_insert(&mut self, item: T) -> PendingInsert<T::Key> {
        let temp_key = item.key().clone();
        self.items.push(item);
        PendingInsert { temp_key }
    }

    pub fn settle_insert<E>(
        &mut self,
        pending: PendingInsert<T::Key>,
        outcome: Result<T, E>,
    ) -> Result<T, E> {
        let index = self.position(&pending.temp_key);
        match (&outcome, index) {
            (Ok(server), Some(index)) => self.items[index] = server.clone(),
            (Ok(server), None) => self.upsert(server.clone()),
            (Err(_), Some(index)) => {
                self.items.remove(index);
            }
            (Err(_), None) => {}
        }
        outcome
    }
}

/// Patch the record locally, await `commit` with the patched copy, then keep
/// the server's answer or roll back to the snapshot.
pub async fn apply_optimistic<T, P, C, Fut>(
    collection: &Mutex<OptimisticCollection<T>>,
    key: &T::Key,
    patch: P,
    commit: C,
) -> ClientResult<T>
where
    T: Keyed + Clone,
    P: FnOnce(&mut T),
    C: FnOnce(T) -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let pending = collection
        .lock()
        .await
        .stage_update(key, patch)
        .ok_or_else(|| ClientError::rejected(format!("record {key} is not loaded")))?;
    let outcome = commit(pending.applied().clone()).await;
    collection.lock().await.settle_update(pending, outcome)
}

/// Remove the record locally, await `commit`, and reinsert it on failure.
pub async fn remove_optimistic<T, C, Fut>(
    collection: &Mutex<OptimisticCollection<T>>,
    key: &T::Key,
    commit: C,
) -> ClientResult<T>
where
    T: Keyed + Clone,
    C: FnOnce(T) -> Fut,
    Fut: Future<Output = ClientResult<()>>,
{
    let pending = collection
        .lock()
        .await
        .stage_remove(key)
        .ok_or_else(|| ClientError::rejected(format!("record {key} is not loaded")))?;
    let removed = pending.item().clone();
    let outcome = commit(removed.clone()).await;
    collection
        .lock()
        .await
        .settle_remove(pending, outcome)
        .map(|()| removed)
}

/// Show `placeholder` immediately, then swap in the created record or drop it.
pub async fn insert_optimistic<T, Fut>(
    collection: &Mutex<OptimisticCollection<T>>,
    placeholder: T,
    commit: Fut,
) -> ClientResult<T>
where
    T: Keyed + Clone,
    Fut: Future<Output = ClientResult<T>>,
{
    let pending = collection.lock().await.stage_insert(placeholder);
    let outcome = commit.await;
    collection.lock().await.settle_insert(pending, outcome)
}

#[cfg(test)]
#[path = "tests/optimistic_tests.rs"]
mod tests;
