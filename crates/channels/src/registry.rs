use std::sync::Arc;

use {
    mqttgram_common::SubscriberId,
    tokio::sync::Mutex,
    tracing::{info, warn},
};

#[cfg(feature = "metrics")]
use mqttgram_metrics::{counter, gauge, subscribers as sub_metrics};

use crate::{
    error::Result,
    store::{Mutation, SubscriberStore, dedup},
};

/// Outcome of [`SubscriberRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadySubscribed,
}

/// Outcome of [`SubscriberRegistry::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotSubscribed,
}

/// The set of chats that receive alerts.
///
/// Holds an in-memory copy of the persisted list. Each mutation goes
/// through [`SubscriberStore::update`] while holding the lock, and the copy
/// is replaced by the list the store reports afterwards. Readers never see
/// a change that is not on disk, and changes saved by another writer of the
/// same store are picked up on the next mutation.
pub struct SubscriberRegistry {
    store: Arc<dyn SubscriberStore>,
    ids: Mutex<Vec<SubscriberId>>,
}

impl SubscriberRegistry {
    /// Load the registry from its store, dropping duplicate entries.
    pub async fn load(store: Arc<dyn SubscriberStore>) -> Result<Self> {
        let ids = dedup(store.load().await?);
        info!(count = ids.len(), "subscribers loaded");
        #[cfg(feature = "metrics")]
        gauge!(sub_metrics::ACTIVE).set(ids.len() as f64);

        Ok(Self {
            store,
            ids: Mutex::new(ids),
        })
    }

    pub async fn add(&self, id: SubscriberId) -> Result<AddOutcome> {
        if self.mutate(Mutation::Add(id)).await? {
            info!(chat_id = %id, "subscriber added");
            Ok(AddOutcome::Added)
        } else {
            Ok(AddOutcome::AlreadySubscribed)
        }
    }

    pub async fn remove(&self, id: SubscriberId) -> Result<RemoveOutcome> {
        if self.mutate(Mutation::Remove(id)).await? {
            info!(chat_id = %id, "subscriber removed");
            Ok(RemoveOutcome::Removed)
        } else {
            Ok(RemoveOutcome::NotSubscribed)
        }
    }

    /// Subscribe `id` only when nobody is subscribed yet.
    ///
    /// Makes the admin chat the recipient whenever the list is empty at
    /// startup, so alerts always reach someone. Returns whether `id` was
    /// added.
    pub async fn seed_if_empty(&self, id: SubscriberId) -> Result<bool> {
        let seeded = self.mutate(Mutation::Seed(id)).await?;
        if seeded {
            info!(chat_id = %id, "seeded subscriber list");
        }
        Ok(seeded)
    }

    /// Snapshot of the current subscribers in insertion order.
    pub async fn list(&self) -> Vec<SubscriberId> {
        self.ids.lock().await.clone()
    }

    pub async fn contains(&self, id: SubscriberId) -> bool {
        self.ids.lock().await.contains(&id)
    }

    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ids.lock().await.is_empty()
    }

    async fn mutate(&self, mutation: Mutation) -> Result<bool> {
        let mut ids = self.ids.lock().await;
        let (updated, changed) = self.store.update(mutation).await.inspect_err(|e| {
            warn!(error = %e, ?mutation, "failed to persist subscriber list");
            #[cfg(feature = "metrics")]
            counter!(sub_metrics::PERSIST_ERRORS_TOTAL).increment(1);
        })?;
        *ids = updated;

        #[cfg(feature = "metrics")]
        {
            if changed {
                let op = match mutation {
                    Mutation::Add(_) => "add",
                    Mutation::Remove(_) => "remove",
                    Mutation::Seed(_) => "seed",
                };
                counter!(sub_metrics::CHANGES_TOTAL, "op" => op).increment(1);
            }
            gauge!(sub_metrics::ACTIVE).set(ids.len() as f64);
        }
        Ok(changed)
    }
}
