//! Process-wide directory of named channel endpoints.
//!
//! Publishing hands one end of a channel to a context that shares no memory
//! with the creator: it only needs the name. Duplicate names overwrite (last
//! writer wins). Entries published by a session carry its [`SessionId`] so
//! that a closing session never revokes an entry a newer session republished
//! under the same name.

use std::collections::HashMap;
use tokio::sync::RwLock;

use super::endpoint::Endpoint;
use crate::types::{Error, Result, SessionId};

#[derive(Debug, Clone)]
struct Entry {
    owner: Option<SessionId>,
    endpoint: Endpoint,
}

/// Name → endpoint directory.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `endpoint` under `name`, replacing any previous entry.
    pub async fn publish(&self, name: impl Into<String>, endpoint: Endpoint) {
        self.insert(name.into(), None, endpoint).await;
    }

    /// Like [`publish`](Self::publish), tagging the entry with its owning session.
    pub async fn publish_owned(&self, name: impl Into<String>, owner: SessionId, endpoint: Endpoint) {
        self.insert(name.into(), Some(owner), endpoint).await;
    }

    async fn insert(&self, name: String, owner: Option<SessionId>, endpoint: Endpoint) {
        let mut entries = self.entries.write().await;
        if entries.insert(name.clone(), Entry { owner, endpoint }).is_some() {
            tracing::debug!("Channel {} republished (previous entry replaced)", name);
        } else {
            tracing::debug!("Channel {} published", name);
        }
    }

    /// Look up an endpoint by name.
    pub async fn lookup(&self, name: &str) -> Result<Endpoint> {
        self.entries
            .read()
            .await
            .get(name)
            .map(|entry| entry.endpoint.clone())
            .ok_or_else(|| Error::not_found(format!("No channel published as {}", name)))
    }

    /// Remove an entry. Returns whether one was present.
    pub async fn revoke(&self, name: &str) -> bool {
        let removed = self.entries.write().await.remove(name).is_some();
        if removed {
            tracing::debug!("Channel {} revoked", name);
        }
        removed
    }

    /// Remove an entry only if `owner` published it.
    pub async fn revoke_owned(&self, name: &str, owner: &SessionId) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(name) {
            Some(entry) if entry.owner.as_ref() == Some(owner) => {
                entries.remove(name);
                tracing::debug!("Channel {} revoked by session {}", name, owner);
                true
            }
            Some(_) => {
                tracing::debug!(
                    "Channel {} kept: owned by a newer publisher than session {}",
                    name,
                    owner
                );
                false
            }
            None => false,
        }
    }

    /// Names currently published, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
