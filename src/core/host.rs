//! Remote hosts and credential resolution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use thiserror::Error;

use super::types::HostId;

/// Errors raised while resolving a host.
#[derive(Debug, Error)]
pub enum HostError {
    /// No host with this id is known.
    #[error("host {0} not found")]
    NotFound(HostId),

    /// The host's secret could not be loaded.
    #[error("host {host}: {reason}")]
    Secret { host: HostId, reason: String },

    /// Store lock was poisoned.
    #[error("host store lock poisoned")]
    LockPoisoned,
}

/// How a session to the host authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Password,
    PrivateKey,
}

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// A host definition as held by the store.
#[derive(Clone, PartialEq, Eq)]
pub struct Host {
    pub id: HostId,
    pub params: ConnectionParams,
    pub auth_type: AuthType,
    /// Password or private key material, selected by `auth_type`.
    pub secret: String,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("id", &self.id)
            .field("params", &self.params)
            .field("auth_type", &self.auth_type)
            .finish_non_exhaustive()
    }
}

/// Everything a transport needs to open a session.
#[derive(Clone)]
pub struct ResolvedHost {
    pub params: ConnectionParams,
    pub auth_type: AuthType,
    pub secret: String,
}

impl fmt::Debug for ResolvedHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedHost")
            .field("params", &self.params)
            .field("auth_type", &self.auth_type)
            .finish_non_exhaustive()
    }
}

impl From<Host> for ResolvedHost {
    fn from(host: Host) -> Self {
        Self {
            params: host.params,
            auth_type: host.auth_type,
            secret: host.secret,
        }
    }
}

/// Source of host connection details and credentials.
#[async_trait]
pub trait HostStore: Send + Sync {
    /// Resolve connection parameters and secret for a host.
    async fn resolve(&self, id: HostId) -> Result<ResolvedHost, HostError>;
}

/// Host store backed by a map.
#[derive(Default)]
pub struct InMemoryHostStore {
    hosts: RwLock<HashMap<HostId, Host>>,
}

impl InMemoryHostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a host.
    pub fn insert(&self, host: Host) -> Result<(), HostError> {
        let mut hosts = self.hosts.write().map_err(|_| HostError::LockPoisoned)?;
        hosts.insert(host.id, host);
        Ok(())
    }

    pub fn with_host(self, host: Host) -> Result<Self, HostError> {
        self.insert(host)?;
        Ok(self)
    }
}

#[async_trait]
impl HostStore for InMemoryHostStore {
    async fn resolve(&self, id: HostId) -> Result<ResolvedHost, HostError> {
        let hosts = self.hosts.read().map_err(|_| HostError::LockPoisoned)?;
        hosts
            .get(&id)
            .cloned()
            .map(ResolvedHost::from)
            .ok_or(HostError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(id: u64) -> Host {
        Host {
            id: HostId::new(id),
            params: ConnectionParams {
                host: "web01.internal".into(),
                port: 22,
                username: "deploy".into(),
            },
            auth_type: AuthType::Password,
            secret: "hunter2".into(),
        }
    }

    #[tokio::test]
    async fn test_resolve_known_host() {
        let store = InMemoryHostStore::new().with_host(host(1)).unwrap();
        let resolved = store.resolve(HostId::new(1)).await.unwrap();

        assert_eq!(resolved.params.to_string(), "deploy@web01.internal:22");
        assert_eq!(resolved.auth_type, AuthType::Password);
        assert_eq!(resolved.secret, "hunter2");
    }

    #[tokio::test]
    async fn test_resolve_unknown_host() {
        let store = InMemoryHostStore::new();
        let err = store.resolve(HostId::new(9)).await.unwrap_err();
        assert!(matches!(err, HostError::NotFound(id) if id == HostId::new(9)));
    }

    #[test]
    fn test_debug_hides_secret() {
        let rendered = format!("{:?}", host(1));
        assert!(!rendered.contains("hunter2"));
    }
}
