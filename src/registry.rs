use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::provisioner::RepositoryRecord;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RegisteredRepository {
    pub id: Uuid,
    #[serde(flatten)]
    pub record: RepositoryRecord,
}

/// In-memory store for provisioned repositories.
#[derive(Clone, Default)]
pub struct RepositoryRegistry {
    entries: Arc<RwLock<Vec<RegisteredRepository>>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: RepositoryRecord) -> RegisteredRepository {
        let entry = RegisteredRepository {
            id: Uuid::now_v7(),
            record,
        };
        self.entries.write().await.push(entry.clone());
        entry
    }

    pub async fn list(&self) -> Vec<RegisteredRepository> {
        self.entries.read().await.clone()
    }

    pub async fn list_for_organization(&self, organization: &str) -> Vec<RegisteredRepository> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|entry| entry.record.organization == organization)
            .cloned()
            .collect()
    }
}
