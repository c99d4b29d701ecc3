use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shelfguard_core::{
    normalize_metadata, ContentHash, NewUpload, StatusUpdate, UploadRecord, UploadStatus,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repository::{ensure_transition, UploadRepository};

/// In-process [`UploadRepository`] with the same guard semantics as the
/// PostgreSQL implementation, including one `moved` record per hash.
#[derive(Clone, Default)]
pub struct InMemoryUploadRepository {
    records: Arc<RwLock<HashMap<Uuid, UploadRecord>>>,
}

impl InMemoryUploadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn oldest_first(mut records: Vec<UploadRecord>) -> Vec<UploadRecord> {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    records
}

#[async_trait]
impl UploadRepository for InMemoryUploadRepository {
    async fn insert(&self, upload: NewUpload) -> Result<UploadRecord> {
        let record = upload.into_record();
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            anyhow::bail!("Upload {} already exists", record.id);
        }
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<UploadRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn get_by_hash(&self, hash: &ContentHash) -> Result<Option<UploadRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.status == UploadStatus::Moved && r.content_hash.as_ref() == Some(hash))
            .cloned())
    }

    async fn list_by_status_older_than(
        &self,
        statuses: &[UploadStatus],
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<UploadRecord>> {
        let matching = self
            .records
            .read()
            .await
            .values()
            .filter(|r| statuses.contains(&r.status) && r.created_at < cutoff)
            .cloned()
            .collect();
        Ok(oldest_first(matching))
    }

    async fn list_by_status(&self, statuses: &[UploadStatus]) -> Result<Vec<UploadRecord>> {
        let matching = self
            .records
            .read()
            .await
            .values()
            .filter(|r| statuses.contains(&r.status))
            .cloned()
            .collect();
        Ok(oldest_first(matching))
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: UploadStatus,
        to: UploadStatus,
        update: StatusUpdate,
    ) -> Result<bool> {
        ensure_transition(from, to)?;

        let mut records = self.records.write().await;

        if to == UploadStatus::Moved {
            let hash = records
                .get(&id)
                .and_then(|r| r.content_hash.clone().or_else(|| update.content_hash.clone()));
            if let Some(hash) = hash {
                let taken = records.values().any(|r| {
                    r.id != id
                        && r.status == UploadStatus::Moved
                        && r.content_hash.as_ref() == Some(&hash)
                });
                if taken {
                    anyhow::bail!("Another moved upload already holds hash {}", hash);
                }
            }
        }

        match records.get_mut(&id) {
            Some(record) if record.status == from => {
                update.apply(record, to, Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_content_hash(&self, id: Uuid, hash: &ContentHash) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) if record.content_hash.is_none() => {
                record.content_hash = Some(hash.clone());
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn total_size_by_status(&self, statuses: &[UploadStatus]) -> Result<u64> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| statuses.contains(&r.status))
            .map(|r| r.size_bytes)
            .sum())
    }

    async fn find_by_title_author(
        &self,
        title: &str,
        author: &str,
        statuses: &[UploadStatus],
        exclude: Uuid,
    ) -> Result<Option<UploadRecord>> {
        let matching = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.id != exclude && statuses.contains(&r.status))
            .filter(|r| {
                normalize_metadata(r.title.as_deref()).as_deref() == Some(title)
                    && normalize_metadata(r.author.as_deref()).as_deref() == Some(author)
            })
            .cloned()
            .collect();
        Ok(oldest_first(matching).into_iter().next())
    }

    async fn count_by_status(&self) -> Result<BTreeMap<UploadStatus, u64>> {
        let mut counts = BTreeMap::new();
        for record in self.records.read().await.values() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
