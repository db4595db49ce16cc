//! Record stores
//!
//! Traits at the persistence seam with `DashMap`-backed in-memory
//! implementations. All operations are safe under concurrent use.

use crate::types::{
    AuditId, AuditRecord, RiskLevel, UserId, UserSettings, WatchTarget, WatchTargetId, UNKNOWN_CONTRACT,
};
use async_trait::async_trait;
use canopy_ledger::TokenId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// Storage backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, record: AuditRecord) -> Result<(), StoreError>;

    async fn get(&self, id: AuditId) -> Result<Option<AuditRecord>, StoreError>;

    /// Newest first
    async fn list_by_user(&self, user: &UserId) -> Result<Vec<AuditRecord>, StoreError>;

    async fn find_by_token(
        &self,
        contract_address: &str,
        token_id: &str,
    ) -> Result<Option<AuditRecord>, StoreError>;

    async fn update(&self, record: AuditRecord) -> Result<(), StoreError>;

    /// Set `token_id` on every PENDING record of `contract_address`; returns
    /// how many changed
    ///
    /// Records with [`UNKNOWN_CONTRACT`] match any contract and take
    /// `contract_address` along with the id.
    async fn resolve_pending(&self, contract_address: &str, token_id: &str) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait WatchlistStore: Send + Sync {
    async fn add(&self, target: WatchTarget) -> Result<(), StoreError>;

    async fn remove(&self, id: WatchTargetId) -> Result<bool, StoreError>;

    /// Oldest first, the order targets are scanned in
    async fn list_by_user(&self, user: &UserId) -> Result<Vec<WatchTarget>, StoreError>;

    async fn record_check(
        &self,
        id: WatchTargetId,
        status: RiskLevel,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, user: &UserId) -> Result<Option<UserSettings>, StoreError>;

    async fn put(&self, settings: UserSettings) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: DashMap<AuditId, AuditRecord>,
}

impl InMemoryAuditStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn insert(&self, record: AuditRecord) -> Result<(), StoreError> {
        match self.records.entry(record.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Duplicate(record.id.to_string())),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn get(&self, id: AuditId) -> Result<Option<AuditRecord>, StoreError> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn list_by_user(&self, user: &UserId) -> Result<Vec<AuditRecord>, StoreError> {
        let mut records: Vec<AuditRecord> = self
            .records
            .iter()
            .filter(|r| &r.user_id == user)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn find_by_token(
        &self,
        contract_address: &str,
        token_id: &str,
    ) -> Result<Option<AuditRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| {
                r.contract_address.eq_ignore_ascii_case(contract_address)
                    && r.token_id.as_str() == token_id
            })
            .max_by_key(|r| r.timestamp)
            .map(|r| r.value().clone()))
    }

    async fn update(&self, record: AuditRecord) -> Result<(), StoreError> {
        match self.records.get_mut(&record.id) {
            Some(mut existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(StoreError::NotFound(record.id.to_string())),
        }
    }

    async fn resolve_pending(&self, contract_address: &str, token_id: &str) -> Result<usize, StoreError> {
        let mut changed = 0;
        for mut record in self.records.iter_mut() {
            if !record.token_id.is_pending() {
                continue;
            }
            if record.contract_address == UNKNOWN_CONTRACT {
                record.contract_address = contract_address.to_string();
            } else if !record.contract_address.eq_ignore_ascii_case(contract_address) {
                continue;
            }
            record.token_id = TokenId::from(token_id);
            changed += 1;
        }
        Ok(changed)
    }
}

/// Targets keep an insertion sequence so listing is oldest first even when
/// ids share a millisecond
#[derive(Debug, Default)]
pub struct InMemoryWatchlistStore {
    targets: DashMap<WatchTargetId, (u64, WatchTarget)>,
    next_seq: AtomicU64,
}

impl InMemoryWatchlistStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatchlistStore for InMemoryWatchlistStore {
    async fn add(&self, target: WatchTarget) -> Result<(), StoreError> {
        match self.targets.entry(target.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Duplicate(target.id.to_string())),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert((seq, target));
                Ok(())
            }
        }
    }

    async fn remove(&self, id: WatchTargetId) -> Result<bool, StoreError> {
        Ok(self.targets.remove(&id).is_some())
    }

    async fn list_by_user(&self, user: &UserId) -> Result<Vec<WatchTarget>, StoreError> {
        let mut targets: Vec<(u64, WatchTarget)> = self
            .targets
            .iter()
            .filter(|entry| &entry.1.user_id == user)
            .map(|entry| entry.value().clone())
            .collect();
        targets.sort_by_key(|(seq, _)| *seq);
        Ok(targets.into_iter().map(|(_, target)| target).collect())
    }

    async fn record_check(
        &self,
        id: WatchTargetId,
        status: RiskLevel,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .targets
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        entry.1.last_status = status;
        entry.1.last_checked = Some(checked_at);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    settings: DashMap<UserId, UserSettings>,
}

impl InMemorySettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn get(&self, user: &UserId) -> Result<Option<UserSettings>, StoreError> {
        Ok(self.settings.get(user).map(|s| s.value().clone()))
    }

    async fn put(&self, settings: UserSettings) -> Result<(), StoreError> {
        self.settings.insert(settings.user_id.clone(), settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ImageRef;
    use canopy_evidence::ContentHash;

    fn record(user: &str, contract: &str, token: TokenId) -> AuditRecord {
        AuditRecord {
            id: AuditId::new(),
            user_id: user.into(),
            lat: -3.46,
            lng: -62.21,
            biomass_score: 92.0,
            carbon_tonnes: 1200.0,
            deforestation_risk: 0.0,
            encroachment_risk: None,
            detected_features: Vec::new(),
            composition: None,
            image_ref: ImageRef {
                file_name: "audit_x.png".into(),
                hash: ContentHash::compute(b"x"),
            },
            contract_address: contract.into(),
            token_id: token,
            transaction_hash: None,
            status: "VERIFIED".into(),
            timestamp: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn resolve_pending_is_contract_scoped_and_idempotent() {
        let store = InMemoryAuditStore::new();
        store.insert(record("u1", "0xAA", TokenId::Pending)).await.unwrap();
        store.insert(record("u2", "0xaa", TokenId::Pending)).await.unwrap();
        store.insert(record("u1", "0xBB", TokenId::Pending)).await.unwrap();
        store
            .insert(record("u1", "0xAA", TokenId::Assigned("3".into())))
            .await
            .unwrap();

        assert_eq!(store.resolve_pending("0xAA", "9").await.unwrap(), 2);
        assert_eq!(store.resolve_pending("0xAA", "9").await.unwrap(), 0);
        assert!(store.find_by_token("0xaa", "9").await.unwrap().is_some());
        assert!(store.find_by_token("0xBB", "9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unattributed_records_adopt_the_resolved_contract() {
        let store = InMemoryAuditStore::new();
        let unattributed = record("u1", UNKNOWN_CONTRACT, TokenId::Pending);
        let id = unattributed.id;
        store.insert(unattributed).await.unwrap();
        store.insert(record("u2", "0xBB", TokenId::Pending)).await.unwrap();

        assert_eq!(store.resolve_pending("0xAA", "4").await.unwrap(), 1);
        let resolved = store.get(id).await.unwrap().unwrap();
        assert_eq!(resolved.contract_address, "0xAA");
        assert_eq!(resolved.token_id, TokenId::Assigned("4".into()));
        assert_eq!(store.resolve_pending("0xAA", "4").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = InMemoryAuditStore::new();
        let r = record("u1", "0xAA", TokenId::Pending);
        store.insert(r.clone()).await.unwrap();
        assert!(matches!(store.insert(r).await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn watchlist_check_updates_status() {
        let store = InMemoryWatchlistStore::new();
        let target = WatchTarget::new("u1".into(), "Ridge", 34.0, -118.0);
        let id = target.id;
        store.add(target).await.unwrap();

        let now = Utc::now();
        store.record_check(id, RiskLevel::Critical, now).await.unwrap();
        let listed = store.list_by_user(&"u1".into()).await.unwrap();
        assert_eq!(listed[0].last_status, RiskLevel::Critical);
        assert_eq!(listed[0].last_checked, Some(now));

        assert!(store.remove(id).await.unwrap());
        assert!(matches!(
            store.record_check(id, RiskLevel::Normal, now).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn watchlist_lists_in_insertion_order() {
        let store = InMemoryWatchlistStore::new();
        for name in ["A", "B", "C", "D"] {
            store.add(WatchTarget::new("u1".into(), name, 0.0, 0.0)).await.unwrap();
        }
        store.add(WatchTarget::new("u2".into(), "other", 0.0, 0.0)).await.unwrap();

        let names: Vec<String> = store
            .list_by_user(&"u1".into())
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["A", "B", "C", "D"]);
    }
}
