//! Request-scoped artifact storage
//!
//! Each pipeline invocation gets its own directory keyed by [`RequestId`], so
//! concurrent audits never read or overwrite each other's rasters. Layout:
//!
//! ```text
//! <root>/requests/<request-id>/<slot>.png   transient, removed by discard() or prune_requests()
//! <root>/durable/audit_<key>.png            copied by persist()
//! ```

use crate::error::EvidenceError;
use crate::hash::ContentHash;
use crate::layer::ArtifactSlot;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use ulid::Ulid;

/// Identifier for one pipeline invocation's evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Ulid);

impl RequestId {
    /// Generate a fresh request id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// A raster written for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    pub request_id: RequestId,
    pub slot: ArtifactSlot,
    pub path: PathBuf,
    pub hash: ContentHash,
    pub size: u64,
}

/// A raster copied out of the transient area to outlive its request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurableImage {
    pub file_name: String,
    pub path: PathBuf,
    pub hash: ContentHash,
}

/// Filesystem-backed artifact store
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn request_dir(&self, request_id: RequestId) -> PathBuf {
        self.root.join("requests").join(request_id.to_string())
    }

    /// Where `slot` lives for `request_id` (whether or not it exists yet)
    #[must_use]
    pub fn path_of(&self, request_id: RequestId, slot: ArtifactSlot) -> PathBuf {
        self.request_dir(request_id).join(slot.file_name())
    }

    /// Write raster bytes into the request's slot
    ///
    /// # Errors
    /// Returns [`EvidenceError::Io`] if the directory or file cannot be written.
    pub async fn write(
        &self,
        request_id: RequestId,
        slot: ArtifactSlot,
        bytes: &[u8],
    ) -> Result<ArtifactHandle, EvidenceError> {
        let dir = self.request_dir(request_id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(slot.file_name());
        tokio::fs::write(&path, bytes).await?;

        let hash = ContentHash::compute(bytes);
        tracing::debug!(%request_id, %slot, hash = %hash.short(), size = bytes.len(), "artifact written");

        Ok(ArtifactHandle {
            request_id,
            slot,
            path,
            hash,
            size: bytes.len() as u64,
        })
    }

    /// Read a slot back
    ///
    /// # Errors
    /// [`EvidenceError::NotFound`] if the slot was never written or was discarded.
    pub async fn read(
        &self,
        request_id: RequestId,
        slot: ArtifactSlot,
    ) -> Result<Vec<u8>, EvidenceError> {
        let path = self.path_of(request_id, slot);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EvidenceError::NotFound(format!("{request_id}/{slot}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every transient artifact for a request
    ///
    /// Discarding an unknown request is a no-op.
    ///
    /// # Errors
    /// Returns [`EvidenceError::Io`] on any failure other than "not found".
    pub async fn discard(&self, request_id: RequestId) -> Result<(), EvidenceError> {
        match tokio::fs::remove_dir_all(self.request_dir(request_id)).await {
            Ok(()) => {
                tracing::debug!(%request_id, "request artifacts discarded");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Discard all but the newest `keep` request directories
    ///
    /// Request ids are ULIDs, so directory names order by creation time.
    /// Entries that are not request ids are left alone. Returns how many
    /// requests were removed.
    ///
    /// # Errors
    /// Returns [`EvidenceError::Io`] if listing or removal fails.
    pub async fn prune_requests(&self, keep: usize) -> Result<usize, EvidenceError> {
        let mut entries = match tokio::fs::read_dir(self.root.join("requests")).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = entry.file_name().to_str().and_then(|name| name.parse::<RequestId>().ok()) {
                ids.push(id);
            }
        }
        if ids.len() <= keep {
            return Ok(0);
        }

        ids.sort_unstable();
        let excess = ids.len() - keep;
        for id in &ids[..excess] {
            self.discard(*id).await?;
        }
        tracing::debug!(removed = excess, kept = keep, "old request artifacts pruned");
        Ok(excess)
    }

    /// Copy an artifact into durable storage as `audit_<key>.png`
    ///
    /// # Errors
    /// Returns [`EvidenceError::Io`] if the copy fails.
    pub async fn persist(
        &self,
        handle: &ArtifactHandle,
        key: &str,
    ) -> Result<DurableImage, EvidenceError> {
        let dir = self.root.join("durable");
        tokio::fs::create_dir_all(&dir).await?;
        let file_name = format!("audit_{key}.png");
        let path = dir.join(&file_name);
        tokio::fs::copy(&handle.path, &path).await?;

        Ok(DurableImage {
            file_name,
            path,
            hash: handle.hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requests_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let a = RequestId::new();
        let b = RequestId::new();

        store.write(a, ArtifactSlot::NdviCurrent, b"aaa").await.unwrap();
        store.write(b, ArtifactSlot::NdviCurrent, b"bbb").await.unwrap();

        assert_eq!(store.read(a, ArtifactSlot::NdviCurrent).await.unwrap(), b"aaa");
        assert_eq!(store.read(b, ArtifactSlot::NdviCurrent).await.unwrap(), b"bbb");
    }

    #[tokio::test]
    async fn discard_removes_only_that_request() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let a = RequestId::new();
        let b = RequestId::new();
        store.write(a, ArtifactSlot::NdmiCurrent, b"x").await.unwrap();
        store.write(b, ArtifactSlot::NdmiCurrent, b"y").await.unwrap();

        store.discard(a).await.unwrap();
        store.discard(a).await.unwrap();

        assert!(matches!(
            store.read(a, ArtifactSlot::NdmiCurrent).await,
            Err(EvidenceError::NotFound(_))
        ));
        assert!(store.read(b, ArtifactSlot::NdmiCurrent).await.is_ok());
    }

    #[tokio::test]
    async fn persist_survives_discard() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let id = RequestId::new();
        let handle = store.write(id, ArtifactSlot::NdviCurrent, b"png").await.unwrap();

        let durable = store.persist(&handle, "1700000000000").await.unwrap();
        store.discard(id).await.unwrap();

        assert_eq!(durable.file_name, "audit_1700000000000.png");
        assert_eq!(durable.hash, ContentHash::compute(b"png"));
        assert_eq!(std::fs::read(&durable.path).unwrap(), b"png");
    }

    #[tokio::test]
    async fn prune_keeps_the_newest_requests() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let ids: Vec<RequestId> = (0..5u64)
            .map(|ms| RequestId(Ulid::from_parts(1_700_000_000_000 + ms, 0)))
            .collect();
        for id in &ids {
            store.write(*id, ArtifactSlot::NdviCurrent, b"png").await.unwrap();
        }
        std::fs::create_dir_all(dir.path().join("requests").join("scratch")).unwrap();

        assert_eq!(store.prune_requests(2).await.unwrap(), 3);
        assert_eq!(store.prune_requests(2).await.unwrap(), 0);

        for id in &ids[..3] {
            assert!(store.read(*id, ArtifactSlot::NdviCurrent).await.is_err());
        }
        for id in &ids[3..] {
            assert!(store.read(*id, ArtifactSlot::NdviCurrent).await.is_ok());
        }
        assert!(dir.path().join("requests").join("scratch").exists());
    }

    #[tokio::test]
    async fn prune_without_requests_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ArtifactStore::new(dir.path()).prune_requests(0).await.unwrap(), 0);
    }

    #[test]
    fn request_id_parses_back() {
        let id = RequestId::new();
        assert_eq!(id.to_string().parse::<RequestId>().unwrap(), id);
    }
}
