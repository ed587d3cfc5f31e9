//! In-memory ingestion store.
//!
//! Used when no `DATABASE_URL` is configured and as the test double for the
//! pipeline. Transactions stage their writes locally and apply them under a
//! single write lock on commit, so readers never see a partial ingestion.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use raiox_core::store::check_k;
use raiox_core::{
    nearest, Embedding, ImplantSummary, Neighbor, RaioxError, RankedImplant, Result, VectorKey,
    VectorStore,
};
use tokio::sync::RwLock;

use super::{
    ImplantRecord, IngestStore, IngestTransaction, NewSubmittedImage, ResultRecord,
    SubmissionRecord, SubmittedImageRecord,
};

struct ImplantEntry {
    record: ImplantRecord,
    vector: Option<Embedding>,
}

impl ImplantEntry {
    fn summary(&self) -> ImplantSummary {
        ImplantSummary {
            id: self.record.id,
            name: self.record.name.clone(),
            manufacturer: self.record.manufacturer.clone(),
            image_url: self.record.image_url.clone(),
        }
    }
}

struct ImageEntry {
    record: SubmittedImageRecord,
    vector: Option<Embedding>,
}

#[derive(Clone)]
struct ResultEntry {
    image_id: i64,
    submission_id: String,
    implant_id: i64,
    similarity: f64,
    rank: i32,
}

#[derive(Default)]
struct MemoryState {
    implants: BTreeMap<i64, ImplantEntry>,
    images: BTreeMap<i64, ImageEntry>,
    results: Vec<ResultEntry>,
}

impl MemoryState {
    fn submission_exists(&self, client_id: &str, submission_id: &str) -> bool {
        self.images.values().any(|entry| {
            entry.record.client_id == client_id && entry.record.submission_id == submission_id
        })
    }
}

#[derive(Default)]
struct Faults {
    unavailable: AtomicBool,
    fail_queries: AtomicBool,
    fail_commits: AtomicBool,
}

/// In-memory store with sequence-style id allocation and fault injection.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    next_implant_id: Arc<AtomicI64>,
    next_image_id: Arc<AtomicI64>,
    faults: Arc<Faults>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a catalog implant and return its id.
    pub async fn insert_implant(
        &self,
        name: &str,
        manufacturer: &str,
        image_url: Option<&str>,
        vector: Option<Embedding>,
    ) -> i64 {
        let id = self.next_implant_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let entry = ImplantEntry {
            record: ImplantRecord {
                id,
                name: name.to_string(),
                manufacturer: manufacturer.to_string(),
                image_path: None,
                image_url: image_url.map(str::to_string),
                created_at: now,
                updated_at: now,
            },
            vector,
        };
        self.state.write().await.implants.insert(id, entry);
        id
    }

    /// Make every operation fail with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make nearest-neighbor queries fail with `StoreUnavailable`.
    pub fn set_query_failure(&self, fail: bool) {
        self.faults.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Make transaction commits fail with `StoreUnavailable`.
    pub fn set_commit_failure(&self, fail: bool) {
        self.faults.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of committed submitted images.
    pub async fn image_count(&self) -> usize {
        self.state.read().await.images.len()
    }

    /// Number of committed result rows.
    pub async fn result_count(&self) -> usize {
        self.state.read().await.results.len()
    }

    /// Stored vector of a committed submitted image.
    pub async fn image_vector(&self, image_id: i64) -> Option<Embedding> {
        self.state
            .read()
            .await
            .images
            .get(&image_id)
            .and_then(|entry| entry.vector.clone())
    }

    fn ensure_available(&self) -> Result<()> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            return Err(RaioxError::StoreUnavailable(
                "memory store marked unavailable".into(),
            ));
        }
        Ok(())
    }

    fn ensure_queryable(&self) -> Result<()> {
        self.ensure_available()?;
        if self.faults.fail_queries.load(Ordering::SeqCst) {
            return Err(RaioxError::StoreUnavailable("vector query failed".into()));
        }
        Ok(())
    }

    /// Nearest catalog implants, with `overrides` replacing committed vectors.
    async fn scan(
        &self,
        vector: &Embedding,
        k: usize,
        overrides: &HashMap<i64, Embedding>,
    ) -> Result<Vec<Neighbor>> {
        check_k(k)?;
        self.ensure_queryable()?;

        let state = self.state.read().await;
        let candidates: Vec<(ImplantSummary, Embedding)> = state
            .implants
            .values()
            .filter_map(|entry| {
                overrides
                    .get(&entry.record.id)
                    .or(entry.vector.as_ref())
                    .map(|v| (entry.summary(), v.clone()))
            })
            .collect();

        Ok(nearest(vector, candidates.iter().map(|(i, v)| (i, v)), k))
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn put(&mut self, key: VectorKey, vector: &Embedding) -> Result<()> {
        self.ensure_available()?;
        let mut state = self.state.write().await;
        match key {
            VectorKey::Implant(id) => {
                let entry = state
                    .implants
                    .get_mut(&id)
                    .ok_or_else(|| RaioxError::PersistenceError(format!("no entity for {key}")))?;
                entry.vector = Some(vector.clone());
                entry.record.updated_at = Utc::now();
            }
            VectorKey::Image(id) => {
                let entry = state
                    .images
                    .get_mut(&id)
                    .ok_or_else(|| RaioxError::PersistenceError(format!("no entity for {key}")))?;
                entry.vector = Some(vector.clone());
            }
        }
        Ok(())
    }

    async fn query(&mut self, vector: &Embedding, k: usize) -> Result<Vec<Neighbor>> {
        self.scan(vector, k, &HashMap::new()).await
    }
}

#[async_trait]
impl IngestStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn IngestTransaction>> {
        self.ensure_available()?;
        Ok(Box::new(MemoryTransaction::new(self.clone())))
    }

    async fn list_implants(&self, skip: i64, limit: i64) -> Result<Vec<ImplantRecord>> {
        self.ensure_available()?;
        let skip = usize::try_from(skip.max(0)).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);

        let state = self.state.read().await;
        Ok(state
            .implants
            .values()
            .skip(skip)
            .take(limit)
            .map(|entry| entry.record.clone())
            .collect())
    }

    async fn get_implant(&self, id: i64) -> Result<Option<ImplantRecord>> {
        self.ensure_available()?;
        let state = self.state.read().await;
        Ok(state.implants.get(&id).map(|entry| entry.record.clone()))
    }

    async fn find_submission(
        &self,
        client_id: &str,
        submission_id: &str,
    ) -> Result<Option<SubmissionRecord>> {
        self.ensure_available()?;
        let state = self.state.read().await;

        let Some(image) = state.images.values().find(|entry| {
            entry.record.client_id == client_id && entry.record.submission_id == submission_id
        }) else {
            return Ok(None);
        };

        let mut results: Vec<ResultRecord> = state
            .results
            .iter()
            .filter(|r| r.image_id == image.record.id)
            .filter_map(|r| {
                state.implants.get(&r.implant_id).map(|implant| ResultRecord {
                    rank: r.rank,
                    implant_id: r.implant_id,
                    name: implant.record.name.clone(),
                    manufacturer: implant.record.manufacturer.clone(),
                    image_url: implant.record.image_url.clone(),
                    similarity: r.similarity,
                })
            })
            .collect();
        results.sort_by_key(|r| r.rank);

        Ok(Some(SubmissionRecord {
            image: image.record.clone(),
            results,
        }))
    }

    async fn check_health(&self) -> Result<()> {
        self.ensure_available()
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Staged writes of one ingestion. Dropping it discards them.
pub struct MemoryTransaction {
    store: MemoryStore,
    images: BTreeMap<i64, ImageEntry>,
    implant_vectors: HashMap<i64, Embedding>,
    results: Vec<ResultEntry>,
    processed: HashMap<i64, DateTime<Utc>>,
}

impl MemoryTransaction {
    fn new(store: MemoryStore) -> Self {
        Self {
            store,
            images: BTreeMap::new(),
            implant_vectors: HashMap::new(),
            results: Vec::new(),
            processed: HashMap::new(),
        }
    }

    async fn image_known(&self, image_id: i64) -> bool {
        self.images.contains_key(&image_id)
            || self.store.state.read().await.images.contains_key(&image_id)
    }
}

#[async_trait]
impl VectorStore for MemoryTransaction {
    async fn put(&mut self, key: VectorKey, vector: &Embedding) -> Result<()> {
        self.store.ensure_available()?;
        match key {
            VectorKey::Implant(id) => {
                if !self.store.state.read().await.implants.contains_key(&id) {
                    return Err(RaioxError::PersistenceError(format!("no entity for {key}")));
                }
                self.implant_vectors.insert(id, vector.clone());
            }
            VectorKey::Image(id) => match self.images.get_mut(&id) {
                Some(entry) => entry.vector = Some(vector.clone()),
                None => {
                    return Err(RaioxError::PersistenceError(format!(
                        "no entity for {key} in this transaction"
                    )))
                }
            },
        }
        Ok(())
    }

    async fn query(&mut self, vector: &Embedding, k: usize) -> Result<Vec<Neighbor>> {
        self.store.scan(vector, k, &self.implant_vectors).await
    }
}

#[async_trait]
impl IngestTransaction for MemoryTransaction {
    async fn insert_image(&mut self, image: &NewSubmittedImage) -> Result<i64> {
        self.store.ensure_available()?;

        let staged_duplicate = self.images.values().any(|entry| {
            entry.record.client_id == image.client_id
                && entry.record.submission_id == image.submission_id
        });
        if staged_duplicate
            || self
                .store
                .state
                .read()
                .await
                .submission_exists(&image.client_id, &image.submission_id)
        {
            return Err(RaioxError::PersistenceError(format!(
                "submission '{}' already recorded for client '{}'",
                image.submission_id, image.client_id
            )));
        }

        let id = self.store.next_image_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.images.insert(
            id,
            ImageEntry {
                record: SubmittedImageRecord {
                    id,
                    submission_id: image.submission_id.clone(),
                    client_id: image.client_id.clone(),
                    file_name: image.file_name.clone(),
                    file_path: image.file_path.clone(),
                    file_url: image.file_url.clone(),
                    metadata: image.metadata.clone(),
                    created_at: Utc::now(),
                    processed_at: None,
                },
                vector: None,
            },
        );
        Ok(id)
    }

    async fn record_results(
        &mut self,
        image_id: i64,
        submission_id: &str,
        results: &[RankedImplant],
    ) -> Result<()> {
        self.store.ensure_available()?;
        if !self.image_known(image_id).await {
            return Err(RaioxError::PersistenceError(format!(
                "image {image_id} does not exist"
            )));
        }

        {
            let state = self.store.state.read().await;
            if let Some(missing) = results
                .iter()
                .find(|r| !state.implants.contains_key(&r.implant_id))
            {
                return Err(RaioxError::PersistenceError(format!(
                    "implant {} does not exist",
                    missing.implant_id
                )));
            }
        }

        for (position, result) in results.iter().enumerate() {
            let rank = i32::try_from(position + 1)
                .map_err(|_| RaioxError::InvalidArgument("too many results".into()))?;
            self.results.push(ResultEntry {
                image_id,
                submission_id: submission_id.to_string(),
                implant_id: result.implant_id,
                similarity: result.similarity_percent,
                rank,
            });
        }
        self.processed.insert(image_id, Utc::now());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.store.ensure_available()?;
        if this.store.faults.fail_commits.load(Ordering::SeqCst) {
            return Err(RaioxError::StoreUnavailable("commit failed".into()));
        }

        let mut state = this.store.state.write().await;

        // A concurrent transaction may have committed the same submission.
        if let Some(conflict) = this.images.values().find(|entry| {
            state.submission_exists(&entry.record.client_id, &entry.record.submission_id)
        }) {
            return Err(RaioxError::PersistenceError(format!(
                "submission '{}' already recorded for client '{}'",
                conflict.record.submission_id, conflict.record.client_id
            )));
        }

        let now = Utc::now();
        for (id, vector) in this.implant_vectors {
            if let Some(entry) = state.implants.get_mut(&id) {
                entry.vector = Some(vector);
                entry.record.updated_at = now;
            }
        }
        for (id, entry) in this.images {
            state.images.insert(id, entry);
        }
        for (id, processed_at) in this.processed {
            if let Some(entry) = state.images.get_mut(&id) {
                entry.record.processed_at = Some(processed_at);
            }
        }
        state.results.extend(this.results);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(axis: usize) -> Embedding {
        let mut v = vec![0.0f32; raiox_core::EMBEDDING_DIM];
        v[axis] = 1.0;
        Embedding::from_unit(v).unwrap()
    }

    fn submission(id: &str) -> NewSubmittedImage {
        NewSubmittedImage {
            submission_id: id.to_string(),
            client_id: "clinic-7".to_string(),
            file_name: "xray.png".to_string(),
            file_path: format!("uploads/clinic-7/{id}/xray.png"),
            file_url: format!("memory://uploads/clinic-7/{id}/xray.png"),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_query_excludes_submitted_images() {
        let store = MemoryStore::new();
        store.insert_implant("A", "Acme", None, Some(unit(1))).await;

        let mut txn = store.begin().await.unwrap();
        let image_id = txn.insert_image(&submission("s1")).await.unwrap();
        txn.put(VectorKey::Image(image_id), &unit(0)).await.unwrap();

        let hits = txn.query(&unit(0), 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].implant.name, "A");
    }

    #[tokio::test]
    async fn test_dropped_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        {
            let mut txn = store.begin().await.unwrap();
            let image_id = txn.insert_image(&submission("s1")).await.unwrap();
            txn.record_results(image_id, "s1", &[]).await.unwrap();
        }
        assert_eq!(store.image_count().await, 0);
        assert!(store.find_submission("clinic-7", "s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_applies_staged_writes() {
        let store = MemoryStore::new();
        let implant = store.insert_implant("A", "Acme", None, Some(unit(1))).await;

        let mut txn = store.begin().await.unwrap();
        let image_id = txn.insert_image(&submission("s1")).await.unwrap();
        txn.put(VectorKey::Image(image_id), &unit(1)).await.unwrap();
        let ranked = raiox_core::rank(&mut *txn, &unit(1), 3).await.unwrap();
        txn.record_results(image_id, "s1", &ranked).await.unwrap();
        txn.commit().await.unwrap();

        let recorded = store.find_submission("clinic-7", "s1").await.unwrap().unwrap();
        assert!(recorded.image.processed_at.is_some());
        assert_eq!(recorded.results.len(), 1);
        assert_eq!(recorded.results[0].implant_id, implant);
        assert_eq!(recorded.results[0].rank, 1);
        assert_eq!(store.image_vector(image_id).await, Some(unit(1)));
    }

    #[tokio::test]
    async fn test_duplicate_submission_rejected() {
        let store = MemoryStore::new();
        let mut first = store.begin().await.unwrap();
        first.insert_image(&submission("dup")).await.unwrap();
        first.commit().await.unwrap();

        let mut second = store.begin().await.unwrap();
        let err = second.insert_image(&submission("dup")).await.unwrap_err();
        assert!(matches!(err, RaioxError::PersistenceError(_)));
    }

    #[tokio::test]
    async fn test_concurrent_commit_of_same_submission() {
        let store = MemoryStore::new();
        let mut a = store.begin().await.unwrap();
        let mut b = store.begin().await.unwrap();
        a.insert_image(&submission("race")).await.unwrap();
        b.insert_image(&submission("race")).await.unwrap();

        a.commit().await.unwrap();
        assert!(matches!(
            b.commit().await,
            Err(RaioxError::PersistenceError(_))
        ));
        assert_eq!(store.image_count().await, 1);
    }

    #[tokio::test]
    async fn test_staged_implant_vector_visible_only_inside() {
        let mut store = MemoryStore::new();
        let a = store.insert_implant("A", "Acme", None, Some(unit(1))).await;
        store.insert_implant("B", "Acme", None, Some(unit(2))).await;

        let mut txn = store.begin().await.unwrap();
        txn.put(VectorKey::Implant(a), &unit(0)).await.unwrap();
        assert_eq!(txn.query(&unit(0), 1).await.unwrap()[0].implant.id, a);

        let outside = store.query(&unit(0), 2).await.unwrap();
        assert!(outside.iter().all(|n| (n.distance - 1.0).abs() < 1e-9));
    }

    #[tokio::test]
    async fn test_put_unknown_entity() {
        let mut store = MemoryStore::new();
        let err = store.put(VectorKey::Implant(42), &unit(0)).await.unwrap_err();
        assert!(matches!(err, RaioxError::PersistenceError(_)));
    }

    #[tokio::test]
    async fn test_repeated_put_leaves_store_unchanged() {
        let mut store = MemoryStore::new();
        let a = store.insert_implant("A", "Acme", None, Some(unit(1))).await;
        store.insert_implant("B", "Acme", None, Some(unit(2))).await;

        store.put(VectorKey::Implant(a), &unit(0)).await.unwrap();
        let once = store.query(&unit(0), 2).await.unwrap();

        store.put(VectorKey::Implant(a), &unit(0)).await.unwrap();
        let twice = store.query(&unit(0), 2).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice[0].implant.id, a);
        assert!(twice[0].distance.abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_repeated_put_inside_transaction_leaves_state_unchanged() {
        let store = MemoryStore::new();
        let a = store.insert_implant("A", "Acme", None, Some(unit(1))).await;
        store.insert_implant("B", "Acme", None, Some(unit(2))).await;

        let mut txn = store.begin().await.unwrap();
        let image_id = txn.insert_image(&submission("s1")).await.unwrap();

        txn.put(VectorKey::Implant(a), &unit(0)).await.unwrap();
        txn.put(VectorKey::Image(image_id), &unit(3)).await.unwrap();
        let once = txn.query(&unit(0), 2).await.unwrap();

        txn.put(VectorKey::Implant(a), &unit(0)).await.unwrap();
        txn.put(VectorKey::Image(image_id), &unit(3)).await.unwrap();
        let twice = txn.query(&unit(0), 2).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 2);
        txn.commit().await.unwrap();

        assert_eq!(store.image_count().await, 1);
        assert_eq!(store.image_vector(image_id).await, Some(unit(3)));
    }

    #[tokio::test]
    async fn test_put_replaces_previous_vector() {
        let mut store = MemoryStore::new();
        let a = store.insert_implant("A", "Acme", None, Some(unit(1))).await;

        store.put(VectorKey::Implant(a), &unit(0)).await.unwrap();
        store.put(VectorKey::Implant(a), &unit(2)).await.unwrap();

        let hits = store.query(&unit(2), 1).await.unwrap();
        assert!(hits[0].distance.abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.check_health().await,
            Err(RaioxError::StoreUnavailable(_))
        ));
        assert!(store.begin().await.is_err());
    }

    #[tokio::test]
    async fn test_list_implants_pages_by_id() {
        let store = MemoryStore::new();
        for name in ["A", "B", "C", "D"] {
            store.insert_implant(name, "Acme", None, None).await;
        }
        let page = store.list_implants(1, 2).await.unwrap();
        let names: Vec<&str> = page.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["B", "C"]);
    }
}
