//! In-memory reference implementations of the storage ports.
//!
//! These back the test suite and single-process deployments. They keep
//! the same atomicity guarantees a durable store must provide: every
//! operation that reads and writes related state does so under one lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::certificate::{Certificate, CertificateId, CertificateStatus, PrivateKeyMaterial};
use crate::chain::{ChainHead, ChainStatus, DocumentId, InvoiceDocument};
use crate::orchestrator::{RecordId, SubmissionAttempt, SubmissionKind, SubmissionRecord, SubmissionStatus};
use crate::store::{
    CertificateRepository, DocumentRepository, NewDocument, SecretVault, StoreError,
    SubmissionRepository,
};
use crate::tenant::TenantScope;

#[derive(Default)]
pub struct InMemoryCertificates {
    inner: Mutex<HashMap<CertificateId, Certificate>>,
}

impl InMemoryCertificates {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl CertificateRepository for InMemoryCertificates {
    async fn insert(&self, certificate: Certificate) -> Result<(), StoreError> {
        self.inner.lock().insert(certificate.id(), certificate);
        Ok(())
    }

    async fn update(&self, certificate: Certificate) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.contains_key(&certificate.id()) {
            return Err(StoreError::CertificateNotFound(certificate.id()));
        }
        inner.insert(certificate.id(), certificate);
        Ok(())
    }

    async fn activate(&self, id: CertificateId) -> Result<Certificate, StoreError> {
        let mut inner = self.inner.lock();
        let scope = inner
            .get(&id)
            .ok_or(StoreError::CertificateNotFound(id))?
            .scope();
        // Swap: expire whatever was selectable before activating.
        for certificate in inner.values_mut() {
            if certificate.scope() == scope
                && certificate.id() != id
                && certificate.status().is_selectable()
            {
                certificate.set_status(CertificateStatus::Expired);
            }
        }
        let certificate = inner
            .get_mut(&id)
            .ok_or(StoreError::CertificateNotFound(id))?;
        certificate.set_status(CertificateStatus::Active);
        Ok(certificate.clone())
    }

    async fn set_status(
        &self,
        id: CertificateId,
        status: CertificateStatus,
    ) -> Result<Certificate, StoreError> {
        let mut inner = self.inner.lock();
        let certificate = inner
            .get_mut(&id)
            .ok_or(StoreError::CertificateNotFound(id))?;
        certificate.set_status(status);
        Ok(certificate.clone())
    }

    async fn get(&self, id: CertificateId) -> Result<Certificate, StoreError> {
        self.inner
            .lock()
            .get(&id)
            .cloned()
            .ok_or(StoreError::CertificateNotFound(id))
    }

    async fn selectable(&self, scope: TenantScope) -> Result<Option<Certificate>, StoreError> {
        Ok(self
            .inner
            .lock()
            .values()
            .find(|c| c.scope() == scope && c.status().is_selectable())
            .cloned())
    }

    async fn selectable_scopes(&self) -> Result<Vec<TenantScope>, StoreError> {
        let scopes: HashSet<TenantScope> = self
            .inner
            .lock()
            .values()
            .filter(|c| c.status().is_selectable())
            .map(Certificate::scope)
            .collect();
        Ok(scopes.into_iter().collect())
    }
}

#[derive(Default)]
struct ChainState {
    documents: Vec<InvoiceDocument>,
    halted_at: Option<u64>,
}

#[derive(Default)]
pub struct InMemoryDocuments {
    chains: Mutex<HashMap<TenantScope, ChainState>>,
}

impl InMemoryDocuments {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocuments {
    async fn append(
        &self,
        scope: TenantScope,
        document: NewDocument,
    ) -> Result<InvoiceDocument, StoreError> {
        let mut chains = self.chains.lock();
        let chain = chains.entry(scope).or_default();
        if let Some(sequence) = chain.halted_at {
            return Err(StoreError::ChainHalted { scope, sequence });
        }
        let head_hash = chain
            .documents
            .last()
            .map(InvoiceDocument::content_hash)
            .unwrap_or_else(crate::chain::DocumentHash::zero);
        if document.previous_hash != head_hash {
            return Err(StoreError::ChainMismatch {
                scope,
                expected: document.previous_hash,
                found: head_hash,
            });
        }
        let sequence = chain.documents.len() as u64 + 1;
        let stored = InvoiceDocument::from_new(
            DocumentId::generate(),
            scope,
            sequence,
            Utc::now(),
            document,
        );
        chain.documents.push(stored.clone());
        Ok(stored)
    }

    async fn head(&self, scope: TenantScope) -> Result<Option<ChainHead>, StoreError> {
        Ok(self
            .chains
            .lock()
            .get(&scope)
            .and_then(|chain| chain.documents.last())
            .map(|document| ChainHead {
                sequence: document.sequence(),
                content_hash: document.content_hash(),
            }))
    }

    async fn list(&self, scope: TenantScope) -> Result<Vec<InvoiceDocument>, StoreError> {
        Ok(self
            .chains
            .lock()
            .get(&scope)
            .map(|chain| chain.documents.clone())
            .unwrap_or_default())
    }

    async fn get(&self, id: DocumentId) -> Result<InvoiceDocument, StoreError> {
        self.chains
            .lock()
            .values()
            .flat_map(|chain| chain.documents.iter())
            .find(|document| document.id() == id)
            .cloned()
            .ok_or(StoreError::DocumentNotFound(id))
    }

    async fn find_by_invoice(
        &self,
        scope: TenantScope,
        invoice_uuid: Uuid,
    ) -> Result<Option<InvoiceDocument>, StoreError> {
        Ok(self
            .chains
            .lock()
            .get(&scope)
            .and_then(|chain| {
                chain
                    .documents
                    .iter()
                    .find(|document| document.invoice_uuid() == invoice_uuid)
            })
            .cloned())
    }

    async fn chain_status(&self, scope: TenantScope) -> Result<ChainStatus, StoreError> {
        Ok(self
            .chains
            .lock()
            .get(&scope)
            .and_then(|chain| chain.halted_at)
            .map_or(ChainStatus::Open, |sequence| ChainStatus::Halted {
                sequence,
            }))
    }

    async fn halt_chain(&self, scope: TenantScope, sequence: u64) -> Result<(), StoreError> {
        self.chains.lock().entry(scope).or_default().halted_at = Some(sequence);
        Ok(())
    }

    async fn resume_chain(&self, scope: TenantScope) -> Result<(), StoreError> {
        if let Some(chain) = self.chains.lock().get_mut(&scope) {
            chain.halted_at = None;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySubmissions {
    records: Mutex<HashMap<RecordId, SubmissionRecord>>,
    attempts: Mutex<HashMap<RecordId, Vec<SubmissionAttempt>>>,
}

impl InMemorySubmissions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl SubmissionRepository for InMemorySubmissions {
    async fn insert(&self, record: SubmissionRecord) -> Result<(), StoreError> {
        self.records.lock().insert(record.id(), record);
        Ok(())
    }

    async fn lease(
        &self,
        id: RecordId,
        now: DateTime<Utc>,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        let mut records = self.records.lock();
        let record = records.get_mut(&id).ok_or(StoreError::RecordNotFound(id))?;
        if record.status() != SubmissionStatus::Pending {
            return Ok(None);
        }
        record.mark_submitted(now);
        Ok(Some(record.clone()))
    }

    async fn update(&self, record: SubmissionRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        if !records.contains_key(&record.id()) {
            return Err(StoreError::RecordNotFound(record.id()));
        }
        records.insert(record.id(), record);
        Ok(())
    }

    async fn append_attempt(
        &self,
        id: RecordId,
        attempt: SubmissionAttempt,
    ) -> Result<(), StoreError> {
        self.attempts.lock().entry(id).or_default().push(attempt);
        Ok(())
    }

    async fn get(&self, id: RecordId) -> Result<SubmissionRecord, StoreError> {
        self.records
            .lock()
            .get(&id)
            .cloned()
            .ok_or(StoreError::RecordNotFound(id))
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<SubmissionRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|record| {
                record.status() == SubmissionStatus::Pending
                    && record.next_retry_at().is_some_and(|at| at <= now)
            })
            .cloned()
            .collect())
    }

    async fn current(
        &self,
        document: DocumentId,
        kind: SubmissionKind,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|record| record.document_id() == document && record.kind() == kind)
            .max_by_key(|record| record.created_at())
            .cloned())
    }

    async fn attempts(&self, id: RecordId) -> Result<Vec<SubmissionAttempt>, StoreError> {
        Ok(self.attempts.lock().get(&id).cloned().unwrap_or_default())
    }

    async fn find_by_invoice(
        &self,
        invoice_uuid: Uuid,
    ) -> Result<Option<SubmissionRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|record| record.invoice_uuid() == invoice_uuid)
            .max_by_key(|record| record.created_at())
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryVault {
    keys: Mutex<HashMap<CertificateId, PrivateKeyMaterial>>,
}

impl InMemoryVault {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl SecretVault for InMemoryVault {
    async fn put(&self, id: CertificateId, key: PrivateKeyMaterial) -> Result<(), StoreError> {
        self.keys.lock().insert(id, key);
        Ok(())
    }

    async fn fetch(&self, id: CertificateId) -> Result<PrivateKeyMaterial, StoreError> {
        self.keys
            .lock()
            .get(&id)
            .cloned()
            .ok_or(StoreError::KeyNotFound(id))
    }

    async fn delete(&self, id: CertificateId) -> Result<(), StoreError> {
        self.keys.lock().remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::ApiCredentials;
    use crate::chain::DocumentHash;
    use crate::config::EnvironmentType;
    use crate::csr::SubjectAttributes;
    use crate::invoice::InvoiceKind;
    use crate::tenant::OrganizationId;

    fn scope() -> TenantScope {
        TenantScope::new(OrganizationId::generate(), EnvironmentType::Sandbox)
    }

    fn subject() -> SubjectAttributes {
        SubjectAttributes::new(
            "TST-1".into(),
            "1-Device|2-v1|3-abc".into(),
            "399999999900003".into(),
            "Riyadh Branch".into(),
            "Example Trading Co".into(),
            "SA".into(),
            "1100".into(),
            "Riyadh".into(),
            "Retail".into(),
        )
        .unwrap()
    }

    fn new_document(previous: DocumentHash, body: &str) -> NewDocument {
        NewDocument {
            invoice_id: "INV-1".into(),
            invoice_uuid: Uuid::new_v4(),
            kind: InvoiceKind::Standard,
            canonical_xml: body.to_string(),
            content_hash: DocumentHash::digest(body.as_bytes()),
            previous_hash: previous,
            signature: vec![0x30],
            certificate_id: CertificateId::generate(),
            qr_payload: None,
        }
    }

    #[tokio::test]
    async fn append_links_and_numbers_documents() {
        let repo = InMemoryDocuments::new();
        let scope = scope();

        let first = repo
            .append(scope, new_document(DocumentHash::zero(), "<a/>"))
            .await
            .unwrap();
        assert_eq!(first.sequence(), 1);
        assert!(first.previous_hash().is_zero());

        let second = repo
            .append(scope, new_document(first.content_hash(), "<b/>"))
            .await
            .unwrap();
        assert_eq!(second.sequence(), 2);
        assert_eq!(second.previous_hash(), first.content_hash());
    }

    #[tokio::test]
    async fn append_rejects_stale_previous_hash() {
        let repo = InMemoryDocuments::new();
        let scope = scope();
        repo.append(scope, new_document(DocumentHash::zero(), "<a/>"))
            .await
            .unwrap();

        let stale = repo
            .append(scope, new_document(DocumentHash::zero(), "<b/>"))
            .await;
        assert!(matches!(stale, Err(StoreError::ChainMismatch { .. })));
    }

    #[tokio::test]
    async fn halted_chain_refuses_appends_until_resumed() {
        let repo = InMemoryDocuments::new();
        let scope = scope();
        repo.halt_chain(scope, 3).await.unwrap();

        let result = repo
            .append(scope, new_document(DocumentHash::zero(), "<a/>"))
            .await;
        assert!(matches!(
            result,
            Err(StoreError::ChainHalted { sequence: 3, .. })
        ));

        repo.resume_chain(scope).await.unwrap();
        assert!(repo
            .append(scope, new_document(DocumentHash::zero(), "<a/>"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn lease_is_single_shot_until_rescheduled() {
        let documents = InMemoryDocuments::new();
        let scope = scope();
        let document = documents
            .append(scope, new_document(DocumentHash::zero(), "<a/>"))
            .await
            .unwrap();

        let submissions = InMemorySubmissions::new();
        let record = SubmissionRecord::open(
            &document,
            SubmissionKind::Clearance,
            None,
        );
        let id = record.id();
        submissions.insert(record).await.unwrap();

        let now = Utc::now();
        assert!(submissions.lease(id, now).await.unwrap().is_some());
        assert!(submissions.lease(id, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn selectable_scopes_deduplicates_in_any_order() {
        let repo = InMemoryCertificates::new();
        let first = scope();
        let second = scope();

        // Two selectable certificates in one scope, interleaved with another,
        // must still yield each scope exactly once.
        for s in [first, second, first] {
            let certificate = Certificate::pending(
                s,
                "PEM".into(),
                ApiCredentials::new("token", "secret"),
                None,
                subject(),
                Utc::now() + chrono::Duration::days(365),
            );
            let id = certificate.id();
            repo.insert(certificate).await.unwrap();
            repo.set_status(id, CertificateStatus::Active).await.unwrap();
        }

        let scopes = repo.selectable_scopes().await.unwrap();
        assert_eq!(scopes.len(), 2);
        assert!(scopes.contains(&first));
        assert!(scopes.contains(&second));
    }

    #[tokio::test]
    async fn vault_round_trip_and_delete() {
        let vault = InMemoryVault::new();
        let id = CertificateId::generate();
        vault
            .put(id, PrivateKeyMaterial::new(vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(vault.fetch(id).await.unwrap().as_bytes(), &[1, 2, 3]);
        vault.delete(id).await.unwrap();
        assert!(matches!(
            vault.fetch(id).await,
            Err(StoreError::KeyNotFound(_))
        ));
    }
}
