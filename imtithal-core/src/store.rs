//! Storage ports.
//!
//! The engine owns the traits; hosts bring durable implementations. The
//! in-memory implementations under [`memory`] back the test suite and
//! small deployments, and document the concurrency contract each trait
//! carries: chained append re-checks the expected previous hash, and
//! submission leasing is a compare-and-swap from pending to submitted.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::certificate::{
    Certificate, CertificateId, CertificateStatus, PrivateKeyMaterial,
};
use crate::chain::{ChainHead, ChainStatus, DocumentHash, DocumentId, InvoiceDocument};
use crate::invoice::InvoiceKind;
use crate::orchestrator::{RecordId, SubmissionAttempt, SubmissionKind, SubmissionRecord};
use crate::tenant::TenantScope;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("certificate {0} not found")]
    CertificateNotFound(CertificateId),
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),
    #[error("submission record {0} not found")]
    RecordNotFound(RecordId),
    #[error("no key material stored for certificate {0}")]
    KeyNotFound(CertificateId),
    #[error("chain for {scope} is halted at sequence {sequence}")]
    ChainHalted { scope: TenantScope, sequence: u64 },
    #[error("previous-hash mismatch for {scope}: expected head {expected}, found {found}")]
    ChainMismatch {
        scope: TenantScope,
        expected: DocumentHash,
        found: DocumentHash,
    },
}

#[async_trait]
pub trait CertificateRepository: Send + Sync {
    async fn insert(&self, certificate: Certificate) -> Result<(), StoreError>;

    /// Replaces the stored record wholesale, keyed by id.
    async fn update(&self, certificate: Certificate) -> Result<(), StoreError>;

    /// Makes the certificate selectable and, in the same step, expires
    /// any other selectable certificate for its scope.
    async fn activate(&self, id: CertificateId) -> Result<Certificate, StoreError>;

    async fn set_status(
        &self,
        id: CertificateId,
        status: CertificateStatus,
    ) -> Result<Certificate, StoreError>;

    async fn get(&self, id: CertificateId) -> Result<Certificate, StoreError>;

    /// The scope's single selectable certificate, if any.
    async fn selectable(&self, scope: TenantScope) -> Result<Option<Certificate>, StoreError>;

    /// Scopes that currently hold a selectable certificate, for the
    /// lifecycle monitor's sweep.
    async fn selectable_scopes(&self) -> Result<Vec<TenantScope>, StoreError>;
}

/// Fields of a document about to be appended; sequence and id are
/// assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub invoice_id: String,
    pub invoice_uuid: Uuid,
    pub kind: InvoiceKind,
    pub canonical_xml: String,
    pub content_hash: DocumentHash,
    pub previous_hash: DocumentHash,
    pub signature: Vec<u8>,
    pub certificate_id: CertificateId,
    pub qr_payload: Option<String>,
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Chained append: fails with [`StoreError::ChainMismatch`] when
    /// `previous_hash` no longer matches the head, and with
    /// [`StoreError::ChainHalted`] when the scope is halted. Assigns the
    /// next sequence number atomically with the head check.
    async fn append(
        &self,
        scope: TenantScope,
        document: NewDocument,
    ) -> Result<InvoiceDocument, StoreError>;

    async fn head(&self, scope: TenantScope) -> Result<Option<ChainHead>, StoreError>;

    /// All documents for the scope in sequence order.
    async fn list(&self, scope: TenantScope) -> Result<Vec<InvoiceDocument>, StoreError>;

    async fn get(&self, id: DocumentId) -> Result<InvoiceDocument, StoreError>;

    async fn find_by_invoice(
        &self,
        scope: TenantScope,
        invoice_uuid: Uuid,
    ) -> Result<Option<InvoiceDocument>, StoreError>;

    async fn chain_status(&self, scope: TenantScope) -> Result<ChainStatus, StoreError>;

    async fn halt_chain(&self, scope: TenantScope, sequence: u64) -> Result<(), StoreError>;

    async fn resume_chain(&self, scope: TenantScope) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn insert(&self, record: SubmissionRecord) -> Result<(), StoreError>;

    /// Compare-and-swap from pending to submitted. Returns `None` when
    /// the record is not pending, so a record can never be attempted by
    /// two workers at once.
    async fn lease(
        &self,
        id: RecordId,
        now: DateTime<Utc>,
    ) -> Result<Option<SubmissionRecord>, StoreError>;

    async fn update(&self, record: SubmissionRecord) -> Result<(), StoreError>;

    async fn append_attempt(
        &self,
        id: RecordId,
        attempt: SubmissionAttempt,
    ) -> Result<(), StoreError>;

    async fn get(&self, id: RecordId) -> Result<SubmissionRecord, StoreError>;

    /// Pending records whose retry time has arrived.
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<SubmissionRecord>, StoreError>;

    async fn current(
        &self,
        document: DocumentId,
        kind: SubmissionKind,
    ) -> Result<Option<SubmissionRecord>, StoreError>;

    async fn attempts(&self, id: RecordId) -> Result<Vec<SubmissionAttempt>, StoreError>;

    async fn find_by_invoice(
        &self,
        invoice_uuid: Uuid,
    ) -> Result<Option<SubmissionRecord>, StoreError>;
}

/// Private key storage. Nothing above the signer ever reads from it.
#[async_trait]
pub trait SecretVault: Send + Sync {
    async fn put(&self, id: CertificateId, key: PrivateKeyMaterial) -> Result<(), StoreError>;
    async fn fetch(&self, id: CertificateId) -> Result<PrivateKeyMaterial, StoreError>;
    async fn delete(&self, id: CertificateId) -> Result<(), StoreError>;
}
