//! Hash-chained document signing.
//!
//! Every signed document for a scope links to its predecessor through
//! `previous_hash`; the first document links to the all-zero sentinel.
//! Signing is serialized per scope so concurrent submissions can never
//! fork the chain, and a detected break halts the scope until an
//! operator resumes it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use k256::ecdsa::{signature::Signer, Signature, SigningKey};
use k256::pkcs8::DecodePrivateKey;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;
use x509_cert::spki::EncodePublicKey;

use crate::certificate::{CertificateError, CertificateId, CertificateStore};
use crate::invoice::builder::CanonicalInvoice;
use crate::invoice::qr::{QrError, QrPayload};
use crate::invoice::InvoiceKind;
use crate::store::{DocumentRepository, NewDocument, StoreError};
use crate::tenant::TenantScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// SHA-256 digest in the chain. The all-zero value is the sentinel
/// carried by a scope's first document.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHash([u8; 32]);

impl DocumentHash {
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn digest(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in &self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid document hash: {0}")]
pub struct ParseHashError(String);

impl FromStr for DocumentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(ParseHashError(format!("expected 64 hex chars, got {}", s.len())));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(chunk)
                .map_err(|_| ParseHashError("non-utf8 input".into()))?;
            bytes[i] = u8::from_str_radix(hex, 16)
                .map_err(|_| ParseHashError(format!("bad hex pair '{hex}'")))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for DocumentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for DocumentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentHash({})", self.to_hex())
    }
}

/// Chain position of a scope's latest document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHead {
    pub sequence: u64,
    pub content_hash: DocumentHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    Open,
    Halted { sequence: u64 },
}

/// An immutable signed document appended to a scope's chain.
#[derive(Debug, Clone)]
pub struct InvoiceDocument {
    id: DocumentId,
    scope: TenantScope,
    invoice_id: String,
    invoice_uuid: Uuid,
    kind: InvoiceKind,
    canonical_xml: String,
    content_hash: DocumentHash,
    previous_hash: DocumentHash,
    sequence: u64,
    signature: Vec<u8>,
    certificate_id: CertificateId,
    qr_payload: Option<String>,
    created_at: DateTime<Utc>,
}

impl InvoiceDocument {
    pub(crate) fn from_new(
        id: DocumentId,
        scope: TenantScope,
        sequence: u64,
        created_at: DateTime<Utc>,
        new: NewDocument,
    ) -> Self {
        Self {
            id,
            scope,
            invoice_id: new.invoice_id,
            invoice_uuid: new.invoice_uuid,
            kind: new.kind,
            canonical_xml: new.canonical_xml,
            content_hash: new.content_hash,
            previous_hash: new.previous_hash,
            sequence,
            signature: new.signature,
            certificate_id: new.certificate_id,
            qr_payload: new.qr_payload,
            created_at,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn scope(&self) -> TenantScope {
        self.scope
    }

    pub fn invoice_id(&self) -> &str {
        &self.invoice_id
    }

    pub fn invoice_uuid(&self) -> Uuid {
        self.invoice_uuid
    }

    pub fn kind(&self) -> InvoiceKind {
        self.kind
    }

    pub fn canonical_xml(&self) -> &str {
        &self.canonical_xml
    }

    pub fn content_hash(&self) -> DocumentHash {
        self.content_hash
    }

    pub fn previous_hash(&self) -> DocumentHash {
        self.previous_hash
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// DER-encoded ECDSA signature over the signable payload.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn certificate_id(&self) -> CertificateId {
        self.certificate_id
    }

    /// Present on simplified documents only.
    pub fn qr_payload(&self) -> Option<&str> {
        self.qr_payload.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// The payload that actually gets signed: canonical bytes followed by
/// the previous hash in hex, binding each signature to chain position.
fn signable_payload(canonical_xml: &str, previous_hash: DocumentHash) -> Vec<u8> {
    let mut payload = canonical_xml.as_bytes().to_vec();
    payload.extend_from_slice(previous_hash.to_hex().as_bytes());
    payload
}

#[derive(Debug, Error)]
pub enum SignError {
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to load signing key: {0}")]
    Key(String),
    #[error(transparent)]
    Qr(#[from] QrError),
}

/// Where a chain verification found the first inconsistency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    /// Stored content hash does not match the canonical bytes.
    ContentMismatch,
    /// `previous_hash` does not match the predecessor's content hash.
    LinkMismatch,
    /// Sequence numbers are not contiguous from 1.
    SequenceGap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainBreak {
    pub sequence: u64,
    pub kind: BreakKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub scope: TenantScope,
    pub documents: u64,
    pub break_at: Option<ChainBreak>,
}

/// Signs canonical invoices into per-scope hash chains.
pub struct ChainSigner {
    documents: Arc<dyn DocumentRepository>,
    certificates: CertificateStore,
    locks: Mutex<HashMap<TenantScope, Arc<tokio::sync::Mutex<()>>>>,
}

impl ChainSigner {
    pub fn new(documents: Arc<dyn DocumentRepository>, certificates: CertificateStore) -> Self {
        Self {
            documents,
            certificates,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn scope_lock(&self, scope: TenantScope) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(scope)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Signs a canonical invoice and appends it to the scope's chain.
    ///
    /// Holds the scope lock across the read-sign-append sequence, and the
    /// repository re-checks the expected previous hash on append, so two
    /// concurrent signings can never both claim the same predecessor.
    ///
    /// # Errors
    /// Fails without touching the chain when the scope is halted, has no
    /// selectable certificate, or the key cannot be loaded.
    pub async fn sign(
        &self,
        scope: TenantScope,
        canonical: &CanonicalInvoice,
    ) -> Result<InvoiceDocument, SignError> {
        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;

        if let ChainStatus::Halted { sequence } = self.documents.chain_status(scope).await? {
            return Err(StoreError::ChainHalted { scope, sequence }.into());
        }

        let certificate = self.certificates.get_active(scope).await?;
        let previous_hash = self
            .documents
            .head(scope)
            .await?
            .map(|head| head.content_hash)
            .unwrap_or_else(DocumentHash::zero);

        let content_hash = DocumentHash::digest(canonical.xml().as_bytes());
        let payload = signable_payload(canonical.xml(), previous_hash);

        let key_material = self.certificates.vault().fetch(certificate.id()).await?;
        let key = SigningKey::from_pkcs8_der(key_material.as_bytes())
            .map_err(|e| SignError::Key(e.to_string()))?;
        let signature: Signature = key.sign(&payload);
        let signature_der = signature.to_der().as_bytes().to_vec();

        let qr_payload = if canonical.kind().is_simplified() {
            let public_key_der = key
                .verifying_key()
                .to_public_key_der()
                .map_err(|e| SignError::Key(e.to_string()))?;
            let encoded = QrPayload::from_canonical(canonical)
                .with_signing_parts(
                    content_hash.to_hex(),
                    Base64::encode_string(&signature_der),
                    public_key_der.as_bytes().to_vec(),
                )
                .encode()?;
            Some(encoded)
        } else {
            None
        };

        let document = self
            .documents
            .append(
                scope,
                NewDocument {
                    invoice_id: canonical.invoice_id().to_string(),
                    invoice_uuid: canonical.invoice_uuid(),
                    kind: canonical.kind(),
                    canonical_xml: canonical.xml().to_string(),
                    content_hash,
                    previous_hash,
                    signature: signature_der,
                    certificate_id: certificate.id(),
                    qr_payload,
                },
            )
            .await?;
        info!(
            scope = %scope,
            invoice = document.invoice_id(),
            sequence = document.sequence(),
            hash = %document.content_hash(),
            "document signed and chained"
        );
        Ok(document)
    }

    /// Walks the scope's full chain and reports the first inconsistency.
    /// A broken chain is halted immediately; signing for the scope fails
    /// until [`ChainSigner::resume`] is called after reconciliation.
    pub async fn verify(&self, scope: TenantScope) -> Result<ChainReport, SignError> {
        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;

        let documents = self.documents.list(scope).await?;
        let mut previous: Option<&InvoiceDocument> = None;
        let mut break_at = None;

        for (index, document) in documents.iter().enumerate() {
            let expected_sequence = index as u64 + 1;
            let kind = if document.sequence() != expected_sequence {
                Some(BreakKind::SequenceGap)
            } else if document.content_hash()
                != DocumentHash::digest(document.canonical_xml().as_bytes())
            {
                Some(BreakKind::ContentMismatch)
            } else {
                let expected_previous = previous
                    .map(|p| p.content_hash())
                    .unwrap_or_else(DocumentHash::zero);
                (document.previous_hash() != expected_previous).then_some(BreakKind::LinkMismatch)
            };

            if let Some(kind) = kind {
                break_at = Some(ChainBreak {
                    sequence: document.sequence(),
                    kind,
                });
                break;
            }
            previous = Some(document);
        }

        if let Some(chain_break) = break_at {
            self.documents
                .halt_chain(scope, chain_break.sequence)
                .await?;
            warn!(
                scope = %scope,
                sequence = chain_break.sequence,
                kind = ?chain_break.kind,
                "chain integrity break, scope halted"
            );
        }

        Ok(ChainReport {
            scope,
            documents: documents.len() as u64,
            break_at,
        })
    }

    /// Reopens a halted chain after operator reconciliation.
    pub async fn resume(&self, scope: TenantScope) -> Result<(), SignError> {
        self.documents.resume_chain(scope).await?;
        info!(scope = %scope, "chain resumed");
        Ok(())
    }

    pub async fn chain_status(&self, scope: TenantScope) -> Result<ChainStatus, SignError> {
        Ok(self.documents.chain_status(scope).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_round_trips_hex() {
        let zero = DocumentHash::zero();
        assert!(zero.is_zero());
        assert_eq!(zero.to_hex(), "0".repeat(64));
        assert_eq!(zero.to_hex().parse::<DocumentHash>().unwrap(), zero);
    }

    #[test]
    fn digest_matches_known_vector() {
        // SHA-256 of the empty string.
        let hash = DocumentHash::digest(b"");
        assert_eq!(
            hash.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn parse_rejects_bad_lengths_and_chars() {
        assert!("abc".parse::<DocumentHash>().is_err());
        assert!("zz".repeat(32).parse::<DocumentHash>().is_err());
    }

    #[test]
    fn signable_payload_appends_previous_hash_hex() {
        let previous = DocumentHash::digest(b"first");
        let payload = signable_payload("<xml/>", previous);
        assert!(payload.starts_with(b"<xml/>"));
        assert!(payload.ends_with(previous.to_hex().as_bytes()));
        assert_eq!(payload.len(), 6 + 64);
    }

    #[test]
    fn hash_debug_does_not_leak_struct_internals() {
        let hash = DocumentHash::digest(b"x");
        assert!(format!("{hash:?}").starts_with("DocumentHash("));
    }
}
