//! The compliance engine facade.
//!
//! One entry point that wires canonicalization, chain signing, and
//! submission orchestration together. Hosts hand it finalized invoice
//! records and get back a handle they can poll for the authority's
//! verdict.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::api::{AuthorityClient, AuthorityError, AuthorityMessage};
use crate::certificate::{CertificateError, CertificateStore};
use crate::chain::{ChainReport, ChainSigner, ChainStatus, DocumentId, SignError};
use crate::config::EngineConfig;
use crate::invoice::builder::{build, BuildError};
use crate::invoice::InvoiceRecord;
use crate::notify::Notifier;
use crate::orchestrator::{
    OrchestratorError, RecordId, SubmissionKind, SubmissionOrchestrator, SubmissionRecord,
    SubmissionStatus,
};
use crate::store::memory::{
    InMemoryCertificates, InMemoryDocuments, InMemorySubmissions, InMemoryVault,
};
use crate::store::{
    CertificateRepository, DocumentRepository, SecretVault, StoreError, SubmissionRepository,
};
use crate::tenant::TenantScope;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error(transparent)]
    Submission(#[from] OrchestratorError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Certificate(#[from] CertificateError),
    #[error(transparent)]
    Authority(#[from] AuthorityError),
    #[error("document rejected by the authority")]
    Rejected { reasons: Vec<AuthorityMessage> },
    #[error("no submission found for invoice {0}")]
    UnknownInvoice(Uuid),
}

/// Reference to a signed and enqueued document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionHandle {
    pub document_id: DocumentId,
    pub record_id: RecordId,
    pub kind: SubmissionKind,
}

/// Point-in-time view of an invoice's compliance state.
#[derive(Debug, Clone)]
pub struct ComplianceStatus {
    pub record_id: RecordId,
    pub kind: SubmissionKind,
    pub status: SubmissionStatus,
    pub authority_reference: Option<String>,
    pub warnings: Vec<AuthorityMessage>,
    pub rejection_reasons: Vec<AuthorityMessage>,
    pub retry_count: u32,
    pub next_retry_at: Option<chrono::DateTime<chrono::Utc>>,
    pub deadline: Option<chrono::DateTime<chrono::Utc>>,
}

impl ComplianceStatus {
    fn from_record(record: &SubmissionRecord) -> Self {
        Self {
            record_id: record.id(),
            kind: record.kind(),
            status: record.status(),
            authority_reference: record.authority_reference().map(str::to_string),
            warnings: record.warnings().to_vec(),
            rejection_reasons: record.rejection_reasons().to_vec(),
            retry_count: record.retry_count(),
            next_retry_at: record.next_retry_at(),
            deadline: record.deadline(),
        }
    }
}

pub struct ComplianceEngine {
    certificates: CertificateStore,
    signer: ChainSigner,
    orchestrator: Arc<SubmissionOrchestrator>,
    submissions: Arc<dyn SubmissionRepository>,
    config: EngineConfig,
}

impl ComplianceEngine {
    pub fn new(
        config: EngineConfig,
        certificate_repository: Arc<dyn CertificateRepository>,
        document_repository: Arc<dyn DocumentRepository>,
        submission_repository: Arc<dyn SubmissionRepository>,
        vault: Arc<dyn SecretVault>,
        client: Arc<dyn AuthorityClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let certificates =
            CertificateStore::new(certificate_repository, vault, Arc::clone(&client));
        let signer = ChainSigner::new(Arc::clone(&document_repository), certificates.clone());
        let orchestrator = Arc::new(SubmissionOrchestrator::new(
            Arc::clone(&submission_repository),
            document_repository,
            certificates.clone(),
            client,
            notifier,
            config.clone(),
        ));
        Self {
            certificates,
            signer,
            orchestrator,
            submissions: submission_repository,
            config,
        }
    }

    /// All state in process memory. Suitable for tests and evaluation
    /// setups, not for anything that must survive a restart.
    pub fn in_memory(
        config: EngineConfig,
        client: Arc<dyn AuthorityClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::new(
            config,
            InMemoryCertificates::new(),
            InMemoryDocuments::new(),
            InMemorySubmissions::new(),
            InMemoryVault::new(),
            client,
            notifier,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Certificate lifecycle operations (onboarding, renewal, revocation).
    pub fn certificates(&self) -> &CertificateStore {
        &self.certificates
    }

    /// The scheduler half of the engine, for hosts that spawn its
    /// background loop.
    pub fn orchestrator(&self) -> &Arc<SubmissionOrchestrator> {
        &self.orchestrator
    }

    /// Validates, canonicalizes, signs, and submits an invoice record.
    ///
    /// A terminal rejection from the authority surfaces as
    /// [`EngineError::Rejected`]; the signed document and its submission
    /// record are kept either way, so the audit trail covers rejected
    /// documents too. Any non-rejected outcome returns a handle, with
    /// retries continuing in the background where the first attempt
    /// failed transiently.
    pub async fn submit(
        &self,
        scope: TenantScope,
        record: &InvoiceRecord,
    ) -> Result<SubmissionHandle, EngineError> {
        let canonical = build(record)?;
        let document = self.signer.sign(scope, &canonical).await?;
        let submission = self.orchestrator.enqueue(&document).await?;

        if submission.status() == SubmissionStatus::Rejected {
            return Err(EngineError::Rejected {
                reasons: submission.rejection_reasons().to_vec(),
            });
        }
        Ok(SubmissionHandle {
            document_id: document.id(),
            record_id: submission.id(),
            kind: submission.kind(),
        })
    }

    /// Latest submission state for an invoice, looked up by its UUID.
    pub async fn status(&self, invoice_uuid: Uuid) -> Result<ComplianceStatus, EngineError> {
        let record = self
            .submissions
            .find_by_invoice(invoice_uuid)
            .await?
            .ok_or(EngineError::UnknownInvoice(invoice_uuid))?;
        Ok(ComplianceStatus::from_record(&record))
    }

    /// Operator override for parked submissions.
    pub async fn retry_now(&self, id: RecordId) -> Result<ComplianceStatus, EngineError> {
        let record = self.orchestrator.retry_now(id).await?;
        Ok(ComplianceStatus::from_record(&record))
    }

    pub async fn verify_chain(&self, scope: TenantScope) -> Result<ChainReport, EngineError> {
        Ok(self.signer.verify(scope).await?)
    }

    pub async fn resume_chain(&self, scope: TenantScope) -> Result<(), EngineError> {
        Ok(self.signer.resume(scope).await?)
    }

    pub async fn chain_status(&self, scope: TenantScope) -> Result<ChainStatus, EngineError> {
        Ok(self.signer.chain_status(scope).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use iso_currency::Currency;
    use isocountry::CountryCode;
    use k256::ecdsa::SigningKey;
    use k256::pkcs8::EncodePrivateKey;
    use rand_core::OsRng;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::api::{IssuedCredentials, SubmissionOutcome, SubmissionPayload};
    use crate::certificate::{ApiCredentials, Certificate, PrivateKeyMaterial};
    use crate::config::EnvironmentType;
    use crate::csr::SubjectAttributes;
    use crate::invoice::{
        Address, InvoiceFlags, InvoiceKind, InvoiceRecordFields, InvoiceTotals, LineItem, Party,
        SellerRole, VatCategory,
    };
    use crate::notify::{RecordingNotifier, Severity};
    use crate::tenant::OrganizationId;

    struct ScriptedClient {
        outcome: SubmissionOutcome,
    }

    #[async_trait]
    impl AuthorityClient for ScriptedClient {
        async fn clear(
            &self,
            _: &ApiCredentials,
            _: &SubmissionPayload,
        ) -> SubmissionOutcome {
            self.outcome.clone()
        }

        async fn report(
            &self,
            _: &ApiCredentials,
            _: &SubmissionPayload,
        ) -> SubmissionOutcome {
            self.outcome.clone()
        }

        async fn check_compliance(
            &self,
            _: &ApiCredentials,
            _: &SubmissionPayload,
        ) -> SubmissionOutcome {
            self.outcome.clone()
        }

        async fn request_compliance_credentials(
            &self,
            _: &str,
            _: &str,
        ) -> Result<IssuedCredentials, AuthorityError> {
            unimplemented!("not exercised")
        }

        async fn request_production_credentials(
            &self,
            _: &IssuedCredentials,
        ) -> Result<IssuedCredentials, AuthorityError> {
            unimplemented!("not exercised")
        }

        async fn renew_credentials(
            &self,
            _: &ApiCredentials,
            _: &str,
            _: Option<&str>,
        ) -> Result<IssuedCredentials, AuthorityError> {
            unimplemented!("not exercised")
        }
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

    async fn install_certificate(engine: &ComplianceEngine, scope: TenantScope) {
        let certificate = Certificate::pending(
            scope,
            "-----BEGIN CERTIFICATE-----\n-----END CERTIFICATE-----\n".into(),
            ApiCredentials::new("token", "secret"),
            Some(1),
            subject(),
            Utc::now() + ChronoDuration::days(365),
        );
        let id = certificate.id();
        let key = SigningKey::random(&mut OsRng);
        let der = key.to_pkcs8_der().unwrap().as_bytes().to_vec();
        engine
            .certificates()
            .vault()
            .put(id, PrivateKeyMaterial::new(der))
            .await
            .unwrap();
        engine
            .certificates()
            .repository()
            .insert(certificate)
            .await
            .unwrap();
        engine
            .certificates()
            .repository()
            .activate(id)
            .await
            .unwrap();
    }

    fn invoice(kind: InvoiceKind, id: &str) -> InvoiceRecord {
        let address = Address {
            country_code: CountryCode::SAU,
            city: "Riyadh".into(),
            street: "King Fahd Rd".into(),
            additional_street: None,
            building_number: "7235".into(),
            additional_number: None,
            postal_code: "12212".into(),
            subdivision: None,
            district: None,
        };
        let seller = Party::<SellerRole>::new(
            "Example Trading Co".into(),
            address,
            "399999999900003",
            None,
        )
        .unwrap();
        let line_items = vec![LineItem::new(
            "Consulting hour".into(),
            dec!(2),
            "HUR".into(),
            dec!(150.00),
            VatCategory::Standard,
        )];
        let totals = InvoiceTotals::compute(&line_items, Decimal::ZERO);
        InvoiceRecord::new(InvoiceRecordFields {
            id: id.into(),
            uuid: Uuid::new_v4(),
            kind,
            issue_datetime: Utc::now(),
            currency: Currency::SAR,
            seller,
            buyer: None,
            line_items,
            totals,
            discount_total: Decimal::ZERO,
            note: None,
            original_invoice: None,
            correction_reason: None,
            payment_means_code: None,
            flags: InvoiceFlags::empty(),
        })
    }

    fn engine_with(outcome: SubmissionOutcome) -> (ComplianceEngine, Arc<RecordingNotifier>) {
        let notifier = RecordingNotifier::new();
        let engine = ComplianceEngine::in_memory(
            EngineConfig::new(EnvironmentType::Sandbox),
            Arc::new(ScriptedClient { outcome }),
            notifier.clone(),
        );
        (engine, notifier)
    }

    #[tokio::test]
    async fn accepted_submission_round_trips_through_status() {
        let (engine, _) = engine_with(SubmissionOutcome::Accepted {
            authority_reference: "42".into(),
        });
        let scope = TenantScope::new(OrganizationId::generate(), EnvironmentType::Sandbox);
        install_certificate(&engine, scope).await;

        let record = invoice(InvoiceKind::Simplified, "SME-1");
        let uuid = record.uuid();
        let handle = engine.submit(scope, &record).await.unwrap();
        assert_eq!(handle.kind, SubmissionKind::Reporting);

        let status = engine.status(uuid).await.unwrap();
        assert_eq!(status.status, SubmissionStatus::Accepted);
        assert_eq!(status.authority_reference.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn rejection_surfaces_as_error_but_keeps_the_record() {
        let (engine, notifier) = engine_with(SubmissionOutcome::Rejected {
            reasons: vec![AuthorityMessage::from_text("BR-KSA-37", "bad address")],
        });
        let scope = TenantScope::new(OrganizationId::generate(), EnvironmentType::Sandbox);
        install_certificate(&engine, scope).await;

        let record = invoice(InvoiceKind::Simplified, "SME-2");
        let uuid = record.uuid();
        let result = engine.submit(scope, &record).await;
        assert!(matches!(result, Err(EngineError::Rejected { .. })));

        let status = engine.status(uuid).await.unwrap();
        assert_eq!(status.status, SubmissionStatus::Rejected);
        assert_eq!(status.rejection_reasons[0].code(), Some("BR-KSA-37"));
        assert_eq!(notifier.with_severity(Severity::Critical).len(), 1);
    }

    #[tokio::test]
    async fn chain_survives_consecutive_submissions_and_verifies() {
        let (engine, _) = engine_with(SubmissionOutcome::Accepted {
            authority_reference: "1".into(),
        });
        let scope = TenantScope::new(OrganizationId::generate(), EnvironmentType::Sandbox);
        install_certificate(&engine, scope).await;

        engine
            .submit(scope, &invoice(InvoiceKind::Simplified, "SME-3"))
            .await
            .unwrap();
        engine
            .submit(scope, &invoice(InvoiceKind::Simplified, "SME-4"))
            .await
            .unwrap();

        let report = engine.verify_chain(scope).await.unwrap();
        assert_eq!(report.documents, 2);
        assert!(report.break_at.is_none());
        assert_eq!(engine.chain_status(scope).await.unwrap(), ChainStatus::Open);
    }

    #[tokio::test]
    async fn unknown_invoice_status_is_an_error() {
        let (engine, _) = engine_with(SubmissionOutcome::Accepted {
            authority_reference: "1".into(),
        });
        let missing = Uuid::new_v4();
        assert!(matches!(
            engine.status(missing).await,
            Err(EngineError::UnknownInvoice(u)) if u == missing
        ));
    }
}
