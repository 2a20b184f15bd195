//! Submission orchestration.
//!
//! Each signed document gets one submission record per obligation kind.
//! Records move pending -> submitted -> terminal, with transient
//! failures cycling back to pending under exponential backoff. Clearance
//! gives up after a bounded number of retries; reporting retries toward
//! its regulatory deadline and escalates as the deadline approaches.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::{AuthorityClient, AuthorityMessage, SubmissionOutcome, SubmissionPayload, TransientCause};
use crate::certificate::CertificateStore;
use crate::chain::{DocumentId, InvoiceDocument};
use crate::config::EngineConfig;
use crate::invoice::InvoiceKind;
use crate::notify::{Notifier, Severity};
use crate::store::{StoreError, SubmissionRepository};
use crate::tenant::TenantScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which obligation the submission discharges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionKind {
    /// Pre-issuance clearance for standard documents.
    Clearance,
    /// Post-issuance reporting for simplified documents.
    Reporting,
}

impl SubmissionKind {
    pub fn for_invoice(kind: InvoiceKind) -> Self {
        if kind.is_simplified() {
            SubmissionKind::Reporting
        } else {
            SubmissionKind::Clearance
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::Clearance => "clearance",
            SubmissionKind::Reporting => "reporting",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Pending,
    Submitted,
    Accepted,
    /// Accepted, but the authority attached warnings.
    Warning,
    Rejected,
    /// Transient failures exhausted or deadline passed; waits for an
    /// operator's retry_now.
    FailedTransient,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Accepted | SubmissionStatus::Warning | SubmissionStatus::Rejected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::Warning => "warning",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::FailedTransient => "failed_transient",
        }
    }
}

/// One attempt against the authority, kept as an append-only audit row.
#[derive(Debug, Clone)]
pub struct SubmissionAttempt {
    pub number: u32,
    pub at: DateTime<Utc>,
    pub outcome: SubmissionOutcome,
}

/// The durable submission state for one document and obligation.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    id: RecordId,
    document_id: DocumentId,
    scope: TenantScope,
    invoice_id: String,
    invoice_uuid: Uuid,
    kind: SubmissionKind,
    status: SubmissionStatus,
    authority_reference: Option<String>,
    warnings: Vec<AuthorityMessage>,
    rejection_reasons: Vec<AuthorityMessage>,
    retry_count: u32,
    next_retry_at: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
    deadline_alerted: bool,
    created_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    decided_at: Option<DateTime<Utc>>,
}

impl SubmissionRecord {
    pub fn open(
        document: &InvoiceDocument,
        kind: SubmissionKind,
        deadline: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::generate(),
            document_id: document.id(),
            scope: document.scope(),
            invoice_id: document.invoice_id().to_string(),
            invoice_uuid: document.invoice_uuid(),
            kind,
            status: SubmissionStatus::Pending,
            authority_reference: None,
            warnings: Vec::new(),
            rejection_reasons: Vec::new(),
            retry_count: 0,
            next_retry_at: Some(now),
            deadline,
            deadline_alerted: false,
            created_at: now,
            submitted_at: None,
            decided_at: None,
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
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

    pub fn kind(&self) -> SubmissionKind {
        self.kind
    }

    pub fn status(&self) -> SubmissionStatus {
        self.status
    }

    pub fn authority_reference(&self) -> Option<&str> {
        self.authority_reference.as_deref()
    }

    pub fn warnings(&self) -> &[AuthorityMessage] {
        &self.warnings
    }

    pub fn rejection_reasons(&self) -> &[AuthorityMessage] {
        &self.rejection_reasons
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.next_retry_at
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn deadline_alerted(&self) -> bool {
        self.deadline_alerted
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn decided_at(&self) -> Option<DateTime<Utc>> {
        self.decided_at
    }

    pub(crate) fn mark_submitted(&mut self, now: DateTime<Utc>) {
        self.status = SubmissionStatus::Submitted;
        self.submitted_at = Some(now);
        self.next_retry_at = None;
    }

    pub(crate) fn settle_accepted(&mut self, reference: String, now: DateTime<Utc>) {
        self.status = SubmissionStatus::Accepted;
        self.authority_reference = Some(reference);
        self.decided_at = Some(now);
    }

    pub(crate) fn settle_warning(
        &mut self,
        reference: String,
        warnings: Vec<AuthorityMessage>,
        now: DateTime<Utc>,
    ) {
        self.status = SubmissionStatus::Warning;
        self.authority_reference = Some(reference);
        self.warnings = warnings;
        self.decided_at = Some(now);
    }

    pub(crate) fn settle_rejected(&mut self, reasons: Vec<AuthorityMessage>, now: DateTime<Utc>) {
        self.status = SubmissionStatus::Rejected;
        self.rejection_reasons = reasons;
        self.decided_at = Some(now);
    }

    pub(crate) fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    pub(crate) fn schedule_retry(&mut self, at: DateTime<Utc>) {
        self.status = SubmissionStatus::Pending;
        self.next_retry_at = Some(at);
    }

    pub(crate) fn park(&mut self, now: DateTime<Utc>) {
        self.status = SubmissionStatus::FailedTransient;
        self.next_retry_at = None;
        self.decided_at = Some(now);
    }

    pub(crate) fn mark_deadline_alerted(&mut self) {
        self.deadline_alerted = true;
    }

    /// Operator re-arm: only parked or pending records may be pushed
    /// back into the retry loop.
    pub(crate) fn rearm(&mut self, now: DateTime<Utc>) -> bool {
        match self.status {
            SubmissionStatus::FailedTransient | SubmissionStatus::Pending => {
                self.status = SubmissionStatus::Pending;
                self.next_retry_at = Some(now);
                self.decided_at = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("submission {id} is {status} and cannot be retried")]
    NotRetryable { id: RecordId, status: &'static str },
}

/// Drives submission records through the state machine.
pub struct SubmissionOrchestrator {
    submissions: Arc<dyn SubmissionRepository>,
    documents: Arc<dyn crate::store::DocumentRepository>,
    certificates: CertificateStore,
    client: Arc<dyn AuthorityClient>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
}

impl SubmissionOrchestrator {
    pub fn new(
        submissions: Arc<dyn SubmissionRepository>,
        documents: Arc<dyn crate::store::DocumentRepository>,
        certificates: CertificateStore,
        client: Arc<dyn AuthorityClient>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            submissions,
            documents,
            certificates,
            client,
            notifier,
            config,
        }
    }

    /// Opens a submission record for a signed document and runs the
    /// first attempt inline.
    pub async fn enqueue(
        &self,
        document: &InvoiceDocument,
    ) -> Result<SubmissionRecord, OrchestratorError> {
        let kind = SubmissionKind::for_invoice(document.kind());
        let deadline = match kind {
            SubmissionKind::Reporting => {
                Some(document.created_at() + to_chrono(self.config.reporting_deadline()))
            }
            SubmissionKind::Clearance => None,
        };
        let record = SubmissionRecord::open(document, kind, deadline);
        let id = record.id();
        self.submissions.insert(record).await?;
        self.attempt(id).await
    }

    /// Leases the record, runs one attempt against the authority, and
    /// settles the result. Returns the record's current state when it is
    /// not leasable (already in flight or terminal).
    pub async fn attempt(&self, id: RecordId) -> Result<SubmissionRecord, OrchestratorError> {
        let now = Utc::now();
        // The lease is the pending -> submitted transition.
        let Some(mut record) = self.submissions.lease(id, now).await? else {
            return Ok(self.submissions.get(id).await?);
        };
        let document = self.documents.get(record.document_id()).await?;

        let outcome = match self.certificates.get_active(record.scope()).await {
            Ok(certificate) => {
                let payload = SubmissionPayload::for_document(&document);
                match record.kind() {
                    SubmissionKind::Clearance => {
                        self.client.clear(certificate.credentials(), &payload).await
                    }
                    SubmissionKind::Reporting => {
                        self.client.report(certificate.credentials(), &payload).await
                    }
                }
            }
            Err(err) => {
                // No usable certificate: park until the operator fixes
                // the scope and re-arms the record.
                record.park(now);
                self.submissions.update(record.clone()).await?;
                self.notifier
                    .notify(
                        Severity::Critical,
                        "submission parked: no usable certificate",
                        json!({
                            "record": record.id().to_string(),
                            "scope": record.scope().to_string(),
                            "error": err.to_string(),
                        }),
                    )
                    .await;
                return Ok(record);
            }
        };

        let attempt_number = record.retry_count() + 1;
        self.submissions
            .append_attempt(
                id,
                SubmissionAttempt {
                    number: attempt_number,
                    at: now,
                    outcome: outcome.clone(),
                },
            )
            .await?;

        match outcome {
            SubmissionOutcome::Accepted {
                authority_reference,
            } => {
                info!(
                    record = %record.id(),
                    invoice = record.invoice_id(),
                    reference = %authority_reference,
                    kind = record.kind().as_str(),
                    "submission accepted"
                );
                record.settle_accepted(authority_reference, now);
            }
            SubmissionOutcome::AcceptedWithWarnings {
                authority_reference,
                warnings,
            } => {
                self.notifier
                    .notify(
                        Severity::Warning,
                        "document accepted with authority warnings",
                        json!({
                            "record": record.id().to_string(),
                            "invoice": record.invoice_id(),
                            "warnings": warnings,
                        }),
                    )
                    .await;
                record.settle_warning(authority_reference, warnings, now);
            }
            SubmissionOutcome::Rejected { reasons } => {
                error!(
                    record = %record.id(),
                    invoice = record.invoice_id(),
                    "submission rejected by authority"
                );
                self.notifier
                    .notify(
                        Severity::Critical,
                        "document rejected by authority",
                        json!({
                            "record": record.id().to_string(),
                            "invoice": record.invoice_id(),
                            "reasons": reasons,
                        }),
                    )
                    .await;
                record.settle_rejected(reasons, now);
            }
            SubmissionOutcome::Transient { cause } => {
                self.plan_retry(&mut record, cause, now).await;
            }
        }

        self.submissions.update(record.clone()).await?;
        Ok(record)
    }

    /// Operator override: pushes a parked or waiting record to the front
    /// of the queue and attempts it immediately.
    pub async fn retry_now(&self, id: RecordId) -> Result<SubmissionRecord, OrchestratorError> {
        let mut record = self.submissions.get(id).await?;
        if !record.rearm(Utc::now()) {
            return Err(OrchestratorError::NotRetryable {
                id,
                status: record.status().as_str(),
            });
        }
        self.submissions.update(record).await?;
        self.attempt(id).await
    }

    /// One scheduler pass: attempts every due record, bounded by the
    /// configured worker concurrency. Returns how many were picked up.
    pub async fn sweep_once(self: &Arc<Self>) -> Result<usize, OrchestratorError> {
        let due = self.submissions.due(Utc::now()).await?;
        let picked = due.len();
        let semaphore = Arc::new(Semaphore::new(self.config.worker_concurrency()));
        let mut handles = Vec::with_capacity(picked);

        for record in due {
            let orchestrator = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                // Semaphore is never closed while sweeping.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if let Err(error) = orchestrator.attempt(record.id()).await {
                    error!(record = %record.id(), %error, "submission attempt failed");
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        Ok(picked)
    }

    /// Scheduler loop; runs until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval());
        loop {
            ticker.tick().await;
            if let Err(error) = self.sweep_once().await {
                error!(%error, "submission sweep failed");
            }
        }
    }

    async fn plan_retry(
        &self,
        record: &mut SubmissionRecord,
        cause: TransientCause,
        now: DateTime<Utc>,
    ) {
        record.increment_retry();

        match record.kind() {
            SubmissionKind::Clearance => {
                if record.retry_count() > self.config.max_clearance_retries() {
                    record.park(now);
                    self.notifier
                        .notify(
                            Severity::Critical,
                            "clearance retries exhausted",
                            json!({
                                "record": record.id().to_string(),
                                "invoice": record.invoice_id(),
                                "attempts": record.retry_count(),
                            }),
                        )
                        .await;
                    return;
                }
                let delay = self.backoff_delay(record.retry_count() - 1);
                record.schedule_retry(now + to_chrono(delay));
                warn!(
                    record = %record.id(),
                    cause = ?cause,
                    attempt = record.retry_count(),
                    delay_ms = delay.as_millis() as u64,
                    "transient clearance failure, retry scheduled"
                );
            }
            SubmissionKind::Reporting => {
                // Reporting deadline is always set at enqueue.
                let Some(deadline) = record.deadline() else {
                    let delay = self.backoff_delay(record.retry_count() - 1);
                    record.schedule_retry(now + to_chrono(delay));
                    return;
                };
                if now >= deadline {
                    record.park(now);
                    self.notifier
                        .notify(
                            Severity::Critical,
                            "reporting window elapsed without acceptance",
                            json!({
                                "record": record.id().to_string(),
                                "invoice": record.invoice_id(),
                                "deadline": deadline.to_rfc3339(),
                            }),
                        )
                        .await;
                    return;
                }

                let mut delay = self.backoff_delay(record.retry_count() - 1);
                if deadline - now <= to_chrono(self.config.deadline_alert_window()) {
                    // Inside the alert window: drop back to the floor so
                    // remaining attempts are not starved by backoff.
                    delay = self.config.backoff_base();
                    if !record.deadline_alerted() {
                        record.mark_deadline_alerted();
                        self.notifier
                            .notify(
                                Severity::Critical,
                                "reporting deadline approaching",
                                json!({
                                    "record": record.id().to_string(),
                                    "invoice": record.invoice_id(),
                                    "deadline": deadline.to_rfc3339(),
                                }),
                            )
                            .await;
                    }
                }
                let next = std::cmp::min(now + to_chrono(delay), deadline);
                record.schedule_retry(next);
                warn!(
                    record = %record.id(),
                    cause = ?cause,
                    attempt = record.retry_count(),
                    "transient reporting failure, retry scheduled"
                );
            }
        }
    }

    /// Exponential backoff with jitter over the upper half of the
    /// window: base * multiplier^n capped, then a uniform draw from
    /// [delay/2, delay].
    fn backoff_delay(&self, retries_so_far: u32) -> Duration {
        let base = self.config.backoff_base();
        let factor = u64::from(self.config.backoff_multiplier())
            .saturating_pow(retries_so_far.min(24));
        let exponential = base
            .saturating_mul(u32::try_from(factor).unwrap_or(u32::MAX))
            .min(self.config.backoff_cap());

        let half_ms = (exponential.as_millis() / 2) as u64;
        let jitter = rand::thread_rng().gen_range(0..=half_ms);
        Duration::from_millis(half_ms + jitter)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::MAX)
}
