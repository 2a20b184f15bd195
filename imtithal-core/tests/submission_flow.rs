mod common;

use std::sync::Arc;
use std::time::Duration;

use imtithal_core::api::{SubmissionOutcome, TransientCause, AuthorityMessage};
use imtithal_core::config::{EngineConfig, EnvironmentType};
use imtithal_core::engine::{ComplianceEngine, EngineError};
use imtithal_core::notify::{RecordingNotifier, Severity};
use imtithal_core::orchestrator::{SubmissionKind, SubmissionStatus};
use imtithal_core::store::memory::{
    InMemoryCertificates, InMemoryDocuments, InMemorySubmissions, InMemoryVault,
};
use imtithal_core::store::{DocumentRepository, SubmissionRepository};
use imtithal_core::tenant::{OrganizationId, TenantScope};

struct Harness {
    engine: ComplianceEngine,
    documents: Arc<InMemoryDocuments>,
    submissions: Arc<InMemorySubmissions>,
    notifier: Arc<RecordingNotifier>,
    scope: TenantScope,
}

async fn harness(client: Arc<common::StubAuthority>, config: EngineConfig) -> Harness {
    let documents = InMemoryDocuments::new();
    let submissions = InMemorySubmissions::new();
    let notifier = RecordingNotifier::new();
    let engine = ComplianceEngine::new(
        config,
        InMemoryCertificates::new(),
        documents.clone(),
        submissions.clone(),
        InMemoryVault::new(),
        client,
        notifier.clone(),
    );
    let scope = TenantScope::new(OrganizationId::generate(), EnvironmentType::Sandbox);
    engine
        .certificates()
        .onboard(scope, common::subject_attributes(), "123456")
        .await
        .expect("onboard");
    Harness {
        engine,
        documents,
        submissions,
        notifier,
        scope,
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig::new(EnvironmentType::Sandbox).with_backoff(
        Duration::from_millis(10),
        2,
        Duration::from_millis(20),
    )
}

#[tokio::test]
async fn simplified_invoice_is_reported_and_accepted() {
    let h = harness(common::StubAuthority::accepting(), fast_config()).await;

    let record = common::simplified_invoice("SME-1");
    let uuid = record.uuid();
    let handle = h.engine.submit(h.scope, &record).await.expect("submit");
    assert_eq!(handle.kind, SubmissionKind::Reporting);

    let status = h.engine.status(uuid).await.expect("status");
    assert_eq!(status.status, SubmissionStatus::Accepted);
    assert_eq!(status.authority_reference.as_deref(), Some("42"));
    assert!(status.deadline.is_some());

    let document = h.documents.get(handle.document_id).await.expect("document");
    assert!(document.qr_payload().is_some());
    assert_eq!(document.sequence(), 1);
}

#[tokio::test]
async fn standard_invoice_goes_through_clearance() {
    let h = harness(common::StubAuthority::accepting(), fast_config()).await;

    let record = common::standard_invoice("INV-1");
    let handle = h.engine.submit(h.scope, &record).await.expect("submit");
    assert_eq!(handle.kind, SubmissionKind::Clearance);

    let status = h.engine.status(record.uuid()).await.expect("status");
    assert_eq!(status.status, SubmissionStatus::Accepted);
    assert!(status.deadline.is_none());

    // Clearance documents carry no QR payload.
    let document = h.documents.get(handle.document_id).await.expect("document");
    assert!(document.qr_payload().is_none());
}

#[tokio::test]
async fn warnings_settle_as_warning_status() {
    let outcome = SubmissionOutcome::AcceptedWithWarnings {
        authority_reference: "42".into(),
        warnings: vec![AuthorityMessage::from_text("BR-KSA-71", "payment means")],
    };
    let h = harness(common::StubAuthority::with_default(outcome), fast_config()).await;

    let record = common::simplified_invoice("SME-2");
    h.engine.submit(h.scope, &record).await.expect("submit");

    let status = h.engine.status(record.uuid()).await.expect("status");
    assert_eq!(status.status, SubmissionStatus::Warning);
    assert_eq!(status.warnings.len(), 1);
    assert_eq!(h.notifier.with_severity(Severity::Warning).len(), 1);
}

#[tokio::test]
async fn rejection_is_terminal_and_never_retried() {
    let outcome = SubmissionOutcome::Rejected {
        reasons: vec![AuthorityMessage::from_text("BR-KSA-37", "bad address")],
    };
    let client = common::StubAuthority::with_default(outcome);
    let h = harness(client.clone(), fast_config()).await;

    let record = common::simplified_invoice("SME-3");
    let result = h.engine.submit(h.scope, &record).await;
    assert!(matches!(result, Err(EngineError::Rejected { .. })));

    let status = h.engine.status(record.uuid()).await.expect("status");
    assert_eq!(status.status, SubmissionStatus::Rejected);
    assert_eq!(status.rejection_reasons[0].code(), Some("BR-KSA-37"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let picked = h.engine.orchestrator().sweep_once().await.expect("sweep");
    assert_eq!(picked, 0);
    assert_eq!(client.submission_count(), 1);
}

#[tokio::test]
async fn transient_failure_retries_until_accepted() {
    let client = common::StubAuthority::scripted(
        vec![SubmissionOutcome::Transient {
            cause: TransientCause::ServerError { status: 503 },
        }],
        SubmissionOutcome::Accepted {
            authority_reference: "42".into(),
        },
    );
    let h = harness(client.clone(), fast_config()).await;

    let record = common::simplified_invoice("SME-4");
    let handle = h.engine.submit(h.scope, &record).await.expect("submit");

    let status = h.engine.status(record.uuid()).await.expect("status");
    assert_eq!(status.status, SubmissionStatus::Pending);
    assert_eq!(status.retry_count, 1);
    assert!(status.next_retry_at.is_some());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let picked = h.engine.orchestrator().sweep_once().await.expect("sweep");
    assert_eq!(picked, 1);

    let status = h.engine.status(record.uuid()).await.expect("status");
    assert_eq!(status.status, SubmissionStatus::Accepted);
    assert_eq!(client.submission_count(), 2);

    let attempts = h.submissions.attempts(handle.record_id).await.expect("attempts");
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].number, 1);
    assert_eq!(attempts[1].number, 2);
}

#[tokio::test]
async fn exhausted_clearance_parks_until_operator_retry() {
    let client = common::StubAuthority::scripted(
        vec![
            SubmissionOutcome::Transient {
                cause: TransientCause::Timeout,
            },
            SubmissionOutcome::Transient {
                cause: TransientCause::Timeout,
            },
        ],
        SubmissionOutcome::Accepted {
            authority_reference: "42".into(),
        },
    );
    let config = fast_config().with_max_clearance_retries(1);
    let h = harness(client.clone(), config).await;

    let record = common::standard_invoice("INV-2");
    let handle = h.engine.submit(h.scope, &record).await.expect("submit");

    tokio::time::sleep(Duration::from_millis(100)).await;
    h.engine.orchestrator().sweep_once().await.expect("sweep");

    let status = h.engine.status(record.uuid()).await.expect("status");
    assert_eq!(status.status, SubmissionStatus::FailedTransient);
    assert!(!h.notifier.with_severity(Severity::Critical).is_empty());

    let after = h.engine.retry_now(handle.record_id).await.expect("retry now");
    assert_eq!(after.status, SubmissionStatus::Accepted);
}

#[tokio::test]
async fn certificate_loss_mid_flight_parks_the_record() {
    let client = common::StubAuthority::scripted(
        vec![SubmissionOutcome::Transient {
            cause: TransientCause::Connection,
        }],
        SubmissionOutcome::Accepted {
            authority_reference: "42".into(),
        },
    );
    let h = harness(client, fast_config()).await;

    let record = common::simplified_invoice("SME-5");
    h.engine.submit(h.scope, &record).await.expect("submit");
    h.engine.certificates().revoke(h.scope).await.expect("revoke");

    tokio::time::sleep(Duration::from_millis(100)).await;
    h.engine.orchestrator().sweep_once().await.expect("sweep");

    let status = h.engine.status(record.uuid()).await.expect("status");
    assert_eq!(status.status, SubmissionStatus::FailedTransient);
    let critical = h.notifier.with_severity(Severity::Critical);
    assert!(critical
        .iter()
        .any(|n| n.message.contains("no usable certificate")));
}
