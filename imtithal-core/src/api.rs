//! Authority submission outcomes and the client port.
//!
//! The orchestrator never sees HTTP. Transport lives behind
//! [`AuthorityClient`]; everything above it works in terms of
//! [`SubmissionOutcome`], which classifies every response into exactly
//! one of four buckets: accepted, accepted with warnings, terminally
//! rejected, or transiently failed.

pub mod http;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::chain::InvoiceDocument;

/// Errors from onboarding and renewal calls, where there is no retry
/// loop to absorb failures.
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("authority request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response from authority (status {status}): {body}")]
    InvalidResponse { status: u16, body: String },
    #[error("authority rejected credentials (status {status}): {body}")]
    Unauthorized { status: u16, body: String },
}

/// A single validation message from the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityMessage {
    #[serde(rename = "type")]
    message_type: Option<String>,
    code: Option<String>,
    category: Option<String>,
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl AuthorityMessage {
    pub fn from_text(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message_type: None,
            code: Some(code.into()),
            category: None,
            message: Some(message.into()),
            status: None,
        }
    }

    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AuthorityResults {
    #[serde(rename = "warningMessages", default)]
    warning_messages: Vec<AuthorityMessage>,
    #[serde(rename = "errorMessages", default)]
    error_messages: Vec<AuthorityMessage>,
    #[allow(dead_code)]
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AuthorityResponseBody {
    #[serde(rename = "requestID")]
    request_id: Option<u64>,
    #[serde(rename = "validationResults", default)]
    validation_results: Option<AuthorityResults>,
    #[allow(dead_code)]
    #[serde(rename = "reportingStatus")]
    reporting_status: Option<String>,
    #[allow(dead_code)]
    #[serde(rename = "clearanceStatus")]
    clearance_status: Option<String>,
}

/// Why a submission attempt failed without a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientCause {
    Timeout,
    Connection,
    RateLimited,
    ServerError { status: u16 },
    MalformedResponse { status: u16 },
}

/// Classified result of one submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Accepted {
        authority_reference: String,
    },
    AcceptedWithWarnings {
        authority_reference: String,
        warnings: Vec<AuthorityMessage>,
    },
    Rejected {
        reasons: Vec<AuthorityMessage>,
    },
    Transient {
        cause: TransientCause,
    },
}

impl SubmissionOutcome {
    /// Terminal outcomes never get retried.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionOutcome::Transient { .. })
    }
}

/// Maps an HTTP response onto an outcome. The table is fixed:
///
/// - 2xx parses the body; any warning messages downgrade the result to
///   accepted-with-warnings.
/// - 409 means the authority already holds this document; resubmission
///   of the identical payload is acceptance, not an error.
/// - 429 and every 5xx are transient.
/// - Every other 4xx is a terminal rejection carrying the authority's
///   error messages.
///
/// The authority reference is its `requestID` when present, otherwise
/// the document UUID.
pub fn classify_response(status: u16, body: &str, document_uuid: Uuid) -> SubmissionOutcome {
    if status == 429 {
        return SubmissionOutcome::Transient {
            cause: TransientCause::RateLimited,
        };
    }
    if (500..600).contains(&status) {
        return SubmissionOutcome::Transient {
            cause: TransientCause::ServerError { status },
        };
    }

    let parsed = serde_json::from_str::<AuthorityResponseBody>(body).ok();
    let reference = |parsed: &Option<AuthorityResponseBody>| {
        parsed
            .as_ref()
            .and_then(|p| p.request_id)
            .map(|id| id.to_string())
            .unwrap_or_else(|| document_uuid.to_string())
    };

    if (200..300).contains(&status) || status == 409 {
        let Some(ref body) = parsed else {
            return SubmissionOutcome::Transient {
                cause: TransientCause::MalformedResponse { status },
            };
        };
        let warnings = body
            .validation_results
            .as_ref()
            .map(|r| r.warning_messages.clone())
            .unwrap_or_default();
        let authority_reference = reference(&parsed);
        if warnings.is_empty() {
            return SubmissionOutcome::Accepted {
                authority_reference,
            };
        }
        return SubmissionOutcome::AcceptedWithWarnings {
            authority_reference,
            warnings,
        };
    }

    // Remaining 4xx: terminal rejection.
    let reasons = parsed
        .as_ref()
        .and_then(|p| p.validation_results.as_ref())
        .map(|r| r.error_messages.clone())
        .filter(|errors| !errors.is_empty())
        .unwrap_or_else(|| {
            vec![AuthorityMessage::from_text(
                format!("HTTP_{status}"),
                body.to_string(),
            )]
        });
    SubmissionOutcome::Rejected { reasons }
}

/// Wire payload for clearance, reporting, and compliance checks.
#[derive(Debug, Clone)]
pub struct SubmissionPayload {
    uuid: Uuid,
    content_hash_hex: String,
    xml: String,
}

impl SubmissionPayload {
    pub fn for_document(document: &InvoiceDocument) -> Self {
        Self {
            uuid: document.invoice_uuid(),
            content_hash_hex: document.content_hash().to_hex(),
            xml: document.canonical_xml().to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(uuid: Uuid, content_hash_hex: String, xml: String) -> Self {
        Self {
            uuid,
            content_hash_hex,
            xml,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "invoiceHash": self.content_hash_hex,
            "uuid": self.uuid,
            "invoice": Base64::encode_string(self.xml.as_bytes()),
        })
    }
}

/// Credentials returned by the authority during onboarding or renewal.
/// The secret is redacted from Debug output.
#[derive(Clone, Deserialize)]
pub struct IssuedCredentials {
    #[serde(rename = "requestID")]
    request_id: Option<u64>,
    #[serde(rename = "binarySecurityToken")]
    security_token: String,
    secret: String,
    #[serde(rename = "dispositionMessage")]
    disposition_message: Option<String>,
}

impl IssuedCredentials {
    pub fn new(
        request_id: Option<u64>,
        security_token: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            security_token: security_token.into(),
            secret: secret.into(),
            disposition_message: None,
        }
    }

    pub fn request_id(&self) -> Option<u64> {
        self.request_id
    }

    pub fn security_token(&self) -> &str {
        &self.security_token
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn disposition_message(&self) -> Option<&str> {
        self.disposition_message.as_deref()
    }
}

impl std::fmt::Debug for IssuedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCredentials")
            .field("request_id", &self.request_id)
            .field("security_token", &self.security_token)
            .field("secret", &"<redacted>")
            .field("disposition_message", &self.disposition_message)
            .finish()
    }
}

/// Transport port for all authority traffic.
///
/// Submission methods never return an error: every failure mode is
/// folded into [`SubmissionOutcome::Transient`] so the orchestrator's
/// state machine is the only place retry decisions get made. Onboarding
/// methods return `Result` because they run inside a synchronous
/// operator flow.
#[async_trait]
pub trait AuthorityClient: Send + Sync {
    async fn clear(
        &self,
        credentials: &crate::certificate::ApiCredentials,
        payload: &SubmissionPayload,
    ) -> SubmissionOutcome;

    async fn report(
        &self,
        credentials: &crate::certificate::ApiCredentials,
        payload: &SubmissionPayload,
    ) -> SubmissionOutcome;

    async fn check_compliance(
        &self,
        credentials: &crate::certificate::ApiCredentials,
        payload: &SubmissionPayload,
    ) -> SubmissionOutcome;

    async fn request_compliance_credentials(
        &self,
        csr_base64: &str,
        otp: &str,
    ) -> Result<IssuedCredentials, AuthorityError>;

    async fn request_production_credentials(
        &self,
        compliance: &IssuedCredentials,
    ) -> Result<IssuedCredentials, AuthorityError>;

    async fn renew_credentials(
        &self,
        current: &crate::certificate::ApiCredentials,
        csr_base64: &str,
        otp: Option<&str>,
    ) -> Result<IssuedCredentials, AuthorityError>;
}
