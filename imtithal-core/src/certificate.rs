//! Certificate records, lifecycle states, and the certificate store.
//!
//! One certificate per scope is ever selectable for signing. Onboarding
//! and renewal go through the authority's two-step credential exchange;
//! the private key goes straight into the vault and is never exposed by
//! any read operation here.

pub mod monitor;

use std::fmt;
use std::sync::Arc;

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use k256::pkcs8::EncodePrivateKey;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;
use x509_cert::der::{pem::LineEnding, Decode, DecodePem, EncodePem};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::api::{AuthorityClient, AuthorityError, IssuedCredentials, SubmissionOutcome};
use crate::chain::InvoiceDocument;
use crate::csr::{CsrError, SubjectAttributes, ToBase64String};
use crate::store::{CertificateRepository, SecretVault, StoreError};
use crate::tenant::TenantScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CertificateId(Uuid);

impl CertificateId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateStatus {
    Pending,
    Active,
    Expiring,
    Expired,
    Revoked,
}

impl CertificateStatus {
    /// Whether a certificate in this state may sign documents.
    pub fn is_selectable(&self) -> bool {
        matches!(self, CertificateStatus::Active | CertificateStatus::Expiring)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Pending => "pending",
            CertificateStatus::Active => "active",
            CertificateStatus::Expiring => "expiring",
            CertificateStatus::Expired => "expired",
            CertificateStatus::Revoked => "revoked",
        }
    }
}

/// API secret wrapper whose Debug output is always redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Basic-auth material for authority calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    security_token: String,
    secret: SecretString,
}

impl ApiCredentials {
    pub fn new(security_token: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            security_token: security_token.into(),
            secret: SecretString::new(secret),
        }
    }

    pub fn security_token(&self) -> &str {
        &self.security_token
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }
}

impl From<&IssuedCredentials> for ApiCredentials {
    fn from(issued: &IssuedCredentials) -> Self {
        ApiCredentials::new(issued.security_token(), issued.secret())
    }
}

/// PKCS#8 DER private key bytes, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKeyMaterial(Vec<u8>);

impl PrivateKeyMaterial {
    pub fn new(der: Vec<u8>) -> Self {
        Self(der)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKeyMaterial(<redacted>)")
    }
}

/// A scope's signing certificate and its authority credentials.
///
/// Never carries key material; the vault holds the private key under
/// the certificate id.
#[derive(Debug, Clone)]
pub struct Certificate {
    id: CertificateId,
    scope: TenantScope,
    status: CertificateStatus,
    certificate_pem: String,
    credentials: ApiCredentials,
    authority_request_id: Option<u64>,
    subject: SubjectAttributes,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Certificate {
    pub fn pending(
        scope: TenantScope,
        certificate_pem: String,
        credentials: ApiCredentials,
        authority_request_id: Option<u64>,
        subject: SubjectAttributes,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CertificateId::generate(),
            scope,
            status: CertificateStatus::Pending,
            certificate_pem,
            credentials,
            authority_request_id,
            subject,
            issued_at: Utc::now(),
            expires_at,
        }
    }

    pub fn id(&self) -> CertificateId {
        self.id
    }

    pub fn scope(&self) -> TenantScope {
        self.scope
    }

    pub fn status(&self) -> CertificateStatus {
        self.status
    }

    pub fn certificate_pem(&self) -> &str {
        &self.certificate_pem
    }

    pub fn credentials(&self) -> &ApiCredentials {
        &self.credentials
    }

    pub fn authority_request_id(&self) -> Option<u64> {
        self.authority_request_id
    }

    pub fn subject(&self) -> &SubjectAttributes {
        &self.subject
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub(crate) fn set_status(&mut self, status: CertificateStatus) {
        self.status = status;
    }

    pub(crate) fn set_credentials(&mut self, credentials: ApiCredentials) {
        self.credentials = credentials;
    }
}

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("no active certificate for {scope}")]
    NoActiveCertificate { scope: TenantScope },
    #[error(transparent)]
    Csr(#[from] CsrError),
    #[error(transparent)]
    Authority(#[from] AuthorityError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("authority returned an unusable certificate token: {0}")]
    BadToken(String),
    #[error("failed to encode private key: {0}")]
    KeyEncoding(String),
}

/// Certificate lifecycle operations over a repository, vault, and the
/// authority client.
#[derive(Clone)]
pub struct CertificateStore {
    repository: Arc<dyn CertificateRepository>,
    vault: Arc<dyn SecretVault>,
    client: Arc<dyn AuthorityClient>,
}

impl CertificateStore {
    pub fn new(
        repository: Arc<dyn CertificateRepository>,
        vault: Arc<dyn SecretVault>,
        client: Arc<dyn AuthorityClient>,
    ) -> Self {
        Self {
            repository,
            vault,
            client,
        }
    }

    /// Returns the scope's selectable certificate. A certificate found
    /// past its expiry is demoted on the spot and treated as absent.
    pub async fn get_active(&self, scope: TenantScope) -> Result<Certificate, CertificateError> {
        let Some(certificate) = self.repository.selectable(scope).await? else {
            return Err(CertificateError::NoActiveCertificate { scope });
        };
        if certificate.expires_at() <= Utc::now() {
            self.repository
                .set_status(certificate.id(), CertificateStatus::Expired)
                .await?;
            return Err(CertificateError::NoActiveCertificate { scope });
        }
        Ok(certificate)
    }

    /// Full onboarding flow: generate a key pair and CSR, exchange it
    /// for compliance credentials with the operator's OTP, then upgrade
    /// to production credentials and activate the certificate.
    ///
    /// Activation is an atomic swap: any previously selectable
    /// certificate for the scope is expired in the same step, so the
    /// scope never has two selectable certificates.
    pub async fn onboard(
        &self,
        scope: TenantScope,
        subject: SubjectAttributes,
        otp: &str,
    ) -> Result<Certificate, CertificateError> {
        let (csr, key) = subject.build_with_key(scope.env())?;
        let csr_base64 = csr.to_pem_base64_string()?;

        let compliance = self
            .client
            .request_compliance_credentials(&csr_base64, otp)
            .await?;
        let (pem, expires_at) = decode_certificate_token(compliance.security_token())?;

        let certificate = Certificate::pending(
            scope,
            pem,
            ApiCredentials::from(&compliance),
            compliance.request_id(),
            subject,
            expires_at,
        );
        let key_der = key
            .to_pkcs8_der()
            .map_err(|e| CertificateError::KeyEncoding(e.to_string()))?;
        self.vault
            .put(
                certificate.id(),
                PrivateKeyMaterial::new(key_der.as_bytes().to_vec()),
            )
            .await?;
        self.repository.insert(certificate.clone()).await?;

        let production = self.client.request_production_credentials(&compliance).await?;
        let mut certificate = certificate;
        certificate.set_credentials(ApiCredentials::from(&production));
        self.repository.update(certificate.clone()).await?;
        let activated = self.repository.activate(certificate.id()).await?;
        info!(
            scope = %scope,
            certificate = %activated.id(),
            expires_at = %activated.expires_at(),
            "certificate onboarded"
        );
        Ok(activated)
    }

    /// Renews the scope's selectable certificate: a fresh key pair and
    /// CSR are exchanged against the current credentials, then the new
    /// certificate replaces the old one atomically. On failure the
    /// current certificate stays selectable.
    pub async fn renew(
        &self,
        scope: TenantScope,
        otp: Option<&str>,
    ) -> Result<Certificate, CertificateError> {
        let Some(current) = self.repository.selectable(scope).await? else {
            return Err(CertificateError::NoActiveCertificate { scope });
        };

        let subject = current.subject().clone();
        let (csr, key) = subject.build_with_key(scope.env())?;
        let csr_base64 = csr.to_pem_base64_string()?;
        let renewed = self
            .client
            .renew_credentials(current.credentials(), &csr_base64, otp)
            .await?;
        let (pem, expires_at) = decode_certificate_token(renewed.security_token())?;

        let certificate = Certificate::pending(
            scope,
            pem,
            ApiCredentials::from(&renewed),
            renewed.request_id(),
            subject,
            expires_at,
        );
        let key_der = key
            .to_pkcs8_der()
            .map_err(|e| CertificateError::KeyEncoding(e.to_string()))?;
        self.vault
            .put(
                certificate.id(),
                PrivateKeyMaterial::new(key_der.as_bytes().to_vec()),
            )
            .await?;
        self.repository.insert(certificate.clone()).await?;
        let activated = self.repository.activate(certificate.id()).await?;
        info!(
            scope = %scope,
            certificate = %activated.id(),
            replaces = %current.id(),
            "certificate renewed"
        );
        Ok(activated)
    }

    /// Marks the scope's selectable certificate revoked. Signing for the
    /// scope fails from this point until a new onboarding completes.
    pub async fn revoke(&self, scope: TenantScope) -> Result<Certificate, CertificateError> {
        let Some(current) = self.repository.selectable(scope).await? else {
            return Err(CertificateError::NoActiveCertificate { scope });
        };
        let revoked = self
            .repository
            .set_status(current.id(), CertificateStatus::Revoked)
            .await?;
        info!(scope = %scope, certificate = %revoked.id(), "certificate revoked");
        Ok(revoked)
    }

    /// Submits a signed document to the authority's compliance-check
    /// endpoint using the scope's current credentials.
    pub async fn check_compliance(
        &self,
        scope: TenantScope,
        document: &InvoiceDocument,
    ) -> Result<SubmissionOutcome, CertificateError> {
        let certificate = self.get_active(scope).await?;
        let payload = crate::api::SubmissionPayload::for_document(document);
        Ok(self
            .client
            .check_compliance(certificate.credentials(), &payload)
            .await)
    }

    pub(crate) fn repository(&self) -> &Arc<dyn CertificateRepository> {
        &self.repository
    }

    pub(crate) fn vault(&self) -> &Arc<dyn SecretVault> {
        &self.vault
    }
}

/// Decodes the authority's base64 security token into certificate PEM
/// and its expiry. Tokens may wrap either PEM text or raw DER.
fn decode_certificate_token(
    token: &str,
) -> Result<(String, DateTime<Utc>), CertificateError> {
    let decoded = Base64::decode_vec(token)
        .map_err(|e| CertificateError::BadToken(format!("base64 decode failed: {e}")))?;

    let certificate = if decoded.starts_with(b"-----BEGIN") {
        x509_cert::Certificate::from_pem(&decoded)
            .map_err(|e| CertificateError::BadToken(format!("PEM parse failed: {e}")))?
    } else {
        x509_cert::Certificate::from_der(&decoded)
            .map_err(|e| CertificateError::BadToken(format!("DER parse failed: {e}")))?
    };

    let pem = certificate
        .to_pem(LineEnding::LF)
        .map_err(|e| CertificateError::BadToken(format!("PEM encode failed: {e}")))?;
    let not_after = certificate
        .tbs_certificate
        .validity
        .not_after
        .to_system_time();
    Ok((pem, DateTime::<Utc>::from(not_after)))
}
