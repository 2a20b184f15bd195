//! Tax invoice compliance engine: canonical invoices, hash-chained
//! signing, certificate lifecycle, and submission orchestration against
//! the national e-invoicing authority.
//!
//! # Examples
//! ```rust
//! use imtithal_core::config::{EngineConfig, EnvironmentType};
//!
//! let config = EngineConfig::new(EnvironmentType::Sandbox);
//! # let _ = config;
//! ```
pub mod api;
pub mod certificate;
pub mod chain;
pub mod config;
pub mod csr;
pub mod engine;
pub mod invoice;
pub mod notify;
pub mod orchestrator;
pub mod store;
pub mod tenant;

use thiserror::Error;

pub use config::EnvironmentParseError;
pub use csr::CsrError;
pub use engine::{ComplianceEngine, ComplianceStatus, EngineError, SubmissionHandle};
pub use invoice::InvoiceError;

/// Top-level error wrapper for engine operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Invoice(#[from] invoice::InvoiceError),
    #[error(transparent)]
    Build(#[from] invoice::builder::BuildError),
    #[error(transparent)]
    Xml(#[from] invoice::xml::InvoiceXmlError),
    #[error(transparent)]
    Qr(#[from] invoice::qr::QrError),
    #[error(transparent)]
    Csr(#[from] csr::CsrError),
    #[error(transparent)]
    Certificate(#[from] certificate::CertificateError),
    #[error(transparent)]
    Sign(#[from] chain::SignError),
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error(transparent)]
    Orchestrator(#[from] orchestrator::OrchestratorError),
    #[error(transparent)]
    Authority(#[from] api::AuthorityError),
    #[error(transparent)]
    Engine(#[from] engine::EngineError),
}

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::csr::CsrError;
    use crate::invoice::{
        InvoiceError, InvoiceField, ValidationError, ValidationIssue, ValidationKind,
    };
    use crate::store::StoreError;
    use crate::tenant::{OrganizationId, TenantScope};

    #[test]
    fn error_conversions_cover_variants() {
        let invoice_err = InvoiceError::Validation(ValidationError::new(vec![ValidationIssue {
            field: InvoiceField::Id,
            kind: ValidationKind::Missing,
            line_item_index: None,
        }]));
        let err: Error = invoice_err.into();
        assert!(matches!(err, Error::Invoice(_)));

        let err: Error = CsrError::Validation {
            message: "csr".into(),
        }
        .into();
        assert!(matches!(err, Error::Csr(_)));

        let scope = TenantScope::new(
            OrganizationId::generate(),
            crate::config::EnvironmentType::Sandbox,
        );
        let err: Error = StoreError::ChainHalted { scope, sequence: 4 }.into();
        assert!(matches!(err, Error::Store(_)));
    }
}
