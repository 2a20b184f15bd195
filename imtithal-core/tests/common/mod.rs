#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use chrono::Utc;
use iso_currency::Currency;
use isocountry::CountryCode;
use k256::ecdsa::SigningKey;
use parking_lot::Mutex;
use rand_core::OsRng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::Encode;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{EncodePublicKey, SubjectPublicKeyInfoOwned};
use x509_cert::time::Validity;

use imtithal_core::api::{
    AuthorityClient, AuthorityError, IssuedCredentials, SubmissionOutcome, SubmissionPayload,
};
use imtithal_core::certificate::ApiCredentials;
use imtithal_core::csr::SubjectAttributes;
use imtithal_core::invoice::{
    Address, Buyer, BuyerRole, InvoiceFlags, InvoiceKind, InvoiceRecord, InvoiceRecordFields,
    InvoiceTotals, LineItem, Party, Seller, SellerRole, VatCategory,
};

/// Self-signed secp256k1 certificate, DER-encoded. Good enough for the
/// authority token fixtures; the engine never verifies the chain of
/// trust itself.
pub fn test_certificate_der() -> Vec<u8> {
    let key = SigningKey::random(&mut OsRng);
    let serial_number = SerialNumber::from(1u32);
    let validity = Validity::from_now(Duration::from_secs(365 * 24 * 60 * 60)).expect("validity");
    let subject = Name::from_str("CN=TST-1,O=Example Trading Co,C=SA").expect("subject");
    let spki_der = key
        .verifying_key()
        .to_public_key_der()
        .expect("public key der");
    let spki = SubjectPublicKeyInfoOwned::try_from(spki_der.as_bytes()).expect("spki");
    let builder = CertificateBuilder::new(
        Profile::Root,
        serial_number,
        validity,
        subject,
        spki,
        &key,
    )
    .expect("builder");
    let certificate = builder
        .build::<k256::ecdsa::DerSignature>()
        .expect("certificate");
    certificate.to_der().expect("cert der")
}

/// Base64 security token as the authority issues it.
pub fn security_token() -> String {
    Base64::encode_string(&test_certificate_der())
}

pub fn subject_attributes() -> SubjectAttributes {
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
    .expect("subject attributes")
}

fn address() -> Address {
    Address {
        country_code: CountryCode::SAU,
        city: "Riyadh".into(),
        street: "King Fahd Rd".into(),
        additional_street: None,
        building_number: "7235".into(),
        additional_number: None,
        postal_code: "12212".into(),
        subdivision: None,
        district: None,
    }
}

fn seller() -> Seller {
    Party::<SellerRole>::new(
        "Example Trading Co".into(),
        address(),
        "399999999900003",
        None,
    )
    .expect("seller")
}

fn buyer() -> Buyer {
    Party::<BuyerRole>::new(
        "Coastal Holdings".into(),
        address(),
        Some("300000000000003".into()),
        None,
    )
    .expect("buyer")
}

pub fn invoice(kind: InvoiceKind, id: &str) -> InvoiceRecord {
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
        seller: seller(),
        buyer: if kind.is_simplified() {
            None
        } else {
            Some(buyer())
        },
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

pub fn simplified_invoice(id: &str) -> InvoiceRecord {
    invoice(InvoiceKind::Simplified, id)
}

pub fn standard_invoice(id: &str) -> InvoiceRecord {
    invoice(InvoiceKind::Standard, id)
}

/// Scripted authority double. Submission calls consume scripted
/// outcomes in order and fall back to the default; onboarding calls
/// issue fixture credentials carrying a real certificate token.
pub struct StubAuthority {
    scripted: Mutex<VecDeque<SubmissionOutcome>>,
    default_outcome: SubmissionOutcome,
    submissions: Mutex<Vec<SubmissionPayload>>,
    fail_renewal: bool,
}

impl StubAuthority {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(VecDeque::new()),
            default_outcome: SubmissionOutcome::Accepted {
                authority_reference: "42".into(),
            },
            submissions: Mutex::new(Vec::new()),
            fail_renewal: false,
        })
    }

    pub fn with_default(outcome: SubmissionOutcome) -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(VecDeque::new()),
            default_outcome: outcome,
            submissions: Mutex::new(Vec::new()),
            fail_renewal: false,
        })
    }

    pub fn scripted(outcomes: Vec<SubmissionOutcome>, default: SubmissionOutcome) -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(outcomes.into()),
            default_outcome: default,
            submissions: Mutex::new(Vec::new()),
            fail_renewal: false,
        })
    }

    pub fn refusing_renewal() -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(VecDeque::new()),
            default_outcome: SubmissionOutcome::Accepted {
                authority_reference: "42".into(),
            },
            submissions: Mutex::new(Vec::new()),
            fail_renewal: true,
        })
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    fn next_outcome(&self, payload: &SubmissionPayload) -> SubmissionOutcome {
        self.submissions.lock().push(payload.clone());
        self.scripted
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_outcome.clone())
    }
}

#[async_trait]
impl AuthorityClient for StubAuthority {
    async fn clear(
        &self,
        _credentials: &ApiCredentials,
        payload: &SubmissionPayload,
    ) -> SubmissionOutcome {
        self.next_outcome(payload)
    }

    async fn report(
        &self,
        _credentials: &ApiCredentials,
        payload: &SubmissionPayload,
    ) -> SubmissionOutcome {
        self.next_outcome(payload)
    }

    async fn check_compliance(
        &self,
        _credentials: &ApiCredentials,
        payload: &SubmissionPayload,
    ) -> SubmissionOutcome {
        self.next_outcome(payload)
    }

    async fn request_compliance_credentials(
        &self,
        _csr_base64: &str,
        _otp: &str,
    ) -> Result<IssuedCredentials, AuthorityError> {
        Ok(IssuedCredentials::new(
            Some(42),
            security_token(),
            "compliance-secret",
        ))
    }

    async fn request_production_credentials(
        &self,
        _compliance: &IssuedCredentials,
    ) -> Result<IssuedCredentials, AuthorityError> {
        Ok(IssuedCredentials::new(
            Some(77),
            security_token(),
            "production-secret",
        ))
    }

    async fn renew_credentials(
        &self,
        _current: &ApiCredentials,
        _csr_base64: &str,
        _otp: Option<&str>,
    ) -> Result<IssuedCredentials, AuthorityError> {
        if self.fail_renewal {
            return Err(AuthorityError::InvalidResponse {
                status: 503,
                body: "renewal unavailable".into(),
            });
        }
        Ok(IssuedCredentials::new(
            Some(99),
            security_token(),
            "renewed-secret",
        ))
    }
}
