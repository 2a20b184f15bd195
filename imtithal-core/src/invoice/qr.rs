//! TLV-encoded QR payload for simplified documents.
//!
//! Tags follow the authority's published layout: single-byte tag,
//! single-byte length, raw value bytes. The whole structure is
//! base64-encoded for embedding in the printed note.

use base64ct::{Base64, Encoding};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use super::builder::CanonicalInvoice;

/// Upper bound on the base64 payload accepted by scanners.
const MAX_ENCODED_LEN: usize = 700;

const TAG_SELLER_NAME: u8 = 1;
const TAG_SELLER_VAT: u8 = 2;
const TAG_TIMESTAMP: u8 = 3;
const TAG_TOTAL_WITH_VAT: u8 = 4;
const TAG_VAT_TOTAL: u8 = 5;
const TAG_CONTENT_HASH: u8 = 6;
const TAG_SIGNATURE: u8 = 7;
const TAG_PUBLIC_KEY: u8 = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QrError {
    #[error("tlv value for tag {tag} is {len} bytes, limit is 255")]
    ValueTooLong { tag: u8, len: usize },
    #[error("encoded qr payload is {len} chars, limit is {MAX_ENCODED_LEN}")]
    EncodedTooLong { len: usize },
}

/// Minimal TLV writer. Values longer than a single length byte are
/// rejected rather than truncated.
struct TlvBuilder {
    buf: Vec<u8>,
}

impl TlvBuilder {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn push_str(&mut self, tag: u8, value: &str) -> Result<(), QrError> {
        self.push_bytes(tag, value.as_bytes())
    }

    fn push_bytes(&mut self, tag: u8, value: &[u8]) -> Result<(), QrError> {
        if value.len() > u8::MAX as usize {
            return Err(QrError::ValueTooLong {
                tag,
                len: value.len(),
            });
        }
        self.buf.push(tag);
        self.buf.push(value.len() as u8);
        self.buf.extend_from_slice(value);
        Ok(())
    }

    fn finish(self) -> Result<String, QrError> {
        let encoded = Base64::encode_string(&self.buf);
        if encoded.len() > MAX_ENCODED_LEN {
            return Err(QrError::EncodedTooLong { len: encoded.len() });
        }
        Ok(encoded)
    }
}

/// The eight fields embedded in a simplified document's QR code.
///
/// Tags 1-5 come from the invoice itself; tags 6-8 are only available
/// once the document has been hashed and signed, which is why the
/// signer attaches them via [`QrPayload::with_signing_parts`].
#[derive(Debug, Clone)]
pub struct QrPayload {
    seller_name: String,
    seller_vat: String,
    timestamp: DateTime<Utc>,
    total_with_vat: Decimal,
    vat_total: Decimal,
    content_hash: Option<String>,
    signature_b64: Option<String>,
    public_key_der: Option<Vec<u8>>,
}

impl QrPayload {
    pub fn new(
        seller_name: impl Into<String>,
        seller_vat: impl Into<String>,
        timestamp: DateTime<Utc>,
        total_with_vat: Decimal,
        vat_total: Decimal,
    ) -> Self {
        Self {
            seller_name: seller_name.into(),
            seller_vat: seller_vat.into(),
            timestamp,
            total_with_vat,
            vat_total,
            content_hash: None,
            signature_b64: None,
            public_key_der: None,
        }
    }

    pub fn from_canonical(canonical: &CanonicalInvoice) -> Self {
        Self::new(
            canonical.seller_name(),
            canonical.seller_vat(),
            canonical.issued_at(),
            canonical.tax_inclusive_total(),
            canonical.vat_total(),
        )
    }

    /// Attaches the post-signing fields: content hash (hex), the DER
    /// signature already base64-encoded, and the signer's public key in
    /// DER form.
    pub fn with_signing_parts(
        mut self,
        content_hash_hex: impl Into<String>,
        signature_b64: impl Into<String>,
        public_key_der: impl Into<Vec<u8>>,
    ) -> Self {
        self.content_hash = Some(content_hash_hex.into());
        self.signature_b64 = Some(signature_b64.into());
        self.public_key_der = Some(public_key_der.into());
        self
    }

    /// Serializes all present tags in ascending order and base64-encodes
    /// the result.
    pub fn encode(&self) -> Result<String, QrError> {
        let mut tlv = TlvBuilder::new();
        tlv.push_str(TAG_SELLER_NAME, &self.seller_name)?;
        tlv.push_str(TAG_SELLER_VAT, &self.seller_vat)?;
        tlv.push_str(
            TAG_TIMESTAMP,
            &self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;
        tlv.push_str(TAG_TOTAL_WITH_VAT, &format!("{:.2}", self.total_with_vat))?;
        tlv.push_str(TAG_VAT_TOTAL, &format!("{:.2}", self.vat_total))?;
        if let Some(hash) = &self.content_hash {
            tlv.push_str(TAG_CONTENT_HASH, hash)?;
        }
        if let Some(signature) = &self.signature_b64 {
            tlv.push_str(TAG_SIGNATURE, signature)?;
        }
        if let Some(key) = &self.public_key_der {
            tlv.push_bytes(TAG_PUBLIC_KEY, key)?;
        }
        tlv.finish()
    }
}
