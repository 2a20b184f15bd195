//! Canonical document builder.
//!
//! `build` is the only way a [`CanonicalInvoice`] comes into existence:
//! validation runs first and fails closed, then the record is serialized
//! into the canonical XML form. The result also carries the handful of
//! fields the QR payload needs, so signing never reaches back into the
//! source record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::xml::{canonical_xml, InvoiceXmlError};
use super::{InvoiceKind, InvoiceRecord, ValidationError, VatId};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Xml(#[from] InvoiceXmlError),
}

/// A validated invoice frozen into its canonical bytes.
///
/// The XML payload is fixed here, before any chain state exists; the
/// previous hash and sequence number are assigned at signing time and
/// never appear in the payload.
#[derive(Debug, Clone)]
pub struct CanonicalInvoice {
    invoice_id: String,
    invoice_uuid: Uuid,
    kind: InvoiceKind,
    xml: String,
    seller_name: String,
    seller_vat: String,
    issued_at: DateTime<Utc>,
    tax_inclusive_total: Decimal,
    vat_total: Decimal,
}

impl CanonicalInvoice {
    pub fn invoice_id(&self) -> &str {
        &self.invoice_id
    }

    pub fn invoice_uuid(&self) -> Uuid {
        self.invoice_uuid
    }

    pub fn kind(&self) -> InvoiceKind {
        self.kind
    }

    /// The exact bytes that get hashed and signed.
    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn seller_name(&self) -> &str {
        &self.seller_name
    }

    pub fn seller_vat(&self) -> &str {
        &self.seller_vat
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn tax_inclusive_total(&self) -> Decimal {
        self.tax_inclusive_total
    }

    pub fn vat_total(&self) -> Decimal {
        self.vat_total
    }
}

/// Validates the record and serializes it into canonical form.
///
/// Pure: identical records always yield byte-identical canonical output.
///
/// # Errors
/// Returns [`BuildError::Validation`] with every collected issue when the
/// record fails any mandatory check; nothing is ever signed for an invalid
/// record.
pub fn build(record: &InvoiceRecord) -> Result<CanonicalInvoice, BuildError> {
    record.validate()?;
    let xml = canonical_xml(record)?;
    // Sellers always carry a VAT registration by construction.
    let seller_vat = record
        .seller()
        .vat_id()
        .map(VatId::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(CanonicalInvoice {
        invoice_id: record.id().to_string(),
        invoice_uuid: record.uuid(),
        kind: record.kind(),
        xml,
        seller_name: record.seller().name().to_string(),
        seller_vat,
        issued_at: record.issue_datetime(),
        tax_inclusive_total: record.totals().tax_inclusive,
        vat_total: record.totals().vat_total,
    })
}

#[cfg(test)]
mod tests {
    use super::super::{
        Address, Buyer, BuyerRole, InvoiceFlags, InvoiceRecordFields, InvoiceTotals, LineItem,
        Party, Seller, SellerRole, VatCategory,
    };
    use super::*;
    use iso_currency::Currency;
    use isocountry::CountryCode;
    use rust_decimal_macros::dec;

    fn address() -> Address {
        Address {
            country_code: CountryCode::SAU,
            city: "Dammam".into(),
            street: "Corniche Rd".into(),
            additional_street: None,
            building_number: "4521".into(),
            additional_number: None,
            postal_code: "32416".into(),
            subdivision: None,
            district: None,
        }
    }

    fn seller() -> Seller {
        Party::<SellerRole>::new("Eastern Services".into(), address(), "311111111101113", None)
            .unwrap()
    }

    fn buyer() -> Buyer {
        Party::<BuyerRole>::new(
            "Coastal Holdings".into(),
            address(),
            Some("300000000000003".into()),
            None,
        )
        .unwrap()
    }

    fn record_with_lines(kind: InvoiceKind, line_items: Vec<LineItem>) -> InvoiceRecord {
        let totals = InvoiceTotals::compute(&line_items, Decimal::ZERO);
        InvoiceRecord::new(InvoiceRecordFields {
            id: "INV-500".into(),
            uuid: Uuid::new_v4(),
            kind,
            issue_datetime: "2024-03-10T08:00:00Z".parse().unwrap(),
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

    fn record(kind: InvoiceKind) -> InvoiceRecord {
        record_with_lines(
            kind,
            vec![LineItem::new(
                "Pest control visit".into(),
                dec!(1),
                "PCE".into(),
                dec!(250.00),
                VatCategory::Standard,
            )],
        )
    }

    #[test]
    fn build_captures_qr_fields() {
        let canonical = build(&record(InvoiceKind::Simplified)).unwrap();
        assert_eq!(canonical.seller_name(), "Eastern Services");
        assert_eq!(canonical.seller_vat(), "311111111101113");
        assert_eq!(canonical.tax_inclusive_total(), dec!(287.50));
        assert_eq!(canonical.vat_total(), dec!(37.50));
        assert!(canonical.xml().contains("<cbc:ID>INV-500</cbc:ID>"));
    }

    #[test]
    fn build_is_deterministic() {
        let record = record(InvoiceKind::Standard);
        let first = build(&record).unwrap();
        let second = build(&record).unwrap();
        assert_eq!(first.xml(), second.xml());
    }

    #[test]
    fn build_rejects_invalid_record_before_serializing() {
        let bad = record_with_lines(InvoiceKind::Standard, Vec::new());
        match build(&bad) {
            Err(BuildError::Validation(err)) => assert!(!err.issues.is_empty()),
            other => panic!("expected validation failure, got {other:?}"),
        }
    }
}
