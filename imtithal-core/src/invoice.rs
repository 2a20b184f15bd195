//! Finalized-invoice domain types and fail-closed validation.
//!
//! The surrounding system hands the engine an immutable invoice record;
//! everything here checks and shapes that record before any signing or
//! submission is attempted. Amounts are fixed-point decimals throughout,
//! rounded to two places; floating point never touches money.
pub mod builder;
pub mod qr;
pub mod xml;

use std::marker::PhantomData;
use std::str::FromStr;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use iso_currency::Currency;
use isocountry::CountryCode;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

type Result<T> = std::result::Result<T, InvoiceError>;

/// Invoice-related errors.
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("missing buyer identification: a VAT number or an alternate id is required")]
    MissingBuyerId,
    #[error("invalid VAT registration number format: {value}")]
    InvalidVatFormat { value: String },
}

/// Structured validation error with field-level issues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invoice validation failed")]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }
}

/// Single validation issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: InvoiceField,
    pub kind: ValidationKind,
    pub line_item_index: Option<usize>,
}

impl ValidationIssue {
    fn on(field: InvoiceField, kind: ValidationKind) -> Self {
        Self {
            field,
            kind,
            line_item_index: None,
        }
    }

    fn on_line(field: InvoiceField, kind: ValidationKind, index: usize) -> Self {
        Self {
            field,
            kind,
            line_item_index: Some(index),
        }
    }
}

#[non_exhaustive]
/// Field associated with a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceField {
    Id,
    SellerName,
    Buyer,
    OriginalInvoiceRef,
    CorrectionReason,
    PaymentMeansCode,
    LineItems,
    LineItemName,
    LineItemQuantity,
    LineItemUnitPrice,
    DiscountTotal,
    TotalLineExtension,
    TotalTaxExclusive,
    TotalTaxInclusive,
    TotalVat,
    TotalPayable,
}

#[non_exhaustive]
/// Classification of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    Missing,
    Empty,
    InvalidFormat,
    OutOfRange,
    Mismatch,
}

/// Rounds a monetary amount to two places, midpoints away from zero.
pub(crate) fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Postal address for parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub country_code: CountryCode,
    pub city: String,
    pub street: String,
    pub additional_street: Option<String>,
    pub building_number: String,
    pub additional_number: Option<String>,
    pub postal_code: String,
    pub subdivision: Option<String>,
    pub district: Option<String>,
}

impl Address {
    pub fn country_code(&self) -> &CountryCode {
        &self.country_code
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn street(&self) -> &str {
        &self.street
    }

    pub fn additional_street(&self) -> Option<&str> {
        self.additional_street.as_deref()
    }

    pub fn building_number(&self) -> &str {
        &self.building_number
    }

    pub fn additional_number(&self) -> Option<&str> {
        self.additional_number.as_deref()
    }

    pub fn postal_code(&self) -> &str {
        &self.postal_code
    }

    pub fn subdivision(&self) -> Option<&str> {
        self.subdivision.as_deref()
    }

    pub fn district(&self) -> Option<&str> {
        self.district.as_deref()
    }
}

/// VAT registration number: fifteen digits, first and last `3`.
///
/// # Examples
/// ```rust
/// use imtithal_core::invoice::VatId;
///
/// let vat = VatId::parse("399999999900003")?;
/// assert_eq!(vat.as_str(), "399999999900003");
/// # Ok::<(), imtithal_core::InvoiceError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatId(String);

impl VatId {
    pub fn parse<S: Into<String>>(s: S) -> Result<Self> {
        let s = s.into().trim().to_string();
        let well_formed = s.len() == 15
            && s.bytes().all(|b| b.is_ascii_digit())
            && s.starts_with('3')
            && s.ends_with('3');
        if !well_formed {
            return Err(InvoiceError::InvalidVatFormat { value: s });
        }
        Ok(VatId(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for VatId {
    type Err = InvoiceError;
    fn from_str(s: &str) -> Result<Self> {
        VatId::parse(s)
    }
}

impl TryFrom<&str> for VatId {
    type Error = InvoiceError;
    fn try_from(s: &str) -> Result<Self> {
        VatId::parse(s)
    }
}

/// Alternate party identifier (commercial registration, national id, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherId {
    value: String,
    scheme_id: Option<String>,
}

impl OtherId {
    pub fn new<S: Into<String>>(value: S) -> Self {
        OtherId {
            value: value.into(),
            scheme_id: None,
        }
    }

    pub fn with_scheme<V: Into<String>, S: Into<String>>(value: V, scheme_id: S) -> Self {
        OtherId {
            value: value.into(),
            scheme_id: Some(scheme_id.into()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn scheme_id(&self) -> Option<&str> {
        self.scheme_id.as_deref()
    }
}

impl AsRef<str> for OtherId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Invoice note with language metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceNote {
    language: String,
    text: String,
}

impl InvoiceNote {
    pub fn new(language: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            text: text.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

// Marker roles
/// Marker trait for party role types.
pub trait PartyRole {}

/// Seller role marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerRole;
impl PartyRole for SellerRole {}
/// Buyer role marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerRole;
impl PartyRole for BuyerRole {}

/// Party wrapper with role-specific typing. Sellers always carry a VAT
/// registration; buyers carry a VAT registration or an alternate id.
///
/// # Examples
/// ```rust
/// use imtithal_core::invoice::{Address, OtherId, Party, SellerRole};
/// use isocountry::CountryCode;
///
/// let seller = Party::<SellerRole>::new(
///     "Acme Facilities".into(),
///     Address {
///         country_code: CountryCode::SAU,
///         city: "Riyadh".into(),
///         street: "King Fahd Rd".into(),
///         additional_street: None,
///         building_number: "1234".into(),
///         additional_number: None,
///         postal_code: "12222".into(),
///         subdivision: None,
///         district: Some("Al Olaya".into()),
///     },
///     "399999999900003",
///     Some(OtherId::with_scheme("7003339333", "CRN")),
/// )?;
/// # let _ = seller;
/// # Ok::<(), imtithal_core::InvoiceError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party<R: PartyRole> {
    _marker: PhantomData<R>,
    name: String,
    address: Address,
    vat_id: Option<VatId>,
    other_id: Option<OtherId>,
}

pub type Seller = Party<SellerRole>;
pub type Buyer = Party<BuyerRole>;

impl Party<SellerRole> {
    /// # Errors
    /// Returns an error if the VAT registration number is malformed.
    pub fn new(
        name: String,
        address: Address,
        vat_id: impl Into<String>,
        other_id: Option<OtherId>,
    ) -> Result<Self> {
        let vat = VatId::parse(vat_id.into())?;
        Ok(Party {
            _marker: PhantomData,
            name,
            address,
            vat_id: Some(vat),
            other_id,
        })
    }
}

impl Party<BuyerRole> {
    /// # Errors
    /// Returns an error if the VAT registration number is malformed or no
    /// identifier is provided at all.
    pub fn new(
        name: String,
        address: Address,
        vat_id: Option<String>,
        other_id: Option<OtherId>,
    ) -> Result<Self> {
        let vat = match vat_id {
            Some(v) => Some(VatId::parse(v)?),
            None => None,
        };
        if vat.is_none() && other_id.is_none() {
            return Err(InvoiceError::MissingBuyerId);
        }
        Ok(Party {
            _marker: PhantomData,
            name,
            address,
            vat_id: vat,
            other_id,
        })
    }
}

impl<R: PartyRole> Party<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn vat_id(&self) -> Option<&VatId> {
        self.vat_id.as_ref()
    }

    pub fn other_id(&self) -> Option<&OtherId> {
        self.other_id.as_ref()
    }
}

/// Document shape required by the authority.
///
/// Standard, credit-note, and debit-note documents go through synchronous
/// clearance; simplified documents are reported asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceKind {
    Standard,
    CreditNote,
    DebitNote,
    Simplified,
}

impl InvoiceKind {
    pub fn is_simplified(&self) -> bool {
        matches!(self, InvoiceKind::Simplified)
    }

    pub fn is_correction(&self) -> bool {
        matches!(self, InvoiceKind::CreditNote | InvoiceKind::DebitNote)
    }

    /// UBL invoice type code (UNCL1001 subset).
    pub fn type_code(&self) -> &'static str {
        match self {
            InvoiceKind::Standard | InvoiceKind::Simplified => "388",
            InvoiceKind::CreditNote => "381",
            InvoiceKind::DebitNote => "383",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceKind::Standard => "standard",
            InvoiceKind::CreditNote => "credit_note",
            InvoiceKind::DebitNote => "debit_note",
            InvoiceKind::Simplified => "simplified",
        }
    }
}

/// Reference to an original invoice for credit/debit notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalInvoiceRef {
    id: String,
    uuid: Option<String>,
    issue_date: Option<chrono::NaiveDate>,
}

impl OriginalInvoiceRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uuid: None,
            issue_date: None,
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_issue_date(mut self, issue_date: chrono::NaiveDate) -> Self {
        self.issue_date = Some(issue_date);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn issue_date(&self) -> Option<chrono::NaiveDate> {
        self.issue_date
    }
}

/// VAT category for line items (UNCL5305 subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VatCategory {
    Exempt,
    Standard,
    Zero,
    OutOfScope,
}

impl VatCategory {
    /// Applicable rate as a fraction.
    pub fn rate(&self) -> Decimal {
        match self {
            VatCategory::Standard => Decimal::new(15, 2),
            VatCategory::Exempt | VatCategory::Zero | VatCategory::OutOfScope => Decimal::ZERO,
        }
    }

    /// Percentage for document rendering.
    pub fn percent(&self) -> Decimal {
        self.rate() * Decimal::ONE_HUNDRED
    }
}

bitflags! {
    /// Transaction flags rendered into the invoice type code name.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct InvoiceFlags: u8 {
        const THIRD_PARTY = 0b0000_0001;
        const NOMINAL = 0b0000_0010;
        const EXPORT = 0b0000_0100;
        const SUMMARY = 0b0000_1000;
        const SELF_BILLED = 0b0001_0000;
    }
}

/// Single invoice line item. Net and VAT amounts are derived from the
/// quantity, unit price, and category rate at construction.
///
/// # Examples
/// ```rust
/// use imtithal_core::invoice::{LineItem, VatCategory};
/// use rust_decimal::Decimal;
///
/// let item = LineItem::new(
///     "Quarterly maintenance".into(),
///     Decimal::new(2, 0),
///     "PCE".into(),
///     Decimal::new(5000, 2),
///     VatCategory::Standard,
/// );
/// assert_eq!(item.net_amount(), Decimal::new(10000, 2));
/// assert_eq!(item.vat_amount(), Decimal::new(1500, 2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    name: String,
    quantity: Decimal,
    unit_code: String,
    unit_price: Decimal,
    vat_category: VatCategory,
    net_amount: Decimal,
    vat_amount: Decimal,
}

impl LineItem {
    pub fn new(
        name: String,
        quantity: Decimal,
        unit_code: String,
        unit_price: Decimal,
        vat_category: VatCategory,
    ) -> Self {
        let net_amount = round_money(quantity * unit_price);
        let vat_amount = round_money(net_amount * vat_category.rate());
        Self {
            name,
            quantity,
            unit_code,
            unit_price,
            vat_category,
            net_amount,
            vat_amount,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_code(&self) -> &str {
        &self.unit_code
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn vat_category(&self) -> VatCategory {
        self.vat_category
    }

    pub fn net_amount(&self) -> Decimal {
        self.net_amount
    }

    pub fn vat_amount(&self) -> Decimal {
        self.vat_amount
    }

    pub fn gross_amount(&self) -> Decimal {
        self.net_amount + self.vat_amount
    }
}

/// Totals declared by the invoicing module; the builder cross-checks them
/// against the recomputed sums before any signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub line_extension: Decimal,
    pub tax_exclusive: Decimal,
    pub tax_inclusive: Decimal,
    pub vat_total: Decimal,
    pub payable: Decimal,
}

impl InvoiceTotals {
    /// Recomputes totals from line items and a document-level discount.
    pub fn compute(line_items: &[LineItem], discount_total: Decimal) -> Self {
        let line_extension: Decimal = line_items.iter().map(LineItem::net_amount).sum();
        let vat_total: Decimal = line_items.iter().map(LineItem::vat_amount).sum();
        let tax_exclusive = round_money(line_extension - discount_total);
        let tax_inclusive = round_money(tax_exclusive + vat_total);
        Self {
            line_extension: round_money(line_extension),
            tax_exclusive,
            tax_inclusive,
            vat_total: round_money(vat_total),
            payable: tax_inclusive,
        }
    }
}

/// Payment means codes accepted by the authority (UNCL4461 subset).
const PAYMENT_MEANS_CODES: &[&str] = &["10", "30", "42", "48"];

/// Construction fields for [`InvoiceRecord`].
#[derive(Debug, Clone)]
pub struct InvoiceRecordFields {
    pub id: String,
    pub uuid: Uuid,
    pub kind: InvoiceKind,
    pub issue_datetime: DateTime<Utc>,
    pub currency: Currency,
    pub seller: Seller,
    pub buyer: Option<Buyer>,
    pub line_items: Vec<LineItem>,
    pub totals: InvoiceTotals,
    pub discount_total: Decimal,
    pub note: Option<InvoiceNote>,
    pub original_invoice: Option<OriginalInvoiceRef>,
    pub correction_reason: Option<String>,
    pub payment_means_code: Option<String>,
    pub flags: InvoiceFlags,
}

/// Immutable, finalized invoice record supplied by the invoicing module.
///
/// Construction is mechanical; [`InvoiceRecord::validate`] performs the
/// fail-closed checks and collects every issue found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    id: String,
    uuid: Uuid,
    kind: InvoiceKind,
    issue_datetime: DateTime<Utc>,
    #[serde(with = "currency_code")]
    currency: Currency,
    seller: Seller,
    buyer: Option<Buyer>,
    line_items: Vec<LineItem>,
    totals: InvoiceTotals,
    discount_total: Decimal,
    note: Option<InvoiceNote>,
    original_invoice: Option<OriginalInvoiceRef>,
    correction_reason: Option<String>,
    payment_means_code: Option<String>,
    flags: InvoiceFlags,
}

impl InvoiceRecord {
    pub fn new(fields: InvoiceRecordFields) -> Self {
        Self {
            id: fields.id,
            uuid: fields.uuid,
            kind: fields.kind,
            issue_datetime: fields.issue_datetime,
            currency: fields.currency,
            seller: fields.seller,
            buyer: fields.buyer,
            line_items: fields.line_items,
            totals: fields.totals,
            discount_total: fields.discount_total,
            note: fields.note,
            original_invoice: fields.original_invoice,
            correction_reason: fields.correction_reason,
            payment_means_code: fields.payment_means_code,
            flags: fields.flags,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn kind(&self) -> InvoiceKind {
        self.kind
    }

    pub fn issue_datetime(&self) -> DateTime<Utc> {
        self.issue_datetime
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn seller(&self) -> &Seller {
        &self.seller
    }

    pub fn buyer(&self) -> Option<&Buyer> {
        self.buyer.as_ref()
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn totals(&self) -> &InvoiceTotals {
        &self.totals
    }

    pub fn discount_total(&self) -> Decimal {
        self.discount_total
    }

    pub fn note(&self) -> Option<&InvoiceNote> {
        self.note.as_ref()
    }

    pub fn original_invoice(&self) -> Option<&OriginalInvoiceRef> {
        self.original_invoice.as_ref()
    }

    pub fn correction_reason(&self) -> Option<&str> {
        self.correction_reason.as_deref()
    }

    pub fn payment_means_code(&self) -> Option<&str> {
        self.payment_means_code.as_deref()
    }

    pub fn flags(&self) -> InvoiceFlags {
        self.flags
    }

    /// Seven-character transaction code rendered as the type code `name`
    /// attribute: `01`/`02` for standard/simplified, then one position per
    /// flag (third party, nominal, export, summary, self billed).
    pub fn transaction_code(&self) -> String {
        let prefix = if self.kind.is_simplified() { "02" } else { "01" };
        let bit = |flag: InvoiceFlags| {
            if self.flags.contains(flag) {
                '1'
            } else {
                '0'
            }
        };
        format!(
            "{}{}{}{}{}{}",
            prefix,
            bit(InvoiceFlags::THIRD_PARTY),
            bit(InvoiceFlags::NOMINAL),
            bit(InvoiceFlags::EXPORT),
            bit(InvoiceFlags::SUMMARY),
            bit(InvoiceFlags::SELF_BILLED),
        )
    }

    /// Fail-closed validation: collects every issue before rejecting.
    ///
    /// # Errors
    /// Returns [`ValidationError`] listing all failed checks.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.id.trim().is_empty() {
            issues.push(ValidationIssue::on(InvoiceField::Id, ValidationKind::Empty));
        }
        if self.seller.name().trim().is_empty() {
            issues.push(ValidationIssue::on(
                InvoiceField::SellerName,
                ValidationKind::Empty,
            ));
        }
        if !self.kind.is_simplified() && self.buyer.is_none() {
            issues.push(ValidationIssue::on(
                InvoiceField::Buyer,
                ValidationKind::Missing,
            ));
        }
        if self.kind.is_correction() {
            if self.original_invoice.is_none() {
                issues.push(ValidationIssue::on(
                    InvoiceField::OriginalInvoiceRef,
                    ValidationKind::Missing,
                ));
            }
            match self.correction_reason.as_deref() {
                None => issues.push(ValidationIssue::on(
                    InvoiceField::CorrectionReason,
                    ValidationKind::Missing,
                )),
                Some(reason) if reason.trim().is_empty() => issues.push(ValidationIssue::on(
                    InvoiceField::CorrectionReason,
                    ValidationKind::Empty,
                )),
                Some(_) => {}
            }
        }
        if let Some(code) = self.payment_means_code.as_deref() {
            if !PAYMENT_MEANS_CODES.contains(&code) {
                issues.push(ValidationIssue::on(
                    InvoiceField::PaymentMeansCode,
                    ValidationKind::InvalidFormat,
                ));
            }
        }

        if self.line_items.is_empty() {
            issues.push(ValidationIssue::on(
                InvoiceField::LineItems,
                ValidationKind::Missing,
            ));
        }
        for (index, item) in self.line_items.iter().enumerate() {
            if item.name().trim().is_empty() {
                issues.push(ValidationIssue::on_line(
                    InvoiceField::LineItemName,
                    ValidationKind::Empty,
                    index,
                ));
            }
            if item.quantity() < Decimal::ZERO {
                issues.push(ValidationIssue::on_line(
                    InvoiceField::LineItemQuantity,
                    ValidationKind::OutOfRange,
                    index,
                ));
            }
            if item.unit_price() < Decimal::ZERO {
                issues.push(ValidationIssue::on_line(
                    InvoiceField::LineItemUnitPrice,
                    ValidationKind::OutOfRange,
                    index,
                ));
            }
        }

        if self.discount_total < Decimal::ZERO {
            issues.push(ValidationIssue::on(
                InvoiceField::DiscountTotal,
                ValidationKind::OutOfRange,
            ));
        }

        let declared = &self.totals;
        for (field, amount) in [
            (InvoiceField::TotalLineExtension, declared.line_extension),
            (InvoiceField::TotalTaxExclusive, declared.tax_exclusive),
            (InvoiceField::TotalTaxInclusive, declared.tax_inclusive),
            (InvoiceField::TotalVat, declared.vat_total),
            (InvoiceField::TotalPayable, declared.payable),
        ] {
            if amount < Decimal::ZERO {
                issues.push(ValidationIssue::on(field, ValidationKind::OutOfRange));
            }
        }

        // Cross-check declared totals only when the lines themselves are
        // usable; otherwise the mismatch reports would be noise.
        if !self.line_items.is_empty() {
            let computed = InvoiceTotals::compute(&self.line_items, self.discount_total);
            for (field, declared, computed) in [
                (
                    InvoiceField::TotalLineExtension,
                    declared.line_extension,
                    computed.line_extension,
                ),
                (
                    InvoiceField::TotalTaxExclusive,
                    declared.tax_exclusive,
                    computed.tax_exclusive,
                ),
                (
                    InvoiceField::TotalTaxInclusive,
                    declared.tax_inclusive,
                    computed.tax_inclusive,
                ),
                (InvoiceField::TotalVat, declared.vat_total, computed.vat_total),
                (InvoiceField::TotalPayable, declared.payable, computed.payable),
            ] {
                if round_money(declared) != computed {
                    issues.push(ValidationIssue::on(field, ValidationKind::Mismatch));
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(issues))
        }
    }
}

/// Serde adapter storing [`Currency`] as its ISO alpha code.
mod currency_code {
    use iso_currency::Currency;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(currency: &Currency, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(currency.code())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Currency, D::Error> {
        let code = String::deserialize(de)?;
        Currency::from_code(&code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown currency code: {code}")))
    }
}
