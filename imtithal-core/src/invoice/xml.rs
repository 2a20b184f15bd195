//! Canonical XML serialization.
//!
//! The element order below is the canonical shape: fields are emitted in a
//! fixed sequence from typed views, so identical records always produce
//! byte-identical output. Chain state (previous hash, sequence) is assigned
//! at signing time and never appears in the payload.
use super::{
    Address, Buyer, InvoiceNote, InvoiceRecord, LineItem, OriginalInvoiceRef, OtherId, Party,
    PartyRole, Seller, VatCategory, VatId,
};

use helpers::{currency_amount, id_with_scheme_with_agency, id_with_scheme, quantity_with_unit,
    vat_category_code, FixedPrecision};
use quick_xml::se::{SeError, Serializer as QuickXmlSerializer};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;

/// XML serialization error.
#[derive(Debug, Error)]
pub enum InvoiceXmlError {
    #[error("failed to serialize invoice to XML: {source}")]
    Serialize {
        #[from]
        source: SeError,
    },
}

/// XML formatting options. Canonical output is compact; pretty form is for
/// operators and never hashed.
#[derive(Debug, Clone, Copy, Default)]
pub enum XmlFormat {
    #[default]
    Compact,
    Pretty {
        indent_char: char,
        indent_size: usize,
    },
}

mod helpers {
    use super::VatCategory;
    use rust_decimal::Decimal;
    use serde::ser::{Serialize, SerializeStruct, Serializer};
    use std::fmt::{self, Display, Formatter};

    pub(super) fn vat_category_code(category: &VatCategory) -> &'static str {
        match category {
            VatCategory::Exempt => "E",
            VatCategory::Standard => "S",
            VatCategory::Zero => "Z",
            VatCategory::OutOfScope => "O",
        }
    }

    pub(super) struct FixedPrecision {
        value: Decimal,
        precision: usize,
    }

    impl FixedPrecision {
        pub(super) fn new(value: Decimal, precision: usize) -> Self {
            Self { value, precision }
        }
    }

    impl Display for FixedPrecision {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "{:.*}", self.precision, self.value)
        }
    }

    impl Serialize for FixedPrecision {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.collect_str(self)
        }
    }

    struct CurrencyAmountSer<'a> {
        tag: &'static str,
        currency: &'a str,
        value: Decimal,
    }

    pub(super) fn currency_amount<'a>(
        tag: &'static str,
        currency: &'a str,
        value: Decimal,
    ) -> impl Serialize + 'a {
        CurrencyAmountSer {
            tag,
            currency,
            value,
        }
    }

    impl<'a> Serialize for CurrencyAmountSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut st = s.serialize_struct(self.tag, 2)?;
            st.serialize_field("@currencyID", self.currency)?;
            st.serialize_field("$text", &FixedPrecision::new(self.value, 2))?;
            st.end()
        }
    }

    struct IdWithSchemeSer<'a> {
        tag: &'static str,
        scheme_id: &'a str,
        scheme_agency_id: Option<&'a str>,
        value: &'a str,
    }

    pub(super) fn id_with_scheme<'a>(
        tag: &'static str,
        scheme_id: &'a str,
        value: &'a str,
    ) -> impl Serialize + 'a {
        IdWithSchemeSer {
            tag,
            scheme_id,
            scheme_agency_id: None,
            value,
        }
    }

    pub(super) fn id_with_scheme_with_agency<'a>(
        tag: &'static str,
        scheme_id: &'a str,
        scheme_agency_id: &'a str,
        value: &'a str,
    ) -> impl Serialize + 'a {
        IdWithSchemeSer {
            tag,
            scheme_id,
            scheme_agency_id: Some(scheme_agency_id),
            value,
        }
    }

    impl<'a> Serialize for IdWithSchemeSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut st = s.serialize_struct(self.tag, 3)?;
            st.serialize_field("@schemeID", self.scheme_id)?;
            if let Some(agency) = self.scheme_agency_id {
                st.serialize_field("@schemeAgencyID", agency)?;
            }
            st.serialize_field("$text", self.value)?;
            st.end()
        }
    }

    struct QuantityWithUnitSer<'a> {
        tag: &'static str,
        value: Decimal,
        unit_code: &'a str,
    }

    pub(super) fn quantity_with_unit<'a>(
        tag: &'static str,
        value: Decimal,
        unit_code: &'a str,
    ) -> impl Serialize + 'a {
        QuantityWithUnitSer {
            tag,
            value,
            unit_code,
        }
    }

    impl<'a> Serialize for QuantityWithUnitSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut st = s.serialize_struct(self.tag, 2)?;
            st.serialize_field("@unitCode", self.unit_code)?;
            st.serialize_field("$text", &FixedPrecision::new(self.value, 6))?;
            st.end()
        }
    }
}

struct InvoiceTypeCodeXml<'a> {
    transaction_code: &'a str,
    type_code: &'static str,
}

impl<'a> Serialize for InvoiceTypeCodeXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cbc:InvoiceTypeCode", 2)?;
        st.serialize_field("@name", self.transaction_code)?;
        st.serialize_field("$text", self.type_code)?;
        st.end()
    }
}

struct TaxSchemeXml;

impl Serialize for TaxSchemeXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxScheme", 0)?;
        st.serialize_field(
            "cbc:ID",
            &id_with_scheme_with_agency("cbc:ID", "UN/ECE 5153", "6", "VAT"),
        )?;
        st.end()
    }
}

struct VatSchemeXml<'a>(&'a VatId);

impl<'a> Serialize for VatSchemeXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:PartyTaxScheme", 0)?;
        st.serialize_field("cbc:CompanyID", self.0.as_str())?;
        st.serialize_field("cac:TaxScheme", &TaxSchemeXml)?;
        st.end()
    }
}

struct PartyIdentificationXml<'a>(&'a OtherId);

impl<'a> Serialize for PartyIdentificationXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let other_id = self.0;
        let mut st = s.serialize_struct("cac:PartyIdentification", 0)?;
        if let Some(scheme_id) = other_id.scheme_id() {
            st.serialize_field(
                "cbc:ID",
                &id_with_scheme("cbc:ID", scheme_id, other_id.as_str()),
            )?;
        } else {
            st.serialize_field("cbc:ID", other_id.as_str())?;
        }
        st.end()
    }
}

struct PartyLegalEntityXml<'a>(&'a str);

impl<'a> Serialize for PartyLegalEntityXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:PartyLegalEntity", 0)?;
        st.serialize_field("cbc:RegistrationName", self.0)?;
        st.end()
    }
}

struct CountryXml<'a>(&'a str);

impl<'a> Serialize for CountryXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:Country", 0)?;
        st.serialize_field("cbc:IdentificationCode", self.0)?;
        st.end()
    }
}

struct AddressXml<'a>(&'a Address);

impl<'a> Serialize for AddressXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let a = self.0;
        let mut st = s.serialize_struct("cac:PostalAddress", 0)?;

        st.serialize_field("cbc:StreetName", a.street())?;
        if let Some(additional) = a.additional_street() {
            st.serialize_field("cbc:AdditionalStreetName", additional)?;
        }
        st.serialize_field("cbc:BuildingNumber", a.building_number())?;
        if let Some(additional) = a.additional_number() {
            st.serialize_field("cbc:PlotIdentification", additional)?;
        }
        if let Some(subdivision) = a.subdivision() {
            st.serialize_field("cbc:CitySubdivisionName", subdivision)?;
        }
        st.serialize_field("cbc:CityName", a.city())?;
        st.serialize_field("cbc:PostalZone", a.postal_code())?;
        if let Some(district) = a.district() {
            st.serialize_field("cbc:District", district)?;
        }
        st.serialize_field("cac:Country", &CountryXml(a.country_code().alpha2()))?;

        st.end()
    }
}

struct PartyXml<'a, R: PartyRole>(&'a Party<R>);

impl<'a, R: PartyRole> Serialize for PartyXml<'a, R> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let p = self.0;
        let mut st = s.serialize_struct("cac:Party", 0)?;

        if let Some(other_id) = p.other_id() {
            st.serialize_field("cac:PartyIdentification", &PartyIdentificationXml(other_id))?;
        }
        st.serialize_field("cac:PostalAddress", &AddressXml(p.address()))?;
        if let Some(vat) = p.vat_id() {
            st.serialize_field("cac:PartyTaxScheme", &VatSchemeXml(vat))?;
        }
        st.serialize_field("cac:PartyLegalEntity", &PartyLegalEntityXml(p.name()))?;

        st.end()
    }
}

struct EmptyParty;

impl Serialize for EmptyParty {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let st = s.serialize_struct("cac:Party", 0)?;
        st.end()
    }
}

struct AccountingSupplierPartyXml<'a>(&'a Seller);

impl<'a> Serialize for AccountingSupplierPartyXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:AccountingSupplierParty", 0)?;
        st.serialize_field("cac:Party", &PartyXml(self.0))?;
        st.end()
    }
}

struct AccountingCustomerPartyXml<'a>(Option<&'a Buyer>);

impl<'a> Serialize for AccountingCustomerPartyXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:AccountingCustomerParty", 0)?;
        if let Some(party) = self.0 {
            st.serialize_field("cac:Party", &PartyXml(party))?;
        } else {
            st.serialize_field("cac:Party", &EmptyParty)?;
        }
        st.end()
    }
}

struct NoteXml<'a>(&'a InvoiceNote);

impl<'a> Serialize for NoteXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let note = self.0;
        let mut st = s.serialize_struct("cbc:Note", 2)?;
        st.serialize_field("@languageID", note.language())?;
        st.serialize_field("$text", note.text())?;
        st.end()
    }
}

struct InvoiceDocumentReferenceXml<'a>(&'a OriginalInvoiceRef);

impl<'a> Serialize for InvoiceDocumentReferenceXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:InvoiceDocumentReference", 0)?;
        st.serialize_field("cbc:ID", self.0.id())?;
        if let Some(uuid) = self.0.uuid() {
            st.serialize_field("cbc:UUID", uuid)?;
        }
        if let Some(issue_date) = self.0.issue_date() {
            st.serialize_field("cbc:IssueDate", &issue_date.to_string())?;
        }
        st.end()
    }
}

struct BillingReferenceXml<'a>(&'a OriginalInvoiceRef);

impl<'a> Serialize for BillingReferenceXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:BillingReference", 0)?;
        st.serialize_field(
            "cac:InvoiceDocumentReference",
            &InvoiceDocumentReferenceXml(self.0),
        )?;
        st.end()
    }
}

struct TaxCategoryXml<'a> {
    category: &'a VatCategory,
    percent: Decimal,
}

impl<'a> Serialize for TaxCategoryXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxCategory", 0)?;
        st.serialize_field(
            "cbc:ID",
            &id_with_scheme_with_agency(
                "cbc:ID",
                "UN/ECE 5305",
                "6",
                vat_category_code(self.category),
            ),
        )?;
        st.serialize_field("cbc:Percent", &FixedPrecision::new(self.percent, 2))?;
        st.serialize_field("cac:TaxScheme", &TaxSchemeXml)?;
        st.end()
    }
}

struct TaxSubtotalData {
    taxable_amount: Decimal,
    tax_amount: Decimal,
    category: VatCategory,
}

struct TaxSubtotalXml<'a> {
    data: &'a TaxSubtotalData,
    currency: &'a str,
}

impl<'a> Serialize for TaxSubtotalXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxSubtotal", 0)?;
        st.serialize_field(
            "cbc:TaxableAmount",
            &currency_amount("cbc:TaxableAmount", self.currency, self.data.taxable_amount),
        )?;
        st.serialize_field(
            "cbc:TaxAmount",
            &currency_amount("cbc:TaxAmount", self.currency, self.data.tax_amount),
        )?;
        st.serialize_field(
            "cac:TaxCategory",
            &TaxCategoryXml {
                category: &self.data.category,
                percent: self.data.category.percent(),
            },
        )?;
        st.end()
    }
}

struct TaxTotalXml<'a> {
    amount: Decimal,
    currency: &'a str,
    subtotals: &'a [TaxSubtotalData],
}

impl<'a> Serialize for TaxTotalXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxTotal", 0)?;
        st.serialize_field(
            "cbc:TaxAmount",
            &currency_amount("cbc:TaxAmount", self.currency, self.amount),
        )?;
        for subtotal in self.subtotals {
            st.serialize_field(
                "cac:TaxSubtotal",
                &TaxSubtotalXml {
                    data: subtotal,
                    currency: self.currency,
                },
            )?;
        }
        st.end()
    }
}

/// Groups line VAT by category; order follows the category code so the
/// output stays deterministic whatever the line order.
fn tax_subtotals(record: &InvoiceRecord) -> Vec<TaxSubtotalData> {
    let mut subtotals: Vec<TaxSubtotalData> = Vec::new();
    for item in record.line_items() {
        match subtotals
            .iter_mut()
            .find(|s| s.category == item.vat_category())
        {
            Some(entry) => {
                entry.taxable_amount += item.net_amount();
                entry.tax_amount += item.vat_amount();
            }
            None => subtotals.push(TaxSubtotalData {
                taxable_amount: item.net_amount(),
                tax_amount: item.vat_amount(),
                category: item.vat_category(),
            }),
        }
    }
    subtotals.sort_by_key(|s| vat_category_code(&s.category));
    subtotals
}

struct AllowanceChargeXml<'a> {
    amount: Decimal,
    currency: &'a str,
    categories: &'a [TaxSubtotalData],
}

impl<'a> Serialize for AllowanceChargeXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:AllowanceCharge", 0)?;
        st.serialize_field("cbc:ChargeIndicator", &false)?;
        st.serialize_field("cbc:AllowanceChargeReason", "discount")?;
        st.serialize_field(
            "cbc:Amount",
            &currency_amount("cbc:Amount", self.currency, self.amount),
        )?;
        for subtotal in self.categories {
            st.serialize_field(
                "cac:TaxCategory",
                &TaxCategoryXml {
                    category: &subtotal.category,
                    percent: subtotal.category.percent(),
                },
            )?;
        }
        st.end()
    }
}

struct LegalMonetaryTotalXml<'a> {
    record: &'a InvoiceRecord,
    currency: &'a str,
}

impl<'a> Serialize for LegalMonetaryTotalXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let totals = self.record.totals();
        let mut st = s.serialize_struct("cac:LegalMonetaryTotal", 0)?;
        st.serialize_field(
            "cbc:LineExtensionAmount",
            &currency_amount("cbc:LineExtensionAmount", self.currency, totals.line_extension),
        )?;
        st.serialize_field(
            "cbc:TaxExclusiveAmount",
            &currency_amount("cbc:TaxExclusiveAmount", self.currency, totals.tax_exclusive),
        )?;
        st.serialize_field(
            "cbc:TaxInclusiveAmount",
            &currency_amount("cbc:TaxInclusiveAmount", self.currency, totals.tax_inclusive),
        )?;
        st.serialize_field(
            "cbc:AllowanceTotalAmount",
            &currency_amount(
                "cbc:AllowanceTotalAmount",
                self.currency,
                self.record.discount_total(),
            ),
        )?;
        st.serialize_field(
            "cbc:PayableAmount",
            &currency_amount("cbc:PayableAmount", self.currency, totals.payable),
        )?;
        st.end()
    }
}

struct ItemXml<'a>(&'a LineItem);

impl<'a> Serialize for ItemXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let item = self.0;
        let mut st = s.serialize_struct("cac:Item", 0)?;
        st.serialize_field("cbc:Name", item.name())?;
        st.serialize_field(
            "cac:ClassifiedTaxCategory",
            &TaxCategoryXml {
                category: &item.vat_category(),
                percent: item.vat_category().percent(),
            },
        )?;
        st.end()
    }
}

struct PriceXml<'a> {
    currency: &'a str,
    unit_price: Decimal,
}

impl<'a> Serialize for PriceXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:Price", 0)?;
        st.serialize_field(
            "cbc:PriceAmount",
            &currency_amount("cbc:PriceAmount", self.currency, self.unit_price),
        )?;
        st.end()
    }
}

struct LineTaxTotalXml<'a> {
    currency: &'a str,
    tax_amount: Decimal,
    rounding_amount: Decimal,
}

impl<'a> Serialize for LineTaxTotalXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxTotal", 0)?;
        st.serialize_field(
            "cbc:TaxAmount",
            &currency_amount("cbc:TaxAmount", self.currency, self.tax_amount),
        )?;
        st.serialize_field(
            "cbc:RoundingAmount",
            &currency_amount("cbc:RoundingAmount", self.currency, self.rounding_amount),
        )?;
        st.end()
    }
}

struct InvoiceLineXml<'a> {
    index: usize,
    item: &'a LineItem,
    currency: &'a str,
}

impl<'a> Serialize for InvoiceLineXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let item = self.item;
        let mut st = s.serialize_struct("cac:InvoiceLine", 0)?;

        st.serialize_field("cbc:ID", &(self.index + 1).to_string())?;
        st.serialize_field(
            "cbc:InvoicedQuantity",
            &quantity_with_unit("cbc:InvoicedQuantity", item.quantity(), item.unit_code()),
        )?;
        st.serialize_field(
            "cbc:LineExtensionAmount",
            &currency_amount("cbc:LineExtensionAmount", self.currency, item.net_amount()),
        )?;
        st.serialize_field(
            "cac:TaxTotal",
            &LineTaxTotalXml {
                currency: self.currency,
                tax_amount: item.vat_amount(),
                rounding_amount: item.gross_amount(),
            },
        )?;
        st.serialize_field("cac:Item", &ItemXml(item))?;
        st.serialize_field(
            "cac:Price",
            &PriceXml {
                currency: self.currency,
                unit_price: item.unit_price(),
            },
        )?;

        st.end()
    }
}

struct InvoiceXml<'a>(&'a InvoiceRecord);

impl<'a> Serialize for InvoiceXml<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let record = self.0;
        let currency = record.currency().code().to_string();
        let currency = currency.as_str();
        let transaction_code = record.transaction_code();

        let mut root = serializer.serialize_struct("Invoice", 0)?;

        // ---- namespaces (attributes) ----
        root.serialize_field(
            "@xmlns",
            "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2",
        )?;
        root.serialize_field(
            "@xmlns:cac",
            "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2",
        )?;
        root.serialize_field(
            "@xmlns:cbc",
            "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2",
        )?;

        // ---- identifiers & issue info ----
        root.serialize_field("cbc:ProfileID", "reporting:1.0")?;
        root.serialize_field("cbc:ID", record.id())?;
        root.serialize_field("cbc:UUID", &record.uuid().to_string())?;
        root.serialize_field(
            "cbc:IssueDate",
            &record.issue_datetime().date_naive().to_string(),
        )?;
        root.serialize_field(
            "cbc:IssueTime",
            &record.issue_datetime().time().format("%H:%M:%S").to_string(),
        )?;

        // ---- invoice type ----
        root.serialize_field(
            "cbc:InvoiceTypeCode",
            &InvoiceTypeCodeXml {
                transaction_code: &transaction_code,
                type_code: record.kind().type_code(),
            },
        )?;
        if let Some(note) = record.note() {
            root.serialize_field("cbc:Note", &NoteXml(note))?;
        }
        root.serialize_field("cbc:DocumentCurrencyCode", currency)?;
        root.serialize_field("cbc:TaxCurrencyCode", currency)?;

        // ---- correction references ----
        if let Some(original) = record.original_invoice() {
            root.serialize_field("cac:BillingReference", &BillingReferenceXml(original))?;
        }

        // ---- parties ----
        root.serialize_field(
            "cac:AccountingSupplierParty",
            &AccountingSupplierPartyXml(record.seller()),
        )?;
        root.serialize_field(
            "cac:AccountingCustomerParty",
            &AccountingCustomerPartyXml(record.buyer()),
        )?;

        // ---- payment ----
        if let Some(code) = record.payment_means_code() {
            root.serialize_field(
                "cac:PaymentMeans",
                &PaymentMeansXml {
                    code,
                    instruction_note: record.correction_reason(),
                },
            )?;
        }

        // ---- discount ----
        let subtotals = tax_subtotals(record);
        if record.discount_total() > Decimal::ZERO {
            root.serialize_field(
                "cac:AllowanceCharge",
                &AllowanceChargeXml {
                    amount: record.discount_total(),
                    currency,
                    categories: &subtotals,
                },
            )?;
        }

        // ---- tax totals ----
        root.serialize_field(
            "cac:TaxTotal",
            &TaxTotalXml {
                amount: record.totals().vat_total,
                currency,
                subtotals: &subtotals,
            },
        )?;

        // ---- monetary totals ----
        root.serialize_field(
            "cac:LegalMonetaryTotal",
            &LegalMonetaryTotalXml { record, currency },
        )?;

        // ---- lines ----
        for (index, item) in record.line_items().iter().enumerate() {
            root.serialize_field(
                "cac:InvoiceLine",
                &InvoiceLineXml {
                    index,
                    item,
                    currency,
                },
            )?;
        }

        root.end()
    }
}

struct PaymentMeansXml<'a> {
    code: &'a str,
    instruction_note: Option<&'a str>,
}

impl<'a> Serialize for PaymentMeansXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:PaymentMeans", 0)?;
        st.serialize_field("cbc:PaymentMeansCode", self.code)?;
        if let Some(note) = self.instruction_note {
            st.serialize_field("cbc:InstructionNote", note)?;
        }
        st.end()
    }
}

/// Serializes a record into the canonical compact form: these are the exact
/// bytes later hashed and signed.
pub fn canonical_xml(record: &InvoiceRecord) -> Result<String, InvoiceXmlError> {
    xml_with_format(record, XmlFormat::Compact)
}

/// Indented rendering for operators; never hashed.
pub fn pretty_xml(record: &InvoiceRecord) -> Result<String, InvoiceXmlError> {
    xml_with_format(
        record,
        XmlFormat::Pretty {
            indent_char: ' ',
            indent_size: 2,
        },
    )
}

pub fn xml_with_format(
    record: &InvoiceRecord,
    format: XmlFormat,
) -> Result<String, InvoiceXmlError> {
    let mut buffer = String::with_capacity(4096);
    buffer.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    buffer.push('\n');

    {
        let mut serializer = QuickXmlSerializer::new(&mut buffer);
        if let XmlFormat::Pretty {
            indent_char,
            indent_size,
        } = format
        {
            serializer.indent(indent_char, indent_size);
        }
        InvoiceXml(record).serialize(serializer)?;
    }

    Ok(buffer)
}
