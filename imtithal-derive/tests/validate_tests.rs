use imtithal_derive::Validate;
use thiserror::Error;

#[test]
fn validate_macro_tests() {
    let t = trybuild::TestCases::new();

    // Should compile
    t.pass("tests/ok/basic_valid.rs");
    t.pass("tests/ok/struct_rules.rs");
    t.pass("tests/ok/skip_field.rs");
}

#[derive(Debug, Error)]
enum AttributeError {
    #[error("invalid attribute: {0}")]
    Invalid(String),
}

impl From<String> for AttributeError {
    fn from(message: String) -> Self {
        AttributeError::Invalid(message)
    }
}

#[derive(Validate, Debug)]
#[validate_error(AttributeError)]
#[validate(non_empty, no_special_chars)]
struct UnitAttributes {
    name: String,
    #[validate(is_country_code)]
    country: String,
}

#[test]
fn accepts_clean_values() {
    let attrs = UnitAttributes::new("EGS Unit 1".into(), "SA".into());
    assert!(attrs.is_ok());
}

#[test]
fn allows_identifier_punctuation() {
    let attrs = UnitAttributes::new("1-TST|2-TST|3-a1b2".into(), "SA".into());
    assert!(attrs.is_ok());
}

#[test]
fn rejects_empty_field() {
    let err = UnitAttributes::new("   ".into(), "SA".into()).unwrap_err();
    assert!(err.to_string().contains("name must be non-empty"));
}

#[test]
fn rejects_special_characters() {
    let err = UnitAttributes::new("ACME <script>".into(), "SA".into()).unwrap_err();
    assert!(err.to_string().contains("special characters"));
}

#[test]
fn rejects_unknown_country() {
    let err = UnitAttributes::new("ACME".into(), "ZZ".into()).unwrap_err();
    assert!(err.to_string().contains("country must be a valid country code"));
}

#[test]
fn country_check_is_case_insensitive() {
    let attrs = UnitAttributes::new("ACME".into(), "sa".into());
    assert!(attrs.is_ok());
}
