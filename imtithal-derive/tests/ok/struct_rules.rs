use imtithal_derive::Validate;

#[derive(Validate)]
#[validate(non_empty, no_special_chars)]
pub struct Subject {
    pub common_name: String,
    pub serial_number: String,
}

fn main() {
    let s = Subject::new(
        "ACME".into(),
        "1-ACME|2-POS|3-7cd1".into(),
    );

    assert!(s.is_ok());
}
