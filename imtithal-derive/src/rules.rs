//! Builtin validation rules.
//!
//! Each rule expands to a block that returns early from the generated
//! constructor when the field violates it. The generated constructor
//! aliases the declared error type as `E`, so every rule reports through
//! `E::from(String)`.

use proc_macro2::{Ident, TokenStream};
use quote::quote;

pub(crate) fn dispatch(rule: &str, field: &Ident) -> Option<TokenStream> {
    match rule {
        "non_empty" => Some(non_empty(field)),
        "no_special_chars" => Some(no_special_chars(field)),
        "is_country_code" => Some(is_country_code(field)),
        _ => None,
    }
}

fn non_empty(field: &Ident) -> TokenStream {
    quote! {
        if #field.trim().is_empty() {
            return Err(E::from(format!("{} must be non-empty", stringify!(#field))));
        }
    }
}

/// Allows alphanumerics, whitespace, and the punctuation that appears in
/// onboarding unit serials and organization identifiers (`- | . : _ ,`).
fn no_special_chars(field: &Ident) -> TokenStream {
    quote! {
        if #field.contains(|c: char| {
            !(c.is_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '|' | '.' | ':' | '_' | ','))
        }) {
            return Err(E::from(format!(
                "{} must not contain special characters",
                stringify!(#field)
            )));
        }
    }
}

/// Short country-code check over the authority's trade region.
fn is_country_code(field: &Ident) -> TokenStream {
    quote! {
        {
            let v = #field.to_uppercase();
            if !matches!(
                v.as_str(),
                "SA" | "AE" | "KW" | "BH" |
                "OM" | "QA" | "US" | "UK"
            ) {
                return Err(E::from(format!(
                    "{} must be a valid country code",
                    stringify!(#field)
                )));
            }
        }
    }
}
