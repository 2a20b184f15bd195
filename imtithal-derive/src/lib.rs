use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, ToTokens};
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Type};

mod rules;

/// Error type named by `#[validate_error(...)]`; `String` when absent.
fn error_type(attrs: &[Attribute]) -> TokenStream2 {
    for attr in attrs.iter().filter(|a| a.path().is_ident("validate_error")) {
        let mut ty = None;
        let _ = attr.parse_nested_meta(|meta| {
            ty = Some(meta.path.to_token_stream());
            Ok(())
        });
        if let Some(t) = ty {
            return t;
        }
    }
    quote! { String }
}

/// Rule names listed in `#[validate(...)]` attributes.
fn rules_on(attrs: &[Attribute]) -> Vec<String> {
    let mut out = vec![];
    for attr in attrs.iter().filter(|a| a.path().is_ident("validate")) {
        let _ = attr.parse_nested_meta(|meta| {
            if let Some(id) = meta.path.get_ident() {
                out.push(id.to_string());
            }
            Ok(())
        });
    }
    out
}

/// Rules are defined over `String` fields only.
fn is_string(ty: &Type) -> bool {
    match ty {
        Type::Path(p) => p
            .path
            .segments
            .last()
            .map(|s| s.ident == "String")
            .unwrap_or(false),
        Type::Reference(r) => {
            if let Type::Path(p) = &*r.elem {
                p.path
                    .segments
                    .last()
                    .map(|s| s.ident == "String")
                    .unwrap_or(false)
            } else {
                false
            }
        }
        _ => false,
    }
}

/// Generates a `new(..) -> Result<Self, E>` constructor that runs the
/// declared validation rules over every field before construction.
///
/// Struct-level `#[validate(rule, ...)]` applies to all fields; a field-level
/// attribute overrides it, and `#[validate(skip)]` opts a field out. The
/// error type is declared with `#[validate_error(E)]` and must be
/// constructible with `E::from(String)`.
#[proc_macro_derive(Validate, attributes(validate, validate_error))]
pub fn derive_validate(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    let struct_name = ast.ident;
    let error_type = error_type(&ast.attrs);
    let struct_rules = rules_on(&ast.attrs);

    let fields = match ast.data {
        Data::Struct(s) => match s.fields {
            Fields::Named(n) => n.named,
            _ => {
                return syn::Error::new_spanned(
                    struct_name,
                    "Validate supports named-field structs only",
                )
                .to_compile_error()
                .into()
            }
        },
        _ => {
            return syn::Error::new_spanned(struct_name, "Validate can only be used on structs")
                .to_compile_error()
                .into()
        }
    };

    let mut ctor_params = vec![];
    let mut ctor_assigns = vec![];
    let mut validations = vec![];

    for field in fields {
        // Named-field structs only, checked above.
        let ident = field.ident.unwrap();
        let ty = field.ty;

        ctor_params.push(quote! { #ident: #ty });
        ctor_assigns.push(quote! { #ident });

        let mut field_rules = rules_on(&field.attrs);
        if field_rules.iter().any(|r| r == "skip") {
            continue;
        }
        if field_rules.is_empty() {
            field_rules = struct_rules.clone();
        }
        if field_rules.is_empty() {
            continue;
        }

        if !is_string(&ty) {
            return syn::Error::new_spanned(
                &ident,
                format!("validation rules apply to String fields only: {ident}"),
            )
            .to_compile_error()
            .into();
        }

        for rule in field_rules {
            match rules::dispatch(&rule, &ident) {
                Some(ts) => validations.push(ts),
                None => {
                    return syn::Error::new_spanned(&ident, format!("unknown rule `{rule}`"))
                        .to_compile_error()
                        .into()
                }
            }
        }
    }

    let out = quote! {
        impl #struct_name {
            pub fn new(
                #(#ctor_params),*
            ) -> Result<Self, #error_type> {

                type E = #error_type;

                #(
                    #validations
                )*

                Ok(Self {
                    #(#ctor_assigns),*
                })
            }
        }
    };

    out.into()
}
