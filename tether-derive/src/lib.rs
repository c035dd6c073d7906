use proc_macro::TokenStream;
use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, Ident, Type, parse_macro_input, spanned::Spanned};

/// Derive macro for the `ToValue` trait.
///
/// Encodes a named-field struct as a `Value::Map` keyed by field name. This
/// is the bridge that lets nested model types travel by value: a hosted
/// object whose state is plain data derives `ToValue` and returns it from
/// `snapshot`, and the dispatcher copies it to the client instead of
/// issuing a handle.
///
/// # Requirements
///
/// 1. The type must be a struct with named fields (tuple structs, enums and
///    unions are rejected with a compile error).
/// 2. Every field type must itself implement `ToValue`. This is enforced
///    via generated where clauses, so generic structs work as long as the
///    instantiated field types convert.
///
/// # Example
///
/// ```
/// use tether::ToValue;
///
/// #[derive(ToValue)]
/// struct Point {
///     x: i64,
///     y: i64,
/// }
///
/// let v = Point { x: 1, y: 2 }.to_value();
/// assert_eq!(v.kind(), "map");
/// ```
#[proc_macro_derive(ToValue)]
pub fn derive_to_value(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_to_value_impl(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derive macro for the `FromValue` trait.
///
/// The inverse of `ToValue`: decodes a `Value::Map` back into the struct,
/// field by field. A missing key yields `ValueError::MissingField`; a
/// non-map value yields `ValueError::TypeMismatch`.
#[proc_macro_derive(FromValue)]
pub fn derive_from_value(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_from_value_impl(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn get_crate_path() -> proc_macro2::TokenStream {
    match crate_name("tether") {
        Ok(FoundCrate::Itself) => {
            quote!(::tether)
        }
        Ok(FoundCrate::Name(name)) => {
            let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
            quote!(::#ident)
        }
        Err(_) => {
            quote!(::tether)
        }
    }
}

fn derive_to_value_impl(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let fields = named_fields(&input)?;
    let crate_path = get_crate_path();

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut where_predicates = where_clause
        .map(|w| w.predicates.iter().cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    for (_, ty) in &fields {
        where_predicates.push(syn::parse_quote! {
            #ty: #crate_path::wire::ToValue
        });
    }

    let inserts = fields.iter().map(|(ident, _)| {
        let key = ident.to_string();
        quote! {
            map.insert(
                #key.to_owned(),
                #crate_path::wire::ToValue::to_value(&self.#ident),
            );
        }
    });

    let body = quote! {
        fn to_value(&self) -> #crate_path::wire::Value {
            let mut map = ::std::collections::BTreeMap::new();
            #(#inserts)*
            #crate_path::wire::Value::Map(map)
        }
    };

    let expanded = if where_predicates.is_empty() {
        quote! {
            impl #impl_generics #crate_path::wire::ToValue for #name #ty_generics {
                #body
            }
        }
    } else {
        quote! {
            impl #impl_generics #crate_path::wire::ToValue for #name #ty_generics
            where
                #(#where_predicates),*
            {
                #body
            }
        }
    };

    Ok(expanded)
}

fn derive_from_value_impl(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let fields = named_fields(&input)?;
    let crate_path = get_crate_path();

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut where_predicates = where_clause
        .map(|w| w.predicates.iter().cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    for (_, ty) in &fields {
        where_predicates.push(syn::parse_quote! {
            #ty: #crate_path::wire::FromValue
        });
    }

    let extracts = fields.iter().map(|(ident, _)| {
        let key = ident.to_string();
        quote! {
            #ident: match map.get(#key) {
                ::std::option::Option::Some(v) => {
                    #crate_path::wire::FromValue::from_value(v)?
                }
                ::std::option::Option::None => {
                    return ::std::result::Result::Err(
                        #crate_path::wire::ValueError::MissingField {
                            field: #key.to_owned(),
                        },
                    );
                }
            },
        }
    });

    let body = quote! {
        fn from_value(
            value: &#crate_path::wire::Value,
        ) -> ::std::result::Result<Self, #crate_path::wire::ValueError> {
            match value {
                #crate_path::wire::Value::Map(map) => {
                    ::std::result::Result::Ok(Self {
                        #(#extracts)*
                    })
                }
                other => ::std::result::Result::Err(
                    #crate_path::wire::ValueError::TypeMismatch {
                        expected: "map",
                        found: other.kind(),
                    },
                ),
            }
        }
    };

    let expanded = if where_predicates.is_empty() {
        quote! {
            impl #impl_generics #crate_path::wire::FromValue for #name #ty_generics {
                #body
            }
        }
    } else {
        quote! {
            impl #impl_generics #crate_path::wire::FromValue for #name #ty_generics
            where
                #(#where_predicates),*
            {
                #body
            }
        }
    };

    Ok(expanded)
}

fn named_fields(input: &DeriveInput) -> syn::Result<Vec<(Ident, Type)>> {
    match &input.data {
        Data::Struct(data_struct) => match &data_struct.fields {
            Fields::Named(fields) => Ok(fields
                .named
                .iter()
                .map(|f| {
                    let ident = f.ident.clone().expect("named field has an ident");
                    (ident, f.ty.clone())
                })
                .collect()),
            Fields::Unnamed(fields) => Err(Error::new(
                fields.span(),
                "ToValue/FromValue require named fields\n\
                 help: name the fields so they can become map keys",
            )),
            Fields::Unit => Ok(Vec::new()),
        },
        Data::Enum(data_enum) => Err(Error::new(
            data_enum.enum_token.span,
            "ToValue/FromValue cannot be derived for enums\n\
             help: model variants explicitly with a tagged map field",
        )),
        Data::Union(u) => Err(Error::new(
            u.union_token.span,
            "ToValue/FromValue cannot be derived for unions",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn named_fields_accepts_named_struct() {
        let input: DeriveInput = parse_quote! {
            struct Config {
                retries: i64,
                label: String,
            }
        };
        let fields = named_fields(&input).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "retries");
        assert_eq!(fields[1].0, "label");
    }

    #[test]
    fn named_fields_accepts_unit_struct() {
        let input: DeriveInput = parse_quote! {
            struct Empty;
        };
        assert!(named_fields(&input).unwrap().is_empty());
    }

    #[test]
    fn named_fields_rejects_tuple_struct() {
        let input: DeriveInput = parse_quote! {
            struct Pair(i64, i64);
        };
        assert!(named_fields(&input).is_err());
    }

    #[test]
    fn named_fields_rejects_enum() {
        let input: DeriveInput = parse_quote! {
            enum Mode {
                A,
                B,
            }
        };
        assert!(named_fields(&input).is_err());
    }

    #[test]
    fn named_fields_rejects_union() {
        let input: DeriveInput = parse_quote! {
            union Raw {
                a: u32,
                b: f32,
            }
        };
        assert!(named_fields(&input).is_err());
    }

    #[test]
    fn to_value_expansion_inserts_every_field() {
        let input: DeriveInput = parse_quote! {
            struct Config {
                retries: i64,
                label: String,
            }
        };
        let tokens = derive_to_value_impl(input).unwrap().to_string();
        assert!(tokens.contains("ToValue"));
        assert!(tokens.contains("\"retries\""));
        assert!(tokens.contains("\"label\""));
    }

    #[test]
    fn from_value_expansion_reports_missing_fields() {
        let input: DeriveInput = parse_quote! {
            struct Config {
                retries: i64,
            }
        };
        let tokens = derive_from_value_impl(input).unwrap().to_string();
        assert!(tokens.contains("FromValue"));
        assert!(tokens.contains("MissingField"));
    }
}
