use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DataEnum, DeriveInput, Expr, ExprLit, Ident, Lit, Meta, Variant};

struct UnitVariant<'a> {
    ident: &'a Ident,
    display: String,
}

fn unit_variants<'a>(derive_name: &str, input: &'a DeriveInput) -> Vec<UnitVariant<'a>> {
    let type_ident = &input.ident;
    let Data::Enum(DataEnum { variants, .. }) = &input.data else {
        panic!("{derive_name} can only be derived for enums; {type_ident} is not an enum");
    };

    variants
        .iter()
        .map(|variant| {
            let ident = &variant.ident;
            assert!(
                variant.fields.is_empty(),
                "{derive_name} only supports fieldless variants; {type_ident}::{ident} has fields"
            );

            UnitVariant { ident, display: display_string(variant) }
        })
        .collect()
}

fn display_string(variant: &Variant) -> String {
    variant
        .attrs
        .iter()
        .find_map(|attr| {
            let Meta::NameValue(name_value) = &attr.meta else { return None };
            if !name_value.path.is_ident("display") {
                return None;
            }

            let Expr::Lit(ExprLit { lit: Lit::Str(value), .. }) = &name_value.value else {
                panic!("#[display = ...] on {} must be a string literal", variant.ident);
            };
            Some(value.value())
        })
        .unwrap_or_else(|| variant.ident.to_string())
}

pub fn enum_display(input: TokenStream) -> TokenStream {
    let input: DeriveInput = syn::parse(input).expect("unable to parse input");
    let type_ident = &input.ident;

    let match_arms = unit_variants("EnumDisplay", &input).into_iter().map(
        |UnitVariant { ident, display }| {
            quote! {
                Self::#ident => #display
            }
        },
    );

    let expanded = quote! {
        impl #type_ident {
            #[must_use]
            pub fn to_str(&self) -> &'static str {
                match self {
                    #(#match_arms,)*
                }
            }
        }

        impl ::std::fmt::Display for #type_ident {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.to_str())
            }
        }
    };

    expanded.into()
}

pub fn enum_from_str(input: TokenStream) -> TokenStream {
    let input: DeriveInput = syn::parse(input).expect("unable to parse input");
    let type_ident = &input.ident;

    let match_arms = unit_variants("EnumFromStr", &input).into_iter().map(
        |UnitVariant { ident, display }| {
            let lowercase = display.to_ascii_lowercase();
            quote! {
                #lowercase => ::std::result::Result::Ok(Self::#ident)
            }
        },
    );

    let err_fmt_string = format!("invalid {type_ident} string: '{{}}'");
    let expanded = quote! {
        impl ::std::str::FromStr for #type_ident {
            type Err = ::std::string::String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    #(#match_arms,)*
                    _ => ::std::result::Result::Err(::std::format!(#err_fmt_string, s)),
                }
            }
        }
    };

    expanded.into()
}

pub fn enum_all(input: TokenStream) -> TokenStream {
    let input: DeriveInput = syn::parse(input).expect("unable to parse input");
    let type_ident = &input.ident;

    let variants = unit_variants("EnumAll", &input);
    let num_variants = variants.len();
    let constructors = variants.into_iter().map(|UnitVariant { ident, .. }| quote! { Self::#ident });

    let expanded = quote! {
        impl #type_ident {
            pub const ALL: [Self; #num_variants] = [#(#constructors,)*];
        }
    };

    expanded.into()
}
