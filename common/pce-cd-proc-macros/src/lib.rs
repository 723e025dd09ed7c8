//! Derive macros for the fieldless enums used in configuration and error types

mod enums;

use proc_macro::TokenStream;

/// Implement `std::fmt::Display` for a fieldless enum, along with a `to_str` method returning the
/// same string. A variant is displayed as its name unless it carries `#[display = "..."]`.
///
/// # Panics
///
/// This macro will panic if applied to a struct, a union, or an enum with any variants that have
/// fields.
#[proc_macro_derive(EnumDisplay, attributes(display))]
pub fn enum_display(input: TokenStream) -> TokenStream {
    enums::enum_display(input)
}

/// Implement `std::str::FromStr` for a fieldless enum. Matching is case-insensitive against the
/// same strings that `EnumDisplay` would produce, including `#[display = "..."]` overrides.
///
/// # Panics
///
/// Same as `EnumDisplay`.
#[proc_macro_derive(EnumFromStr, attributes(display))]
pub fn enum_from_str(input: TokenStream) -> TokenStream {
    enums::enum_from_str(input)
}

/// Add an `ALL` associated constant holding every variant in declaration order.
///
/// # Panics
///
/// Same as `EnumDisplay`.
#[proc_macro_derive(EnumAll)]
pub fn enum_all(input: TokenStream) -> TokenStream {
    enums::enum_all(input)
}
