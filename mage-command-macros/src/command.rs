use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{
    DeriveInput, Ident, LitStr, Result, Token, Type, parse::Parse, parse::ParseStream,
    parse_macro_input,
};

pub(crate) fn expand(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_derive(&input) {
        Ok(ts) => ts.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_derive(input: &DeriveInput) -> Result<proc_macro2::TokenStream> {
    let cfg = CommandAttrConfig::from_attrs(&input.attrs)?;

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let name = cfg
        .name
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));

    // 未声明父类型时沿用 trait 的默认实现
    let ancestry = if cfg.extends.is_empty() {
        quote! {}
    } else {
        let parents = cfg.extends.iter();
        quote! {
            fn ancestry() -> ::mage_command::command::Ancestry<Self> {
                ::mage_command::command::Ancestry::new()
                    #( .extends::<#parents>() )*
            }
        }
    };

    Ok(quote! {
        impl #impl_generics ::mage_command::command::Command for #ident #ty_generics #where_clause {
            const NAME: &'static str = #name;

            #ancestry
        }
    })
}

// -------- parsing --------

#[derive(Default)]
struct CommandAttrConfig {
    name: Option<LitStr>,
    extends: Vec<Type>,
}

impl CommandAttrConfig {
    fn from_attrs(attrs: &[syn::Attribute]) -> Result<Self> {
        let mut cfg = Self::default();

        for attr in attrs.iter().filter(|a| a.path().is_ident("command")) {
            let elems = attr.parse_args_with(Punctuated::<CommandAttrElem, Token![,]>::parse_terminated)?;

            for elem in elems {
                match elem {
                    CommandAttrElem::Name(key, lit) => {
                        if cfg.name.is_some() {
                            return Err(syn::Error::new(
                                key.span(),
                                "duplicate key 'name' in attribute",
                            ));
                        }
                        if lit.value().trim().is_empty() {
                            return Err(syn::Error::new(
                                lit.span(),
                                "command name must not be empty",
                            ));
                        }
                        cfg.name = Some(lit);
                    }
                    CommandAttrElem::Extends(key, parents) => {
                        if !cfg.extends.is_empty() {
                            return Err(syn::Error::new(
                                key.span(),
                                "duplicate key 'extends' in attribute",
                            ));
                        }
                        if parents.is_empty() {
                            return Err(syn::Error::new(
                                key.span(),
                                "'extends' expects at least one command type",
                            ));
                        }
                        cfg.extends = parents;
                    }
                }
            }
        }

        Ok(cfg)
    }
}

enum CommandAttrElem {
    Name(Ident, LitStr),
    Extends(Ident, Vec<Type>),
}

impl Parse for CommandAttrElem {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: Ident = input.parse()?;

        if key == "name" {
            let _eq: Token![=] = input.parse()?;
            let lit: LitStr = input.parse().map_err(|e| {
                syn::Error::new(e.span(), "expected string literal for 'name'")
            })?;
            Ok(Self::Name(key, lit))
        } else if key == "extends" {
            let content;
            syn::parenthesized!(content in input);
            let parents = Punctuated::<Type, Token![,]>::parse_terminated(&content)?;
            Ok(Self::Extends(key, parents.into_iter().collect()))
        } else {
            Err(syn::Error::new(
                key.span(),
                "unknown key in attribute; expected 'name' | 'extends'",
            ))
        }
    }
}
