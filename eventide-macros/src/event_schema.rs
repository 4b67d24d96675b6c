use crate::attrs::{DeriveSet, has_serde_flag};
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Expr, Item, LitStr, MetaNameValue, Result, Token, parse::Parse, parse::ParseStream,
    parse_macro_input,
};

// 与信封基础字段重名的载荷字段会在展平时被覆盖
const RESERVED_FIELDS: [&str; 8] = [
    "event_id",
    "event_type",
    "source",
    "tenant_id",
    "timestamp",
    "version",
    "data",
    "metadata",
];

/// #[event_schema] 宏实现
/// - 仅支持具名字段结构体
/// - 合并/追加派生：Debug, Clone, PartialEq, Serialize, Deserialize，并拒绝未知字段
/// - 字段级 `#[schema(non_empty)]` 生成 `EventSchema::validate` 中的非空校验
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as SchemaAttrConfig);
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[event_schema] only on struct")
                .to_compile_error()
                .into();
        }
    };

    let Some(event_type) = cfg.event_type else {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "missing required key 'event_type'",
        )
        .to_compile_error()
        .into();
    };
    let source = match cfg.source {
        Some(lit) => quote!(#lit),
        None => quote!(::eventide_domain::event::DEFAULT_SOURCE),
    };

    let fields_named = match &mut st.fields {
        syn::Fields::Named(f) => f,
        _ => {
            return syn::Error::new(st.span(), "only supports named-field struct")
                .to_compile_error()
                .into();
        }
    };

    let mut checks = Vec::new();
    for field in fields_named.named.iter_mut() {
        let Some(ident) = field.ident.clone() else {
            continue;
        };

        if RESERVED_FIELDS.contains(&ident.to_string().as_str()) {
            return syn::Error::new(
                ident.span(),
                format!("field `{ident}` collides with an envelope field"),
            )
            .to_compile_error()
            .into();
        }

        let mut retained = Vec::new();
        for attr in field.attrs.drain(..) {
            if !attr.path().is_ident("schema") {
                retained.push(attr);
                continue;
            }

            let rules = match attr
                .parse_args_with(Punctuated::<syn::Ident, Token![,]>::parse_terminated)
            {
                Ok(rules) => rules,
                Err(err) => return err.to_compile_error().into(),
            };

            for rule in rules {
                if rule != "non_empty" {
                    return syn::Error::new(rule.span(), "unknown rule; expected 'non_empty'")
                        .to_compile_error()
                        .into();
                }
                let name = ident.to_string();
                checks.push(quote! {
                    if self.#ident.is_empty() {
                        return ::std::result::Result::Err(
                            ::std::format!("{} must not be empty", #name),
                        );
                    }
                });
            }
        }
        field.attrs = retained;
    }

    let required: [syn::Path; 5] = [
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(PartialEq),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ];
    DeriveSet::new(required).merge_into(&mut st.attrs);
    if !has_serde_flag(&st.attrs, "deny_unknown_fields") {
        st.attrs.push(syn::parse_quote!(#[serde(deny_unknown_fields)]));
    }

    let ident = &st.ident;
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    let out = quote! {
        #st

        impl #impl_generics ::eventide_domain::event::EventSchema for #ident #ty_generics #where_clause {
            const EVENT_TYPE: &'static str = #event_type;
            const SOURCE: &'static str = #source;

            fn validate(&self) -> ::std::result::Result<(), ::std::string::String> {
                #( #checks )*
                ::std::result::Result::Ok(())
            }
        }
    };

    TokenStream::from(out)
}

// -------- parsing --------

// 解析键值参数：event_type = "..."、source = "..."
struct SchemaAttrConfig {
    event_type: Option<LitStr>,
    source: Option<LitStr>,
}

impl Parse for SchemaAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut event_type: Option<LitStr> = None;
        let mut source: Option<LitStr> = None;

        let pairs: Punctuated<MetaNameValue, Token![,]> = Punctuated::parse_terminated(input)?;

        for kv in pairs {
            let Some(key) = kv.path.get_ident().map(|i| i.to_string()) else {
                return Err(syn::Error::new(kv.path.span(), "invalid attribute key"));
            };
            let lit = match kv.value {
                Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(lit),
                    ..
                }) => lit,
                other => {
                    return Err(syn::Error::new(
                        other.span(),
                        format!("expected string literal for '{key}'"),
                    ));
                }
            };

            let slot = match key.as_str() {
                "event_type" => &mut event_type,
                "source" => &mut source,
                _ => {
                    return Err(syn::Error::new(
                        kv.path.span(),
                        "unknown key; expected 'event_type' | 'source'",
                    ));
                }
            };
            if slot.is_some() {
                return Err(syn::Error::new(
                    kv.path.span(),
                    format!("duplicate key '{key}' in attribute"),
                ));
            }
            if lit.value().is_empty() {
                return Err(syn::Error::new(lit.span(), format!("'{key}' must not be empty")));
            }
            *slot = Some(lit);
        }

        Ok(Self { event_type, source })
    }
}
