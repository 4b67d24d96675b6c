use quote::ToTokens;
use std::collections::HashSet;
use syn::punctuated::Punctuated;
use syn::{Attribute, Path, Token};

/// 有序、去重的 derive 列表；`Serialize` 与 `serde::Serialize` 视为同一项
pub(crate) struct DeriveSet {
    paths: Vec<Path>,
    keys: HashSet<String>,
}

impl DeriveSet {
    pub(crate) fn new(required: impl IntoIterator<Item = Path>) -> Self {
        let mut set = Self {
            paths: Vec::new(),
            keys: HashSet::new(),
        };
        required.into_iter().for_each(|p| set.insert(p));
        set
    }

    fn insert(&mut self, path: Path) {
        if self.keys.insert(key_of(&path)) {
            self.paths.push(path);
        }
    }

    /// 吸收 attrs 中已有的 `#[derive(...)]`，再写回一条合并后的 derive
    pub(crate) fn merge_into(mut self, attrs: &mut Vec<Attribute>) {
        attrs.retain(|attr| {
            if !attr.path().is_ident("derive") {
                return true;
            }
            if let Ok(list) = attr.parse_args_with(Punctuated::<Path, Token![,]>::parse_terminated)
            {
                list.into_iter().for_each(|p| self.insert(p));
            }
            false
        });

        let paths = &self.paths;
        attrs.insert(0, syn::parse_quote!(#[derive(#(#paths),*)]));
    }
}

fn key_of(path: &Path) -> String {
    let Some(last) = path.segments.last() else {
        return path.to_token_stream().to_string();
    };
    match last.ident.to_string().as_str() {
        name @ ("Serialize" | "Deserialize") => format!("serde::{name}"),
        name => name.to_string(),
    }
}

/// 结构体上是否已声明 `#[serde(<flag>)]`
pub(crate) fn has_serde_flag(attrs: &[Attribute], flag: &str) -> bool {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("serde"))
        .any(|attr| {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(flag) {
                    found = true;
                } else if meta.input.peek(Token![=]) {
                    meta.value()?.parse::<syn::Expr>()?;
                } else if meta.input.peek(syn::token::Paren) {
                    meta.input.parse::<proc_macro2::TokenTree>()?;
                }
                Ok(())
            });
            found
        })
}
