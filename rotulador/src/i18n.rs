//! Interface translations
//!
//! Message catalogs are embedded JSON objects (`message id -> text`). The
//! catalog for a request is negotiated from `Accept-Language`; messages
//! missing from it fall back to the default catalog and then to the id
//! itself, so free text such as class names passes through untranslated.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::ACCEPT_LANGUAGE, request::Parts},
};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::warn;

use crate::AppState;

/// Embedded catalogs: (language tag, JSON)
const CATALOGS: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en.json")),
    ("pt-BR", include_str!("../locales/pt-BR.json")),
];

/// Language used when the configured default is not available
pub const FALLBACK_LANGUAGE: &str = "en";

type Catalog = HashMap<String, String>;

/// All loaded catalogs plus the default language
#[derive(Debug)]
pub struct Translations {
    catalogs: HashMap<String, Catalog>,
    default_language: String,
}

impl Translations {
    /// Parse the embedded catalogs
    pub fn load(default_language: &str) -> Result<Self, serde_json::Error> {
        let mut catalogs = HashMap::new();
        for (language, json) in CATALOGS {
            let catalog: Catalog = serde_json::from_str(json)?;
            catalogs.insert(language.to_string(), catalog);
        }

        let default_language = match resolve_tag(catalogs.keys(), default_language) {
            Some(language) => language,
            None => {
                warn!(
                    "Language '{}' is not available, using '{}'",
                    default_language, FALLBACK_LANGUAGE
                );
                FALLBACK_LANGUAGE.to_string()
            }
        };

        Ok(Self {
            catalogs,
            default_language,
        })
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Available language tags, sorted
    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.catalogs.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }

    /// Pick the catalog for an `Accept-Language` header value
    ///
    /// Entries are taken in header order with `;q=` weights ignored. An
    /// entry matches a catalog exactly (case-insensitive) or by its primary
    /// subtag (`pt-PT` -> `pt-BR`).
    pub fn negotiate(&self, accept_language: Option<&str>) -> String {
        accept_language
            .into_iter()
            .flat_map(|header| header.split(','))
            .filter_map(|entry| entry.split(';').next())
            .map(str::trim)
            .filter(|tag| !tag.is_empty() && *tag != "*")
            .find_map(|tag| resolve_tag(self.catalogs.keys(), tag))
            .unwrap_or_else(|| self.default_language.clone())
    }

    fn lookup(&self, language: &str, id: &str) -> Option<&str> {
        self.catalogs
            .get(language)
            .and_then(|catalog| catalog.get(id))
            .map(String::as_str)
    }
}

/// Match a requested tag against available catalog tags
fn resolve_tag<'a>(available: impl Iterator<Item = &'a String> + Clone, tag: &str) -> Option<String> {
    if let Some(exact) = available.clone().find(|lang| lang.eq_ignore_ascii_case(tag)) {
        return Some(exact.clone());
    }

    let primary = tag.split('-').next().unwrap_or(tag);
    let mut by_primary: Vec<&String> = available
        .filter(|lang| {
            lang.split('-')
                .next()
                .map(|p| p.eq_ignore_ascii_case(primary))
                .unwrap_or(false)
        })
        .collect();
    by_primary.sort();
    by_primary.first().map(|lang| lang.to_string())
}

/// Per-request translator
#[derive(Debug, Clone)]
pub struct Localizer {
    translations: Arc<Translations>,
    language: String,
}

impl Localizer {
    pub fn new(translations: Arc<Translations>, language: String) -> Self {
        Self {
            translations,
            language,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Translate a message id
    pub fn t(&self, id: &str) -> String {
        self.translations
            .lookup(&self.language, id)
            .or_else(|| {
                self.translations
                    .lookup(self.translations.default_language(), id)
            })
            .unwrap_or(id)
            .to_string()
    }

    /// Translate a message id and fill `{name}` placeholders
    pub fn t_with(&self, id: &str, args: &[(&str, String)]) -> String {
        args.iter().fold(self.t(id), |text, (name, value)| {
            text.replace(&format!("{{{}}}", name), value)
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Localizer {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok());
        let language = state.translations.negotiate(header);
        Ok(Localizer::new(state.translations.clone(), language))
    }
}
