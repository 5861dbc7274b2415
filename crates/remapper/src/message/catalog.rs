use std::collections::HashMap;

use serde::Deserialize;

use crate::error::RemapError;

/// Source of message templates, keyed by locale and message id.
///
/// Implementations are looked up once per locale in the fallback chain, so a
/// source only needs to answer for the exact locale it is asked about.
pub trait MessageSource: Send + Sync {
    fn message(&self, locale: &str, id: &str) -> Option<String>;
}

/// In-memory catalog: `locale -> id -> template`.
///
/// ```yaml
/// en:
///   greeting: "Hello {name}"
/// nl:
///   greeting: "Hallo {name}"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct MessageCatalog {
    locales: HashMap<String, HashMap<String, String>>,
}

impl MessageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, RemapError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn with_message(
        mut self,
        locale: impl Into<String>,
        id: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.insert(locale, id, template);
        self
    }

    pub fn insert(
        &mut self,
        locale: impl Into<String>,
        id: impl Into<String>,
        template: impl Into<String>,
    ) {
        self.locales
            .entry(locale.into())
            .or_default()
            .insert(id.into(), template.into());
    }

    pub fn locales(&self) -> impl Iterator<Item = &str> {
        self.locales.keys().map(String::as_str)
    }
}

impl MessageSource for MessageCatalog {
    fn message(&self, locale: &str, id: &str) -> Option<String> {
        self.locales.get(locale)?.get(id).cloned()
    }
}

/// Language subtag of a BCP 47-ish tag: `en-US` and `en_US` both give `en`.
pub fn language_of(locale: &str) -> &str {
    locale
        .split(['-', '_'])
        .next()
        .unwrap_or(locale)
}

/// Locales tried for a lookup: exact, language-only, then the default
/// locale (and its language), without duplicates.
pub fn locale_chain(locale: &str, default_locale: &str) -> Vec<String> {
    let mut chain: Vec<String> = Vec::with_capacity(4);
    for candidate in [
        locale,
        language_of(locale),
        default_locale,
        language_of(default_locale),
    ] {
        if !candidate.is_empty() && !chain.iter().any(|c| c == candidate) {
            chain.push(candidate.to_string());
        }
    }
    chain
}

/// Resolve `id` through the fallback chain, returning the locale that
/// answered together with its template.
pub fn resolve_message(
    source: &dyn MessageSource,
    locale: &str,
    default_locale: &str,
    id: &str,
) -> Option<(String, String)> {
    locale_chain(locale, default_locale)
        .into_iter()
        .find_map(|candidate| {
            source
                .message(&candidate, id)
                .map(|template| (candidate, template))
        })
}
