//! Formatter cache shared by message formatting.
//!
//! Holds CLDR plural rules per (language, cardinal/ordinal) and parsed
//! templates per source string. Entries are never evicted; the cache lives
//! as long as whoever owns it (usually one per process, handed to every
//! [`crate::RemapEnv`] through an `Arc`).

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use fixed_decimal::Decimal;
use icu_locale_core::Locale;
use icu_plurals::{PluralCategory, PluralOperands, PluralRuleType, PluralRules};

use super::catalog::language_of;
use super::template::{MessageTemplate, parse_template};
use crate::error::RemapError;

#[derive(Default)]
pub struct FormatterCache {
    plural_rules: Mutex<HashMap<(String, bool), PluralRules>>,
    templates: Mutex<HashMap<String, Arc<MessageTemplate>>>,
}

impl std::fmt::Debug for FormatterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let templates = self
            .templates
            .lock()
            .map(|t| t.len())
            .unwrap_or_else(|err| err.into_inner().len());
        f.debug_struct("FormatterCache")
            .field("templates", &templates)
            .finish_non_exhaustive()
    }
}

impl FormatterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed template for `source`, parsing it on first use.
    pub fn template(&self, source: &str) -> Result<Arc<MessageTemplate>, RemapError> {
        {
            let templates = self.templates.lock().unwrap_or_else(|err| err.into_inner());
            if let Some(template) = templates.get(source) {
                return Ok(Arc::clone(template));
            }
        }
        let template = Arc::new(parse_template(source)?);
        let mut templates = self.templates.lock().unwrap_or_else(|err| err.into_inner());
        templates.insert(source.to_string(), Arc::clone(&template));
        Ok(template)
    }

    /// CLDR plural category of `n` for `locale`.
    ///
    /// Languages without plural data fall back to the English rule.
    pub fn plural_category(&self, locale: &str, ordinal: bool, n: f64) -> &'static str {
        let language = language_of(locale).to_ascii_lowercase();
        let mut cache = self.plural_rules.lock().unwrap_or_else(|err| err.into_inner());
        let rules = match cache.entry((language, ordinal)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => match build_rules(entry.key().0.as_str(), ordinal) {
                Some(rules) => entry.insert(rules),
                None => return english_category(ordinal, n),
            },
        };
        match operands(n) {
            Some(operands) => category_str(rules.category_for(operands)),
            None => "other",
        }
    }
}

fn build_rules(language: &str, ordinal: bool) -> Option<PluralRules> {
    let locale = Locale::from_str(language).ok()?;
    let rule_type = if ordinal {
        PluralRuleType::Ordinal
    } else {
        PluralRuleType::Cardinal
    };
    PluralRules::try_new(locale.into(), rule_type.into()).ok()
}

fn operands(n: f64) -> Option<PluralOperands> {
    if !n.is_finite() {
        return None;
    }
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Some(PluralOperands::from(n as i64));
    }
    // Display keeps the visible fraction digits, which drive the v/f/t operands.
    let decimal = Decimal::from_str(&n.abs().to_string()).ok()?;
    Some(PluralOperands::from(&decimal))
}

fn english_category(ordinal: bool, n: f64) -> &'static str {
    if ordinal || n != 1.0 { "other" } else { "one" }
}

fn category_str(category: PluralCategory) -> &'static str {
    match category {
        PluralCategory::Zero => "zero",
        PluralCategory::One => "one",
        PluralCategory::Two => "two",
        PluralCategory::Few => "few",
        PluralCategory::Many => "many",
        PluralCategory::Other => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinal_categories_follow_cldr() {
        let cache = FormatterCache::new();
        assert_eq!(cache.plural_category("en", false, 1.0), "one");
        assert_eq!(cache.plural_category("en-US", false, 2.0), "other");
        assert_eq!(cache.plural_category("ru", false, 2.0), "few");
        assert_eq!(cache.plural_category("ru", false, 5.0), "many");
        assert_eq!(cache.plural_category("ar", false, 0.0), "zero");
    }

    #[test]
    fn fractional_counts_use_visible_fraction_digits() {
        let cache = FormatterCache::new();
        assert_eq!(cache.plural_category("en", false, 1.5), "other");
        assert_eq!(cache.plural_category("ru", false, 1.5), "other");
        assert_eq!(cache.plural_category("ru", false, 21.0), "one");
        assert_eq!(cache.plural_category("fr", false, 1.5), "one");
        assert_eq!(operands(-2.25), operands(2.25));
    }

    #[test]
    fn ordinal_categories_follow_cldr() {
        let cache = FormatterCache::new();
        assert_eq!(cache.plural_category("en", true, 1.0), "one");
        assert_eq!(cache.plural_category("en", true, 2.0), "two");
        assert_eq!(cache.plural_category("en", true, 3.0), "few");
        assert_eq!(cache.plural_category("en", true, 4.0), "other");
    }

    #[test]
    fn templates_are_parsed_once() {
        let cache = FormatterCache::new();
        let first = cache.template("Hi {name}").unwrap();
        let second = cache.template("Hi {name}").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.template("{broken").is_err());
    }
}
