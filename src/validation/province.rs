// 🏷️ Province Name Normalizer
// "VALÈNCIA", "valencia", "  Valencia " → "Valencia"
//
// Free-text province names are folded to a lookup key (lowercase, trimmed,
// no diacritics) and resolved through the alias table. Unknown names pass
// through title-cased so the pipeline can reject them as unsupported.

use std::sync::Arc;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::tables::ValidationTables;

/// Lookup key: lowercase, trimmed, NFD-decomposed with combining marks removed.
pub fn fold_key(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Uppercase the first letter of every word, lowercase the rest.
///
/// A word starts after any non-alphabetic character, so
/// `"l'hospitalet-de llobregat"` becomes `"L'Hospitalet-De Llobregat"`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;

    for c in text.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }

    out
}

#[derive(Debug, Clone)]
pub struct NameNormalizer {
    tables: Arc<ValidationTables>,
}

impl NameNormalizer {
    pub fn new(tables: Arc<ValidationTables>) -> Self {
        NameNormalizer { tables }
    }

    /// Canonical province name, or a title-cased passthrough when the name
    /// is not in the alias table. Empty input yields `None`.
    pub fn normalize(&self, raw: Option<&str>) -> Option<String> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;

        match self.tables.canonical_for(&fold_key(raw)) {
            Some(canonical) => Some(canonical.to_string()),
            None => Some(title_case(raw)),
        }
    }

    /// True when the name is one of the canonical provinces, or an alias of
    /// one. Compared on folded keys.
    pub fn is_supported(&self, name: Option<&str>) -> bool {
        let Some(name) = name.map(str::trim).filter(|s| !s.is_empty()) else {
            return false;
        };

        let key = fold_key(name);
        self.tables
            .canonical_provinces()
            .into_iter()
            .any(|canonical| fold_key(canonical) == key)
            || self.tables.canonical_for(&key).is_some()
    }
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::new(Arc::new(ValidationTables::reference()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
