use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use oxrdf::NamedNode;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Value object ensuring that supplied text represents a valid IRI.
///
/// Prefixed names such as `owl:Class` are syntactically valid IRIs as well, so
/// an [`Iri`] is not necessarily canonical. Use [`PrefixMap::canonical`] before
/// using an identifier as a map key or graph vertex.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Iri {
    value: String,
}

impl Iri {
    /// Validates and constructs a new [`Iri`] value object.
    pub fn new(value: impl Into<String>) -> Result<Self, IriError> {
        let value = value.into();
        NamedNode::new(value.as_str()).map_err(|_| IriError::Invalid {
            value: value.clone(),
        })?;
        Ok(Self { value })
    }

    /// Returns the underlying textual representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Identifier in the OWL namespace.
    pub(crate) fn owl(local: &str) -> Self {
        Self {
            value: format!("{OWL_NAMESPACE}{local}"),
        }
    }

    /// Returns the identifier as an `oxrdf` node.
    #[must_use]
    pub fn as_named_node(&self) -> NamedNode {
        NamedNode::new_unchecked(self.value.as_str())
    }

    /// Renders the identifier as a SPARQL IRI reference (`<...>`).
    #[must_use]
    pub fn to_sparql(&self) -> String {
        self.as_named_node().to_string()
    }
}

impl Display for Iri {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for Iri {
    type Err = IriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_owned())
    }
}

impl TryFrom<String> for Iri {
    type Error = IriError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Iri {
    type Error = IriError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl Serialize for Iri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

/// Errors produced when validating an [`Iri`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IriError {
    /// The provided text could not be parsed as an IRI.
    #[error("invalid IRI: {value}")]
    Invalid { value: String },
}

pub const RDF_NAMESPACE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS_NAMESPACE: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const OWL_NAMESPACE: &str = "http://www.w3.org/2002/07/owl#";
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema#";

/// Namespace prefixes used to bring identifiers into their canonical, absolute form.
///
/// Two serializations of the same resource (`owl:Class` and
/// `http://www.w3.org/2002/07/owl#Class`) canonicalize to the same [`Iri`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixMap {
    prefixes: BTreeMap<String, String>,
}

impl Default for PrefixMap {
    fn default() -> Self {
        let prefixes = [
            ("rdf", RDF_NAMESPACE),
            ("rdfs", RDFS_NAMESPACE),
            ("owl", OWL_NAMESPACE),
            ("xsd", XSD_NAMESPACE),
        ]
        .into_iter()
        .map(|(prefix, namespace)| (prefix.to_string(), namespace.to_string()))
        .collect();
        Self { prefixes }
    }
}

impl PrefixMap {
    /// Builds a prefix map holding the built-in vocabularies plus `extra` declarations.
    ///
    /// Declarations in `extra` override built-in prefixes of the same name.
    #[must_use]
    pub fn with_prefixes<'a>(extra: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        let mut map = Self::default();
        for (prefix, namespace) in extra {
            map.prefixes.insert(prefix.clone(), namespace.clone());
        }
        map
    }

    /// Expands a prefixed name when its prefix is declared, returning the input otherwise.
    #[must_use]
    pub fn expand(&self, value: &str) -> String {
        if let Some((prefix, local)) = value.split_once(':') {
            if !local.starts_with("//") {
                if let Some(namespace) = self.prefixes.get(prefix) {
                    return format!("{namespace}{local}");
                }
            }
        }
        value.to_string()
    }

    /// Returns the canonical (absolute) form of `iri`.
    #[must_use]
    pub fn canonical(&self, iri: &Iri) -> Iri {
        let expanded = self.expand(iri.as_str());
        if expanded == iri.as_str() {
            return iri.clone();
        }
        Iri::new(expanded).unwrap_or_else(|_| iri.clone())
    }

    /// Parses and canonicalizes raw text coming from the backing store or a caller.
    pub fn parse(&self, value: &str) -> Result<Iri, IriError> {
        Iri::new(self.expand(value.trim()))
    }
}

/// Multilingual literal: an optional default value plus per-language translations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LangString {
    default: Option<String>,
    translations: BTreeMap<String, String>,
}

impl LangString {
    /// Creates a value carrying only a default (untagged) literal.
    #[must_use]
    pub fn untagged(value: impl Into<String>) -> Self {
        Self {
            default: Some(value.into()),
            translations: BTreeMap::new(),
        }
    }

    /// Adds a translation, keeping any existing value for the same language.
    #[must_use]
    pub fn with_translation(mut self, lang: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_translation(lang, value);
        self
    }

    /// Registers a translation. Returns `false` when `lang` was already translated.
    pub fn add_translation(&mut self, lang: impl Into<String>, value: impl Into<String>) -> bool {
        let lang = lang.into().to_lowercase();
        if self.translations.contains_key(&lang) {
            return false;
        }
        self.translations.insert(lang, value.into());
        true
    }

    /// Sets the default value when none is present yet.
    pub fn set_default_if_absent(&mut self, value: impl Into<String>) {
        if self.default.is_none() {
            self.default = Some(value.into());
        }
    }

    /// Returns the default value.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Returns the translation registered for `lang`.
    #[must_use]
    pub fn translation(&self, lang: &str) -> Option<&str> {
        self.translations
            .get(&lang.to_lowercase())
            .map(String::as_str)
    }

    /// Returns every translation keyed by language tag.
    #[must_use]
    pub fn translations(&self) -> &BTreeMap<String, String> {
        &self.translations
    }

    /// Returns `true` when neither a default nor any translation is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.translations.is_empty()
    }

    /// Promotes the translation for `lang` to default value, if one exists.
    ///
    /// Other translations are kept. Returns whether the default changed.
    pub fn select(&mut self, lang: &str) -> bool {
        match self.translations.get(&lang.to_lowercase()) {
            Some(value) => {
                self.default = Some(value.clone());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{Iri, LangString, PrefixMap};

    #[test]
    fn accepts_valid_iri() {
        let iri = Iri::new("https://example.org/resource").expect("valid IRI");
        assert_eq!(iri.as_str(), "https://example.org/resource");
        assert_eq!(iri.to_sparql(), "<https://example.org/resource>");
    }

    #[test]
    fn rejects_invalid_iri() {
        let err = Iri::new("not an iri").expect_err("invalid IRI");
        assert!(matches!(err, super::IriError::Invalid { value } if value == "not an iri"));
    }

    #[rstest]
    #[case("owl:Class", "http://www.w3.org/2002/07/owl#Class")]
    #[case("http://www.w3.org/2002/07/owl#Class", "http://www.w3.org/2002/07/owl#Class")]
    #[case("xsd:string", "http://www.w3.org/2001/XMLSchema#string")]
    #[case("vocabulary:Species", "http://example.org/vocabulary#Species")]
    #[case("unknown:Thing", "unknown:Thing")]
    fn canonicalizes_prefixed_names(#[case] input: &str, #[case] expected: &str) {
        let extra = [(
            "vocabulary".to_string(),
            "http://example.org/vocabulary#".to_string(),
        )];
        let prefixes = PrefixMap::with_prefixes(extra.iter().map(|(p, n)| (p, n)));
        let iri = Iri::new(input).expect("valid IRI");
        assert_eq!(prefixes.canonical(&iri).as_str(), expected);
    }

    #[test]
    fn absolute_iris_are_left_untouched() {
        let prefixes = PrefixMap::default();
        assert_eq!(
            prefixes.expand("http://example.org/a"),
            "http://example.org/a"
        );
    }

    #[test]
    fn selecting_a_language_keeps_other_translations() {
        let mut label = LangString::untagged("Plant")
            .with_translation("fr", "Plante")
            .with_translation("en", "Plant (en)");
        assert!(label.select("FR"));
        assert_eq!(label.value(), Some("Plante"));
        assert_eq!(label.translations().len(), 2);
    }

    #[test]
    fn missing_translation_keeps_untagged_default() {
        let mut label = LangString::untagged("Plant");
        assert!(!label.select("fr"));
        assert_eq!(label.value(), Some("Plant"));
    }
}
