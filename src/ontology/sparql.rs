//! Narrow capability over the backing triple-store: run a SELECT query and get
//! back rows of named, string-valued columns.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;

use super::entities::PropertyKind;
use super::value_objects::{Iri, OWL_NAMESPACE, RDFS_NAMESPACE, RDF_NAMESPACE};
use crate::{config::SparqlSettings, Error, Result};

pub const URI_VAR: &str = "uri";
pub const PARENT_VAR: &str = "parent";
pub const DOMAIN_VAR: &str = "domain";
pub const RANGE_VAR: &str = "range";
pub const PROPERTY_TYPE_VAR: &str = "propertyType";
pub const ON_PROPERTY_VAR: &str = "onProperty";
pub const ON_CLASS_VAR: &str = "onClass";
pub const ON_DATA_RANGE_VAR: &str = "onDataRange";
pub const MIN_CARDINALITY_VAR: &str = "minCardinality";
pub const MAX_CARDINALITY_VAR: &str = "maxCardinality";
pub const CARDINALITY_VAR: &str = "cardinality";
pub const SOME_VALUES_FROM_VAR: &str = "someValuesFrom";

/// One solution of a SELECT query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryRow {
    values: BTreeMap<String, String>,
}

impl QueryRow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `var` to `value`.
    #[must_use]
    pub fn with(mut self, var: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(var, value);
        self
    }

    pub fn insert(&mut self, var: impl Into<String>, value: impl Into<String>) {
        self.values.insert(var.into(), value.into());
    }

    /// Returns the value bound to `var`. Unbound and empty values both read as `None`.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&str> {
        self.values
            .get(var)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(var, value)| (var.into(), value.into()))
                .collect(),
        }
    }
}

/// Which vocabulary query a [`SelectQuery`] carries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Classes,
    Properties,
    Restrictions,
    ClassAncestry,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectQuery {
    kind: QueryKind,
    text: String,
}

impl SelectQuery {
    #[must_use]
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Client for the backing triple-store.
#[async_trait]
pub trait SparqlClient: Send + Sync {
    /// Runs `query` and returns every solution.
    async fn select(&self, query: &SelectQuery) -> Result<Vec<QueryRow>>;
}

/// Restricts a class query.
#[derive(Clone, Debug, Default)]
pub struct ClassScope {
    /// Only this class.
    pub uri: Option<Iri>,
    /// Only this class and its transitive subclasses.
    pub descendant_of: Option<Iri>,
    /// Only this class and its transitive superclasses.
    pub ancestor_of: Option<Iri>,
    /// Case-insensitive regular expression matched against labels.
    pub name_pattern: Option<String>,
}

/// Restricts the `?domain` of a property or restriction query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomainScope {
    /// Exactly this class.
    Exact(Iri),
    /// This class and its transitive subclasses.
    SubClassesOf(Iri),
    /// Every class on the `subClassOf*` chain from `class` up to `ancestor`.
    Between { class: Iri, ancestor: Iri },
}

/// Restricts a property query.
#[derive(Clone, Debug, Default)]
pub struct PropertyScope {
    /// Only this property.
    pub uri: Option<Iri>,
    /// Only data or only object properties.
    pub kind: Option<PropertyKind>,
    /// Only properties whose domain falls in this scope.
    pub domain: Option<DomainScope>,
    /// Case-insensitive regular expression matched against labels.
    pub name_pattern: Option<String>,
}

/// Restricts a restriction query.
#[derive(Clone, Debug, Default)]
pub struct RestrictionScope {
    /// Only restrictions declared on classes in this scope.
    pub domain: Option<DomainScope>,
}

/// Renders the vocabulary queries for a fixed list of label languages.
#[derive(Clone, Debug)]
pub struct VocabularyQueries {
    languages: Vec<String>,
}

impl VocabularyQueries {
    /// Builds queries binding a label and comment for each of `languages`.
    #[must_use]
    pub fn new(languages: &[String]) -> Self {
        Self {
            languages: languages.to_vec(),
        }
    }

    /// Configured languages, in order.
    #[must_use]
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Variable holding the `rdfs:label` for `lang`, or the untagged one for `None`.
    #[must_use]
    pub fn name_var(lang: Option<&str>) -> String {
        lang_var("name", lang)
    }

    /// Variable holding the `rdfs:comment` for `lang`, or the untagged one for `None`.
    #[must_use]
    pub fn comment_var(lang: Option<&str>) -> String {
        lang_var("comment", lang)
    }

    /// Every class with its direct parents and translated labels, ordered by `?uri`.
    #[must_use]
    pub fn classes(&self, scope: &ClassScope) -> SelectQuery {
        let mut text = QueryText::new();
        text.select(
            "SELECT DISTINCT",
            &[URI_VAR, PARENT_VAR],
            &self.translated_vars(),
        );
        text.open_where();
        if let Some(uri) = &scope.uri {
            text.line(format!("VALUES ?{URI_VAR} {{ {} }}", uri.to_sparql()));
        }
        text.line(format!("?{URI_VAR} rdf:type owl:Class ."));
        text.line(format!("FILTER(isIRI(?{URI_VAR}))"));
        if let Some(ancestor) = &scope.descendant_of {
            text.line(format!(
                "?{URI_VAR} rdfs:subClassOf* {} .",
                ancestor.to_sparql()
            ));
        }
        if let Some(class) = &scope.ancestor_of {
            text.line(format!("{} rdfs:subClassOf* ?{URI_VAR} .", class.to_sparql()));
        }
        text.line(format!(
            "OPTIONAL {{ ?{URI_VAR} rdfs:subClassOf ?{PARENT_VAR} . ?{PARENT_VAR} rdf:type owl:Class . FILTER(isIRI(?{PARENT_VAR})) }}"
        ));
        self.append_translations(&mut text);
        append_name_pattern(&mut text, scope.name_pattern.as_deref());
        text.close_where();
        text.line(format!("ORDER BY ?{URI_VAR}"));
        text.build(QueryKind::Classes)
    }

    /// Every data and object property with parents, domain, range and labels, ordered by `?uri`.
    #[must_use]
    pub fn properties(&self, scope: &PropertyScope) -> SelectQuery {
        let mut text = QueryText::new();
        text.select(
            "SELECT DISTINCT",
            &[URI_VAR, PROPERTY_TYPE_VAR, PARENT_VAR, DOMAIN_VAR, RANGE_VAR],
            &self.translated_vars(),
        );
        text.open_where();
        let types = match scope.kind {
            Some(PropertyKind::Data) => "owl:DatatypeProperty",
            Some(PropertyKind::Object) => "owl:ObjectProperty",
            None => "owl:DatatypeProperty owl:ObjectProperty",
        };
        text.line(format!("VALUES ?{PROPERTY_TYPE_VAR} {{ {types} }}"));
        if let Some(uri) = &scope.uri {
            text.line(format!("VALUES ?{URI_VAR} {{ {} }}", uri.to_sparql()));
        }
        text.line(format!("?{URI_VAR} rdf:type ?{PROPERTY_TYPE_VAR} ."));
        text.line(format!("FILTER(isIRI(?{URI_VAR}))"));
        text.line(format!(
            "OPTIONAL {{ ?{URI_VAR} rdfs:subPropertyOf ?{PARENT_VAR} . ?{PARENT_VAR} rdf:type ?{PROPERTY_TYPE_VAR} . FILTER(isIRI(?{PARENT_VAR})) }}"
        ));
        text.line(format!(
            "OPTIONAL {{ ?{URI_VAR} rdfs:domain ?{DOMAIN_VAR} . FILTER(isIRI(?{DOMAIN_VAR})) }}"
        ));
        text.line(format!(
            "OPTIONAL {{ ?{URI_VAR} rdfs:range ?{RANGE_VAR} . FILTER(isIRI(?{RANGE_VAR})) }}"
        ));
        if let Some(domain) = &scope.domain {
            append_domain_scope(&mut text, domain);
        }
        self.append_translations(&mut text);
        append_name_pattern(&mut text, scope.name_pattern.as_deref());
        text.close_where();
        text.line(format!("ORDER BY ?{URI_VAR}"));
        text.build(QueryKind::Properties)
    }

    /// Every restriction whose constrained property and domain are identifiers.
    #[must_use]
    pub fn restrictions(&self, scope: &RestrictionScope) -> SelectQuery {
        let mut text = QueryText::new();
        text.select(
            "SELECT DISTINCT",
            &[
                URI_VAR,
                DOMAIN_VAR,
                ON_PROPERTY_VAR,
                ON_DATA_RANGE_VAR,
                ON_CLASS_VAR,
                MIN_CARDINALITY_VAR,
                MAX_CARDINALITY_VAR,
                CARDINALITY_VAR,
                SOME_VALUES_FROM_VAR,
            ],
            &[],
        );
        text.open_where();
        text.line(format!("?{URI_VAR} rdf:type owl:Restriction ."));
        text.line(format!("?{DOMAIN_VAR} rdfs:subClassOf ?{URI_VAR} ."));
        text.line(format!("?{URI_VAR} owl:onProperty ?{ON_PROPERTY_VAR} ."));
        text.line(format!(
            "FILTER(isIRI(?{ON_PROPERTY_VAR}) && isIRI(?{DOMAIN_VAR}))"
        ));
        text.line(format!(
            "OPTIONAL {{ ?{URI_VAR} owl:onDataRange ?{ON_DATA_RANGE_VAR} }}"
        ));
        text.line(format!("OPTIONAL {{ ?{URI_VAR} owl:onClass ?{ON_CLASS_VAR} }}"));
        for (var, plain, qualified) in [
            (MIN_CARDINALITY_VAR, "minCardinality", "minQualifiedCardinality"),
            (MAX_CARDINALITY_VAR, "maxCardinality", "maxQualifiedCardinality"),
            (CARDINALITY_VAR, "cardinality", "qualifiedCardinality"),
        ] {
            text.line(format!(
                "OPTIONAL {{ {{ ?{URI_VAR} owl:{plain} ?{var} }} UNION {{ ?{URI_VAR} owl:{qualified} ?{var} }} }}"
            ));
        }
        text.line(format!(
            "OPTIONAL {{ ?{URI_VAR} owl:someValuesFrom ?{SOME_VALUES_FROM_VAR} }}"
        ));
        if let Some(domain) = &scope.domain {
            append_domain_scope(&mut text, domain);
        }
        text.close_where();
        text.line(format!("ORDER BY ?{DOMAIN_VAR} ?{URI_VAR}"));
        text.build(QueryKind::Restrictions)
    }

    /// Returns `class` when it exists and, if given, is a proper subclass of `ancestor`.
    #[must_use]
    pub fn class_ancestry(&self, class: &Iri, ancestor: Option<&Iri>) -> SelectQuery {
        let mut text = QueryText::new();
        text.select("SELECT", &[URI_VAR], &[]);
        text.open_where();
        text.line(format!("VALUES ?{URI_VAR} {{ {} }}", class.to_sparql()));
        text.line(format!("?{URI_VAR} rdf:type owl:Class ."));
        if let Some(ancestor) = ancestor {
            text.line(format!(
                "?{URI_VAR} rdfs:subClassOf+ {} .",
                ancestor.to_sparql()
            ));
        }
        text.close_where();
        text.line("LIMIT 1");
        text.build(QueryKind::ClassAncestry)
    }

    fn translated_vars(&self) -> Vec<String> {
        let mut vars = Vec::with_capacity(2 * (self.languages.len() + 1));
        for lang in self.language_variants() {
            vars.push(Self::name_var(lang));
            vars.push(Self::comment_var(lang));
        }
        vars
    }

    fn language_variants(&self) -> impl Iterator<Item = Option<&str>> {
        self.languages
            .iter()
            .map(|lang| Some(lang.as_str()))
            .chain(std::iter::once(None))
    }

    fn append_translations(&self, text: &mut QueryText) {
        for lang in self.language_variants() {
            for (predicate, var) in [
                ("rdfs:label", Self::name_var(lang)),
                ("rdfs:comment", Self::comment_var(lang)),
            ] {
                let filter = match lang {
                    Some(lang) => format!("langMatches(lang(?{var}), \"{}\")", escape(lang)),
                    None => format!("lang(?{var}) = \"\""),
                };
                text.line(format!(
                    "OPTIONAL {{ ?{URI_VAR} {predicate} ?{var} . FILTER({filter}) }}"
                ));
            }
        }
    }
}

fn lang_var(field: &str, lang: Option<&str>) -> String {
    match lang {
        Some(lang) => {
            let suffix: String = lang
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            format!("{field}_{}", suffix.to_lowercase())
        }
        None => format!("{field}_no_lang"),
    }
}

fn append_domain_scope(text: &mut QueryText, scope: &DomainScope) {
    match scope {
        DomainScope::Exact(domain) => {
            text.line(format!("FILTER(?{DOMAIN_VAR} = {})", domain.to_sparql()));
        }
        DomainScope::SubClassesOf(domain) => {
            text.line(format!(
                "?{DOMAIN_VAR} rdfs:subClassOf* {} .",
                domain.to_sparql()
            ));
        }
        DomainScope::Between { class, ancestor } => {
            text.line(format!(
                "{} rdfs:subClassOf* ?{DOMAIN_VAR} .",
                class.to_sparql()
            ));
            text.line(format!(
                "?{DOMAIN_VAR} rdfs:subClassOf* {} .",
                ancestor.to_sparql()
            ));
        }
    }
}

fn append_name_pattern(text: &mut QueryText, pattern: Option<&str>) {
    if let Some(pattern) = pattern.filter(|pattern| !pattern.is_empty()) {
        text.line(format!(
            "?{URI_VAR} rdfs:label ?pattern_label . FILTER(regex(str(?pattern_label), \"{}\", \"i\"))",
            escape(pattern)
        ));
    }
}

/// Escapes a value for a double-quoted SPARQL string literal.
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            _ => escaped.push(c),
        }
    }
    escaped
}

struct QueryText {
    lines: Vec<String>,
    depth: usize,
}

impl QueryText {
    fn new() -> Self {
        let lines = [
            ("rdf", RDF_NAMESPACE),
            ("rdfs", RDFS_NAMESPACE),
            ("owl", OWL_NAMESPACE),
        ]
        .iter()
        .map(|(prefix, namespace)| format!("PREFIX {prefix}: <{namespace}>"))
        .collect();
        Self { lines, depth: 0 }
    }

    fn select(&mut self, keyword: &str, vars: &[&str], extra: &[String]) {
        let mut line = keyword.to_string();
        for var in vars.iter().copied().chain(extra.iter().map(String::as_str)) {
            let _ = write!(line, " ?{var}");
        }
        self.lines.push(line);
    }

    fn open_where(&mut self) {
        self.line("WHERE {");
        self.depth += 1;
    }

    fn close_where(&mut self) {
        self.depth -= 1;
        self.line("}");
    }

    fn line(&mut self, line: impl AsRef<str>) {
        self.lines
            .push(format!("{}{}", "  ".repeat(self.depth), line.as_ref()));
    }

    fn build(self, kind: QueryKind) -> SelectQuery {
        SelectQuery {
            kind,
            text: self.lines.join("\n"),
        }
    }
}

#[derive(Deserialize)]
struct SparqlResults {
    results: SparqlBindings,
}

#[derive(Deserialize)]
struct SparqlBindings {
    bindings: Vec<HashMap<String, SparqlTerm>>,
}

#[derive(Deserialize)]
struct SparqlTerm {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

impl SparqlTerm {
    fn into_value(self) -> String {
        if self.kind == "bnode" {
            format!("_:{}", self.value)
        } else {
            self.value
        }
    }
}

/// [`SparqlClient`] speaking the SPARQL 1.1 protocol over HTTP.
#[derive(Clone, Debug)]
pub struct HttpSparqlClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSparqlClient {
    /// Creates a client for `settings.endpoint` with the configured request timeout.
    ///
    /// # Errors
    /// Fails with [`Error::Config`] on an empty endpoint, or when the HTTP client
    /// cannot be built.
    pub fn new(settings: &SparqlSettings) -> Result<Self> {
        if settings.endpoint.is_empty() {
            return Err(Error::Config("sparql endpoint cannot be empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
        })
    }
}

#[async_trait]
impl SparqlClient for HttpSparqlClient {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<QueryRow>> {
        debug!(kind = ?query.kind(), endpoint = %self.endpoint, "running SPARQL query");
        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/sparql-results+json")
            .form(&[("query", query.text())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Sparql(format!(
                "endpoint `{}` answered {status}: {body}",
                self.endpoint
            )));
        }

        let results: SparqlResults = response.json().await?;
        Ok(results
            .results
            .bindings
            .into_iter()
            .map(|binding| {
                binding
                    .into_iter()
                    .map(|(var, term)| (var, term.into_value()))
                    .collect()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::{
        ClassScope, DomainScope, PropertyScope, QueryKind, QueryRow, RestrictionScope,
        VocabularyQueries,
    };
    use crate::ontology::entities::PropertyKind;
    use crate::ontology::value_objects::Iri;

    fn iri(name: &str) -> Iri {
        Iri::new(format!("https://example.org/{name}")).expect("valid iri")
    }

    fn queries() -> VocabularyQueries {
        VocabularyQueries::new(&["en".to_string(), "pt-BR".to_string()])
    }

    #[test]
    fn empty_values_read_as_unbound() {
        let row = QueryRow::new().with("uri", "https://example.org/A").with("parent", "");
        assert_eq!(row.get("uri"), Some("https://example.org/A"));
        assert_eq!(row.get("parent"), None);
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn language_variables_are_valid_sparql_names() {
        assert_eq!(VocabularyQueries::name_var(Some("pt-BR")), "name_pt_br");
        assert_eq!(VocabularyQueries::comment_var(None), "comment_no_lang");
    }

    #[test]
    fn class_query_binds_every_language_variant() {
        let query = queries().classes(&ClassScope::default());
        assert_eq!(query.kind(), QueryKind::Classes);
        let text = query.text();
        assert!(text.contains("SELECT DISTINCT ?uri ?parent ?name_en ?comment_en ?name_pt_br"));
        assert!(text.contains("FILTER(langMatches(lang(?name_pt_br), \"pt-BR\"))"));
        assert!(text.contains("FILTER(lang(?comment_no_lang) = \"\")"));
        assert!(text.ends_with("ORDER BY ?uri"));
        assert!(!text.contains("VALUES ?uri"));
    }

    #[test]
    fn class_query_can_follow_the_chain_between_two_classes() {
        let query = queries().classes(&ClassScope {
            ancestor_of: Some(iri("Leaf")),
            descendant_of: Some(iri("Root")),
            ..ClassScope::default()
        });
        let text = query.text();
        assert!(text.contains("<https://example.org/Leaf> rdfs:subClassOf* ?uri ."));
        assert!(text.contains("?uri rdfs:subClassOf* <https://example.org/Root> ."));
    }

    #[test]
    fn property_query_scopes_kind_domain_and_pattern() {
        let query = queries().properties(&PropertyScope {
            kind: Some(PropertyKind::Data),
            domain: Some(DomainScope::SubClassesOf(iri("Plant"))),
            name_pattern: Some("he\"ight".to_string()),
            ..PropertyScope::default()
        });
        let text = query.text();
        assert!(text.contains("VALUES ?propertyType { owl:DatatypeProperty }"));
        assert!(text.contains("?domain rdfs:subClassOf* <https://example.org/Plant> ."));
        assert!(text.contains("regex(str(?pattern_label), \"he\\\"ight\", \"i\")"));
    }

    #[test]
    fn restriction_query_walks_the_ancestor_chain() {
        let query = queries().restrictions(&RestrictionScope {
            domain: Some(DomainScope::Between {
                class: iri("Leaf"),
                ancestor: iri("Root"),
            }),
        });
        let text = query.text();
        assert!(text.contains("<https://example.org/Leaf> rdfs:subClassOf* ?domain ."));
        assert!(text.contains("?domain rdfs:subClassOf* <https://example.org/Root> ."));
        assert!(text.contains("owl:minQualifiedCardinality ?minCardinality"));
    }

    #[test]
    fn class_ancestry_query() {
        let query = queries().class_ancestry(&iri("C"), Some(&iri("A")));
        assert_snapshot!(query.text(), @r"
        PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>
        PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
        PREFIX owl: <http://www.w3.org/2002/07/owl#>
        SELECT ?uri
        WHERE {
          VALUES ?uri { <https://example.org/C> }
          ?uri rdf:type owl:Class .
          ?uri rdfs:subClassOf+ <https://example.org/A> .
        }
        LIMIT 1
        ");
    }
}
