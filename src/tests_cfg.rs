//! Test doubles and fixture ontologies.
//!
//! Enabled for unit tests and, through the `testing` feature, for integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::config::OntologySettings;
use crate::ontology::{
    sparql::{QueryKind, QueryRow, SelectQuery, SparqlClient},
    value_objects::Iri,
    InMemoryOntologyStore,
};
use crate::{Error, Result};

pub const EXAMPLE_NAMESPACE: &str = "https://example.org/onto#";

const DATATYPE_PROPERTY: &str = "http://www.w3.org/2002/07/owl#DatatypeProperty";
const OBJECT_PROPERTY: &str = "http://www.w3.org/2002/07/owl#ObjectProperty";

/// Identifier `name` in [`EXAMPLE_NAMESPACE`].
///
/// # Panics
/// When `name` does not form a valid IRI.
#[must_use]
pub fn iri(name: &str) -> Iri {
    Iri::new(format!("{EXAMPLE_NAMESPACE}{name}")).expect("fixture identifiers are valid")
}

#[derive(Default)]
struct Script {
    rows: HashMap<QueryKind, Vec<QueryRow>>,
    failing: Option<QueryKind>,
    received: Vec<SelectQuery>,
}

/// [`SparqlClient`] answering each [`QueryKind`] with fixed rows and recording every query.
#[derive(Clone, Default)]
pub struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

impl ScriptedClient {
    #[must_use]
    pub fn with_rows(self, kind: QueryKind, rows: Vec<QueryRow>) -> Self {
        self.set_rows(kind, rows);
        self
    }

    /// Replaces the rows served for `kind`.
    pub fn set_rows(&self, kind: QueryKind, rows: Vec<QueryRow>) {
        self.script().rows.insert(kind, rows);
    }

    /// Makes every query of `kind` fail until reset with `None`.
    pub fn fail_on(&self, kind: Option<QueryKind>) {
        self.script().failing = kind;
    }

    /// Queries received so far, oldest first.
    #[must_use]
    pub fn received(&self) -> Vec<SelectQuery> {
        self.script().received.clone()
    }

    pub fn clear_received(&self) {
        self.script().received.clear();
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SparqlClient for ScriptedClient {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<QueryRow>> {
        let mut script = self.script();
        script.received.push(query.clone());
        if script.failing == Some(query.kind()) {
            return Err(Error::Sparql(format!(
                "scripted failure for {:?} query",
                query.kind()
            )));
        }
        Ok(script.rows.get(&query.kind()).cloned().unwrap_or_default())
    }
}

fn class_row(name: &str, parent: Option<&str>) -> QueryRow {
    let mut row = QueryRow::new().with("uri", iri(name).as_str());
    if let Some(parent) = parent {
        row.insert("parent", iri(parent).as_str());
    }
    row
}

fn property_row(name: &str, property_type: &str, domain: &str, range: &str) -> QueryRow {
    QueryRow::new()
        .with("uri", iri(name).as_str())
        .with("propertyType", property_type)
        .with("domain", iri(domain).as_str())
        .with("range", range)
}

fn restriction_row(node: &str, domain: &str, property: &str) -> QueryRow {
    QueryRow::new()
        .with("uri", node)
        .with("domain", iri(domain).as_str())
        .with("onProperty", iri(property).as_str())
}

/// Classes `A`, `B` (parent `A`) and `C` (parent `B`); `A` carries the data property
/// `name`, `B` the object property `partOf` ranging over `A`.
#[must_use]
pub fn example_ontology() -> ScriptedClient {
    ScriptedClient::default()
        .with_rows(
            QueryKind::Classes,
            vec![
                class_row("A", None)
                    .with("name_en", "Thing A")
                    .with("name_fr", "Chose A")
                    .with("name_no_lang", "A"),
                class_row("B", Some("A")).with("name_no_lang", "B"),
                class_row("C", Some("B")).with("name_no_lang", "C"),
            ],
        )
        .with_rows(
            QueryKind::Properties,
            vec![
                property_row(
                    "name",
                    DATATYPE_PROPERTY,
                    "A",
                    "http://www.w3.org/2001/XMLSchema#string",
                )
                .with("name_en", "name"),
                property_row("partOf", OBJECT_PROPERTY, "B", iri("A").as_str()),
            ],
        )
}

/// Chain `Root -> Mid -> Leaf` where `Root` declares `p2`, `Mid` declares `p1`, and
/// both restrict `p1` with different minimum cardinalities.
#[must_use]
pub fn layered_ontology() -> ScriptedClient {
    let string = "http://www.w3.org/2001/XMLSchema#string";
    ScriptedClient::default()
        .with_rows(
            QueryKind::Classes,
            vec![
                class_row("Leaf", Some("Mid")),
                class_row("Mid", Some("Root")),
                class_row("Root", None)
                    .with("name_no_lang", "Root")
                    .with("comment_en", "Top of the chain"),
            ],
        )
        .with_rows(
            QueryKind::Properties,
            vec![
                property_row("p1", DATATYPE_PROPERTY, "Mid", string),
                property_row("p2", DATATYPE_PROPERTY, "Root", string),
                property_row("p3", DATATYPE_PROPERTY, "Leaf", string),
                property_row("p4", DATATYPE_PROPERTY, "Leaf", string),
            ],
        )
        .with_rows(
            QueryKind::Restrictions,
            vec![
                restriction_row("_:leaf", "Leaf", "p3")
                    .with("onDataRange", string)
                    .with("cardinality", "1"),
                restriction_row("_:mid", "Mid", "p1").with("minCardinality", "2"),
                restriction_row("_:root", "Root", "p1").with("minCardinality", "1"),
            ],
        )
}

/// Store over `client` with `en` and `fr` label languages.
///
/// # Panics
/// Never for the default settings.
#[must_use]
pub fn store(client: &ScriptedClient) -> InMemoryOntologyStore {
    InMemoryOntologyStore::new(Arc::new(client.clone()), &OntologySettings::default())
        .expect("default settings are valid")
}
