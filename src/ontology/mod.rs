//! In-memory, hierarchy-aware index over an OWL ontology.
//!
//! The ontology is fetched from a SPARQL store in three bulk queries (classes,
//! properties, restrictions) and kept resident as an immutable snapshot. Queries
//! resolve ancestors through the hierarchy graph, compose inherited properties and
//! restrictions into short-lived copies, and project multilingual labels, all
//! without touching the backing store. Label pattern searches are the exception
//! and go to the backing store directly.

pub mod entities;
pub mod fallback;
pub mod hierarchy;
pub mod loader;
pub mod repositories;
pub mod service;
pub mod snapshot;
pub mod sparql;
pub mod value_objects;

pub use entities::{
    ClassModel, DatatypePropertyModel, InheritedMembers, ObjectPropertyModel,
    OwlRestrictionModel, PropertyDefinition, PropertyKind, PropertyModel, ResourceTree, TreeNode,
    VocabularyInfo, VocabularyModel, VocabularyRoots,
};
pub use fallback::SparqlOntologyStore;
pub use hierarchy::{HierarchyGraph, MAX_GRAPH_PATH_LENGTH};
pub use loader::BulkLoader;
pub use repositories::{OntologyStore, PropertyFilter};
pub use service::InMemoryOntologyStore;
pub use snapshot::{OntologySnapshot, Registered, SnapshotStats};
pub use sparql::{HttpSparqlClient, QueryKind, QueryRow, SelectQuery, SparqlClient};
pub use value_objects::{Iri, IriError, LangString, PrefixMap};
