//! # Ontology Store Errors
//!
//! Every fallible operation of the crate returns [`Error`]. Identifier-level
//! variants carry the offending [`Iri`] so callers can report it as-is.

use std::fmt::{self, Display, Formatter};

use crate::ontology::value_objects::{Iri, IriError};

/// Which role an unresolved identifier played in the failed operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IdentifierKind {
    Class,
    Property,
    DataProperty,
    ObjectProperty,
    Parent,
    Ancestor,
    Domain,
    Range,
}

impl Display for IdentifierKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Class => "class",
            Self::Property => "property",
            Self::DataProperty => "data property",
            Self::ObjectProperty => "object property",
            Self::Parent => "parent",
            Self::Ancestor => "ancestor",
            Self::Domain => "domain",
            Self::Range => "range",
        };
        f.write_str(kind)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    /// The backing store could not be reached or answered with an error.
    #[error("SPARQL query failed: {0}")]
    Sparql(String),

    #[error("unknown {kind} `{iri}`")]
    UnknownIdentifier { kind: IdentifierKind, iri: Iri },

    #[error("`{ancestor}` is not an ancestor of `{class}`")]
    NotAnAncestor { class: Iri, ancestor: Iri },

    #[error("identifier `{iri}` is already registered")]
    DuplicateIdentifier { iri: Iri },

    #[error("malformed restriction `{node}`: {reason}")]
    MalformedRestriction { node: String, reason: String },

    #[error("property `{property}` does not apply to class `{domain}`")]
    DomainMismatch { property: Iri, domain: Iri },

    #[error("invalid name pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Raised by a store-level load or reload; the previous snapshot is still served.
    #[error("ontology load failed: {0}")]
    Load(#[source] Box<Error>),

    #[error(transparent)]
    InvalidIri(#[from] IriError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Template(#[from] tera::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn unknown(kind: IdentifierKind, iri: &Iri) -> Self {
        Self::UnknownIdentifier {
            kind,
            iri: iri.clone(),
        }
    }

    /// Unwraps a [`Error::Load`] to the failure that caused it.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Load(inner) => inner.root_cause(),
            other => other,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Sparql(err.to_string())
    }
}
