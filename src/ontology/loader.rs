//! Bulk loading of vocabulary models from the backing store.
//!
//! Rows come back ordered by identifier; consecutive rows for one identifier
//! are folded into a single model carrying every parent and translation seen.

use std::sync::Arc;

use tracing::{debug, warn};

use super::entities::{
    ClassModel, OwlRestrictionModel, PropertyKind, PropertyModel, VocabularyInfo,
    VocabularyModel, VocabularyRoots,
};
use super::sparql::{
    ClassScope, PropertyScope, QueryRow, RestrictionScope, SelectQuery, SparqlClient,
    VocabularyQueries, CARDINALITY_VAR, DOMAIN_VAR, MAX_CARDINALITY_VAR, MIN_CARDINALITY_VAR,
    ON_CLASS_VAR, ON_DATA_RANGE_VAR, ON_PROPERTY_VAR, PARENT_VAR, PROPERTY_TYPE_VAR, RANGE_VAR,
    SOME_VALUES_FROM_VAR, URI_VAR,
};
use super::value_objects::{Iri, PrefixMap};
use crate::{Error, Result};

/// Fetches the ontology from a [`SparqlClient`] in a fixed number of bulk queries.
#[derive(Clone)]
pub struct BulkLoader {
    client: Arc<dyn SparqlClient>,
    queries: VocabularyQueries,
    prefixes: Arc<PrefixMap>,
    roots: Arc<VocabularyRoots>,
}

impl BulkLoader {
    /// Creates a loader reading labels and comments in `languages`.
    ///
    /// # Errors
    /// Fails with [`Error::Config`] when `languages` is empty.
    pub fn new(
        client: Arc<dyn SparqlClient>,
        languages: &[String],
        prefixes: Arc<PrefixMap>,
        roots: Arc<VocabularyRoots>,
    ) -> Result<Self> {
        if languages.is_empty() {
            return Err(Error::Config(
                "at least one label language is required".to_string(),
            ));
        }
        Ok(Self {
            client,
            queries: VocabularyQueries::new(languages),
            prefixes,
            roots,
        })
    }

    /// Client every query goes through.
    #[must_use]
    pub fn client(&self) -> &dyn SparqlClient {
        self.client.as_ref()
    }

    /// Query builders for the configured languages.
    #[must_use]
    pub fn queries(&self) -> &VocabularyQueries {
        &self.queries
    }

    /// Prefixes used to canonicalize identifiers.
    #[must_use]
    pub fn prefixes(&self) -> &PrefixMap {
        &self.prefixes
    }

    /// Root models new models are typed with.
    #[must_use]
    pub fn roots(&self) -> &VocabularyRoots {
        &self.roots
    }

    /// Every class of the ontology, in one query.
    ///
    /// # Errors
    /// When the query fails.
    pub async fn get_classes(&self) -> Result<Vec<ClassModel>> {
        self.classes(&ClassScope::default()).await
    }

    /// Every data and object property of the ontology, in one query.
    ///
    /// # Errors
    /// When the query fails.
    pub async fn get_properties(&self) -> Result<Vec<PropertyModel>> {
        self.properties(&PropertyScope::default()).await
    }

    /// Every well-formed restriction of the ontology, in one query.
    ///
    /// # Errors
    /// When the query fails or a restriction lacks its property or domain.
    pub async fn get_restrictions(&self) -> Result<Vec<OwlRestrictionModel>> {
        self.restrictions(&RestrictionScope::default()).await
    }

    /// Classes matching `scope`, one model per identifier.
    pub async fn classes(&self, scope: &ClassScope) -> Result<Vec<ClassModel>> {
        let rows = self.run(&self.queries.classes(scope)).await?;
        let classes = self.fold_rows(
            &rows,
            |_, id| Ok(self.roots.class(id)),
            |_, _| Ok(()),
        )?;
        Ok(classes)
    }

    /// Data and object properties matching `scope`, one model per identifier.
    ///
    /// The variant follows the `?propertyType` column. Properties left without a
    /// domain or range are kept and reported.
    pub async fn properties(&self, scope: &PropertyScope) -> Result<Vec<PropertyModel>> {
        let rows = self.run(&self.queries.properties(scope)).await?;
        let properties = self.fold_rows(
            &rows,
            |row, id| {
                let kind = match row.get(PROPERTY_TYPE_VAR) {
                    Some(value)
                        if &self.prefixes.parse(value)?
                            == self.roots.datatype_property.iri() =>
                    {
                        PropertyKind::Data
                    }
                    _ => PropertyKind::Object,
                };
                Ok(self.roots.property(id, kind))
            },
            |row, property| {
                if property.domain().is_none() {
                    property.set_domain(self.optional_iri(row, DOMAIN_VAR)?);
                }
                if property.range().is_none() {
                    property.set_range(self.optional_iri(row, RANGE_VAR)?);
                }
                Ok(())
            },
        )?;

        for property in &properties {
            if property.domain().is_none() {
                warn!(property = %property.id(), "property has no domain");
            }
            if property.range().is_none() {
                warn!(property = %property.id(), "property has no range");
            }
        }
        Ok(properties)
    }

    /// Restrictions matching `scope`, one model per restriction node and domain.
    ///
    /// # Errors
    /// Fails with [`Error::MalformedRestriction`] when a row lacks the constrained
    /// property or the domain, or carries a cardinality that is not a count.
    pub async fn restrictions(&self, scope: &RestrictionScope) -> Result<Vec<OwlRestrictionModel>> {
        let rows = self.run(&self.queries.restrictions(scope)).await?;
        let mut restrictions: Vec<OwlRestrictionModel> = Vec::new();
        for row in &rows {
            let restriction = self.restriction_from_row(row)?;
            match restrictions.last_mut() {
                Some(last)
                    if last.node() == restriction.node()
                        && last.domain() == restriction.domain() =>
                {
                    last.merge(&restriction);
                }
                _ => restrictions.push(restriction),
            }
        }

        for restriction in &restrictions {
            if !restriction.has_range() {
                warn!(
                    node = restriction.node(),
                    property = %restriction.on_property(),
                    domain = %restriction.domain(),
                    "restriction has no range"
                );
            }
        }
        Ok(restrictions)
    }

    async fn run(&self, query: &SelectQuery) -> Result<Vec<QueryRow>> {
        debug!(kind = ?query.kind(), "querying backing store");
        let rows = self.client.select(query).await?;
        debug!(kind = ?query.kind(), rows = rows.len(), "backing store answered");
        Ok(rows)
    }

    /// Folds consecutive rows sharing `?uri` into one model.
    fn fold_rows<M, B, F>(&self, rows: &[QueryRow], mut build: B, mut fill: F) -> Result<Vec<M>>
    where
        M: VocabularyModel,
        B: FnMut(&QueryRow, Iri) -> Result<M>,
        F: FnMut(&QueryRow, &mut M) -> Result<()>,
    {
        let mut models: Vec<M> = Vec::new();
        for row in rows {
            let Some(uri) = row.get(URI_VAR) else {
                warn!("skipping row without identifier");
                continue;
            };
            let id = self.prefixes.parse(uri)?;
            if models.last().map_or(true, |last| last.id() != &id) {
                models.push(build(row, id)?);
            }
            let Some(model) = models.last_mut() else {
                continue;
            };
            self.read_translations(row, model.info_mut());
            if let Some(parent) = self.optional_iri(row, PARENT_VAR)? {
                if &parent != model.id() {
                    model.info_mut().add_parent(parent);
                }
            }
            fill(row, model)?;
        }
        Ok(models)
    }

    fn read_translations(&self, row: &QueryRow, info: &mut VocabularyInfo) {
        for lang in self.queries.languages() {
            if let Some(name) = row.get(&VocabularyQueries::name_var(Some(lang))) {
                info.label_mut().add_translation(lang.as_str(), name);
            }
            if let Some(comment) = row.get(&VocabularyQueries::comment_var(Some(lang))) {
                info.comment_mut().add_translation(lang.as_str(), comment);
            }
        }
        if let Some(name) = row.get(&VocabularyQueries::name_var(None)) {
            info.label_mut().set_default_if_absent(name);
        }
        if let Some(comment) = row.get(&VocabularyQueries::comment_var(None)) {
            info.comment_mut().set_default_if_absent(comment);
        }
    }

    fn restriction_from_row(&self, row: &QueryRow) -> Result<OwlRestrictionModel> {
        let node = row.get(URI_VAR).unwrap_or_default().to_string();
        let malformed = |reason: &str| Error::MalformedRestriction {
            node: node.clone(),
            reason: reason.to_string(),
        };

        let on_property = row
            .get(ON_PROPERTY_VAR)
            .ok_or_else(|| malformed("missing constrained property"))?;
        let domain = row
            .get(DOMAIN_VAR)
            .ok_or_else(|| malformed("missing domain"))?;

        let mut restriction = OwlRestrictionModel::new(
            node.clone(),
            self.prefixes.parse(on_property)?,
            self.prefixes.parse(domain)?,
            &self.roots.restriction,
        );
        if let Some(range) = self.optional_iri(row, ON_DATA_RANGE_VAR)? {
            restriction = restriction.with_on_data_range(range);
        }
        if let Some(class) = self.optional_iri(row, ON_CLASS_VAR)? {
            restriction = restriction.with_on_class(class);
        }
        if let Some(class) = self.optional_iri(row, SOME_VALUES_FROM_VAR)? {
            restriction = restriction.with_some_values_from(class);
        }
        for (var, name) in [
            (MIN_CARDINALITY_VAR, "min cardinality"),
            (MAX_CARDINALITY_VAR, "max cardinality"),
            (CARDINALITY_VAR, "cardinality"),
        ] {
            let Some(value) = row.get(var) else {
                continue;
            };
            let count: u32 = value
                .trim()
                .parse()
                .map_err(|_| malformed(&format!("{name} `{value}` is not a count")))?;
            restriction = match var {
                MIN_CARDINALITY_VAR => restriction.with_min_cardinality(count),
                MAX_CARDINALITY_VAR => restriction.with_max_cardinality(count),
                _ => restriction.with_cardinality(count),
            };
        }
        Ok(restriction)
    }

    fn optional_iri(&self, row: &QueryRow, var: &str) -> Result<Option<Iri>> {
        row.get(var)
            .map(|value| self.prefixes.parse(value))
            .transpose()
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::BulkLoader;
    use crate::ontology::entities::{PropertyKind, VocabularyModel, VocabularyRoots};
    use crate::ontology::sparql::{QueryKind, QueryRow};
    use crate::ontology::value_objects::{Iri, PrefixMap};
    use crate::tests_cfg::{self, ScriptedClient};
    use crate::Error;

    fn loader(client: ScriptedClient) -> BulkLoader {
        BulkLoader::new(
            Arc::new(client),
            &["en".to_string(), "fr".to_string()],
            Arc::new(PrefixMap::default()),
            Arc::new(VocabularyRoots::default()),
        )
        .expect("languages configured")
    }

    fn iri(name: &str) -> Iri {
        tests_cfg::iri(name)
    }

    #[test]
    fn requires_a_language() {
        let err = BulkLoader::new(
            Arc::new(ScriptedClient::default()),
            &[],
            Arc::new(PrefixMap::default()),
            Arc::new(VocabularyRoots::default()),
        )
        .err()
        .expect("no languages");
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn consecutive_rows_fold_into_one_class() {
        let client = ScriptedClient::default().with_rows(
            QueryKind::Classes,
            vec![
                QueryRow::new()
                    .with("uri", iri("Leaf").as_str())
                    .with("parent", iri("Mid").as_str())
                    .with("name_en", "Leaf"),
                QueryRow::new()
                    .with("uri", iri("Leaf").as_str())
                    .with("parent", iri("Other").as_str())
                    .with("name_fr", "Feuille"),
                QueryRow::new()
                    .with("uri", iri("Leaf").as_str())
                    .with("parent", iri("Mid").as_str())
                    .with("name_no_lang", "leaf"),
                QueryRow::new().with("uri", iri("Mid").as_str()),
            ],
        );
        let classes = loader(client).get_classes().await.expect("classes");

        assert_eq!(classes.len(), 2);
        let leaf = &classes[0];
        assert_eq!(leaf.info().parents(), &[iri("Mid"), iri("Other")]);
        assert_eq!(leaf.info().primary_parent(), Some(&iri("Mid")));
        assert_eq!(leaf.info().label().translation("en"), Some("Leaf"));
        assert_eq!(leaf.info().label().translation("fr"), Some("Feuille"));
        assert_eq!(leaf.info().label().value(), Some("leaf"));
    }

    #[tokio::test]
    async fn property_type_selects_the_variant() {
        let client = ScriptedClient::default().with_rows(
            QueryKind::Properties,
            vec![
                QueryRow::new()
                    .with("uri", iri("hasHeight").as_str())
                    .with("propertyType", "http://www.w3.org/2002/07/owl#DatatypeProperty")
                    .with("domain", iri("Plant").as_str()),
                QueryRow::new()
                    .with("uri", iri("hasHeight").as_str())
                    .with("propertyType", "http://www.w3.org/2002/07/owl#DatatypeProperty")
                    .with("range", "xsd:decimal"),
                QueryRow::new()
                    .with("uri", iri("partOf").as_str())
                    .with("propertyType", "owl:ObjectProperty"),
            ],
        );
        let properties = loader(client).get_properties().await.expect("properties");

        assert_eq!(properties.len(), 2);
        assert_eq!(properties[0].kind(), PropertyKind::Data);
        assert_eq!(properties[0].domain(), Some(&iri("Plant")));
        assert_eq!(
            properties[0].range().map(Iri::as_str),
            Some("http://www.w3.org/2001/XMLSchema#decimal")
        );
        assert_eq!(properties[1].kind(), PropertyKind::Object);
        assert_eq!(properties[1].domain(), None);
    }

    #[tokio::test]
    async fn restriction_without_property_is_malformed() {
        let client = ScriptedClient::default().with_rows(
            QueryKind::Restrictions,
            vec![QueryRow::new()
                .with("uri", "_:b0")
                .with("domain", iri("Plant").as_str())],
        );
        let err = loader(client)
            .get_restrictions()
            .await
            .expect_err("missing property");
        assert!(matches!(err, Error::MalformedRestriction { node, .. } if node == "_:b0"));
    }

    #[tokio::test]
    async fn restriction_rows_for_one_node_are_merged() {
        let client = ScriptedClient::default().with_rows(
            QueryKind::Restrictions,
            vec![
                QueryRow::new()
                    .with("uri", "_:b0")
                    .with("domain", iri("Plant").as_str())
                    .with("onProperty", iri("hasHeight").as_str())
                    .with("minCardinality", "1"),
                QueryRow::new()
                    .with("uri", "_:b0")
                    .with("domain", iri("Plant").as_str())
                    .with("onProperty", iri("hasHeight").as_str())
                    .with("onDataRange", "xsd:decimal")
                    .with("cardinality", "1"),
            ],
        );
        let restrictions = loader(client).get_restrictions().await.expect("restrictions");

        assert_eq!(restrictions.len(), 1);
        assert_eq!(restrictions[0].min_cardinality(), Some(1));
        assert_eq!(restrictions[0].cardinality(), Some(1));
        assert!(restrictions[0].has_range());
    }

    #[tokio::test]
    async fn non_numeric_cardinality_is_malformed() {
        let client = ScriptedClient::default().with_rows(
            QueryKind::Restrictions,
            vec![QueryRow::new()
                .with("uri", "_:b1")
                .with("domain", iri("Plant").as_str())
                .with("onProperty", iri("hasHeight").as_str())
                .with("maxCardinality", "many")],
        );
        let err = loader(client)
            .get_restrictions()
            .await
            .expect_err("bad cardinality");
        assert!(matches!(err, Error::MalformedRestriction { .. }));
    }
}
