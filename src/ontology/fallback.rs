//! Pass-through [`OntologyStore`] answering every call with queries against the
//! backing store. Used for requests the in-memory index cannot serve, such as
//! label pattern search.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use tracing::debug;

use super::entities::{
    ClassModel, DatatypePropertyModel, InheritedMembers, ObjectPropertyModel, PropertyDefinition,
    PropertyModel, ResourceTree, VocabularyModel,
};
use super::loader::BulkLoader;
use super::repositories::{requested_lang, requested_pattern, OntologyStore, PropertyFilter};
use super::sparql::{ClassScope, DomainScope, PropertyScope, RestrictionScope};
use super::value_objects::Iri;
use crate::errors::IdentifierKind;
use crate::{Error, Result};

/// [`OntologyStore`] that keeps nothing in memory and queries the backing store on
/// every call.
#[derive(Clone)]
pub struct SparqlOntologyStore {
    loader: BulkLoader,
}

impl SparqlOntologyStore {
    /// Creates a store issuing its queries through `loader`.
    #[must_use]
    pub fn new(loader: BulkLoader) -> Self {
        Self { loader }
    }

    fn canonical(&self, iri: &Iri) -> Iri {
        self.loader.prefixes().canonical(iri)
    }

    async fn is_sub_class(&self, class: &Iri, ancestor: Option<&Iri>) -> Result<bool> {
        let query = self.loader.queries().class_ancestry(class, ancestor);
        let rows = self.loader.client().select(&query).await?;
        Ok(!rows.is_empty())
    }

    async fn compose(
        &self,
        class: &Iri,
        ancestor: Option<&Iri>,
        members: InheritedMembers,
    ) -> Result<ClassModel> {
        let mut model = self
            .loader
            .classes(&ClassScope {
                uri: Some(class.clone()),
                ..ClassScope::default()
            })
            .await?
            .into_iter()
            .find(|model| model.id() == class)
            .ok_or_else(|| Error::unknown(IdentifierKind::Class, class))?;

        let (domain, order) = match ancestor.filter(|ancestor| *ancestor != class) {
            Some(ancestor) => {
                if !self.is_sub_class(class, Some(ancestor)).await? {
                    return Err(Error::NotAnAncestor {
                        class: class.clone(),
                        ancestor: ancestor.clone(),
                    });
                }
                let order = self.inheritance_order(class, ancestor).await?;
                let domain = DomainScope::Between {
                    class: class.clone(),
                    ancestor: ancestor.clone(),
                };
                (domain, order)
            }
            None => (DomainScope::Exact(class.clone()), Vec::new()),
        };

        let roots = self.loader.roots();
        let mut declared: BTreeMap<Iri, ClassModel> = BTreeMap::new();
        let properties = self
            .loader
            .properties(&PropertyScope {
                domain: Some(domain.clone()),
                ..PropertyScope::default()
            })
            .await?;
        for property in properties {
            if let Some(owner) = property.domain().cloned() {
                declared
                    .entry(owner.clone())
                    .or_insert_with(|| roots.class(owner))
                    .add_property(property);
            }
        }
        let restrictions = self
            .loader
            .restrictions(&RestrictionScope {
                domain: Some(domain),
            })
            .await?;
        for restriction in restrictions {
            let owner = restriction.domain().clone();
            declared
                .entry(owner.clone())
                .or_insert_with(|| roots.class(owner))
                .add_restriction(restriction);
        }

        for id in order.iter().chain(std::iter::once(class)) {
            if let Some(declaring) = declared.get(id) {
                model.absorb(declaring, members);
            }
        }
        model.retain(members);
        Ok(model)
    }

    /// Proper ancestors of `class` up to and including `ancestor`, farthest first.
    ///
    /// Distance is the shortest `subClassOf` path from `class`; ties put the smallest
    /// identifier last so it is applied last.
    async fn inheritance_order(&self, class: &Iri, ancestor: &Iri) -> Result<Vec<Iri>> {
        let chain = self
            .loader
            .classes(&ClassScope {
                ancestor_of: Some(class.clone()),
                descendant_of: Some(ancestor.clone()),
                ..ClassScope::default()
            })
            .await?;
        let parents: BTreeMap<&Iri, &[Iri]> = chain
            .iter()
            .map(|model| (model.id(), model.info().parents()))
            .collect();

        let mut distances: BTreeMap<Iri, usize> = BTreeMap::from([(class.clone(), 0)]);
        let mut queue = VecDeque::from([(class.clone(), 0)]);
        while let Some((current, distance)) = queue.pop_front() {
            if current == *ancestor {
                continue;
            }
            for parent in parents.get(&current).copied().unwrap_or_default() {
                if parents.contains_key(parent) && !distances.contains_key(parent) {
                    distances.insert(parent.clone(), distance + 1);
                    queue.push_back((parent.clone(), distance + 1));
                }
            }
        }

        let mut order: Vec<(usize, Iri)> = distances
            .into_iter()
            .filter(|(id, _)| id != class)
            .map(|(id, distance)| (distance, id))
            .collect();
        order.sort_by(|left, right| right.cmp(left));
        Ok(order.into_iter().map(|(_, id)| id).collect())
    }

    async fn search_properties<P: PropertyDefinition>(
        &self,
        domain: &Iri,
        name_pattern: Option<&str>,
        lang: Option<&str>,
        include_sub_classes: bool,
        filter: Option<&PropertyFilter<P>>,
        narrow: fn(PropertyModel) -> Option<P>,
    ) -> Result<ResourceTree<P>> {
        let domain = self.canonical(domain);
        let name_pattern = requested_pattern(name_pattern);
        if let Some(pattern) = name_pattern {
            validate_pattern(pattern)?;
        }
        let scope = PropertyScope {
            kind: Some(P::KIND),
            domain: Some(if include_sub_classes {
                DomainScope::SubClassesOf(domain.clone())
            } else {
                DomainScope::Exact(domain.clone())
            }),
            name_pattern: name_pattern.map(str::to_string),
            ..PropertyScope::default()
        };

        let roots = self.loader.roots();
        let mut found = Vec::new();
        for property in self.loader.properties(&scope).await?.into_iter().filter_map(narrow) {
            let owner = roots.class(property.domain().unwrap_or(&domain).clone());
            if filter.map_or(true, |filter| filter(&property, &owner)) {
                found.push(property);
            }
        }
        if let Some(lang) = requested_lang(lang) {
            for property in &mut found {
                property.handle_lang(lang);
            }
        }
        Ok(ResourceTree::from_models(
            roots.top_property(P::KIND).clone(),
            found,
        ))
    }

    async fn composed_view(
        &self,
        domain: &Iri,
        ancestor: Option<&Iri>,
        lang: Option<&str>,
        members: InheritedMembers,
    ) -> Result<ClassModel> {
        let domain = self.canonical(domain);
        let ancestor = ancestor.map(|ancestor| self.canonical(ancestor));
        let mut model = self.compose(&domain, ancestor.as_ref(), members).await?;
        if let Some(lang) = requested_lang(lang) {
            model.handle_lang(lang);
        }
        Ok(model)
    }
}

/// Checks that `pattern` is a valid regular expression before it is sent anywhere.
pub(crate) fn validate_pattern(pattern: &str) -> Result<()> {
    regex::RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map(|_| ())
        .map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

#[async_trait]
impl OntologyStore for SparqlOntologyStore {
    async fn load(&self) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        Ok(())
    }

    async fn class_exist(&self, class: &Iri, ancestor: Option<&Iri>) -> Result<bool> {
        let class = self.canonical(class);
        let ancestor = ancestor
            .map(|ancestor| self.canonical(ancestor))
            .filter(|ancestor| *ancestor != class);
        self.is_sub_class(&class, ancestor.as_ref()).await
    }

    async fn get_class_model(
        &self,
        class: &Iri,
        ancestor: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<ClassModel> {
        self.composed_view(class, ancestor, lang, InheritedMembers::ALL)
            .await
    }

    async fn search_sub_classes(
        &self,
        class: &Iri,
        name_pattern: Option<&str>,
        lang: Option<&str>,
        exclude_root: bool,
    ) -> Result<ResourceTree<ClassModel>> {
        let class = self.canonical(class);
        let name_pattern = requested_pattern(name_pattern);
        if let Some(pattern) = name_pattern {
            validate_pattern(pattern)?;
        }
        debug!(class = %class, pattern = ?name_pattern, "searching subclasses in backing store");
        let mut classes = self
            .loader
            .classes(&ClassScope {
                descendant_of: Some(class.clone()),
                name_pattern: name_pattern.map(str::to_string),
                ..ClassScope::default()
            })
            .await?;
        if exclude_root {
            classes.retain(|model| model.id() != &class);
        }
        if let Some(lang) = requested_lang(lang) {
            for model in &mut classes {
                model.handle_lang(lang);
            }
        }
        Ok(ResourceTree::from_models(class, classes))
    }

    async fn get_property(
        &self,
        property: &Iri,
        domain: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<PropertyModel> {
        let property = self.canonical(property);
        let mut model = self
            .loader
            .properties(&PropertyScope {
                uri: Some(property.clone()),
                ..PropertyScope::default()
            })
            .await?
            .into_iter()
            .find(|model| model.id() == &property)
            .ok_or_else(|| Error::unknown(IdentifierKind::Property, &property))?;

        if let Some(domain) = domain.map(|domain| self.canonical(domain)) {
            if let Some(declared) = model.domain() {
                if *declared != domain && !self.is_sub_class(&domain, Some(declared)).await? {
                    return Err(Error::DomainMismatch { property, domain });
                }
            }
        }
        if let Some(lang) = requested_lang(lang) {
            model.handle_lang(lang);
        }
        Ok(model)
    }

    async fn search_data_properties(
        &self,
        domain: &Iri,
        name_pattern: Option<&str>,
        lang: Option<&str>,
        include_sub_classes: bool,
        filter: Option<&PropertyFilter<DatatypePropertyModel>>,
    ) -> Result<ResourceTree<DatatypePropertyModel>> {
        self.search_properties(
            domain,
            name_pattern,
            lang,
            include_sub_classes,
            filter,
            PropertyModel::into_datatype,
        )
        .await
    }

    async fn search_object_properties(
        &self,
        domain: &Iri,
        name_pattern: Option<&str>,
        lang: Option<&str>,
        include_sub_classes: bool,
        filter: Option<&PropertyFilter<ObjectPropertyModel>>,
    ) -> Result<ResourceTree<ObjectPropertyModel>> {
        self.search_properties(
            domain,
            name_pattern,
            lang,
            include_sub_classes,
            filter,
            PropertyModel::into_object,
        )
        .await
    }

    async fn get_linkable_data_properties(
        &self,
        domain: &Iri,
        ancestor: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<Vec<DatatypePropertyModel>> {
        Ok(self
            .composed_view(domain, ancestor, lang, InheritedMembers::DATATYPE)
            .await?
            .linkable_datatype_properties())
    }

    async fn get_linkable_object_properties(
        &self,
        domain: &Iri,
        ancestor: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<Vec<ObjectPropertyModel>> {
        Ok(self
            .composed_view(domain, ancestor, lang, InheritedMembers::OBJECT)
            .await?
            .linkable_object_properties())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::SparqlOntologyStore;
    use crate::ontology::entities::{PropertyDefinition, VocabularyModel, VocabularyRoots};
    use crate::ontology::loader::BulkLoader;
    use crate::ontology::repositories::OntologyStore;
    use crate::ontology::sparql::{QueryKind, QueryRow};
    use crate::ontology::value_objects::PrefixMap;
    use crate::tests_cfg::{example_ontology, iri, layered_ontology, ScriptedClient};
    use crate::Error;

    fn fallback(client: &ScriptedClient) -> SparqlOntologyStore {
        SparqlOntologyStore::new(
            BulkLoader::new(
                Arc::new(client.clone()),
                &["en".to_string()],
                Arc::new(PrefixMap::default()),
                Arc::new(VocabularyRoots::default()),
            )
            .expect("languages configured"),
        )
    }

    #[tokio::test]
    async fn load_and_clear_do_not_query() {
        let client = example_ontology();
        let store = fallback(&client);
        store.load().await.expect("load");
        store.clear().await.expect("clear");
        store.reload().await.expect("reload");
        assert!(client.received().is_empty());
    }

    #[tokio::test]
    async fn pattern_search_issues_a_single_scoped_query() {
        let client = example_ontology();
        let store = fallback(&client);
        let tree = store
            .search_data_properties(&iri("A"), Some("na"), Some("en"), true, None)
            .await
            .expect("search");

        let received = client.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind(), QueryKind::Properties);
        assert!(received[0].text().contains("owl:DatatypeProperty }"));
        assert!(received[0].text().contains("\"na\", \"i\""));
        assert_eq!(tree.nodes().len(), 1);
        assert_eq!(tree.nodes()[0].model.domain(), Some(&iri("A")));
    }

    #[tokio::test]
    async fn invalid_pattern_is_rejected_before_querying() {
        let client = example_ontology();
        let store = fallback(&client);
        let err = store
            .search_sub_classes(&iri("A"), Some("(unclosed"), None, false)
            .await
            .expect_err("invalid pattern");
        assert!(matches!(err, Error::InvalidPattern { .. }));
        assert!(client.received().is_empty());
    }

    #[tokio::test]
    async fn class_existence_is_one_ancestry_query() {
        let client = example_ontology().with_rows(
            QueryKind::ClassAncestry,
            vec![QueryRow::new().with("uri", iri("C").as_str())],
        );
        let store = fallback(&client);
        assert!(store
            .class_exist(&iri("C"), Some(&iri("A")))
            .await
            .expect("exists"));
        let received = client.received();
        assert_eq!(received.len(), 1);
        assert!(received[0].text().contains("rdfs:subClassOf+"));
    }

    #[tokio::test]
    async fn unknown_class_is_reported() {
        let client = ScriptedClient::default();
        let store = fallback(&client);
        let err = store
            .get_class_model(&iri("Missing"), None, None)
            .await
            .expect_err("unknown class");
        assert!(matches!(err, Error::UnknownIdentifier { iri: id, .. } if id == iri("Missing")));
    }

    #[tokio::test]
    async fn class_model_without_ancestor_queries_its_own_declarations() {
        let client = example_ontology();
        client.set_rows(
            QueryKind::Classes,
            vec![QueryRow::new().with("uri", iri("B").as_str())],
        );
        let store = fallback(&client);
        let model = store
            .get_class_model(&iri("B"), None, Some("en"))
            .await
            .expect("class");
        assert_eq!(model.id(), &iri("B"));
        assert!(model.object_properties().contains_key(&iri("partOf")));

        let received = client.received();
        let kinds: Vec<QueryKind> = received.iter().map(|query| query.kind()).collect();
        assert_eq!(
            kinds,
            vec![QueryKind::Classes, QueryKind::Properties, QueryKind::Restrictions]
        );
        assert!(received[1]
            .text()
            .contains(&format!("FILTER(?domain = {})", iri("B").to_sparql())));
    }

    fn with_ancestry(client: ScriptedClient, class: &str) -> ScriptedClient {
        client.with_rows(
            QueryKind::ClassAncestry,
            vec![QueryRow::new().with("uri", iri(class).as_str())],
        )
    }

    #[tokio::test]
    async fn nearest_ancestor_declaration_wins() {
        let client = with_ancestry(layered_ontology(), "Leaf");
        let store = fallback(&client);
        let leaf = store
            .get_class_model(&iri("Leaf"), Some(&iri("Root")), None)
            .await
            .expect("Leaf from Root");

        let restriction = &leaf.restrictions()[&iri("p1")];
        assert_eq!(restriction.domain(), &iri("Mid"));
        assert_eq!(restriction.min_cardinality(), Some(2));
        assert!(leaf.datatype_properties().contains_key(&iri("p2")));

        let kinds: Vec<QueryKind> = client.received().iter().map(|query| query.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                QueryKind::Classes,
                QueryKind::ClassAncestry,
                QueryKind::Classes,
                QueryKind::Properties,
                QueryKind::Restrictions,
            ]
        );
        let chain = &client.received()[2];
        assert!(chain
            .text()
            .contains(&format!("{} rdfs:subClassOf* ?uri .", iri("Leaf").to_sparql())));
    }

    #[tokio::test]
    async fn linkable_data_properties_skip_restricted_ones() {
        let client = with_ancestry(layered_ontology(), "Leaf");
        let store = fallback(&client);

        let own: Vec<_> = store
            .get_linkable_data_properties(&iri("Leaf"), None, Some("en"))
            .await
            .expect("linkable")
            .iter()
            .map(|property| property.id().clone())
            .collect();
        assert_eq!(own, vec![iri("p4")]);

        let inherited: Vec<_> = store
            .get_linkable_data_properties(&iri("Leaf"), Some(&iri("Root")), None)
            .await
            .expect("linkable")
            .iter()
            .map(|property| property.id().clone())
            .collect();
        assert_eq!(inherited, vec![iri("p2"), iri("p4")]);
    }

    #[tokio::test]
    async fn linkable_object_properties_come_from_the_ancestor() {
        let client = with_ancestry(example_ontology(), "C");
        let store = fallback(&client);
        let linkable = store
            .get_linkable_object_properties(&iri("C"), Some(&iri("B")), None)
            .await
            .expect("linkable");
        assert_eq!(linkable.len(), 1);
        assert_eq!(linkable[0].id(), &iri("partOf"));
        assert_eq!(linkable[0].range(), Some(&iri("A")));
    }

    #[tokio::test]
    async fn property_outside_its_domain_is_rejected() {
        let client = example_ontology();
        let store = fallback(&client);
        let err = store
            .get_property(&iri("partOf"), Some(&iri("A")), None)
            .await
            .expect_err("partOf is declared on B");
        assert!(matches!(err, Error::DomainMismatch { property, .. } if property == iri("partOf")));

        let client = with_ancestry(example_ontology(), "C");
        let store = fallback(&client);
        let name = store
            .get_data_property(&iri("name"), Some(&iri("C")), Some("en"))
            .await
            .expect("C descends from A");
        assert_eq!(name.info().label().value(), Some("name"));
    }

    #[tokio::test]
    async fn object_property_search_is_scoped_to_its_kind() {
        let client = example_ontology();
        let store = fallback(&client);
        let tree = store
            .search_object_properties(&iri("B"), None, None, false, None)
            .await
            .expect("search");

        let received = client.received();
        assert_eq!(received.len(), 1);
        assert!(received[0].text().contains("owl:ObjectProperty }"));
        assert!(received[0]
            .text()
            .contains(&format!("FILTER(?domain = {})", iri("B").to_sparql())));
        assert_eq!(tree.nodes().len(), 1);
        assert_eq!(tree.nodes()[0].model.id(), &iri("partOf"));
    }
}
