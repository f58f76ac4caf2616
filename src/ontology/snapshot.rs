//! One immutable generation of the loaded ontology: the identifier registry and
//! the hierarchy graph built over it.
//!
//! A snapshot is only mutated while it is being built. Stores publish finished
//! snapshots behind an `Arc` and never touch them again.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::entities::{
    ClassModel, InheritedMembers, OwlRestrictionModel, PropertyDefinition, PropertyModel,
    VocabularyModel,
};
use super::hierarchy::HierarchyGraph;
use super::repositories::PropertyFilter;
use super::value_objects::{Iri, PrefixMap};
use crate::errors::IdentifierKind;
use crate::{Error, Result};

/// Identifier to model map; the sole owner of every registered model.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    classes: HashMap<Iri, ClassModel>,
    properties: HashMap<Iri, PropertyModel>,
}

impl Registry {
    /// Returns `true` when `id` names a registered class or property.
    #[must_use]
    pub fn contains(&self, id: &Iri) -> bool {
        self.classes.contains_key(id) || self.properties.contains_key(id)
    }

    /// Registered class `id`, if any.
    #[must_use]
    pub fn class(&self, id: &Iri) -> Option<&ClassModel> {
        self.classes.get(id)
    }

    /// Registered property `id`, if any.
    #[must_use]
    pub fn property(&self, id: &Iri) -> Option<&PropertyModel> {
        self.properties.get(id)
    }

    /// Every registered class, in no particular order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassModel> {
        self.classes.values()
    }

    /// Every registered property, in no particular order.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyModel> {
        self.properties.values()
    }

    /// Number of registered classes and properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len() + self.properties.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Models that can be inserted into a [`Registry`] through [`OntologySnapshot::add_all`].
pub trait Registered: VocabularyModel {
    /// Registry table holding models of this kind.
    fn table(registry: &Registry) -> &HashMap<Iri, Self>;

    fn table_mut(registry: &mut Registry) -> &mut HashMap<Iri, Self>;

    /// Rewrites identifiers the model refers to into canonical form.
    fn canonicalize_references(&mut self, _prefixes: &PrefixMap) {}

    /// Attaches the freshly registered models `ids` to the models they reference.
    fn link(_snapshot: &mut OntologySnapshot, _ids: &[Iri]) -> Result<()> {
        Ok(())
    }
}

impl Registered for ClassModel {
    fn table(registry: &Registry) -> &HashMap<Iri, Self> {
        &registry.classes
    }

    fn table_mut(registry: &mut Registry) -> &mut HashMap<Iri, Self> {
        &mut registry.classes
    }
}

impl Registered for PropertyModel {
    fn table(registry: &Registry) -> &HashMap<Iri, Self> {
        &registry.properties
    }

    fn table_mut(registry: &mut Registry) -> &mut HashMap<Iri, Self> {
        &mut registry.properties
    }

    fn canonicalize_references(&mut self, prefixes: &PrefixMap) {
        let domain = self.domain().map(|domain| prefixes.canonical(domain));
        let range = self.range().map(|range| prefixes.canonical(range));
        self.set_domain(domain);
        self.set_range(range);
    }

    fn link(snapshot: &mut OntologySnapshot, ids: &[Iri]) -> Result<()> {
        snapshot.link_properties(ids)
    }
}

/// Counts describing a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    pub classes: usize,
    pub datatype_properties: usize,
    pub object_properties: usize,
    pub restrictions: usize,
    pub vertices: usize,
    pub edges: usize,
}

/// Registry and hierarchy graph of one loaded ontology.
#[derive(Clone, Debug, Default)]
pub struct OntologySnapshot {
    registry: Registry,
    graph: HierarchyGraph,
}

impl OntologySnapshot {
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn graph(&self) -> &HierarchyGraph {
        &self.graph
    }

    /// Inserts a batch of models, linking each to its parents.
    ///
    /// Parents may be other members of the batch or already registered models of the
    /// same kind. Every check runs before the first mutation, so a rejected batch
    /// leaves the snapshot unchanged.
    ///
    /// # Errors
    /// * [`Error::DuplicateIdentifier`] when an identifier repeats inside the batch or
    ///   is already registered.
    /// * [`Error::UnknownIdentifier`] when a parent resolves neither in the batch nor
    ///   in the registry.
    pub fn add_all<M: Registered>(&mut self, models: Vec<M>, prefixes: &PrefixMap) -> Result<()> {
        let mut batch: Vec<M> = Vec::with_capacity(models.len());
        let mut positions: HashMap<Iri, usize> = HashMap::with_capacity(models.len());
        for mut model in models {
            let id = prefixes.canonical(model.id());
            if positions.contains_key(&id) || self.registry.contains(&id) {
                return Err(Error::DuplicateIdentifier { iri: id });
            }
            positions.insert(id.clone(), batch.len());
            model.info_mut().set_id(id);
            model.canonicalize_references(prefixes);
            batch.push(model);
        }

        let mut resolved: Vec<Vec<Iri>> = Vec::with_capacity(batch.len());
        for model in &batch {
            let mut parents: Vec<Iri> = Vec::new();
            for parent in model.info().parents() {
                let parent = prefixes.canonical(parent);
                if &parent == model.id() || parents.contains(&parent) {
                    continue;
                }
                if !positions.contains_key(&parent) && !M::table(&self.registry).contains_key(&parent)
                {
                    return Err(Error::unknown(IdentifierKind::Parent, &parent));
                }
                parents.push(parent);
            }
            resolved.push(parents);
        }

        for (index, parents) in resolved.into_iter().enumerate() {
            let child = batch[index].id().clone();
            self.graph.add_vertex(&child);
            for parent in &parents {
                self.graph.add_edge(parent, &child);
                match positions.get(parent) {
                    Some(&position) => {
                        batch[position].info_mut().add_child(child.clone());
                    }
                    None => {
                        if let Some(model) = M::table_mut(&mut self.registry).get_mut(parent) {
                            model.info_mut().add_child(child.clone());
                        }
                    }
                }
            }
            batch[index].info_mut().set_parents(parents);
        }

        let table = M::table_mut(&mut self.registry);
        for model in batch {
            table.insert(model.id().clone(), model);
        }
        Ok(())
    }

    /// Registers the given properties into their domain classes.
    ///
    /// # Errors
    /// [`Error::UnknownIdentifier`] when a domain, or the range of an object
    /// property, is not a registered class. Nothing is linked in that case.
    pub fn link_properties(&mut self, ids: &[Iri]) -> Result<()> {
        let mut links: Vec<(Iri, PropertyModel)> = Vec::new();
        for id in ids {
            let property = self
                .registry
                .properties
                .get(id)
                .ok_or_else(|| Error::unknown(IdentifierKind::Property, id))?;
            if let PropertyModel::Object(object) = property {
                if let Some(range) = object.range() {
                    if !self.registry.classes.contains_key(range) {
                        return Err(Error::unknown(IdentifierKind::Range, range));
                    }
                }
            }
            if let Some(domain) = property.domain() {
                if !self.registry.classes.contains_key(domain) {
                    return Err(Error::unknown(IdentifierKind::Domain, domain));
                }
                links.push((domain.clone(), property.clone()));
            }
        }

        for (domain, property) in links {
            if let Some(class) = self.registry.classes.get_mut(&domain) {
                class.add_property(property);
            }
        }
        Ok(())
    }

    /// Registers restrictions into their domain classes, keyed by constrained property.
    ///
    /// # Errors
    /// [`Error::UnknownIdentifier`] when a domain class or constrained property is
    /// not registered. Nothing is linked in that case.
    pub fn add_restrictions(
        &mut self,
        restrictions: Vec<OwlRestrictionModel>,
        prefixes: &PrefixMap,
    ) -> Result<()> {
        let mut resolved = Vec::with_capacity(restrictions.len());
        for mut restriction in restrictions {
            let domain = prefixes.canonical(restriction.domain());
            let on_property = prefixes.canonical(restriction.on_property());
            if !self.registry.classes.contains_key(&domain) {
                return Err(Error::unknown(IdentifierKind::Domain, &domain));
            }
            if !self.registry.properties.contains_key(&on_property) {
                return Err(Error::unknown(IdentifierKind::Property, &on_property));
            }
            restriction.canonicalize(on_property, domain);
            resolved.push(restriction);
        }

        for restriction in resolved {
            if let Some(class) = self.registry.classes.get_mut(restriction.domain()) {
                class.add_restriction(restriction);
            }
        }
        Ok(())
    }

    /// Registered class `id`.
    ///
    /// # Errors
    /// [`Error::UnknownIdentifier`] when `id` is not a registered class.
    pub fn class(&self, id: &Iri) -> Result<&ClassModel> {
        self.registry
            .class(id)
            .ok_or_else(|| Error::unknown(IdentifierKind::Class, id))
    }

    /// Registered property `id`.
    ///
    /// # Errors
    /// [`Error::UnknownIdentifier`] when `id` is not a registered property.
    pub fn property(&self, id: &Iri) -> Result<&PropertyModel> {
        self.registry
            .property(id)
            .ok_or_else(|| Error::unknown(IdentifierKind::Property, id))
    }

    /// Identifiers on some path from `ancestor` down to `class`, in inheritance order.
    #[must_use]
    pub fn ancestor_path(&self, class: &Iri, ancestor: &Iri, max_length: usize) -> Vec<Iri> {
        self.graph.ancestor_path(class, ancestor, max_length)
    }

    #[must_use]
    pub fn class_exist(&self, class: &Iri, ancestor: Option<&Iri>, max_length: usize) -> bool {
        if self.registry.class(class).is_none() {
            return false;
        }
        match ancestor {
            None => true,
            Some(ancestor) if ancestor == class => true,
            Some(ancestor) if self.registry.class(ancestor).is_none() => false,
            Some(ancestor) => !self.ancestor_path(class, ancestor, max_length).is_empty(),
        }
    }

    /// Copy of `class` carrying the `members` it inherits from every class up to `ancestor`.
    ///
    /// Ancestors are applied farthest first and the class's own declarations last, so
    /// the most specific declaration of a property or restriction wins. The registry
    /// is never modified.
    ///
    /// # Errors
    /// * [`Error::UnknownIdentifier`] when `class` or `ancestor` is not registered.
    /// * [`Error::NotAnAncestor`] when `ancestor` is not a superclass of `class`.
    pub fn compose_class(
        &self,
        class: &Iri,
        ancestor: Option<&Iri>,
        members: InheritedMembers,
        max_length: usize,
    ) -> Result<ClassModel> {
        let base = self.class(class)?;
        let mut composed = base.clone();
        if let Some(ancestor) = ancestor.filter(|ancestor| *ancestor != class) {
            if self.registry.class(ancestor).is_none() {
                return Err(Error::unknown(IdentifierKind::Ancestor, ancestor));
            }
            let path = self.ancestor_path(class, ancestor, max_length);
            if path.is_empty() {
                return Err(Error::NotAnAncestor {
                    class: class.clone(),
                    ancestor: ancestor.clone(),
                });
            }
            for id in &path {
                if let Some(model) = self.registry.class(id) {
                    composed.absorb(model, members);
                }
            }
            composed.absorb(base, members);
        }
        composed.retain(members);
        Ok(composed)
    }

    /// `class` followed by every class reached through the children relation.
    ///
    /// # Errors
    /// [`Error::UnknownIdentifier`] when `class` is not registered.
    pub fn descendants(&self, class: &Iri, include_root: bool) -> Result<Vec<&ClassModel>> {
        let root = self.class(class)?;
        let mut visited: BTreeSet<&Iri> = BTreeSet::from([root.id()]);
        let mut stack = vec![root];
        let mut found = Vec::new();
        while let Some(current) = stack.pop() {
            if include_root || current.id() != class {
                found.push(current);
            }
            for child in current.info().children() {
                if visited.insert(child) {
                    if let Some(model) = self.registry.class(child) {
                        stack.push(model);
                    }
                }
            }
        }
        Ok(found)
    }

    /// Properties declared on `domain`, and on its descendants when `include_sub_classes`,
    /// that pass `filter`.
    ///
    /// `select` picks the property map of one class, which also fixes the variant.
    ///
    /// # Errors
    /// [`Error::UnknownIdentifier`] when `domain` is not registered.
    pub fn collect_properties<P: PropertyDefinition>(
        &self,
        domain: &Iri,
        include_sub_classes: bool,
        select: fn(&ClassModel) -> &BTreeMap<Iri, P>,
        filter: Option<&PropertyFilter<P>>,
    ) -> Result<Vec<P>> {
        let classes = if include_sub_classes {
            self.descendants(domain, true)?
        } else {
            vec![self.class(domain)?]
        };

        let mut found: BTreeMap<Iri, P> = BTreeMap::new();
        for class in classes {
            for (id, property) in select(class) {
                if filter.map_or(true, |filter| filter(property, class)) {
                    found.entry(id.clone()).or_insert_with(|| property.clone());
                }
            }
        }
        Ok(found.into_values().collect())
    }

    #[must_use]
    pub fn stats(&self) -> SnapshotStats {
        let (datatype_properties, object_properties) = self.registry.properties().fold(
            (0, 0),
            |(data, object), property| match property {
                PropertyModel::Datatype(_) => (data + 1, object),
                PropertyModel::Object(_) => (data, object + 1),
            },
        );
        SnapshotStats {
            classes: self.registry.classes.len(),
            datatype_properties,
            object_properties,
            restrictions: self
                .registry
                .classes()
                .map(|class| class.restrictions().len())
                .sum(),
            vertices: self.graph.vertex_count(),
            edges: self.graph.edge_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OntologySnapshot;
    use crate::ontology::entities::{
        ClassModel, DatatypePropertyModel, InheritedMembers, OwlRestrictionModel, PropertyDefinition, PropertyKind,
        PropertyModel, VocabularyModel, VocabularyRoots,
    };
    use crate::ontology::hierarchy::MAX_GRAPH_PATH_LENGTH;
    use crate::ontology::repositories::PropertyFilter;
    use crate::ontology::value_objects::{Iri, PrefixMap};
    use crate::tests_cfg::iri;
    use crate::Error;

    fn class(roots: &VocabularyRoots, name: &str, parents: &[&str]) -> ClassModel {
        let mut class = roots.class(iri(name));
        for parent in parents {
            class.info_mut().add_parent(iri(parent));
        }
        class
    }

    fn data_property(roots: &VocabularyRoots, name: &str, domain: &str) -> PropertyModel {
        let mut property = roots.property(iri(name), PropertyKind::Data);
        property.set_domain(Some(iri(domain)));
        property.set_range(Some(Iri::new("xsd:string").expect("valid iri")));
        property
    }

    fn chain() -> OntologySnapshot {
        let roots = VocabularyRoots::default();
        let mut snapshot = OntologySnapshot::default();
        snapshot
            .add_all(
                vec![
                    class(&roots, "Leaf", &["Mid"]),
                    class(&roots, "Mid", &["Root"]),
                    class(&roots, "Root", &[]),
                ],
                &PrefixMap::default(),
            )
            .expect("classes");
        snapshot
    }

    #[test]
    fn batch_members_may_reference_each_other_in_any_order() {
        let snapshot = chain();
        for model in snapshot.registry().classes() {
            for parent in model.info().parents() {
                let parent = snapshot.class(parent).expect("parent registered");
                assert!(parent.info().children().contains(model.id()));
            }
            for child in model.info().children() {
                let child = snapshot.class(child).expect("child registered");
                assert!(child.info().parents().contains(model.id()));
            }
        }
        assert_eq!(snapshot.graph().edge_count(), 2);
    }

    #[test]
    fn duplicates_leave_the_registry_untouched() {
        let roots = VocabularyRoots::default();
        let mut snapshot = chain();

        let err = snapshot
            .add_all(
                vec![class(&roots, "Other", &["Root"]), class(&roots, "Other", &[])],
                &PrefixMap::default(),
            )
            .expect_err("duplicate in batch");
        assert!(matches!(err, Error::DuplicateIdentifier { iri: id } if id == iri("Other")));

        let err = snapshot
            .add_all(
                vec![class(&roots, "Extra", &["Root"]), class(&roots, "Mid", &[])],
                &PrefixMap::default(),
            )
            .expect_err("duplicate in registry");
        assert!(matches!(err, Error::DuplicateIdentifier { .. }));

        assert_eq!(snapshot.registry().len(), 3);
        assert!(snapshot.class(&iri("Root")).expect("root").info().children().len() == 1);
        assert_eq!(snapshot.graph().vertex_count(), 3);
    }

    #[test]
    fn unknown_parent_is_rejected_before_linking() {
        let roots = VocabularyRoots::default();
        let mut snapshot = chain();
        let err = snapshot
            .add_all(
                vec![
                    class(&roots, "Good", &["Root"]),
                    class(&roots, "Orphan", &["Missing"]),
                ],
                &PrefixMap::default(),
            )
            .expect_err("unknown parent");
        assert!(matches!(err, Error::UnknownIdentifier { iri: id, .. } if id == iri("Missing")));
        assert!(snapshot.class(&iri("Good")).is_err());
        assert_eq!(snapshot.graph().edge_count(), 2);
    }

    #[test]
    fn prefixed_and_absolute_identifiers_are_the_same_key() {
        let roots = VocabularyRoots::default();
        let prefixes = PrefixMap::with_prefixes(
            [("ex".to_string(), "https://example.org/onto#".to_string())]
                .iter()
                .map(|(prefix, namespace)| (prefix, namespace)),
        );
        let mut snapshot = OntologySnapshot::default();
        let mut child = roots.class(Iri::new("ex:Child").expect("valid iri"));
        child.info_mut().add_parent(iri("Parent"));
        snapshot
            .add_all(vec![roots.class(Iri::new("ex:Parent").expect("valid iri")), child], &prefixes)
            .expect("classes");

        assert!(snapshot.class(&iri("Child")).is_ok());
        assert!(snapshot.graph().contains_edge(&iri("Parent"), &iri("Child")));

        let err = snapshot
            .add_all(vec![roots.class(iri("Parent"))], &prefixes)
            .expect_err("same resource");
        assert!(matches!(err, Error::DuplicateIdentifier { .. }));
    }

    #[test]
    fn properties_and_restrictions_land_on_their_domain() {
        let roots = VocabularyRoots::default();
        let mut snapshot = chain();
        let prefixes = PrefixMap::default();
        snapshot
            .add_all(
                vec![
                    data_property(&roots, "p1", "Mid"),
                    data_property(&roots, "p2", "Root"),
                ],
                &prefixes,
            )
            .expect("properties");
        snapshot
            .link_properties(&[iri("p1"), iri("p2")])
            .expect("linked");
        snapshot
            .add_restrictions(
                vec![OwlRestrictionModel::new(
                    "_:r",
                    iri("p1"),
                    iri("Mid"),
                    &roots.restriction,
                )],
                &prefixes,
            )
            .expect("restrictions");

        let mid = snapshot.class(&iri("Mid")).expect("mid");
        assert!(mid.datatype_properties().contains_key(&iri("p1")));
        assert!(mid.restrictions().contains_key(&iri("p1")));
        let p1 = snapshot.property(&iri("p1")).expect("p1");
        assert_eq!(
            p1.range().map(Iri::as_str),
            Some("http://www.w3.org/2001/XMLSchema#string")
        );

        let stats = snapshot.stats();
        assert_eq!(stats.classes, 3);
        assert_eq!(stats.datatype_properties, 2);
        assert_eq!(stats.restrictions, 1);
    }

    #[test]
    fn restriction_on_unknown_property_fails() {
        let roots = VocabularyRoots::default();
        let mut snapshot = chain();
        let err = snapshot
            .add_restrictions(
                vec![OwlRestrictionModel::new(
                    "_:r",
                    iri("missing"),
                    iri("Mid"),
                    &roots.restriction,
                )],
                &PrefixMap::default(),
            )
            .expect_err("unknown property");
        assert!(matches!(err, Error::UnknownIdentifier { .. }));
    }

    #[test]
    fn composition_never_mutates_the_registry() {
        let roots = VocabularyRoots::default();
        let mut snapshot = chain();
        snapshot
            .add_all(vec![data_property(&roots, "p2", "Root")], &PrefixMap::default())
            .expect("property");
        snapshot.link_properties(&[iri("p2")]).expect("linked");

        let composed = snapshot
            .compose_class(
                &iri("Leaf"),
                Some(&iri("Root")),
                InheritedMembers::ALL,
                MAX_GRAPH_PATH_LENGTH,
            )
            .expect("composed");
        assert!(composed.datatype_properties().contains_key(&iri("p2")));
        assert!(snapshot
            .class(&iri("Leaf"))
            .expect("leaf")
            .datatype_properties()
            .is_empty());
    }

    #[test]
    fn composition_rejects_non_ancestors() {
        let snapshot = chain();
        let err = snapshot
            .compose_class(
                &iri("Root"),
                Some(&iri("Leaf")),
                InheritedMembers::ALL,
                MAX_GRAPH_PATH_LENGTH,
            )
            .expect_err("not an ancestor");
        assert!(matches!(err, Error::NotAnAncestor { .. }));
    }

    #[test]
    fn descendants_walk_the_children_relation() {
        let snapshot = chain();
        let ids: Vec<&Iri> = snapshot
            .descendants(&iri("Root"), false)
            .expect("descendants")
            .into_iter()
            .map(|class| class.id())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&&iri("Root")));
    }

    #[test]
    fn property_collection_applies_the_filter_per_owning_class() {
        let roots = VocabularyRoots::default();
        let mut snapshot = chain();
        snapshot
            .add_all(
                vec![
                    data_property(&roots, "p1", "Mid"),
                    data_property(&roots, "p2", "Root"),
                ],
                &PrefixMap::default(),
            )
            .expect("properties");
        snapshot
            .link_properties(&[iri("p1"), iri("p2")])
            .expect("linked");

        let only_mid: &PropertyFilter<DatatypePropertyModel> =
            &|_, class| class.id() == &iri("Mid");
        let found = snapshot
            .collect_properties(
                &iri("Root"),
                true,
                ClassModel::datatype_properties,
                Some(only_mid),
            )
            .expect("collected");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), &iri("p1"));
        assert_eq!(found[0].domain(), Some(&iri("Mid")));
    }
}
