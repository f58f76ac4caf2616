use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::value_objects::{Iri, LangString};

/// Fields shared by every vocabulary model: classes, properties and restrictions.
///
/// Parent and child links are identifiers resolved through the owning registry,
/// never owning references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VocabularyInfo {
    id: Iri,
    rdf_type: Iri,
    type_label: LangString,
    label: LangString,
    comment: LangString,
    parents: Vec<Iri>,
    primary_parent: Option<Iri>,
    children: BTreeSet<Iri>,
}

impl VocabularyInfo {
    /// Creates the shared fields for a model of the given `rdf:type`.
    #[must_use]
    pub fn new(id: Iri, root: &RootModel) -> Self {
        Self {
            id,
            rdf_type: root.iri.clone(),
            type_label: root.type_label.clone(),
            label: LangString::default(),
            comment: LangString::default(),
            parents: Vec::new(),
            primary_parent: None,
            children: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &Iri {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: Iri) {
        self.id = id;
    }

    #[must_use]
    pub fn rdf_type(&self) -> &Iri {
        &self.rdf_type
    }

    #[must_use]
    pub fn type_label(&self) -> &LangString {
        &self.type_label
    }

    #[must_use]
    pub fn label(&self) -> &LangString {
        &self.label
    }

    pub fn label_mut(&mut self) -> &mut LangString {
        &mut self.label
    }

    #[must_use]
    pub fn comment(&self) -> &LangString {
        &self.comment
    }

    pub fn comment_mut(&mut self) -> &mut LangString {
        &mut self.comment
    }

    /// Returns the parent identifiers in declaration order.
    #[must_use]
    pub fn parents(&self) -> &[Iri] {
        &self.parents
    }

    /// Returns the designated primary parent, the first resolved one.
    #[must_use]
    pub fn primary_parent(&self) -> Option<&Iri> {
        self.primary_parent.as_ref()
    }

    /// Returns the identifiers of the direct children.
    #[must_use]
    pub fn children(&self) -> &BTreeSet<Iri> {
        &self.children
    }

    /// Adds a parent reference. Repeated references are ignored.
    pub fn add_parent(&mut self, parent: Iri) -> bool {
        if self.parents.contains(&parent) {
            return false;
        }
        if self.primary_parent.is_none() {
            self.primary_parent = Some(parent.clone());
        }
        self.parents.push(parent);
        true
    }

    /// Replaces the parent set with already resolved identifiers.
    pub(crate) fn set_parents(&mut self, parents: Vec<Iri>) {
        self.primary_parent = parents.first().cloned();
        self.parents = parents;
    }

    pub(crate) fn add_child(&mut self, child: Iri) -> bool {
        self.children.insert(child)
    }

    /// Projects the `lang` translations onto the default label, comment and type label.
    pub fn handle_lang(&mut self, lang: &str) {
        self.label.select(lang);
        self.comment.select(lang);
        self.type_label.select(lang);
    }
}

/// Common accessors over the vocabulary model set.
pub trait VocabularyModel: Clone {
    fn info(&self) -> &VocabularyInfo;

    fn info_mut(&mut self) -> &mut VocabularyInfo;

    fn id(&self) -> &Iri {
        self.info().id()
    }

    /// Applies language selection to the model and everything it carries.
    fn handle_lang(&mut self, lang: &str) {
        self.info_mut().handle_lang(lang);
    }
}

/// Classifies the type of values a property can hold.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PropertyKind {
    /// Object properties link individuals.
    Object,
    /// Data properties capture literal values.
    Data,
}

/// Domain and range accessors shared by both property variants.
pub trait PropertyDefinition: VocabularyModel {
    const KIND: PropertyKind;

    fn domain(&self) -> Option<&Iri>;

    fn set_domain(&mut self, domain: Option<Iri>);

    /// Literal datatype for data properties, class for object properties.
    fn range(&self) -> Option<&Iri>;

    fn set_range(&mut self, range: Option<Iri>);
}

macro_rules! property_model {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Serialize)]
        pub struct $name {
            #[serde(flatten)]
            info: VocabularyInfo,
            domain: Option<Iri>,
            range: Option<Iri>,
        }

        impl $name {
            #[must_use]
            pub fn new(info: VocabularyInfo) -> Self {
                Self {
                    info,
                    domain: None,
                    range: None,
                }
            }
        }

        impl VocabularyModel for $name {
            fn info(&self) -> &VocabularyInfo {
                &self.info
            }

            fn info_mut(&mut self) -> &mut VocabularyInfo {
                &mut self.info
            }
        }

        impl PropertyDefinition for $name {
            const KIND: PropertyKind = $kind;

            fn domain(&self) -> Option<&Iri> {
                self.domain.as_ref()
            }

            fn set_domain(&mut self, domain: Option<Iri>) {
                self.domain = domain;
            }

            fn range(&self) -> Option<&Iri> {
                self.range.as_ref()
            }

            fn set_range(&mut self, range: Option<Iri>) {
                self.range = range;
            }
        }
    };
}

property_model!(
    /// `owl:DatatypeProperty` whose range is a literal datatype.
    DatatypePropertyModel,
    PropertyKind::Data
);

property_model!(
    /// `owl:ObjectProperty` whose range is a class.
    ObjectPropertyModel,
    PropertyKind::Object
);

/// Closed set of property variants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyModel {
    Datatype(DatatypePropertyModel),
    Object(ObjectPropertyModel),
}

impl PropertyModel {
    #[must_use]
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Datatype(_) => PropertyKind::Data,
            Self::Object(_) => PropertyKind::Object,
        }
    }

    #[must_use]
    pub fn domain(&self) -> Option<&Iri> {
        match self {
            Self::Datatype(property) => property.domain(),
            Self::Object(property) => property.domain(),
        }
    }

    #[must_use]
    pub fn range(&self) -> Option<&Iri> {
        match self {
            Self::Datatype(property) => property.range(),
            Self::Object(property) => property.range(),
        }
    }

    pub fn set_domain(&mut self, domain: Option<Iri>) {
        match self {
            Self::Datatype(property) => property.set_domain(domain),
            Self::Object(property) => property.set_domain(domain),
        }
    }

    pub fn set_range(&mut self, range: Option<Iri>) {
        match self {
            Self::Datatype(property) => property.set_range(range),
            Self::Object(property) => property.set_range(range),
        }
    }

    #[must_use]
    pub fn into_datatype(self) -> Option<DatatypePropertyModel> {
        match self {
            Self::Datatype(property) => Some(property),
            Self::Object(_) => None,
        }
    }

    #[must_use]
    pub fn into_object(self) -> Option<ObjectPropertyModel> {
        match self {
            Self::Object(property) => Some(property),
            Self::Datatype(_) => None,
        }
    }
}

impl VocabularyModel for PropertyModel {
    fn info(&self) -> &VocabularyInfo {
        match self {
            Self::Datatype(property) => property.info(),
            Self::Object(property) => property.info(),
        }
    }

    fn info_mut(&mut self) -> &mut VocabularyInfo {
        match self {
            Self::Datatype(property) => property.info_mut(),
            Self::Object(property) => property.info_mut(),
        }
    }
}

/// `owl:Restriction` attached to a (class, property) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OwlRestrictionModel {
    node: String,
    rdf_type: Iri,
    type_label: LangString,
    on_property: Iri,
    domain: Iri,
    on_data_range: Option<Iri>,
    on_class: Option<Iri>,
    min_cardinality: Option<u32>,
    max_cardinality: Option<u32>,
    cardinality: Option<u32>,
    some_values_from: Option<Iri>,
}

impl OwlRestrictionModel {
    /// Creates a restriction on `on_property` declared for the `domain` class.
    ///
    /// `node` is the restriction's own identifier, usually a blank node label.
    #[must_use]
    pub fn new(node: impl Into<String>, on_property: Iri, domain: Iri, root: &RootModel) -> Self {
        Self {
            node: node.into(),
            rdf_type: root.iri.clone(),
            type_label: root.type_label.clone(),
            on_property,
            domain,
            on_data_range: None,
            on_class: None,
            min_cardinality: None,
            max_cardinality: None,
            cardinality: None,
            some_values_from: None,
        }
    }

    #[must_use]
    pub fn with_on_data_range(mut self, range: Iri) -> Self {
        self.on_data_range = Some(range);
        self
    }

    #[must_use]
    pub fn with_on_class(mut self, class: Iri) -> Self {
        self.on_class = Some(class);
        self
    }

    #[must_use]
    pub fn with_min_cardinality(mut self, value: u32) -> Self {
        self.min_cardinality = Some(value);
        self
    }

    #[must_use]
    pub fn with_max_cardinality(mut self, value: u32) -> Self {
        self.max_cardinality = Some(value);
        self
    }

    #[must_use]
    pub fn with_cardinality(mut self, value: u32) -> Self {
        self.cardinality = Some(value);
        self
    }

    #[must_use]
    pub fn with_some_values_from(mut self, value: Iri) -> Self {
        self.some_values_from = Some(value);
        self
    }

    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    #[must_use]
    pub fn rdf_type(&self) -> &Iri {
        &self.rdf_type
    }

    #[must_use]
    pub fn type_label(&self) -> &LangString {
        &self.type_label
    }

    #[must_use]
    pub fn on_property(&self) -> &Iri {
        &self.on_property
    }

    #[must_use]
    pub fn domain(&self) -> &Iri {
        &self.domain
    }

    pub(crate) fn canonicalize(&mut self, on_property: Iri, domain: Iri) {
        self.on_property = on_property;
        self.domain = domain;
    }

    #[must_use]
    pub fn on_data_range(&self) -> Option<&Iri> {
        self.on_data_range.as_ref()
    }

    #[must_use]
    pub fn on_class(&self) -> Option<&Iri> {
        self.on_class.as_ref()
    }

    #[must_use]
    pub fn min_cardinality(&self) -> Option<u32> {
        self.min_cardinality
    }

    #[must_use]
    pub fn max_cardinality(&self) -> Option<u32> {
        self.max_cardinality
    }

    #[must_use]
    pub fn cardinality(&self) -> Option<u32> {
        self.cardinality
    }

    #[must_use]
    pub fn some_values_from(&self) -> Option<&Iri> {
        self.some_values_from.as_ref()
    }

    /// Returns `true` when a literal range, class range or existential class is constrained.
    #[must_use]
    pub fn has_range(&self) -> bool {
        self.on_data_range.is_some() || self.on_class.is_some() || self.some_values_from.is_some()
    }

    /// Folds a second restriction on the same property into this one.
    ///
    /// Values carried by `other` replace the ones held here; absent values are kept.
    pub fn merge(&mut self, other: &Self) {
        self.on_data_range = other.on_data_range.clone().or(self.on_data_range.take());
        self.on_class = other.on_class.clone().or(self.on_class.take());
        self.min_cardinality = other.min_cardinality.or(self.min_cardinality);
        self.max_cardinality = other.max_cardinality.or(self.max_cardinality);
        self.cardinality = other.cardinality.or(self.cardinality);
        self.some_values_from = other
            .some_values_from
            .clone()
            .or(self.some_values_from.take());
    }

    pub fn handle_lang(&mut self, lang: &str) {
        self.type_label.select(lang);
    }
}

/// Which members a composed class takes over from its ancestors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct InheritedMembers {
    pub datatype_properties: bool,
    pub object_properties: bool,
    pub restrictions: bool,
}

impl InheritedMembers {
    pub const ALL: Self = Self {
        datatype_properties: true,
        object_properties: true,
        restrictions: true,
    };

    pub const DATATYPE: Self = Self {
        datatype_properties: true,
        object_properties: false,
        restrictions: true,
    };

    pub const OBJECT: Self = Self {
        datatype_properties: false,
        object_properties: true,
        restrictions: true,
    };
}

/// `owl:Class` together with the properties and restrictions declared on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassModel {
    #[serde(flatten)]
    info: VocabularyInfo,
    datatype_properties: BTreeMap<Iri, DatatypePropertyModel>,
    object_properties: BTreeMap<Iri, ObjectPropertyModel>,
    restrictions: BTreeMap<Iri, OwlRestrictionModel>,
}

impl ClassModel {
    #[must_use]
    pub fn new(info: VocabularyInfo) -> Self {
        Self {
            info,
            datatype_properties: BTreeMap::new(),
            object_properties: BTreeMap::new(),
            restrictions: BTreeMap::new(),
        }
    }

    /// Data properties keyed by identifier.
    #[must_use]
    pub fn datatype_properties(&self) -> &BTreeMap<Iri, DatatypePropertyModel> {
        &self.datatype_properties
    }

    /// Object properties keyed by identifier.
    #[must_use]
    pub fn object_properties(&self) -> &BTreeMap<Iri, ObjectPropertyModel> {
        &self.object_properties
    }

    /// Restrictions keyed by the identifier of the constrained property.
    #[must_use]
    pub fn restrictions(&self) -> &BTreeMap<Iri, OwlRestrictionModel> {
        &self.restrictions
    }

    pub fn add_datatype_property(&mut self, property: DatatypePropertyModel) {
        self.datatype_properties
            .insert(property.id().clone(), property);
    }

    pub fn add_object_property(&mut self, property: ObjectPropertyModel) {
        self.object_properties.insert(property.id().clone(), property);
    }

    /// Registers a property according to its variant.
    pub fn add_property(&mut self, property: PropertyModel) {
        match property {
            PropertyModel::Datatype(property) => self.add_datatype_property(property),
            PropertyModel::Object(property) => self.add_object_property(property),
        }
    }

    /// Registers a restriction, merging it with one already declared for the same property.
    pub fn add_restriction(&mut self, restriction: OwlRestrictionModel) {
        match self.restrictions.get_mut(restriction.on_property()) {
            Some(existing) => existing.merge(&restriction),
            None => {
                self.restrictions
                    .insert(restriction.on_property().clone(), restriction);
            }
        }
    }

    /// Copies the selected members of `other` into this model, replacing entries with equal keys.
    pub fn absorb(&mut self, other: &ClassModel, members: InheritedMembers) {
        if members.datatype_properties {
            self.datatype_properties.extend(
                other
                    .datatype_properties
                    .iter()
                    .map(|(id, property)| (id.clone(), property.clone())),
            );
        }
        if members.object_properties {
            self.object_properties.extend(
                other
                    .object_properties
                    .iter()
                    .map(|(id, property)| (id.clone(), property.clone())),
            );
        }
        if members.restrictions {
            self.restrictions.extend(
                other
                    .restrictions
                    .iter()
                    .map(|(id, restriction)| (id.clone(), restriction.clone())),
            );
        }
    }

    /// Drops the members not selected by `members`.
    pub fn retain(&mut self, members: InheritedMembers) {
        if !members.datatype_properties {
            self.datatype_properties.clear();
        }
        if !members.object_properties {
            self.object_properties.clear();
        }
        if !members.restrictions {
            self.restrictions.clear();
        }
    }

    /// Data properties with a range that no restriction on this class constrains yet.
    #[must_use]
    pub fn linkable_datatype_properties(&self) -> Vec<DatatypePropertyModel> {
        self.linkable(&self.datatype_properties)
    }

    /// Object properties with a range that no restriction on this class constrains yet.
    #[must_use]
    pub fn linkable_object_properties(&self) -> Vec<ObjectPropertyModel> {
        self.linkable(&self.object_properties)
    }

    fn linkable<P: PropertyDefinition>(&self, properties: &BTreeMap<Iri, P>) -> Vec<P> {
        properties
            .values()
            .filter(|property| {
                !self.restrictions.contains_key(property.id()) && property.range().is_some()
            })
            .cloned()
            .collect()
    }
}

impl VocabularyModel for ClassModel {
    fn info(&self) -> &VocabularyInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut VocabularyInfo {
        &mut self.info
    }

    fn handle_lang(&mut self, lang: &str) {
        self.info.handle_lang(lang);
        for property in self.datatype_properties.values_mut() {
            property.handle_lang(lang);
        }
        for property in self.object_properties.values_mut() {
            property.handle_lang(lang);
        }
        for restriction in self.restrictions.values_mut() {
            restriction.handle_lang(lang);
        }
    }
}

/// An ontology root type (`owl:Class`, `owl:DatatypeProperty`, ...) with its display label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootModel {
    iri: Iri,
    type_label: LangString,
}

impl RootModel {
    fn owl(local: &str, en: &str, fr: &str) -> Self {
        Self {
            iri: Iri::owl(local),
            type_label: LangString::untagged(en)
                .with_translation("en", en)
                .with_translation("fr", fr),
        }
    }

    #[must_use]
    pub fn iri(&self) -> &Iri {
        &self.iri
    }

    #[must_use]
    pub fn type_label(&self) -> &LangString {
        &self.type_label
    }
}

/// Root vocabulary shared, read-only, by the loader and the stores.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VocabularyRoots {
    pub class: RootModel,
    pub datatype_property: RootModel,
    pub object_property: RootModel,
    pub restriction: RootModel,
    pub top_data_property: Iri,
    pub top_object_property: Iri,
}

impl Default for VocabularyRoots {
    fn default() -> Self {
        Self {
            class: RootModel::owl("Class", "Class", "Classe"),
            datatype_property: RootModel::owl(
                "DatatypeProperty",
                "Data property",
                "Propriété de données",
            ),
            object_property: RootModel::owl(
                "ObjectProperty",
                "Object property",
                "Propriété d'objet",
            ),
            restriction: RootModel::owl("Restriction", "Restriction", "Restriction"),
            top_data_property: Iri::owl("topDataProperty"),
            top_object_property: Iri::owl("topObjectProperty"),
        }
    }
}

impl VocabularyRoots {
    /// Creates an empty class model carrying the `owl:Class` type.
    #[must_use]
    pub fn class(&self, id: Iri) -> ClassModel {
        ClassModel::new(VocabularyInfo::new(id, &self.class))
    }

    /// Creates an empty property model of the requested variant.
    #[must_use]
    pub fn property(&self, id: Iri, kind: PropertyKind) -> PropertyModel {
        match kind {
            PropertyKind::Data => PropertyModel::Datatype(DatatypePropertyModel::new(
                VocabularyInfo::new(id, &self.datatype_property),
            )),
            PropertyKind::Object => PropertyModel::Object(ObjectPropertyModel::new(
                VocabularyInfo::new(id, &self.object_property),
            )),
        }
    }

    /// Identifier of the root under which property trees of `kind` are anchored.
    #[must_use]
    pub fn top_property(&self, kind: PropertyKind) -> &Iri {
        match kind {
            PropertyKind::Data => &self.top_data_property,
            PropertyKind::Object => &self.top_object_property,
        }
    }
}

/// Node of a [`ResourceTree`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeNode<T> {
    pub model: T,
    pub children: Vec<TreeNode<T>>,
}

/// Forest of models arranged by their parent relation and anchored at a root identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResourceTree<T> {
    root: Iri,
    nodes: Vec<TreeNode<T>>,
}

impl<T: VocabularyModel> ResourceTree<T> {
    /// Arranges `models` below `root`.
    ///
    /// Models none of whose parents are part of `models` become top-level nodes. A model
    /// with several parents in the set appears below each of them.
    #[must_use]
    pub fn from_models(root: Iri, models: impl IntoIterator<Item = T>) -> Self {
        let models: BTreeMap<Iri, T> = models
            .into_iter()
            .map(|model| (model.id().clone(), model))
            .collect();

        let mut children: BTreeMap<&Iri, Vec<&Iri>> = BTreeMap::new();
        let mut top_level = Vec::new();
        for (id, model) in &models {
            let parents: Vec<&Iri> = model
                .info()
                .parents()
                .iter()
                .filter(|parent| models.contains_key(*parent))
                .collect();
            if parents.is_empty() {
                top_level.push(id);
            }
            for parent in parents {
                children.entry(parent).or_default().push(id);
            }
        }

        let mut path = BTreeSet::new();
        let nodes = top_level
            .into_iter()
            .filter_map(|id| Self::build_node(id, &models, &children, &mut path))
            .collect();
        Self { root, nodes }
    }

    fn build_node<'a>(
        id: &'a Iri,
        models: &'a BTreeMap<Iri, T>,
        children: &BTreeMap<&'a Iri, Vec<&'a Iri>>,
        path: &mut BTreeSet<&'a Iri>,
    ) -> Option<TreeNode<T>> {
        let model = models.get(id)?;
        if !path.insert(id) {
            return None;
        }
        let nodes = children
            .get(id)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter_map(|child| Self::build_node(child, models, children, path))
                    .collect()
            })
            .unwrap_or_default();
        path.remove(id);
        Some(TreeNode {
            model: model.clone(),
            children: nodes,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Iri {
        &self.root
    }

    #[must_use]
    pub fn nodes(&self) -> &[TreeNode<T>] {
        &self.nodes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the distinct identifiers found anywhere in the tree.
    #[must_use]
    pub fn ids(&self) -> BTreeSet<Iri> {
        let mut ids = BTreeSet::new();
        let mut stack: Vec<&TreeNode<T>> = self.nodes.iter().collect();
        while let Some(node) = stack.pop() {
            ids.insert(node.model.id().clone());
            stack.extend(node.children.iter());
        }
        ids
    }
}
