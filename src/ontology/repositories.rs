use async_trait::async_trait;

use super::entities::{
    ClassModel, DatatypePropertyModel, ObjectPropertyModel, PropertyModel, ResourceTree,
};
use super::value_objects::Iri;
use crate::errors::IdentifierKind;
use crate::{Error, Result};

/// Predicate over a property and the class it was found on, used to narrow property searches.
pub type PropertyFilter<P> = dyn Fn(&P, &ClassModel) -> bool + Send + Sync;

/// Query contract shared by the in-memory index and the live-query fallback.
///
/// Identifiers may be given in prefixed or absolute form; implementors
/// canonicalize them before any lookup. `lang` selects which translation becomes
/// the default label and comment of every returned model; `None` or an empty tag
/// leaves the untagged values in place.
#[async_trait]
pub trait OntologyStore: Send + Sync {
    /// Fetches the whole ontology from the backing store.
    ///
    /// Implementors must leave previously served data untouched when loading fails.
    async fn load(&self) -> Result<()>;

    /// Forgets every loaded model.
    async fn clear(&self) -> Result<()>;

    /// Replaces the loaded ontology with a fresh copy from the backing store.
    async fn reload(&self) -> Result<()>;

    /// Returns whether `class` exists and, when given, is a subclass of `ancestor`.
    ///
    /// A class counts as its own ancestor here.
    async fn class_exist(&self, class: &Iri, ancestor: Option<&Iri>) -> Result<bool>;

    /// Returns `class` with the properties and restrictions it inherits up to `ancestor`.
    ///
    /// Implementors must fail with [`Error::NotAnAncestor`] rather than return the bare
    /// class when `ancestor` is not a superclass of `class`.
    async fn get_class_model(
        &self,
        class: &Iri,
        ancestor: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<ClassModel>;

    /// Returns the subclass tree below `class`, optionally narrowed by a label pattern.
    async fn search_sub_classes(
        &self,
        class: &Iri,
        name_pattern: Option<&str>,
        lang: Option<&str>,
        exclude_root: bool,
    ) -> Result<ResourceTree<ClassModel>>;

    /// Returns the property `property`, checking that it applies to `domain` when given.
    async fn get_property(
        &self,
        property: &Iri,
        domain: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<PropertyModel>;

    async fn get_data_property(
        &self,
        property: &Iri,
        domain: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<DatatypePropertyModel> {
        self.get_property(property, domain, lang)
            .await?
            .into_datatype()
            .ok_or_else(|| Error::unknown(IdentifierKind::DataProperty, property))
    }

    async fn get_object_property(
        &self,
        property: &Iri,
        domain: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<ObjectPropertyModel> {
        self.get_property(property, domain, lang)
            .await?
            .into_object()
            .ok_or_else(|| Error::unknown(IdentifierKind::ObjectProperty, property))
    }

    /// Returns the data properties declared on `domain`, and on its subclasses when
    /// `include_sub_classes` is set, arranged under `owl:topDataProperty`.
    async fn search_data_properties(
        &self,
        domain: &Iri,
        name_pattern: Option<&str>,
        lang: Option<&str>,
        include_sub_classes: bool,
        filter: Option<&PropertyFilter<DatatypePropertyModel>>,
    ) -> Result<ResourceTree<DatatypePropertyModel>>;

    /// Object property counterpart of [`OntologyStore::search_data_properties`].
    async fn search_object_properties(
        &self,
        domain: &Iri,
        name_pattern: Option<&str>,
        lang: Option<&str>,
        include_sub_classes: bool,
        filter: Option<&PropertyFilter<ObjectPropertyModel>>,
    ) -> Result<ResourceTree<ObjectPropertyModel>>;

    /// Data properties of `domain` (inheriting up to `ancestor`) that have a range and
    /// no restriction on the class yet.
    async fn get_linkable_data_properties(
        &self,
        domain: &Iri,
        ancestor: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<Vec<DatatypePropertyModel>>;

    /// Object property counterpart of [`OntologyStore::get_linkable_data_properties`].
    async fn get_linkable_object_properties(
        &self,
        domain: &Iri,
        ancestor: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<Vec<ObjectPropertyModel>>;
}

/// Treats an empty language tag as no language.
pub(crate) fn requested_lang(lang: Option<&str>) -> Option<&str> {
    lang.map(str::trim).filter(|lang| !lang.is_empty())
}

/// Treats an empty or blank pattern as no pattern.
pub(crate) fn requested_pattern(pattern: Option<&str>) -> Option<&str> {
    pattern.filter(|pattern| !pattern.trim().is_empty())
}
