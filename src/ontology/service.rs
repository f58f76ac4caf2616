use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, PoisonError, RwLock},
    time::Instant,
};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    config::{Config, OntologySettings},
    ontology::{
        entities::{
            ClassModel, DatatypePropertyModel, InheritedMembers, ObjectPropertyModel,
            PropertyDefinition, PropertyModel, ResourceTree, VocabularyModel, VocabularyRoots,
        },
        fallback::SparqlOntologyStore,
        loader::BulkLoader,
        repositories::{requested_lang, requested_pattern, OntologyStore, PropertyFilter},
        snapshot::{OntologySnapshot, Registered, SnapshotStats},
        sparql::{HttpSparqlClient, SparqlClient},
        value_objects::{Iri, PrefixMap},
    },
    Error, Result,
};

/// Ontology index kept resident in memory.
///
/// Readers clone the current [`OntologySnapshot`] pointer and never block on a
/// reload: `load`, `reload` and `add_all` build the next snapshot off to the side and
/// swap it in once complete. Writers are serialized among themselves. Requests
/// carrying a label pattern are forwarded to a [`SparqlOntologyStore`].
pub struct InMemoryOntologyStore {
    loader: BulkLoader,
    fallback: SparqlOntologyStore,
    prefixes: Arc<PrefixMap>,
    roots: Arc<VocabularyRoots>,
    max_path_length: usize,
    snapshot: RwLock<Arc<OntologySnapshot>>,
    writer: tokio::sync::Mutex<()>,
}

impl InMemoryOntologyStore {
    /// Creates an empty store reading from `client`.
    ///
    /// # Errors
    /// Fails with [`Error::Config`] when `settings` lists no language.
    pub fn new(client: Arc<dyn SparqlClient>, settings: &OntologySettings) -> Result<Self> {
        settings.validate()?;
        let prefixes = Arc::new(PrefixMap::with_prefixes(&settings.prefixes));
        let roots = Arc::new(VocabularyRoots::default());
        let loader = BulkLoader::new(
            client,
            &settings.languages,
            Arc::clone(&prefixes),
            Arc::clone(&roots),
        )?;
        Ok(Self {
            fallback: SparqlOntologyStore::new(loader.clone()),
            loader,
            prefixes,
            roots,
            max_path_length: settings.max_ancestor_path,
            snapshot: RwLock::new(Arc::new(OntologySnapshot::default())),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    /// Creates an empty store over the HTTP endpoint named in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = HttpSparqlClient::new(&config.sparql)?;
        Self::new(Arc::new(client), &config.ontology)
    }

    /// Returns the snapshot currently served.
    #[must_use]
    pub fn snapshot(&self) -> Arc<OntologySnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, snapshot: OntologySnapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    /// Returns the store answering pattern searches.
    #[must_use]
    pub fn fallback(&self) -> &SparqlOntologyStore {
        &self.fallback
    }

    #[must_use]
    pub fn prefixes(&self) -> &PrefixMap {
        &self.prefixes
    }

    /// Canonical form of `iri` under the configured prefixes.
    #[must_use]
    pub fn canonical(&self, iri: &Iri) -> Iri {
        self.prefixes.canonical(iri)
    }

    #[must_use]
    pub fn stats(&self) -> SnapshotStats {
        self.snapshot().stats()
    }

    /// Classes on some path of at most the configured length from `ancestor` down to `class`.
    ///
    /// Empty when `ancestor` is `class` or is not one of its superclasses.
    #[must_use]
    pub fn get_ancestor_hierarchy(&self, class: &Iri, ancestor: &Iri) -> BTreeSet<Iri> {
        self.snapshot()
            .ancestor_path(
                &self.canonical(class),
                &self.canonical(ancestor),
                self.max_path_length,
            )
            .into_iter()
            .collect()
    }

    /// Registers additional models on top of the served ontology.
    ///
    /// Properties are linked into their domain classes like loaded ones.
    ///
    /// # Errors
    /// See [`OntologySnapshot::add_all`] and [`OntologySnapshot::link_properties`];
    /// the served snapshot is unchanged on failure.
    pub async fn add_all<M: Registered>(&self, models: Vec<M>) -> Result<()> {
        let _writer = self.writer.lock().await;
        let ids: Vec<Iri> = models.iter().map(|model| self.canonical(model.id())).collect();
        let mut next = OntologySnapshot::clone(&self.snapshot());
        next.add_all(models, &self.prefixes)?;
        M::link(&mut next, &ids)?;
        self.publish(next);
        Ok(())
    }

    /// Runs the three load phases on top of `snapshot`.
    async fn build(&self, mut snapshot: OntologySnapshot) -> Result<OntologySnapshot> {
        let started = Instant::now();
        let classes = self.loader.get_classes().await?;
        let count = classes.len();
        snapshot.add_all(classes, &self.prefixes)?;
        info!(count, elapsed_ms = elapsed_ms(started), "classes loaded");

        let started = Instant::now();
        let properties = self.loader.get_properties().await?;
        let count = properties.len();
        let ids: Vec<Iri> = properties
            .iter()
            .map(|property| self.canonical(property.id()))
            .collect();
        snapshot.add_all(properties, &self.prefixes)?;
        PropertyModel::link(&mut snapshot, &ids)?;
        info!(count, elapsed_ms = elapsed_ms(started), "properties loaded");

        let started = Instant::now();
        let restrictions = self.loader.get_restrictions().await?;
        let count = restrictions.len();
        snapshot.add_restrictions(restrictions, &self.prefixes)?;
        info!(count, elapsed_ms = elapsed_ms(started), "restrictions loaded");

        Ok(snapshot)
    }

    async fn rebuild(&self, base: OntologySnapshot) -> Result<()> {
        let snapshot = self
            .build(base)
            .await
            .map_err(|err| Error::Load(Box::new(err)))?;
        self.publish(snapshot);
        Ok(())
    }

    fn search_properties<P: PropertyDefinition>(
        &self,
        domain: &Iri,
        lang: Option<&str>,
        include_sub_classes: bool,
        filter: Option<&PropertyFilter<P>>,
        select: fn(&ClassModel) -> &BTreeMap<Iri, P>,
    ) -> Result<ResourceTree<P>> {
        let mut found = self.snapshot().collect_properties(
            &self.canonical(domain),
            include_sub_classes,
            select,
            filter,
        )?;
        if let Some(lang) = requested_lang(lang) {
            for property in &mut found {
                property.handle_lang(lang);
            }
        }
        Ok(ResourceTree::from_models(
            self.roots.top_property(P::KIND).clone(),
            found,
        ))
    }

    fn composed_view(
        &self,
        class: &Iri,
        ancestor: Option<&Iri>,
        lang: Option<&str>,
        members: InheritedMembers,
    ) -> Result<ClassModel> {
        let ancestor = ancestor.map(|ancestor| self.canonical(ancestor));
        let mut model = self.snapshot().compose_class(
            &self.canonical(class),
            ancestor.as_ref(),
            members,
            self.max_path_length,
        )?;
        if let Some(lang) = requested_lang(lang) {
            model.handle_lang(lang);
        }
        Ok(model)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl OntologyStore for InMemoryOntologyStore {
    async fn load(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        let base = OntologySnapshot::clone(&self.snapshot());
        self.rebuild(base).await
    }

    async fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.publish(OntologySnapshot::default());
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.rebuild(OntologySnapshot::default()).await
    }

    async fn class_exist(&self, class: &Iri, ancestor: Option<&Iri>) -> Result<bool> {
        let ancestor = ancestor.map(|ancestor| self.canonical(ancestor));
        Ok(self.snapshot().class_exist(
            &self.canonical(class),
            ancestor.as_ref(),
            self.max_path_length,
        ))
    }

    async fn get_class_model(
        &self,
        class: &Iri,
        ancestor: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<ClassModel> {
        self.composed_view(class, ancestor, lang, InheritedMembers::ALL)
    }

    async fn search_sub_classes(
        &self,
        class: &Iri,
        name_pattern: Option<&str>,
        lang: Option<&str>,
        exclude_root: bool,
    ) -> Result<ResourceTree<ClassModel>> {
        if requested_pattern(name_pattern).is_some() {
            debug!(class = %class, "delegating subclass pattern search");
            return self
                .fallback
                .search_sub_classes(class, name_pattern, lang, exclude_root)
                .await;
        }
        let class = self.canonical(class);
        let snapshot = self.snapshot();
        let lang = requested_lang(lang);
        let models = snapshot
            .descendants(&class, !exclude_root)?
            .into_iter()
            .map(|model| {
                let mut model = model.clone();
                if let Some(lang) = lang {
                    model.handle_lang(lang);
                }
                model
            })
            .collect::<Vec<_>>();
        Ok(ResourceTree::from_models(class, models))
    }

    async fn get_property(
        &self,
        property: &Iri,
        domain: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<PropertyModel> {
        let property = self.canonical(property);
        let snapshot = self.snapshot();
        let mut model = snapshot.property(&property)?.clone();
        if let Some(domain) = domain.map(|domain| self.canonical(domain)) {
            snapshot.class(&domain)?;
            if let Some(declared) = model.domain() {
                if !snapshot.class_exist(&domain, Some(declared), self.max_path_length) {
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
        if requested_pattern(name_pattern).is_some() {
            debug!(domain = %domain, "delegating data property pattern search");
            return self
                .fallback
                .search_data_properties(domain, name_pattern, lang, include_sub_classes, filter)
                .await;
        }
        self.search_properties(
            domain,
            lang,
            include_sub_classes,
            filter,
            ClassModel::datatype_properties,
        )
    }

    async fn search_object_properties(
        &self,
        domain: &Iri,
        name_pattern: Option<&str>,
        lang: Option<&str>,
        include_sub_classes: bool,
        filter: Option<&PropertyFilter<ObjectPropertyModel>>,
    ) -> Result<ResourceTree<ObjectPropertyModel>> {
        if requested_pattern(name_pattern).is_some() {
            debug!(domain = %domain, "delegating object property pattern search");
            return self
                .fallback
                .search_object_properties(domain, name_pattern, lang, include_sub_classes, filter)
                .await;
        }
        self.search_properties(
            domain,
            lang,
            include_sub_classes,
            filter,
            ClassModel::object_properties,
        )
    }

    async fn get_linkable_data_properties(
        &self,
        domain: &Iri,
        ancestor: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<Vec<DatatypePropertyModel>> {
        Ok(self
            .composed_view(domain, ancestor, lang, InheritedMembers::DATATYPE)?
            .linkable_datatype_properties())
    }

    async fn get_linkable_object_properties(
        &self,
        domain: &Iri,
        ancestor: Option<&Iri>,
        lang: Option<&str>,
    ) -> Result<Vec<ObjectPropertyModel>> {
        Ok(self
            .composed_view(domain, ancestor, lang, InheritedMembers::OBJECT)?
            .linkable_object_properties())
    }
}
