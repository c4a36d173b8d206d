//! The [`Model`] is the component registry. It owns a set of components and
//! keeps every derived index over that set consistent across attach,
//! detach, transfer between models and bulk teardown.
//!
//! # Indices
//!
//! | index          | key        | members                               |
//! |----------------|------------|---------------------------------------|
//! | `components`   | id         | every owned component                 |
//! | `types`        | type tag   | id -> component, per tag              |
//! | `objects`      | id         | components with the object capability |
//! | `meshes`       | id         | objects with the mesh capability      |
//! | `entities`     | id         | objects with an entity type           |
//! | `entity_types` | entity type| id -> entity, per entity type         |
//! | `guid_objects` | guid       | objects with a guid                   |
//!
//! All maps keep insertion order. Three id-list projections
//! ([`object_guids`](Model::object_guids), [`entity_type_ids`](Model::entity_type_ids),
//! [`entity_ids`](Model::entity_ids)) are cached and dropped whenever the key
//! set of their source map changes, then rebuilt on the next read.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, error, trace, warn};

use crate::component::{same_instance, Component, ComponentSource, SharedComponent};
use crate::factory::ComponentFactory;
use crate::scene::SceneService;
use crate::ModelError;

type ComponentMap = IndexMap<String, SharedComponent>;

// ---------------------------------------------------------------------------
// ModelConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Model`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model id. Generated by the scene when `None`.
    pub id: Option<String>,
}

// ---------------------------------------------------------------------------
// AddOutcome
// ---------------------------------------------------------------------------

/// Successful result of [`Model::try_add`].
#[derive(Debug, Clone)]
pub enum AddOutcome {
    /// The component was attached (possibly moved from another model).
    Attached(SharedComponent),
    /// A component with this id was already in the model; nothing changed.
    AlreadyPresent(SharedComponent),
}

impl AddOutcome {
    /// The component in the model after the call, whichever way it got there.
    pub fn component(&self) -> &SharedComponent {
        match self {
            AddOutcome::Attached(c) | AddOutcome::AlreadyPresent(c) => c,
        }
    }

    /// Whether this call changed the model.
    pub fn is_attached(&self) -> bool {
        matches!(self, AddOutcome::Attached(_))
    }

    /// The component, if this call attached it.
    pub fn into_attached(self) -> Option<SharedComponent> {
        match self {
            AddOutcome::Attached(c) => Some(c),
            AddOutcome::AlreadyPresent(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ModelIndex -- the maps behind a model
// ---------------------------------------------------------------------------

/// Cached key lists. `None` means stale.
#[derive(Debug, Default)]
struct Projections {
    object_guids: Option<Rc<[String]>>,
    entity_type_ids: Option<Rc<[String]>>,
    entity_ids: Option<Rc<[String]>>,
}

#[derive(Default)]
struct ModelIndex {
    components: ComponentMap,
    num_components: usize,
    types: IndexMap<String, ComponentMap>,
    objects: ComponentMap,
    meshes: ComponentMap,
    entities: ComponentMap,
    entity_types: IndexMap<String, ComponentMap>,
    guid_objects: ComponentMap,
    projections: Projections,
    destroyed: bool,
}

/// Remove `key` from `map` only if it maps to `component` itself.
fn remove_same(map: &mut ComponentMap, key: &str, component: &dyn Component) -> bool {
    if map.get(key).is_some_and(|c| same_instance(c, component)) {
        map.shift_remove(key);
        true
    } else {
        false
    }
}

impl ModelIndex {
    /// The object already holding `guid`, if it is not `component`.
    fn guid_holder(&self, guid: &str, component: &dyn Component) -> Option<&SharedComponent> {
        self.guid_objects
            .get(guid)
            .filter(|holder| !same_instance(holder, component))
    }

    fn attach(&mut self, component: &SharedComponent) {
        let core = component.core();
        let id = core.id().to_owned();

        self.components.insert(id.clone(), Rc::clone(component));
        self.types
            .entry(core.type_tag().to_owned())
            .or_default()
            .insert(id.clone(), Rc::clone(component));

        if core.is_object() {
            self.objects.insert(id.clone(), Rc::clone(component));

            if let Some(entity_type) = core.entity_type() {
                self.entities.insert(id.clone(), Rc::clone(component));
                self.projections.entity_ids = None;
                let of_type = match self.entity_types.entry(entity_type.to_owned()) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        self.projections.entity_type_ids = None;
                        e.insert(ComponentMap::new())
                    }
                };
                of_type.insert(id.clone(), Rc::clone(component));
            }

            if let Some(guid) = core.guid() {
                self.guid_objects.insert(guid.to_owned(), Rc::clone(component));
                self.projections.object_guids = None;
            }

            if core.is_mesh() {
                self.meshes.insert(id, Rc::clone(component));
            }
        }

        self.num_components += 1;
    }

    /// Remove `component` from every index. Returns whether it was owned.
    fn detach(&mut self, component: &dyn Component) -> bool {
        let core = component.core();
        let id = core.id();

        let owned = remove_same(&mut self.components, id, component);
        if owned {
            self.num_components -= 1;
        }

        if let Some(of_type) = self.types.get_mut(core.type_tag()) {
            remove_same(of_type, id, component);
            if of_type.is_empty() {
                self.types.shift_remove(core.type_tag());
            }
        }

        remove_same(&mut self.meshes, id, component);
        remove_same(&mut self.objects, id, component);

        if let Some(entity_type) = core.entity_type() {
            if remove_same(&mut self.entities, id, component) {
                self.projections.entity_ids = None;
            }
            if let Some(of_type) = self.entity_types.get_mut(entity_type) {
                remove_same(of_type, id, component);
                if of_type.is_empty() {
                    self.entity_types.shift_remove(entity_type);
                    self.projections.entity_type_ids = None;
                }
            }
        }

        if let Some(guid) = core.guid() {
            if remove_same(&mut self.guid_objects, guid, component) {
                self.projections.object_guids = None;
            }
        }

        owned
    }

    /// Empty every index. Returns whatever was still in `components`.
    fn reset(&mut self) -> Vec<SharedComponent> {
        let leftovers = std::mem::take(&mut self.components).into_values().collect();
        self.num_components = 0;
        self.types.clear();
        self.objects.clear();
        self.meshes.clear();
        self.entities.clear();
        self.entity_types.clear();
        self.guid_objects.clear();
        self.projections = Projections::default();
        leftovers
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

struct ModelInner {
    id: String,
    scene: Rc<dyn SceneService>,
    factory: Rc<ComponentFactory>,
    index: RefCell<ModelIndex>,
}

/// A registry of scene components.
///
/// Cheap to clone; clones are handles to the same model. No method holds an
/// interior borrow while calling into a component hook or the scene, so
/// hooks may freely read the model.
#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelInner>,
}

/// Non-owning handle to a [`Model`], held by components as their owner
/// back-reference.
#[derive(Clone)]
pub struct WeakModel {
    inner: Weak<ModelInner>,
}

impl WeakModel {
    pub fn upgrade(&self) -> Option<Model> {
        self.inner.upgrade().map(|inner| Model { inner })
    }

    /// Whether this handle refers to `model`.
    pub fn points_to(&self, model: &Model) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Rc::as_ptr(&model.inner))
    }
}

impl fmt::Debug for WeakModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(model) => write!(f, "WeakModel({})", model.id()),
            None => f.write_str("WeakModel(<dropped>)"),
        }
    }
}

impl Model {
    /// Create an empty model in `scene`, building configs through `factory`.
    ///
    /// The scene is notified through [`SceneService::model_created`].
    pub fn new(
        scene: Rc<dyn SceneService>,
        factory: Rc<ComponentFactory>,
        config: ModelConfig,
    ) -> Self {
        let id = config.id.unwrap_or_else(|| scene.next_component_id());
        let model = Self {
            inner: Rc::new(ModelInner {
                id,
                scene,
                factory,
                index: RefCell::new(ModelIndex::default()),
            }),
        };
        model.inner.scene.model_created(&model);
        debug!(model = %model.id(), scene = %model.inner.scene.id(), "model created");
        model
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn downgrade(&self) -> WeakModel {
        WeakModel {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether `self` and `other` are handles to the same model.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn scene(&self) -> &Rc<dyn SceneService> {
        &self.inner.scene
    }

    // -- mutation -----------------------------------------------------------

    /// Attach a component, logging and returning `None` on failure.
    ///
    /// Also returns `None`, without logging at warn level or above, when a
    /// component with the same id is already in the model. See
    /// [`try_add`](Self::try_add) for the full contract.
    pub fn add(&self, source: impl Into<ComponentSource>) -> Option<SharedComponent> {
        match self.try_add(source) {
            Ok(AddOutcome::Attached(component)) => Some(component),
            Ok(AddOutcome::AlreadyPresent(component)) => {
                debug!(model = %self.id(), component = %component.id(), "component already in model");
                None
            }
            Err(e @ ModelError::UnresolvedReference { .. }) => {
                warn!(model = %self.id(), error = %e, "add failed");
                None
            }
            Err(e) => {
                error!(model = %self.id(), error = %e, "add failed");
                None
            }
        }
    }

    /// Attach a component.
    ///
    /// `source` is an id resolved through the scene, a config with a `"type"`
    /// tag built through the factory, or a live component. A component owned
    /// by another model is detached from it first. On any error nothing is
    /// mutated; a component that this call constructed is destroyed again.
    pub fn try_add(&self, source: impl Into<ComponentSource>) -> Result<AddOutcome, ModelError> {
        if self.is_destroyed() {
            return Err(ModelError::ModelDestroyed {
                model: self.id().to_owned(),
            });
        }

        let (component, constructed) = self.resolve(source.into())?;
        let checked = self.check_attachable(&component);
        if let Err(e) = checked {
            if constructed {
                component.destroy();
            }
            return Err(e);
        }
        if let Some(existing) = self.component(component.id()) {
            return Ok(AddOutcome::AlreadyPresent(existing));
        }

        if let Some(previous) = component.model() {
            if !previous.ptr_eq(self) {
                previous.remove(&*component);
                debug!(
                    component = %component.id(),
                    from = %previous.id(),
                    to = %self.id(),
                    "component transferred"
                );
            }
        }

        self.inner.index.borrow_mut().attach(&component);
        component.core().set_model(Some(self.downgrade()));
        trace!(model = %self.id(), component = %component.id(), kind = %component.type_tag(), "component attached");

        component.on_attached(self);
        Ok(AddOutcome::Attached(component))
    }

    /// Turn a source into a component. The flag is set when the component
    /// was constructed by this call.
    fn resolve(&self, source: ComponentSource) -> Result<(SharedComponent, bool), ModelError> {
        match source {
            ComponentSource::Id(id) => self
                .inner
                .scene
                .lookup(&id)
                .map(|component| (component, false))
                .ok_or(ModelError::UnresolvedReference { id }),
            ComponentSource::Config(config) => {
                let type_tag = config
                    .get("type")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                let component = self
                    .inner
                    .factory
                    .create(type_tag, &self.inner.scene, &config)?;
                Ok((component, true))
            }
            ComponentSource::Component(component) => {
                if component.is_destroyed() {
                    return Err(ModelError::DestroyedComponent {
                        id: component.id().to_owned(),
                    });
                }
                Ok((component, false))
            }
        }
    }

    fn check_attachable(&self, component: &SharedComponent) -> Result<(), ModelError> {
        let model_scene = self.inner.scene.id();
        if component.scene_id() != model_scene {
            return Err(ModelError::ScopeMismatch {
                component: component.id().to_owned(),
                component_scene: component.scene_id(),
                model_scene,
            });
        }

        if component.is_object() {
            if let Some(guid) = component.guid() {
                let local = self
                    .inner
                    .index
                    .borrow()
                    .guid_holder(guid, &**component)
                    .cloned();
                let holder = local.or_else(|| {
                    self.inner
                        .scene
                        .object_with_guid(guid)
                        .filter(|holder| !same_instance(holder, &**component))
                });
                if let Some(holder) = holder {
                    return Err(ModelError::DuplicateGuid {
                        guid: guid.to_owned(),
                        existing: holder.id().to_owned(),
                        incoming: component.id().to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Detach `component` from every index without destroying it.
    ///
    /// Returns whether the component was in the model. Entries held by a
    /// different instance under the same key are left alone.
    pub fn remove(&self, component: &dyn Component) -> bool {
        let owned = self.inner.index.borrow_mut().detach(component);
        if component.core().is_owned_by(self) {
            component.core().set_model(None);
        }
        if owned {
            trace!(model = %self.id(), component = %component.id(), "component detached");
        }
        owned
    }

    /// Destroy every owned component, meshes first, and empty the model.
    ///
    /// The model stays usable afterwards.
    pub fn clear(&self) {
        let (meshes, others): (Vec<SharedComponent>, Vec<SharedComponent>) = {
            let index = self.inner.index.borrow();
            index
                .components
                .values()
                .cloned()
                .partition(|component| component.is_mesh())
        };

        let mut destroyed = 0usize;
        for component in meshes.iter().chain(&others) {
            // A hook may already have destroyed or moved it.
            if component.core().is_owned_by(self) && !component.is_destroyed() {
                component.destroy();
                destroyed += 1;
            }
        }

        let leftovers = self.inner.index.borrow_mut().reset();
        for component in &leftovers {
            if component.core().is_owned_by(self) {
                component.core().set_model(None);
            }
        }
        if !leftovers.is_empty() {
            warn!(model = %self.id(), count = leftovers.len(), "components still indexed after teardown");
        }
        debug!(model = %self.id(), destroyed, "model cleared");
    }

    /// Clear the model and tell the scene it is gone. Later calls do nothing.
    pub fn destroy(&self) {
        {
            let mut index = self.inner.index.borrow_mut();
            if index.destroyed {
                return;
            }
            index.destroyed = true;
        }
        self.clear();
        self.inner.scene.model_destroyed(self);
        debug!(model = %self.id(), "model destroyed");
    }

    // -- projections --------------------------------------------------------

    /// GUIDs of guid-bearing objects, in attach order.
    pub fn object_guids(&self) -> Rc<[String]> {
        let mut index = self.inner.index.borrow_mut();
        let ModelIndex {
            guid_objects,
            projections,
            ..
        } = &mut *index;
        Rc::clone(
            projections
                .object_guids
                .get_or_insert_with(|| guid_objects.keys().cloned().collect()),
        )
    }

    /// Entity types present in the model, in first-seen order.
    pub fn entity_type_ids(&self) -> Rc<[String]> {
        let mut index = self.inner.index.borrow_mut();
        let ModelIndex {
            entity_types,
            projections,
            ..
        } = &mut *index;
        Rc::clone(
            projections
                .entity_type_ids
                .get_or_insert_with(|| entity_types.keys().cloned().collect()),
        )
    }

    /// Ids of entities, in attach order.
    pub fn entity_ids(&self) -> Rc<[String]> {
        let mut index = self.inner.index.borrow_mut();
        let ModelIndex {
            entities,
            projections,
            ..
        } = &mut *index;
        Rc::clone(
            projections
                .entity_ids
                .get_or_insert_with(|| entities.keys().cloned().collect()),
        )
    }

    // -- queries ------------------------------------------------------------

    pub fn num_components(&self) -> usize {
        self.inner.index.borrow().num_components
    }

    pub fn is_empty(&self) -> bool {
        self.num_components() == 0
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.index.borrow().destroyed
    }

    pub fn component(&self, id: &str) -> Option<SharedComponent> {
        self.inner.index.borrow().components.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.index.borrow().components.contains_key(id)
    }

    pub fn component_ids(&self) -> Vec<String> {
        self.inner.index.borrow().components.keys().cloned().collect()
    }

    pub fn components(&self) -> Vec<SharedComponent> {
        self.inner.index.borrow().components.values().cloned().collect()
    }

    /// Type tags with at least one component, in first-seen order.
    pub fn type_tags(&self) -> Vec<String> {
        self.inner.index.borrow().types.keys().cloned().collect()
    }

    pub fn components_of_type(&self, type_tag: &str) -> Vec<SharedComponent> {
        self.inner
            .index
            .borrow()
            .types
            .get(type_tag)
            .map(|of_type| of_type.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn objects(&self) -> Vec<SharedComponent> {
        self.inner.index.borrow().objects.values().cloned().collect()
    }

    pub fn object(&self, id: &str) -> Option<SharedComponent> {
        self.inner.index.borrow().objects.get(id).cloned()
    }

    pub fn meshes(&self) -> Vec<SharedComponent> {
        self.inner.index.borrow().meshes.values().cloned().collect()
    }

    pub fn entities(&self) -> Vec<SharedComponent> {
        self.inner.index.borrow().entities.values().cloned().collect()
    }

    pub fn entities_of_type(&self, entity_type: &str) -> Vec<SharedComponent> {
        self.inner
            .index
            .borrow()
            .entity_types
            .get(entity_type)
            .map(|of_type| of_type.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object_by_guid(&self, guid: &str) -> Option<SharedComponent> {
        self.inner.index.borrow().guid_objects.get(guid).cloned()
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = self.inner.index.try_borrow();
        let mut s = f.debug_struct("Model");
        s.field("id", &self.inner.id);
        if let Ok(index) = index {
            s.field("component_count", &index.num_components)
                .field("destroyed", &index.destroyed);
        }
        s.finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use serde_json::json;
    use std::cell::Cell;

    fn setup() -> (Scene, Model) {
        let scene = Scene::new(SceneConfig::default());
        let model = scene.create_model(ModelConfig {
            id: Some("model".to_owned()),
        });
        (scene, model)
    }

    /// (object_guids, entity_type_ids, entity_ids) cache validity.
    fn cached(model: &Model) -> (bool, bool, bool) {
        let index = model.inner.index.borrow();
        (
            index.projections.object_guids.is_some(),
            index.projections.entity_type_ids.is_some(),
            index.projections.entity_ids.is_some(),
        )
    }

    fn ids(components: &[SharedComponent]) -> Vec<&str> {
        components.iter().map(|c| c.id()).collect()
    }

    // -- attach ---------------------------------------------------------------

    #[test]
    fn attach_populates_indices() {
        let (_scene, model) = setup();
        let wall = model
            .add(json!({ "type": "Node", "id": "wall1", "entityType": "wall", "guid": "G-1" }))
            .unwrap();
        let mesh = model.add(json!({ "type": "Mesh", "id": "m1" })).unwrap();
        let geometry = model.add(json!({ "type": "Geometry", "id": "g1" })).unwrap();

        assert_eq!(model.num_components(), 3);
        assert_eq!(model.component_ids(), vec!["wall1", "m1", "g1"]);
        assert_eq!(model.type_tags(), vec!["Node", "Mesh", "Geometry"]);
        assert_eq!(ids(&model.objects()), vec!["wall1", "m1"]);
        assert_eq!(ids(&model.meshes()), vec!["m1"]);
        assert_eq!(ids(&model.entities()), vec!["wall1"]);
        assert_eq!(ids(&model.entities_of_type("wall")), vec!["wall1"]);
        assert!(Rc::ptr_eq(&model.object_by_guid("G-1").unwrap(), &wall));

        for c in [&wall, &mesh, &geometry] {
            assert_eq!(c.model(), Some(model.clone()));
        }
    }

    #[test]
    fn non_objects_never_classified() {
        let (_scene, model) = setup();
        model.add(json!({ "type": "Material", "id": "mat", "entityType": "paint", "guid": "G-9" }));
        assert!(model.objects().is_empty());
        assert!(model.entities().is_empty());
        assert!(model.object_guids().is_empty());
        assert!(model.entity_type_ids().is_empty());
        assert_eq!(model.num_components(), 1);
    }

    #[test]
    fn attach_hook_sees_populated_model() {
        #[derive(Debug)]
        struct Probe {
            core: ComponentCore,
            saw: Cell<Option<usize>>,
        }
        impl Component for Probe {
            fn core(&self) -> &ComponentCore {
                &self.core
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            fn on_attached(&self, model: &Model) {
                assert!(model.contains(self.core.id()));
                self.saw.set(Some(model.num_components()));
            }
        }

        let mut factory = ComponentFactory::with_builtin_kinds();
        factory.register("Probe", |seed, _| {
            Ok(Rc::new(Probe {
                core: seed.into_core(Capabilities::OBJECT),
                saw: Cell::new(None),
            }) as SharedComponent)
        });
        let scene = Scene::with_factory(SceneConfig::default(), factory);
        let model = scene.create_model(ModelConfig::default());
        let probe = model.add(json!({ "type": "Probe" })).unwrap();
        assert_eq!(probe.downcast_ref::<Probe>().unwrap().saw.get(), Some(1));
    }

    // -- idempotence and failures ---------------------------------------------

    #[test]
    fn second_add_is_a_noop() {
        let (_scene, model) = setup();
        let node = model.add(json!({ "type": "Node", "id": "n", "entityType": "e" })).unwrap();
        let before = (model.num_components(), model.component_ids(), model.entity_ids());

        assert!(model.add(&node).is_none());
        assert!(model.add("n").is_none());
        let outcome = model.try_add(&node).unwrap();
        assert!(!outcome.is_attached());
        assert!(Rc::ptr_eq(outcome.component(), &node));
        assert!(outcome.into_attached().is_none());

        assert_eq!(
            (model.num_components(), model.component_ids(), model.entity_ids()),
            before
        );
    }

    #[test]
    fn scope_mismatch_rejected() {
        let (_scene, model) = setup();
        let other = Scene::new(SceneConfig::default());
        let foreign = other.create_component(&json!({ "type": "Node", "id": "f" })).unwrap();

        let err = model.try_add(&foreign).unwrap_err();
        assert!(matches!(err, ModelError::ScopeMismatch { ref component, .. } if component == "f"));
        assert!(model.is_empty());
        assert!(foreign.model().is_none());
    }

    #[test]
    fn duplicate_guid_rejected_and_constructed_component_discarded() {
        let (scene, model) = setup();
        model.add(json!({ "type": "Node", "id": "a", "guid": "G" }));
        let err = model
            .try_add(json!({ "type": "Node", "id": "b", "guid": "G" }))
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::DuplicateGuid {
                guid: "G".to_owned(),
                existing: "a".to_owned(),
                incoming: "b".to_owned(),
            }
        );
        assert!(scene.component("b").is_none());
        assert_eq!(model.component_ids(), vec!["a"]);
    }

    #[test]
    fn guid_unique_across_models_in_scene() {
        let (scene, a) = setup();
        let b = scene.create_model(ModelConfig {
            id: Some("b".to_owned()),
        });
        let x = a
            .add(json!({ "type": "Node", "id": "x", "guid": "G" }))
            .unwrap();

        let err = b
            .try_add(json!({ "type": "Node", "id": "y", "guid": "G" }))
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::DuplicateGuid {
                guid: "G".to_owned(),
                existing: "x".to_owned(),
                incoming: "y".to_owned(),
            }
        );
        assert!(b.is_empty());
        assert!(scene.component("y").is_none());

        // The holder itself may still move, and the guid frees up once it
        // leaves every model.
        b.add(&x).unwrap();
        assert!(Rc::ptr_eq(&b.object_by_guid("G").unwrap(), &x));
        b.remove(&*x);
        assert!(a.add(json!({ "type": "Node", "id": "z", "guid": "G" })).is_some());

        // Models in another scene are a separate scope.
        let other = Scene::new(SceneConfig::default());
        let elsewhere = other.create_model(ModelConfig::default());
        assert!(elsewhere.add(json!({ "type": "Node", "guid": "G" })).is_some());
    }

    #[test]
    fn destroyed_component_rejected() {
        let (scene, model) = setup();
        let node = scene.create_component(&json!({ "type": "Node" })).unwrap();
        node.destroy();
        assert!(matches!(
            model.try_add(&node),
            Err(ModelError::DestroyedComponent { .. })
        ));
    }

    // -- remove ----------------------------------------------------------------

    #[test]
    fn remove_detaches_without_destroying() {
        let (scene, model) = setup();
        let wall = model
            .add(json!({ "type": "Node", "id": "wall1", "entityType": "wall", "guid": "G-1" }))
            .unwrap();
        model.add(json!({ "type": "Node", "id": "wall2", "entityType": "wall" }));

        assert!(model.remove(&*wall));
        assert!(!model.remove(&*wall));

        assert!(!wall.is_destroyed());
        assert!(wall.model().is_none());
        assert!(scene.component("wall1").is_some());
        assert_eq!(model.num_components(), 1);
        assert_eq!(&*model.entity_ids(), ["wall2"]);
        assert_eq!(&*model.entity_type_ids(), ["wall"]);
        assert!(model.object_guids().is_empty());
        assert!(model.object_by_guid("G-1").is_none());
    }

    #[test]
    fn emptied_sub_maps_are_pruned() {
        let (_scene, model) = setup();
        let wall = model
            .add(json!({ "type": "Node", "id": "wall1", "entityType": "wall" }))
            .unwrap();
        model.remove(&*wall);
        assert!(model.type_tags().is_empty());
        assert!(model.entity_type_ids().is_empty());
        assert!(model.components_of_type("Node").is_empty());
    }

    #[test]
    fn remove_ignores_other_instance_with_same_id() {
        let (scene, model) = setup();
        model.add(json!({ "type": "Node", "id": "n" }));
        let other_scene = Scene::new(SceneConfig::default());
        let impostor = other_scene
            .create_component(&json!({ "type": "Node", "id": "n" }))
            .unwrap();

        assert!(!model.remove(&*impostor));
        assert!(model.contains("n"));
        assert!(scene.component("n").is_some());
    }

    // -- projections -----------------------------------------------------------

    #[test]
    fn projections_cached_until_source_changes() {
        let (_scene, model) = setup();
        model.add(json!({ "type": "Node", "id": "a", "entityType": "wall", "guid": "G-a" }));
        assert_eq!(cached(&model), (false, false, false));

        let guids = model.object_guids();
        let types = model.entity_type_ids();
        let entities = model.entity_ids();
        assert_eq!(cached(&model), (true, true, true));
        assert!(Rc::ptr_eq(&guids, &model.object_guids()));

        // Same entity type, no guid: only the entity id list changes.
        model.add(json!({ "type": "Node", "id": "b", "entityType": "wall" }));
        assert_eq!(cached(&model), (true, true, false));
        assert!(Rc::ptr_eq(&types, &model.entity_type_ids()));
        assert_eq!(&*model.entity_ids(), ["a", "b"]);
        assert_eq!(&*entities, ["a"]);

        // Plain components touch no projection.
        model.add(json!({ "type": "Geometry" }));
        assert_eq!(cached(&model), (true, true, true));

        model.add(json!({ "type": "Node", "id": "c", "entityType": "door", "guid": "G-c" }));
        assert_eq!(cached(&model), (false, false, false));
        assert_eq!(&*model.object_guids(), ["G-a", "G-c"]);
        assert_eq!(&*model.entity_type_ids(), ["wall", "door"]);
    }

    #[test]
    fn guid_keyed_consistently_when_guid_differs_from_id() {
        let (scene, a) = setup();
        let b = scene.create_model(ModelConfig::default());
        let obj = a
            .add(json!({ "type": "Node", "id": "obj-1", "guid": "3f2a-guid" }))
            .unwrap();
        assert!(a.object_by_guid("obj-1").is_none());
        assert_eq!(&*a.object_guids(), ["3f2a-guid"]);

        b.add(&obj).unwrap();
        assert!(a.object_by_guid("3f2a-guid").is_none());
        assert!(a.object_guids().is_empty());
        assert!(Rc::ptr_eq(&b.object_by_guid("3f2a-guid").unwrap(), &obj));
    }

    // -- transfer ----------------------------------------------------------------

    #[test]
    fn transfer_moves_every_index() {
        let (scene, a) = setup();
        let b = scene.create_model(ModelConfig {
            id: Some("b".to_owned()),
        });
        let mesh = a
            .add(json!({ "type": "Mesh", "id": "m", "entityType": "pipe", "guid": "G-m" }))
            .unwrap();
        a.entity_ids();

        let moved = b.add("m").unwrap();
        assert!(Rc::ptr_eq(&moved, &mesh));

        assert!(a.is_empty());
        assert!(a.type_tags().is_empty());
        assert!(a.objects().is_empty() && a.meshes().is_empty() && a.entities().is_empty());
        assert!(a.entity_ids().is_empty());
        assert!(a.entity_type_ids().is_empty());
        assert!(a.object_guids().is_empty());

        assert_eq!(b.num_components(), 1);
        assert_eq!(ids(&b.meshes()), vec!["m"]);
        assert_eq!(ids(&b.entities_of_type("pipe")), vec!["m"]);
        assert_eq!(&*b.object_guids(), ["G-m"]);
        assert_eq!(mesh.model(), Some(b));
    }

    // -- clear / destroy -----------------------------------------------------------

    #[test]
    fn clear_destroys_everything_and_resets() {
        let (scene, model) = setup();
        let node = model.add(json!({ "type": "Node", "entityType": "wall", "guid": "G" })).unwrap();
        let mesh = model.add(json!({ "type": "Mesh" })).unwrap();
        model.entity_ids();

        model.clear();

        assert!(node.is_destroyed() && mesh.is_destroyed());
        assert!(node.model().is_none() && mesh.model().is_none());
        assert_eq!(model.num_components(), 0);
        assert!(model.type_tags().is_empty());
        assert!(model.entity_ids().is_empty());
        assert!(model.object_guids().is_empty());
        assert_eq!(scene.num_components(), 0);

        // Still usable.
        assert!(!model.is_destroyed());
        assert!(model.add(json!({ "type": "Node" })).is_some());
    }

    #[test]
    fn destroy_notifies_scene_once_and_goes_inert() {
        struct CountingScene {
            id: SceneId,
            created: Cell<usize>,
            destroyed: Cell<usize>,
            generated: Cell<u64>,
        }
        impl SceneService for CountingScene {
            fn id(&self) -> SceneId {
                self.id
            }
            fn lookup(&self, _id: &str) -> Option<SharedComponent> {
                None
            }
            fn register_component(&self, _component: SharedComponent) -> Result<(), ModelError> {
                Ok(())
            }
            fn forget_component(&self, _id: &str) {}
            fn next_component_id(&self) -> String {
                self.generated.set(self.generated.get() + 1);
                format!("gen-{}", self.generated.get())
            }
            fn object_with_guid(&self, _guid: &str) -> Option<SharedComponent> {
                None
            }
            fn model_created(&self, _model: &Model) {
                self.created.set(self.created.get() + 1);
            }
            fn model_destroyed(&self, _model: &Model) {
                self.destroyed.set(self.destroyed.get() + 1);
            }
        }

        let scene = Rc::new(CountingScene {
            id: SceneId::next(),
            created: Cell::new(0),
            destroyed: Cell::new(0),
            generated: Cell::new(0),
        });
        let model = Model::new(
            scene.clone(),
            Rc::new(ComponentFactory::with_builtin_kinds()),
            ModelConfig::default(),
        );
        assert_eq!(model.id(), "gen-1");
        assert_eq!(scene.created.get(), 1);
        let node = model.add(json!({ "type": "Node" })).unwrap();

        model.destroy();
        model.destroy();

        assert_eq!(scene.destroyed.get(), 1);
        assert!(node.is_destroyed());
        assert!(model.is_destroyed());
        assert!(matches!(
            model.try_add(json!({ "type": "Node" })),
            Err(ModelError::ModelDestroyed { .. })
        ));
        assert!(model.is_empty());
    }

    #[test]
    fn debug_output_names_model() {
        let (_scene, model) = setup();
        let text = format!("{model:?}");
        assert!(text.contains("\"model\""));
        assert!(text.contains("component_count: 0"));
    }
}
