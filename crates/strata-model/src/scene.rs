//! The owning scope of components and models.
//!
//! Models never reach for ambient global state: everything they need from
//! their scene goes through the [`SceneService`] trait they were built with.
//! [`Scene`] is the stock implementation.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::component::SharedComponent;
use crate::factory::ComponentFactory;
use crate::model::{Model, ModelConfig, WeakModel};
use crate::ModelError;

// ---------------------------------------------------------------------------
// SceneId
// ---------------------------------------------------------------------------

/// Process-unique identity of a scene. Components may only join models that
/// share their scene id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId(u64);

impl SceneId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw `u64` representation.
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SceneId({})", self.0)
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SceneService
// ---------------------------------------------------------------------------

/// What a model and the component factory need from their scene.
pub trait SceneService {
    fn id(&self) -> SceneId;

    /// Scene-wide lookup of a live component by id.
    fn lookup(&self, id: &str) -> Option<SharedComponent>;

    /// Make a newly constructed component resolvable by id.
    fn register_component(&self, component: SharedComponent) -> Result<(), ModelError>;

    /// Drop a destroyed component from the lookup.
    fn forget_component(&self, id: &str);

    /// An id not currently used by any component in the scene.
    fn next_component_id(&self) -> String;

    /// The object carrying `guid` in any live model of the scene.
    fn object_with_guid(&self, guid: &str) -> Option<SharedComponent>;

    /// Called exactly once when `model` is constructed.
    fn model_created(&self, model: &Model);

    /// Called exactly once when `model` is destroyed.
    fn model_destroyed(&self, model: &Model);
}

// ---------------------------------------------------------------------------
// SceneConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Scene`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneConfig {
    /// Prefix of generated component and model ids.
    pub id_prefix: String,
}

impl Default for SceneConfig {
    /// Generated ids look like `__1`, `__2`, ...
    fn default() -> Self {
        Self {
            id_prefix: "__".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

struct SceneState {
    id: SceneId,
    config: SceneConfig,
    factory: Rc<ComponentFactory>,
    components: RefCell<IndexMap<String, SharedComponent>>,
    models: RefCell<IndexMap<String, WeakModel>>,
    next_id: Cell<u64>,
}

impl SceneState {
    /// Tracked models that have not been dropped, in creation order.
    fn live_models(&self) -> Vec<Model> {
        self.models
            .borrow()
            .values()
            .filter_map(WeakModel::upgrade)
            .collect()
    }
}

impl SceneService for SceneState {
    fn id(&self) -> SceneId {
        self.id
    }

    fn lookup(&self, id: &str) -> Option<SharedComponent> {
        self.components.borrow().get(id).cloned()
    }

    fn register_component(&self, component: SharedComponent) -> Result<(), ModelError> {
        let mut components = self.components.borrow_mut();
        if components.contains_key(component.id()) {
            return Err(ModelError::DuplicateComponentId {
                id: component.id().to_owned(),
            });
        }
        components.insert(component.id().to_owned(), component);
        Ok(())
    }

    fn forget_component(&self, id: &str) {
        self.components.borrow_mut().shift_remove(id);
    }

    fn next_component_id(&self) -> String {
        loop {
            let n = self.next_id.get() + 1;
            self.next_id.set(n);
            let id = format!("{}{}", self.config.id_prefix, n);
            if !self.components.borrow().contains_key(&id) && !self.models.borrow().contains_key(&id) {
                return id;
            }
        }
    }

    fn object_with_guid(&self, guid: &str) -> Option<SharedComponent> {
        self.live_models()
            .iter()
            .find_map(|model| model.object_by_guid(guid))
    }

    fn model_created(&self, model: &Model) {
        let replaced = {
            let mut models = self.models.borrow_mut();
            models.retain(|_, tracked| tracked.upgrade().is_some());
            models.insert(model.id().to_owned(), model.downgrade())
        };
        if replaced.is_some() {
            tracing::warn!(scene = %self.id, model = %model.id(), "model id reused; previous model no longer tracked by the scene");
        }
    }

    fn model_destroyed(&self, model: &Model) {
        let mut models = self.models.borrow_mut();
        if models
            .get(model.id())
            .is_some_and(|tracked| tracked.points_to(model))
        {
            models.shift_remove(model.id());
        }
    }
}

/// A scope owning a component id lookup and a set of models.
///
/// Cheap to clone; clones share the same scene.
#[derive(Clone)]
pub struct Scene {
    state: Rc<SceneState>,
}

impl Scene {
    /// Create a scene with the built-in component kinds.
    pub fn new(config: SceneConfig) -> Self {
        Self::with_factory(config, ComponentFactory::with_builtin_kinds())
    }

    /// Create a scene whose models construct components through `factory`.
    pub fn with_factory(config: SceneConfig, factory: ComponentFactory) -> Self {
        let id = SceneId::next();
        tracing::debug!(scene = %id, kinds = factory.len(), "scene created");
        Self {
            state: Rc::new(SceneState {
                id,
                config,
                factory: Rc::new(factory),
                components: RefCell::new(IndexMap::new()),
                models: RefCell::new(IndexMap::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    pub fn id(&self) -> SceneId {
        self.state.id
    }

    /// This scene as the service handle models and factories consume.
    pub fn service(&self) -> Rc<dyn SceneService> {
        self.state.clone()
    }

    pub fn factory(&self) -> &Rc<ComponentFactory> {
        &self.state.factory
    }

    /// Create an empty model in this scene.
    pub fn create_model(&self, config: ModelConfig) -> Model {
        Model::new(self.service(), Rc::clone(&self.state.factory), config)
    }

    /// Construct a component that is resolvable by id but owned by no model.
    pub fn create_component(
        &self,
        config: &serde_json::Value,
    ) -> Result<SharedComponent, ModelError> {
        let type_tag = config
            .get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        self.state.factory.create(type_tag, &self.service(), config)
    }

    pub fn component(&self, id: &str) -> Option<SharedComponent> {
        self.state.lookup(id)
    }

    /// Number of live components in the scene, owned or not.
    pub fn num_components(&self) -> usize {
        self.state.components.borrow().len()
    }

    pub fn component_ids(&self) -> Vec<String> {
        self.state.components.borrow().keys().cloned().collect()
    }

    pub fn model(&self, id: &str) -> Option<Model> {
        self.state.models.borrow().get(id).and_then(WeakModel::upgrade)
    }

    /// Ids of live models, in creation order.
    pub fn model_ids(&self) -> Vec<String> {
        self.state
            .models
            .borrow()
            .iter()
            .filter(|(_, model)| model.upgrade().is_some())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Destroy every live model, then every component no model owned.
    pub fn destroy(&self) {
        let models = self.state.live_models();
        for model in &models {
            model.destroy();
        }

        let loose: Vec<SharedComponent> =
            self.state.components.borrow().values().cloned().collect();
        for component in &loose {
            component.destroy();
        }
        tracing::debug!(
            scene = %self.state.id,
            models = models.len(),
            loose_components = loose.len(),
            "scene destroyed"
        );
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("id", &self.state.id)
            .field("component_count", &self.state.components.borrow().len())
            .field("model_count", &self.state.live_models().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
