//! The component contract consumed by the registry.
//!
//! Every scene component embeds a [`ComponentCore`] holding the fields the
//! registry indexes on (id, type tag, scope, classification, capability
//! flags) plus the single owner back-reference. Components are shared as
//! [`SharedComponent`] (`Rc<dyn Component>`); a component is owned by at
//! most one [`Model`] at a time.
//!
//! # Destroy protocol
//!
//! `destroy()` on a `dyn Component` runs in two steps: the
//! component marks itself destroyed and runs its [`Component::on_destroy`]
//! hook, then its current owner detaches it through [`Model::remove`]. No
//! interior borrow is held across either step, so a model can destroy its
//! components in bulk while each one calls back into it.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::model::{Model, WeakModel};
use crate::scene::{SceneId, SceneService};

/// A component shared between the scene lookup and its owning model.
pub type SharedComponent = Rc<dyn Component>;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Capability flags that decide which derived indices a component joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities {
    object: bool,
    mesh: bool,
}

impl Capabilities {
    /// Neither object nor mesh (geometry, materials, textures, ...).
    pub const PLAIN: Capabilities = Capabilities {
        object: false,
        mesh: false,
    };
    /// Participates in object, entity and GUID classification.
    pub const OBJECT: Capabilities = Capabilities {
        object: true,
        mesh: false,
    };
    /// Renderable geometry+material; always also an object.
    pub const MESH: Capabilities = Capabilities {
        object: true,
        mesh: true,
    };

    /// Build flags from raw booleans. A mesh is always an object.
    pub fn new(object: bool, mesh: bool) -> Self {
        Self {
            object: object || mesh,
            mesh,
        }
    }

    pub fn is_object(self) -> bool {
        self.object
    }

    pub fn is_mesh(self) -> bool {
        self.mesh
    }
}

// ---------------------------------------------------------------------------
// ComponentCore
// ---------------------------------------------------------------------------

/// The registry-facing state every component carries.
///
/// Built from a [`ComponentSeed`](crate::factory::ComponentSeed) by the
/// factory. Everything except the owner back-reference and the destroyed
/// flag is fixed for the component's lifetime.
pub struct ComponentCore {
    id: String,
    type_tag: String,
    scene_id: SceneId,
    /// Used to drop the component from the scene lookup on destroy.
    scene: Weak<dyn SceneService>,
    entity_type: Option<String>,
    guid: Option<String>,
    capabilities: Capabilities,
    /// Owning model, if any. Only the registry writes this.
    model: RefCell<Option<WeakModel>>,
    destroyed: Cell<bool>,
}

impl ComponentCore {
    pub(crate) fn new(
        id: String,
        type_tag: String,
        scene_id: SceneId,
        scene: Weak<dyn SceneService>,
        entity_type: Option<String>,
        guid: Option<String>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            id,
            type_tag,
            scene_id,
            scene,
            entity_type,
            guid,
            capabilities,
            model: RefCell::new(None),
            destroyed: Cell::new(false),
        }
    }

    /// Id, unique within the owning scene.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Type tag the component was constructed under (`"Mesh"`, `"Node"`, ...).
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// The scene this component belongs to.
    pub fn scene_id(&self) -> SceneId {
        self.scene_id
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.entity_type.as_deref()
    }

    pub fn guid(&self) -> Option<&str> {
        self.guid.as_deref()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn is_object(&self) -> bool {
        self.capabilities.is_object()
    }

    pub fn is_mesh(&self) -> bool {
        self.capabilities.is_mesh()
    }

    /// The model currently owning this component, if it is still alive.
    pub fn model(&self) -> Option<Model> {
        self.model.borrow().as_ref().and_then(WeakModel::upgrade)
    }

    /// Whether `model` is the current owner.
    pub fn is_owned_by(&self, model: &Model) -> bool {
        self.model
            .borrow()
            .as_ref()
            .is_some_and(|owner| owner.points_to(model))
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    pub(crate) fn set_model(&self, model: Option<WeakModel>) {
        *self.model.borrow_mut() = model;
    }

    /// Marks the component destroyed. Returns `false` if it already was.
    fn begin_destroy(&self) -> bool {
        !self.destroyed.replace(true)
    }
}

impl fmt::Debug for ComponentCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentCore")
            .field("id", &self.id)
            .field("type_tag", &self.type_tag)
            .field("scene", &self.scene_id)
            .field("entity_type", &self.entity_type)
            .field("guid", &self.guid)
            .field("capabilities", &self.capabilities)
            .field("model", &self.model().map(|m| m.id().to_owned()))
            .field("destroyed", &self.destroyed.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A scene component that can be owned by a [`Model`].
///
/// Implementors only provide access to their [`ComponentCore`]; the hooks
/// default to doing nothing.
pub trait Component: fmt::Debug {
    fn core(&self) -> &ComponentCore;

    /// Downcast support for callers that know the concrete kind.
    fn as_any(&self) -> &dyn Any;

    /// Called after `model` has attached this component and set the owner
    /// back-reference. The model may be read from here.
    fn on_attached(&self, _model: &Model) {}

    /// Called once when the component is destroyed, before it is detached
    /// from its owner.
    fn on_destroy(&self) {}
}

impl dyn Component + '_ {
    pub fn id(&self) -> &str {
        self.core().id()
    }

    pub fn type_tag(&self) -> &str {
        self.core().type_tag()
    }

    pub fn scene_id(&self) -> SceneId {
        self.core().scene_id()
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.core().entity_type()
    }

    pub fn guid(&self) -> Option<&str> {
        self.core().guid()
    }

    pub fn is_object(&self) -> bool {
        self.core().is_object()
    }

    pub fn is_mesh(&self) -> bool {
        self.core().is_mesh()
    }

    pub fn model(&self) -> Option<Model> {
        self.core().model()
    }

    pub fn is_destroyed(&self) -> bool {
        self.core().is_destroyed()
    }

    pub fn downcast_ref<T: Component + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Tear the component down.
    ///
    /// Idempotent. Runs [`Component::on_destroy`], detaches the component
    /// from its owning model and drops it from the scene's id lookup.
    pub fn destroy(&self) {
        let core = self.core();
        if !core.begin_destroy() {
            return;
        }
        self.on_destroy();

        if let Some(owner) = core.model() {
            owner.remove(self);
        }
        core.set_model(None);

        if let Some(scene) = core.scene.upgrade() {
            scene.forget_component(core.id());
        }
        tracing::trace!(component = %core.id(), kind = %core.type_tag(), "component destroyed");
    }
}

/// Whether `shared` and `component` are the same instance.
pub(crate) fn same_instance(shared: &SharedComponent, component: &dyn Component) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(shared), component)
}

// ---------------------------------------------------------------------------
// ComponentSource
// ---------------------------------------------------------------------------

/// What [`Model::add`] accepts: an id to resolve through the scene, a config
/// to construct from, or a live component.
#[derive(Debug, Clone)]
pub enum ComponentSource {
    /// Resolved through [`SceneService::lookup`].
    Id(String),
    /// A JSON object with a `"type"` tag, built through the factory.
    Config(serde_json::Value),
    /// An already constructed component.
    Component(SharedComponent),
}

impl From<&str> for ComponentSource {
    fn from(id: &str) -> Self {
        ComponentSource::Id(id.to_owned())
    }
}

impl From<String> for ComponentSource {
    fn from(id: String) -> Self {
        ComponentSource::Id(id)
    }
}

impl From<&String> for ComponentSource {
    fn from(id: &String) -> Self {
        ComponentSource::Id(id.clone())
    }
}

macro_rules! numeric_id_source {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ComponentSource {
                fn from(id: $ty) -> Self {
                    ComponentSource::Id(id.to_string())
                }
            }
        )*
    };
}

numeric_id_source!(i32, i64, u32, u64, usize);

impl From<serde_json::Value> for ComponentSource {
    /// Strings and numbers are ids; anything else is a config.
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(id) => ComponentSource::Id(id),
            serde_json::Value::Number(n) => ComponentSource::Id(n.to_string()),
            config => ComponentSource::Config(config),
        }
    }
}

impl From<SharedComponent> for ComponentSource {
    fn from(component: SharedComponent) -> Self {
        ComponentSource::Component(component)
    }
}

impl From<&SharedComponent> for ComponentSource {
    fn from(component: &SharedComponent) -> Self {
        ComponentSource::Component(Rc::clone(component))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
