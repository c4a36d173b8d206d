//! Component construction by type tag.
//!
//! A [`ComponentFactory`] is a closed table of constructor functions keyed by
//! type tag. Models receive the factory explicitly; there is no global
//! name-to-constructor lookup. The factory parses the fields every kind
//! shares (`id`, `entityType`, `guid`) into a [`ComponentSeed`] and hands the
//! raw config to the kind's constructor for everything else.

use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::component::{Capabilities, ComponentCore, SharedComponent};
use crate::scene::{SceneId, SceneService};
use crate::{kinds, ModelError};

/// Type-erased constructor. Receives the parsed common fields and the full
/// config value; returns the new component or a description of what was
/// wrong with the config.
pub type ConstructorFn =
    Box<dyn Fn(ComponentSeed, &serde_json::Value) -> Result<SharedComponent, String>>;

// ---------------------------------------------------------------------------
// ComponentSeed
// ---------------------------------------------------------------------------

/// The common part of a component under construction.
///
/// Constructors turn it into a [`ComponentCore`] with the capability flags
/// of their kind.
pub struct ComponentSeed {
    id: String,
    type_tag: String,
    scene_id: SceneId,
    scene: Weak<dyn SceneService>,
    entity_type: Option<String>,
    guid: Option<String>,
}

impl ComponentSeed {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn into_core(self, capabilities: Capabilities) -> ComponentCore {
        ComponentCore::new(
            self.id,
            self.type_tag,
            self.scene_id,
            self.scene,
            self.entity_type,
            self.guid,
            capabilities,
        )
    }
}

impl fmt::Debug for ComponentSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSeed")
            .field("id", &self.id)
            .field("type_tag", &self.type_tag)
            .field("scene", &self.scene_id)
            .finish()
    }
}

/// Fields shared by every component config.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CommonConfig {
    #[serde(deserialize_with = "id_from_value")]
    id: Option<String>,
    entity_type: Option<String>,
    guid: Option<String>,
}

/// Ids may be given as JSON strings or numbers.
fn id_from_value<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(id)) => Ok(Some(id)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "component id must be a string or number, got {other}"
        ))),
    }
}

/// Empty classification strings count as unset.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// ComponentFactory
// ---------------------------------------------------------------------------

/// Constructor table keyed by type tag.
pub struct ComponentFactory {
    constructors: HashMap<String, ConstructorFn>,
}

impl ComponentFactory {
    /// Create a factory that knows no kinds.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Create a factory with `Node`, `Mesh`, `Geometry` and `Material`.
    pub fn with_builtin_kinds() -> Self {
        let mut factory = Self::new();
        kinds::register_builtin_kinds(&mut factory);
        factory
    }

    /// Register the constructor for `type_tag`, replacing any previous one.
    pub fn register<F>(&mut self, type_tag: &str, constructor: F)
    where
        F: Fn(ComponentSeed, &serde_json::Value) -> Result<SharedComponent, String> + 'static,
    {
        if self
            .constructors
            .insert(type_tag.to_owned(), Box::new(constructor))
            .is_some()
        {
            tracing::debug!(kind = %type_tag, "component constructor replaced");
        }
    }

    pub fn contains(&self, type_tag: &str) -> bool {
        self.constructors.contains_key(type_tag)
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Returns the registered type tags, sorted.
    pub fn registered_types(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.constructors.keys().map(|s| s.as_str()).collect();
        tags.sort();
        tags
    }

    /// Construct a component of kind `type_tag` in `scene` and register it
    /// with the scene's id lookup.
    ///
    /// When the config carries no `id`, the scene generates one.
    pub fn create(
        &self,
        type_tag: &str,
        scene: &Rc<dyn SceneService>,
        config: &serde_json::Value,
    ) -> Result<SharedComponent, ModelError> {
        let constructor =
            self.constructors
                .get(type_tag)
                .ok_or_else(|| ModelError::UnrecognizedType {
                    type_tag: type_tag.to_owned(),
                    registered: self.registered_types().join(", "),
                })?;

        let invalid = |details: String| ModelError::InvalidConfig {
            type_tag: type_tag.to_owned(),
            details,
        };

        let common = CommonConfig::deserialize(config).map_err(|e| invalid(e.to_string()))?;
        let id = match common.id {
            Some(id) if scene.lookup(&id).is_some() => {
                return Err(ModelError::DuplicateComponentId { id });
            }
            Some(id) => id,
            None => scene.next_component_id(),
        };

        let seed = ComponentSeed {
            id,
            type_tag: type_tag.to_owned(),
            scene_id: scene.id(),
            scene: Rc::downgrade(scene),
            entity_type: non_empty(common.entity_type),
            guid: non_empty(common.guid),
        };
        let component = constructor(seed, config).map_err(invalid)?;
        scene.register_component(Rc::clone(&component))?;

        tracing::trace!(component = %component.id(), kind = %type_tag, "component created");
        Ok(component)
    }
}

impl Default for ComponentFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentFactory")
            .field("kinds", &self.registered_types())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
