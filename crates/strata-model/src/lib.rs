//! Strata Model -- component registry for a 3D scene graph.
//!
//! A [`Model`](model::Model) owns a heterogeneous set of scene components and
//! keeps several derived indices over them in sync: by id, by type tag, by
//! object/mesh capability, by entity classification and by GUID. Components
//! are created through an injected [`ComponentFactory`](factory::ComponentFactory)
//! and resolved by id through a [`SceneService`](scene::SceneService).
//!
//! # Quick Start
//!
//! ```
//! use strata_model::prelude::*;
//! use serde_json::json;
//!
//! let scene = Scene::new(SceneConfig::default());
//! let model = scene.create_model(ModelConfig::default());
//!
//! let wall = model
//!     .add(json!({ "type": "Node", "id": "wall1", "entityType": "wall" }))
//!     .unwrap();
//! model.add(json!({ "type": "Mesh", "id": "m1", "geometryId": "box" }));
//!
//! assert!(wall.model().is_some_and(|owner| owner == model));
//! assert_eq!(model.num_components(), 2);
//! assert_eq!(&*model.entity_ids(), ["wall1"]);
//! assert_eq!(model.meshes().len(), 1);
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod factory;
pub mod kinds;
pub mod model;
pub mod scene;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by registry, factory and scene operations.
///
/// None of these are fatal: [`Model::add`](model::Model::add) logs them and
/// returns `None`, leaving every index untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// An id passed to `add` matches no component known to the scene.
    #[error("no component with id '{id}' is known to the scene")]
    UnresolvedReference { id: String },

    /// A component config named a type tag with no registered constructor.
    #[error("unrecognized component type '{type_tag}'. Registered types: [{registered}]")]
    UnrecognizedType { type_tag: String, registered: String },

    /// The component lives in a different scene than the model.
    #[error("component '{component}' belongs to {component_scene}, but the model belongs to {model_scene}")]
    ScopeMismatch {
        component: String,
        component_scene: scene::SceneId,
        model_scene: scene::SceneId,
    },

    /// Another object attached in the same scene already carries this GUID.
    #[error("guid '{guid}' is already held by '{existing}', cannot attach '{incoming}'")]
    DuplicateGuid {
        guid: String,
        existing: String,
        incoming: String,
    },

    /// A new component asked for an id that is already taken in the scene.
    #[error("component id '{id}' is already in use in this scene")]
    DuplicateComponentId { id: String },

    /// The component has already been torn down.
    #[error("component '{id}' has been destroyed")]
    DestroyedComponent { id: String },

    /// The model has been destroyed and no longer accepts components.
    #[error("model '{model}' has been destroyed")]
    ModelDestroyed { model: String },

    /// A component config could not be parsed for its type.
    #[error("invalid config for component type '{type_tag}': {details}")]
    InvalidConfig { type_tag: String, details: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{
        Capabilities, Component, ComponentCore, ComponentSource, SharedComponent,
    };
    pub use crate::factory::{ComponentFactory, ComponentSeed, ConstructorFn};
    pub use crate::kinds::{Geometry, Material, Mesh, Node};
    pub use crate::model::{AddOutcome, Model, ModelConfig, WeakModel};
    pub use crate::scene::{Scene, SceneConfig, SceneId, SceneService};
    pub use crate::ModelError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
