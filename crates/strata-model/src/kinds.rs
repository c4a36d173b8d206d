//! Built-in component kinds.
//!
//! | type tag   | object | mesh |
//! |------------|--------|------|
//! | `Node`     | yes    | no   |
//! | `Mesh`     | yes    | yes  |
//! | `Geometry` | no     | no   |
//! | `Material` | no     | no   |

use std::any::Any;
use std::rc::Rc;

use serde::Deserialize;

use crate::component::{Capabilities, Component, ComponentCore, SharedComponent};
use crate::factory::{ComponentFactory, ComponentSeed};

pub const NODE: &str = "Node";
pub const MESH: &str = "Mesh";
pub const GEOMETRY: &str = "Geometry";
pub const MATERIAL: &str = "Material";

/// Register every built-in kind with `factory`.
pub fn register_builtin_kinds(factory: &mut ComponentFactory) {
    factory.register(NODE, Node::construct);
    factory.register(MESH, Mesh::construct);
    factory.register(GEOMETRY, Geometry::construct);
    factory.register(MATERIAL, Material::construct);
}

fn parse<T: for<'de> Deserialize<'de>>(config: &serde_json::Value) -> Result<T, String> {
    T::deserialize(config).map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A classifiable scene object with no geometry of its own.
#[derive(Debug)]
pub struct Node {
    core: ComponentCore,
}

impl Node {
    pub fn from_core(core: ComponentCore) -> Self {
        Self { core }
    }

    fn construct(
        seed: ComponentSeed,
        _config: &serde_json::Value,
    ) -> Result<SharedComponent, String> {
        Ok(Rc::new(Self::from_core(seed.into_core(Capabilities::OBJECT))))
    }
}

impl Component for Node {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Mesh
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MeshConfig {
    geometry_id: Option<String>,
    material_id: Option<String>,
}

/// Renderable object pairing a geometry with a material, both by id.
#[derive(Debug)]
pub struct Mesh {
    core: ComponentCore,
    geometry_id: Option<String>,
    material_id: Option<String>,
}

impl Mesh {
    fn construct(seed: ComponentSeed, config: &serde_json::Value) -> Result<SharedComponent, String> {
        let MeshConfig {
            geometry_id,
            material_id,
        } = parse(config)?;
        Ok(Rc::new(Self {
            core: seed.into_core(Capabilities::MESH),
            geometry_id,
            material_id,
        }))
    }

    pub fn geometry_id(&self) -> Option<&str> {
        self.geometry_id.as_deref()
    }

    pub fn material_id(&self) -> Option<&str> {
        self.material_id.as_deref()
    }
}

impl Component for Mesh {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeometryConfig {
    primitive: String,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            primitive: "triangles".to_owned(),
        }
    }
}

#[derive(Debug)]
pub struct Geometry {
    core: ComponentCore,
    primitive: String,
}

impl Geometry {
    fn construct(seed: ComponentSeed, config: &serde_json::Value) -> Result<SharedComponent, String> {
        let GeometryConfig { primitive } = parse(config)?;
        Ok(Rc::new(Self {
            core: seed.into_core(Capabilities::PLAIN),
            primitive,
        }))
    }

    /// Primitive topology, `"triangles"` unless configured.
    pub fn primitive(&self) -> &str {
        &self.primitive
    }
}

impl Component for Geometry {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Material
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MaterialConfig {
    diffuse: [f32; 3],
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            diffuse: [1.0, 1.0, 1.0],
        }
    }
}

#[derive(Debug)]
pub struct Material {
    core: ComponentCore,
    diffuse: [f32; 3],
}

impl Material {
    fn construct(seed: ComponentSeed, config: &serde_json::Value) -> Result<SharedComponent, String> {
        let MaterialConfig { diffuse } = parse(config)?;
        Ok(Rc::new(Self {
            core: seed.into_core(Capabilities::PLAIN),
            diffuse,
        }))
    }

    /// Diffuse RGB, white unless configured.
    pub fn diffuse(&self) -> [f32; 3] {
        self.diffuse
    }
}

impl Component for Material {
    fn core(&self) -> &ComponentCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
