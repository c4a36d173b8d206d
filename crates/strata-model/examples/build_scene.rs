//! Builds a small scene, moves a component between two models and tears
//! everything down, logging through `tracing`.
//!
//! Run with: `RUST_LOG=strata_model=debug cargo run --example build_scene`

use serde_json::json;
use strata_model::prelude::*;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let scene = Scene::new(SceneConfig::default());
    let building = scene.create_model(ModelConfig {
        id: Some("building".to_owned()),
    });
    let annex = scene.create_model(ModelConfig {
        id: Some("annex".to_owned()),
    });

    building.try_add(json!({ "type": "Geometry", "id": "box", "primitive": "triangles" }))?;
    building.try_add(json!({ "type": "Material", "id": "concrete", "diffuse": [0.6, 0.6, 0.6] }))?;
    for (i, entity_type) in ["wall", "wall", "door", "slab"].iter().enumerate() {
        building.try_add(json!({
            "type": "Mesh",
            "id": format!("mesh-{i}"),
            "entityType": entity_type,
            "guid": format!("2O2Fr$t4X7Zf8NOew3FL{i:02}"),
            "geometryId": "box",
            "materialId": "concrete",
        }))?;
    }

    println!("building: {} components", building.num_components());
    println!("  entity types: {:?}", building.entity_type_ids());
    println!("  entities:     {:?}", building.entity_ids());

    // Unresolved ids and unknown types are reported, not fatal.
    let _ = building.add("no-such-id");
    let _ = building.add(json!({ "type": "Teapot" }));

    let door = annex.add("mesh-2").ok_or_else(|| anyhow::anyhow!("door did not move"))?;
    println!(
        "moved {} to {}; building now has {} components",
        door.id(),
        annex.id(),
        building.num_components()
    );

    scene.destroy();
    println!("after teardown: {} components in scene", scene.num_components());
    Ok(())
}
