//! Prefab demo: builds a small turret tree, runs a few frames, then saves
//! the tree as a prefab document and instantiates a copy of it
//!
//! Usage: `prefab_demo [config.toml|config.ron]`

use citrus_core::foundation::logging;
use citrus_core::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Turret configuration
const TURRET_ROTATION_SPEED: f32 = 1.0; // Radians per second
const FIRE_INTERVAL: f64 = 0.05; // Seconds between shots
const SHOTS_BEFORE_STOP: u32 = 3;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Hull {
    current: u32,
    max: u32,
}

impl Element for Hull {
    fn load_document(&mut self, doc: &Value) -> Result<(), PayloadError> {
        *self = serde_json::from_value(doc.clone())?;
        Ok(())
    }

    fn save_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn render_gui(&self) -> Option<GuiGrouping> {
        Some(GuiGrouping::new("Hull").field("integrity", format!("{}/{}", self.current, self.max)))
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Turret {
    yaw: f32,
    shots: u32,
    #[serde(skip)]
    cooldown: f64,
}

impl Element for Turret {
    fn on_create(&mut self, ctx: &mut ElementContext<'_>) {
        log::info!("Turret online on entity {:?}", ctx.entities.name(ctx.entity));
    }

    fn load_document(&mut self, doc: &Value) -> Result<(), PayloadError> {
        *self = serde_json::from_value(doc.clone())?;
        Ok(())
    }

    fn save_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn action(&mut self, ctx: &mut ElementContext<'_>) {
        self.yaw += TURRET_ROTATION_SPEED * ctx.time_step as f32;
        self.cooldown -= ctx.time_step;
        if self.cooldown > 0.0 {
            return;
        }

        self.cooldown = FIRE_INTERVAL;
        self.shots += 1;
        log::info!("Frame {}: turret fired shot {} at yaw {:.2}", ctx.frame, self.shots, self.yaw);

        // Each shot leaves a short-lived shell entity behind
        ctx.commands.spawn(format!("Shell {}", self.shots), Some(ctx.entity));
        if self.shots >= SHOTS_BEFORE_STOP {
            ctx.commands.stop();
        }
    }

    fn render_gui(&self) -> Option<GuiGrouping> {
        Some(
            GuiGrouping::new("Turret")
                .field("yaw", format!("{:.2}", self.yaw))
                .field("shots", self.shots),
        )
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            ManagerConfig::load_from_file(&path)?
        }
        None => ManagerConfig::default(),
    };

    let mut manager = Manager::new(config)?;
    let hull = manager.register::<Hull>(KindDescriptor::new("Hull").with_capacity(16))?;
    let turret = manager.register::<Turret>(KindDescriptor::new("Turret").with_capacity(16))?;

    let frigate = manager.create("Frigate")?;
    let base = manager.create("Turret Base")?;
    let barrel = manager.create("Turret Barrel")?;
    manager.set_relation(frigate, base)?;
    manager.set_relation(base, barrel)?;
    manager.set_transform(base, Transform::from_position(Vec3::new(0.0, 0.5, -1.2)))?;
    manager.add_element_with_document(frigate, hull, serde_json::json!({ "current": 80, "max": 100 }))?;
    manager.add_element(barrel, turret)?;

    while !manager.stopped() {
        let report = manager.step();
        for err in &report.errors {
            log::error!("Frame {}: {}", manager.frame(), err);
        }
    }
    log::info!(
        "Stopped after {} frames ({:.2}s simulated), {} live entities",
        manager.frame(),
        manager.time(),
        manager.entities().live_count()
    );

    // Hold fire and drop the shells before saving the prefab
    manager.set_kind_enabled(turret.id(), false)?;
    let shells: Vec<Entity> = manager.entities().children(barrel)?.to_vec();
    for shell in shells {
        manager.destroy(shell)?;
    }
    manager.step();

    let prefab = manager.serialize_tree(frigate)?;
    println!("{}", serde_json::to_string_pretty(&prefab)?);

    let mut source = MemoryDocumentSource::new();
    source.insert_document("frigate.json", &prefab);
    let copy = manager.load_tree_from(&source, "frigate.json")?;
    manager.set_transform(copy, Transform::from_position(Vec3::new(10.0, 0.0, 0.0)))?;
    manager.flush_create();

    for (element, gui) in manager.render_gui() {
        let owner = manager.element_owner(element)?;
        log::info!("{} [{}]: {:?}", manager.entities().name(owner)?, gui.title, gui.fields);
    }

    Ok(())
}
