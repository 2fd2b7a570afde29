//! Headless simulation: a handful of orbiting bodies driven by the frame loop.
//!
//! Run with: `cargo run -p orrery-engine --example headless_loop [config.json]`
//!
//! Set `RUST_LOG=orrery_ecs=debug` to see registration and lifecycle logs.

use orrery_engine::prelude::*;
use tracing::info;

// ---------------------------------------------------------------------------
// Components and resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Orbit {
    radius: f64,
    /// Radians per second.
    speed: f64,
    angle: f64,
}
impl Component for Orbit {}

#[derive(Debug, Clone, PartialEq)]
struct Position {
    x: f64,
    y: f64,
}
impl Component for Position {}

#[derive(Debug, Clone)]
struct Name(&'static str);
impl Component for Name {}

#[derive(Debug, Default)]
struct SimTime {
    seconds: f64,
}
impl Resource for SimTime {}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

struct AdvanceOrbits;
impl System for AdvanceOrbits {
    fn on_update(&mut self, world: &mut World, delta_time: f64) -> HookResult {
        let seconds = delta_time / 1000.0;
        world.get_resource_mut::<SimTime>()?.seconds += seconds;
        for (_, orbit) in world.query_mut::<Orbit>() {
            orbit.angle = (orbit.angle + orbit.speed * seconds) % std::f64::consts::TAU;
        }
        Ok(())
    }
}

struct PlaceBodies;
impl System for PlaceBodies {
    fn ordering(order: &mut SystemOrdering) {
        order.after::<AdvanceOrbits>();
    }

    fn on_update(&mut self, world: &mut World, _delta_time: f64) -> HookResult {
        for (_, (orbit, pos)) in world.query_all_mut::<(Orbit, Position)>() {
            pos.x = orbit.radius * orbit.angle.cos();
            pos.y = orbit.radius * orbit.angle.sin();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Plugins
// ---------------------------------------------------------------------------

#[derive(Default)]
struct TimePlugin;
impl Plugin for TimePlugin {
    fn build(&mut self, world: &mut World) -> HookResult {
        world.add_resource(SimTime::default())?;
        Ok(())
    }
}

#[derive(Default)]
struct OrbitPlugin;
impl Plugin for OrbitPlugin {
    fn dependencies(&self) -> Vec<PluginDependency> {
        vec![PluginDependency::of::<TimePlugin>()]
    }

    fn build(&mut self, world: &mut World) -> HookResult {
        world.register_components::<(Orbit, Position, Name)>();
        world.add_system(PlaceBodies)?;
        world.add_system(AdvanceOrbits)?;
        Ok(())
    }

    fn cleanup(&mut self, world: &mut World) -> HookResult {
        info!(bodies = world.query::<Orbit>().count(), "orbit plugin cleanup");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<(), anyhow::Error> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };
    init_tracing(&config.log_filter);

    let scheduler = HeadlessScheduler::from_config(&config.frame);
    let mut frames = FrameLoop::from_config(&config, scheduler)?;

    let world = frames.world_mut();
    world.add_plugin(OrbitPlugin)?;
    for (name, radius, speed) in [("inner", 1.0, 2.0), ("middle", 2.5, 1.0), ("outer", 6.0, 0.25)] {
        world.spawn((
            Name(name),
            Orbit {
                radius,
                speed,
                angle: 0.0,
            },
            Position { x: radius, y: 0.0 },
        ))?;
    }
    info!(order = ?world.system_order()?, "system order");

    frames.start(None)?;
    let ran = frames.run_frames(600)?;

    let world = frames.world();
    println!(
        "ran {ran} frames, {:.2}s simulated",
        world.get_resource::<SimTime>()?.seconds
    );
    let mut bodies = world.query_all::<(Name, Position)>();
    while let Some(item) = bodies.next() {
        let (name, pos) = item.components();
        println!("{:>8}: ({:>6.2}, {:>6.2})", name.0, pos.x, pos.y);
    }

    frames.dispose()?;
    Ok(())
}
