//! Headless demo host
//!
//! Exercises the embedding contract end to end: build a scene, drive
//! frames with a fixed delta, extract render views for a stub backend, and
//! tear everything down with a clear.

use stagecraft::prelude::*;

/// Spins its entity around the Y axis.
struct Spinner {
    speed: f32,
}

impl Behavior for Spinner {
    fn name(&self) -> &'static str {
        "Spinner"
    }

    fn on_tick(&mut self, ctx: &mut Context) {
        let transform = ctx.transform;
        let angle = self.speed * ctx.time().delta();
        ctx.scene
            .world_mut()
            .rotate(transform, Quat::from_rotation_y(angle));
    }
}

/// Toggles its renderable's visibility on a repeating timer.
struct Blinker;

impl Behavior for Blinker {
    fn name(&self) -> &'static str {
        "Blinker"
    }

    fn on_first_tick(&mut self, ctx: &mut Context) {
        let this = ctx.this;
        ctx.scene.invoke_repeating(this, "blink", 0.5, 0.5);
    }

    fn on_invoke(&mut self, method: &str, ctx: &mut Context) -> bool {
        if method != "blink" {
            return false;
        }
        let entity = ctx.entity;
        if let Some(component) = ctx.world().renderable_on(entity)
            && let Some(renderable) = ctx.world_mut().renderable_mut(component)
        {
            renderable.visible = !renderable.visible;
        }
        true
    }
}

/// Spawns a short-lived flare every second.
struct FlareWave {
    remaining: u32,
}

impl Sequence for FlareWave {
    fn resume(&mut self, ctx: &mut Context) -> Step {
        if self.remaining == 0 {
            return Step::Done;
        }
        self.remaining -= 1;
        let flare = ctx.scene.create_entity(format!("flare-{}", self.remaining));
        if let Some(transform) = ctx.world().transform_of(flare) {
            ctx.scene
                .world_mut()
                .translate(transform, Vec3::new(0.0, 1.5, 0.0));
        }
        ctx.scene
            .add_renderable(flare, Renderable::new(MeshId(2), MaterialId(2)));
        ctx.scene.destroy_after(flare, 1.5);
        log::info!("flare launched ({} left)", self.remaining);
        Step::Yield(Wait::seconds(1.0))
    }
}

/// Kicks off the flare coroutine once the scene is running.
struct Launcher;

impl Behavior for Launcher {
    fn name(&self) -> &'static str {
        "Launcher"
    }

    fn on_first_tick(&mut self, ctx: &mut Context) {
        let this = ctx.this;
        ctx.scene.start_coroutine(this, FlareWave { remaining: 3 });
    }
}

fn main() {
    env_logger::init();

    let mut scene = Scene::with_config(SceneConfig::default().with_name("demo"));
    log::info!("starting scene `{}`", scene.config().name);

    let pivot = scene.create_entity("pivot");
    scene.add_behavior(pivot, Spinner { speed: 1.0 });
    scene.add_behavior(pivot, Launcher);

    let satellite = scene.create_entity("satellite");
    let pivot_transform = scene
        .world()
        .transform_of(pivot)
        .expect("pivot has a transform");
    let satellite_transform = scene
        .world()
        .transform_of(satellite)
        .expect("satellite has a transform");
    scene.set_parent(satellite_transform, Some(pivot_transform), false);
    scene
        .world_mut()
        .translate(satellite_transform, Vec3::new(2.0, 0.0, 0.0));
    scene.add_renderable(satellite, Renderable::new(MeshId(1), MaterialId(1)));
    scene.add_behavior(satellite, Blinker);

    let dt = 1.0 / 60.0;
    for frame in 0..240u32 {
        scene.tick(dt);
        if frame % 3 == 0 {
            scene.fixed_tick();
        }
        if frame % 60 == 0 {
            let views = scene.render_views();
            let position = scene
                .world()
                .world_position(satellite_transform)
                .unwrap_or_default();
            log::info!(
                "frame {frame}: {} entities, {} views, satellite at {position}",
                scene.entity_count(),
                views.len(),
            );
        }
    }

    scene.clear();
    log::info!("scene cleared: {} entities remain", scene.entity_count());
}
