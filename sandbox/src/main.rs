//! Headless host demonstrating the simulation core
//!
//! Flies a replicated vehicle past a cloud of debris in low Earth orbit. The
//! host keeps its own actors in a hecs world, applies gravity to them at a
//! fixed rate and shifts them whenever the origin is re-centered.

use farspace::core::constants::REFERENCE_BODIES;
use farspace::network::LoopbackEndpoint;
use farspace::prelude::*;
use std::error::Error;
use tracing::{info, warn};

const VEHICLE_ID: u32 = 1;
const CLIENT_PEER: u32 = 1;
const FRAMES: u32 = 1_800;
const PHYSICS_RATE_HZ: f64 = 60.0;

/// Host actor name, for log output
struct Name(String);

/// Single precision copy of the position, as a renderer would consume it
struct RenderPosition(Vec3);

/// Forwards re-centers to the network server and shifts host actors
struct HostBroadcaster<'a> {
    server: &'a mut NetworkServer<LoopbackEndpoint>,
    actors: &'a mut hecs::World,
}

impl RecenterBroadcaster for HostBroadcaster<'_> {
    fn broadcast_recenter(&mut self, event: &RecenterEvent) {
        let mut shifted = 0;
        for (_, body) in self.actors.query_mut::<&mut Rigidbody>() {
            body.position += event.delta;
            shifted += 1;
        }
        info!(epoch = event.epoch, shifted, "Shifted host actors");
        self.server.broadcast_recenter(event);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    farspace::init_logging();
    info!("Starting farspace sandbox");

    let config = match std::env::args().nth(1) {
        Some(path) => SimulationConfig::from_json_file(&path)?,
        None => SimulationConfig::default(),
    };
    let mut world = SimulationWorld::new(config.clone())?;

    // Earth sits below the player, the Moon further out
    let earth_offset = DVec3::new(0.0, -7.0e6, 0.0);
    let bodies: Vec<BodyHandle> = REFERENCE_BODIES
        .iter()
        .filter_map(|reference| match reference.name {
            "Earth" => Some(CelestialBody::from_reference(reference, earth_offset)),
            "Moon" => Some(CelestialBody::from_reference(
                reference,
                earth_offset + DVec3::new(3.844e8, 0.0, 0.0),
            )),
            _ => None,
        })
        .map(BodyHandle::new)
        .collect();
    for body in &bodies {
        world.register_body(body);
    }

    let mut actors = hecs::World::new();
    spawn_debris(&mut actors);

    let network = LoopbackNetwork::new(0x5eed).with_loss(0.05);
    let mut server = NetworkServer::new(
        network.endpoint(SERVER_PEER),
        config.network.clone(),
        config.origin.sector_size,
        world.safety().cloned(),
    );
    let initial = VehicleState::default();
    server.add_vehicle(VEHICLE_ID, CLIENT_PEER, 12_000.0, initial);

    let mut client = NetworkClient::new(
        network.endpoint(CLIENT_PEER),
        VEHICLE_ID,
        initial,
        &config.network,
        config.origin.sector_size,
        world.safety().cloned(),
    );

    let mut physics = TickAccumulator::with_rate(PHYSICS_RATE_HZ);
    let mut time = 0.0;

    for frame in 0..FRAMES {
        // Uneven frame times, as a real host would see
        let dt = if frame % 7 == 0 { 1.0 / 45.0 } else { 1.0 / 60.0 };
        time += dt;

        let thrust = Vec3::new(0.0, 0.0, if frame < 900 { 180.0 } else { 0.0 });
        let input = client.next_input(time, dt as f32, thrust, Vec3::new(0.0, 0.05, 0.0));
        client.predict_local(input);
        client.send_input_to_server(input)?;

        server.update(dt);

        for _ in 0..physics.accumulate(dt) {
            step_actors(&world, &mut actors, physics.fixed_timestep);
        }

        let player = server
            .vehicle(VEHICLE_ID)
            .map(|vehicle| vehicle.state().position)
            .unwrap_or_default();
        let mut host = HostBroadcaster {
            server: &mut server,
            actors: &mut actors,
        };
        world.tick(dt, player, Some(&mut host));

        for outcome in client.poll() {
            if let SnapshotOutcome::Applied(reconciliation) = outcome {
                if reconciliation.correction_strength > 0.0 {
                    warn!(
                        error = reconciliation.error,
                        strength = reconciliation.correction_strength,
                        "Client prediction corrected"
                    );
                }
            }
        }

        sync_render_positions(&mut actors);

        if frame % 300 == 0 {
            log_status(&world, &client, &actors, frame);
        }
    }

    info!(server = ?server.stats(), "Server summary");
    info!(client = ?client.stats(), "Client summary");
    info!(link = ?network.stats(), "Link summary");
    if let Some(safety) = world.safety() {
        info!(safety = ?safety.stats(), events = safety.event_count(), "Safety summary");
    }
    if let Some(gravity) = world.gravity() {
        info!(gravity = ?gravity.stats(), "Gravity summary");
    }

    world.shutdown();
    Ok(())
}

/// Scatter a few passive objects around the start position
fn spawn_debris(actors: &mut hecs::World) {
    for i in 0..6 {
        let angle = i as f64 / 6.0 * std::f64::consts::TAU;
        let position = DVec3::new(angle.cos() * 400.0, 0.0, angle.sin() * 400.0 + 2_000.0);
        let body = Rigidbody::dynamic(format!("debris-{i}"), 50.0 + 25.0 * i as f64)
            .with_position(position)
            .with_velocity(DVec3::new(0.0, 0.0, 150.0));
        let entity = actors.spawn((Name(body.name.clone()), body, RenderPosition(Vec3::ZERO)));
        info!("Created debris entity: {:?}", entity);
    }
}

fn step_actors(world: &SimulationWorld, actors: &mut hecs::World, dt: f64) {
    for (_, body) in actors.query_mut::<&mut Rigidbody>() {
        world.apply_gravity_to_actor(body, dt);
        body.apply_damping(dt);
        body.integrate(dt);
    }
}

fn sync_render_positions(actors: &mut hecs::World) {
    for (_, (body, render)) in actors.query_mut::<(&Rigidbody, &mut RenderPosition)>() {
        render.0 = body.position.as_vec3();
    }
}

fn log_status(
    world: &SimulationWorld,
    client: &NetworkClient<LoopbackEndpoint>,
    actors: &hecs::World,
    frame: u32,
) {
    let Some(origin) = world.origin() else {
        return;
    };
    let local = client.vehicle().position();
    info!(
        frame,
        epoch = origin.epoch(),
        sector = %origin.player_virtual_position().describe(origin.config().sector_size),
        "Player local={:.1?} world={:.1?}",
        local,
        origin.local_to_world(local)
    );

    let mut query = actors.query::<(&Name, &RenderPosition)>();
    if let Some((_, (name, render))) = query.iter().next() {
        info!(actor = %name.0, position = ?render.0, "First debris render position");
    }
}
