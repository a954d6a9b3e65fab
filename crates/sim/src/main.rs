mod loopback;
mod world;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use glam::Vec3;

use netsync::{
    ControlMessage, DataCache, DataHub, EntityId, ObserverId, PeerConnection, ReplicationClient,
    ReplicationConfig, ReplicationServer, Transform,
};

use loopback::{LinkConditions, LoopbackPeer};
use world::SyntheticWorld;

const WORLD_CLOCK_KEY: &str = "World_Clock";

#[derive(Parser)]
#[command(name = "netsync-sim")]
#[command(about = "Headless delta-replication harness")]
struct Args {
    #[arg(short, long, help = "TOML file overriding replication settings")]
    config: Option<PathBuf>,

    #[arg(short, long, default_value_t = 12)]
    observers: usize,

    #[arg(short, long, default_value_t = 200)]
    entities: usize,

    #[arg(short, long, default_value_t = 10.0, help = "Simulated seconds")]
    duration: f64,

    #[arg(long, default_value_t = 60)]
    fps: u32,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 30, help = "One-way latency in ms")]
    latency: u32,

    #[arg(long, default_value_t = 10, help = "Jitter in ms")]
    jitter: u32,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    #[arg(long, help = "Disconnect and reconnect observer 0 mid-run")]
    churn: bool,

    #[arg(long, help = "Print the effective configuration as TOML and exit")]
    dump_config: bool,
}

struct Observer {
    client: ReplicationClient,
    cache: DataCache,
    scene: HashMap<EntityId, Transform>,
    orbit: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    if args.dump_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let mut server = ReplicationServer::new(config.clone())?;
    let mut hub = DataHub::new(config.broadcast.clone());
    let mut world = SyntheticWorld::new(args.entities, config.zones.far_radius * 1.3, args.seed);

    let conditions = LinkConditions {
        loss_percent: args.loss_percent,
        latency: args.latency as f64 / 1000.0,
        jitter: args.jitter as f64 / 1000.0,
    };

    let mut peers = Vec::with_capacity(args.observers);
    let mut observers = Vec::with_capacity(args.observers);
    for i in 0..args.observers {
        let id = ObserverId(i as u64 + 1);
        let orbit = std::f32::consts::TAU * i as f32 / args.observers.max(1) as f32;
        peers.push(LoopbackPeer::new(id, orbit_position(orbit, 0.0), conditions, args.seed ^ id.0));
        server.observer_connected(id);

        let mut observer = Observer {
            client: ReplicationClient::from_config(&config),
            cache: DataCache::new(config.broadcast.clone()),
            scene: HashMap::new(),
            orbit,
        };
        if let Some(message) = observer.cache.subscribe(WORLD_CLOCK_KEY) {
            deliver_to_server(&mut server, &mut hub, id, &message)?;
        }
        observers.push(observer);
    }

    log::info!(
        "simulating {} observers, {} entities for {:.1}s at {} fps",
        args.observers,
        world.len(),
        args.duration,
        args.fps
    );

    let fps = args.fps.max(1);
    let dt = 1.0 / fps as f32;
    let frames = (args.duration * fps as f64).round() as u64;
    let churn_at = (frames / 3, 2 * frames / 3);
    let mut error_sum = 0.0f64;
    let mut error_samples = 0u64;

    for frame in 0..frames {
        let now = frame as f64 * dt as f64;
        world.step(dt);

        for (peer, observer) in peers.iter_mut().zip(&observers) {
            peer.position = orbit_position(observer.orbit, now as f32);
            peer.set_clock(now);
        }

        if args.churn && !peers.is_empty() {
            let id = peers[0].observer_id();
            if frame == churn_at.0 {
                peers[0].set_connected(false);
                server.observer_disconnected(id);
                hub.remove_observer(id);
                observers[0].client.on_disconnect();
                observers[0].cache.clear();
                observers[0].scene.clear();
            } else if frame == churn_at.1 {
                peers[0].set_connected(true);
                server.observer_connected(id);
                observers[0].client.on_reconnect();
                deliver_to_server(&mut server, &mut hub, id, &ControlMessage::RequestFullSync)?;
                if let Some(message) = observers[0].cache.subscribe(WORLD_CLOCK_KEY) {
                    deliver_to_server(&mut server, &mut hub, id, &message)?;
                }
            }
        }

        server.advance(dt, &world, &mut peers);

        if frame % fps as u64 == 0 {
            let clock = Bytes::copy_from_slice(&now.to_le_bytes());
            if let Err(e) = hub.store(WORLD_CLOCK_KEY, clock) {
                log::warn!("{e}");
            }
        }
        for outbound in hub.poll(now) {
            let index = (outbound.to.0 - 1) as usize;
            if let Some(observer) = observers.get_mut(index) {
                let bytes = outbound.message.encode()?;
                let message = ControlMessage::decode(&bytes)?;
                observer.cache.receive(&message)?;
            }
        }

        for (peer, observer) in peers.iter_mut().zip(observers.iter_mut()) {
            for batch in peer.drain(now) {
                observer.client.receive_batch(&batch, now);
            }
            for id in observer.client.tracked() {
                observer.scene.entry(id).or_default();
            }
            observer.client.reconcile(now, dt, &mut observer.scene);
        }

        if let Some(first) = observers.first() {
            for (id, transform) in &first.scene {
                if let Some(truth) = world.position(*id) {
                    error_sum += transform.position.distance(truth) as f64;
                    error_samples += 1;
                }
            }
        }
    }

    report(&server, &peers, &observers, error_sum, error_samples);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ReplicationConfig> {
    let Some(path) = path else {
        return Ok(ReplicationConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: ReplicationConfig =
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
    config.validate()?;
    log::info!("loaded config from {}", path.display());
    Ok(config)
}

fn orbit_position(phase: f32, time: f32) -> Vec3 {
    let angle = phase + time * 0.05;
    Vec3::new(angle.cos(), 0.0, angle.sin()) * 60.0
}

/// Control messages travel encoded, like they would over a real link.
fn deliver_to_server(
    server: &mut ReplicationServer,
    hub: &mut DataHub,
    from: ObserverId,
    message: &ControlMessage,
) -> Result<()> {
    let bytes = message.encode()?;
    let message = ControlMessage::decode(&bytes)?;
    match message {
        ControlMessage::RequestFullSync => server.request_full_resync(Some(from)),
        other => {
            if let Some(reply) = hub.handle(from, &other)? {
                log::debug!("direct reply to {} pending delivery", reply.to);
            }
        }
    }
    Ok(())
}

fn report(
    server: &ReplicationServer,
    peers: &[LoopbackPeer],
    observers: &[Observer],
    error_sum: f64,
    error_samples: u64,
) {
    let stats = server.stats();
    log::info!(
        "server: {} ticks ({} dropped), {} batches, {} records, {:.1} KiB, avg batch {:.0} B",
        stats.ticks_run,
        stats.ticks_dropped,
        stats.batches_sent,
        stats.records_written,
        stats.bytes_sent as f64 / 1024.0,
        stats.average_batch_bytes()
    );
    log::info!(
        "server: profile {} at {} Hz, {} budget deferrals, {} baselines evicted, {} send failures",
        stats.profile_index,
        stats.tick_rate_hz,
        stats.budget_deferrals,
        stats.baselines_evicted,
        stats.send_failures
    );

    let lost: u64 = peers.iter().map(|p| p.dropped).sum();
    let sent: u64 = peers.iter().map(|p| p.sent).sum();
    log::info!("transport: {sent} batches handed over, {lost} lost");

    if let Some(first) = observers.first() {
        let client = first.client.stats();
        log::info!(
            "observer 1: tracking {} entities, {} interpolated / {} extrapolated last frame, {} malformed batches",
            client.tracked_entities,
            client.interpolated,
            client.extrapolated,
            client.malformed_batches
        );
        if let Some(clock) = first.cache.get(WORLD_CLOCK_KEY) {
            log::info!("observer 1: last world clock payload {} bytes", clock.len());
        }
    }
    if error_samples > 0 {
        log::info!(
            "observer 1: mean render error {:.3} units over {error_samples} samples",
            error_sum / error_samples as f64
        );
    }
}
