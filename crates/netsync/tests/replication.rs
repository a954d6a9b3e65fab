use std::collections::HashMap;

use bytes::Bytes;
use glam::{Quat, Vec3};

use netsync::client::sample;
use netsync::{
    DeltaBatchReader, DeltaMask, DeltaRecord, EntityId, ObserverId, PeerConnection,
    ProfileTable, QuantizationConfig, ReplicationClient, ReplicationConfig, ReplicationServer,
    SampleMode, Snapshot, TickProfile, Transform, TransportError,
};

struct LoopbackPeer {
    id: ObserverId,
    position: Vec3,
    connected: bool,
    inbox: Vec<Bytes>,
}

impl LoopbackPeer {
    fn new(id: u64) -> Self {
        Self {
            id: ObserverId(id),
            position: Vec3::ZERO,
            connected: true,
            inbox: Vec::new(),
        }
    }
}

impl PeerConnection for LoopbackPeer {
    fn observer_id(&self) -> ObserverId {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn reference_position(&self) -> Vec3 {
        self.position
    }

    fn send(&mut self, batch: Bytes) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        self.inbox.push(batch);
        Ok(())
    }
}

fn config() -> ReplicationConfig {
    let mut config = ReplicationConfig::default();
    config.server.adaptive = false;
    config
}

fn one_tick(server: &ReplicationServer) -> f32 {
    server.profile().tick_interval() + 1e-4
}

fn records(batch: &Bytes) -> Vec<DeltaRecord> {
    DeltaBatchReader::new(batch, QuantizationConfig::default())
        .collect::<Result<_, _>>()
        .unwrap()
}

fn entity(n: u32) -> EntityId {
    EntityId::new(1000, n)
}

#[test]
fn moving_entity_is_interpolated_on_the_client() {
    let mut server = ReplicationServer::new(config()).unwrap();
    let mut client = ReplicationClient::from_config(server.config());
    let mut peers = vec![LoopbackPeer::new(1)];
    let id = entity(1);
    let step = one_tick(&server);

    let mut world = HashMap::from([(id, Snapshot::new(Vec3::ZERO, Quat::IDENTITY).with_health(100))]);
    assert_eq!(server.advance(step, &world, &mut peers), 1);
    assert_eq!(peers[0].inbox.len(), 1);
    let first = records(&peers[0].inbox[0]);
    assert!(first[0].delta.mask.contains(DeltaMask::POSITION | DeltaMask::HEALTH));
    client.receive_batch(&peers[0].inbox[0], 0.0);
    assert_eq!(client.history(id).map(|h| h.len()), Some(1));

    world.insert(id, Snapshot::new(Vec3::X, Quat::IDENTITY).with_health(100));
    server.advance(step, &world, &mut peers);
    assert_eq!(peers[0].inbox.len(), 2);
    let second = records(&peers[0].inbox[1]);
    assert_eq!(second[0].delta.mask, DeltaMask::POSITION);
    client.receive_batch(&peers[0].inbox[1], 0.1);
    assert_eq!(client.history(id).map(|h| h.len()), Some(2));

    // now - delay = 0.05, halfway between the two receive times
    let now = 0.17;
    let history = client.history(id).unwrap();
    let target = now - client.config().interpolation_delay;
    let predicted = sample(history, target, client.config()).unwrap();
    assert_eq!(predicted.mode, SampleMode::Interpolated);
    let p = predicted.target.position;
    assert!(p.x > 0.0 && p.x < 1.0);
    assert!((p.x - 0.5).abs() < 1e-3);
    assert!(p.y.abs() < 1e-6 && p.z.abs() < 1e-6);

    let mut scene = HashMap::from([(id, Transform::default())]);
    client.reconcile(now, 0.016, &mut scene);
    let rendered = scene[&id].position;
    assert!(rendered.x > 0.0 && rendered.x < p.x);
    assert!(rendered.y.abs() < 1e-6 && rendered.z.abs() < 1e-6);
    assert_eq!(client.stats().interpolated, 1);
}

#[test]
fn full_resync_forces_a_push_for_unchanged_entities() {
    let mut server = ReplicationServer::new(config()).unwrap();
    let mut peers = vec![LoopbackPeer::new(1)];
    let world: Vec<(EntityId, Snapshot)> = (1..=3)
        .map(|n| (entity(n), Snapshot::new(Vec3::splat(n as f32), Quat::IDENTITY)))
        .collect();
    let step = one_tick(&server);

    server.advance(step, &world, &mut peers);
    assert_eq!(records(&peers[0].inbox[0]).len(), 3);
    server.advance(step, &world, &mut peers);
    assert_eq!(peers[0].inbox.len(), 1);

    server.request_full_resync(None);
    assert_eq!(server.baseline_count(ObserverId(1)), 0);
    server.advance(step, &world, &mut peers);

    assert_eq!(peers[0].inbox.len(), 2);
    let resent = records(&peers[0].inbox[1]);
    assert_eq!(resent.len(), 3);
    assert!(resent.iter().all(|r| r.delta.has_any()));
    assert!(resent.iter().any(|r| r.id == entity(1)));
}

#[test]
fn resync_repairs_fields_zeroed_in_a_lost_batch() {
    let mut server = ReplicationServer::new(config()).unwrap();
    let mut client = ReplicationClient::from_config(server.config());
    let mut peers = vec![LoopbackPeer::new(1)];
    let id = entity(1);
    let step = one_tick(&server);

    let alive = Snapshot::new(Vec3::ZERO, Quat::IDENTITY)
        .with_velocity(Vec3::X)
        .with_health(50)
        .with_flags(4);
    server.advance(step, &vec![(id, alive)], &mut peers);
    client.receive_batch(&peers[0].inbox[0], 0.0);

    // The batch carrying the zeroed fields never reaches the client.
    let dead = Snapshot::new(Vec3::ZERO, Quat::IDENTITY);
    server.advance(step, &vec![(id, dead)], &mut peers);
    assert_eq!(peers[0].inbox.len(), 2);

    server.request_full_resync(Some(ObserverId(1)));
    server.advance(step, &vec![(id, dead)], &mut peers);
    assert_eq!(peers[0].inbox.len(), 3);
    client.receive_batch(&peers[0].inbox[2], 0.1);

    let state = client.history(id).unwrap().try_get_last().unwrap().state;
    assert_eq!(state.health, 0);
    assert_eq!(state.flags, 0);
    assert_eq!(state.velocity, Vec3::ZERO);
}

#[test]
fn observers_are_serviced_round_robin() {
    let mut config = config();
    config.profiles = ProfileTable::new(vec![TickProfile::new(0, 30, 2, 4, 2, 512)]).unwrap();
    let mut server = ReplicationServer::new(config).unwrap();
    let mut peers: Vec<LoopbackPeer> = (0..5).map(LoopbackPeer::new).collect();
    peers[2].connected = false;
    let step = one_tick(&server);

    for tick in 0..4 {
        let world = vec![(
            entity(1),
            Snapshot::new(Vec3::new(tick as f32, 0.0, 0.0), Quat::IDENTITY),
        )];
        server.advance(step, &world, &mut peers);
    }

    let counts: Vec<usize> = peers.iter().map(|p| p.inbox.len()).collect();
    assert_eq!(counts, vec![2, 2, 0, 2, 2]);
}

#[test]
fn each_observer_diffs_against_what_it_received() {
    let mut config = config();
    config.profiles = ProfileTable::new(vec![TickProfile::new(0, 30, 2, 4, 1, 512)]).unwrap();
    let mut server = ReplicationServer::new(config).unwrap();
    let mut peers = vec![LoopbackPeer::new(1), LoopbackPeer::new(2)];
    let id = entity(7);
    let step = one_tick(&server);

    let at = |x: f32| vec![(id, Snapshot::new(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY))];

    server.advance(step, &at(0.0), &mut peers);
    server.advance(step, &at(1.0), &mut peers);
    server.advance(step, &at(1.0), &mut peers);

    assert_eq!(peers[0].inbox.len(), 2);
    assert_eq!(peers[1].inbox.len(), 1);
    let catch_up = records(&peers[0].inbox[1]);
    assert_eq!(catch_up[0].delta.mask, DeltaMask::POSITION);
    assert!((catch_up[0].delta.state.position.x - 1.0).abs() < 0.01);
}

#[test]
fn corrupted_batch_applies_leading_records_only() {
    let mut server = ReplicationServer::new(config()).unwrap();
    let mut client = ReplicationClient::from_config(server.config());
    let mut peers = vec![LoopbackPeer::new(1)];
    let world: Vec<(EntityId, Snapshot)> = (1..=3)
        .map(|n| (entity(n), Snapshot::new(Vec3::splat(n as f32), Quat::IDENTITY)))
        .collect();

    server.advance(one_tick(&server), &world, &mut peers);
    let batch = &peers[0].inbox[0];
    let first_len = netsync::wire::record_len(records(batch)[0].delta.mask);
    let mut corrupted = batch.to_vec();
    corrupted[first_len + 12] = 0xFF;

    assert_eq!(client.receive_batch(&corrupted, 0.0), 1);
    assert_eq!(client.tracked_entities(), 1);
    assert_eq!(client.stats().malformed_batches, 1);
}
