pub mod broadcast;
pub mod client;
pub mod config;
pub mod control;
pub mod delta;
pub mod host;
pub mod monitor;
pub mod quant;
pub mod server;
pub mod snapshot;
pub mod stats;
pub mod wire;
pub mod zone;

pub use broadcast::{BroadcastConfig, BroadcastError, DataCache, DataClass, DataHub, Outbound};
pub use client::{ClientConfig, HistoryBuffer, ReplicationClient, SampleMode, StatePoint};
pub use config::{ConfigError, ReplicationConfig, ServerConfig};
pub use control::{ControlError, ControlMessage};
pub use delta::{Delta, DeltaMask, DeltaThresholds, first_contact, make_delta};
pub use host::{EntitySource, ObserverId, PeerConnection, RenderScene, Transform, TransportError};
pub use monitor::{MonitorConfig, PerformanceMonitor};
pub use quant::QuantizationConfig;
pub use server::{
    BaselineConfig, BaselineTable, FixedTimestep, ProfileTable, ReplicationServer, TickProfile,
};
pub use snapshot::{EntityId, Snapshot};
pub use stats::{ClientStats, ServerStats};
pub use wire::{DeltaBatchReader, DeltaBatchWriter, DeltaRecord, WireError};
pub use zone::{InterestZones, Zone, ZoneConfig, ZoneTable};
