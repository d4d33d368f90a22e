//! Floating-origin space simulation core
//!
//! This crate provides the services a host engine needs to fly at solar
//! system scale: a celestial body registry, distance based scaling, gravity,
//! precision and desync safety checks, origin re-centering and vehicle
//! replication with client prediction.

pub mod celestial;
pub mod config;
pub mod core;
pub mod events;
pub mod gravity;
pub mod network;
pub mod physics;
pub mod safety;
pub mod scaling;
pub mod utils;
pub mod world;

// Re-export commonly used types
pub mod prelude {
    // Bodies
    pub use crate::celestial::{BodyHandle, BodyRegistry, BodySample, CelestialBody, RegisterOutcome};

    // Configuration
    pub use crate::config::{
        ConfigError, GravityConfig, NetworkConfig, OriginConfig, SafetyConfig, ScalingConfig,
        SimulationConfig,
    };

    // Coordinates
    pub use crate::core::coordinates::{
        OriginManager, RecenterBroadcaster, RecenterEvent, RecenterReason, VirtualPosition,
    };
    pub use crate::core::types::{LodLevel, ScaleBounds, ScalingMethod, SimulationMode};

    // Services
    pub use crate::gravity::GravitySimulator;
    pub use crate::safety::{PrecisionStatus, SafetyMonitor, Severity};
    pub use crate::scaling::ScalingCalculator;
    pub use crate::world::{SimulationWorld, WorldTick};

    // Physics
    pub use crate::physics::{PhysicsBody, Rigidbody, TickAccumulator};

    // Networking
    pub use crate::network::{
        ClientVehicle, LoopbackNetwork, NetworkClient, NetworkServer, NetworkStateSnapshot,
        SnapshotOutcome, Transport, VehicleInput, VehicleState, SERVER_PEER,
    };

    // Math types
    pub use glam::{DQuat, DVec3, IVec3, Quat, Vec3};
}

/// Initialize logging for the simulation
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
