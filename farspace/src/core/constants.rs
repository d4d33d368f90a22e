//! Physical constants and reference bodies
//!
//! All simulation distances are meters, masses kilograms and times seconds.
//! Body radii are the one exception: they are catalogued in kilometers,
//! matching how celestial bodies are authored.

/// Newtonian gravitational constant (m³ kg⁻¹ s⁻²)
pub const GRAVITATIONAL_CONSTANT: f64 = 6.674_30e-11;

/// Standard gravity used to express accelerations in G (m/s²)
pub const STANDARD_GRAVITY: f64 = 9.806_65;

/// Meters per kilometer
pub const METERS_PER_KM: f64 = 1_000.0;

/// Default virtual-position sector width (100 km)
pub const DEFAULT_SECTOR_SIZE: f64 = 100_000.0;

pub const SUN_MASS: f64 = 1.989e30;
pub const EARTH_MASS: f64 = 5.972e24;
pub const MOON_MASS: f64 = 7.342e22;
pub const MARS_MASS: f64 = 6.417e23;
pub const JUPITER_MASS: f64 = 1.898e27;

pub const SUN_RADIUS_KM: f64 = 696_340.0;
pub const EARTH_RADIUS_KM: f64 = 6_371.0;
pub const MOON_RADIUS_KM: f64 = 1_737.4;
pub const MARS_RADIUS_KM: f64 = 3_389.5;
pub const JUPITER_RADIUS_KM: f64 = 69_911.0;

/// Mean Earth-Moon separation
pub const EARTH_MOON_DISTANCE_KM: f64 = 384_400.0;

/// Earth's sphere of influence radius in meters, the anchor for scaling
/// every other body's sphere of influence by mass.
pub const EARTH_SOI_RADIUS: f64 = 9.24e8;

/// Catalogue entry for a well-known body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceBody {
    pub name: &'static str,
    /// Mass in kilograms
    pub mass: f64,
    /// Mean radius in kilometers
    pub radius_km: f64,
}

/// Reference bodies available to hosts that spawn a known solar system
pub const REFERENCE_BODIES: [ReferenceBody; 5] = [
    ReferenceBody {
        name: "Sun",
        mass: SUN_MASS,
        radius_km: SUN_RADIUS_KM,
    },
    ReferenceBody {
        name: "Earth",
        mass: EARTH_MASS,
        radius_km: EARTH_RADIUS_KM,
    },
    ReferenceBody {
        name: "Moon",
        mass: MOON_MASS,
        radius_km: MOON_RADIUS_KM,
    },
    ReferenceBody {
        name: "Mars",
        mass: MARS_MASS,
        radius_km: MARS_RADIUS_KM,
    },
    ReferenceBody {
        name: "Jupiter",
        mass: JUPITER_MASS,
        radius_km: JUPITER_RADIUS_KM,
    },
];

/// Look up a reference body by name (case-insensitive)
pub fn reference_body(name: &str) -> Option<&'static ReferenceBody> {
    REFERENCE_BODIES
        .iter()
        .find(|body| body.name.eq_ignore_ascii_case(name))
}
