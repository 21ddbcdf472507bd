//! Jakarta / Jabodetabek locations for realistic test fixtures.
//!
//! Coordinates of well-known public places, rounded to 4-6 decimals.

#![allow(dead_code)]

use courier_routing::coordinate::Coordinate;
use courier_routing::optimizer::Delivery;

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng).unwrap()
    }

    /// Single-package delivery named after the location.
    pub fn delivery(&self) -> Delivery<String> {
        Delivery::new(self.name.to_string(), self.coordinate())
    }
}

// ============================================================================
// Depots / Hubs
// ============================================================================

pub const DEPOTS: &[Location] = &[
    Location::new("Monas", -6.175392, 106.827153),
    Location::new("Default Depot", -6.200000, 106.816666),
    Location::new("Stasiun Gambir", -6.176655, 106.830583),
];

// ============================================================================
// Central Jakarta
// ============================================================================

pub const CENTRAL: &[Location] = &[
    Location::new("Grand Indonesia", -6.195157, 106.820437),
    Location::new("Plaza Indonesia", -6.193598, 106.822212),
    Location::new("Sarinah", -6.187627, 106.823850),
    Location::new("Istiqlal Mosque", -6.170171, 106.831389),
    Location::new("Pasar Baru", -6.163989, 106.834062),
    Location::new("Tanah Abang Market", -6.186958, 106.812817),
];

// ============================================================================
// South Jakarta
// ============================================================================

pub const SOUTH: &[Location] = &[
    Location::new("Blok M", -6.244319, 106.800000),
    Location::new("Senayan City", -6.227430, 106.797367),
    Location::new("Pondok Indah Mall", -6.265563, 106.783928),
    Location::new("Kemang", -6.260630, 106.813606),
    Location::new("Kuningan City", -6.224420, 106.829360),
    Location::new("Ragunan Zoo", -6.312428, 106.820174),
];

// ============================================================================
// North / West Jakarta
// ============================================================================

pub const NORTH_WEST: &[Location] = &[
    Location::new("Kota Tua", -6.135200, 106.813301),
    Location::new("Ancol", -6.122594, 106.833305),
    Location::new("Pantai Indah Kapuk", -6.109100, 106.739700),
    Location::new("Central Park Mall", -6.177350, 106.790920),
    Location::new("Puri Indah Mall", -6.187500, 106.734200),
];

// ============================================================================
// East Jakarta / Bekasi
// ============================================================================

pub const EAST: &[Location] = &[
    Location::new("Taman Mini", -6.302446, 106.895156),
    Location::new("Cawang", -6.242900, 106.873200),
    Location::new("Jatinegara", -6.215000, 106.870500),
    Location::new("Summarecon Bekasi", -6.225600, 107.000800),
];

/// Every customer location above, in declaration order.
pub fn all_customers() -> Vec<Location> {
    CENTRAL
        .iter()
        .chain(SOUTH)
        .chain(NORTH_WEST)
        .chain(EAST)
        .cloned()
        .collect()
}
