#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

mod presets;

pub use presets::{default_roster, FishType, DEFAULT_TANK_MAX, DEFAULT_TANK_MIN};

/// Represents a 3D position in tank coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Position3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Calculate distance to another position
    pub fn distance_to(&self, other: &Position3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        libm::sqrtf(dx * dx + dy * dy + dz * dz)
    }
}

/// Flocking behaviour of a single school
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlockingSettings {
    /// Cruising speed in units per second
    pub max_speed: f32,
    /// How strongly the current heading resists new influences
    pub inertia: f32,
    /// Distance from the goal at which the school picks a new one
    pub arrival_distance: f32,
    pub spawn_zone_min: Position3,
    pub spawn_zone_max: Position3,
    pub neighbor_distance: f32,
    pub spawn_range: f32,
    /// 0..1, schools only yield to schools at least as aggressive
    pub aggression: f32,
    pub goal_scale: f32,
    pub alignment_scale: f32,
    pub repulsion_scale: f32,
    pub cohesion_scale: f32,
    pub school_avoidance_scale: f32,
}

impl Default for FlockingSettings {
    fn default() -> Self {
        Self {
            max_speed: 0.05,
            inertia: 2.0,
            arrival_distance: 1.0,
            spawn_zone_min: Position3::new(-20.0, 5.0, -20.0),
            spawn_zone_max: Position3::new(20.0, 25.0, 20.0),
            neighbor_distance: 0.5,
            spawn_range: 0.01,
            aggression: 0.5,
            goal_scale: 0.03,
            alignment_scale: 0.1,
            repulsion_scale: 0.5,
            cohesion_scale: 0.1,
            school_avoidance_scale: 0.5,
        }
    }
}

/// Description used to create a school
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SchoolDesc {
    pub fish_type: FishType,
    pub num_fish: u32,
    /// Model scale; multiplies the fish half extents
    pub scale: f32,
}

/// Where schools are placed when the tank is reset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    /// Every school starts at its own random point in the tank
    #[default]
    Fireworks,
    /// Every school starts at the centre of the tank
    Fishsplosion,
}

/// Configuration of a whole tank of schools
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TankConfig {
    /// Seed for school placement and per-school generators
    pub seed: u64,
    pub schools: u32,
    /// Fish in every school; `None` uses each roster entry's own count
    pub fish_per_school: Option<u32>,
    pub max_schools: u32,
    pub max_fish_per_school: u32,
    /// Active worker threads
    pub threads: u32,
    /// Worker threads spawned up front
    pub max_threads: u32,
    pub avoidance: bool,
    /// Record draw commands on the worker threads
    pub threaded_rendering: bool,
    /// Fish per draw call; 0 draws a whole school at once
    pub batch_size: u32,
    /// Flocking complexity in 1..=5; higher scans more neighbours per frame
    pub complexity: u32,
    pub reset_mode: ResetMode,
    pub tank_min: Position3,
    pub tank_max: Position3,
    /// Half extents of an unscaled fish model
    pub fish_half_extents: Position3,
    /// Number of instance buffers cycled per school
    pub ring_depth: u32,
    pub roster: Vec<SchoolDesc>,
}

impl Default for TankConfig {
    fn default() -> Self {
        Self {
            seed: 0x5eed,
            schools: 50,
            fish_per_school: None,
            max_schools: 5000,
            max_fish_per_school: 100,
            threads: 8,
            max_threads: 8,
            avoidance: true,
            threaded_rendering: true,
            batch_size: 100,
            complexity: 1,
            reset_mode: ResetMode::Fireworks,
            tank_min: DEFAULT_TANK_MIN,
            tank_max: DEFAULT_TANK_MAX,
            fish_half_extents: Position3::new(0.1, 0.1, 0.25),
            ring_depth: 4,
            roster: default_roster(),
        }
    }
}

/// Reasons a [`TankConfig`] cannot be used
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    NoThreads,
    NoFishCapacity,
    NoSchoolCapacity,
    EmptyRoster,
    RingTooShallow(u32),
    InvertedTank,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::NoThreads => write!(f, "max_threads must be at least 1"),
            ConfigError::NoFishCapacity => write!(f, "max_fish_per_school must be at least 1"),
            ConfigError::NoSchoolCapacity => write!(f, "max_schools must be at least 1"),
            ConfigError::EmptyRoster => write!(f, "roster must describe at least one school"),
            ConfigError::RingTooShallow(depth) => {
                write!(f, "ring_depth must be at least 2, got {}", depth)
            }
            ConfigError::InvertedTank => write!(f, "tank_min must be below tank_max on every axis"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

impl TankConfig {
    /// Check the parts of the configuration that cannot be clamped
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::NoThreads);
        }
        if self.max_fish_per_school == 0 {
            return Err(ConfigError::NoFishCapacity);
        }
        if self.max_schools == 0 {
            return Err(ConfigError::NoSchoolCapacity);
        }
        if self.roster.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        if self.ring_depth < 2 {
            return Err(ConfigError::RingTooShallow(self.ring_depth));
        }
        if self.tank_min.x >= self.tank_max.x
            || self.tank_min.y >= self.tank_max.y
            || self.tank_min.z >= self.tank_max.z
        {
            return Err(ConfigError::InvertedTank);
        }
        Ok(())
    }

    /// Description for the school at `index`, cycling through the roster
    pub fn school_desc(&self, index: usize) -> Option<SchoolDesc> {
        if self.roster.is_empty() {
            return None;
        }
        Some(self.roster[index % self.roster.len()])
    }

    /// Fish to activate in a school created from `desc`
    pub fn fish_count(&self, desc: &SchoolDesc) -> u32 {
        self.fish_per_school
            .unwrap_or(desc.num_fish)
            .min(self.max_fish_per_school)
    }

    #[cfg(feature = "std")]
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[cfg(feature = "std")]
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Statistics reported after each simulated frame
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct FrameStats {
    pub frame: u64,
    pub schools: u32,
    pub fish: u32,
    pub threads: u32,
    pub draw_calls: u32,
    /// Schools whose instance upload was skipped because no buffer was free
    pub skipped_uploads: u32,
    /// Wall-clock time spent in the frame, in microseconds
    pub cpu_time_us: u64,
}
