use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::{FlockingSettings, Position3, SchoolDesc};

/// Lower corner of the default tank
pub const DEFAULT_TANK_MIN: Position3 = Position3::new(-30.0, 5.0, -30.0);
/// Upper corner of the default tank
pub const DEFAULT_TANK_MAX: Position3 = Position3::new(30.0, 25.0, 30.0);

/// Behavioural archetypes for schools
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FishType {
    ExtraLarge,
    LargeSlow,
    Large,
    LargeFast,
    MediumSlow,
    Medium,
    MediumFast,
    MediumSparse,
    SmallSlow,
    Small,
    SmallFast,
}

// speed, inertia, arrival, neighbor, spawn range, aggression,
// goal, alignment, repulsion, cohesion, avoidance
type Row = [f32; 11];

impl FishType {
    pub const ALL: [FishType; 11] = [
        FishType::ExtraLarge,
        FishType::LargeSlow,
        FishType::Large,
        FishType::LargeFast,
        FishType::MediumSlow,
        FishType::Medium,
        FishType::MediumFast,
        FishType::MediumSparse,
        FishType::SmallSlow,
        FishType::Small,
        FishType::SmallFast,
    ];

    fn row(self) -> Row {
        match self {
            FishType::ExtraLarge => [1.5, 16.0, 8.0, 4.00, 0.01, 0.9, 0.1, 0.1, 0.10, 0.5, 0.1],
            FishType::LargeSlow => [1.5, 16.0, 6.0, 3.50, 0.01, 0.8, 0.1, 0.1, 0.10, 0.5, 1.0],
            FishType::Large => [2.5, 16.0, 6.0, 3.00, 0.01, 0.7, 0.1, 0.1, 0.15, 0.5, 1.0],
            FishType::LargeFast => [3.5, 12.0, 5.0, 2.50, 0.01, 0.6, 0.2, 0.2, 0.10, 0.5, 1.0],
            FishType::MediumSlow => [2.5, 14.0, 5.0, 2.00, 0.01, 0.5, 0.1, 0.1, 0.15, 0.5, 2.0],
            FishType::Medium => [3.5, 12.0, 4.0, 1.60, 0.01, 0.4, 0.1, 0.1, 0.15, 0.5, 2.0],
            FishType::MediumFast => [6.0, 10.0, 3.0, 1.40, 0.01, 0.3, 0.2, 0.1, 0.10, 0.5, 2.0],
            FishType::MediumSparse => [5.0, 10.0, 10.0, 1.50, 0.01, 0.1, 0.1, 0.1, 0.15, 0.5, 3.0],
            FishType::SmallSlow => [3.0, 8.0, 3.0, 1.00, 0.01, 0.2, 0.1, 0.2, 0.10, 0.5, 4.0],
            FishType::Small => [5.0, 5.0, 2.0, 0.25, 0.01, 0.1, 0.1, 0.4, 0.15, 0.5, 5.0],
            FishType::SmallFast => [7.0, 4.0, 1.0, 0.25, 0.01, 0.1, 0.2, 0.5, 0.40, 0.1, 6.0],
        }
    }

    /// Flocking settings for this fish type, roaming the given tank
    pub fn flocking(self, tank_min: Position3, tank_max: Position3) -> FlockingSettings {
        let [max_speed, inertia, arrival_distance, neighbor_distance, spawn_range, aggression, goal_scale, alignment_scale, repulsion_scale, cohesion_scale, school_avoidance_scale] =
            self.row();
        FlockingSettings {
            max_speed,
            inertia,
            arrival_distance,
            spawn_zone_min: tank_min,
            spawn_zone_max: tank_max,
            neighbor_distance,
            spawn_range,
            aggression,
            goal_scale,
            alignment_scale,
            repulsion_scale,
            cohesion_scale,
            school_avoidance_scale,
        }
    }
}

/// One school per fish model, in model order
pub fn default_roster() -> Vec<SchoolDesc> {
    use FishType::*;

    let entries: [(FishType, u32, f32); 25] = [
        (LargeFast, 75, 2.00),
        (Large, 75, 2.00),
        (Medium, 100, 1.00),
        (MediumSlow, 100, 1.00),
        (Medium, 100, 1.00),
        (Medium, 100, 1.00),
        (MediumFast, 100, 1.00),
        (SmallFast, 200, 0.50),
        (MediumSparse, 200, 1.00),
        (ExtraLarge, 50, 3.00),
        (Medium, 100, 1.00),
        (SmallSlow, 150, 0.75),
        (LargeSlow, 50, 3.00),
        (SmallFast, 250, 0.50),
        (MediumFast, 100, 1.00),
        (MediumSlow, 100, 1.50),
        (MediumFast, 100, 1.00),
        (MediumFast, 100, 0.75),
        (SmallSlow, 150, 0.80),
        (Medium, 100, 1.00),
        (MediumSlow, 100, 1.20),
        (Medium, 100, 1.00),
        (SmallSlow, 150, 0.80),
        (MediumSparse, 150, 1.00),
        (Medium, 100, 1.00),
    ];

    entries
        .iter()
        .map(|&(fish_type, num_fish, scale)| SchoolDesc {
            fish_type,
            num_fish,
            scale,
        })
        .collect()
}
