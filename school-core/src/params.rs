use school_shared::{FlockingSettings, Position3};

use crate::vector::Vector3;

/// Settings controlling the flocking behaviour of one school.
///
/// Read once per `animate` call; changing them between frames takes effect
/// on the next frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlockingParams {
    /// Maximum cruising speed of a fish in units per second
    pub max_speed: f32,
    /// Influence of the current heading on the next heading
    pub inertia: f32,
    /// Distance between centroid and goal that counts as arrived
    pub arrival_distance: f32,
    /// Box that new goals are picked from
    pub spawn_zone_min: Vector3,
    pub spawn_zone_max: Vector3,
    /// Furthest another fish can be and still count as a neighbour
    pub neighbor_distance: f32,
    /// Size of the box fish are spawned in around a spawn position
    pub spawn_range: f32,
    /// Tendency to hold ground against other schools (0..1)
    pub aggression: f32,
    pub goal_scale: f32,
    pub alignment_scale: f32,
    pub repulsion_scale: f32,
    pub cohesion_scale: f32,
    pub school_avoidance_scale: f32,
}

impl Default for FlockingParams {
    fn default() -> Self {
        Self::from(&FlockingSettings::default())
    }
}

fn to_vector(p: Position3) -> Vector3 {
    Vector3::new(p.x, p.y, p.z)
}

fn to_position(v: Vector3) -> Position3 {
    Position3::new(v.x, v.y, v.z)
}

impl From<&FlockingSettings> for FlockingParams {
    fn from(s: &FlockingSettings) -> Self {
        Self {
            max_speed: s.max_speed,
            inertia: s.inertia,
            arrival_distance: s.arrival_distance,
            spawn_zone_min: to_vector(s.spawn_zone_min),
            spawn_zone_max: to_vector(s.spawn_zone_max),
            neighbor_distance: s.neighbor_distance,
            spawn_range: s.spawn_range,
            aggression: s.aggression,
            goal_scale: s.goal_scale,
            alignment_scale: s.alignment_scale,
            repulsion_scale: s.repulsion_scale,
            cohesion_scale: s.cohesion_scale,
            school_avoidance_scale: s.school_avoidance_scale,
        }
    }
}

impl From<&FlockingParams> for FlockingSettings {
    fn from(p: &FlockingParams) -> Self {
        Self {
            max_speed: p.max_speed,
            inertia: p.inertia,
            arrival_distance: p.arrival_distance,
            spawn_zone_min: to_position(p.spawn_zone_min),
            spawn_zone_max: to_position(p.spawn_zone_max),
            neighbor_distance: p.neighbor_distance,
            spawn_range: p.spawn_range,
            aggression: p.aggression,
            goal_scale: p.goal_scale,
            alignment_scale: p.alignment_scale,
            repulsion_scale: p.repulsion_scale,
            cohesion_scale: p.cohesion_scale,
            school_avoidance_scale: p.school_avoidance_scale,
        }
    }
}

impl FlockingParams {
    /// Copy of these parameters roaming a different spawn zone
    pub fn with_spawn_zone(mut self, min: Vector3, max: Vector3) -> Self {
        self.spawn_zone_min = min;
        self.spawn_zone_max = max;
        self
    }
}
