use alloc::vec::Vec;
use core::f32::consts::PI;

use crate::cadence::NeighborCadence;
use crate::instance::{FishInstanceData, InstanceRing, DEFAULT_RING_DEPTH};
use crate::params::FlockingParams;
use crate::render::{batches, DrawCommand, DrawRecorder};
use crate::rng::SchoolRng;
use crate::state::{FrameStates, SchoolState};
use crate::vector::{sqrt, Vector3};

/// Frame time that `inertia` is tuned for
pub const TARGET_FRAME_TIME: f32 = 1.0 / 50.0;
/// Shortest frame time used by the simulation
pub const MIN_FRAME_TIME: f32 = 0.00001;
/// Most schools a single school will steer around in one frame
pub const MAX_SCHOOLS_TO_AVOID: usize = 8;

/// Fish closer than this are treated as coincident
const COINCIDENT_DISTANCE: f32 = 0.001;
/// Cosine beyond which a neighbour counts as straight ahead or behind
const AHEAD_COSINE: f32 = 0.95;
/// Cosine to the up axis beyond which a heading counts as vertical
const VERTICAL_COSINE: f32 = 0.999;
/// Padding applied to the RMS school radius
const RADIUS_PADDING: f32 = 1.2;

const FORWARD: Vector3 = Vector3::new(0.0, 0.0, 1.0);

/// Current state of one fish
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FishState {
    pub position: Vector3,
    /// Unit swimming direction
    pub heading: Vector3,
    pub speed: f32,
    /// Tail animation clock
    pub anim_time: f32,
    /// Random tail phase so neighbours don't swim in lockstep
    pub anim_start_offset: f32,
}

/// Rendering metadata for the model a school is instanced from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchoolModel {
    /// Column-major transform aligning the model to -Z forward, +Y up
    pub transform: [f32; 16],
    /// Model-space Z where the tail starts bending
    pub tail_start_z: f32,
    /// Half extents of the model's bounding box; `y` is the floor clearance
    pub half_extents: Vector3,
    pub mesh_count: u32,
}

impl Default for SchoolModel {
    fn default() -> Self {
        #[rustfmt::skip]
        let identity = [
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        Self {
            transform: identity,
            tail_start_z: 0.0,
            half_extents: Vector3::zero(),
            mesh_count: 1,
        }
    }
}

/// Everything needed to spawn a school besides its flocking parameters
#[derive(Debug, Clone, Copy)]
pub struct SchoolSetup {
    /// Most fish the school can hold
    pub capacity: usize,
    /// Fish active right after spawning
    pub num_fish: usize,
    /// Fish spawn within `spawn_range` of this point
    pub position: Vector3,
    pub seed: u32,
    pub ring_depth: usize,
    pub model: SchoolModel,
}

impl Default for SchoolSetup {
    fn default() -> Self {
        Self {
            capacity: 100,
            num_fish: 100,
            position: Vector3::zero(),
            seed: 1,
            ring_depth: DEFAULT_RING_DEPTH,
            model: SchoolModel::default(),
        }
    }
}

/// A school of fish sharing one model and one set of flocking parameters.
///
/// `animate` advances the flocking simulation, `update` pushes the result
/// into the school's instance ring, and `render` records the draws that
/// consume it.
#[derive(Debug, Clone)]
pub struct School {
    index: usize,
    params: FlockingParams,
    /// Sized to capacity; only the first `active` entries are simulated
    fish: Vec<FishState>,
    active: usize,
    goal: Vector3,
    last_centroid: Vector3,
    last_radius: f32,
    model: SchoolModel,
    rng: SchoolRng,
    instances: InstanceRing<FishInstanceData>,
    skipped_uploads: u64,
}

/// Steering inputs gathered from a fish's sampled neighbours
#[derive(Default)]
struct NeighborSums {
    alignment: Vector3,
    repulsion: Vector3,
    repulsion_count: u32,
    cohesion: Vector3,
    accelerate: u32,
    decelerate: u32,
}

fn is_vertical(heading: &Vector3) -> bool {
    let vertical = heading.dot(&Vector3::up());
    !(-VERTICAL_COSINE..=VERTICAL_COSINE).contains(&vertical)
}

/// Which correction took a heading off the vertical
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leveling {
    Untouched,
    TowardGoal,
    AwayFromCentroid,
    Nudge,
}

/// Tilt a vertical heading toward the goal, then away from the centroid,
/// then by a fixed nudge, stopping at the first that works.
///
/// The renderer rebuilds the fish basis from the heading and the up axis,
/// which degenerates for vertical headings.
fn level_heading(
    heading: Vector3,
    goal_heading: Vector3,
    outward: Vector3,
) -> (Vector3, Leveling) {
    if !is_vertical(&heading) {
        return (heading, Leveling::Untouched);
    }
    let heading = (heading + goal_heading * 0.2).normalize_or(heading);
    if !is_vertical(&heading) {
        return (heading, Leveling::TowardGoal);
    }
    let heading = (heading + outward * 0.2).normalize_or(heading);
    if !is_vertical(&heading) {
        return (heading, Leveling::AwayFromCentroid);
    }
    let heading = (heading + Vector3::new(0.0, 0.0, -0.4)).normalize_or(heading);
    (heading, Leveling::Nudge)
}

impl School {
    /// Spawn a school. `index` is the school's slot in the state manager.
    pub fn new(index: usize, params: FlockingParams, setup: SchoolSetup) -> Self {
        let capacity = setup.capacity;
        let mut school = Self {
            index,
            params,
            fish: Vec::with_capacity(capacity),
            active: setup.num_fish.min(capacity),
            goal: Vector3::zero(),
            last_centroid: Vector3::zero(),
            last_radius: 0.0,
            model: setup.model,
            rng: SchoolRng::new(setup.seed),
            instances: InstanceRing::new(capacity, setup.ring_depth),
            skipped_uploads: 0,
        };

        // Start from a goal so the first frames already have a heading
        school.find_new_goal();

        let mut centroid = Vector3::zero();
        for fish_index in 0..capacity {
            let mut position = school.rng.scaled_vector(params.spawn_range) + setup.position;
            position.y = position.y.max(school.model.half_extents.y);
            let fish = FishState {
                position,
                heading: FORWARD,
                speed: 0.0,
                anim_time: 0.0,
                anim_start_offset: school.rng.next_f32() * PI * 2.0,
            };
            if fish_index < school.active {
                centroid += fish.position;
            }
            school.fish.push(fish);
        }
        if school.active > 0 {
            school.last_centroid = centroid / school.active as f32;
        }
        school
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of active fish
    pub fn num_fish(&self) -> usize {
        self.active
    }

    pub fn capacity(&self) -> usize {
        self.fish.len()
    }

    /// Active fish states
    pub fn fish(&self) -> &[FishState] {
        &self.fish[..self.active]
    }

    /// Centroid computed by the last `animate`
    pub fn centroid(&self) -> Vector3 {
        self.last_centroid
    }

    /// Radius computed by the last `animate`
    pub fn radius(&self) -> f32 {
        self.last_radius
    }

    pub fn goal(&self) -> Vector3 {
        self.goal
    }

    /// Summary other schools see of this one
    pub fn summary(&self) -> SchoolState {
        SchoolState {
            aggression: self.params.aggression,
            center: self.last_centroid,
            radius: self.last_radius,
        }
    }

    pub fn flocking_params(&self) -> FlockingParams {
        self.params
    }

    pub fn set_flocking_params(&mut self, params: FlockingParams) {
        self.params = params;
    }

    pub fn model(&self) -> &SchoolModel {
        &self.model
    }

    pub fn instances(&self) -> &InstanceRing<FishInstanceData> {
        &self.instances
    }

    pub fn instances_mut(&mut self) -> &mut InstanceRing<FishInstanceData> {
        &mut self.instances
    }

    /// Uploads skipped so far because every ring slot was in flight
    pub fn skipped_uploads(&self) -> u64 {
        self.skipped_uploads
    }

    /// Change the number of active fish, clamped to capacity.
    ///
    /// Fish beyond the new count keep their state and resume from it if the
    /// count is raised again. Returns the count actually applied.
    pub fn set_instance_count(&mut self, count: usize) -> usize {
        if count > self.capacity() {
            log::debug!(
                "school {}: {} fish requested, clamping to capacity {}",
                self.index,
                count,
                self.capacity()
            );
        }
        self.active = count.min(self.capacity());
        self.active
    }

    /// Pick a new goal inside the spawn zone
    pub fn find_new_goal(&mut self) {
        self.goal = self
            .rng
            .in_box(self.params.spawn_zone_min, self.params.spawn_zone_max);
    }

    /// Respawn every active fish around `location`, at rest, with random
    /// headings. The location becomes both centroid and goal, so a new goal
    /// is chosen on the next `animate`.
    pub fn reset_to_location(&mut self, location: Vector3) {
        let floor = self.model.half_extents.y;
        for fish_index in 0..self.active {
            let mut position = self.rng.scaled_vector(self.params.spawn_range) + location;
            position.y = position.y.max(floor);
            let heading = (self.rng.scaled_vector(2.0) - Vector3::new(1.0, 1.0, 1.0))
                .normalize_or(FORWARD);
            let fish = &mut self.fish[fish_index];
            fish.position = position;
            fish.heading = heading;
            fish.speed = 0.0;
        }
        self.last_centroid = location;
        self.goal = location;
    }

    /// Advance the flocking simulation by one frame.
    ///
    /// Other schools are only ever read from `states.read`, the summaries
    /// published last frame; when `avoid` is set this school publishes its
    /// own new summary into `states.write`.
    pub fn animate(
        &mut self,
        frame_time: f32,
        cadence: NeighborCadence,
        states: &FrameStates<'_>,
        avoid: bool,
    ) {
        let frame_time = if frame_time.is_finite() {
            frame_time.max(MIN_FRAME_TIME)
        } else {
            MIN_FRAME_TIME
        };
        let frame_inertia = self.params.inertia * (TARGET_FRAME_TIME / frame_time);

        let arrival = self.params.arrival_distance;
        if self.goal.distance_squared(&self.last_centroid) < arrival * arrival {
            self.find_new_goal();
        }

        let avoided = if avoid {
            self.schools_to_avoid(states)
        } else {
            heapless::Vec::new()
        };

        if self.active == 0 {
            self.last_radius = 0.0;
            if avoid {
                self.publish(states);
            }
            return;
        }

        let max_speed = self.params.max_speed;
        let min_avoidance_speed = max_speed * 0.5;
        let max_avoidance_speed = max_speed * 2.0;

        let mut new_centroid = Vector3::zero();
        let mut new_radius2 = 0.0;

        for fish_index in 0..self.active {
            let fish = self.fish[fish_index];
            let goal_heading = (self.goal - fish.position).normalize();
            let sums = self.sample_neighbors(fish_index, cadence);

            let avoidance = self.avoidance(fish.position, &avoided);

            // Radius is measured from the previous centroid, before moving
            new_radius2 += fish.position.distance_squared(&self.last_centroid);

            let mut position = fish.position + fish.heading * (fish.speed * frame_time);
            position.y = position.y.max(self.model.half_extents.y);

            let mut desired = goal_heading * self.params.goal_scale;
            if sums.repulsion_count > 0 {
                desired += sums.repulsion * self.params.repulsion_scale;
            } else {
                desired += sums.alignment.normalize() * self.params.alignment_scale;
                desired += sums.cohesion.normalize() * self.params.cohesion_scale;
            }
            if avoid {
                desired += avoidance * self.params.school_avoidance_scale;
            }

            let fallback = fish.heading.normalize_or(goal_heading.normalize_or(FORWARD));
            let heading = if frame_inertia <= 0.0 {
                desired.normalize_or(fallback)
            } else {
                (fish.heading + desired / frame_inertia).normalize_or(fallback)
            };
            let outward = (position - self.last_centroid).normalize();
            let (heading, leveling) = level_heading(heading, goal_heading, outward);
            if leveling == Leveling::Nudge {
                log::trace!("school {}: fish {} nudged off the vertical", self.index, fish_index);
            }

            // Acceleration is max_speed per second
            let step = max_speed * frame_time;
            let mut speed = fish.speed;
            if sums.decelerate > sums.accelerate {
                speed = (speed - step).max(min_avoidance_speed);
            } else if sums.accelerate > 0 {
                speed = (speed + step).min(max_avoidance_speed);
            } else if speed < max_speed {
                speed = (speed + step).min(max_speed);
            } else if speed > max_speed {
                speed = (speed - step).max(max_speed);
            }

            let fish = &mut self.fish[fish_index];
            fish.position = position;
            fish.heading = heading;
            fish.speed = speed;
            fish.anim_time += frame_time * speed * speed;

            new_centroid += position;
        }

        let count = self.active as f32;
        self.last_centroid = new_centroid / count;
        self.last_radius = sqrt(new_radius2 / count) * RADIUS_PADDING;

        if avoid {
            self.publish(states);
        }
    }

    /// Overlapping schools at least as aggressive as this one, from the
    /// previous frame's summaries
    fn schools_to_avoid(
        &self,
        states: &FrameStates<'_>,
    ) -> heapless::Vec<SchoolState, MAX_SCHOOLS_TO_AVOID> {
        let mut avoided = heapless::Vec::new();
        for (school_index, other) in states.read.iter().enumerate() {
            if avoided.is_full() {
                break;
            }
            if school_index == self.index || other.aggression < self.params.aggression {
                continue;
            }
            let sum_radii = other.radius + self.last_radius;
            if other.center.distance_squared(&self.last_centroid) < sum_radii * sum_radii {
                let _ = avoided.push(other);
            }
        }
        avoided
    }

    /// Mean push away from every avoided school, weighted by how much more
    /// aggressive it is. A fish on another school's centre is pushed up.
    fn avoidance(&self, position: Vector3, avoided: &[SchoolState]) -> Vector3 {
        if avoided.is_empty() {
            return Vector3::zero();
        }
        let mut avoidance = Vector3::zero();
        for other in avoided {
            let from_school = position - other.center;
            if from_school.length_squared() < 0.0001 {
                avoidance += Vector3::up();
            } else {
                avoidance +=
                    from_school.normalize() * (other.aggression - self.params.aggression + 0.1);
            }
        }
        avoidance / avoided.len() as f32
    }

    fn sample_neighbors(&self, fish_index: usize, cadence: NeighborCadence) -> NeighborSums {
        let fish = &self.fish[fish_index];
        let neighbor_distance2 = self.params.neighbor_distance * self.params.neighbor_distance;
        let mut sums = NeighborSums::default();

        let start = cadence.start_index(self.active);
        let stride = cadence.stride() as usize;
        for neighbor_index in (start..self.active).step_by(stride) {
            if neighbor_index == fish_index {
                continue;
            }
            let neighbor = &self.fish[neighbor_index];
            let delta = neighbor.position - fish.position;
            let dist2 = delta.length_squared();

            if dist2 <= neighbor_distance2 {
                let dist = sqrt(dist2);
                if dist < COINCIDENT_DISTANCE {
                    // No usable direction; the lower index yields
                    if fish_index < neighbor_index {
                        sums.decelerate += 1;
                    } else {
                        sums.accelerate += 1;
                    }
                } else {
                    let direction = delta / dist;
                    let ahead = fish.heading.dot(&direction);
                    if ahead > AHEAD_COSINE {
                        sums.decelerate += 1;
                    } else if ahead < -AHEAD_COSINE {
                        sums.accelerate += 1;
                    } else {
                        sums.repulsion -= direction;
                        sums.repulsion_count += 1;
                    }
                }
            } else if dist2 > neighbor_distance2 * 4.0 {
                sums.cohesion += delta;
            } else {
                sums.alignment += neighbor.heading;
            }
        }
        sums
    }

    /// Publish this school's summary for the next frame. Returns false when
    /// the school has no slot in the write bank.
    pub fn publish(&self, states: &FrameStates<'_>) -> bool {
        if !states.write.publish(self.index, &self.summary()) {
            log::warn!(
                "school {} has no state slot this frame ({} open)",
                self.index,
                states.write.len()
            );
            return false;
        }
        true
    }

    /// Upload the active fish into the next instance ring slot.
    ///
    /// Returns false when no slot was free; the upload is skipped for this
    /// frame and the renderer keeps drawing the previous one.
    pub fn update(&mut self) -> bool {
        let Some(mut writer) = self.instances.begin_update() else {
            self.skipped_uploads += 1;
            log::debug!("school {}: instance ring full, skipping upload", self.index);
            return false;
        };
        for fish in &self.fish[..self.active] {
            writer.push(FishInstanceData::new(
                fish.position,
                fish.heading,
                fish.anim_start_offset + fish.anim_time,
            ));
        }
        true
    }

    /// Record the draws for the latest uploaded instance data, marking that
    /// slot in flight for `frame`. Returns the number of draw calls.
    pub fn render<R: DrawRecorder + ?Sized>(
        &mut self,
        frame: u64,
        batch_size: u32,
        recorder: &mut R,
    ) -> u32 {
        let school = self.index;
        let mesh_count = self.model.mesh_count;
        let Some(source) = self.instances.submit(frame) else {
            return 0;
        };
        let count = source.len() as u32;

        let mut draw_calls = 0;
        for mesh in 0..mesh_count {
            for (first_instance, instance_count) in batches(count, batch_size) {
                recorder.draw_instanced(DrawCommand {
                    school,
                    mesh,
                    ring_slot: source.slot,
                    byte_offset: source.byte_offset,
                    first_instance,
                    instance_count,
                });
                draw_calls += 1;
            }
        }
        draw_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::CommandList;
    use crate::state::SchoolStateManager;

    fn setup(num_fish: usize, position: Vector3) -> SchoolSetup {
        SchoolSetup {
            capacity: 16,
            num_fish,
            position,
            seed: 1234,
            ..SchoolSetup::default()
        }
    }

    fn step(school: &mut School, manager: &SchoolStateManager, frame_time: f32) {
        manager.begin_frame(1);
        school.animate(frame_time, NeighborCadence::new(5), &manager.frame_states(), true);
    }

    #[test]
    fn test_school_creation() {
        let school = School::new(0, FlockingParams::default(), setup(10, Vector3::new(1.0, 10.0, 1.0)));
        assert_eq!(school.num_fish(), 10);
        assert_eq!(school.capacity(), 16);
        assert_eq!(school.fish().len(), 10);
        for fish in school.fish() {
            assert_eq!(fish.heading, FORWARD);
            assert_eq!(fish.speed, 0.0);
            assert!(fish.position.distance_squared(&Vector3::new(1.0, 10.0, 1.0)) < 0.01);
            assert!((0.0..=2.0 * PI).contains(&fish.anim_start_offset));
        }
    }

    #[test]
    fn test_spawn_respects_floor() {
        let model = SchoolModel {
            half_extents: Vector3::new(0.5, 2.0, 1.0),
            ..SchoolModel::default()
        };
        let school = School::new(
            0,
            FlockingParams::default(),
            SchoolSetup {
                model,
                ..setup(8, Vector3::zero())
            },
        );
        assert!(school.fish().iter().all(|f| f.position.y >= 2.0));
    }

    #[test]
    fn test_initial_goal_in_spawn_zone() {
        let params = FlockingParams::default();
        let school = School::new(0, params, setup(4, Vector3::zero()));
        let goal = school.goal();
        assert!(goal.x >= params.spawn_zone_min.x && goal.x <= params.spawn_zone_max.x);
        assert!(goal.y >= params.spawn_zone_min.y && goal.y <= params.spawn_zone_max.y);
        assert!(goal.z >= params.spawn_zone_min.z && goal.z <= params.spawn_zone_max.z);
    }

    #[test]
    fn test_set_instance_count_clamps() {
        let mut school = School::new(0, FlockingParams::default(), setup(10, Vector3::zero()));
        let before = school.fish[3];
        assert_eq!(school.set_instance_count(4), 4);
        assert_eq!(school.num_fish(), 4);
        assert_eq!(school.set_instance_count(40), 16);
        assert_eq!(school.num_fish(), 16);
        assert_eq!(school.fish[3], before);
    }

    #[test]
    fn test_headings_stay_unit_length() {
        let manager = SchoolStateManager::new(1);
        let mut school = School::new(0, FlockingParams::default(), setup(16, Vector3::new(0.0, 10.0, 0.0)));
        for _ in 0..50 {
            step(&mut school, &manager, 1.0 / 60.0);
            for fish in school.fish() {
                assert!((fish.heading.magnitude() - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_speed_bounds() {
        let manager = SchoolStateManager::new(1);
        let params = FlockingParams {
            max_speed: 2.0,
            neighbor_distance: 2.0,
            ..FlockingParams::default()
        };
        let mut school = School::new(0, params, setup(16, Vector3::new(0.0, 10.0, 0.0)));
        for _ in 0..200 {
            step(&mut school, &manager, 1.0 / 30.0);
            for fish in school.fish() {
                assert!(fish.speed >= 0.0 && fish.speed <= params.max_speed * 2.0);
            }
        }
    }

    #[test]
    fn test_single_fish_school() {
        let manager = SchoolStateManager::new(1);
        let mut school = School::new(0, FlockingParams::default(), setup(1, Vector3::new(0.0, 10.0, 0.0)));
        step(&mut school, &manager, 1.0 / 60.0);
        let fish = school.fish()[0];
        assert_eq!(school.centroid(), fish.position);
        assert!(school.radius().is_finite());
        assert!(fish.heading.is_finite());
    }

    #[test]
    fn test_empty_school_does_not_divide_by_zero() {
        let manager = SchoolStateManager::new(1);
        let mut school = School::new(0, FlockingParams::default(), setup(0, Vector3::new(0.0, 10.0, 0.0)));
        step(&mut school, &manager, 1.0 / 60.0);
        assert!(school.centroid().is_finite());
        assert_eq!(school.radius(), 0.0);
        assert!(school.update());
        assert_eq!(school.render(1, 10, &mut CommandList::new()), 0);
    }

    #[test]
    fn test_coincident_fish_split_by_index() {
        let params = FlockingParams {
            max_speed: 1.0,
            ..FlockingParams::default()
        };
        let mut school = School::new(0, params, setup(2, Vector3::new(0.0, 10.0, 0.0)));
        let shared = FishState {
            position: Vector3::new(0.0, 10.0, 0.0),
            heading: FORWARD,
            speed: 1.0,
            anim_time: 0.0,
            anim_start_offset: 0.0,
        };
        school.fish[0] = shared;
        school.fish[1] = shared;

        let sums0 = school.sample_neighbors(0, NeighborCadence::new(5));
        let sums1 = school.sample_neighbors(1, NeighborCadence::new(5));
        assert_eq!((sums0.accelerate, sums0.decelerate), (0, 1));
        assert_eq!((sums1.accelerate, sums1.decelerate), (1, 0));
    }

    #[test]
    fn test_neighbor_classification() {
        let params = FlockingParams {
            neighbor_distance: 1.0,
            ..FlockingParams::default()
        };
        let mut school = School::new(0, params, setup(5, Vector3::zero()));
        let at = |x: f32, z: f32| FishState {
            position: Vector3::new(x, 10.0, z),
            heading: FORWARD,
            ..FishState::default()
        };
        school.fish[0] = at(0.0, 0.0);
        school.fish[1] = at(0.0, 0.5); // ahead
        school.fish[2] = at(0.5, 0.0); // beside
        school.fish[3] = at(0.0, -1.8); // alignment band
        school.fish[4] = at(3.0, 0.0); // far, cohesion

        let sums = school.sample_neighbors(0, NeighborCadence::new(5));
        assert_eq!(sums.decelerate, 1);
        assert_eq!(sums.repulsion_count, 1);
        assert_eq!(sums.repulsion, Vector3::new(-1.0, 0.0, 0.0));
        assert_eq!(sums.alignment, FORWARD);
        assert_eq!(sums.cohesion, Vector3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_strided_neighbor_scan() {
        let params = FlockingParams {
            neighbor_distance: 100.0,
            ..FlockingParams::default()
        };
        let mut school = School::new(0, params, setup(10, Vector3::zero()));
        for (i, fish) in school.fish.iter_mut().enumerate() {
            fish.position = Vector3::new(i as f32, 10.0, 0.0);
            fish.heading = Vector3::new(0.0, 0.0, 1.0);
        }
        // Stride 5 from offset 0 samples fish 0 and 5; fish 0 skips itself
        let sums = school.sample_neighbors(0, NeighborCadence::new(1));
        assert_eq!(sums.repulsion_count, 1);
        // Full scan sees all nine others
        let sums = school.sample_neighbors(0, NeighborCadence::new(5));
        assert_eq!(sums.repulsion_count, 9);
    }

    #[test]
    fn test_radius_uses_previous_centroid() {
        let manager = SchoolStateManager::new(1);
        let mut school = School::new(0, FlockingParams::default(), setup(2, Vector3::zero()));
        school.fish[0].position = Vector3::new(-1.0, 10.0, 0.0);
        school.fish[1].position = Vector3::new(1.0, 10.0, 0.0);
        school.last_centroid = Vector3::new(0.0, 10.0, 4.0);

        step(&mut school, &manager, MIN_FRAME_TIME);
        // sqrt(mean(1 + 16)) * 1.2, measured from the stale centroid
        let expected = sqrt(17.0) * 1.2;
        assert!((school.radius() - expected).abs() < 1e-4);
        assert!((school.centroid().z).abs() < 1e-3);
    }

    #[test]
    fn test_publishes_summary_when_avoiding() {
        let manager = SchoolStateManager::new(2);
        let mut school = School::new(1, FlockingParams::default(), setup(4, Vector3::new(0.0, 10.0, 0.0)));
        manager.begin_frame(2);
        school.animate(1.0 / 60.0, NeighborCadence::default(), &manager.frame_states(), true);
        manager.begin_frame(2);
        assert_eq!(manager.read_states().get(1), Some(school.summary()));
    }

    #[test]
    fn test_no_summary_without_avoidance() {
        let manager = SchoolStateManager::new(1);
        let mut school = School::new(0, FlockingParams::default(), setup(4, Vector3::new(0.0, 10.0, 0.0)));
        manager.begin_frame(1);
        school.animate(1.0 / 60.0, NeighborCadence::default(), &manager.frame_states(), false);
        manager.begin_frame(1);
        assert_eq!(manager.read_states().get(0), Some(SchoolState::default()));
    }

    #[test]
    fn test_vertical_heading_is_corrected() {
        let manager = SchoolStateManager::new(1);
        let params = FlockingParams {
            inertia: 0.0,
            goal_scale: 1.0,
            alignment_scale: 0.0,
            cohesion_scale: 0.0,
            ..FlockingParams::default()
        };
        let mut school = School::new(0, params, setup(1, Vector3::new(0.0, 10.0, 0.0)));
        // Goal straight overhead and the fish on the centroid, so neither
        // the goal nor the centroid can tilt it
        school.goal = Vector3::new(0.0, 20.0, 0.0);
        school.fish[0].position = Vector3::new(0.0, 10.0, 0.0);
        school.last_centroid = Vector3::new(0.0, 10.0, 0.0);
        step(&mut school, &manager, 1.0 / 50.0);
        let heading = school.fish()[0].heading;
        assert!(!is_vertical(&heading));
        assert!((heading.magnitude() - 1.0).abs() < 1e-4);
        assert!(heading.z < 0.0);
        assert_eq!(heading.x, 0.0);
    }

    #[test]
    fn test_vertical_fix_order() {
        let up = Vector3::up();
        let none = Vector3::zero();

        assert_eq!(level_heading(FORWARD, up, none), (FORWARD, Leveling::Untouched));

        let (heading, leveling) = level_heading(up, Vector3::new(1.0, 0.0, 0.0), none);
        assert_eq!(leveling, Leveling::TowardGoal);
        assert!(heading.x > 0.0 && !is_vertical(&heading));

        // Goal overhead: only the centroid offset helps
        let (heading, leveling) = level_heading(up, up, Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(leveling, Leveling::AwayFromCentroid);
        assert!(heading.z > 0.0 && !is_vertical(&heading));

        let (heading, leveling) = level_heading(-up, -up, none);
        assert_eq!(leveling, Leveling::Nudge);
        assert!(heading.z < 0.0 && !is_vertical(&heading));
        assert!((heading.magnitude() - 1.0).abs() < 1e-5);
    }

    fn state(aggression: f32, center: Vector3, radius: f32) -> SchoolState {
        SchoolState {
            aggression,
            center,
            radius,
        }
    }

    /// Publish `states` and promote them to the read bank
    fn published(manager: &SchoolStateManager, states: &[SchoolState]) {
        manager.begin_frame(states.len());
        let write = manager.write_states();
        for (index, state) in states.iter().enumerate() {
            assert!(write.publish(index, state));
        }
        manager.begin_frame(states.len());
    }

    #[test]
    fn test_avoid_list_is_capped_and_skips_self() {
        let params = FlockingParams {
            aggression: 0.5,
            ..FlockingParams::default()
        };
        let mut school = School::new(0, params, setup(4, Vector3::zero()));
        let center = Vector3::new(0.0, 10.0, 0.0);
        school.last_centroid = center;
        school.last_radius = 1.0;

        // Own slot is marked by its radius; the other eleven are equally
        // aggressive and sit on our centroid
        let mut states = vec![state(0.5, center, 99.0)];
        states.extend((1..12).map(|index| state(0.5, center, index as f32)));
        let manager = SchoolStateManager::new(12);
        published(&manager, &states);

        let avoided = school.schools_to_avoid(&manager.frame_states());
        assert_eq!(avoided.len(), MAX_SCHOOLS_TO_AVOID);
        let radii: Vec<f32> = avoided.iter().map(|s| s.radius).collect();
        assert_eq!(radii, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_avoid_list_filters_weaker_and_distant_schools() {
        let params = FlockingParams {
            aggression: 0.5,
            ..FlockingParams::default()
        };
        let mut school = School::new(0, params, setup(4, Vector3::zero()));
        school.last_centroid = Vector3::new(0.0, 10.0, 0.0);
        school.last_radius = 1.0;

        let manager = SchoolStateManager::new(5);
        published(
            &manager,
            &[
                school.summary(),
                // Weaker and overlapping
                state(0.4, Vector3::new(1.0, 10.0, 0.0), 2.0),
                // Stronger but far away
                state(0.9, Vector3::new(50.0, 10.0, 0.0), 2.0),
                // Equal and overlapping
                state(0.5, Vector3::new(0.0, 10.0, 2.0), 2.0),
                // Stronger, exactly touching
                state(0.9, Vector3::new(3.0, 10.0, 0.0), 2.0),
            ],
        );

        let avoided = school.schools_to_avoid(&manager.frame_states());
        assert_eq!(
            avoided.as_slice(),
            &[state(0.5, Vector3::new(0.0, 10.0, 2.0), 2.0)][..]
        );
    }

    #[test]
    fn test_avoidance_push() {
        let params = FlockingParams {
            aggression: 0.5,
            ..FlockingParams::default()
        };
        let school = School::new(0, params, setup(1, Vector3::zero()));
        let other = state(0.8, Vector3::new(0.0, 10.0, 0.0), 2.0);

        assert_eq!(school.avoidance(Vector3::new(2.0, 10.0, 0.0), &[]), Vector3::zero());

        // Pushed away, scaled by the aggression gap plus 0.1
        let push = school.avoidance(Vector3::new(2.0, 10.0, 0.0), &[other]);
        assert!((push - Vector3::new(0.4, 0.0, 0.0)).magnitude() < 1e-5);
        let equal = state(0.5, other.center, 2.0);
        let push = school.avoidance(Vector3::new(0.0, 10.0, 2.0), &[equal]);
        assert!((push - Vector3::new(0.0, 0.0, 0.1)).magnitude() < 1e-5);

        // On a school's centre there is no direction, so straight up;
        // averaged with the push from a second school
        let behind = state(0.8, Vector3::new(0.0, 10.0, 4.0), 2.0);
        let push = school.avoidance(other.center, &[other, behind]);
        assert!((push - Vector3::new(0.0, 0.5, -0.2)).magnitude() < 1e-5);
    }

    #[test]
    fn test_fish_on_avoided_centre_turns_up() {
        let params = FlockingParams {
            aggression: 0.5,
            ..FlockingParams::default()
        };
        let center = Vector3::new(0.0, 10.0, 0.0);
        let mut school = School::new(0, params, setup(4, center));
        for fish in school.fish.iter_mut() {
            fish.position = center;
        }
        school.last_centroid = center;
        school.last_radius = 1.0;

        let manager = SchoolStateManager::new(2);
        published(&manager, &[school.summary(), state(0.9, center, 1.0)]);
        let states = manager.frame_states();

        let mut control = school.clone();
        school.animate(1.0 / 60.0, NeighborCadence::default(), &states, true);
        control.animate(1.0 / 60.0, NeighborCadence::default(), &states, false);
        for (avoiding, ignoring) in school.fish().iter().zip(control.fish()) {
            assert!(
                avoiding.heading.y > ignoring.heading.y,
                "{:?} vs {:?}",
                avoiding.heading,
                ignoring.heading
            );
        }
    }

    #[test]
    fn test_weaker_school_gives_way() {
        let timid = FlockingParams {
            aggression: 0.2,
            spawn_range: 6.0,
            ..FlockingParams::default()
        };
        let bold = FlockingParams {
            aggression: 0.9,
            ..timid
        };
        let weak_center = Vector3::new(0.0, 10.0, 0.0);
        let strong_center = Vector3::new(5.0, 10.0, 0.0);
        // Fish spawn in a box spawn_range wide from the setup position
        let corner = Vector3::new(3.0, 3.0, 3.0);
        let mut weak = School::new(
            0,
            timid,
            SchoolSetup {
                seed: 21,
                ..setup(16, weak_center - corner)
            },
        );
        let mut strong = School::new(
            1,
            bold,
            SchoolSetup {
                seed: 22,
                ..setup(16, strong_center - corner)
            },
        );
        weak.last_centroid = weak_center;
        weak.last_radius = 4.0;
        strong.last_centroid = strong_center;
        strong.last_radius = 4.0;

        let manager = SchoolStateManager::new(2);
        published(&manager, &[weak.summary(), strong.summary()]);
        let states = manager.frame_states();
        assert_eq!(states.read.get(1), Some(state(0.9, strong_center, 4.0)));

        // Centres 5 apart with radii 4 and 4 overlap, but only the weaker
        // school reacts
        assert!(weak_center.distance_squared(&strong_center) < 8.0 * 8.0);
        assert_eq!(weak.schools_to_avoid(&states).as_slice(), &[strong.summary()][..]);
        assert!(strong.schools_to_avoid(&states).is_empty());

        let weak_before = weak.clone();
        let mut weak_control = weak.clone();
        let mut strong_control = strong.clone();
        let cadence = NeighborCadence::default();
        weak.animate(1.0 / 60.0, cadence, &states, true);
        weak_control.animate(1.0 / 60.0, cadence, &states, false);
        strong.animate(1.0 / 60.0, cadence, &states, true);
        strong_control.animate(1.0 / 60.0, cadence, &states, false);

        // The weak school turns away from the strong one
        let push: f32 = weak_before
            .fish()
            .iter()
            .zip(weak.fish().iter().zip(weak_control.fish()))
            .map(|(before, (avoiding, control))| {
                let away = (before.position - strong_center).normalize();
                (avoiding.heading - control.heading).dot(&away)
            })
            .sum();
        assert!(push > 0.0, "weak school was not pushed away: {}", push);

        // The strong school ignores the weaker one
        assert_eq!(strong.fish(), strong_control.fish());
    }

    #[test]
    fn test_update_and_render() {
        let manager = SchoolStateManager::new(1);
        let mut school = School::new(0, FlockingParams::default(), setup(10, Vector3::new(0.0, 10.0, 0.0)));
        step(&mut school, &manager, 1.0 / 60.0);
        assert!(school.update());

        let latest = school.instances().latest().unwrap();
        assert_eq!(latest.len(), 10);
        let fish = school.fish()[2];
        assert_eq!(latest[2].position, fish.position.to_array());
        assert_eq!(latest[2].tail_time, fish.anim_start_offset + fish.anim_time);

        let mut list = CommandList::new();
        assert_eq!(school.render(1, 4, &mut list), 3);
        let counts: Vec<u32> = list.commands().iter().map(|c| c.instance_count).collect();
        assert_eq!(counts, vec![4, 4, 2]);
    }

    #[test]
    fn test_update_backs_off_when_ring_is_busy() {
        let mut school = School::new(0, FlockingParams::default(), setup(3, Vector3::zero()));
        let mut list = CommandList::new();
        for frame in 1..=4 {
            assert!(school.update());
            school.render(frame, 0, &mut list);
        }
        assert!(!school.update());
        assert_eq!(school.skipped_uploads(), 1);

        school.instances_mut().retire(2);
        assert!(school.update());
    }

    #[test]
    fn test_reset_to_location() {
        let mut school = School::new(0, FlockingParams::default(), setup(6, Vector3::zero()));
        let target = Vector3::new(5.0, 12.0, -3.0);
        school.reset_to_location(target);
        assert_eq!(school.centroid(), target);
        assert_eq!(school.goal(), target);
        for fish in school.fish() {
            assert_eq!(fish.speed, 0.0);
            assert!((fish.heading.magnitude() - 1.0).abs() < 1e-4);
            assert!(fish.position.distance_squared(&target) < 0.01);
        }
    }
}
