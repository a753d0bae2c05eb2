//! The fish tank: every school, the shared state banks, and the worker pool
//! that animates them.

use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use school_shared::{ConfigError, FrameStats, Position3, ResetMode, TankConfig};

use crate::cadence::NeighborCadence;
use crate::error::TankError;
use crate::params::FlockingParams;
use crate::pool::{partition, FrameTask, WorkerPool};
use crate::render::{CommandList, DrawCommand};
use crate::school::{School, SchoolModel, SchoolSetup};
use crate::state::{FrameStates, SchoolState, SchoolStateManager};
use crate::vector::Vector3;

/// Default most schools in a tank
pub const MAX_SCHOOLS: usize = 5000;
/// Default most fish in one school
pub const MAX_FISH_PER_SCHOOL: usize = 100;
/// Longest frame time fed to the simulation, in seconds
pub const MAX_FRAME_TIME: f32 = 0.2;

fn lock<G>(mutex: &Mutex<G>) -> MutexGuard<'_, G> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<G>(rw: &RwLock<G>) -> RwLockReadGuard<'_, G> {
    rw.read().unwrap_or_else(PoisonError::into_inner)
}

fn to_vector(p: Position3) -> Vector3 {
    Vector3::new(p.x, p.y, p.z)
}

/// Per-frame settings handed to every worker
#[derive(Debug, Clone, Copy)]
struct FrameInput {
    frame: u64,
    frame_time: f32,
    cadence: NeighborCadence,
    avoid: bool,
    paused: bool,
    record_draws: bool,
    batch_size: u32,
}

/// Everything the workers touch. Each school sits behind its own mutex so
/// workers holding disjoint ranges never contend.
struct World {
    schools: RwLock<Vec<Mutex<School>>>,
    states: SchoolStateManager,
    /// Index 0 belongs to the main thread, worker `n` records into `n + 1`
    command_lists: Vec<Mutex<CommandList>>,
    draw_calls: AtomicU32,
    skipped_uploads: AtomicU32,
}

impl World {
    fn step_school(
        &self,
        school: &mut School,
        input: &FrameInput,
        states: &FrameStates<'_>,
        list: &mut CommandList,
    ) {
        if input.paused {
            // Keep the summaries current so avoidance resumes cleanly
            if input.avoid {
                school.publish(states);
            }
        } else {
            school.animate(input.frame_time, input.cadence, states, input.avoid);
            if !school.update() {
                self.skipped_uploads.fetch_add(1, Ordering::Relaxed);
            }
        }
        if input.record_draws {
            let calls = school.render(input.frame, input.batch_size, list);
            self.draw_calls.fetch_add(calls, Ordering::Relaxed);
        }
    }
}

impl FrameTask for World {
    type Input = FrameInput;

    fn run(&self, worker: usize, range: Range<usize>, input: &FrameInput) {
        let schools = read(&self.schools);
        let states = self.states.frame_states();
        let Some(list) = self.command_lists.get(worker + 1) else {
            return;
        };
        let mut list = lock(list);
        for school in &schools[range.start.min(schools.len())..range.end.min(schools.len())] {
            self.step_school(&mut lock(school), input, &states, &mut list);
        }
    }
}

/// Owns every school and drives them one frame at a time.
///
/// Schools are created lazily the first time the school count is raised
/// past them and kept afterwards, so lowering and raising the count again
/// resumes the same schools.
pub struct FishTank {
    config: TankConfig,
    world: Arc<World>,
    pool: WorkerPool<World>,
    cadence: NeighborCadence,
    /// Placement only; every school carries its own generator
    rng: StdRng,
    active_schools: usize,
    active_threads: usize,
    paused: bool,
    frame: u64,
    last_stats: FrameStats,
}

impl FishTank {
    pub fn new(config: TankConfig) -> Result<Self, TankError> {
        config.validate()?;

        let max_threads = config.max_threads as usize;
        let world = Arc::new(World {
            schools: RwLock::new(Vec::new()),
            states: SchoolStateManager::new(config.max_schools as usize),
            command_lists: (0..=max_threads)
                .map(|_| Mutex::new(CommandList::new()))
                .collect(),
            draw_calls: AtomicU32::new(0),
            skipped_uploads: AtomicU32::new(0),
        });
        let pool = WorkerPool::new(Arc::clone(&world), max_threads)?;

        let mut tank = Self {
            cadence: NeighborCadence::new(config.complexity),
            rng: StdRng::seed_from_u64(config.seed),
            active_schools: 0,
            active_threads: 1,
            paused: false,
            frame: 0,
            last_stats: FrameStats::default(),
            world,
            pool,
            config,
        };
        tank.set_num_schools(tank.config.schools as usize);
        tank.set_thread_count(tank.config.threads as usize);
        log::info!(
            "tank ready: {} schools on {} of {} threads",
            tank.active_schools,
            tank.active_threads,
            tank.pool.threads()
        );
        Ok(tank)
    }

    /// Current configuration, including every setting changed since `new`
    pub fn config(&self) -> &TankConfig {
        &self.config
    }

    /// Number of the last simulated frame
    pub fn frame_number(&self) -> u64 {
        self.frame
    }

    pub fn num_schools(&self) -> usize {
        self.active_schools
    }

    /// Schools created so far, active or not
    pub fn created_schools(&self) -> usize {
        read(&self.world.schools).len()
    }

    pub fn thread_count(&self) -> usize {
        self.active_threads
    }

    pub fn max_threads(&self) -> usize {
        self.pool.threads()
    }

    pub fn complexity(&self) -> u32 {
        self.cadence.complexity()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Statistics of the last frame
    pub fn stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Change the number of active schools, clamped to `max_schools`.
    /// Returns the count applied.
    pub fn set_num_schools(&mut self, count: usize) -> usize {
        let max = self.config.max_schools as usize;
        if count > max {
            log::debug!("{} schools requested, clamping to {}", count, max);
        }
        let count = count.min(max);

        let world = Arc::clone(&self.world);
        let mut schools = world.schools.write().unwrap_or_else(PoisonError::into_inner);
        while schools.len() < count {
            // The roster is never empty once the config is validated
            let Some(school) = self.create_school(schools.len()) else {
                break;
            };
            schools.push(Mutex::new(school));
        }
        self.active_schools = count.min(schools.len());
        self.config.schools = self.active_schools as u32;
        self.active_schools
    }

    fn create_school(&mut self, index: usize) -> Option<School> {
        let desc = self.config.school_desc(index)?;
        let settings = desc
            .fish_type
            .flocking(self.config.tank_min, self.config.tank_max);
        let num_fish = self.config.fish_count(&desc) as usize;

        let half_extents = to_vector(self.config.fish_half_extents) * desc.scale;
        let mut model = SchoolModel {
            half_extents,
            tail_start_z: -half_extents.z * 0.5,
            ..SchoolModel::default()
        };
        for axis in 0..3 {
            model.transform[axis * 5] = desc.scale;
        }

        let seed = self.config.seed;
        let seed = (seed ^ (seed >> 32)) as u32 ^ (index as u32).wrapping_mul(0x9E37_79B9);
        let position = self.placement(self.config.reset_mode);

        log::debug!(
            "creating school {} ({:?}, {} fish)",
            index,
            desc.fish_type,
            num_fish
        );
        Some(School::new(
            index,
            FlockingParams::from(&settings),
            SchoolSetup {
                capacity: self.config.max_fish_per_school as usize,
                num_fish,
                position,
                seed,
                ring_depth: self.config.ring_depth as usize,
                model,
            },
        ))
    }

    fn tank_center(&self) -> Vector3 {
        (to_vector(self.config.tank_min) + to_vector(self.config.tank_max)) * 0.5
    }

    fn placement(&mut self, mode: ResetMode) -> Vector3 {
        match mode {
            ResetMode::Fireworks => {
                let min = self.config.tank_min;
                let max = self.config.tank_max;
                Vector3::new(
                    self.rng.gen_range(min.x..=max.x),
                    self.rng.gen_range(min.y..=max.y),
                    self.rng.gen_range(min.z..=max.z),
                )
            }
            ResetMode::Fishsplosion => self.tank_center(),
        }
    }

    /// Set the fish count of every school, clamped to `max_fish_per_school`.
    /// Returns the count applied.
    pub fn set_fish_per_school(&mut self, count: usize) -> usize {
        let max = self.config.max_fish_per_school as usize;
        if count > max {
            log::debug!("{} fish per school requested, clamping to {}", count, max);
        }
        let count = count.min(max);
        self.config.fish_per_school = Some(count as u32);
        for school in read(&self.world.schools).iter() {
            lock(school).set_instance_count(count);
        }
        count
    }

    /// Set the number of workers used per frame, clamped to the pool size.
    /// Returns the count applied.
    pub fn set_thread_count(&mut self, count: usize) -> usize {
        let max = self.pool.threads();
        if count == 0 || count > max {
            log::debug!("{} threads requested, clamping to 1..={}", count, max);
        }
        self.active_threads = count.clamp(1, max);
        self.config.threads = self.active_threads as u32;
        self.active_threads
    }

    pub fn set_avoidance(&mut self, avoidance: bool) {
        self.config.avoidance = avoidance;
    }

    pub fn set_threaded_rendering(&mut self, threaded: bool) {
        self.config.threaded_rendering = threaded;
    }

    /// Fish per draw call; 0 draws each school in one call
    pub fn set_batch_size(&mut self, batch_size: u32) {
        self.config.batch_size = batch_size;
    }

    /// Flocking complexity, clamped to 1..=5
    pub fn set_complexity(&mut self, complexity: u32) {
        self.cadence.set_complexity(complexity);
        self.config.complexity = self.cadence.complexity();
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Move the tank walls. Every school roams the new box and picks a new
    /// goal inside it.
    pub fn set_tank_bounds(&mut self, min: Position3, max: Position3) -> Result<(), TankError> {
        if min.x >= max.x || min.y >= max.y || min.z >= max.z {
            return Err(ConfigError::InvertedTank.into());
        }
        self.config.tank_min = min;
        self.config.tank_max = max;

        let (min, max) = (to_vector(min), to_vector(max));
        for school in read(&self.world.schools).iter() {
            let mut school = lock(school);
            let params = school.flocking_params().with_spawn_zone(min, max);
            school.set_flocking_params(params);
            school.find_new_goal();
        }
        log::info!("tank resized to {:?}..{:?}", min, max);
        Ok(())
    }

    /// Scatter every school again: each to its own random point for
    /// `Fireworks`, all to the tank centre for `Fishsplosion`
    pub fn reset(&mut self, mode: ResetMode) {
        self.config.reset_mode = mode;
        let world = Arc::clone(&self.world);
        for school in read(&world.schools).iter() {
            let location = self.placement(mode);
            lock(school).reset_to_location(location);
        }
        log::info!("tank reset ({:?})", mode);
    }

    /// Simulate one frame of `frame_time` seconds and record its draws.
    ///
    /// The frame time is clamped to `0..=MAX_FRAME_TIME`. Returns once every
    /// active school has been animated, uploaded and recorded, or with
    /// [`TankError::WorkerPanicked`] if a worker failed on its schools.
    pub fn frame(&mut self, frame_time: f32) -> Result<FrameStats, TankError> {
        let started = Instant::now();
        let frame_time = if frame_time.is_finite() {
            frame_time.clamp(0.0, MAX_FRAME_TIME)
        } else {
            0.0
        };

        self.frame += 1;
        self.cadence.advance();
        self.world.states.begin_frame(self.active_schools);
        for list in &self.world.command_lists {
            lock(list).clear();
        }
        self.world.draw_calls.store(0, Ordering::Relaxed);
        self.world.skipped_uploads.store(0, Ordering::Relaxed);

        let threaded_rendering = self.config.threaded_rendering;
        let input = FrameInput {
            frame: self.frame,
            frame_time,
            cadence: self.cadence,
            avoid: self.config.avoidance,
            paused: self.paused,
            record_draws: threaded_rendering,
            batch_size: self.config.batch_size,
        };
        self.pool
            .dispatch(input, partition(self.active_schools, self.active_threads))?;

        let schools = read(&self.world.schools);
        let active = &schools[..self.active_schools];
        if !threaded_rendering {
            let mut list = lock(&self.world.command_lists[0]);
            let mut calls = 0;
            for school in active {
                calls += lock(school).render(self.frame, self.config.batch_size, &mut *list);
            }
            self.world.draw_calls.fetch_add(calls, Ordering::Relaxed);
        }
        let fish: usize = active.iter().map(|s| lock(s).num_fish()).sum();
        drop(schools);

        let skipped_uploads = self.world.skipped_uploads.load(Ordering::Relaxed);
        if skipped_uploads > 0 {
            log::warn!(
                "frame {}: {} schools skipped their upload, every instance buffer is in flight",
                self.frame,
                skipped_uploads
            );
        }

        self.last_stats = FrameStats {
            frame: self.frame,
            schools: self.active_schools as u32,
            fish: fish as u32,
            threads: self.active_threads as u32,
            draw_calls: self.world.draw_calls.load(Ordering::Relaxed),
            skipped_uploads,
            cpu_time_us: started.elapsed().as_micros() as u64,
        };
        Ok(self.last_stats)
    }

    /// Report that the renderer finished every frame up to and including
    /// `frame`, freeing the instance buffers those frames used. Returns the
    /// number of buffers freed.
    pub fn complete_frames_through(&mut self, frame: u64) -> usize {
        read(&self.world.schools)
            .iter()
            .map(|school| lock(school).instances_mut().retire(frame))
            .sum()
    }

    /// Run `f` on the school at `index`, active or not
    pub fn with_school<R>(&self, index: usize, f: impl FnOnce(&School) -> R) -> Option<R> {
        let schools = read(&self.world.schools);
        let school = schools.get(index)?;
        let school = lock(school);
        Some(f(&school))
    }

    /// Copy of the school at `index`
    pub fn school_snapshot(&self, index: usize) -> Option<School> {
        self.with_school(index, School::clone)
    }

    /// Current summaries of the active schools
    pub fn school_summaries(&self) -> Vec<SchoolState> {
        read(&self.world.schools)[..self.active_schools]
            .iter()
            .map(|school| lock(school).summary())
            .collect()
    }

    /// Draws recorded during the last frame, main thread list first
    pub fn draw_commands(&self) -> Vec<DrawCommand> {
        self.world
            .command_lists
            .iter()
            .flat_map(|list| lock(list).commands().to_vec())
            .collect()
    }
}
