//! Flocking simulation for schools of fish.
//!
//! Each [`School`] steers its fish towards a goal while keeping them aligned,
//! cohesive and apart, and swims around more aggressive schools using the
//! summaries every school published the frame before. With the `std` feature
//! a [`FishTank`] animates many schools per frame on a pool of worker
//! threads and records their instanced draws.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod cadence;
pub mod instance;
pub mod params;
pub mod render;
pub mod rng;
pub mod school;
pub mod state;
pub mod vector;

#[cfg(feature = "std")]
pub mod error;
#[cfg(feature = "std")]
pub mod pool;
#[cfg(feature = "std")]
pub mod tank;

pub use cadence::NeighborCadence;
pub use instance::{DrawSource, FishInstanceData, InstanceRing, InstanceWriter, SlotState};
pub use params::FlockingParams;
pub use render::{CommandList, DrawCommand, DrawRecorder};
pub use rng::SchoolRng;
pub use school::{
    FishState, School, SchoolModel, SchoolSetup, MAX_SCHOOLS_TO_AVOID, MIN_FRAME_TIME,
    TARGET_FRAME_TIME,
};
pub use state::{FrameStates, ReadStates, SchoolState, SchoolStateManager, WriteStates};
pub use vector::Vector3;

#[cfg(feature = "std")]
pub use error::TankError;
#[cfg(feature = "std")]
pub use pool::{partition, FrameTask, WorkerPool, MAX_WORKER_THREADS};
#[cfg(feature = "std")]
pub use tank::{FishTank, MAX_FISH_PER_SCHOOL, MAX_FRAME_TIME, MAX_SCHOOLS};
