//! Persistent worker threads driven by a start/done barrier.
//!
//! The orchestrating thread hands every worker a range of schools, wakes them
//! all, and sleeps until the workers have reported every scheduled school as
//! done. Workers stay parked on the start condvar between frames. A worker
//! whose task panics still reports its range, and the panic surfaces as an
//! error from [`WorkerPool::dispatch`].

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::error::TankError;

/// Hard cap on worker threads
pub const MAX_WORKER_THREADS: usize = 8;

/// Work run by every worker on its range of schools each frame
pub trait FrameTask: Send + Sync + 'static {
    /// Per-frame parameters shared by all workers
    type Input: Send + Sync + 'static;

    fn run(&self, worker: usize, range: Range<usize>, input: &Self::Input);
}

/// Split `active_schools` over `active_threads`, handing the remainder out
/// one school at a time to the first threads.
///
/// Threads beyond the number of schools get an empty range.
pub fn partition(active_schools: usize, active_threads: usize) -> Vec<Range<usize>> {
    if active_threads == 0 {
        return Vec::new();
    }
    let per_thread = active_schools / active_threads;
    let remainder = active_schools % active_threads;

    let mut ranges = Vec::with_capacity(active_threads);
    let mut start = 0;
    for thread in 0..active_threads {
        let len = per_thread + usize::from(thread < remainder);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

struct Control<I> {
    generation: u64,
    running: bool,
    input: Option<Arc<I>>,
    ranges: Vec<Range<usize>>,
}

#[derive(Default)]
struct Progress {
    /// Schools reported by the workers this dispatch
    done: usize,
    /// Workers whose task panicked this dispatch
    panicked: usize,
}

struct Shared<T: FrameTask> {
    task: Arc<T>,
    control: Mutex<Control<T::Input>>,
    frame_start: Condvar,
    progress: Mutex<Progress>,
    frame_done: Condvar,
}

fn lock<G>(mutex: &Mutex<G>) -> MutexGuard<'_, G> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fixed set of worker threads running a [`FrameTask`] once per dispatch
pub struct WorkerPool<T: FrameTask> {
    shared: Arc<Shared<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: FrameTask> WorkerPool<T> {
    /// Spawn `threads` workers (clamped to `1..=MAX_WORKER_THREADS`)
    pub fn new(task: Arc<T>, threads: usize) -> Result<Self, TankError> {
        let threads = threads.clamp(1, MAX_WORKER_THREADS);
        let shared = Arc::new(Shared {
            task,
            control: Mutex::new(Control {
                generation: 0,
                running: true,
                input: None,
                ranges: Vec::new(),
            }),
            frame_start: Condvar::new(),
            progress: Mutex::new(Progress::default()),
            frame_done: Condvar::new(),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(threads),
        };
        for worker in 0..threads {
            let shared = Arc::clone(&pool.shared);
            // On error the pool is dropped here, which joins the workers
            // spawned so far
            let handle = thread::Builder::new()
                .name(format!("school-worker-{}", worker))
                .spawn(move || worker_loop(&shared, worker))?;
            pool.workers.push(handle);
        }
        log::info!("started {} worker threads", threads);
        Ok(pool)
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    pub fn task(&self) -> &Arc<T> {
        &self.shared.task
    }

    /// Run the task on every non-empty range and block until all of them
    /// are done. Ranges past the number of workers are ignored.
    ///
    /// Fails with [`TankError::WorkerPanicked`] when a task panicked; the
    /// workers survive and the pool stays usable.
    pub fn dispatch(&self, input: T::Input, ranges: Vec<Range<usize>>) -> Result<(), TankError> {
        let mut ranges = ranges;
        ranges.truncate(self.workers.len());
        let total: usize = ranges.iter().map(|r| r.len()).sum();
        if total == 0 {
            return Ok(());
        }

        *lock(&self.shared.progress) = Progress::default();
        {
            let mut control = lock(&self.shared.control);
            control.generation += 1;
            control.input = Some(Arc::new(input));
            control.ranges = ranges;
        }
        self.shared.frame_start.notify_all();

        let mut progress = lock(&self.shared.progress);
        while progress.done < total {
            progress = self
                .shared
                .frame_done
                .wait(progress)
                .unwrap_or_else(PoisonError::into_inner);
        }
        match progress.panicked {
            0 => Ok(()),
            panicked => Err(TankError::WorkerPanicked(panicked)),
        }
    }
}

fn worker_loop<T: FrameTask>(shared: &Shared<T>, worker: usize) {
    log::debug!("worker {} started", worker);
    let mut seen = 0;
    loop {
        let (input, range) = {
            let mut control = lock(&shared.control);
            while control.running && control.generation == seen {
                control = shared
                    .frame_start
                    .wait(control)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if !control.running {
                break;
            }
            seen = control.generation;
            let range = control.ranges.get(worker).cloned().unwrap_or(0..0);
            (control.input.clone(), range)
        };

        let Some(input) = input else {
            continue;
        };
        if range.is_empty() {
            continue;
        }
        let count = range.len();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            shared.task.run(worker, range, &input)
        }));

        let mut progress = lock(&shared.progress);
        if result.is_err() {
            log::error!("worker {} panicked, {} schools left unfinished", worker, count);
            progress.panicked += 1;
        }
        progress.done += count;
        shared.frame_done.notify_all();
    }
    log::debug!("worker {} exiting", worker);
}

impl<T: FrameTask> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        lock(&self.shared.control).running = false;
        self.shared.frame_start.notify_all();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::warn!("worker thread panicked");
            }
        }
        log::info!("worker threads stopped");
    }
}
