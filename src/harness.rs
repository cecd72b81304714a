use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rayon::ThreadPoolBuilder;
use tracing::{debug, warn};

use crate::bencher::Execute;
use crate::descriptor::{BenchmarkDescriptor, Mode};
use crate::error::{BenchError, Result};
use crate::random::RandomSource;
use crate::stats::{Aggregator, ExecutionResult};
use crate::template::Template;

#[derive(Clone, Debug)]
pub struct BenchConfig {
    /// Global iteration count, scaled per descriptor by its ratio.
    pub iterations: u64,
    pub workers: usize,
    pub seed: u64,
    /// Pause between two executed descriptors.
    pub pause: Duration,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 1_000,
            workers: 25,
            seed: 0,
            pause: Duration::ZERO,
        }
    }
}

impl BenchConfig {
    /// Worker count for a descriptor with `effective_iterations` executions:
    /// at least one, and never more workers than iterations.
    pub fn workers_for(&self, effective_iterations: u64) -> usize {
        let cap = usize::try_from(effective_iterations).unwrap_or(usize::MAX);
        self.workers.clamp(1, cap.max(1))
    }
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Cooperative stop flag shared by the coordinator and every worker.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<CancelState>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        let _guard = self.0.lock.lock();
        self.0.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `pause` or until the token is cancelled, whichever comes
    /// first. Returns whether the token is cancelled.
    pub fn sleep(&self, pause: Duration) -> bool {
        let deadline = Instant::now() + pause;
        let mut guard = self.0.lock.lock();
        while !self.is_cancelled() {
            if self.0.wake.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_cancelled()
    }
}

/// Splits `[1, iterations]` into `workers` contiguous ranges of equal size.
/// The last range also takes the remainder.
pub fn partition(iterations: u64, workers: usize) -> Vec<RangeInclusive<u64>> {
    let workers = workers.max(1) as u64;
    let size = iterations / workers;

    (0..workers)
        .map(|w| {
            let from = size * w + 1;
            let to = if w == workers - 1 {
                iterations
            } else {
                size * (w + 1)
            };
            from..=to
        })
        .collect()
}

/// A descriptor run that has either completed or been moved to its own thread.
#[derive(Debug)]
pub enum RunHandle {
    Finished(ExecutionResult),
    Detached {
        name: String,
        handle: JoinHandle<Result<ExecutionResult>>,
    },
}

impl RunHandle {
    pub fn is_detached(&self) -> bool {
        matches!(self, RunHandle::Detached { .. })
    }

    /// Waits for a detached run; returns a finished one directly.
    pub fn join(self) -> Result<ExecutionResult> {
        match self {
            RunHandle::Finished(result) => Ok(result),
            RunHandle::Detached { name, handle } => handle
                .join()
                .map_err(|_| BenchError::WorkerPanicked { name })?,
        }
    }
}

/// Runs descriptors against an executor, one worker pool per run.
#[derive(Clone)]
pub struct Scheduler {
    executor: Arc<dyn Execute>,
    seed: u64,
    cancel: CancelToken,
}

impl Scheduler {
    pub fn new(executor: Arc<dyn Execute>, seed: u64, cancel: CancelToken) -> Self {
        Self {
            executor,
            seed,
            cancel,
        }
    }

    /// Compiles the descriptor's template and runs it.
    ///
    /// `workers` must already be clamped to `[1, effective iterations]`.
    pub fn run(
        &self,
        descriptor: &BenchmarkDescriptor,
        global_iterations: u64,
        workers: usize,
    ) -> Result<RunHandle> {
        let template = Template::compile(&descriptor.statement).map_err(|source| {
            BenchError::Template {
                name: descriptor.name.clone(),
                source,
            }
        })?;
        self.run_compiled(descriptor, Arc::new(template), global_iterations, workers)
    }

    /// Runs an already compiled template. Parallel descriptors are moved to a
    /// named thread and returned as [`RunHandle::Detached`].
    pub fn run_compiled(
        &self,
        descriptor: &BenchmarkDescriptor,
        template: Arc<Template>,
        global_iterations: u64,
        workers: usize,
    ) -> Result<RunHandle> {
        let job = Job {
            name: descriptor.name.clone(),
            mode: descriptor.mode,
            iterations: descriptor.effective_iterations(global_iterations),
            workers,
            template,
            executor: Arc::clone(&self.executor),
            seed: self.seed,
            cancel: self.cancel.clone(),
        };

        if !descriptor.parallel {
            return job.execute().map(RunHandle::Finished);
        }

        let name = descriptor.name.clone();
        let handle = thread::Builder::new()
            .name(format!("bench-{name}"))
            .spawn(move || job.execute())?;
        debug!(benchmark = %name, "detached parallel benchmark");
        Ok(RunHandle::Detached { name, handle })
    }
}

/// Everything one descriptor run needs, owned so it can move to another thread.
struct Job {
    name: String,
    mode: Mode,
    iterations: u64,
    workers: usize,
    template: Arc<Template>,
    executor: Arc<dyn Execute>,
    seed: u64,
    cancel: CancelToken,
}

impl Job {
    fn execute(self) -> Result<ExecutionResult> {
        let aggregator = Aggregator::start();

        match self.mode {
            Mode::Once => {
                let mut rng = RandomSource::for_worker(self.seed, 0);
                self.drive(1..=1, &mut rng, &aggregator);
            }
            Mode::Loop => {
                let ranges = partition(self.iterations, self.workers);
                debug!(
                    benchmark = %self.name,
                    iterations = self.iterations,
                    workers = ranges.len(),
                    "partitioned iterations"
                );

                let pool = ThreadPoolBuilder::new()
                    .num_threads(ranges.len())
                    .thread_name(|i| format!("bench-worker-{i}"))
                    .build()?;

                pool.scope(|scope| {
                    for (worker, range) in ranges.into_iter().enumerate() {
                        let job = &self;
                        let aggregator = &aggregator;
                        scope.spawn(move |_| {
                            let mut rng = RandomSource::for_worker(job.seed, worker);
                            job.drive(range, &mut rng, aggregator);
                        });
                    }
                });
            }
        }

        Ok(aggregator.finish())
    }

    /// Executes the iterations of one partition in increasing order.
    fn drive(&self, range: RangeInclusive<u64>, rng: &mut RandomSource, aggregator: &Aggregator) {
        for iteration in range {
            if self.cancel.is_cancelled() {
                debug!(benchmark = %self.name, iteration, "stopping worker on interrupt");
                return;
            }

            let statement = self.template.render(iteration, rng);
            let start = Instant::now();
            let outcome = self.executor.exec(&statement);
            let elapsed = start.elapsed();

            match outcome {
                Ok(()) => aggregator.record(elapsed),
                Err(e) => {
                    warn!(benchmark = %self.name, iteration, "{statement} failed: {e}");
                    aggregator.record_failure(elapsed);
                }
            }
        }
    }
}
