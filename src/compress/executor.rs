//! Executors that run compression tasks.

/// A task submitted to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted tasks, either on the calling thread or elsewhere.
///
/// Compressors never assume which: results are always delivered through a
/// [`CompressionFuture`](super::CompressionFuture).
pub trait Executor: Send + Sync {
    /// Runs `task`, now or later.
    fn execute(&self, task: Task);
}

/// Runs every task immediately on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// Thread count for a [`ThreadPoolExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Threads {
    /// One thread per available CPU.
    #[default]
    Auto,
    /// A specific number of threads.
    Count(std::num::NonZeroUsize),
}

impl Threads {
    /// Returns the actual thread count, at least 1.
    pub fn count(&self) -> usize {
        match self {
            Self::Auto => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            Self::Count(n) => n.get(),
        }
    }
}

/// Runs tasks on a rayon thread pool.
#[cfg(feature = "parallel")]
#[derive(Debug, Clone)]
pub struct ThreadPoolExecutor {
    pool: std::sync::Arc<rayon::ThreadPool>,
}

#[cfg(feature = "parallel")]
impl ThreadPoolExecutor {
    /// Builds a dedicated pool.
    pub fn new(threads: Threads) -> crate::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.count())
            .thread_name(|i| format!("zfile-compress-{}", i))
            .build()
            .map_err(|e| crate::Error::Io(std::io::Error::other(e)))?;
        Ok(Self {
            pool: std::sync::Arc::new(pool),
        })
    }

    /// Uses an existing pool.
    pub fn from_pool(pool: std::sync::Arc<rayon::ThreadPool>) -> Self {
        Self { pool }
    }

    /// Returns the number of threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[cfg(feature = "parallel")]
impl Executor for ThreadPoolExecutor {
    fn execute(&self, task: Task) {
        self.pool.spawn(task);
    }
}
