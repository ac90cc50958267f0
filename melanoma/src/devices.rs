use std::{num::NonZeroUsize, thread};

use log::{info, warn};
use rayon::ThreadPoolBuilder;

/// The amount of model replicas to train with, every available core unless configured.
pub fn replicas(configured: Option<usize>) -> NonZeroUsize {
    configured
        .and_then(NonZeroUsize::new)
        .unwrap_or_else(|| thread::available_parallelism().unwrap_or(NonZeroUsize::MIN))
}

/// Sizes the global thread pool the replicas run on.
///
/// The global pool can only be configured once per process; if that already happened the
/// replicas share the existing pool and a warning is logged.
pub fn configure(replicas: NonZeroUsize) {
    info!(replicas = replicas.get(); "{} replica device(s)", replicas);

    if let Err(e) = ThreadPoolBuilder::new()
        .num_threads(replicas.get())
        .thread_name(|i| format!("replica-{i}"))
        .build_global()
    {
        warn!("could not size the replica thread pool, using the existing one: {e}");
    }
}
