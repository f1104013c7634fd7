//! Background job scheduler and job implementations.

mod cache_sweep;
mod scheduler;

pub use cache_sweep::CacheSweepJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
