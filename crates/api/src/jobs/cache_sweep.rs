//! Periodic cache eviction.

use std::sync::Arc;

use tracing::info;

use super::scheduler::{Job, JobFrequency};
use crate::services::GenerationController;

/// Drops expired cache entries and idle entries with too few hits.
pub struct CacheSweepJob {
    controller: Arc<GenerationController>,
    interval_minutes: u64,
}

impl CacheSweepJob {
    pub fn new(controller: Arc<GenerationController>, interval_minutes: u64) -> Self {
        Self {
            controller,
            interval_minutes,
        }
    }
}

#[async_trait::async_trait]
impl Job for CacheSweepJob {
    fn name(&self) -> &'static str {
        "cache_sweep"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self.controller.sweep().await;
        info!(
            expired = report.expired,
            stale = report.stale,
            remaining = report.remaining,
            "Cache sweep evicted {} entries",
            report.evicted()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fixtures::{generation, request};
    use crate::services::ControllerSettings;
    use domain::models::GenerationOptions;
    use persistence::repositories::TemplateCacheRepository;

    #[test]
    fn test_frequency_follows_config() {
        let controller = Arc::new(GenerationController::new(
            Arc::new(TemplateCacheRepository::default()),
            ControllerSettings::default(),
        ));
        let job = CacheSweepJob::new(controller, 30);
        assert_eq!(job.name(), "cache_sweep");
        assert_eq!(job.frequency(), JobFrequency::Minutes(30));
    }

    #[tokio::test]
    async fn test_execute_keeps_fresh_entries() {
        let controller = Arc::new(GenerationController::new(
            Arc::new(TemplateCacheRepository::default()),
            ControllerSettings::default(),
        ));
        controller
            .generate(&request(1), &GenerationOptions::default(), || async {
                Ok(generation("<mjml/>"))
            })
            .await
            .unwrap();

        let job = CacheSweepJob::new(Arc::clone(&controller), 30);
        assert!(job.execute().await.is_ok());
        assert_eq!(controller.stats().await.store.entries, 1);
    }
}
