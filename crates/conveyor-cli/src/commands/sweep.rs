//! One-shot retention sweeps.

use std::sync::Arc;

use anyhow::Result;
use conveyor_core::retention::CleanupJobType;
use conveyor_db::{
    PgCleanupJobRepo, PgRetentionPolicyRepo, PgRetentionStore, RetentionPolicyRepo,
};
use conveyor_retention::CleanupRunner;

use super::connect;

pub async fn run(database_url: &str, policy: Option<String>) -> Result<()> {
    let pool = connect(database_url).await?;
    let policies = Arc::new(PgRetentionPolicyRepo::new(pool.clone()));
    let runner = CleanupRunner::new(
        Arc::new(PgRetentionStore::new(pool.clone())),
        policies.clone(),
        Arc::new(PgCleanupJobRepo::new(pool.clone())),
    );

    let reports = match policy {
        Some(name) => {
            let policy = policies.get_by_name(&name).await?;
            vec![runner
                .sweep(&policy, CleanupJobType::ManualCleanup, None)
                .await?]
        }
        None => runner.sweep_all(CleanupJobType::ManualCleanup).await?,
    };

    for report in reports {
        println!(
            "job {}: {} (processed {}, deleted {}, anonymized {}, archived {}, errors {})",
            report.job_id,
            report.status.as_str(),
            report.counts.processed,
            report.counts.deleted,
            report.counts.anonymized,
            report.counts.archived,
            report.error_count,
        );
    }
    Ok(())
}
