//! Listing commands.

use std::sync::Arc;

use anyhow::Result;
use conveyor_db::{
    CleanupJobRepo, EventRuleRepo, EventSourceRepo, PgCleanupJobRepo, PgEventRuleRepo,
    PgEventSourceRepo, PgRetentionPolicyRepo, RetentionPolicyRepo,
};

use super::connect;

pub async fn sources(database_url: &str) -> Result<()> {
    let pool = connect(database_url).await?;
    let repo = PgEventSourceRepo::new(pool);
    for source in repo.list().await? {
        println!(
            "{}\t{}\t{}\tcursor={}\t{}",
            source.id,
            source.name,
            source.connection.driver.as_str(),
            source.last_processed_id,
            if source.enabled { "enabled" } else { "disabled" },
        );
    }
    Ok(())
}

pub async fn rules(database_url: &str, source_name: &str) -> Result<()> {
    let pool = connect(database_url).await?;
    let sources = Arc::new(PgEventSourceRepo::new(pool.clone()));
    let rules = PgEventRuleRepo::new(pool);

    let source = sources.get_by_name(source_name).await?;
    for rule in rules.list_for_source(source.id).await? {
        println!(
            "{}\tpriority={}\tevidence={}\toperation={}\ttemplate={}\t{}",
            rule.id,
            rule.priority,
            rule.evidence.as_deref().unwrap_or("*"),
            rule.operation.as_str(),
            rule.runtemplate_id,
            if rule.enabled { "enabled" } else { "disabled" },
        );
    }
    Ok(())
}

pub async fn policies(database_url: &str) -> Result<()> {
    let pool = connect(database_url).await?;
    let repo = PgRetentionPolicyRepo::new(pool);
    for policy in repo.list().await? {
        println!(
            "{}\t{}\t{}\t{}d+{}d\t{}\t{}",
            policy.id,
            policy.policy_name,
            policy.table_name,
            policy.retention_period_days,
            policy.grace_period_days,
            policy.action.as_str(),
            if policy.enabled { "enabled" } else { "disabled" },
        );
    }
    Ok(())
}

pub async fn retention_jobs(database_url: &str, limit: i64) -> Result<()> {
    let pool = connect(database_url).await?;
    let repo = PgCleanupJobRepo::new(pool);
    for job in repo.list_recent(limit).await? {
        println!(
            "{}\t{}\t{}\tprocessed={}\terrors={}\t{}",
            job.id,
            job.job_type.as_str(),
            job.status.as_str(),
            job.counts.processed,
            job.errors.len(),
            job.summary.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}
