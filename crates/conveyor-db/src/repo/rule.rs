//! Event rule repository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conveyor_core::rule::{EventRule, OperationFilter};
use conveyor_core::{RuleId, SourceId, TemplateId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct EventRuleRow {
    id: Uuid,
    event_source_id: Uuid,
    evidence: Option<String>,
    operation: String,
    runtemplate_id: Uuid,
    env_mapping: serde_json::Value,
    enabled: bool,
    priority: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EventRuleRow> for EventRule {
    type Error = DbError;

    fn try_from(row: EventRuleRow) -> DbResult<Self> {
        let operation = OperationFilter::parse(&row.operation)
            .ok_or_else(|| DbError::Decode(format!("unknown operation {:?}", row.operation)))?;
        let env_mapping: BTreeMap<String, String> = serde_json::from_value(row.env_mapping)
            .map_err(|e| DbError::Decode(format!("bad env_mapping: {e}")))?;
        Ok(EventRule {
            id: RuleId::from_uuid(row.id),
            source_id: SourceId::from_uuid(row.event_source_id),
            evidence: row.evidence,
            operation,
            runtemplate_id: TemplateId::from_uuid(row.runtemplate_id),
            env_mapping,
            enabled: row.enabled,
            priority: row.priority,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Parameters for attaching a rule to a source.
#[derive(Debug, Clone)]
pub struct NewEventRule {
    pub source_id: SourceId,
    pub evidence: Option<String>,
    pub operation: OperationFilter,
    pub runtemplate_id: TemplateId,
    pub env_mapping: BTreeMap<String, String>,
    pub enabled: bool,
    pub priority: i32,
}

#[async_trait]
pub trait EventRuleRepo: Send + Sync {
    async fn create(&self, rule: NewEventRule) -> DbResult<EventRule>;
    async fn list_for_source(&self, source_id: SourceId) -> DbResult<Vec<EventRule>>;

    /// Enabled rules for a source in match order: priority desc, id asc.
    async fn list_enabled_for_source(&self, source_id: SourceId) -> DbResult<Vec<EventRule>>;
}

/// PostgreSQL implementation of EventRuleRepo.
pub struct PgEventRuleRepo {
    pool: PgPool,
}

impl PgEventRuleRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRuleRepo for PgEventRuleRepo {
    async fn create(&self, rule: NewEventRule) -> DbResult<EventRule> {
        let env_mapping =
            serde_json::to_value(&rule.env_mapping).map_err(|e| DbError::Decode(e.to_string()))?;
        let row = sqlx::query_as::<_, EventRuleRow>(
            r#"
            INSERT INTO event_rules
                (id, event_source_id, evidence, operation, runtemplate_id,
                 env_mapping, enabled, priority)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::from(RuleId::new()))
        .bind(Uuid::from(rule.source_id))
        .bind(&rule.evidence)
        .bind(rule.operation.as_str())
        .bind(Uuid::from(rule.runtemplate_id))
        .bind(env_mapping)
        .bind(rule.enabled)
        .bind(rule.priority)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn list_for_source(&self, source_id: SourceId) -> DbResult<Vec<EventRule>> {
        let rows = sqlx::query_as::<_, EventRuleRow>(
            "SELECT * FROM event_rules WHERE event_source_id = $1 ORDER BY priority DESC, id ASC",
        )
        .bind(Uuid::from(source_id))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_enabled_for_source(&self, source_id: SourceId) -> DbResult<Vec<EventRule>> {
        let rows = sqlx::query_as::<_, EventRuleRow>(
            r#"
            SELECT * FROM event_rules
            WHERE event_source_id = $1 AND enabled
            ORDER BY priority DESC, id ASC
            "#,
        )
        .bind(Uuid::from(source_id))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
