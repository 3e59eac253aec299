//! Turns matched rules into job creation requests.

use std::sync::Arc;

use conveyor_core::change::ChangeRecord;
use conveyor_core::job::{Launcher, NewJob};
use conveyor_core::rule::EventRule;
use conveyor_core::{RuleId, SourceId, TemplateId};
use conveyor_db::RunTemplateRepo;

use crate::envmap::resolve_env;
use crate::matcher::select_rule;
use crate::DispatchResult;

/// What a change record turned into.
#[derive(Debug)]
pub enum DispatchPlan {
    Job(NewJob),
    Skipped(SkipReason),
}

/// Why a record produced no job. Configuration problems, not failures;
/// the record is still consumed and the cursor advances over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoMatchingRule,
    TemplateMissing { rule: RuleId, template: TemplateId },
    TemplateDisabled { rule: RuleId, template: TemplateId },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoMatchingRule => write!(f, "no matching rule"),
            SkipReason::TemplateMissing { rule, template } => {
                write!(f, "rule {rule} references missing template {template}")
            }
            SkipReason::TemplateDisabled { rule, template } => {
                write!(f, "rule {rule} references disabled template {template}")
            }
        }
    }
}

/// Builds job requests from matched rules and change records.
pub struct Dispatcher {
    templates: Arc<dyn RunTemplateRepo>,
}

impl Dispatcher {
    pub fn new(templates: Arc<dyn RunTemplateRepo>) -> Self {
        Self { templates }
    }

    /// Plan the dispatch of one change record against a source's rules.
    ///
    /// The returned job is bound to the winning rule's template, the
    /// template's app and company, the environment materialized from the
    /// rule's mapping, and an event launcher carrying the (source, sequence)
    /// idempotence key.
    pub async fn plan(
        &self,
        source_id: SourceId,
        rules: &[EventRule],
        record: &ChangeRecord,
    ) -> DispatchResult<DispatchPlan> {
        let Some(rule) = select_rule(rules, record) else {
            return Ok(DispatchPlan::Skipped(SkipReason::NoMatchingRule));
        };

        let Some(template) = self.templates.find(rule.runtemplate_id).await? else {
            return Ok(DispatchPlan::Skipped(SkipReason::TemplateMissing {
                rule: rule.id,
                template: rule.runtemplate_id,
            }));
        };
        if !template.enabled {
            return Ok(DispatchPlan::Skipped(SkipReason::TemplateDisabled {
                rule: rule.id,
                template: template.id,
            }));
        }

        let env = resolve_env(&rule.env_mapping, &record.fields);
        Ok(DispatchPlan::Job(NewJob {
            app_id: template.app_id,
            company_id: template.company_id,
            runtemplate_id: template.id,
            env,
            launcher: Launcher::Event {
                source_id,
                sequence: record.sequence,
            },
        }))
    }
}
