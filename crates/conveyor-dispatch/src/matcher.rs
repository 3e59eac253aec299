//! Rule matching: pure and side-effect-free.

use std::cmp::Reverse;

use conveyor_core::change::ChangeRecord;
use conveyor_core::rule::EventRule;

/// Select the winning rule for a change record.
///
/// Candidates are the enabled rules whose evidence and operation filters
/// accept the record; among them the highest priority wins, ties broken by
/// lowest rule id (earliest configured). Deterministic regardless of input
/// order. `None` is not an error: the record is consumed and no job is
/// dispatched.
pub fn select_rule<'a>(rules: &'a [EventRule], record: &ChangeRecord) -> Option<&'a EventRule> {
    rules
        .iter()
        .filter(|rule| rule.enabled && rule.accepts(record))
        .min_by_key(|rule| (Reverse(rule.priority), rule.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conveyor_core::change::ChangeOp;
    use conveyor_core::rule::OperationFilter;
    use conveyor_core::{RuleId, SourceId, TemplateId};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn record(evidence: &str, operation: ChangeOp) -> ChangeRecord {
        ChangeRecord {
            sequence: 10,
            evidence: evidence.to_string(),
            operation,
            fields: json!({}),
            occurred_at: Utc::now(),
        }
    }

    fn rule(evidence: Option<&str>, operation: OperationFilter, priority: i32) -> EventRule {
        EventRule {
            id: RuleId::new(),
            source_id: SourceId::new(),
            evidence: evidence.map(String::from),
            operation,
            runtemplate_id: TemplateId::new(),
            env_mapping: BTreeMap::new(),
            enabled: true,
            priority,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn higher_priority_wildcard_beats_specific_rule() {
        // A wildcard-evidence create rule at priority 10 and an
        // invoice-any rule at priority 5: the wildcard still qualifies and
        // wins on priority.
        let wildcard = rule(None, OperationFilter::Create, 10);
        let specific = rule(Some("invoice"), OperationFilter::Any, 5);
        let rules = vec![specific.clone(), wildcard.clone()];

        let selected = select_rule(&rules, &record("invoice", ChangeOp::Create)).unwrap();
        assert_eq!(selected.id, wildcard.id);

        // For an update, the wildcard's operation filter drops it out.
        let selected = select_rule(&rules, &record("invoice", ChangeOp::Update)).unwrap();
        assert_eq!(selected.id, specific.id);
    }

    #[test]
    fn ties_break_towards_the_earliest_configured_rule() {
        let mut first = rule(None, OperationFilter::Any, 5);
        first.id = RuleId::from_uuid(uuid::Uuid::from_u128(1));
        let mut second = rule(None, OperationFilter::Any, 5);
        second.id = RuleId::from_uuid(uuid::Uuid::from_u128(2));
        // Reversed input order must not matter.
        let rules = vec![second.clone(), first.clone()];
        let selected = select_rule(&rules, &record("order", ChangeOp::Create)).unwrap();
        assert_eq!(selected.id, first.id);
    }

    #[test]
    fn disabled_rules_never_match() {
        let mut only = rule(None, OperationFilter::Any, 1);
        only.enabled = false;
        assert!(select_rule(&[only], &record("order", ChangeOp::Create)).is_none());
    }

    #[test]
    fn no_match_is_none_not_an_error() {
        let rules = vec![rule(Some("invoice"), OperationFilter::Any, 1)];
        assert!(select_rule(&rules, &record("order", ChangeOp::Create)).is_none());
    }

    #[test]
    fn matching_is_deterministic() {
        let rules = vec![
            rule(Some("invoice"), OperationFilter::Create, 3),
            rule(None, OperationFilter::Any, 3),
            rule(Some("invoice"), OperationFilter::Any, 1),
        ];
        let rec = record("invoice", ChangeOp::Create);
        let first = select_rule(&rules, &rec).unwrap().id;
        for _ in 0..10 {
            assert_eq!(select_rule(&rules, &rec).unwrap().id, first);
        }
    }
}
