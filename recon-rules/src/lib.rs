#![deny(clippy::print_stdout, clippy::print_stderr)]

//! C6: a priority-ordered table of predicates over transaction context,
//! evaluated top to bottom. The first matching row wins; nothing downstream
//! of it runs. Rules are data, not a trait hierarchy, in the same shape as
//! this workspace's other policy evaluator.

use movement_model::Action;
use movement_model::IncidentType;
use movement_model::Kpi;
use movement_model::Money;
use movement_model::ReasonNonRisky;

/// Which editing path a rule is allowed to fire on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    Import,
    Edit,
    Both,
}

impl RuleScope {
    fn applies_to(self, active: RuleScope) -> bool {
        matches!((self, active), (RuleScope::Both, _) | (RuleScope::Import, RuleScope::Import) | (RuleScope::Edit, RuleScope::Edit))
    }
}

/// Everything a rule's predicates may read. Built by the caller per
/// movement/reconciliation pair before evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleContext {
    pub country_id: String,
    pub is_pivot: bool,
    pub guarantee_type: Option<String>,
    pub transaction_type: String,
    pub has_dwings_link: bool,
    pub is_grouped: bool,
    pub is_amount_match: bool,
    pub missing_amount: Money,
    pub sign: char,
    pub bgi: Option<String>,
    pub trigger_date_is_null: bool,
    pub days_since_trigger: Option<i64>,
    pub operation_days_ago: i64,
    pub is_matched: bool,
    pub has_manual_match: bool,
    pub is_first_request: bool,
    pub days_since_reminder: Option<i64>,
    pub current_action_id: Action,
    pub is_mt_acked: bool,
    pub has_comm_id_email: bool,
    pub is_bgi_initiated: bool,
}

/// The subset of outputs mirrored onto the matched counterpart side. Not
/// applied on the core insert path, but callers must still be able to read
/// it for the paired row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterpartOutcome {
    pub action: Option<Action>,
    pub kpi: Option<Kpi>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub rule_name: &'static str,
    pub action: Option<Action>,
    pub kpi: Option<Kpi>,
    pub incident_type: Option<IncidentType>,
    pub risky_item: Option<bool>,
    pub reason_non_risky: Option<ReasonNonRisky>,
    pub to_remind: Option<bool>,
    pub to_remind_offset_days: Option<i64>,
    pub set_first_claim_date_today: bool,
    pub message: Option<String>,
    pub auto_apply: bool,
    pub counterpart: CounterpartOutcome,
}

impl RuleOutcome {
    fn named(rule_name: &'static str) -> Self {
        Self {
            rule_name,
            action: None,
            kpi: None,
            incident_type: None,
            risky_item: None,
            reason_non_risky: None,
            to_remind: None,
            to_remind_offset_days: None,
            set_first_claim_date_today: false,
            message: None,
            auto_apply: true,
            counterpart: CounterpartOutcome::default(),
        }
    }
}

struct Rule {
    scope: RuleScope,
    predicate: fn(&RuleContext) -> bool,
    build: fn(&RuleContext) -> RuleOutcome,
}

/// One cent in minor units; the threshold below which a grouped amount
/// difference counts as matched.
const AMOUNT_MATCH_TOLERANCE_MINOR: i64 = 1;

fn table() -> &'static [Rule] {
    &[
        Rule {
            scope: RuleScope::Both,
            predicate: |ctx| !ctx.has_dwings_link,
            build: |_ctx| {
                let mut outcome = RuleOutcome::named("missing_dwings_link");
                outcome.action = Some(Action::Investigate);
                outcome.incident_type = Some(IncidentType::MissingDwingsLink);
                outcome
            },
        },
        Rule {
            scope: RuleScope::Both,
            predicate: |ctx| ctx.is_grouped && ctx.is_amount_match,
            build: |ctx| {
                let mut outcome = RuleOutcome::named("grouped_and_matched");
                outcome.action = Some(if ctx.is_pivot {
                    Action::Match
                } else {
                    Action::Trigger
                });
                outcome.kpi = Some(Kpi::OnTime);
                outcome.counterpart = CounterpartOutcome {
                    action: Some(if ctx.is_pivot {
                        Action::Trigger
                    } else {
                        Action::Match
                    }),
                    kpi: Some(Kpi::OnTime),
                };
                outcome
            },
        },
        Rule {
            scope: RuleScope::Both,
            predicate: |ctx| ctx.is_grouped && !ctx.is_amount_match,
            build: |_ctx| {
                let mut outcome = RuleOutcome::named("grouped_amount_mismatch");
                outcome.action = Some(Action::Investigate);
                outcome.incident_type = Some(IncidentType::AmountMismatch);
                outcome.risky_item = Some(true);
                outcome
            },
        },
        Rule {
            scope: RuleScope::Both,
            predicate: |ctx| {
                !ctx.trigger_date_is_null && ctx.days_since_trigger.is_some_and(|days| days > 30)
            },
            build: |_ctx| {
                let mut outcome = RuleOutcome::named("stale_trigger");
                outcome.kpi = Some(Kpi::Late);
                outcome.risky_item = Some(true);
                outcome.message = Some("trigger has been outstanding for over 30 days".into());
                outcome
            },
        },
        Rule {
            scope: RuleScope::Import,
            predicate: |ctx| ctx.is_bgi_initiated && !ctx.is_matched,
            build: |_ctx| {
                let mut outcome = RuleOutcome::named("bgi_initiated_awaiting_match");
                outcome.action = Some(Action::Claim);
                outcome.to_remind = Some(true);
                outcome.to_remind_offset_days = Some(7);
                outcome
            },
        },
        Rule {
            scope: RuleScope::Both,
            predicate: |ctx| ctx.has_manual_match,
            build: |_ctx| {
                let mut outcome = RuleOutcome::named("manual_match_confirmed");
                outcome.action = Some(Action::Match);
                outcome.kpi = Some(Kpi::Resolved);
                outcome.auto_apply = false;
                outcome.message = Some("manual match recorded; confirm before applying".into());
                outcome
            },
        },
        Rule {
            scope: RuleScope::Both,
            predicate: |_ctx| true,
            build: |_ctx| {
                let mut outcome = RuleOutcome::named("no_action_applicable");
                outcome.action = Some(Action::NotApplicable);
                outcome.reason_non_risky = Some(ReasonNonRisky::None);
                outcome
            },
        },
    ]
}

/// Evaluates the rule table for the given scope and returns the first
/// matching row's outcome. The table always ends in a catch-all, so this
/// only returns `None` if a caller passes a scope no row declares.
#[must_use]
pub fn evaluate(scope: RuleScope, ctx: &RuleContext) -> Option<RuleOutcome> {
    table()
        .iter()
        .find(|rule| rule.scope.applies_to(scope) && (rule.predicate)(ctx))
        .map(|rule| (rule.build)(ctx))
}

/// The BGPMT-then-invoice-id-then-guarantee-id priority key a reconciliation
/// row groups under, if it has any DWINGS linkage at all.
#[must_use]
pub fn group_key<'a>(
    commission_id: Option<&'a str>,
    invoice_id: Option<&'a str>,
    guarantee_id: Option<&'a str>,
) -> Option<&'a str> {
    commission_id.or(invoice_id).or(guarantee_id)
}

/// Per-group flags computed from a (signed amount, is_pivot) slice sharing a
/// `group_key`. A group is grouped iff it has at least one pivot-side and one
/// receivable-side member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupFlags {
    pub is_grouped: bool,
    pub is_amount_match: bool,
    pub missing_amount: Money,
}

#[must_use]
pub fn compute_group_flags(members: &[(Money, bool)]) -> GroupFlags {
    let has_pivot = members.iter().any(|(_, is_pivot)| *is_pivot);
    let has_receivable = members.iter().any(|(_, is_pivot)| !*is_pivot);
    let is_grouped = has_pivot && has_receivable;

    let missing_amount = members
        .iter()
        .fold(Money::from_minor_units(0), |acc, (amount, _)| acc + *amount);

    GroupFlags {
        is_grouped,
        is_amount_match: missing_amount.minor_units().abs() < AMOUNT_MATCH_TOLERANCE_MINOR,
        missing_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ctx() -> RuleContext {
        RuleContext {
            country_id: "FR".into(),
            is_pivot: true,
            guarantee_type: None,
            transaction_type: "ToCategorize".into(),
            has_dwings_link: true,
            is_grouped: false,
            is_amount_match: false,
            missing_amount: Money::from_minor_units(0),
            sign: 'C',
            bgi: None,
            trigger_date_is_null: true,
            days_since_trigger: None,
            operation_days_ago: 0,
            is_matched: false,
            has_manual_match: false,
            is_first_request: true,
            days_since_reminder: None,
            current_action_id: Action::Unset,
            is_mt_acked: false,
            has_comm_id_email: false,
            is_bgi_initiated: false,
        }
    }

    #[test]
    fn missing_link_wins_over_every_later_rule() {
        let mut ctx = base_ctx();
        ctx.has_dwings_link = false;
        ctx.is_grouped = true;
        ctx.is_amount_match = true;
        let outcome = evaluate(RuleScope::Import, &ctx).expect("a rule always matches");
        assert_eq!(outcome.rule_name, "missing_dwings_link");
        assert_eq!(outcome.action, Some(Action::Investigate));
    }

    #[test]
    fn grouped_and_matched_assigns_match_to_pivot_and_trigger_to_counterpart() {
        let mut ctx = base_ctx();
        ctx.is_grouped = true;
        ctx.is_amount_match = true;
        let outcome = evaluate(RuleScope::Import, &ctx).expect("a rule always matches");
        assert_eq!(outcome.action, Some(Action::Match));
        assert_eq!(outcome.counterpart.action, Some(Action::Trigger));
    }

    #[test]
    fn grouped_mismatch_flags_as_risky_incident() {
        let mut ctx = base_ctx();
        ctx.is_grouped = true;
        ctx.is_amount_match = false;
        let outcome = evaluate(RuleScope::Import, &ctx).expect("a rule always matches");
        assert_eq!(outcome.incident_type, Some(IncidentType::AmountMismatch));
        assert_eq!(outcome.risky_item, Some(true));
    }

    #[test]
    fn import_only_rule_does_not_fire_in_edit_scope() {
        let mut ctx = base_ctx();
        ctx.is_bgi_initiated = true;
        ctx.is_matched = false;
        let outcome = evaluate(RuleScope::Edit, &ctx).expect("catch-all always matches");
        assert_ne!(outcome.rule_name, "bgi_initiated_awaiting_match");
    }

    #[test]
    fn catch_all_applies_when_nothing_else_matches() {
        let ctx = base_ctx();
        let outcome = evaluate(RuleScope::Both, &ctx).expect("catch-all always matches");
        assert_eq!(outcome.rule_name, "no_action_applicable");
    }

    #[test]
    fn group_flags_require_both_sides_present() {
        let pivot_only = compute_group_flags(&[(Money::from_minor_units(10_000), true)]);
        assert!(!pivot_only.is_grouped);

        let balanced = compute_group_flags(&[
            (Money::from_minor_units(10_000), true),
            (Money::from_minor_units(-10_000), false),
        ]);
        assert!(balanced.is_grouped);
        assert!(balanced.is_amount_match);

        let unbalanced = compute_group_flags(&[
            (Money::from_minor_units(10_000), true),
            (Money::from_minor_units(-9_000), false),
        ]);
        assert!(unbalanced.is_grouped);
        assert!(!unbalanced.is_amount_match);
    }

    #[test]
    fn group_key_prefers_commission_over_invoice_over_guarantee() {
        assert_eq!(group_key(Some("C1"), Some("I1"), Some("G1")), Some("C1"));
        assert_eq!(group_key(None, Some("I1"), Some("G1")), Some("I1"));
        assert_eq!(group_key(None, None, Some("G1")), Some("G1"));
        assert_eq!(group_key(None, None, None), None);
    }
}
