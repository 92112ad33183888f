#![deny(clippy::print_stdout, clippy::print_stderr)]

//! C7: builds reconciliation rows for newly added movements, invoking the
//! DWINGS linker and rule engine, then applies the cross-side pairing
//! override across the current batch before rows are inserted.

use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;
use movement_model::Action;
use movement_model::Country;
use movement_model::Kpi;
use movement_model::Money;
use movement_model::Movement;
use movement_model::MovementId;
use movement_model::Reconciliation;
use movement_model::Side;
use recon_dwings::DwingsData;
use recon_dwings::resolve as resolve_dwings;
use recon_rules::GroupFlags;
use recon_rules::RuleContext;
use recon_rules::RuleScope;
use recon_rules::compute_group_flags;
use recon_rules::evaluate as evaluate_rules;
use recon_rules::group_key;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("movement {0} does not belong to either side of its country's account pair")]
    UnresolvedSide(MovementId),
}

/// Builds one baseline reconciliation row for a freshly added movement:
/// DWINGS linkage via C5, then a baseline action/KPI via C6's Import scope.
/// `group_flags`, when known, seeds the rule context's `is_grouped`/
/// `is_amount_match` fields; `build_batch` computes it across the whole
/// batch before calling this. Cross-side pairing is still applied
/// afterward by `apply_cross_side_adjustment`, which is a hard override on
/// top of whatever the rule table decided here.
pub fn build_one(
    movement: &Movement,
    country: &Country,
    dwings: &DwingsData,
    now: DateTime<Utc>,
    modified_by: &str,
    group_flags: Option<GroupFlags>,
) -> BuildResult<Reconciliation> {
    let side = movement
        .side(country)
        .ok_or_else(|| BuildError::UnresolvedSide(movement.id.clone()))?;
    let is_pivot = side == Side::Pivot;

    let linkage = resolve_dwings(movement, dwings, !is_pivot);

    let mut reconciliation = Reconciliation::new(movement.id.clone(), now, modified_by);
    reconciliation.dwings_invoice_id = linkage.invoice_id;
    reconciliation.dwings_guarantee_id = linkage.guarantee_id;
    reconciliation.dwings_commission_id = linkage.commission_id;

    let ctx = RuleContext {
        country_id: country.id.clone(),
        is_pivot,
        guarantee_type: None,
        transaction_type: String::new(),
        has_dwings_link: reconciliation.dwings_invoice_id.is_some()
            || reconciliation.dwings_guarantee_id.is_some()
            || reconciliation.dwings_commission_id.is_some(),
        is_grouped: group_flags.is_some_and(|flags| flags.is_grouped),
        is_amount_match: group_flags.is_some_and(|flags| flags.is_amount_match),
        missing_amount: group_flags.map_or(Money::from_minor_units(0), |flags| flags.missing_amount),
        sign: if movement.signed_amount.is_credit() { 'C' } else { 'D' },
        bgi: None,
        trigger_date_is_null: true,
        days_since_trigger: None,
        operation_days_ago: (now.date_naive() - movement.operation_date).num_days(),
        is_matched: false,
        has_manual_match: false,
        is_first_request: true,
        days_since_reminder: None,
        current_action_id: Action::Unset,
        is_mt_acked: false,
        has_comm_id_email: false,
        is_bgi_initiated: false,
    };

    if let Some(outcome) = evaluate_rules(RuleScope::Import, &ctx) {
        if outcome.auto_apply {
            if let Some(action) = outcome.action {
                reconciliation.set_action(action, now);
            }
            if let Some(kpi) = outcome.kpi {
                reconciliation.kpi = kpi;
            }
            if let Some(incident_type) = outcome.incident_type {
                reconciliation.incident_type = incident_type;
            }
            if let Some(risky) = outcome.risky_item {
                reconciliation.risky_item = risky;
            }
            if let Some(reason) = outcome.reason_non_risky {
                reconciliation.reason_non_risky = reason;
            }
            if outcome.set_first_claim_date_today {
                reconciliation.first_claim_date = Some(now.date_naive());
            }
        }
    }

    Ok(reconciliation)
}

/// Overrides actions across the batch just built: within each group sharing
/// a DWINGS linkage key, the pivot row becomes `Match` and the receivable
/// row becomes `Trigger`. Scoped to `batch` only; rows already committed in
/// earlier imports are untouched.
pub fn apply_cross_side_adjustment(
    batch: &mut [(MovementId, bool, Reconciliation)],
    now: DateTime<Utc>,
) {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (index, (_, _, reconciliation)) in batch.iter().enumerate() {
        if let Some(key) = group_key(
            reconciliation.dwings_commission_id.as_deref(),
            reconciliation.dwings_invoice_id.as_deref(),
            reconciliation.dwings_guarantee_id.as_deref(),
        ) {
            groups.entry(key.to_string()).or_default().push(index);
        }
    }

    for indices in groups.values() {
        let has_pivot = indices.iter().any(|&i| batch[i].1);
        let has_receivable = indices.iter().any(|&i| !batch[i].1);
        if !(has_pivot && has_receivable) {
            continue;
        }
        for &index in indices {
            let (_, is_pivot, reconciliation) = &mut batch[index];
            let action = if *is_pivot { Action::Match } else { Action::Trigger };
            reconciliation.set_action(action, now);
            reconciliation.kpi = Kpi::OnTime;
        }
    }
}

/// The full per-batch pipeline described for `to_add`: resolve DWINGS
/// linkage for every movement first (needed to compute grouping), build
/// each baseline reconciliation with its group's flags, then apply the
/// cross-side pairing override. Returns one reconciliation per movement, in
/// the same order.
pub fn build_batch(
    movements: &[Movement],
    country: &Country,
    dwings: &DwingsData,
    now: DateTime<Utc>,
    modified_by: &str,
) -> BuildResult<Vec<Reconciliation>> {
    let mut sides = Vec::with_capacity(movements.len());
    let mut groups: HashMap<String, Vec<(Money, bool)>> = HashMap::new();

    for movement in movements {
        let side = movement
            .side(country)
            .ok_or_else(|| BuildError::UnresolvedSide(movement.id.clone()))?;
        let is_pivot = side == Side::Pivot;
        let linkage = resolve_dwings(movement, dwings, !is_pivot);
        let key = group_key(
            linkage.commission_id.as_deref(),
            linkage.invoice_id.as_deref(),
            linkage.guarantee_id.as_deref(),
        )
        .map(str::to_string);
        if let Some(key) = &key {
            groups
                .entry(key.clone())
                .or_default()
                .push((movement.signed_amount, is_pivot));
        }
        sides.push((is_pivot, key));
    }

    let group_flags: HashMap<String, GroupFlags> = groups
        .into_iter()
        .map(|(key, members)| (key, compute_group_flags(&members)))
        .collect();

    let mut batch = Vec::with_capacity(movements.len());
    for (movement, (is_pivot, key)) in movements.iter().zip(sides.iter()) {
        let flags = key.as_ref().and_then(|key| group_flags.get(key)).copied();
        let reconciliation = build_one(movement, country, dwings, now, modified_by, flags)?;
        batch.push((movement.id.clone(), *is_pivot, reconciliation));
    }

    apply_cross_side_adjustment(&mut batch, now);

    Ok(batch
        .into_iter()
        .map(|(_, _, reconciliation)| reconciliation)
        .collect())
}
