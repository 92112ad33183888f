#![deny(clippy::print_stdout, clippy::print_stderr)]

//! C3: computes the Add/Update/Archive/Revive classification between the
//! existing per-country movement set and a freshly parsed batch, keyed by
//! the movement business key. A single deterministic pass over each side,
//! in the spirit of a sort-merge diff against a key-bucketed journal.

use std::collections::HashMap;
use std::collections::HashSet;

use chrono::DateTime;
use chrono::Utc;
use movement_model::BusinessKey;
use movement_model::Movement;
use movement_model::MovementChangeSet;

/// Diffs `new` against `existing` (which must include archived rows) and
/// returns the to_add/to_update/to_archive classification. Neither input is
/// mutated; every output record is freshly derived.
#[must_use]
pub fn diff(existing: &[Movement], new: &[Movement], now: DateTime<Utc>) -> MovementChangeSet {
    let existing_by_key: HashMap<BusinessKey, &Movement> = existing
        .iter()
        .map(|movement| (movement.business_key(), movement))
        .collect();

    let mut changes = MovementChangeSet::default();
    let mut seen_keys: HashSet<BusinessKey> = HashSet::new();

    for incoming in new {
        let key = incoming.business_key();
        seen_keys.insert(key.clone());

        match existing_by_key.get(&key) {
            Some(current) if current.is_archived() => {
                changes.to_update.push(current.revived_from(incoming, now));
            }
            Some(current) if !current.same_business_fields(incoming) => {
                changes.to_update.push(current.updated_from(incoming, now));
            }
            Some(_) => {
                // No business field changed: a no-op, nothing to emit.
            }
            None => {
                let mut added = incoming.clone();
                added.id = key.into_movement_id();
                added.version = 1;
                added.creation_date = now;
                added.last_modified = now;
                added.delete_date = None;
                changes.to_add.push(added);
            }
        }
    }

    for current in existing {
        if current.is_archived() {
            continue;
        }
        if !seen_keys.contains(&current.business_key()) {
            changes.to_archive.push(current.id.clone());
        }
    }

    changes
}
