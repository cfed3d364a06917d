// =============================================================================
// dedup.rs: ONE ENTRY PER NAME
// =============================================================================
//
// The same platform tends to turn up more than once: Product Hunt and a
// Launch HN post in the same week, or a bank listed in a card and again in
// the page's summary table. Two records are duplicates when their names match
// after trimming and case-folding. The first one wins, and "first" means
// source order as configured, then position within the source.
//
// There is no state between runs. Every run starts with an empty set, so a
// name seen yesterday is fair game again today.
// =============================================================================

use std::collections::HashSet;

use tracing::debug;

use crate::models::CanonicalRecord;

/// Names seen so far in one pass, keyed by [`CanonicalRecord::dedup_key`].
#[derive(Debug, Default)]
pub struct SeenNames {
    seen: HashSet<String>,
}

impl SeenNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `record`'s name. Returns `true` if it had not been seen before.
    pub fn check_and_insert(&mut self, record: &CanonicalRecord) -> bool {
        self.seen.insert(record.dedup_key())
    }
}

/// Drop every record whose name was already seen earlier in `records`.
/// Returns the survivors, in their original order, and how many were dropped.
pub fn dedupe(records: Vec<CanonicalRecord>) -> (Vec<CanonicalRecord>, usize) {
    let before = records.len();
    let mut seen = SeenNames::new();

    let unique: Vec<CanonicalRecord> = records
        .into_iter()
        .filter(|record| {
            let fresh = seen.check_and_insert(record);
            if !fresh {
                debug!(record = %record, "Duplicate dropped");
            }
            fresh
        })
        .collect();

    let dropped = before - unique.len();
    (unique, dropped)
}
