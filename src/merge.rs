//! Merging of per-chunk extraction results.
//!
//! Each chunk of an oversized document yields a free-form key/value map;
//! [`merge_partials`] folds them into one document-level map with
//! deterministic conflict rules. Merging never fails — every conflict
//! resolves by rule — but it is order-sensitive by design, so callers that
//! care about fidelity to source order restore submission order before
//! merging (see [`crate::enhance`]).

use serde_json::map::Entry;
use serde_json::{Map, Value};

/// Fold per-chunk partial maps into one merged map, left to right.
///
/// For each key of each subsequent partial:
/// 1. absent in the accumulator → insert;
/// 2. both values are arrays → concatenate;
/// 3. both values are objects → merge keys, last write wins;
/// 4. the accumulated value is `null` or `""` → overwrite;
/// 5. otherwise → keep the accumulated value.
///
/// An empty input yields an empty map.
pub fn merge_partials(partials: Vec<Map<String, Value>>) -> Map<String, Value> {
    let mut iter = partials.into_iter();
    let mut merged = match iter.next() {
        Some(first) => first,
        None => return Map::new(),
    };

    for partial in iter {
        for (key, value) in partial {
            match merged.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
                Entry::Occupied(mut slot) => merge_into(slot.get_mut(), value),
            }
        }
    }

    merged
}

fn merge_into(accumulated: &mut Value, incoming: Value) {
    match (accumulated, incoming) {
        (Value::Array(acc), Value::Array(more)) => acc.extend(more),
        (Value::Object(acc), Value::Object(more)) => {
            for (key, value) in more {
                acc.insert(key, value);
            }
        }
        (slot, incoming) => {
            let is_empty = slot.is_null() || slot.as_str().is_some_and(str::is_empty);
            if is_empty {
                *slot = incoming;
            }
        }
    }
}
