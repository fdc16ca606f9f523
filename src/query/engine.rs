//! Shared query evaluation over in-memory item snapshots.
//!
//! Backends whose storage medium has no native query support (memory,
//! JSON-file, and anything git-sync wraps) funnel through [`apply`]:
//! filter, then stable multi-key sort, then offset/limit — strictly in that
//! order, so pagination always operates on a deterministic sequence.
//!
//! Sorting needs a total order over JSON values. The one used here, from
//! least to greatest: missing field, null, booleans, numbers, strings,
//! arrays, objects. Within a type: false < true, numbers compare as f64,
//! strings lexicographically, arrays and objects by their canonical
//! serialization. A missing field sorts before any present value.

use std::cmp::Ordering;

use serde_json::Value;

use crate::model::Item;
use crate::provider::{ProviderError, ProviderResult};
use crate::query::{Filter, FilterOp, QueryOptions, SortDirection};

/// Evaluate the full option set against a snapshot of a collection.
pub fn apply(mut items: Vec<Item>, opts: &QueryOptions) -> ProviderResult<Vec<Item>> {
    if !opts.filters.is_empty() {
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            if matches(&item, &opts.filters)? {
                kept.push(item);
            }
        }
        items = kept;
    }

    if !opts.sort.is_empty() {
        // Vec::sort_by is stable, so equal keys preserve their prior order.
        items.sort_by(|a, b| {
            for key in &opts.sort {
                let ord = compare(lookup(a, &key.field).as_ref(), lookup(b, &key.field).as_ref());
                let ord = match key.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    let offset = opts.offset.unwrap_or(0);
    let items: Vec<Item> = match opts.limit {
        Some(limit) => items.into_iter().skip(offset).take(limit).collect(),
        None => items.into_iter().skip(offset).collect(),
    };

    Ok(items)
}

/// Check whether an item passes every filter (logical AND).
pub fn matches(item: &Item, filters: &[Filter]) -> ProviderResult<bool> {
    for filter in filters {
        if !matches_one(item, filter)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_one(item: &Item, filter: &Filter) -> ProviderResult<bool> {
    let actual = lookup(item, &filter.field);

    match filter.op {
        FilterOp::Eq => Ok(compare(actual.as_ref(), Some(&filter.value)) == Ordering::Equal),
        FilterOp::Ne => Ok(compare(actual.as_ref(), Some(&filter.value)) != Ordering::Equal),
        FilterOp::Gt => Ok(compare(actual.as_ref(), Some(&filter.value)) == Ordering::Greater),
        FilterOp::Gte => Ok(compare(actual.as_ref(), Some(&filter.value)) != Ordering::Less),
        FilterOp::Lt => Ok(compare(actual.as_ref(), Some(&filter.value)) == Ordering::Less),
        FilterOp::Lte => Ok(compare(actual.as_ref(), Some(&filter.value)) != Ordering::Greater),
        FilterOp::In => {
            let candidates = expect_array(filter)?;
            Ok(candidates
                .iter()
                .any(|c| compare(actual.as_ref(), Some(c)) == Ordering::Equal))
        }
        FilterOp::Nin => {
            let candidates = expect_array(filter)?;
            Ok(!candidates
                .iter()
                .any(|c| compare(actual.as_ref(), Some(c)) == Ordering::Equal))
        }
        FilterOp::Regex => {
            let pattern = filter.value.as_str().ok_or_else(|| {
                ProviderError::InvalidRegex {
                    pattern: filter.value.to_string(),
                    reason: "pattern must be a string".to_string(),
                }
            })?;
            let re = regex::Regex::new(pattern).map_err(|e| ProviderError::InvalidRegex {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            Ok(actual
                .as_ref()
                .and_then(|v| v.as_str())
                .map(|s| re.is_match(s))
                .unwrap_or(false))
        }
    }
}

fn expect_array<'a>(filter: &'a Filter) -> ProviderResult<&'a Vec<Value>> {
    filter.value.as_array().ok_or_else(|| {
        ProviderError::InvalidPayload(format!(
            "'{:?}' filter on field '{}' requires an array value",
            filter.op, filter.field
        ))
    })
}

/// Resolve a field name against an item: `id` maps to the item id,
/// everything else to the payload.
fn lookup(item: &Item, field: &str) -> Option<Value> {
    if field == "id" {
        return Some(Value::String(item.id.to_string()));
    }
    item.get(field).cloned()
}

/// Total order over optional JSON values (missing < any present value).
pub fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(0.0);
            let b = b.as_f64().unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        // canonical serialization keeps the order total for compound values
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
