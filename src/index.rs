use std::collections::BTreeMap;

use crate::schema::Operation;

/// Groups operations under each of their tags. An operation with several
/// tags appears once in every group; each group is ordered by path.
pub fn group_by_tag<'a>(ops: &[&'a Operation]) -> BTreeMap<String, Vec<&'a Operation>> {
    let mut groups: BTreeMap<String, Vec<&'a Operation>> = BTreeMap::new();
    for op in ops {
        for tag in &op.tags {
            let group = groups.entry(tag.clone()).or_default();
            if !group.iter().any(|existing| existing.id == op.id) {
                group.push(*op);
            }
        }
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.method.cmp(&b.method)));
    }
    groups
}

/// Case-insensitive substring search over path, method, summary,
/// description and tags. An empty query keeps every operation in order.
pub fn filter<'a>(ops: &'a [Operation], query: &str) -> Vec<&'a Operation> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return ops.iter().collect();
    }
    ops.iter().filter(|op| matches(op, &needle)).collect()
}

fn matches(op: &Operation, needle: &str) -> bool {
    let contains = |hay: &str| hay.to_lowercase().contains(needle);
    contains(&op.path)
        || contains(&op.method)
        || contains(&op.summary)
        || op.description.as_deref().is_some_and(contains)
        || op.tags.iter().any(|tag| contains(tag))
}
