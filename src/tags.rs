//! Resource tag maps.

use std::collections::BTreeMap;

/// Tag map keyed by tag name.
pub type Tags = BTreeMap<String, String>;

/// Merges tag groups left to right.
///
/// Absent groups are skipped; a key in a later group overrides the same key
/// in an earlier one.
pub fn merge_tags(groups: &[Option<&Tags>]) -> Tags {
    let mut result = Tags::new();
    for group in groups.iter().flatten() {
        result.extend(group.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    result
}
