//! Version retention

use cutover_types::StackRecord;

/// Versions of a stack to delete so that at most `keep_count + 1` remain.
///
/// `versions` holds every live record of one stack name. They are ordered
/// oldest first by creation time, ties broken by version, and all but the
/// newest `keep_count + 1` are returned.
pub fn versions_to_remove(versions: &[StackRecord], keep_count: u32) -> Vec<&StackRecord> {
    let mut ordered: Vec<&StackRecord> = versions.iter().collect();
    ordered.sort_by(|a, b| {
        a.creation_time
            .cmp(&b.creation_time)
            .then_with(|| a.stack_version.cmp(&b.stack_version))
    });

    let keep = usize::try_from(keep_count)
        .unwrap_or(usize::MAX)
        .saturating_add(1);
    let excess = ordered.len().saturating_sub(keep);
    ordered.truncate(excess);
    ordered
}
