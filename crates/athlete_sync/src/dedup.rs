//! Suppression of measurements that were already uploaded.

use crate::filter::{DropReason, Filtered};
use crate::transform::UploadRecord;
use std::collections::HashSet;

/// Measurement ids known to be present at the destination.
#[derive(Clone, Debug, Default)]
pub struct SeenIds {
    seen: HashSet<String>,
}

impl SeenIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, ids: impl IntoIterator<Item = String>) {
        self.seen.extend(ids);
    }

    /// True if `id` was already seen; otherwise remembers it.
    pub fn is_duplicate(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            true
        } else {
            self.seen.insert(id.to_string());
            false
        }
    }
}

/// Keep records whose id is not in `seen`. A repeated id within the batch
/// is kept once.
pub fn filter_unseen(records: Vec<UploadRecord>, seen: &mut SeenIds) -> Filtered<UploadRecord> {
    let mut out = Filtered::default();
    for r in records {
        if seen.is_duplicate(&r.measurement_id) {
            out.drop_row(r.measurement_id, DropReason::AlreadyUploaded);
        } else {
            out.keep(r);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(id: &str) -> UploadRecord {
        UploadRecord {
            user_id: 42,
            session_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            start_time: "6:55 AM".into(),
            end_time: "7:05 AM".into(),
            time: "7:05 AM".into(),
            measurement_id: id.into(),
            session_type: None,
            acwr: None,
            rmssd: Some(40.0),
        }
    }

    #[test]
    fn deduper_detects_duplicates() {
        let mut d = SeenIds::new();
        assert!(!d.is_duplicate("x"));
        assert!(d.is_duplicate("x"));
    }

    #[test]
    fn known_ids_are_removed() {
        let mut seen = SeenIds::new();
        seen.extend(["b".to_string()]);
        let out = filter_unseen(vec![record("a"), record("b"), record("c")], &mut seen);
        let kept: Vec<_> = out.kept.iter().map(|r| r.measurement_id.as_str()).collect();
        assert_eq!(kept, vec!["a", "c"]);
        assert_eq!(out.count(DropReason::AlreadyUploaded), 1);
    }

    #[test]
    fn empty_snapshot_keeps_everything() {
        let mut seen = SeenIds::new();
        let out = filter_unseen(vec![record("a"), record("b")], &mut seen);
        assert_eq!(out.kept.len(), 2);
    }

    #[test]
    fn repeated_ids_in_one_batch_are_kept_once() {
        let mut seen = SeenIds::new();
        let out = filter_unseen(vec![record("a"), record("a")], &mut seen);
        assert_eq!(out.kept.len(), 1);
        assert_eq!(out.dropped.len(), 1);
    }

    #[test]
    fn all_duplicates_leaves_nothing() {
        let mut seen = SeenIds::new();
        seen.extend(["a".to_string(), "b".to_string()]);
        let out = filter_unseen(vec![record("a"), record("b")], &mut seen);
        assert!(out.is_empty());
    }
}
