//! Row filtering with an explicit record of what was dropped and why.

use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    MalformedDate,
    MalformedTime,
    OutsideTargetYear,
    NoRosterMatch,
    AmbiguousRosterMatch,
    AlreadyUploaded,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::MalformedDate => "malformed_date",
            DropReason::MalformedTime => "malformed_time",
            DropReason::OutsideTargetYear => "outside_target_year",
            DropReason::NoRosterMatch => "no_roster_match",
            DropReason::AmbiguousRosterMatch => "ambiguous_roster_match",
            DropReason::AlreadyUploaded => "already_uploaded",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroppedRow {
    pub measurement_id: String,
    pub reason: DropReason,
}

/// Output of a filter stage: the rows that survived and the ones that did not.
#[derive(Clone, Debug, PartialEq)]
pub struct Filtered<T> {
    pub kept: Vec<T>,
    pub dropped: Vec<DroppedRow>,
}

impl<T> Default for Filtered<T> {
    fn default() -> Self {
        Self {
            kept: Vec::new(),
            dropped: Vec::new(),
        }
    }
}

impl<T> Filtered<T> {
    pub fn keep(&mut self, item: T) {
        self.kept.push(item);
    }

    pub fn drop_row(&mut self, measurement_id: impl Into<String>, reason: DropReason) {
        self.dropped.push(DroppedRow {
            measurement_id: measurement_id.into(),
            reason,
        });
    }

    pub fn count(&self, reason: DropReason) -> usize {
        self.dropped.iter().filter(|d| d.reason == reason).count()
    }

    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    /// Log a per-reason summary for `stage` and bump the dropped-rows counter.
    pub fn report(&self, stage: &str) {
        let mut by_reason: BTreeMap<DropReason, usize> = BTreeMap::new();
        for d in &self.dropped {
            *by_reason.entry(d.reason).or_default() += 1;
        }
        for (reason, n) in &by_reason {
            metrics::counter!("athlete_sync_rows_dropped_total", "reason" => reason.as_str())
                .increment(*n as u64);
            match reason {
                DropReason::AlreadyUploaded | DropReason::OutsideTargetYear => {
                    info!(stage, %reason, "dropped {} rows", n)
                }
                _ => warn!(stage, %reason, "dropped {} rows", n),
            }
        }
        for d in &self.dropped {
            tracing::debug!(stage, reason = %d.reason, "dropped {}", d.measurement_id);
        }
        info!(stage, "kept {} rows", self.kept.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_reason() {
        let mut f: Filtered<u32> = Filtered::default();
        f.keep(1);
        f.drop_row("a", DropReason::MalformedDate);
        f.drop_row("b", DropReason::MalformedDate);
        f.drop_row("c", DropReason::NoRosterMatch);
        assert_eq!(f.count(DropReason::MalformedDate), 2);
        assert_eq!(f.count(DropReason::AlreadyUploaded), 0);
        assert!(!f.is_empty());
    }

    #[test]
    fn report_counts_drops_per_reason() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let mut f: Filtered<u32> = Filtered::default();
        f.drop_row("a", DropReason::MalformedDate);
        f.drop_row("b", DropReason::MalformedDate);
        f.drop_row("c", DropReason::NoRosterMatch);

        metrics::with_local_recorder(&recorder, || f.report("transform"));
        let rendered = handle.render();
        assert!(rendered.contains(r#"athlete_sync_rows_dropped_total{reason="malformed_date"} 2"#));
        assert!(rendered.contains(r#"athlete_sync_rows_dropped_total{reason="no_roster_match"} 1"#));
    }
}
