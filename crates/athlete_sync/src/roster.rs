//! Name-to-id resolution against the destination platform's user directory.

use athlete_sync_client::RosterEntry;
use std::collections::HashMap;
use tracing::warn;

pub type UserId = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Resolved(UserId),
    Unmatched,
    /// The name belongs to more than one user; nothing is attributed.
    Ambiguous,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    One(UserId),
    Many,
}

/// Lookup keyed on the normalized `(first, last)` name pair.
#[derive(Clone, Debug, Default)]
pub struct Roster {
    by_name: HashMap<(String, String), Slot>,
}

/// Trimmed, lower-cased form used as the join key.
pub fn normalize_name(s: &str) -> String {
    s.trim().to_lowercase()
}

impl Roster {
    pub fn from_entries(entries: impl IntoIterator<Item = RosterEntry>) -> Self {
        let mut by_name: HashMap<(String, String), Slot> = HashMap::new();
        for e in entries {
            let key = (normalize_name(&e.first_name), normalize_name(&e.last_name));
            by_name
                .entry(key)
                .and_modify(|slot| {
                    if *slot != Slot::One(e.user_id) {
                        *slot = Slot::Many;
                    }
                })
                .or_insert(Slot::One(e.user_id));
        }
        let roster = Self { by_name };
        for (first, last) in roster.ambiguous_names() {
            warn!("roster name {} {} maps to several users; it will not be matched", first, last);
        }
        roster
    }

    pub fn resolve(&self, first: &str, last: &str) -> Resolution {
        match self
            .by_name
            .get(&(normalize_name(first), normalize_name(last)))
        {
            Some(Slot::One(id)) => Resolution::Resolved(*id),
            Some(Slot::Many) => Resolution::Ambiguous,
            None => Resolution::Unmatched,
        }
    }

    pub fn ambiguous_names(&self) -> Vec<(String, String)> {
        let mut names: Vec<_> = self
            .by_name
            .iter()
            .filter(|(_, slot)| **slot == Slot::Many)
            .map(|(k, _)| k.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }
}
