use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{ListingStatus, ListingStub};

use super::fingerprint::{fingerprint_listing, Fingerprint};

/// What the store knows about one id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub fingerprint: Fingerprint,
    #[serde(default)]
    pub status: ListingStatus,
}

/// Partition of one run's listings against the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Ids never seen before, in discovery order
    pub new: Vec<String>,
    /// Known ids whose content changed, in discovery order
    pub changed: Vec<String>,
    pub unchanged: Vec<String>,
    /// Active ids missing from the listing, in id order
    pub removed: Vec<String>,
    /// Discovery position of every incoming id
    order: BTreeMap<String, usize>,
}

impl Classification {
    /// New and changed ids merged back into discovery order.
    pub fn to_fetch(&self) -> Vec<String> {
        let mut ids: Vec<&String> = self.new.iter().chain(self.changed.iter()).collect();
        ids.sort_by_key(|id| self.order.get(*id).copied().unwrap_or(usize::MAX));
        ids.into_iter().cloned().collect()
    }

    pub fn incoming_count(&self) -> usize {
        self.new.len() + self.changed.len() + self.unchanged.len()
    }
}

/// Classify incoming listings as new, changed, unchanged or removed.
///
/// Pure: no I/O, same inputs give the same partition. Duplicate incoming ids
/// count once, at their first position. A card too sparse to fingerprint is
/// reported unchanged. Records already marked removed are never reported
/// removed again; if one reappears its active fingerprint differs from the
/// stored removed one, so it comes back as changed.
pub fn classify(existing: &BTreeMap<String, IndexEntry>, incoming: &[ListingStub]) -> Classification {
    let mut result = Classification::default();
    let mut seen: HashSet<&str> = HashSet::with_capacity(incoming.len());

    for stub in incoming {
        if !seen.insert(stub.id.as_str()) {
            continue;
        }
        result.order.insert(stub.id.clone(), result.order.len());

        match existing.get(&stub.id) {
            None => result.new.push(stub.id.clone()),
            Some(entry) => match fingerprint_listing(&stub.basic, ListingStatus::Active) {
                Some(fp) if fp != entry.fingerprint => result.changed.push(stub.id.clone()),
                Some(_) => result.unchanged.push(stub.id.clone()),
                None if entry.status == ListingStatus::Removed => {
                    result.changed.push(stub.id.clone())
                }
                None => result.unchanged.push(stub.id.clone()),
            },
        }
    }

    result.removed = existing
        .iter()
        .filter(|(id, entry)| {
            entry.status == ListingStatus::Active && !seen.contains(id.as_str())
        })
        .map(|(id, _)| id.clone())
        .collect();

    result
}
