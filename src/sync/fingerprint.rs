use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{BasicFields, ListingStatus, PropertyRecord};

/// Hex SHA-256 digest over the content members of a listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The members that count as "content". Declaration order is the hash order.
#[derive(Debug, Serialize)]
struct ContentView<'a> {
    title: Option<&'a str>,
    price: Option<&'a str>,
    description: Option<&'a str>,
    features: Vec<&'a str>,
    status: &'static str,
}

/// Empty and whitespace-only strings hash the same as a missing value.
fn canonical(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Fingerprint a search card with the given status.
///
/// Returns `None` when the card carries no content members at all, which the
/// detector treats as "no evidence of change".
pub fn fingerprint_listing(basic: &BasicFields, status: ListingStatus) -> Option<Fingerprint> {
    let mut features: Vec<&str> = basic
        .features
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    features.sort_unstable();

    let view = ContentView {
        title: canonical(basic.title.as_ref()),
        price: canonical(basic.price.as_ref()),
        description: canonical(basic.description.as_ref()),
        features,
        status: status.as_str(),
    };

    if view.title.is_none() && view.price.is_none() && view.description.is_none() {
        return None;
    }

    // Serializing a struct of strings and a Vec cannot fail.
    let encoded = serde_json::to_vec(&view).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    Some(Fingerprint(hex::encode(hasher.finalize())))
}

/// Fingerprint stored alongside a record.
///
/// Records built from a card with no content still get a digest (of the id)
/// so every stored record carries one.
pub fn fingerprint_record(record_id: &str, listing: &BasicFields, status: ListingStatus) -> Fingerprint {
    fingerprint_listing(listing, status).unwrap_or_else(|| {
        let mut hasher = Sha256::new();
        hasher.update(b"id:");
        hasher.update(record_id.as_bytes());
        hasher.update(status.as_str().as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    })
}

impl PropertyRecord {
    /// Recompute the stored fingerprint from the current listing and status.
    pub fn refresh_fingerprint(&mut self) {
        self.fingerprint = fingerprint_record(&self.id, &self.listing, self.status);
    }
}
