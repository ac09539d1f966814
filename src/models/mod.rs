use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::fingerprint::Fingerprint;

/// Lifecycle of a stored listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    Active,
    Removed,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Removed => "removed",
        }
    }
}

/// Summary attributes scraped from a search results card.
///
/// Not authoritative; only used to decide whether a listing changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BasicFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bedrooms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bathrooms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parking: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    /// Loosely-typed attributes (scrape timestamps, method tags, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Minimal identity of a listing found on a search page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingStub {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub basic: BasicFields,
}

impl ListingStub {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            basic: BasicFields::default(),
        }
    }

    pub fn with_basic(mut self, basic: BasicFields) -> Self {
        self.basic = basic;
        self
    }
}

/// Address split into components
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Address {
    pub full: Option<String>,
    pub street: Option<String>,
    pub suburb: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
}

impl Address {
    /// Split "12 Smith St, Paddington, QLD, 4064" style addresses.
    pub fn from_full(full: &str) -> Self {
        let full = full.trim();
        if full.is_empty() {
            return Self::default();
        }

        let mut parts = full.split(',').map(str::trim).map(|p| {
            if p.is_empty() {
                None
            } else {
                Some(p.to_string())
            }
        });

        Self {
            full: Some(full.to_string()),
            street: parts.next().flatten(),
            suburb: parts.next().flatten(),
            state: parts.next().flatten(),
            postcode: parts.next().flatten(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageDescriptor {
    pub url: String,
    pub alt: Option<String>,
    /// Where an image downloader would place the file
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentInfo {
    pub name: Option<String>,
    pub agency: Option<String>,
    pub phone: Option<String>,
}

impl AgentInfo {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.agency.is_none() && self.phone.is_none()
    }
}

/// Normalized property data from a detail page.
///
/// The schema only grows: absent members deserialize to their defaults and
/// unknown keys are kept in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PropertyFields {
    pub title: Option<String>,
    pub price: Option<String>,
    pub address: Address,
    pub property_type: Option<String>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<u32>,
    pub parking: Option<u32>,
    pub land_size: Option<String>,
    pub building_size: Option<String>,
    pub description: Option<String>,
    pub features: Vec<String>,
    pub images: Vec<ImageDescriptor>,
    pub agent: AgentInfo,
    pub listing_date: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PropertyFields {
    /// Fill members the detail page did not provide from the search card.
    pub fn backfill_from(&mut self, basic: &BasicFields) {
        fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if slot.is_none() {
                slot.clone_from(value);
            }
        }

        fill(&mut self.title, &basic.title);
        fill(&mut self.price, &basic.price);
        fill(&mut self.property_type, &basic.property_type);
        fill(&mut self.bedrooms, &basic.bedrooms);
        fill(&mut self.bathrooms, &basic.bathrooms);
        fill(&mut self.parking, &basic.parking);
        fill(&mut self.description, &basic.description);
        if self.address.full.is_none() {
            if let Some(full) = &basic.address {
                self.address = Address::from_full(full);
            }
        }
        if self.features.is_empty() {
            self.features.clone_from(&basic.features);
        }
    }
}

/// The durable unit: one per property id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertyRecord {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub fields: PropertyFields,
    /// Search card the record was last captured from
    #[serde(default)]
    pub listing: BasicFields,
    #[serde(default)]
    pub status: ListingStatus,
    pub fingerprint: Fingerprint,
    pub first_seen_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}
