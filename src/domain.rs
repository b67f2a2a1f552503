//! Listing records and the status graph they move through.

use crate::error::{CurbsideError, Result};
use crate::geo::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const MAX_TITLE_LEN: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Pending,
    Collected,
    Expired,
    Deleted,
}

impl ListingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ListingStatus::Collected | ListingStatus::Expired | ListingStatus::Deleted
        )
    }

    /// Legal edges: Active -> {Collected, Expired, Deleted}. Nothing else.
    pub fn can_transition_to(self, next: ListingStatus) -> bool {
        matches!(
            (self, next),
            (
                ListingStatus::Active,
                ListingStatus::Collected | ListingStatus::Expired | ListingStatus::Deleted
            )
        )
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ListingStatus::Active => "active",
            ListingStatus::Pending => "pending",
            ListingStatus::Collected => "collected",
            ListingStatus::Expired => "expired",
            ListingStatus::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Seating,
    Tables,
    Storage,
    Beds,
    Desks,
    Lighting,
    Decor,
    Outdoor,
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Seating,
        Category::Tables,
        Category::Storage,
        Category::Beds,
        Category::Desks,
        Category::Lighting,
        Category::Decor,
        Category::Outdoor,
        Category::Other,
    ];
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Seating => "seating",
            Category::Tables => "tables",
            Category::Storage => "storage",
            Category::Beds => "beds",
            Category::Desks => "desks",
            Category::Lighting => "lighting",
            Category::Decor => "decor",
            Category::Outdoor => "outdoor",
            Category::Other => "other",
        }
    }
}

impl FromStr for Category {
    type Err = CurbsideError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| CurbsideError::validation(format!("unknown category: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    LikeNew,
    Good,
    Fair,
    Worn,
    NeedsRepair,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingLocation {
    pub point: GeoPoint,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: Category,
    pub condition: Condition,
    pub location: ListingLocation,
    pub status: ListingStatus,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub ai_tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub collected_by: Option<String>,
    pub collected_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Listing {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Discoverable listings are Active and inside their TTL.
    pub fn is_discoverable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ListingStatus::Active && !self.is_expired_at(now)
    }

    /// Next version of this record moved to `next`. Fails without touching
    /// `self` when the edge is not in the status graph.
    pub fn transitioned(&self, next: ListingStatus) -> Result<Listing> {
        if !self.status.can_transition_to(next) {
            return Err(CurbsideError::AlreadyResolved { id: self.id, status: self.status });
        }
        let mut updated = self.clone();
        updated.status = next;
        updated.version = self.version + 1;
        Ok(updated)
    }

    /// Next version recording a collection by `collector_id`.
    pub fn collected(&self, collector_id: &str, at: DateTime<Utc>) -> Result<Listing> {
        let mut updated = self.transitioned(ListingStatus::Collected)?;
        updated.collected_by = Some(collector_id.to_string());
        updated.collected_at = Some(at);
        Ok(updated)
    }
}

/// Input from the listing-creation flow. AI fields arrive precomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListing {
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: Category,
    pub condition: Condition,
    pub location: ListingLocation,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub ai_tags: Vec<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

impl NewListing {
    pub fn validate(&self) -> Result<()> {
        if self.owner_id.trim().is_empty() {
            return Err(CurbsideError::validation("owner id is required"));
        }
        let title = self.title.trim();
        if title.is_empty() {
            return Err(CurbsideError::validation("title is required"));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(CurbsideError::validation(format!(
                "title must be at most {MAX_TITLE_LEN} characters"
            )));
        }
        self.location.point.validate()?;
        if let Some(score) = self.confidence_score {
            if !(0.0..=1.0).contains(&score) {
                return Err(CurbsideError::validation(format!(
                    "confidence score must be within [0, 1], got {score}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOutcome {
    Success,
    Conflict,
    AlreadyClaimed,
    NotFound,
    Expired,
    Rejected,
}

/// Audit record for one claim call. Logged, never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimAttempt {
    pub listing_id: Uuid,
    pub collector_id: String,
    pub expected_version: Option<u64>,
    pub outcome: ClaimOutcome,
}
