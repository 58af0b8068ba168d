//! Canonical extraction record and scan status.

use serde::{Deserialize, Serialize};

/// Normalized address extracted from an envelope image.
///
/// Every provider response is mapped into this shape. String fields default
/// to empty; `confidence` is always an integer percentage in `0..=100`,
/// with 0 meaning "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRecord {
    pub recipient: String,
    pub address_line: String,
    pub postal_code: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub country: String,
    pub sorting_center_id: String,
    pub sorting_center_name: String,
    pub confidence: u8,
}

impl ExtractionRecord {
    /// Whether a sorting center was recommended.
    pub fn has_sorting_center(&self) -> bool {
        !self.sorting_center_id.is_empty() || !self.sorting_center_name.is_empty()
    }

    /// Whether every text field is empty (a parseable but useless response).
    pub fn is_blank(&self) -> bool {
        self.recipient.is_empty()
            && self.address_line.is_empty()
            && self.postal_code.is_empty()
            && self.city.is_empty()
            && self.region.is_none()
            && self.country.is_empty()
            && !self.has_sorting_center()
    }
}

/// Review status persisted alongside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Confidence met the review threshold.
    Extracted,
    /// Low confidence; an operator should check the address.
    NeedsReview,
}

impl ScanStatus {
    /// Derive the status from a record's confidence.
    pub fn for_confidence(confidence: u8, review_threshold: u8) -> Self {
        if confidence >= review_threshold {
            ScanStatus::Extracted
        } else {
            ScanStatus::NeedsReview
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Extracted => "extracted",
            ScanStatus::NeedsReview => "needs_review",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "extracted" => Some(ScanStatus::Extracted),
            "needs_review" => Some(ScanStatus::NeedsReview),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
