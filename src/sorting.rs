//! Sorting-center lookup by postal-code prefix.
//!
//! Models usually recommend a sorting center themselves. When one doesn't,
//! and a directory is configured, the longest matching prefix of the
//! extracted postal code picks the center.

use crate::config::{Settings, SortingCenterEntry};
use crate::extract::ExtractionRecord;

/// Postal-code prefix table.
#[derive(Debug, Clone, Default)]
pub struct SortingDirectory {
    /// Sorted by descending prefix length so the first match is the longest.
    centers: Vec<SortingCenterEntry>,
}

impl SortingDirectory {
    pub fn new(centers: Vec<SortingCenterEntry>) -> Self {
        let mut centers: Vec<SortingCenterEntry> = centers
            .into_iter()
            .map(|mut entry| {
                entry.prefix = compact(&entry.prefix);
                entry
            })
            .filter(|entry| !entry.prefix.is_empty())
            .collect();
        centers.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { centers }
    }

    /// Directory from settings, if filling is enabled and entries exist.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        if !settings.sorting.fill_missing || settings.sorting.centers.is_empty() {
            return None;
        }
        Some(Self::new(settings.sorting.centers.clone()))
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    /// Longest-prefix match for a postal code, ignoring spaces and case.
    pub fn lookup(&self, postal_code: &str) -> Option<&SortingCenterEntry> {
        let code = compact(postal_code);
        if code.is_empty() {
            return None;
        }
        self.centers
            .iter()
            .find(|entry| code.starts_with(&entry.prefix))
    }

    /// Fill an absent recommendation. Returns whether the record changed.
    pub fn fill_missing(&self, record: &mut ExtractionRecord) -> bool {
        if record.has_sorting_center() {
            return false;
        }
        match self.lookup(&record.postal_code) {
            Some(entry) => {
                record.sorting_center_id = entry.id.clone();
                record.sorting_center_name = entry.name.clone();
                true
            }
            None => false,
        }
    }
}

fn compact(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase()
}
