use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::error::{EngineError, Result};
use super::returns::ReturnProvider;

pub const MAX_ALLOCATION_ENTRIES: usize = 3;

// Percentages are summed as integer millionths of a percent, so decimal inputs
// such as 33.333 + 66.667 add up to exactly 100.
const UNITS_PER_PERCENT: f64 = 1_000_000.0;
const FULL_ALLOCATION_UNITS: i64 = 100_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationEntry {
    pub track_id: String,
    pub percentage: f64,
}

impl AllocationEntry {
    pub fn new(track_id: &str, percentage: f64) -> Self {
        Self {
            track_id: track_id.to_string(),
            percentage,
        }
    }
}

/// Validated track weights for one client: 1 to 3 unique tracks summing to 100%.
///
/// Immutable once built. Edits replace the whole set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<AllocationEntry>", into = "Vec<AllocationEntry>")]
pub struct AllocationSet {
    entries: Vec<AllocationEntry>,
}

impl AllocationSet {
    pub fn new(entries: Vec<AllocationEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(EngineError::InvalidAllocation(
                "at least one track is required".to_string(),
            ));
        }
        if entries.len() > MAX_ALLOCATION_ENTRIES {
            return Err(EngineError::InvalidAllocation(format!(
                "at most {MAX_ALLOCATION_ENTRIES} tracks are allowed, got {}",
                entries.len()
            )));
        }

        let mut seen = HashSet::with_capacity(entries.len());
        let mut total_units = 0_i64;
        for entry in &entries {
            if !seen.insert(entry.track_id.as_str()) {
                return Err(EngineError::InvalidAllocation(format!(
                    "track '{}' appears more than once",
                    entry.track_id
                )));
            }
            total_units += percentage_units(entry)?;
        }

        if total_units != FULL_ALLOCATION_UNITS {
            return Err(EngineError::InvalidAllocation(format!(
                "percentages must sum to 100, got {}",
                total_units as f64 / UNITS_PER_PERCENT
            )));
        }

        Ok(Self { entries })
    }

    /// Single-track set holding the whole allocation.
    pub fn single(track_id: &str) -> Self {
        Self {
            entries: vec![AllocationEntry::new(track_id, 100.0)],
        }
    }

    pub fn entries(&self) -> &[AllocationEntry] {
        &self.entries
    }

    pub fn ensure_tracks_known<P: ReturnProvider + ?Sized>(&self, provider: &P) -> Result<()> {
        match self
            .entries
            .iter()
            .find(|entry| !provider.has_track(&entry.track_id))
        {
            Some(entry) => Err(EngineError::UnknownTrack(entry.track_id.clone())),
            None => Ok(()),
        }
    }

    /// Allocation-weighted return for one period. Recomputed on every call.
    pub fn blend<P: ReturnProvider + ?Sized>(&self, period_index: u32, provider: &P) -> Result<f64> {
        let mut blended = 0.0;
        for entry in &self.entries {
            let track_return = provider.return_for(&entry.track_id, period_index)?;
            blended += track_return * entry.percentage / 100.0;
        }
        Ok(blended)
    }
}

impl TryFrom<Vec<AllocationEntry>> for AllocationSet {
    type Error = EngineError;

    fn try_from(value: Vec<AllocationEntry>) -> Result<Self> {
        AllocationSet::new(value)
    }
}

impl From<AllocationSet> for Vec<AllocationEntry> {
    fn from(value: AllocationSet) -> Self {
        value.entries
    }
}

fn percentage_units(entry: &AllocationEntry) -> Result<i64> {
    if !entry.percentage.is_finite() || !(0.0..=100.0).contains(&entry.percentage) {
        return Err(EngineError::InvalidAllocation(format!(
            "percentage for '{}' must be between 0 and 100",
            entry.track_id
        )));
    }
    Ok((entry.percentage * UNITS_PER_PERCENT).round() as i64)
}
