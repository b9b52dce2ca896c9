use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::{EngineError, Result};

/// Source of monthly fractional returns per investment track.
pub trait ReturnProvider {
    /// Return for `track_id` in the 1-based `period_index`.
    fn return_for(&self, track_id: &str, period_index: u32) -> Result<f64>;

    fn has_track(&self, track_id: &str) -> bool;
}

/// Finite monthly return history per track, read cyclically.
///
/// Periods beyond the recorded history wrap around to the start of the series.
/// This is an approximation (history repeats), not an extrapolation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Vec<f64>>", into = "BTreeMap<String, Vec<f64>>")]
pub struct HistoricalReturns {
    series: BTreeMap<String, Vec<f64>>,
}

impl HistoricalReturns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, track_id: &str, returns: Vec<f64>) -> Result<Self> {
        self.register(track_id, returns)?;
        Ok(self)
    }

    /// Registers or replaces the series for `track_id`.
    pub fn register(&mut self, track_id: &str, returns: Vec<f64>) -> Result<()> {
        if track_id.trim().is_empty() {
            return Err(EngineError::InvalidTrackSeries(
                "track id must not be empty".to_string(),
            ));
        }
        if returns.is_empty() {
            return Err(EngineError::InvalidTrackSeries(format!(
                "series for '{track_id}' is empty"
            )));
        }
        if let Some(idx) = returns.iter().position(|r| !r.is_finite() || *r < -1.0) {
            return Err(EngineError::InvalidTrackSeries(format!(
                "series for '{track_id}' has an invalid return at month {}",
                idx + 1
            )));
        }
        self.series.insert(track_id.to_string(), returns);
        Ok(())
    }

    pub fn track_ids(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn series_len(&self, track_id: &str) -> Option<usize> {
        self.series.get(track_id).map(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl ReturnProvider for HistoricalReturns {
    fn return_for(&self, track_id: &str, period_index: u32) -> Result<f64> {
        let returns = self
            .series
            .get(track_id)
            .ok_or_else(|| EngineError::UnknownTrack(track_id.to_string()))?;
        // Period 0 is not a valid period; treat it as the first month.
        let offset = period_index.max(1) as usize - 1;
        Ok(returns[offset % returns.len()])
    }

    fn has_track(&self, track_id: &str) -> bool {
        self.series.contains_key(track_id)
    }
}

impl TryFrom<BTreeMap<String, Vec<f64>>> for HistoricalReturns {
    type Error = EngineError;

    fn try_from(value: BTreeMap<String, Vec<f64>>) -> Result<Self> {
        let mut table = HistoricalReturns::new();
        for (track_id, returns) in value {
            table.register(&track_id, returns)?;
        }
        Ok(table)
    }
}

impl From<HistoricalReturns> for BTreeMap<String, Vec<f64>> {
    fn from(value: HistoricalReturns) -> Self {
        value.series
    }
}

/// Illustrative two-year monthly return table used when no reference store is supplied.
pub fn sample_tracks() -> HistoricalReturns {
    let mut series = BTreeMap::new();
    series.insert(
        "SPY500".to_string(),
        vec![
            0.0627, -0.0261, 0.0351, 0.0146, 0.0025, 0.0647, 0.0311, -0.0177, -0.0487, -0.0220,
            0.0892, 0.0442, 0.0159, 0.0517, 0.0310, -0.0416, 0.0480, 0.0347, 0.0113, 0.0228,
            0.0201, -0.0099, 0.0573, -0.0250,
        ],
    );
    series.insert(
        "NASDAQ".to_string(),
        vec![
            0.1068, -0.0111, 0.0669, 0.0004, 0.0580, 0.0659, 0.0405, -0.0217, -0.0581, -0.0278,
            0.1070, 0.0552, 0.0102, 0.0612, 0.0180, -0.0441, 0.0688, 0.0596, -0.0075, 0.0065,
            0.0268, -0.0052, 0.0621, 0.0048,
        ],
    );
    series.insert(
        "BONDS".to_string(),
        vec![
            0.0312, -0.0259, 0.0254, 0.0061, -0.0109, -0.0036, -0.0007, -0.0064, -0.0249, -0.0158,
            0.0453, 0.0383, -0.0027, -0.0141, 0.0092, -0.0253, 0.0170, 0.0095, 0.0234, 0.0144,
            0.0134, -0.0248, 0.0106, -0.0164,
        ],
    );
    series.insert(
        "GOLD".to_string(),
        vec![
            0.0572, -0.0532, 0.0780, 0.0107, -0.0137, -0.0221, 0.0236, -0.0127, -0.0472, 0.0731,
            0.0267, 0.0128, -0.0127, 0.0060, 0.0907, 0.0293, 0.0181, -0.0002, 0.0518, 0.0228,
            0.0524, 0.0415, -0.0364, -0.0068,
        ],
    );
    HistoricalReturns { series }
}
