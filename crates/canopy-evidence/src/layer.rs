//! Raster layers, time windows and artifact slots

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of the acquisition window ending at the reference instant
pub const WINDOW_DAYS: i64 = 30;

/// A renderable raster product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RasterLayer {
    /// Vegetation index, red = stressed, green = healthy
    Ndvi,
    /// Moisture index, blue = wet, cyan = moderate, red = dry
    Ndmi,
    /// Visible RGB with a 2.5x gain
    TrueColor,
}

impl RasterLayer {
    /// Provider-side render script for this layer
    #[must_use]
    pub const fn evalscript(self) -> &'static str {
        match self {
            Self::Ndvi => NDVI_SCRIPT,
            Self::Ndmi => NDMI_SCRIPT,
            Self::TrueColor => TRUE_COLOR_SCRIPT,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ndvi => "NDVI",
            Self::Ndmi => "NDMI",
            Self::TrueColor => "TRUE_COLOR",
        }
    }
}

impl fmt::Display for RasterLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const NDVI_SCRIPT: &str = r"//VERSION=3
function setup() {
  return { input: ['B04', 'B08'], output: { bands: 3 } };
}
function evaluatePixel(sample) {
  let ndvi = (sample.B08 - sample.B04) / (sample.B08 + sample.B04);
  return [1 - ndvi, ndvi, 0];
}
";

const NDMI_SCRIPT: &str = r"//VERSION=3
function setup() {
  return { input: ['B8A', 'B11'], output: { bands: 3 } };
}
function evaluatePixel(sample) {
  let ndmi = (sample.B8A - sample.B11) / (sample.B8A + sample.B11);
  if (ndmi > 0.2) return [0, 0.5, 1];
  if (ndmi > 0.0) return [0, 1, 1];
  return [1, 0, 0];
}
";

const TRUE_COLOR_SCRIPT: &str = r"//VERSION=3
function setup() {
  return { input: ['B04', 'B03', 'B02'], output: { bands: 3 } };
}
function evaluatePixel(sample) {
  return [2.5 * sample.B04, 2.5 * sample.B03, 2.5 * sample.B02];
}
";

/// Acquisition window `[from, to]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// The [`WINDOW_DAYS`] window ending at `to`
    #[must_use]
    pub fn ending_at(to: DateTime<Utc>) -> Self {
        Self {
            from: to - Duration::days(WINDOW_DAYS),
            to,
        }
    }

    /// Window ending now
    #[must_use]
    pub fn current() -> Self {
        Self::ending_at(Utc::now())
    }

    /// Same-length window ending one calendar year before `now`
    #[must_use]
    pub fn historical(now: DateTime<Utc>) -> Self {
        let end = now
            .checked_sub_months(Months::new(12))
            .unwrap_or(now - Duration::days(365));
        Self::ending_at(end)
    }
}

/// Named artifact positions inside one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSlot {
    NdviCurrent,
    NdviHistorical,
    TrueColorCurrent,
    TrueColorHistorical,
    NdmiCurrent,
}

impl ArtifactSlot {
    pub const ALL: [Self; 5] = [
        Self::NdviCurrent,
        Self::NdviHistorical,
        Self::TrueColorCurrent,
        Self::TrueColorHistorical,
        Self::NdmiCurrent,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NdviCurrent => "ndvi_current",
            Self::NdviHistorical => "ndvi_historical",
            Self::TrueColorCurrent => "true_color_current",
            Self::TrueColorHistorical => "true_color_historical",
            Self::NdmiCurrent => "ndmi_current",
        }
    }

    /// File name inside the request directory
    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.png", self.as_str())
    }

    /// Layer rendered into this slot
    #[must_use]
    pub const fn layer(self) -> RasterLayer {
        match self {
            Self::NdviCurrent | Self::NdviHistorical => RasterLayer::Ndvi,
            Self::TrueColorCurrent | Self::TrueColorHistorical => RasterLayer::TrueColor,
            Self::NdmiCurrent => RasterLayer::Ndmi,
        }
    }
}

impl fmt::Display for ArtifactSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|slot| slot.as_str() == s)
            .ok_or_else(|| format!("unknown artifact slot: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn historical_window_is_a_year_back() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        let current = TimeRange::ending_at(now);
        let past = TimeRange::historical(now);

        assert_eq!(current.to - current.from, Duration::days(30));
        assert_eq!(past.to, Utc.with_ymd_and_hms(2023, 3, 15, 12, 0, 0).unwrap());
        assert_eq!(past.to - past.from, Duration::days(30));
    }

    #[test]
    fn leap_day_clamps_to_month_end() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        let past = TimeRange::historical(now);
        assert_eq!(past.to, Utc.with_ymd_and_hms(2023, 2, 28, 0, 0, 0).unwrap());
    }

    #[test]
    fn slots_parse_from_their_names() {
        for slot in ArtifactSlot::ALL {
            assert_eq!(slot.as_str().parse::<ArtifactSlot>().unwrap(), slot);
        }
        assert!("input".parse::<ArtifactSlot>().is_err());
    }

    #[test]
    fn scripts_read_expected_bands() {
        assert!(RasterLayer::Ndvi.evalscript().contains("'B04', 'B08'"));
        assert!(RasterLayer::Ndmi.evalscript().contains("'B8A', 'B11'"));
        assert!(RasterLayer::TrueColor.evalscript().contains("2.5"));
        assert_eq!(ArtifactSlot::NdmiCurrent.layer(), RasterLayer::Ndmi);
    }
}
