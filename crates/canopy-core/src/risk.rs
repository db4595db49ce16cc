//! Fire-risk scoring
//!
//! Fixed additive rule, strict comparisons:
//!
//! | signal | threshold | points |
//! |---|---|---|
//! | dryness | > 40 | 50 |
//! | wind | > 5 m/s | 30 |
//! | temperature | > 28 °C | 20 |
//!
//! CRITICAL when the total exceeds 60.

use crate::types::RiskLevel;
use crate::weather::WeatherReport;
use serde::{Deserialize, Serialize};

/// Dryness score (0-100) above which a site counts as dry
pub const DRYNESS_THRESHOLD: f64 = 40.0;
pub const DRYNESS_POINTS: u32 = 50;
/// Wind speed in m/s
pub const WIND_THRESHOLD: f64 = 5.0;
pub const WIND_POINTS: u32 = 30;
/// Air temperature in °C
pub const TEMPERATURE_THRESHOLD: f64 = 28.0;
pub const TEMPERATURE_POINTS: u32 = 20;
/// Totals strictly above this are CRITICAL
pub const CRITICAL_ABOVE: u32 = 60;

/// Scored fire risk for one site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Conditions the score was computed from
    pub weather: WeatherReport,
    pub dryness_score: f64,
    /// Sum of the points earned, 0 to 100
    pub risk_score: u32,
    pub risk_level: RiskLevel,
}

/// Apply the additive rule to one weather report and dryness score
#[must_use]
pub fn score(weather: &WeatherReport, dryness_score: f64) -> RiskAssessment {
    let mut risk_score = 0;
    if dryness_score > DRYNESS_THRESHOLD {
        risk_score += DRYNESS_POINTS;
    }
    if weather.wind_speed > WIND_THRESHOLD {
        risk_score += WIND_POINTS;
    }
    if weather.temperature > TEMPERATURE_THRESHOLD {
        risk_score += TEMPERATURE_POINTS;
    }
    let risk_level = if risk_score > CRITICAL_ABOVE {
        RiskLevel::Critical
    } else {
        RiskLevel::Normal
    };

    RiskAssessment {
        weather: weather.clone(),
        dryness_score,
        risk_score,
        risk_level,
    }
}
