//! Coordinates and bounding boxes (WGS84 / CRS84 axis order)

use crate::error::GeoError;
use serde::{Deserialize, Serialize};

/// Default half-width (degrees) of the box fetched around a point
pub const DEFAULT_HALF_WIDTH_DEG: f64 = 0.01;

/// A validated latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Validate and build coordinates
    ///
    /// # Errors
    /// Returns [`GeoError`] when either component is non-finite or out of range.
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::Latitude(lat));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(GeoError::Longitude(lng));
        }
        Ok(Self { lat, lng })
    }
}

/// Axis-aligned box in `[min_lng, min_lat, max_lng, max_lat]` order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 4]", try_from = "[f64; 4]")]
pub struct BoundingBox {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Square box of `half_width` degrees around `center`
    #[must_use]
    pub fn around(center: Coordinates, half_width: f64) -> Self {
        Self {
            min_lng: center.lng - half_width,
            min_lat: center.lat - half_width,
            max_lng: center.lng + half_width,
            max_lat: center.lat + half_width,
        }
    }

    /// Validate an explicit `[min_lng, min_lat, max_lng, max_lat]` array
    ///
    /// # Errors
    /// Returns [`GeoError`] if a corner is out of range or the box is empty.
    pub fn from_corners(corners: [f64; 4]) -> Result<Self, GeoError> {
        let [min_lng, min_lat, max_lng, max_lat] = corners;
        Coordinates::new(min_lat, min_lng)?;
        Coordinates::new(max_lat, max_lng)?;
        if min_lng >= max_lng || min_lat >= max_lat {
            return Err(GeoError::BoundingBox(format!(
                "[{min_lng}, {min_lat}, {max_lng}, {max_lat}] has no area"
            )));
        }
        Ok(Self {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        })
    }

    /// Corners in provider order
    #[inline]
    #[must_use]
    pub fn to_array(self) -> [f64; 4] {
        [self.min_lng, self.min_lat, self.max_lng, self.max_lat]
    }

    /// Whether `point` lies inside the box (edges inclusive)
    #[must_use]
    pub fn contains(&self, point: Coordinates) -> bool {
        (self.min_lng..=self.max_lng).contains(&point.lng)
            && (self.min_lat..=self.max_lat).contains(&point.lat)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(value: BoundingBox) -> Self {
        value.to_array()
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = GeoError;

    fn try_from(value: [f64; 4]) -> Result<Self, Self::Error> {
        Self::from_corners(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(matches!(Coordinates::new(90.5, 0.0), Err(GeoError::Latitude(_))));
        assert!(matches!(Coordinates::new(0.0, -181.0), Err(GeoError::Longitude(_))));
        assert!(matches!(Coordinates::new(f64::NAN, 0.0), Err(GeoError::Latitude(_))));
        assert!(Coordinates::new(-3.46, -62.21).is_ok());
    }

    #[test]
    fn default_box_is_centered() {
        let center = Coordinates::new(-3.46, -62.21).unwrap();
        let bbox = BoundingBox::around(center, DEFAULT_HALF_WIDTH_DEG);
        let [a, b, c, d] = bbox.to_array();
        assert!((a - -62.22).abs() < 1e-9);
        assert!((b - -3.47).abs() < 1e-9);
        assert!((c - -62.20).abs() < 1e-9);
        assert!((d - -3.45).abs() < 1e-9);
    }

    #[test]
    fn inverted_box_is_rejected() {
        let err = BoundingBox::from_corners([10.0, 0.0, 9.0, 1.0]).unwrap_err();
        assert!(matches!(err, GeoError::BoundingBox(_)));
    }

    #[test]
    fn bbox_serde_uses_array_form() {
        let bbox = BoundingBox::from_corners([1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(serde_json::to_string(&bbox).unwrap(), "[1.0,2.0,3.0,4.0]");
        let bad: Result<BoundingBox, _> = serde_json::from_str("[3.0,2.0,1.0,4.0]");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn default_box_contains_its_center(lat in -89.0f64..89.0, lng in -179.0f64..179.0) {
            let center = Coordinates::new(lat, lng).unwrap();
            let bbox = BoundingBox::around(center, DEFAULT_HALF_WIDTH_DEG);
            prop_assert!(bbox.contains(center));
            prop_assert!(BoundingBox::from_corners(bbox.to_array()).is_ok());
        }
    }
}
