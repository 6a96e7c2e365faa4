//! Geolocation value attached to posts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Build a point, rejecting non-finite or out-of-range coordinates
    pub fn new(lat: f64, lng: f64) -> crate::Result<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(Error::InvalidInput(
                "Coordinates must be finite numbers".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(Error::InvalidInput(format!(
                "Latitude {lat} is outside [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(Error::InvalidInput(format!(
                "Longitude {lng} is outside [-180, 180]"
            )));
        }
        Ok(Self { lat, lng })
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lng)
    }
}

/// Parses `"lat,lng"`, as the composer view supplies it
impl FromStr for GeoPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| Error::InvalidInput(format!("Expected \"lat,lng\", got {s:?}")))?;
        let lat = lat
            .trim()
            .parse::<f64>()
            .map_err(|error| Error::InvalidInput(format!("Invalid latitude: {error}")))?;
        let lng = lng
            .trim()
            .parse::<f64>()
            .map_err(|error| Error::InvalidInput(format!("Invalid longitude: {error}")))?;
        Self::new(lat, lng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lat_lng_text() {
        let point: GeoPoint = "37.0,-122.0".parse().unwrap();
        assert_eq!(point, GeoPoint { lat: 37.0, lng: -122.0 });
    }

    #[test]
    fn parse_tolerates_whitespace() {
        let point: GeoPoint = " 59.91 , 10.75 ".parse().unwrap();
        assert_eq!(point.lat, 59.91);
        assert_eq!(point.lng, 10.75);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!("91,0".parse::<GeoPoint>().is_err());
        assert!("0,181".parse::<GeoPoint>().is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn rejects_missing_separator() {
        let err = "37.0".parse::<GeoPoint>().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
