//! Geographic coordinate conversion.
//!
//! Observations arrive as latitude/longitude but the filter works in a local
//! metric plane. A local equirectangular projection anchored at a fixed
//! origin is accurate to well under a metre at city scale, which is below
//! the GPS noise floor this crate models.

use nalgebra::Vector2;

use crate::tracking::errors::TrackingError;

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Local tangent-plane projection between (lat, lon) degrees and metres.
#[derive(Debug, Clone)]
pub struct GeoProjection {
    origin_lat_rad: f64,
    origin_lon_rad: f64,
    cos_origin_lat: f64,
}

impl GeoProjection {
    /// Anchor a projection at the given origin.
    pub fn new(origin_lat: f64, origin_lon: f64) -> Result<Self, TrackingError> {
        check_coords(origin_lat, origin_lon)?;
        let origin_lat_rad = origin_lat.to_radians();
        Ok(Self {
            origin_lat_rad,
            origin_lon_rad: origin_lon.to_radians(),
            cos_origin_lat: origin_lat_rad.cos(),
        })
    }

    /// Convert geographic coordinates to planar metres.
    pub fn project(&self, lat: f64, lon: f64) -> Result<Vector2<f64>, TrackingError> {
        check_coords(lat, lon)?;
        let x = (lon.to_radians() - self.origin_lon_rad) * self.cos_origin_lat * EARTH_RADIUS_M;
        let y = (lat.to_radians() - self.origin_lat_rad) * EARTH_RADIUS_M;
        Ok(Vector2::new(x, y))
    }

    /// Convert planar metres back to (lat, lon) degrees.
    pub fn unproject(&self, point: &Vector2<f64>) -> Result<(f64, f64), TrackingError> {
        if !point.x.is_finite() || !point.y.is_finite() {
            return Err(TrackingError::NotGeoreferenced {
                description: format!("non-finite planar point ({}, {})", point.x, point.y),
            });
        }
        let lat = (self.origin_lat_rad + point.y / EARTH_RADIUS_M).to_degrees();
        let lon =
            (self.origin_lon_rad + point.x / (EARTH_RADIUS_M * self.cos_origin_lat)).to_degrees();
        check_coords(lat, lon)?;
        Ok((lat, lon))
    }
}

fn check_coords(lat: f64, lon: f64) -> Result<(), TrackingError> {
    if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
        Err(TrackingError::NotGeoreferenced {
            description: format!("invalid coordinate ({}, {})", lat, lon),
        })
    } else {
        Ok(())
    }
}
