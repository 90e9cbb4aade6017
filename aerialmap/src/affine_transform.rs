use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A one-dimensional linear mapping `value = slope * pixel + intercept`.
///
/// Index PDFs are scanned maps that are not rotated, so each axis of the page
/// maps independently onto one geographic axis (x onto longitude, y onto
/// latitude).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AxisTransform {
    /// Change in the real-world value per PDF unit.
    pub slope: f64,

    /// Real-world value at pixel coordinate zero.
    pub intercept: f64,
}

impl AxisTransform {
    /// Solves the two-sample linear system for one axis.
    ///
    /// # Parameters
    /// - `p1`, `v1`: pixel coordinate and real-world value of the first control point.
    /// - `p2`, `v2`: pixel coordinate and real-world value of the second control point.
    /// - `axis`: axis label used in the error when the samples are degenerate.
    ///
    /// # Returns
    /// An [`AxisTransform`] with `slope = (v1 - v2) / (p1 - p2)` and
    /// `intercept = v1 - slope * p1`. Fails with
    /// [`Error::NonFiniteControlPoint`] when any input is NaN or infinite and
    /// with [`Error::DegenerateControlPoints`] when `p1 == p2`.
    ///
    /// # Examples
    /// ```
    /// # use aerialmap::affine_transform::AxisTransform;
    /// let t = AxisTransform::from_samples(0.0, 10.0, 100.0, 20.0, 'x').unwrap();
    /// assert_eq!(t.slope, 0.1);
    /// assert_eq!(t.intercept, 10.0);
    /// assert!(AxisTransform::from_samples(5.0, 1.0, 5.0, 2.0, 'x').is_err());
    /// ```
    pub fn from_samples(p1: f64, v1: f64, p2: f64, v2: f64, axis: char) -> Result<AxisTransform> {
        if ![p1, v1, p2, v2].iter().all(|v| v.is_finite()) {
            return Err(Error::NonFiniteControlPoint { axis });
        }
        if p1 == p2 {
            return Err(Error::DegenerateControlPoints { axis, value: p1 });
        }
        let slope = (v1 - v2) / (p1 - p2);
        let intercept = v1 - slope * p1;
        Ok(AxisTransform { slope, intercept })
    }

    /// Maps a pixel coordinate onto the real-world axis.
    pub fn apply(&self, pixel: f64) -> f64 {
        self.slope * pixel + self.intercept
    }
}

/// Per-axis affine mapping from PDF page coordinates to geocoordinates.
///
/// A point `(x, y)` on the index page is converted into `(longitude, latitude)` by:
///
/// ```text
///   longitude = x_slope * x + x_intercept;
///   latitude  = y_slope * y + y_intercept;
/// ```
///
/// One transform is derived per index document and applied uniformly to all of
/// its link records.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AffineTransform {
    /// Mapping of the page x axis onto longitude.
    pub x: AxisTransform,

    /// Mapping of the page y axis onto latitude.
    pub y: AxisTransform,
}

impl AffineTransform {
    /// Derives the transform from two control points.
    ///
    /// # Parameters
    /// - `pixel1`, `world1`: page position and `(longitude, latitude)` of the first address.
    /// - `pixel2`, `world2`: page position and `(longitude, latitude)` of the second address.
    ///
    /// # Returns
    /// The transform, or [`Error::DegenerateControlPoints`] if the two control
    /// points share an x or a y pixel coordinate.
    ///
    /// # Examples
    /// ```
    /// # use aerialmap::affine_transform::AffineTransform;
    /// # use nalgebra::Point2;
    /// let t = AffineTransform::from_control_points(
    ///     Point2::new(100.0, 200.0),
    ///     Point2::new(-83.0, 42.5),
    ///     Point2::new(300.0, 600.0),
    ///     Point2::new(-82.0, 42.0),
    /// )
    /// .unwrap();
    ///
    /// let mid = t.transform(&Point2::new(200.0, 400.0));
    /// assert!((mid.x - -82.5).abs() < 1e-12);
    /// assert!((mid.y - 42.25).abs() < 1e-12);
    /// ```
    pub fn from_control_points(
        pixel1: Point2<f64>,
        world1: Point2<f64>,
        pixel2: Point2<f64>,
        world2: Point2<f64>,
    ) -> Result<AffineTransform> {
        let x = AxisTransform::from_samples(pixel1.x, world1.x, pixel2.x, world2.x, 'x')?;
        let y = AxisTransform::from_samples(pixel1.y, world1.y, pixel2.y, world2.y, 'y')?;
        Ok(AffineTransform { x, y })
    }

    /// Transforms a page point into `(longitude, latitude)`.
    pub fn transform(&self, pixel: &Point2<f64>) -> Point2<f64> {
        Point2::new(self.x.apply(pixel.x), self.y.apply(pixel.y))
    }

    /// Returns the coefficients in their persisted form.
    pub fn constants(&self) -> TransformConstants {
        TransformConstants {
            x_slope: self.x.slope,
            x_intercept: self.x.intercept,
            y_slope: self.y.slope,
            y_intercept: self.y.intercept,
        }
    }
}

/// Formula coefficients as stored in georeferencing metadata files.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformConstants {
    #[serde(rename = "X Slope")]
    pub x_slope: f64,
    #[serde(rename = "X Intercept")]
    pub x_intercept: f64,
    #[serde(rename = "Y Slope")]
    pub y_slope: f64,
    #[serde(rename = "Y Intercept")]
    pub y_intercept: f64,
}

impl From<TransformConstants> for AffineTransform {
    fn from(c: TransformConstants) -> Self {
        AffineTransform {
            x: AxisTransform {
                slope: c.x_slope,
                intercept: c.x_intercept,
            },
            y: AxisTransform {
                slope: c.y_slope,
                intercept: c.y_intercept,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn control_points_map_onto_their_geocoordinates() {
        let cases = [
            ((112.5, 640.0), (-82.96, 42.61), (498.25, 97.0), (-82.81, 42.47)),
            ((0.0, 0.0), (-83.5, 42.0), (1.0, 1.0), (-83.4, 42.1)),
            ((350.0, 12.0), (-83.01, 42.33), (-40.0, 900.5), (-83.2, 42.9)),
        ];
        for (p1, v1, p2, v2) in cases {
            let (p1, v1) = (Point2::new(p1.0, p1.1), Point2::new(v1.0, v1.1));
            let (p2, v2) = (Point2::new(p2.0, p2.1), Point2::new(v2.0, v2.1));
            let t = AffineTransform::from_control_points(p1, v1, p2, v2).unwrap();

            let at_first = t.transform(&p1);
            let at_second = t.transform(&p2);
            assert!(close(at_first.x, v1.x) && close(at_first.y, v1.y));
            assert!(close(at_second.x, v2.x) && close(at_second.y, v2.y));
        }
    }

    #[test]
    fn shared_pixel_coordinate_is_rejected_per_axis() {
        let err = AffineTransform::from_control_points(
            Point2::new(10.0, 5.0),
            Point2::new(-83.0, 42.0),
            Point2::new(10.0, 50.0),
            Point2::new(-82.0, 43.0),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DegenerateControlPoints { axis: 'x', .. }));

        let err = AffineTransform::from_control_points(
            Point2::new(10.0, 5.0),
            Point2::new(-83.0, 42.0),
            Point2::new(20.0, 5.0),
            Point2::new(-82.0, 43.0),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DegenerateControlPoints { axis: 'y', .. }));
    }

    #[test]
    fn non_finite_samples_are_rejected() {
        let err = AxisTransform::from_samples(f64::NAN, 1.0, 2.0, 3.0, 'x').unwrap_err();
        assert!(matches!(err, Error::NonFiniteControlPoint { axis: 'x' }));
        assert!(err.to_string().contains("finite"));

        let err = AxisTransform::from_samples(1.0, f64::INFINITY, 2.0, 3.0, 'y').unwrap_err();
        assert!(matches!(err, Error::NonFiniteControlPoint { axis: 'y' }));
        assert!(!err.to_string().contains("share"));
    }

    #[test]
    fn constants_restore_the_same_transform() {
        let t = AffineTransform::from_control_points(
            Point2::new(120.0, 80.0),
            Point2::new(-83.1, 42.7),
            Point2::new(610.0, 720.0),
            Point2::new(-82.6, 42.2),
        )
        .unwrap();
        let json = serde_json::to_string(&t.constants()).unwrap();
        assert!(json.contains("\"X Slope\""));
        let restored: TransformConstants = serde_json::from_str(&json).unwrap();
        assert_eq!(AffineTransform::from(restored), t);
    }
}
