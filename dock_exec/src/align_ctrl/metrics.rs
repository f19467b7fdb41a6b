//! # Marker metrics
//!
//! Geometry derived from the four corners of a fiducial marker.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Point2, Vector2};
use serde::Serialize;

use comms_if::eqpt::fiducial::MarkerDetection;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A single observation of the target marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerObservation {
    /// Identifier of the observed marker
    pub marker_id: u32,

    /// Corners ordered top-left, top-right, bottom-right, bottom-left
    pub corners: [Point2<f64>; 4],

    /// Frame time.
    ///
    /// Units: seconds
    pub time_s: f64,
}

/// Alignment metrics derived from one observation.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Default)]
pub struct AlignmentMetrics {
    /// Horizontal offset of the marker centroid from the frame centre, positive to the right.
    ///
    /// Units: pixels
    pub lateral_error_px: f64,

    /// Signed skew of the marker.
    ///
    /// Units: degrees
    pub rotation_deg: f64,

    /// Product of two adjacent edge lengths.
    ///
    /// Units: pixels^2
    pub size_proxy_px2: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MarkerObservation {
    /// Build an observation from a detection in a frame taken at `time_s`.
    pub fn from_detection(detection: &MarkerDetection, time_s: f64) -> Self {
        let mut corners = [Point2::origin(); 4];
        for (c, d) in corners.iter_mut().zip(detection.corners.iter()) {
            *c = Point2::new(d[0], d[1]);
        }

        Self {
            marker_id: detection.id,
            corners,
            time_s,
        }
    }

    /// Centroid of the four corners
    pub fn centroid(&self) -> Point2<f64> {
        let sum = self.corners
            .iter()
            .fold(Vector2::zeros(), |acc, c| acc + c.coords);

        Point2::from(sum / 4.0)
    }

    /// Size proxy, the product of the top and right edge lengths.
    pub fn size_proxy(&self) -> f64 {
        let [tl, tr, br, _] = self.corners;

        (tr - tl).norm() * (br - tr).norm()
    }

    /// Returns true if the observation cannot be used for control, i.e. a corner is not finite
    /// or the marker has no area.
    pub fn is_degenerate(&self) -> bool {
        self.corners.iter().any(|c| !c.x.is_finite() || !c.y.is_finite())
            || self.size_proxy() <= 0.0
    }

    /// Compute the alignment metrics of this observation.
    ///
    /// # Inputs
    /// - `frame_width_px`: Width of the camera frame
    /// - `rotation_scale`: Scale applied to the raw skew angle
    /// - `rotation_limit_deg`: Absolute limit of the scaled skew angle
    pub fn metrics(
        &self, 
        frame_width_px: f64, 
        rotation_scale: f64, 
        rotation_limit_deg: f64
    ) -> AlignmentMetrics {
        let [tl, tr, br, bl] = self.corners;

        // Vertical edge heights
        let left_h = (bl - tl).norm();
        let right_h = (br - tr).norm();
        let top_w = tr.x - tl.x;

        // Skew is only defined when both vertical edges are visible and the marker has a width
        let rotation_deg = if left_h > 0.0 && right_h > 0.0 && top_w.abs() > 0.0 {
            let raw = ((right_h - left_h) / top_w).atan().to_degrees().round();
            (raw * rotation_scale).max(-rotation_limit_deg).min(rotation_limit_deg)
        }
        else {
            0.0
        };

        AlignmentMetrics {
            lateral_error_px: self.centroid().x - frame_width_px / 2.0,
            rotation_deg,
            size_proxy_px2: self.size_proxy(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Square marker with the given centre and side length
    fn square(cx: f64, cy: f64, side: f64) -> MarkerObservation {
        let h = side / 2.0;
        MarkerObservation {
            marker_id: 7,
            corners: [
                Point2::new(cx - h, cy - h),
                Point2::new(cx + h, cy - h),
                Point2::new(cx + h, cy + h),
                Point2::new(cx - h, cy + h),
            ],
            time_s: 0.0
        }
    }

    #[test]
    fn test_centred_square() {
        let obs = square(320.0, 240.0, 100.0);
        let m = obs.metrics(640.0, 2.0, 90.0);

        assert_eq!(m.lateral_error_px, 0.0);
        assert_eq!(m.rotation_deg, 0.0);
        assert!((m.size_proxy_px2 - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_lateral_sign() {
        let m = square(400.0, 240.0, 50.0).metrics(640.0, 2.0, 90.0);
        assert_eq!(m.lateral_error_px, 80.0);

        let m = square(300.0, 240.0, 50.0).metrics(640.0, 2.0, 90.0);
        assert_eq!(m.lateral_error_px, -20.0);
    }

    #[test]
    fn test_rotation_from_edge_heights() {
        // Right edge 10 px taller than the left over a 100 px width
        let obs = MarkerObservation {
            marker_id: 1,
            corners: [
                Point2::new(100.0, 100.0),
                Point2::new(200.0, 95.0),
                Point2::new(200.0, 205.0),
                Point2::new(100.0, 200.0),
            ],
            time_s: 0.0
        };
        let m = obs.metrics(640.0, 2.0, 90.0);

        // atan(10/100) = 5.71 deg, rounded to 6, scaled by 2
        assert_eq!(m.rotation_deg, 12.0);

        // Clamped to the limit
        let m = obs.metrics(640.0, 100.0, 90.0);
        assert_eq!(m.rotation_deg, 90.0);
    }

    #[test]
    fn test_degenerate() {
        assert!(square(10.0, 10.0, 0.0).is_degenerate());
        assert!(!square(10.0, 10.0, 1.0).is_degenerate());

        let mut obs = square(10.0, 10.0, 5.0);
        obs.corners[2].x = std::f64::NAN;
        assert!(obs.is_degenerate());
    }

    #[test]
    fn test_from_detection() {
        let det = MarkerDetection {
            id: 3,
            corners: [[0.0, 0.0], [4.0, 0.0], [4.0, 2.0], [0.0, 2.0]]
        };
        let obs = MarkerObservation::from_detection(&det, 1.5);

        assert_eq!(obs.marker_id, 3);
        assert_eq!(obs.time_s, 1.5);
        assert_eq!(obs.centroid(), Point2::new(2.0, 1.0));
        assert_eq!(obs.size_proxy(), 8.0);
    }
}
