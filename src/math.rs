//! Angle utilities and nalgebra extensions for working on the circular heading domain

use nalgebra::Vector2;

/// Mathematical constants
pub const DEG_TO_RAD: f64 = core::f64::consts::PI / 180.0;
pub const RAD_TO_DEG: f64 = 180.0 / core::f64::consts::PI;

/// One full turn in degrees
pub const FULL_TURN: f64 = 360.0;

/// Wrap an angle in degrees into `[0, 360)`
///
/// # Example
/// ```
/// use compass_heading::normalize_degrees;
///
/// assert_eq!(normalize_degrees(-90.0), 270.0);
/// assert_eq!(normalize_degrees(360.0), 0.0);
/// assert_eq!(normalize_degrees(725.0), 5.0);
/// ```
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees % FULL_TURN;
    let wrapped = if wrapped < 0.0 { wrapped + FULL_TURN } else { wrapped };

    // -1e-15 + 360.0 rounds to 360.0
    if wrapped >= FULL_TURN { 0.0 } else { wrapped }
}

/// Signed shortest rotation from `from` to `to`, in `(-180, 180]` degrees
///
/// # Example
/// ```
/// use compass_heading::angular_difference;
///
/// assert_eq!(angular_difference(359.0, 1.0), 2.0);
/// assert_eq!(angular_difference(1.0, 359.0), -2.0);
/// ```
pub fn angular_difference(from: f64, to: f64) -> f64 {
    let delta = normalize_degrees(to - from);
    if delta > 180.0 { delta - FULL_TURN } else { delta }
}

/// Extension trait mapping headings to and from unit vectors
///
/// The vector layout is `(cos, sin)`, so summing vectors and reading the
/// heading back gives the circular mean direction.
pub trait HeadingVectorExt {
    /// Unit vector pointing along `heading` degrees
    fn from_heading(heading: f64) -> Vector2<f64>;

    /// Direction of the vector as a heading in `[0, 360)`
    fn to_heading(&self) -> f64;
}

impl HeadingVectorExt for Vector2<f64> {
    fn from_heading(heading: f64) -> Vector2<f64> {
        let radians = heading * DEG_TO_RAD;
        Vector2::new(radians.cos(), radians.sin())
    }

    fn to_heading(&self) -> f64 {
        normalize_degrees(self.y.atan2(self.x) * RAD_TO_DEG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(0.0), 0.0);
        assert_eq!(normalize_degrees(359.5), 359.5);
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(-1.0), 359.0);
        assert_eq!(normalize_degrees(-720.0), 0.0);

        // Tiny negative values must not wrap to exactly 360
        let tiny = normalize_degrees(-1e-15);
        assert!((0.0..FULL_TURN).contains(&tiny), "got {}", tiny);
    }

    #[test]
    fn test_angular_difference() {
        assert_eq!(angular_difference(10.0, 20.0), 10.0);
        assert_eq!(angular_difference(20.0, 10.0), -10.0);
        assert_eq!(angular_difference(350.0, 10.0), 20.0);
        assert_eq!(angular_difference(0.0, 180.0), 180.0);
        assert_eq!(angular_difference(90.0, 90.0), 0.0);
    }

    #[test]
    fn test_heading_vector_round_trip_cardinals() {
        for heading in [0.0, 90.0, 180.0, 270.0] {
            let vector = Vector2::<f64>::from_heading(heading);
            assert!((vector.magnitude() - 1.0).abs() < 1e-12);

            let recovered = vector.to_heading();
            assert!(
                angular_difference(heading, recovered).abs() < 1e-9,
                "heading {} came back as {}",
                heading,
                recovered
            );
        }
    }

    #[test]
    fn test_to_heading_of_zero_vector_is_finite() {
        let heading = Vector2::<f64>::zeros().to_heading();
        assert!(heading.is_finite());
    }
}
