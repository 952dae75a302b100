//! 3-D geometry primitives used throughout the galaxy model.

use serde::{Deserialize, Serialize};

/// A point in 3-D galactic coordinate space, measured in light years.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Sol, the fixed origin of the galactic coordinate system.
pub const SOL: Point3D = Point3D::new(0.0, 0.0, 0.0);

/// Backwards-compatible alias matching the name used in the RPC wording.
#[allow(non_upper_case_globals)]
pub const Sol: Point3D = SOL;

/// Euclidean distance between two points, in light years.
pub fn distance(p: Point3D, q: Point3D) -> f64 {
    let dx = p.x - q.x;
    let dy = p.y - q.y;
    let dz = p.z - q.z;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_sol_to_alpha_centauri() {
        let alpha_centauri = Point3D::new(3.03, -0.09, 3.17);
        let d = distance(SOL, alpha_centauri);
        assert!((d - 4.379).abs() < 1e-3, "distance was {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Point3D::new(1.0, 2.0, 3.0);
        let b = Point3D::new(-4.0, 5.0, -6.0);
        assert_eq!(distance(a, b), distance(b, a));
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = Point3D::new(12.5, -3.25, 0.0);
        assert_eq!(distance(a, a), 0.0);
    }
}
