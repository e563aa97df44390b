//! Oriented box geometry used for yard volumes and structure bounds.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Slack applied to containment checks so blocks sitting on a face count as inside.
const CONTAINS_EPSILON: f64 = 1e-6;

/// Added to the absolute rotation terms of the separating axis test to stay
/// robust when two edges are nearly parallel.
const SAT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: DVec3,
    pub end: DVec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedBox {
    pub center: DVec3,
    pub half_extents: DVec3,
    pub orientation: DQuat,
}

impl OrientedBox {
    pub fn new(center: DVec3, half_extents: DVec3, orientation: DQuat) -> Self {
        Self {
            center,
            half_extents: half_extents.abs(),
            orientation,
        }
    }

    pub fn axis_aligned(center: DVec3, half_extents: DVec3) -> Self {
        Self::new(center, half_extents, DQuat::IDENTITY)
    }

    /// Smallest box with the given orientation enclosing `points`, grown by
    /// `padding` on every side. `None` for an empty point set.
    pub fn enclosing(points: &[DVec3], orientation: DQuat, padding: f64) -> Option<Self> {
        let inverse = orientation.inverse();
        let mut local = points.iter().map(|p| inverse * *p);
        let first = local.next()?;
        let (min, max) = local.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
        let pad = DVec3::splat(padding);
        let half = (max - min) * 0.5 + pad;
        let center = orientation * ((min + max) * 0.5);
        Some(Self::new(center, half, orientation))
    }

    pub fn axes(&self) -> [DVec3; 3] {
        [
            self.orientation * DVec3::X,
            self.orientation * DVec3::Y,
            self.orientation * DVec3::Z,
        ]
    }

    pub fn to_local(&self, point: DVec3) -> DVec3 {
        self.orientation.inverse() * (point - self.center)
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        let local = self.to_local(point).abs();
        local.x <= self.half_extents.x + CONTAINS_EPSILON
            && local.y <= self.half_extents.y + CONTAINS_EPSILON
            && local.z <= self.half_extents.z + CONTAINS_EPSILON
    }

    /// Corners indexed by bit pattern: bit 0 = +x, bit 1 = +y, bit 2 = +z.
    pub fn corners(&self) -> [DVec3; 8] {
        let mut corners = [DVec3::ZERO; 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let sign = DVec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            );
            *corner = self.center + self.orientation * (sign * self.half_extents);
        }
        corners
    }

    /// True when every corner of `other` lies inside this box.
    pub fn contains_box(&self, other: &OrientedBox) -> bool {
        other.corners().iter().all(|c| self.contains_point(*c))
    }

    /// Separating axis test over the 15 candidate axes.
    pub fn intersects(&self, other: &OrientedBox) -> bool {
        let a = self.axes();
        let b = other.axes();
        let ea = self.half_extents.to_array();
        let eb = other.half_extents.to_array();

        let mut r = [[0.0_f64; 3]; 3];
        let mut abs_r = [[0.0_f64; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                r[i][j] = a[i].dot(b[j]);
                abs_r[i][j] = r[i][j].abs() + SAT_EPSILON;
            }
        }

        let offset = other.center - self.center;
        let t = [offset.dot(a[0]), offset.dot(a[1]), offset.dot(a[2])];

        for i in 0..3 {
            let rb = eb[0] * abs_r[i][0] + eb[1] * abs_r[i][1] + eb[2] * abs_r[i][2];
            if t[i].abs() > ea[i] + rb {
                return false;
            }
        }

        for j in 0..3 {
            let ra = ea[0] * abs_r[0][j] + ea[1] * abs_r[1][j] + ea[2] * abs_r[2][j];
            let tb = t[0] * r[0][j] + t[1] * r[1][j] + t[2] * r[2][j];
            if tb.abs() > ra + eb[j] {
                return false;
            }
        }

        for i in 0..3 {
            let (i1, i2) = ((i + 1) % 3, (i + 2) % 3);
            for j in 0..3 {
                let (j1, j2) = ((j + 1) % 3, (j + 2) % 3);
                let ra = ea[i1] * abs_r[i2][j] + ea[i2] * abs_r[i1][j];
                let rb = eb[j1] * abs_r[i][j2] + eb[j2] * abs_r[i][j1];
                let tl = t[i2] * r[i1][j] - t[i1] * r[i2][j];
                if tl.abs() > ra + rb {
                    return false;
                }
            }
        }

        true
    }

    /// The 12 edges, used for guide and yard outline drawing.
    pub fn edges(&self) -> [Line; 12] {
        let corners = self.corners();
        let mut edges = [Line {
            start: DVec3::ZERO,
            end: DVec3::ZERO,
        }; 12];
        let mut n = 0;
        for i in 0..8 {
            for bit in [1, 2, 4] {
                if i & bit == 0 {
                    edges[n] = Line {
                        start: corners[i],
                        end: corners[i | bit],
                    };
                    n += 1;
                }
            }
        }
        edges
    }

    /// Same box with every half extent scaled by `factor`.
    pub fn inflated(&self, factor: f64) -> Self {
        Self::new(self.center, self.half_extents * factor, self.orientation)
    }
}

/// Limit `v` to a sphere of `radius`, preserving direction.
pub fn clamp_to_sphere(v: DVec3, radius: f64) -> DVec3 {
    v.clamp_length_max(radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> OrientedBox {
        OrientedBox::axis_aligned(DVec3::ZERO, DVec3::splat(1.0))
    }

    #[test]
    fn edges_connect_adjacent_corners() {
        let edges = unit_box().edges();
        for edge in edges {
            let length = (edge.end - edge.start).length();
            assert!((length - 2.0).abs() < 1e-9, "edge length {length}");
        }
    }

    #[test]
    fn enclosing_pads_every_side() {
        let points = [DVec3::new(0.0, 0.0, 0.0), DVec3::new(10.0, 4.0, 2.0)];
        let bounds = OrientedBox::enclosing(&points, DQuat::IDENTITY, 2.5).unwrap();
        assert!((bounds.center - DVec3::new(5.0, 2.0, 1.0)).length() < 1e-9);
        assert!((bounds.half_extents - DVec3::new(7.5, 4.5, 3.5)).length() < 1e-9);
    }

    #[test]
    fn enclosing_empty_is_none() {
        assert!(OrientedBox::enclosing(&[], DQuat::IDENTITY, 1.0).is_none());
    }

    #[test]
    fn clamp_to_sphere_keeps_short_vectors() {
        let v = DVec3::new(0.001, 0.0, 0.0);
        assert_eq!(clamp_to_sphere(v, 0.01), v);
        let long = clamp_to_sphere(DVec3::new(3.0, 4.0, 0.0), 0.01);
        assert!((long.length() - 0.01).abs() < 1e-12);
    }
}
