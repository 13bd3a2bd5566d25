// winding.rs — Polygon windings and plane-set geometry

use crate::math::{
    cross_product, dot_product, vector_add, vector_compare_epsilon, vector_ma, vector_normalize,
    vector_scale, vector_subtract, Vec3,
};
use crate::plane::{Plane, ON_EPSILON, SIDE_BACK, SIDE_FRONT, SIDE_ON};

/// Half-extent of the seed quad; larger than any legal map coordinate.
pub const BOGUS_RANGE: f32 = 131072.0;

/// Determinant cutoff for a near-singular plane triple.
const SOLVE_EPSILON: f32 = 0.001;

/// Side slop when testing candidate vertices against the full plane set.
/// Production compilers leave this much numeric drift in face planes.
const POINT_EPSILON: f32 = 0.1;

/// Colinearity cutoff when dropping redundant winding points.
const COLINEAR_EPSILON: f32 = 0.001;

#[derive(Debug, Clone, Default)]
pub struct Winding {
    pub points: Vec<Vec3>,
}

impl Winding {
    pub fn new(points: Vec<Vec3>) -> Self {
        Self { points }
    }

    /// Seed quad: 4 huge points on the plane, wound facing the normal.
    pub fn from_plane(plane: &Plane) -> Self {
        // pick the axis the normal is least aligned with
        let mut max = -1.0;
        let mut x = 0;
        for i in 0..3 {
            let v = plane.normal[i].abs();
            if v > max {
                max = v;
                x = i;
            }
        }

        let mut vup: Vec3 = match x {
            0 | 1 => [0.0, 0.0, 1.0],
            _ => [1.0, 0.0, 0.0],
        };
        let v = dot_product(&vup, &plane.normal);
        vup = vector_ma(&vup, -v, &plane.normal);
        vector_normalize(&mut vup);

        let org = vector_scale(&plane.normal, plane.dist);
        let vright = cross_product(&vup, &plane.normal);

        let vup = vector_scale(&vup, BOGUS_RANGE);
        let vright = vector_scale(&vright, BOGUS_RANGE);

        Self {
            points: vec![
                vector_subtract(&vector_add(&org, &vup), &vright),
                vector_add(&vector_add(&org, &vup), &vright),
                vector_subtract(&vector_add(&org, &vright), &vup),
                vector_subtract(&vector_subtract(&org, &vright), &vup),
            ],
        }
    }

    /// Keep the part of the winding in front of the plane.
    ///
    /// Points within ON_EPSILON of the plane are kept (on `keep_on`) or
    /// treated as back-side (otherwise). Returns None when nothing remains.
    pub fn clip(&self, split: &Plane, keep_on: bool) -> Option<Winding> {
        let n = self.points.len();
        if n == 0 {
            return None;
        }

        let mut dists = Vec::with_capacity(n + 1);
        let mut sides = Vec::with_capacity(n + 1);
        let mut counts = [0usize; 3];

        for p in &self.points {
            let d = dot_product(&split.normal, p) - split.dist;
            let side = if d > ON_EPSILON {
                SIDE_FRONT
            } else if d < -ON_EPSILON {
                SIDE_BACK
            } else {
                SIDE_ON
            };
            dists.push(d);
            sides.push(side);
            counts[side as usize] += 1;
        }
        dists.push(dists[0]);
        sides.push(sides[0]);

        if counts[SIDE_FRONT as usize] == 0 {
            // entirely on or behind
            if keep_on && counts[SIDE_BACK as usize] == 0 {
                return Some(self.clone());
            }
            return None;
        }
        if counts[SIDE_BACK as usize] == 0 {
            return Some(self.clone());
        }

        let mut out: Vec<Vec3> = Vec::with_capacity(n + 4);
        for i in 0..n {
            let p1 = self.points[i];

            if sides[i] == SIDE_ON {
                out.push(p1);
                continue;
            }
            if sides[i] == SIDE_FRONT {
                out.push(p1);
            }
            if sides[i + 1] == SIDE_ON || sides[i + 1] == sides[i] {
                continue;
            }

            // crossing: emit the exact intersection point
            let p2 = self.points[(i + 1) % n];
            let dot = dists[i] / (dists[i] - dists[i + 1]);
            let mut mid = [0.0f32; 3];
            for j in 0..3 {
                // snap exactly onto axial planes
                if split.normal[j] == 1.0 {
                    mid[j] = split.dist;
                } else if split.normal[j] == -1.0 {
                    mid[j] = -split.dist;
                } else {
                    mid[j] = p1[j] + dot * (p2[j] - p1[j]);
                }
            }
            out.push(mid);
        }

        let w = Winding::new(out).remove_colinear();
        if w.points.len() < 3 {
            return None;
        }
        Some(w)
    }

    /// Drop points that lie on the segment between their neighbors.
    pub fn remove_colinear(mut self) -> Winding {
        let n = self.points.len();
        if n < 3 {
            return self;
        }
        let mut keep: Vec<Vec3> = Vec::with_capacity(n);
        for i in 0..n {
            let prev = self.points[(i + n - 1) % n];
            let cur = self.points[i];
            let next = self.points[(i + 1) % n];

            let mut d1 = vector_subtract(&cur, &prev);
            let mut d2 = vector_subtract(&next, &cur);
            vector_normalize(&mut d1);
            vector_normalize(&mut d2);
            if dot_product(&d1, &d2) < 1.0 - COLINEAR_EPSILON {
                keep.push(cur);
            }
        }
        self.points = keep;
        self
    }

    /// Area of the (convex) winding.
    pub fn area(&self) -> f32 {
        let mut total = 0.0;
        for i in 2..self.points.len() {
            let d1 = vector_subtract(&self.points[i - 1], &self.points[0]);
            let d2 = vector_subtract(&self.points[i], &self.points[0]);
            let cross = cross_product(&d1, &d2);
            total += 0.5 * (cross[0] * cross[0] + cross[1] * cross[1] + cross[2] * cross[2]).sqrt();
        }
        total
    }
}

// ============================================================
// Convex polyhedron reconstruction
// ============================================================

/// Vertices of the convex polyhedron bounded by `planes` (normals facing out).
///
/// Solves every plane triple, discards near-singular triples and points
/// outside any plane, and merges near-duplicates. Returns None when the set
/// does not bound a valid convex solid: duplicate planes, or fewer than 4
/// distinct vertices.
pub fn intersect_planes(planes: &[Plane]) -> Option<Vec<Vec3>> {
    let n = planes.len();
    if n < 4 {
        return None;
    }

    for i in 0..n {
        for j in i + 1..n {
            if planes[i].coincident(&planes[j]) {
                return None;
            }
        }
    }

    let mut verts: Vec<Vec3> = Vec::new();

    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let n1 = &planes[i].normal;
                let n2 = &planes[j].normal;
                let n3 = &planes[k].normal;

                let c23 = cross_product(n2, n3);
                let det = dot_product(n1, &c23);
                if det.abs() < SOLVE_EPSILON {
                    continue;
                }

                // Cramer's rule
                let c31 = cross_product(n3, n1);
                let c12 = cross_product(n1, n2);
                let mut p = vector_scale(&c23, planes[i].dist);
                p = vector_add(&p, &vector_scale(&c31, planes[j].dist));
                p = vector_add(&p, &vector_scale(&c12, planes[k].dist));
                p = vector_scale(&p, 1.0 / det);

                let outside = planes
                    .iter()
                    .any(|pl| dot_product(&pl.normal, &p) - pl.dist > POINT_EPSILON);
                if outside {
                    continue;
                }

                if !verts.iter().any(|v| vector_compare_epsilon(v, &p)) {
                    verts.push(p);
                }
            }
        }
    }

    if verts.len() < 4 {
        return None;
    }
    Some(verts)
}
