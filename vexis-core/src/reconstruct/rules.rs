//! Reconstruction rules
//!
//! Each named selection is rebuilt from the new mesh by one geometric rule.
//! Rules are a tagged variant with a single `apply` per kind; there is no
//! dispatch hierarchy. A rule produces faces, nodes, or elements depending
//! on the selection kind it is applied for.

use nalgebra::Point3;
use std::collections::BTreeSet;

use crate::error::{CoreError, CoreResult};
use crate::geometry::spatial::CentroidIndex;
use crate::geometry::{face_centroid, face_corner_nodes, face_normal, Aabb, Axis, Face};

use super::ReconstructContext;

/// A box in fractions of a part's axis-aligned bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct RelBox {
    pub lo: [f64; 3],
    pub hi: [f64; 3],
}

impl RelBox {
    /// Whole-part box.
    pub fn full() -> Self {
        Self {
            lo: [0.0; 3],
            hi: [1.0; 3],
        }
    }

    /// Containment test against a concrete part bounding box. Degenerate
    /// axes (zero extent) fall back to an absolute epsilon test.
    pub fn contains(&self, part_bbox: &Aabb, p: &Point3<f64>, eps: f64) -> bool {
        for i in 0..3 {
            let extent = part_bbox.max[i] - part_bbox.min[i];
            if extent <= eps {
                if (p[i] - part_bbox.min[i]).abs() > eps {
                    return false;
                }
                continue;
            }
            let frac = (p[i] - part_bbox.min[i]) / extent;
            let tol = eps / extent;
            if frac < self.lo[i] - tol || frac > self.hi[i] + tol {
                return false;
            }
        }
        true
    }
}

/// Kinds of named selections in the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    NodeSet,
    ElementSet,
    Surface,
}

/// The reconstructed contents of one named selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Nodes(Vec<usize>),
    Elements(Vec<usize>),
    Faces(Vec<Face>),
}

impl Selection {
    pub fn len(&self) -> usize {
        match self {
            Selection::Nodes(v) => v.len(),
            Selection::Elements(v) => v.len(),
            Selection::Faces(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Geometric predicate reconstructing one named selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Entities on the part's minimum-z plane.
    ZMinPlane,
    /// Downward-facing boundary faces strictly above the bottom plane.
    ZDownExceptBottom,
    /// Entities whose position falls inside a fractional box of the part's
    /// bounding box.
    RelativeBounds(RelBox),
    /// Boundary faces whose centroid lies within a distance of the other
    /// part's boundary. `distance` of `None` uses the configured default.
    CrossPartProximity {
        other: String,
        distance: Option<f64>,
    },
    /// Entities within a radial shell around the part's vertical axis.
    AxisCylinder {
        axis: Axis,
        r_min: f64,
        r_max: f64,
    },
    /// Intersection of several rules.
    Intersect(Vec<Rule>),
}

impl Rule {
    /// Short label for diagnostics and policy checks.
    pub fn label(&self) -> &'static str {
        match self {
            Rule::ZMinPlane => "z_min_plane",
            Rule::ZDownExceptBottom => "z_down_except_bottom",
            Rule::RelativeBounds(_) => "relative_bounds",
            Rule::CrossPartProximity { .. } => "cross_part_proximity",
            Rule::AxisCylinder { .. } => "axis_cylinder",
            Rule::Intersect(_) => "intersect",
        }
    }

    /// Apply the rule on `part` of the new mesh, producing the entity kind
    /// the selection requires.
    pub fn apply(
        &self,
        ctx: &ReconstructContext<'_>,
        part: &str,
        kind: SelectionKind,
    ) -> CoreResult<Selection> {
        match kind {
            SelectionKind::Surface => Ok(Selection::Faces(self.faces(ctx, part)?)),
            SelectionKind::NodeSet => self.nodes(ctx, part).map(Selection::Nodes),
            SelectionKind::ElementSet => self.elements(ctx, part).map(Selection::Elements),
        }
    }

    fn faces(&self, ctx: &ReconstructContext<'_>, part: &str) -> CoreResult<Vec<Face>> {
        let part_bbox = ctx.part_bbox(part)?;
        let boundary = ctx.boundary(part)?;
        match self {
            Rule::ZMinPlane => {
                let z_min = part_bbox.min.z;
                Ok(boundary
                    .iter()
                    .copied()
                    .filter(|&f| {
                        face_corner_nodes(ctx.mesh, f)
                            .iter()
                            .all(|&n| (ctx.mesh.nodes[n].z - z_min).abs() <= ctx.eps)
                    })
                    .collect())
            }
            Rule::ZDownExceptBottom => {
                let z_min = part_bbox.min.z;
                Ok(boundary
                    .iter()
                    .copied()
                    .filter(|&f| {
                        let down = -face_normal(ctx.mesh, f).z;
                        down > ctx.cos_theta
                            && face_centroid(ctx.mesh, f).z > z_min + ctx.eps
                    })
                    .collect())
            }
            Rule::RelativeBounds(rel) => Ok(boundary
                .iter()
                .copied()
                .filter(|&f| rel.contains(&part_bbox, &face_centroid(ctx.mesh, f), ctx.eps))
                .collect()),
            Rule::CrossPartProximity { other, distance } => {
                if other == part {
                    return Err(CoreError::MalformedTemplate(format!(
                        "cross-part proximity of part '{part}' against itself"
                    )));
                }
                let other_faces = ctx.boundary(other)?;
                let index = CentroidIndex::build(ctx.mesh, other_faces);
                let d = distance.unwrap_or(ctx.proximity);
                Ok(boundary
                    .iter()
                    .copied()
                    .filter(|&f| {
                        index
                            .nearest_distance(&face_centroid(ctx.mesh, f))
                            .is_some_and(|dist| dist <= d)
                    })
                    .collect())
            }
            Rule::AxisCylinder { axis, r_min, r_max } => {
                let center = axis_center(&part_bbox, *axis);
                Ok(boundary
                    .iter()
                    .copied()
                    .filter(|&f| {
                        let r = radial_distance(&face_centroid(ctx.mesh, f), &center, *axis);
                        r >= *r_min - ctx.eps && r <= *r_max + ctx.eps
                    })
                    .collect())
            }
            Rule::Intersect(rules) => {
                let mut iter = rules.iter();
                let first = match iter.next() {
                    Some(rule) => rule.faces(ctx, part)?,
                    None => return Ok(Vec::new()),
                };
                let mut keep: BTreeSet<Face> = first.into_iter().collect();
                for rule in iter {
                    let next: BTreeSet<Face> = rule.faces(ctx, part)?.into_iter().collect();
                    keep.retain(|f| next.contains(f));
                }
                Ok(keep.into_iter().collect())
            }
        }
    }

    fn nodes(&self, ctx: &ReconstructContext<'_>, part: &str) -> CoreResult<Vec<usize>> {
        let part_bbox = ctx.part_bbox(part)?;
        let candidates = ctx.part_nodes(part)?;
        let mut ids = match self {
            Rule::ZMinPlane => crate::geometry::nodes_on_plane(
                ctx.mesh,
                candidates,
                Axis::Z,
                part_bbox.min.z,
                ctx.eps,
            ),
            Rule::RelativeBounds(rel) => candidates
                .iter()
                .copied()
                .filter(|&n| rel.contains(&part_bbox, &ctx.mesh.nodes[n], ctx.eps))
                .collect(),
            Rule::AxisCylinder { axis, r_min, r_max } => {
                let center = axis_center(&part_bbox, *axis);
                candidates
                    .iter()
                    .copied()
                    .filter(|&n| {
                        let r = radial_distance(&ctx.mesh.nodes[n], &center, *axis);
                        r >= *r_min - ctx.eps && r <= *r_max + ctx.eps
                    })
                    .collect()
            }
            Rule::Intersect(rules) => {
                let mut sets = rules.iter().map(|r| r.nodes(ctx, part));
                let mut keep: BTreeSet<usize> = match sets.next() {
                    Some(set) => set?.into_iter().collect(),
                    None => return Ok(Vec::new()),
                };
                for set in sets {
                    let next: BTreeSet<usize> = set?.into_iter().collect();
                    keep.retain(|n| next.contains(n));
                }
                keep.into_iter().collect()
            }
            // Face-shaped rules select the nodes of their faces.
            _ => {
                let mut ids: Vec<usize> = self
                    .faces(ctx, part)?
                    .into_iter()
                    .flat_map(|f| crate::geometry::face_nodes(ctx.mesh, f))
                    .collect();
                ids.sort_unstable();
                ids.dedup();
                ids
            }
        };
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn elements(&self, ctx: &ReconstructContext<'_>, part: &str) -> CoreResult<Vec<usize>> {
        let part_bbox = ctx.part_bbox(part)?;
        let range = ctx.mesh.part_range(part)?;
        let mut ids: Vec<usize> = match self {
            Rule::RelativeBounds(rel) => range
                .filter(|&e| rel.contains(&part_bbox, &ctx.mesh.element_centroid(e), ctx.eps))
                .collect(),
            Rule::AxisCylinder { axis, r_min, r_max } => {
                let center = axis_center(&part_bbox, *axis);
                range
                    .filter(|&e| {
                        let r =
                            radial_distance(&ctx.mesh.element_centroid(e), &center, *axis);
                        r >= *r_min - ctx.eps && r <= *r_max + ctx.eps
                    })
                    .collect()
            }
            Rule::Intersect(rules) => {
                let mut sets = rules.iter().map(|r| r.elements(ctx, part));
                let mut keep: BTreeSet<usize> = match sets.next() {
                    Some(set) => set?.into_iter().collect(),
                    None => return Ok(Vec::new()),
                };
                for set in sets {
                    let next: BTreeSet<usize> = set?.into_iter().collect();
                    keep.retain(|e| next.contains(e));
                }
                keep.into_iter().collect()
            }
            // Face-shaped rules select the owning elements of their faces.
            _ => self
                .faces(ctx, part)?
                .into_iter()
                .map(|f| f.element)
                .collect(),
        };
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

fn axis_center(part_bbox: &Aabb, axis: Axis) -> Point3<f64> {
    let mut center = Point3::from((part_bbox.min.coords + part_bbox.max.coords) / 2.0);
    center[axis.index()] = 0.0;
    center
}

fn radial_distance(p: &Point3<f64>, axis_center: &Point3<f64>, axis: Axis) -> f64 {
    let mut q = *p;
    q[axis.index()] = 0.0;
    (q - axis_center).norm()
}

/// Fractional bounds of a point set relative to a part bounding box, padded
/// on every side so refinement-induced jitter stays inside.
pub fn inferred_rel_bounds<'a, I>(part_bbox: &Aabb, points: I, pad: f64) -> RelBox
where
    I: IntoIterator<Item = &'a Point3<f64>>,
{
    let Some(selection_bbox) = Aabb::from_points(points) else {
        return RelBox::full();
    };
    let mut lo = [0.0; 3];
    let mut hi = [1.0; 3];
    for i in 0..3 {
        let extent = part_bbox.max[i] - part_bbox.min[i];
        if extent <= 0.0 {
            lo[i] = 0.0;
            hi[i] = 1.0;
            continue;
        }
        lo[i] = (selection_bbox.min[i] - part_bbox.min[i]) / extent - pad;
        hi[i] = (selection_bbox.max[i] - part_bbox.min[i]) / extent + pad;
    }
    RelBox { lo, hi }
}
