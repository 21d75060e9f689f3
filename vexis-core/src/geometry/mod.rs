//! Geometry kernel
//!
//! Topological and predicate operations over an immutable [`Mesh`]: bounding
//! boxes, boundary-face extraction, outward normals, planar node queries.
//! Faces are derived values carrying `(element index, local face)`; node
//! tuples are recomputed from the mesh on demand.

pub mod spatial;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::mesh::{ElementKind, Mesh};

/// Coordinate axis selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    /// Bounding box of a non-empty point set.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point3<f64>>,
    {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bbox = Aabb {
            min: first,
            max: first,
        };
        for p in iter {
            bbox.extend(p);
        }
        Some(bbox)
    }

    pub fn extend(&mut self, p: &Point3<f64>) {
        for i in 0..3 {
            if p[i] < self.min[i] {
                self.min[i] = p[i];
            }
            if p[i] > self.max[i] {
                self.max[i] = p[i];
            }
        }
    }

    /// Length of the largest edge.
    pub fn max_edge(&self) -> f64 {
        let d = self.max - self.min;
        d.x.max(d.y).max(d.z)
    }

    pub fn diagonal(&self) -> f64 {
        (self.max - self.min).norm()
    }

    /// Point containment with a symmetric tolerance.
    pub fn contains(&self, p: &Point3<f64>, eps: f64) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] - eps && p[i] <= self.max[i] + eps)
    }
}

/// Local face of an element: node positions into the element's node tuple,
/// with the corner nodes listed first.
struct FaceDef {
    nodes: &'static [usize],
    corners: usize,
}

const HEX8_FACES: &[FaceDef] = &[
    FaceDef { nodes: &[0, 1, 5, 4], corners: 4 },
    FaceDef { nodes: &[1, 2, 6, 5], corners: 4 },
    FaceDef { nodes: &[2, 3, 7, 6], corners: 4 },
    FaceDef { nodes: &[3, 0, 4, 7], corners: 4 },
    FaceDef { nodes: &[3, 2, 1, 0], corners: 4 },
    FaceDef { nodes: &[4, 5, 6, 7], corners: 4 },
];

const HEX20_FACES: &[FaceDef] = &[
    FaceDef { nodes: &[0, 1, 5, 4, 8, 17, 12, 16], corners: 4 },
    FaceDef { nodes: &[1, 2, 6, 5, 9, 18, 13, 17], corners: 4 },
    FaceDef { nodes: &[2, 3, 7, 6, 10, 19, 14, 18], corners: 4 },
    FaceDef { nodes: &[3, 0, 4, 7, 11, 16, 15, 19], corners: 4 },
    FaceDef { nodes: &[3, 2, 1, 0, 10, 9, 8, 11], corners: 4 },
    FaceDef { nodes: &[4, 5, 6, 7, 12, 13, 14, 15], corners: 4 },
];

const TET4_FACES: &[FaceDef] = &[
    FaceDef { nodes: &[0, 1, 3], corners: 3 },
    FaceDef { nodes: &[1, 2, 3], corners: 3 },
    FaceDef { nodes: &[2, 0, 3], corners: 3 },
    FaceDef { nodes: &[0, 2, 1], corners: 3 },
];

const TET10_FACES: &[FaceDef] = &[
    FaceDef { nodes: &[0, 1, 3, 4, 8, 7], corners: 3 },
    FaceDef { nodes: &[1, 2, 3, 5, 9, 8], corners: 3 },
    FaceDef { nodes: &[2, 0, 3, 6, 7, 9], corners: 3 },
    FaceDef { nodes: &[0, 2, 1, 6, 5, 4], corners: 3 },
];

const WEDGE6_FACES: &[FaceDef] = &[
    FaceDef { nodes: &[0, 2, 1], corners: 3 },
    FaceDef { nodes: &[3, 4, 5], corners: 3 },
    FaceDef { nodes: &[0, 1, 4, 3], corners: 4 },
    FaceDef { nodes: &[1, 2, 5, 4], corners: 4 },
    FaceDef { nodes: &[2, 0, 3, 5], corners: 4 },
];

const PYRAMID5_FACES: &[FaceDef] = &[
    FaceDef { nodes: &[3, 2, 1, 0], corners: 4 },
    FaceDef { nodes: &[0, 1, 4], corners: 3 },
    FaceDef { nodes: &[1, 2, 4], corners: 3 },
    FaceDef { nodes: &[2, 3, 4], corners: 3 },
    FaceDef { nodes: &[3, 0, 4], corners: 3 },
];

fn face_defs(kind: ElementKind) -> &'static [FaceDef] {
    match kind {
        ElementKind::Hex8 => HEX8_FACES,
        ElementKind::Hex20 => HEX20_FACES,
        ElementKind::Tet4 => TET4_FACES,
        ElementKind::Tet10 => TET10_FACES,
        ElementKind::Wedge6 => WEDGE6_FACES,
        ElementKind::Pyramid5 => PYRAMID5_FACES,
    }
}

/// A face referenced by its arena position, never by pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Face {
    pub element: usize,
    pub local_face: u8,
}

/// Number of local faces of an element kind.
pub fn face_count(kind: ElementKind) -> usize {
    face_defs(kind).len()
}

/// Full node tuple of a face, in element-local canonical order.
pub fn face_nodes(mesh: &Mesh, face: Face) -> Vec<usize> {
    let elem = &mesh.elements[face.element];
    let def = &face_defs(elem.kind)[face.local_face as usize];
    def.nodes.iter().map(|&i| elem.nodes[i]).collect()
}

/// Corner node tuple of a face (drops midside nodes of quadratic kinds).
pub fn face_corner_nodes(mesh: &Mesh, face: Face) -> Vec<usize> {
    let elem = &mesh.elements[face.element];
    let def = &face_defs(elem.kind)[face.local_face as usize];
    def.nodes[..def.corners]
        .iter()
        .map(|&i| elem.nodes[i])
        .collect()
}

/// Mean of the face's node positions.
pub fn face_centroid(mesh: &Mesh, face: Face) -> Point3<f64> {
    let nodes = face_nodes(mesh, face);
    let mut sum = Vector3::zeros();
    for &n in &nodes {
        sum += mesh.nodes[n].coords;
    }
    Point3::from(sum / nodes.len() as f64)
}

/// Outward unit normal, oriented away from the owning element's centroid.
pub fn face_normal(mesh: &Mesh, face: Face) -> Vector3<f64> {
    let corners = face_corner_nodes(mesh, face);
    let a = mesh.nodes[corners[0]];
    let b = mesh.nodes[corners[1]];

    // Cross two non-collinear edges of the canonical ordering.
    let v1 = b - a;
    let mut normal = Vector3::zeros();
    for &c in &corners[2..] {
        let v2 = mesh.nodes[c] - a;
        let n = v1.cross(&v2);
        if n.norm() > 1e-14 {
            normal = n;
            break;
        }
    }
    let mut unit = normal.normalize();

    let outward = face_centroid(mesh, face) - mesh.element_centroid(face.element);
    if unit.dot(&outward) < 0.0 {
        unit = -unit;
    }
    unit
}

/// Faces of `part` whose corner-node multiset appears exactly once within the
/// part. Returned in (element, local face) order.
pub fn boundary_faces(mesh: &Mesh, part: &str) -> crate::error::CoreResult<Vec<Face>> {
    let range = mesh.part_range(part)?;
    let mut counts: HashMap<Vec<usize>, u32> = HashMap::new();
    for element in range.clone() {
        let kind = mesh.elements[element].kind;
        for local_face in 0..face_count(kind) {
            let face = Face {
                element,
                local_face: local_face as u8,
            };
            let mut key = face_corner_nodes(mesh, face);
            key.sort_unstable();
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    let mut faces = Vec::new();
    for element in range {
        let kind = mesh.elements[element].kind;
        for local_face in 0..face_count(kind) {
            let face = Face {
                element,
                local_face: local_face as u8,
            };
            let mut key = face_corner_nodes(mesh, face);
            key.sort_unstable();
            if counts[&key] == 1 {
                faces.push(face);
            }
        }
    }
    Ok(faces)
}

/// Bounding box of the whole mesh, or of one part.
pub fn bbox(mesh: &Mesh, part: Option<&str>) -> crate::error::CoreResult<Aabb> {
    let bbox = match part {
        None => Aabb::from_points(mesh.nodes.iter()),
        Some(name) => {
            let ids = mesh.part_node_indices(name)?;
            Aabb::from_points(ids.iter().map(|&i| &mesh.nodes[i]))
        }
    };
    bbox.ok_or_else(|| crate::error::CoreError::MalformedMesh("empty mesh".to_string()))
}

/// Node indices from `candidates` whose `axis` coordinate lies within `eps`
/// of `value`.
pub fn nodes_on_plane(
    mesh: &Mesh,
    candidates: &[usize],
    axis: Axis,
    value: f64,
    eps: f64,
) -> Vec<usize> {
    let i = axis.index();
    candidates
        .iter()
        .copied()
        .filter(|&n| (mesh.nodes[n][i] - value).abs() <= eps)
        .collect()
}
