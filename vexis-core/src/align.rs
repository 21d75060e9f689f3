//! Mesh alignment
//!
//! Boundary conditions in the template (ground plane, rigid indenter path)
//! are expressed in absolute coordinates anchored at the reference part's
//! minimum corner, so alignment matches min corners rather than centroids.

use nalgebra::Vector3;

use crate::error::CoreResult;
use crate::geometry::bbox;
use crate::mesh::Mesh;

/// Rigid translation placing `new_mesh` into `old_mesh`'s frame, computed
/// over the reference part.
pub fn alignment_delta(
    old_mesh: &Mesh,
    new_mesh: &Mesh,
    reference_part: &str,
) -> CoreResult<Vector3<f64>> {
    let old_bbox = bbox(old_mesh, Some(reference_part))?;
    let new_bbox = bbox(new_mesh, Some(reference_part))?;
    Ok(old_bbox.min - new_bbox.min)
}

/// Translate `new_mesh` in place into the template frame. Returns the
/// applied shift.
pub fn align(
    new_mesh: &mut Mesh,
    old_mesh: &Mesh,
    reference_part: &str,
) -> CoreResult<Vector3<f64>> {
    let delta = alignment_delta(old_mesh, new_mesh, reference_part)?;
    new_mesh.translate(delta);
    tracing::debug!(
        dx = delta.x,
        dy = delta.y,
        dz = delta.z,
        "aligned mesh on part '{reference_part}'"
    );
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Element, ElementKind, Part};
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn hex_at(origin: Vector3<f64>) -> Mesh {
        let mut nodes = Vec::new();
        for k in 0..2 {
            for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                nodes.push(Point3::new(x, y, k as f64) + origin);
            }
        }
        let elements = vec![Element {
            kind: ElementKind::Hex8,
            nodes: (0..8).collect(),
        }];
        let parts = vec![Part {
            name: "RUBBER".to_string(),
            range: 0..1,
        }];
        Mesh::new(nodes, elements, parts).unwrap()
    }

    #[test]
    fn test_translated_mesh_shifts_back() {
        let old = hex_at(Vector3::zeros());
        let mut new = hex_at(Vector3::new(10.0, 20.0, 30.0));
        let delta = align(&mut new, &old, "RUBBER").unwrap();
        assert_relative_eq!(delta.x, -10.0);
        assert_relative_eq!(delta.y, -20.0);
        assert_relative_eq!(delta.z, -30.0);
        assert_relative_eq!((new.nodes[0] - old.nodes[0]).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_alignment_is_idempotent() {
        let old = hex_at(Vector3::zeros());
        let mut new = hex_at(Vector3::new(-3.0, 0.5, 7.0));
        align(&mut new, &old, "RUBBER").unwrap();
        let first: Vec<_> = new.nodes.clone();
        let delta = align(&mut new, &old, "RUBBER").unwrap();
        assert_relative_eq!(delta.norm(), 0.0, epsilon = 1e-12);
        assert_eq!(first, new.nodes);
    }
}
