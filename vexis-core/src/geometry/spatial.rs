//! Spatial index over face centroids
//!
//! Built once per query set, then queried for nearest centroid-to-centroid
//! distances during cross-part proximity reconstruction.

use nalgebra::Point3;
use rstar::RTree;

use crate::geometry::{face_centroid, Face};
use crate::mesh::Mesh;

/// R*-tree over the centroids of a fixed face set.
pub struct CentroidIndex {
    tree: RTree<[f64; 3]>,
}

impl CentroidIndex {
    /// Index the centroids of `faces`.
    pub fn build(mesh: &Mesh, faces: &[Face]) -> Self {
        let points: Vec<[f64; 3]> = faces
            .iter()
            .map(|&f| {
                let c = face_centroid(mesh, f);
                [c.x, c.y, c.z]
            })
            .collect();
        Self {
            tree: RTree::bulk_load(points),
        }
    }

    /// Shortest distance from `point` to any indexed centroid. `None` when
    /// the index is empty.
    pub fn nearest_distance(&self, point: &Point3<f64>) -> Option<f64> {
        let query = [point.x, point.y, point.z];
        self.tree.nearest_neighbor(&query).map(|q| {
            let dx = q[0] - query[0];
            let dy = q[1] - query[1];
            let dz = q[2] - query[2];
            (dx * dx + dy * dy + dz * dz).sqrt()
        })
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
