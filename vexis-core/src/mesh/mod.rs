//! In-memory volumetric mesh
//!
//! A mesh is an ordered node array, an ordered element array, and a mapping
//! from part name to a contiguous element range. Elements reference nodes by
//! index; faces reference elements by `(element index, local face)` and are
//! derived on demand by the geometry kernel, so there are no back-pointers
//! anywhere in the structure.

pub mod loader;

use nalgebra::{Point3, Vector3};
use std::ops::Range;

use crate::error::{CoreError, CoreResult};

/// Volumetric element kinds understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Hex8,
    Hex20,
    Tet4,
    Tet10,
    Wedge6,
    Pyramid5,
}

impl ElementKind {
    /// Number of nodes per element of this kind.
    pub fn node_count(&self) -> usize {
        match self {
            ElementKind::Hex8 => 8,
            ElementKind::Hex20 => 20,
            ElementKind::Tet4 => 4,
            ElementKind::Tet10 => 10,
            ElementKind::Wedge6 => 6,
            ElementKind::Pyramid5 => 5,
        }
    }

    /// Element type label used by the solver dialect.
    pub fn label(&self) -> &'static str {
        match self {
            ElementKind::Hex8 => "hex8",
            ElementKind::Hex20 => "hex20",
            ElementKind::Tet4 => "tet4",
            ElementKind::Tet10 => "tet10",
            ElementKind::Wedge6 => "penta6",
            ElementKind::Pyramid5 => "pyra5",
        }
    }

    /// Parse a solver dialect label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "hex8" => Some(ElementKind::Hex8),
            "hex20" => Some(ElementKind::Hex20),
            "tet4" => Some(ElementKind::Tet4),
            "tet10" => Some(ElementKind::Tet10),
            "penta6" | "wedge6" => Some(ElementKind::Wedge6),
            "pyra5" | "pyramid5" => Some(ElementKind::Pyramid5),
            _ => None,
        }
    }
}

/// A single volumetric element.
#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,
    /// Node indices, in the kind's canonical ordering.
    pub nodes: Vec<usize>,
}

/// A named contiguous region of elements.
#[derive(Debug, Clone)]
pub struct Part {
    pub name: String,
    pub range: Range<usize>,
}

/// An unstructured volumetric mesh with named parts.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub nodes: Vec<Point3<f64>>,
    pub elements: Vec<Element>,
    /// Part ranges, in declaration order. Disjoint and covering `elements`.
    pub parts: Vec<Part>,
}

impl Mesh {
    /// Construct a mesh and check its structural invariants.
    pub fn new(
        nodes: Vec<Point3<f64>>,
        elements: Vec<Element>,
        parts: Vec<Part>,
    ) -> CoreResult<Self> {
        let mesh = Self {
            nodes,
            elements,
            parts,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Check node references, element arities, and part-range coverage.
    pub fn validate(&self) -> CoreResult<()> {
        for (i, elem) in self.elements.iter().enumerate() {
            if elem.nodes.len() != elem.kind.node_count() {
                return Err(CoreError::MalformedMesh(format!(
                    "element {} has {} nodes, {} expects {}",
                    i,
                    elem.nodes.len(),
                    elem.kind.label(),
                    elem.kind.node_count()
                )));
            }
            for &n in &elem.nodes {
                if n >= self.nodes.len() {
                    return Err(CoreError::MalformedMesh(format!(
                        "element {} references node {} out of {}",
                        i,
                        n,
                        self.nodes.len()
                    )));
                }
            }
        }
        // Part ranges must be disjoint and cover the element array.
        let mut cursor = 0usize;
        for part in &self.parts {
            if part.range.start != cursor {
                return Err(CoreError::MalformedMesh(format!(
                    "part '{}' starts at {}, expected {}",
                    part.name, part.range.start, cursor
                )));
            }
            if part.range.end < part.range.start || part.range.end > self.elements.len() {
                return Err(CoreError::MalformedMesh(format!(
                    "part '{}' range out of bounds",
                    part.name
                )));
            }
            cursor = part.range.end;
        }
        if cursor != self.elements.len() {
            return Err(CoreError::MalformedMesh(format!(
                "part ranges cover {} of {} elements",
                cursor,
                self.elements.len()
            )));
        }
        Ok(())
    }

    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }

    /// Element range of a part, failing with `MissingPart` when absent.
    pub fn part_range(&self, name: &str) -> CoreResult<Range<usize>> {
        self.part(name)
            .map(|p| p.range.clone())
            .ok_or_else(|| CoreError::MissingPart(name.to_string()))
    }

    /// Part owning the element at `index`.
    pub fn part_of_element(&self, index: usize) -> Option<&str> {
        self.parts
            .iter()
            .find(|p| p.range.contains(&index))
            .map(|p| p.name.as_str())
    }

    /// Sorted, deduplicated node indices referenced by a part.
    pub fn part_node_indices(&self, name: &str) -> CoreResult<Vec<usize>> {
        let range = self.part_range(name)?;
        let mut ids: Vec<usize> = self.elements[range]
            .iter()
            .flat_map(|e| e.nodes.iter().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Translate every node in place. The only mutation a mesh sees after
    /// construction.
    pub fn translate(&mut self, delta: Vector3<f64>) {
        for node in &mut self.nodes {
            *node += delta;
        }
    }

    /// Centroid of an element (mean of its node positions).
    pub fn element_centroid(&self, index: usize) -> Point3<f64> {
        let elem = &self.elements[index];
        let mut sum = Vector3::zeros();
        for &n in &elem.nodes {
            sum += self.nodes[n].coords;
        }
        Point3::from(sum / elem.nodes.len() as f64)
    }
}
