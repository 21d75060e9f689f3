//! Volumetric mesh loader
//!
//! Reads the mesher's output (legacy `.vtk` or XML `.vtu` unstructured grid)
//! into the in-memory [`Mesh`]. Part membership is carried by a cell array
//! named `part` holding integer part ids; ids map to part names by the order
//! parts are declared in the template's mesh domains. Cells are regrouped so
//! every part occupies a contiguous element range, preserving the file order
//! within each part.

use std::path::Path;

use nalgebra::Point3;
use vtkio::model::{Attribute, CellType, DataSet, Piece, Vtk};

use crate::error::{CoreError, CoreResult};
use crate::mesh::{Element, ElementKind, Mesh, Part};

/// Name of the cell array carrying part membership.
pub const PART_ARRAY: &str = "part";

fn kind_of(cell_type: CellType) -> Option<ElementKind> {
    match cell_type {
        CellType::Hexahedron => Some(ElementKind::Hex8),
        CellType::QuadraticHexahedron => Some(ElementKind::Hex20),
        CellType::Tetra => Some(ElementKind::Tet4),
        CellType::QuadraticTetra => Some(ElementKind::Tet10),
        CellType::Wedge => Some(ElementKind::Wedge6),
        CellType::Pyramid => Some(ElementKind::Pyramid5),
        _ => None,
    }
}

/// Pull the `part` cell array out of the piece attributes.
fn part_ids(attributes: &[Attribute], num_cells: usize) -> CoreResult<Vec<usize>> {
    let mut raw: Option<Vec<f64>> = None;
    for attribute in attributes {
        match attribute {
            Attribute::DataArray(array) if array.name == PART_ARRAY => {
                raw = array.data.clone().cast_into::<f64>();
            }
            Attribute::Field { data_array, .. } => {
                for field in data_array {
                    if field.name == PART_ARRAY {
                        raw = field.data.clone().cast_into::<f64>();
                    }
                }
            }
            _ => {}
        }
        if raw.is_some() {
            break;
        }
    }
    let raw = raw.ok_or_else(|| {
        CoreError::MalformedMesh(format!("cell array '{PART_ARRAY}' not found"))
    })?;
    if raw.len() != num_cells {
        return Err(CoreError::MalformedMesh(format!(
            "cell array '{PART_ARRAY}' has {} entries for {} cells",
            raw.len(),
            num_cells
        )));
    }
    raw.iter()
        .map(|&v| {
            if v < 0.0 || v.fract() != 0.0 {
                Err(CoreError::MalformedMesh(format!(
                    "cell array '{PART_ARRAY}' holds non-integral id {v}"
                )))
            } else {
                Ok(v as usize)
            }
        })
        .collect()
}

/// Load a mesh file, mapping part ids to `part_names` by position.
pub fn load_mesh(path: &Path, part_names: &[String]) -> CoreResult<Mesh> {
    let vtk = Vtk::import(path)
        .map_err(|e| CoreError::MalformedMesh(format!("{}: {e}", path.display())))?;

    let pieces = match vtk.data {
        DataSet::UnstructuredGrid { pieces, .. } => pieces,
        other => {
            return Err(CoreError::MalformedMesh(format!(
                "expected an unstructured grid, found {other:?}"
            )))
        }
    };

    let piece = match pieces.into_iter().next() {
        Some(Piece::Inline(piece)) => *piece,
        Some(_) => {
            return Err(CoreError::MalformedMesh(
                "externally sourced grid pieces are not supported".to_string(),
            ))
        }
        None => {
            return Err(CoreError::MalformedMesh(
                "unstructured grid has no pieces".to_string(),
            ))
        }
    };

    let coords = piece
        .points
        .cast_into::<f64>()
        .ok_or_else(|| CoreError::MalformedMesh("unreadable point buffer".to_string()))?;
    if coords.len() % 3 != 0 {
        return Err(CoreError::MalformedMesh(format!(
            "point buffer length {} is not a multiple of 3",
            coords.len()
        )));
    }
    let nodes: Vec<Point3<f64>> = coords
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect();

    let types = piece.cells.types;
    let (connectivity, offsets) = piece.cells.cell_verts.into_xml();
    if offsets.len() != types.len() {
        return Err(CoreError::MalformedMesh(format!(
            "{} cell offsets for {} cell types",
            offsets.len(),
            types.len()
        )));
    }

    let ids = part_ids(&piece.data.cell, types.len())?;

    // Decode cells in file order, then regroup into contiguous part ranges.
    let mut cells: Vec<(usize, Element)> = Vec::with_capacity(types.len());
    let mut start = 0usize;
    for (i, (&cell_type, &end)) in types.iter().zip(offsets.iter()).enumerate() {
        let kind = kind_of(cell_type).ok_or_else(|| {
            CoreError::MalformedMesh(format!("cell {i} has unsupported type {cell_type:?}"))
        })?;
        let end = end as usize;
        if end < start || end > connectivity.len() {
            return Err(CoreError::MalformedMesh(format!(
                "cell {i} connectivity range out of bounds"
            )));
        }
        let verts: Vec<usize> = connectivity[start..end].iter().map(|&v| v as usize).collect();
        if verts.len() != kind.node_count() {
            return Err(CoreError::MalformedMesh(format!(
                "cell {i} has {} vertices, {} expects {}",
                verts.len(),
                kind.label(),
                kind.node_count()
            )));
        }
        let part_id = ids[i];
        if part_id >= part_names.len() {
            return Err(CoreError::MalformedMesh(format!(
                "cell {i} carries part id {part_id}, template declares {} parts",
                part_names.len()
            )));
        }
        cells.push((
            part_id,
            Element {
                kind,
                nodes: verts,
            },
        ));
        start = end;
    }

    let mut elements = Vec::with_capacity(cells.len());
    let mut parts = Vec::with_capacity(part_names.len());
    for (part_id, name) in part_names.iter().enumerate() {
        let range_start = elements.len();
        for (id, element) in &cells {
            if *id == part_id {
                elements.push(element.clone());
            }
        }
        if elements.len() == range_start {
            return Err(CoreError::MissingPart(name.clone()));
        }
        parts.push(Part {
            name: name.clone(),
            range: range_start..elements.len(),
        });
    }

    tracing::debug!(
        nodes = nodes.len(),
        elements = elements.len(),
        parts = parts.len(),
        "loaded mesh {}",
        path.display()
    );

    Mesh::new(nodes, elements, parts)
}
