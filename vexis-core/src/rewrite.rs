//! Document rewriter
//!
//! Produces the prepared document in one pass: the node block, every
//! per-part element block, and every named selection are replaced; physics
//! (materials, load curves, contact algorithms, control parameters) is left
//! untouched. The input document is read-only; output goes to a `.tmp`
//! sibling that is renamed into place only on success, so a cancelled or
//! failed job never leaves a half-written document behind.

use std::collections::HashSet;
use std::path::Path;

use crate::doc::{FebDoc, SurfaceFace};
use crate::error::{CoreError, CoreResult};
use crate::geometry::face_nodes;
use crate::mesh::{ElementKind, Mesh};
use crate::reconstruct::NewSelections;

/// Check that template parts and mesh parts agree exactly, in both
/// directions.
fn check_part_symmetry(template_parts: &[String], mesh: &Mesh) -> CoreResult<()> {
    let template: HashSet<&str> = template_parts.iter().map(String::as_str).collect();
    let meshed: HashSet<&str> = mesh.parts.iter().map(|p| p.name.as_str()).collect();
    for part in &meshed {
        if !template.contains(part) {
            return Err(CoreError::TemplateMissingPart(part.to_string()));
        }
    }
    for part in &template {
        if !meshed.contains(part) {
            return Err(CoreError::TemplateMissingPart(part.to_string()));
        }
    }
    Ok(())
}

/// Uniform element kind of a part; mixed-kind parts cannot be written into a
/// single-typed element block.
fn part_kind(mesh: &Mesh, part: &str) -> CoreResult<ElementKind> {
    let range = mesh.part_range(part)?;
    let mut kinds = mesh.elements[range].iter().map(|e| e.kind);
    let first = kinds.next().ok_or_else(|| CoreError::MissingPart(part.to_string()))?;
    if kinds.any(|k| k != first) {
        return Err(CoreError::MalformedMesh(format!(
            "part '{part}' mixes element kinds"
        )));
    }
    Ok(first)
}

/// Build the prepared document from the template, the aligned mesh, and the
/// reconstructed selections.
pub fn rewrite_document(
    template: &FebDoc,
    mesh: &Mesh,
    selections: &NewSelections,
) -> CoreResult<FebDoc> {
    let template_parts = template.parts()?;
    check_part_symmetry(&template_parts, mesh)?;

    let mut doc = template.clone();
    doc.replace_nodes(&mesh.nodes)?;

    for part in &mesh.parts {
        let kind = part_kind(mesh, &part.name)?;
        let elements: Vec<(usize, Vec<usize>)> = part
            .range
            .clone()
            .map(|e| {
                (
                    e + 1,
                    mesh.elements[e].nodes.iter().map(|&n| n + 1).collect(),
                )
            })
            .collect();
        doc.replace_elements(&part.name, kind, &elements)?;
    }

    for (name, ids) in &selections.node_sets {
        let doc_ids: Vec<usize> = ids.iter().map(|&n| n + 1).collect();
        doc.set_node_set(name, &doc_ids)?;
    }
    for (name, ids) in &selections.element_sets {
        let doc_ids: Vec<usize> = ids.iter().map(|&e| e + 1).collect();
        doc.set_element_set(name, &doc_ids)?;
    }
    for (name, faces) in &selections.surfaces {
        let doc_faces: Vec<SurfaceFace> = faces
            .iter()
            .map(|&face| SurfaceFace {
                element_id: face.element + 1,
                nodes: face_nodes(mesh, face).iter().map(|&n| n + 1).collect(),
            })
            .collect();
        doc.set_surface(name, &doc_faces)?;
    }

    Ok(doc)
}

/// Serialise the prepared document next to its final location and promote
/// it with a rename.
pub fn write_prepared(doc: &FebDoc, out_path: &Path) -> CoreResult<()> {
    let file_name = out_path
        .file_name()
        .ok_or_else(|| {
            CoreError::Io(std::io::Error::other(format!(
                "output path {} has no file name",
                out_path.display()
            )))
        })?
        .to_string_lossy()
        .into_owned();
    let tmp_path = out_path.with_file_name(format!("{file_name}.tmp"));
    std::fs::write(&tmp_path, doc.to_xml())?;
    std::fs::rename(&tmp_path, out_path)?;
    Ok(())
}

/// Remove a stale `.tmp` sibling, ignoring a missing file.
pub fn discard_tmp(out_path: &Path) {
    if let Some(file_name) = out_path.file_name() {
        let tmp_path =
            out_path.with_file_name(format!("{}.tmp", file_name.to_string_lossy()));
        let _ = std::fs::remove_file(tmp_path);
    }
}
