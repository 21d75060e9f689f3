//! Single-job document preparation
//!
//! Runs the stages in their fixed order: load the fresh mesh, align it into
//! the template frame, reconstruct every named selection, rewrite the
//! document. The mesh is read-only after alignment; the template document is
//! never mutated.

use std::path::{Path, PathBuf};

use nalgebra::Vector3;

use crate::align::align;
use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::doc::embedded;
use crate::doc::FebDoc;
use crate::error::{CoreError, CoreResult};
use crate::mesh::loader;
use crate::reconstruct::{reconstruct, ReconstructContext, RuleTable};
use crate::rewrite;

/// Outcome of a successful preparation.
#[derive(Debug)]
pub struct PrepareReport {
    pub output: PathBuf,
    /// Total simulated time, summed over every control block.
    pub total_time: f64,
    pub nodes: usize,
    pub elements: usize,
    /// Alignment shift applied to the new mesh.
    pub delta: Vector3<f64>,
}

/// Prepare one job's document from a template file and a mesh file.
pub fn prepare_document(
    template_path: &Path,
    mesh_path: &Path,
    out_path: &Path,
    config: &PipelineConfig,
    table: &RuleTable,
    cancel: &CancelToken,
) -> CoreResult<PrepareReport> {
    let doc = FebDoc::parse_file(template_path)?;
    prepare_from_doc(&doc, mesh_path, out_path, config, table, cancel)
}

/// Prepare one job's document from an already parsed template.
pub fn prepare_from_doc(
    doc: &FebDoc,
    mesh_path: &Path,
    out_path: &Path,
    config: &PipelineConfig,
    table: &RuleTable,
    cancel: &CancelToken,
) -> CoreResult<PrepareReport> {
    cancel.checkpoint()?;
    let parts = doc.parts()?;
    let mut mesh = loader::load_mesh(mesh_path, &parts)?;

    cancel.checkpoint()?;
    let template = embedded::template_mesh(doc)?;
    let old = embedded::old_selections(doc, &template)?;

    let reference = match &config.reference_part_name {
        Some(name) => {
            if !parts.iter().any(|p| p == name) {
                return Err(CoreError::TemplateMissingPart(name.clone()));
            }
            name.clone()
        }
        None => parts[0].clone(),
    };
    let delta = align(&mut mesh, &template.mesh, &reference)?;

    cancel.checkpoint()?;
    let ctx = ReconstructContext::new(&mesh, config)?;
    let selections = reconstruct(&template.mesh, &old, &ctx, table, cancel)?;

    let prepared = rewrite::rewrite_document(doc, &mesh, &selections)?;
    cancel.checkpoint()?;
    rewrite::write_prepared(&prepared, out_path)?;

    tracing::info!(
        nodes = mesh.nodes.len(),
        elements = mesh.elements.len(),
        selections = selections.rules_used.len(),
        "prepared {}",
        out_path.display()
    );

    Ok(PrepareReport {
        output: out_path.to_path_buf(),
        total_time: doc.total_time(),
        nodes: mesh.nodes.len(),
        elements: mesh.elements.len(),
        delta,
    })
}
