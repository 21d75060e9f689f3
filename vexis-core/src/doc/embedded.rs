//! Embedded template mesh
//!
//! The template carries its own placeholder mesh. It is never solved
//! against; it exists to define the original coordinate frame for the
//! Aligner and to let the reconstructor learn which named selections exist,
//! what kind each one is, and where each one sat relative to its part.

use std::collections::HashMap;

use crate::doc::{FebDoc, SurfacePair};
use crate::error::{CoreError, CoreResult};
use crate::mesh::{Element, Mesh, Part};

/// The template's placeholder mesh with its document-id maps.
#[derive(Debug)]
pub struct TemplateMesh {
    pub mesh: Mesh,
    node_index: HashMap<usize, usize>,
    element_index: HashMap<usize, usize>,
}

impl TemplateMesh {
    pub fn node_idx(&self, doc_id: usize) -> CoreResult<usize> {
        self.node_index.get(&doc_id).copied().ok_or_else(|| {
            CoreError::MalformedTemplate(format!("selection references unknown node {doc_id}"))
        })
    }

    pub fn element_idx(&self, doc_id: usize) -> CoreResult<usize> {
        self.element_index.get(&doc_id).copied().ok_or_else(|| {
            CoreError::MalformedTemplate(format!(
                "selection references unknown element {doc_id}"
            ))
        })
    }
}

/// One face of an old surface, in template mesh index space.
#[derive(Debug, Clone)]
pub struct OldFace {
    pub element: usize,
    pub nodes: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct OldSurface {
    pub name: String,
    pub faces: Vec<OldFace>,
}

/// Every named selection of the template, in template mesh index space.
#[derive(Debug)]
pub struct OldSelections {
    pub node_sets: Vec<(String, Vec<usize>)>,
    pub element_sets: Vec<(String, Vec<usize>)>,
    pub surfaces: Vec<OldSurface>,
    pub pairs: Vec<SurfacePair>,
}

/// Read the placeholder mesh out of the template.
pub fn template_mesh(doc: &FebDoc) -> CoreResult<TemplateMesh> {
    let doc_nodes = doc.nodes()?;
    let mut node_index = HashMap::with_capacity(doc_nodes.len());
    let mut nodes = Vec::with_capacity(doc_nodes.len());
    for (idx, (id, p)) in doc_nodes.into_iter().enumerate() {
        if node_index.insert(id, idx).is_some() {
            return Err(CoreError::MalformedTemplate(format!(
                "duplicate node id {id}"
            )));
        }
        nodes.push(p);
    }

    let mut elements = Vec::new();
    let mut parts = Vec::new();
    let mut element_index = HashMap::new();
    for part_name in doc.parts()? {
        let (kind, doc_elems) = doc.elements(&part_name)?;
        let start = elements.len();
        for (id, node_ids) in doc_elems {
            if element_index.insert(id, elements.len()).is_some() {
                return Err(CoreError::MalformedTemplate(format!(
                    "duplicate element id {id}"
                )));
            }
            let node_idxs = node_ids
                .iter()
                .map(|&nid| {
                    node_index.get(&nid).copied().ok_or_else(|| {
                        CoreError::MalformedTemplate(format!(
                            "element {id} references unknown node {nid}"
                        ))
                    })
                })
                .collect::<CoreResult<Vec<_>>>()?;
            elements.push(Element {
                kind,
                nodes: node_idxs,
            });
        }
        parts.push(Part {
            name: part_name,
            range: start..elements.len(),
        });
    }

    let mesh = Mesh::new(nodes, elements, parts)
        .map_err(|e| CoreError::MalformedTemplate(format!("embedded mesh: {e}")))?;
    Ok(TemplateMesh {
        mesh,
        node_index,
        element_index,
    })
}

/// Read every named selection, resolved against the placeholder mesh.
pub fn old_selections(doc: &FebDoc, template: &TemplateMesh) -> CoreResult<OldSelections> {
    let node_sets = doc
        .node_sets()?
        .into_iter()
        .map(|set| {
            let ids = set
                .ids
                .iter()
                .map(|&id| template.node_idx(id))
                .collect::<CoreResult<Vec<_>>>()?;
            Ok((set.name, ids))
        })
        .collect::<CoreResult<Vec<_>>>()?;

    let element_sets = doc
        .element_sets()?
        .into_iter()
        .map(|set| {
            let ids = set
                .ids
                .iter()
                .map(|&id| template.element_idx(id))
                .collect::<CoreResult<Vec<_>>>()?;
            Ok((set.name, ids))
        })
        .collect::<CoreResult<Vec<_>>>()?;

    let surfaces = doc
        .surfaces()?
        .into_iter()
        .map(|surface| {
            let faces = surface
                .faces
                .iter()
                .map(|face| {
                    Ok(OldFace {
                        element: template.element_idx(face.element_id)?,
                        nodes: face
                            .nodes
                            .iter()
                            .map(|&nid| template.node_idx(nid))
                            .collect::<CoreResult<Vec<_>>>()?,
                    })
                })
                .collect::<CoreResult<Vec<_>>>()?;
            Ok(OldSurface {
                name: surface.name,
                faces,
            })
        })
        .collect::<CoreResult<Vec<_>>>()?;

    Ok(OldSelections {
        node_sets,
        element_sets,
        surfaces,
        pairs: doc.surface_pairs()?,
    })
}
