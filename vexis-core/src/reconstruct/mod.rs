//! Named-selection reconstruction
//!
//! Node and element ids are regenerated by meshing, so nothing connects the
//! template's named selections to the new mesh except geometry. For every
//! name in the template this engine picks a rule (exact-name table entry,
//! contact-pair policy, or a fallback inferred from where the old selection
//! sat inside its part) and applies it to the new mesh.
//!
//! Contact policy: a pair whose two surfaces lie in one part must use
//! relative bounds on both sides. Two folds of the same part can sit
//! arbitrarily close to each other, so proximity against the own part would
//! bleed across the fold. Cross-part pairs use proximity against the other
//! part's boundary.

pub mod rules;

use std::collections::{HashMap, HashSet};

use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::doc::embedded::{OldSelections, OldSurface};
use crate::error::{CoreError, CoreResult};
use crate::geometry::{bbox, boundary_faces, Aabb, Face};
use crate::mesh::Mesh;

pub use rules::{RelBox, Rule, Selection, SelectionKind};

/// Padding applied to inferred relative bounds.
const INFER_PAD: f64 = 1e-3;

/// Precomputed geometry of the new mesh shared by every rule application.
pub struct ReconstructContext<'m> {
    pub mesh: &'m Mesh,
    pub eps: f64,
    pub cos_theta: f64,
    pub proximity: f64,
    whole: Aabb,
    part_bbox: HashMap<String, Aabb>,
    part_boundary: HashMap<String, Vec<Face>>,
    part_nodes: HashMap<String, Vec<usize>>,
}

impl<'m> ReconstructContext<'m> {
    pub fn new(mesh: &'m Mesh, config: &PipelineConfig) -> CoreResult<Self> {
        let whole = bbox(mesh, None)?;
        let scale = whole.max_edge();
        let mut part_bbox = HashMap::new();
        let mut part_boundary = HashMap::new();
        let mut part_nodes = HashMap::new();
        for part in &mesh.parts {
            part_bbox.insert(part.name.clone(), bbox(mesh, Some(&part.name))?);
            part_boundary.insert(part.name.clone(), boundary_faces(mesh, &part.name)?);
            part_nodes.insert(part.name.clone(), mesh.part_node_indices(&part.name)?);
        }
        Ok(Self {
            mesh,
            eps: config.tolerance_eps_rel * scale,
            cos_theta: config.cos_normal_angle(),
            proximity: config.cross_part_distance_rel * scale,
            whole,
            part_bbox,
            part_boundary,
            part_nodes,
        })
    }

    pub fn whole_bbox(&self) -> &Aabb {
        &self.whole
    }

    pub fn part_bbox(&self, part: &str) -> CoreResult<Aabb> {
        self.part_bbox
            .get(part)
            .copied()
            .ok_or_else(|| CoreError::MissingPart(part.to_string()))
    }

    pub fn boundary(&self, part: &str) -> CoreResult<&[Face]> {
        self.part_boundary
            .get(part)
            .map(Vec::as_slice)
            .ok_or_else(|| CoreError::MissingPart(part.to_string()))
    }

    pub fn part_nodes(&self, part: &str) -> CoreResult<&[usize]> {
        self.part_nodes
            .get(part)
            .map(Vec::as_slice)
            .ok_or_else(|| CoreError::MissingPart(part.to_string()))
    }
}

/// Exact-name rule assignments. Unknown names fall through to the
/// kind-derived default.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<String, Rule>,
}

impl RuleTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rules for the dome template's hand-authored selection names.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.insert("RUBBER_BOTTOM_FIX", Rule::ZMinPlane);
        table.insert("RUBBER_BOTTOM_CONTACT_Secondary", Rule::ZMinPlane);
        table.insert("RUBBER_SKIRT_CONTACT_Secondary", Rule::ZDownExceptBottom);
        table
    }

    pub fn insert(&mut self, name: impl Into<String>, rule: Rule) {
        self.rules.insert(name.into(), rule);
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }
}

/// Reconstructed selections, in the template's declaration order per kind.
/// Node and element ids are ascending and deduplicated; faces are ordered by
/// owning element, then local face.
#[derive(Debug)]
pub struct NewSelections {
    pub node_sets: Vec<(String, Vec<usize>)>,
    pub element_sets: Vec<(String, Vec<usize>)>,
    pub surfaces: Vec<(String, Vec<Face>)>,
    /// Rule label actually applied per selection name.
    pub rules_used: Vec<(String, &'static str)>,
}

fn surface_part(old_mesh: &Mesh, surface: &OldSurface) -> Option<String> {
    surface
        .faces
        .first()
        .and_then(|f| old_mesh.part_of_element(f.element))
        .map(str::to_string)
}

/// Part with the largest node overlap with `ids`.
fn node_set_part(part_nodes: &[(String, HashSet<usize>)], ids: &[usize]) -> Option<String> {
    let mut best: Option<(usize, &str)> = None;
    for (name, nodes) in part_nodes {
        let count = ids.iter().filter(|id| nodes.contains(id)).count();
        if count > 0 && best.map_or(true, |(c, _)| count > c) {
            best = Some((count, name));
        }
    }
    best.map(|(_, name)| name.to_string())
}

fn inferred_surface_rule(old_mesh: &Mesh, part_bbox: &Aabb, surface: &OldSurface) -> Rule {
    let mut node_ids: Vec<usize> = surface
        .faces
        .iter()
        .flat_map(|f| f.nodes.iter().copied())
        .collect();
    node_ids.sort_unstable();
    node_ids.dedup();
    Rule::RelativeBounds(rules::inferred_rel_bounds(
        part_bbox,
        node_ids.iter().map(|&n| &old_mesh.nodes[n]),
        INFER_PAD,
    ))
}

/// Reconstruct every named selection of the template against the new mesh.
pub fn reconstruct(
    old_mesh: &Mesh,
    old: &OldSelections,
    ctx: &ReconstructContext<'_>,
    table: &RuleTable,
    cancel: &CancelToken,
) -> CoreResult<NewSelections> {
    let mut old_part_bbox: HashMap<String, Aabb> = HashMap::new();
    for part in &old_mesh.parts {
        old_part_bbox.insert(part.name.clone(), bbox(old_mesh, Some(&part.name))?);
    }
    let old_part_nodes: Vec<(String, HashSet<usize>)> = old_mesh
        .parts
        .iter()
        .map(|p| {
            let nodes = old_mesh
                .part_node_indices(&p.name)
                .map(|v| v.into_iter().collect())?;
            Ok((p.name.clone(), nodes))
        })
        .collect::<CoreResult<_>>()?;

    // Contact-pair policy decides the rule for every paired surface before
    // the per-selection table and fallback are consulted.
    let mut pair_rules: HashMap<String, Rule> = HashMap::new();
    for pair in &old.pairs {
        let find = |name: &str| -> CoreResult<&OldSurface> {
            old.surfaces
                .iter()
                .find(|s| s.name == name)
                .ok_or_else(|| {
                    CoreError::MalformedTemplate(format!(
                        "contact pair '{}' references unknown surface '{name}'",
                        pair.name
                    ))
                })
        };
        let primary = find(&pair.primary)?;
        let secondary = find(&pair.secondary)?;
        let (Some(primary_part), Some(secondary_part)) = (
            surface_part(old_mesh, primary),
            surface_part(old_mesh, secondary),
        ) else {
            continue;
        };

        let same_part = primary_part == secondary_part;
        for (surface, own_part, other_part) in [
            (primary, &primary_part, &secondary_part),
            (secondary, &secondary_part, &primary_part),
        ] {
            let rule = if same_part {
                // Proximity against the own part would bleed across folds;
                // only relative bounds are admissible here.
                match table.get(&surface.name) {
                    Some(rule @ Rule::RelativeBounds(_)) => rule.clone(),
                    _ => {
                        let part_bbox = old_part_bbox.get(own_part).ok_or_else(|| {
                            CoreError::MissingPart(own_part.clone())
                        })?;
                        inferred_surface_rule(old_mesh, part_bbox, surface)
                    }
                }
            } else {
                match table.get(&surface.name) {
                    Some(rule) => rule.clone(),
                    None => Rule::CrossPartProximity {
                        other: other_part.clone(),
                        distance: None,
                    },
                }
            };
            pair_rules.insert(surface.name.clone(), rule);
        }
    }

    let mut out = NewSelections {
        node_sets: Vec::new(),
        element_sets: Vec::new(),
        surfaces: Vec::new(),
        rules_used: Vec::new(),
    };

    for (name, old_ids) in &old.node_sets {
        cancel.checkpoint()?;
        let Some(part) = node_set_part(&old_part_nodes, old_ids) else {
            out.node_sets.push((name.clone(), Vec::new()));
            continue;
        };
        let rule = match table.get(name) {
            Some(rule) => rule.clone(),
            None => {
                let part_bbox = old_part_bbox[&part];
                Rule::RelativeBounds(rules::inferred_rel_bounds(
                    &part_bbox,
                    old_ids.iter().map(|&n| &old_mesh.nodes[n]),
                    INFER_PAD,
                ))
            }
        };
        let selection = rule.apply(ctx, &part, SelectionKind::NodeSet)?;
        let Selection::Nodes(ids) = selection else {
            unreachable!("node-set rule produced a different entity kind")
        };
        if ids.is_empty() && !old_ids.is_empty() {
            return Err(CoreError::SelectionLost(name.clone()));
        }
        out.rules_used.push((name.clone(), rule.label()));
        out.node_sets.push((name.clone(), ids));
    }

    for (name, old_ids) in &old.element_sets {
        cancel.checkpoint()?;
        let Some(part) = old_ids
            .first()
            .and_then(|&e| old_mesh.part_of_element(e))
            .map(str::to_string)
        else {
            out.element_sets.push((name.clone(), Vec::new()));
            continue;
        };
        let rule = match table.get(name) {
            Some(rule) => rule.clone(),
            None => {
                let part_bbox = old_part_bbox[&part];
                let mut node_ids: Vec<usize> = old_ids
                    .iter()
                    .flat_map(|&e| old_mesh.elements[e].nodes.iter().copied())
                    .collect();
                node_ids.sort_unstable();
                node_ids.dedup();
                Rule::RelativeBounds(rules::inferred_rel_bounds(
                    &part_bbox,
                    node_ids.iter().map(|&n| &old_mesh.nodes[n]),
                    INFER_PAD,
                ))
            }
        };
        let selection = rule.apply(ctx, &part, SelectionKind::ElementSet)?;
        let Selection::Elements(ids) = selection else {
            unreachable!("element-set rule produced a different entity kind")
        };
        if ids.is_empty() && !old_ids.is_empty() {
            return Err(CoreError::SelectionLost(name.clone()));
        }
        out.rules_used.push((name.clone(), rule.label()));
        out.element_sets.push((name.clone(), ids));
    }

    for surface in &old.surfaces {
        cancel.checkpoint()?;
        let Some(part) = surface_part(old_mesh, surface) else {
            out.surfaces.push((surface.name.clone(), Vec::new()));
            continue;
        };
        let rule = match pair_rules.get(&surface.name).or_else(|| table.get(&surface.name)) {
            Some(rule) => rule.clone(),
            None => {
                let part_bbox = old_part_bbox.get(&part).ok_or_else(|| {
                    CoreError::MissingPart(part.clone())
                })?;
                inferred_surface_rule(old_mesh, part_bbox, surface)
            }
        };
        let selection = rule.apply(ctx, &part, SelectionKind::Surface)?;
        let Selection::Faces(faces) = selection else {
            unreachable!("surface rule produced a different entity kind")
        };
        if faces.is_empty() && !surface.faces.is_empty() {
            return Err(CoreError::SelectionLost(surface.name.clone()));
        }
        tracing::debug!(
            surface = surface.name.as_str(),
            rule = rule.label(),
            faces = faces.len(),
            "reconstructed surface"
        );
        out.rules_used.push((surface.name.clone(), rule.label()));
        out.surfaces.push((surface.name.clone(), faces));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::embedded::OldFace;
    use crate::doc::SurfacePair;
    use crate::mesh::{Element, ElementKind, Part};
    use nalgebra::Point3;

    /// Dome-style fixture: RUBBER is an L of three hexes (column plus an
    /// overhang whose underside faces down above the ground), PLUNGER is a
    /// separate hex resting on the column top.
    pub(crate) fn fixture_mesh() -> Mesh {
        let mut nodes = vec![
            // hexA corners, z in [0, 1]
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 1.0),
            // hexB top, z = 2
            Point3::new(0.0, 0.0, 2.0),
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(1.0, 1.0, 2.0),
            Point3::new(0.0, 1.0, 2.0),
            // hexC extras, x in [1, 2]
            Point3::new(2.0, 0.0, 1.0),
            Point3::new(2.0, 1.0, 1.0),
            Point3::new(2.0, 0.0, 2.0),
            Point3::new(2.0, 1.0, 2.0),
        ];
        // Plunger nodes, duplicated at the interface.
        for z in [2.0, 3.0] {
            nodes.push(Point3::new(0.0, 0.0, z));
            nodes.push(Point3::new(1.0, 0.0, z));
            nodes.push(Point3::new(1.0, 1.0, z));
            nodes.push(Point3::new(0.0, 1.0, z));
        }
        let elements = vec![
            Element {
                kind: ElementKind::Hex8,
                nodes: vec![0, 1, 2, 3, 4, 5, 6, 7],
            },
            Element {
                kind: ElementKind::Hex8,
                nodes: vec![4, 5, 6, 7, 8, 9, 10, 11],
            },
            Element {
                kind: ElementKind::Hex8,
                nodes: vec![5, 12, 13, 6, 9, 14, 15, 10],
            },
            Element {
                kind: ElementKind::Hex8,
                nodes: vec![16, 17, 18, 19, 20, 21, 22, 23],
            },
        ];
        let parts = vec![
            Part {
                name: "RUBBER".to_string(),
                range: 0..3,
            },
            Part {
                name: "PLUNGER".to_string(),
                range: 3..4,
            },
        ];
        Mesh::new(nodes, elements, parts).unwrap()
    }

    pub(crate) fn fixture_selections() -> OldSelections {
        OldSelections {
            node_sets: vec![("RUBBER_BOTTOM_FIX".to_string(), vec![0, 1, 2, 3])],
            element_sets: vec![("RUBBER_CORE_ELEMS".to_string(), vec![1])],
            surfaces: vec![
                OldSurface {
                    name: "RUBBER_BOTTOM_CONTACT_Secondary".to_string(),
                    faces: vec![OldFace {
                        element: 0,
                        nodes: vec![3, 2, 1, 0],
                    }],
                },
                OldSurface {
                    name: "RUBBER_SKIRT_CONTACT_Secondary".to_string(),
                    faces: vec![OldFace {
                        element: 2,
                        nodes: vec![6, 13, 12, 5],
                    }],
                },
                OldSurface {
                    name: "RUBBER_TOP_Secondary".to_string(),
                    faces: vec![OldFace {
                        element: 1,
                        nodes: vec![8, 9, 10, 11],
                    }],
                },
                OldSurface {
                    name: "PLUNGER_BOTTOM_Primary".to_string(),
                    faces: vec![OldFace {
                        element: 3,
                        nodes: vec![19, 18, 17, 16],
                    }],
                },
                OldSurface {
                    name: "RUBBER_SELF_Primary".to_string(),
                    faces: vec![
                        OldFace {
                            element: 0,
                            nodes: vec![3, 0, 4, 7],
                        },
                        OldFace {
                            element: 1,
                            nodes: vec![7, 4, 8, 11],
                        },
                    ],
                },
                OldSurface {
                    name: "RUBBER_SELF_Secondary".to_string(),
                    faces: vec![OldFace {
                        element: 2,
                        nodes: vec![12, 13, 15, 14],
                    }],
                },
            ],
            pairs: vec![
                SurfacePair {
                    name: "PLUNGER_RUBBER_CONTACT".to_string(),
                    primary: "PLUNGER_BOTTOM_Primary".to_string(),
                    secondary: "RUBBER_TOP_Secondary".to_string(),
                },
                SurfacePair {
                    name: "RUBBER_SELF_CONTACT".to_string(),
                    primary: "RUBBER_SELF_Primary".to_string(),
                    secondary: "RUBBER_SELF_Secondary".to_string(),
                },
            ],
        }
    }

    fn run_identity() -> NewSelections {
        let mesh = fixture_mesh();
        let old = fixture_selections();
        let config = PipelineConfig::default();
        let ctx = ReconstructContext::new(&mesh, &config).unwrap();
        reconstruct(
            &mesh,
            &old,
            &ctx,
            &RuleTable::standard(),
            &CancelToken::new(),
        )
        .unwrap()
    }

    fn surface<'a>(out: &'a NewSelections, name: &str) -> &'a [Face] {
        &out
            .surfaces
            .iter()
            .find(|(n, _)| n == name)
            .unwrap()
            .1
    }

    fn rule_used<'a>(out: &'a NewSelections, name: &str) -> &'static str {
        out.rules_used
            .iter()
            .find(|(n, _)| n == name)
            .unwrap()
            .1
    }

    #[test]
    fn test_identity_reconstruction_matches_template() {
        let out = run_identity();

        assert_eq!(out.node_sets[0].1, vec![0, 1, 2, 3]);
        assert_eq!(out.element_sets[0].1, vec![1]);
        assert_eq!(
            surface(&out, "RUBBER_BOTTOM_CONTACT_Secondary"),
            &[Face {
                element: 0,
                local_face: 4
            }]
        );
        assert_eq!(
            surface(&out, "RUBBER_SKIRT_CONTACT_Secondary"),
            &[Face {
                element: 2,
                local_face: 4
            }]
        );
        assert_eq!(
            surface(&out, "RUBBER_TOP_Secondary"),
            &[Face {
                element: 1,
                local_face: 5
            }]
        );
        assert_eq!(
            surface(&out, "PLUNGER_BOTTOM_Primary"),
            &[Face {
                element: 3,
                local_face: 4
            }]
        );
        assert_eq!(
            surface(&out, "RUBBER_SELF_Primary"),
            &[
                Face {
                    element: 0,
                    local_face: 3
                },
                Face {
                    element: 1,
                    local_face: 3
                }
            ]
        );
        assert_eq!(
            surface(&out, "RUBBER_SELF_Secondary"),
            &[Face {
                element: 2,
                local_face: 1
            }]
        );
    }

    #[test]
    fn test_contact_pair_policy() {
        let out = run_identity();
        // Cross-part pair uses proximity on both sides.
        assert_eq!(
            rule_used(&out, "PLUNGER_BOTTOM_Primary"),
            "cross_part_proximity"
        );
        assert_eq!(
            rule_used(&out, "RUBBER_TOP_Secondary"),
            "cross_part_proximity"
        );
        // Same-part pair is forced onto relative bounds.
        assert_eq!(rule_used(&out, "RUBBER_SELF_Primary"), "relative_bounds");
        assert_eq!(rule_used(&out, "RUBBER_SELF_Secondary"), "relative_bounds");
    }

    #[test]
    fn test_tilted_bottom_loses_ground_surface() {
        let mut mesh = fixture_mesh();
        // Tilt the ground face: two corners lifted off the plane.
        mesh.nodes[1].z = 0.3;
        mesh.nodes[2].z = 0.3;

        let old = fixture_selections();
        let config = PipelineConfig::default();
        let ctx = ReconstructContext::new(&mesh, &config).unwrap();
        let err = reconstruct(
            &fixture_mesh(),
            &old,
            &ctx,
            &RuleTable::standard(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::SelectionLost(name) if name == "RUBBER_BOTTOM_CONTACT_Secondary"
        ));
    }

    #[test]
    fn test_cancellation_stops_reconstruction() {
        let mesh = fixture_mesh();
        let old = fixture_selections();
        let config = PipelineConfig::default();
        let ctx = ReconstructContext::new(&mesh, &config).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            reconstruct(&mesh, &old, &ctx, &RuleTable::standard(), &cancel),
            Err(CoreError::Cancelled)
        ));
    }
}
