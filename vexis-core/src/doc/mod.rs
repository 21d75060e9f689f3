//! Typed view over the FEA template document
//!
//! The template is an XML document in the solver's dialect: a `<Mesh>` block
//! holding nodes, per-part element blocks, named node/element sets, surfaces
//! and surface pairs; `<MeshDomains>` binding parts to materials; `<Control>`
//! blocks (possibly nested in steps); and an `<Output>` section. `FebDoc`
//! exposes locators over that structure and the mutation operations the
//! rewriter needs. All document ids are 1-based; the in-memory mesh is
//! 0-based.

pub mod control;
pub mod embedded;
pub mod xml;

use std::path::Path;

use nalgebra::Point3;

use crate::error::{CoreError, CoreResult};
use crate::mesh::ElementKind;
use xml::{XmlElement, XmlNode};

/// A named node or element set, ids as written in the document.
#[derive(Debug, Clone)]
pub struct NamedSet {
    pub name: String,
    pub ids: Vec<usize>,
}

/// One face of a surface: owning element id plus its node tuple.
#[derive(Debug, Clone)]
pub struct SurfaceFace {
    pub element_id: usize,
    pub nodes: Vec<usize>,
}

/// A named surface, faces in document order.
#[derive(Debug, Clone)]
pub struct NamedSurface {
    pub name: String,
    pub faces: Vec<SurfaceFace>,
}

/// A contact pair referencing two surfaces by name.
#[derive(Debug, Clone)]
pub struct SurfacePair {
    pub name: String,
    pub primary: String,
    pub secondary: String,
}

/// Face tags of the solver dialect, by node count.
fn face_tag(node_count: usize) -> CoreResult<&'static str> {
    match node_count {
        3 => Ok("tri3"),
        4 => Ok("quad4"),
        6 => Ok("tri6"),
        8 => Ok("quad8"),
        n => Err(CoreError::MalformedTemplate(format!(
            "no face tag for {n}-node faces"
        ))),
    }
}

fn is_face_tag(name: &str) -> bool {
    matches!(name, "tri3" | "quad4" | "tri6" | "quad8")
}

fn parse_id(element: &XmlElement) -> CoreResult<usize> {
    element
        .attr("id")
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| {
            CoreError::MalformedTemplate(format!("<{}> without a numeric id", element.name))
        })
}

fn parse_id_list(element: &XmlElement, child_tag: &str) -> CoreResult<Vec<usize>> {
    element
        .children_named(child_tag)
        .map(parse_id)
        .collect()
}

fn parse_int_tuple(text: &str) -> CoreResult<Vec<usize>> {
    text.split(',')
        .map(|tok| {
            tok.trim()
                .parse()
                .map_err(|_| CoreError::MalformedTemplate(format!("bad integer '{tok}'")))
        })
        .collect()
}

fn parse_coord_tuple(text: &str) -> CoreResult<Point3<f64>> {
    let parts: Vec<f64> = text
        .split(',')
        .map(|tok| {
            tok.trim()
                .parse()
                .map_err(|_| CoreError::MalformedTemplate(format!("bad coordinate '{tok}'")))
        })
        .collect::<CoreResult<_>>()?;
    if parts.len() != 3 {
        return Err(CoreError::MalformedTemplate(format!(
            "coordinate tuple '{text}' is not three values"
        )));
    }
    Ok(Point3::new(parts[0], parts[1], parts[2]))
}

fn fmt_coord(p: &Point3<f64>) -> String {
    format!("{},{},{}", p.x, p.y, p.z)
}

fn fmt_int_tuple(ids: &[usize]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// The parsed template document.
#[derive(Debug, Clone)]
pub struct FebDoc {
    pub root: XmlElement,
}

impl FebDoc {
    pub fn parse_str(input: &str) -> CoreResult<Self> {
        Ok(Self {
            root: xml::parse_document(input)?,
        })
    }

    pub fn parse_file(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_str(&text)
    }

    pub fn to_xml(&self) -> String {
        xml::write_document(&self.root)
    }

    fn mesh(&self) -> CoreResult<&XmlElement> {
        self.root
            .child("Mesh")
            .ok_or_else(|| CoreError::MalformedTemplate("missing <Mesh> block".to_string()))
    }

    fn mesh_mut(&mut self) -> CoreResult<&mut XmlElement> {
        self.root
            .child_mut("Mesh")
            .ok_or_else(|| CoreError::MalformedTemplate("missing <Mesh> block".to_string()))
    }

    /// Part names in mesh-domain declaration order. This order also defines
    /// the part-id encoding of the mesher's cell array.
    pub fn parts(&self) -> CoreResult<Vec<String>> {
        let domains = self.root.child("MeshDomains").ok_or_else(|| {
            CoreError::MalformedTemplate("missing <MeshDomains> block".to_string())
        })?;
        let names: Vec<String> = domains
            .child_elements()
            .filter_map(|d| d.attr("name").map(str::to_string))
            .collect();
        if names.is_empty() {
            return Err(CoreError::MalformedTemplate(
                "<MeshDomains> declares no parts".to_string(),
            ));
        }
        Ok(names)
    }

    /// Nodes of the embedded mesh: (document id, position) in document order.
    pub fn nodes(&self) -> CoreResult<Vec<(usize, Point3<f64>)>> {
        let nodes = self.mesh()?.child("Nodes").ok_or_else(|| {
            CoreError::MalformedTemplate("missing <Nodes> block".to_string())
        })?;
        nodes
            .children_named("node")
            .map(|n| Ok((parse_id(n)?, parse_coord_tuple(&n.text())?)))
            .collect()
    }

    /// Elements of one part: (document id, node-id tuple) plus the kind.
    pub fn elements(&self, part: &str) -> CoreResult<(ElementKind, Vec<(usize, Vec<usize>)>)> {
        let block = self
            .mesh()?
            .children_named("Elements")
            .find(|b| b.attr("name") == Some(part))
            .ok_or_else(|| CoreError::TemplateMissingPart(part.to_string()))?;
        let kind = block
            .attr("type")
            .and_then(ElementKind::from_label)
            .ok_or_else(|| {
                CoreError::MalformedTemplate(format!(
                    "part '{part}' has an unknown element type"
                ))
            })?;
        let elems = block
            .children_named("elem")
            .map(|e| Ok((parse_id(e)?, parse_int_tuple(&e.text())?)))
            .collect::<CoreResult<_>>()?;
        Ok((kind, elems))
    }

    pub fn node_sets(&self) -> CoreResult<Vec<NamedSet>> {
        self.mesh()?
            .children_named("NodeSet")
            .map(|set| {
                Ok(NamedSet {
                    name: named(set)?,
                    ids: parse_id_list(set, "n")?,
                })
            })
            .collect()
    }

    pub fn element_sets(&self) -> CoreResult<Vec<NamedSet>> {
        self.mesh()?
            .children_named("ElementSet")
            .map(|set| {
                Ok(NamedSet {
                    name: named(set)?,
                    ids: parse_id_list(set, "e")?,
                })
            })
            .collect()
    }

    pub fn surfaces(&self) -> CoreResult<Vec<NamedSurface>> {
        self.mesh()?
            .children_named("Surface")
            .map(|surface| {
                let faces = surface
                    .child_elements()
                    .filter(|f| is_face_tag(&f.name))
                    .map(|f| {
                        Ok(SurfaceFace {
                            element_id: parse_id(f)?,
                            nodes: parse_int_tuple(&f.text())?,
                        })
                    })
                    .collect::<CoreResult<_>>()?;
                Ok(NamedSurface {
                    name: named(surface)?,
                    faces,
                })
            })
            .collect()
    }

    pub fn surface_pairs(&self) -> CoreResult<Vec<SurfacePair>> {
        self.mesh()?
            .children_named("SurfacePair")
            .map(|pair| {
                let read = |tag: &str| -> CoreResult<String> {
                    pair.child(tag)
                        .map(|el| el.text())
                        .filter(|t| !t.is_empty())
                        .ok_or_else(|| {
                            CoreError::MalformedTemplate(format!(
                                "surface pair without <{tag}>"
                            ))
                        })
                };
                Ok(SurfacePair {
                    name: named(pair)?,
                    primary: read("primary")?,
                    secondary: read("secondary")?,
                })
            })
            .collect()
    }

    /// The `<Output>/<plotfile>` element, when present.
    pub fn output_plotfile(&self) -> Option<&XmlElement> {
        self.root.child("Output")?.child("plotfile")
    }

    /// Total simulated time summed over every control block.
    pub fn total_time(&self) -> f64 {
        control::total_time(&self.root)
    }

    // -- mutation ----------------------------------------------------------

    /// Replace the node block with sequentially numbered coordinates.
    pub fn replace_nodes(&mut self, coords: &[Point3<f64>]) -> CoreResult<()> {
        let nodes = self.mesh_mut()?.child_mut("Nodes").ok_or_else(|| {
            CoreError::MalformedTemplate("missing <Nodes> block".to_string())
        })?;
        nodes.children = coords
            .iter()
            .enumerate()
            .map(|(i, p)| {
                XmlNode::Element(
                    XmlElement::new("node")
                        .with_attr("id", (i + 1).to_string())
                        .with_text(fmt_coord(p)),
                )
            })
            .collect();
        Ok(())
    }

    /// Replace one part's element block, keeping the block's position.
    pub fn replace_elements(
        &mut self,
        part: &str,
        kind: ElementKind,
        elements: &[(usize, Vec<usize>)],
    ) -> CoreResult<()> {
        let block = self
            .mesh_mut()?
            .children
            .iter_mut()
            .find_map(|node| match node {
                XmlNode::Element(el)
                    if el.name == "Elements" && el.attr("name") == Some(part) =>
                {
                    Some(el)
                }
                _ => None,
            })
            .ok_or_else(|| CoreError::TemplateMissingPart(part.to_string()))?;
        block.set_attr("type", kind.label());
        block.children = elements
            .iter()
            .map(|(id, nodes)| {
                XmlNode::Element(
                    XmlElement::new("elem")
                        .with_attr("id", id.to_string())
                        .with_text(fmt_int_tuple(nodes)),
                )
            })
            .collect();
        Ok(())
    }

    fn set_named_ids(
        &mut self,
        block_tag: &str,
        child_tag: &str,
        name: &str,
        ids: &[usize],
    ) -> CoreResult<()> {
        let set = self
            .mesh_mut()?
            .children
            .iter_mut()
            .find_map(|node| match node {
                XmlNode::Element(el)
                    if el.name == block_tag && el.attr("name") == Some(name) =>
                {
                    Some(el)
                }
                _ => None,
            })
            .ok_or_else(|| {
                CoreError::MalformedTemplate(format!("no <{block_tag}> named '{name}'"))
            })?;
        set.children = ids
            .iter()
            .map(|id| {
                XmlNode::Element(XmlElement::new(child_tag).with_attr("id", id.to_string()))
            })
            .collect();
        Ok(())
    }

    /// Rewrite a node set; ids must already be ascending and deduplicated.
    pub fn set_node_set(&mut self, name: &str, ids: &[usize]) -> CoreResult<()> {
        self.set_named_ids("NodeSet", "n", name, ids)
    }

    pub fn set_element_set(&mut self, name: &str, ids: &[usize]) -> CoreResult<()> {
        self.set_named_ids("ElementSet", "e", name, ids)
    }

    /// Rewrite a surface, faces in the order given.
    pub fn set_surface(&mut self, name: &str, faces: &[SurfaceFace]) -> CoreResult<()> {
        let children = faces
            .iter()
            .map(|face| {
                Ok(XmlNode::Element(
                    XmlElement::new(face_tag(face.nodes.len())?)
                        .with_attr("id", face.element_id.to_string())
                        .with_text(fmt_int_tuple(&face.nodes)),
                ))
            })
            .collect::<CoreResult<Vec<_>>>()?;
        let surface = self
            .mesh_mut()?
            .children
            .iter_mut()
            .find_map(|node| match node {
                XmlNode::Element(el)
                    if el.name == "Surface" && el.attr("name") == Some(name) =>
                {
                    Some(el)
                }
                _ => None,
            })
            .ok_or_else(|| {
                CoreError::MalformedTemplate(format!("no <Surface> named '{name}'"))
            })?;
        surface.children = children;
        Ok(())
    }
}

fn named(element: &XmlElement) -> CoreResult<String> {
    element
        .attr("name")
        .map(str::to_string)
        .ok_or_else(|| {
            CoreError::MalformedTemplate(format!("<{}> without a name", element.name))
        })
}
