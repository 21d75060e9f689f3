//! End-to-end preparation scenarios against a dome-style template fixture.
//!
//! The fixture carries two parts: RUBBER, an L of three hexes whose overhang
//! has a downward face above the ground plane, and PLUNGER, a separate hex
//! resting on the column top. The template names the selections the physics
//! references; the mesh file is generated from the same node/element data.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use vexis_core::doc::xml;
use vexis_core::prelude::*;
use vtkio::model::{
    Attribute, Attributes, ByteOrder, CellType, Cells, DataSet, UnstructuredGridPiece,
    Version, VertexNumbers, Vtk,
};

struct Fixture {
    nodes: Vec<[f64; 3]>,
    /// (part id, hex connectivity)
    elements: Vec<(usize, [usize; 8])>,
}

fn fixture() -> Fixture {
    let mut nodes = vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 1.0],
        [1.0, 1.0, 1.0],
        [0.0, 1.0, 1.0],
        [0.0, 0.0, 2.0],
        [1.0, 0.0, 2.0],
        [1.0, 1.0, 2.0],
        [0.0, 1.0, 2.0],
        [2.0, 0.0, 1.0],
        [2.0, 1.0, 1.0],
        [2.0, 0.0, 2.0],
        [2.0, 1.0, 2.0],
    ];
    for z in [2.0, 3.0] {
        nodes.push([0.0, 0.0, z]);
        nodes.push([1.0, 0.0, z]);
        nodes.push([1.0, 1.0, z]);
        nodes.push([0.0, 1.0, z]);
    }
    let elements = vec![
        (0, [0, 1, 2, 3, 4, 5, 6, 7]),
        (0, [4, 5, 6, 7, 8, 9, 10, 11]),
        (0, [5, 12, 13, 6, 9, 14, 15, 10]),
        (1, [16, 17, 18, 19, 20, 21, 22, 23]),
    ];
    Fixture { nodes, elements }
}

fn template_xml(f: &Fixture) -> String {
    let mut nodes = String::new();
    for (i, p) in f.nodes.iter().enumerate() {
        writeln!(
            nodes,
            "\t\t\t<node id=\"{}\">{},{},{}</node>",
            i + 1,
            p[0],
            p[1],
            p[2]
        )
        .unwrap();
    }
    let mut rubber = String::new();
    let mut plunger = String::new();
    for (i, (part, conn)) in f.elements.iter().enumerate() {
        let tuple = conn
            .iter()
            .map(|&n| (n + 1).to_string())
            .collect::<Vec<_>>()
            .join(",");
        let block = if *part == 0 { &mut rubber } else { &mut plunger };
        writeln!(block, "\t\t\t<elem id=\"{}\">{}</elem>", i + 1, tuple).unwrap();
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<febio_spec version="4.0">
	<Module type="solid"/>
	<Control>
		<time_steps>10</time_steps>
		<step_size>0.1</step_size>
	</Control>
	<Material>
		<material id="1" name="rubber" type="Mooney-Rivlin"/>
		<material id="2" name="stem" type="neo-Hookean"/>
	</Material>
	<Mesh>
		<Nodes name="Object1">
{nodes}		</Nodes>
		<Elements type="hex8" name="RUBBER">
{rubber}		</Elements>
		<Elements type="hex8" name="PLUNGER">
{plunger}		</Elements>
		<NodeSet name="RUBBER_BOTTOM_FIX">
			<n id="1"/>
			<n id="2"/>
			<n id="3"/>
			<n id="4"/>
		</NodeSet>
		<ElementSet name="RUBBER_CORE_ELEMS">
			<e id="2"/>
		</ElementSet>
		<Surface name="RUBBER_BOTTOM_CONTACT_Secondary">
			<quad4 id="1">4,3,2,1</quad4>
		</Surface>
		<Surface name="RUBBER_SKIRT_CONTACT_Secondary">
			<quad4 id="3">7,14,13,6</quad4>
		</Surface>
		<Surface name="RUBBER_TOP_Secondary">
			<quad4 id="2">9,10,11,12</quad4>
		</Surface>
		<Surface name="PLUNGER_BOTTOM_Primary">
			<quad4 id="4">20,19,18,17</quad4>
		</Surface>
		<Surface name="RUBBER_SELF_Primary">
			<quad4 id="1">4,1,5,8</quad4>
			<quad4 id="2">8,5,9,12</quad4>
		</Surface>
		<Surface name="RUBBER_SELF_Secondary">
			<quad4 id="3">13,14,16,15</quad4>
		</Surface>
		<SurfacePair name="PLUNGER_RUBBER_CONTACT">
			<primary>PLUNGER_BOTTOM_Primary</primary>
			<secondary>RUBBER_TOP_Secondary</secondary>
		</SurfacePair>
		<SurfacePair name="RUBBER_SELF_CONTACT">
			<primary>RUBBER_SELF_Primary</primary>
			<secondary>RUBBER_SELF_Secondary</secondary>
		</SurfacePair>
	</Mesh>
	<MeshDomains>
		<SolidDomain name="RUBBER" mat="rubber"/>
		<SolidDomain name="PLUNGER" mat="stem"/>
	</MeshDomains>
	<Boundary>
		<bc name="fix_base" type="zero displacement" node_set="RUBBER_BOTTOM_FIX"/>
	</Boundary>
	<Contact>
		<contact type="sliding-elastic" surface_pair="PLUNGER_RUBBER_CONTACT"/>
		<contact type="sliding-elastic" surface_pair="RUBBER_SELF_CONTACT"/>
	</Contact>
	<Step>
		<step id="2">
			<Control>
				<time_steps>20</time_steps>
				<step_size>0.05</step_size>
			</Control>
		</step>
	</Step>
	<Output>
		<plotfile type="febio">
			<var type="displacement"/>
			<var type="stress"/>
		</plotfile>
	</Output>
</febio_spec>
"#
    )
}

fn export_vtk(f: &Fixture, shift: [f64; 3], path: &Path) {
    let mut points = Vec::new();
    for p in &f.nodes {
        points.extend_from_slice(&[p[0] + shift[0], p[1] + shift[1], p[2] + shift[2]]);
    }
    let mut connectivity = Vec::new();
    let mut offsets = Vec::new();
    let mut part_ids = Vec::new();
    for (part, conn) in &f.elements {
        connectivity.extend(conn.iter().map(|&n| n as u64));
        offsets.push(connectivity.len() as u64);
        part_ids.push(*part as i32);
    }
    let vtk = Vtk {
        version: Version::new_xml(2, 0),
        title: "vexis fixture".to_string(),
        byte_order: ByteOrder::BigEndian,
        file_path: None,
        data: DataSet::inline(UnstructuredGridPiece {
            points: points.into(),
            cells: Cells {
                cell_verts: VertexNumbers::XML {
                    connectivity,
                    offsets,
                },
                types: vec![CellType::Hexahedron; f.elements.len()],
            },
            data: Attributes {
                point: vec![],
                cell: vec![Attribute::scalars("part", 1).with_data(part_ids)],
            },
        }),
    };
    vtk.export_ascii(path).unwrap();
}

/// Split every (axis-aligned) hex into eight, deduplicating shared nodes.
fn subdivide(f: &Fixture) -> Fixture {
    let quantize = |v: f64| (v * 1e6).round() as i64;
    let mut node_ids: HashMap<[i64; 3], usize> = HashMap::new();
    let mut nodes = Vec::new();
    let mut elements = Vec::new();
    for (part, conn) in &f.elements {
        let corner = |i: usize| f.nodes[conn[i]];
        let (lo, hi) = (corner(0), corner(6));
        let coord = |axis: usize, step: usize| {
            lo[axis] + (hi[axis] - lo[axis]) * step as f64 / 2.0
        };
        // 3x3x3 lattice over the hex, then eight sub-hexes.
        let mut lattice = [0usize; 27];
        for k in 0..3 {
            for j in 0..3 {
                for i in 0..3 {
                    let p = [coord(0, i), coord(1, j), coord(2, k)];
                    let key = [quantize(p[0]), quantize(p[1]), quantize(p[2])];
                    let id = *node_ids.entry(key).or_insert_with(|| {
                        nodes.push(p);
                        nodes.len() - 1
                    });
                    lattice[k * 9 + j * 3 + i] = id;
                }
            }
        }
        let at = |i: usize, j: usize, k: usize| lattice[k * 9 + j * 3 + i];
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..2 {
                    elements.push((
                        *part,
                        [
                            at(i, j, k),
                            at(i + 1, j, k),
                            at(i + 1, j + 1, k),
                            at(i, j + 1, k),
                            at(i, j, k + 1),
                            at(i + 1, j, k + 1),
                            at(i + 1, j + 1, k + 1),
                            at(i, j + 1, k + 1),
                        ],
                    ));
                }
            }
        }
    }
    Fixture { nodes, elements }
}

struct TestJob {
    dir: tempfile::TempDir,
}

impl TestJob {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn template_path(&self, xml: &str) -> std::path::PathBuf {
        let path = self.dir.path().join("template.feb");
        std::fs::write(&path, xml).unwrap();
        path
    }

    fn out_path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }
}

fn prepare(template: &Path, mesh: &Path, out: &Path) -> CoreResult<PrepareReport> {
    prepare_document(
        template,
        mesh,
        out,
        &PipelineConfig::default(),
        &RuleTable::standard(),
        &CancelToken::new(),
    )
}

#[test]
fn test_identity_roundtrip_reproduces_template() {
    let f = fixture();
    let job = TestJob::new();
    let template = job.template_path(&template_xml(&f));
    let mesh = job.out_path("mesh.vtk");
    export_vtk(&f, [0.0; 3], &mesh);
    let out = job.out_path("prepared.feb");

    let report = prepare(&template, &mesh, &out).unwrap();
    assert_eq!(report.nodes, 24);
    assert_eq!(report.elements, 4);
    assert!((report.total_time - 2.0).abs() < 1e-12);

    // Feeding the template's own mesh back reproduces the template exactly,
    // modulo serialisation normalisation.
    let expected = xml::write_document(
        &xml::parse_document(&std::fs::read_to_string(&template).unwrap()).unwrap(),
    );
    let prepared = std::fs::read_to_string(&out).unwrap();
    assert_eq!(prepared, expected);
}

#[test]
fn test_translated_mesh_aligns_back() {
    let f = fixture();
    let job = TestJob::new();
    let template = job.template_path(&template_xml(&f));

    let identity_mesh = job.out_path("identity.vtk");
    export_vtk(&f, [0.0; 3], &identity_mesh);
    let identity_out = job.out_path("identity.feb");
    prepare(&template, &identity_mesh, &identity_out).unwrap();

    let shifted_mesh = job.out_path("shifted.vtk");
    export_vtk(&f, [10.0, 20.0, 30.0], &shifted_mesh);
    let shifted_out = job.out_path("shifted.feb");
    let report = prepare(&template, &shifted_mesh, &shifted_out).unwrap();

    assert!((report.delta.x + 10.0).abs() < 1e-9);
    assert!((report.delta.y + 20.0).abs() < 1e-9);
    assert!((report.delta.z + 30.0).abs() < 1e-9);
    assert_eq!(
        std::fs::read(&identity_out).unwrap(),
        std::fs::read(&shifted_out).unwrap()
    );
}

#[test]
fn test_prepared_document_is_deterministic() {
    let f = fixture();
    let job = TestJob::new();
    let template = job.template_path(&template_xml(&f));
    let mesh = job.out_path("mesh.vtk");
    export_vtk(&f, [0.0; 3], &mesh);

    let first = job.out_path("a.feb");
    let second = job.out_path("b.feb");
    prepare(&template, &mesh, &first).unwrap();
    prepare(&template, &mesh, &second).unwrap();
    assert_eq!(
        std::fs::read(&first).unwrap(),
        std::fs::read(&second).unwrap()
    );
}

#[test]
fn test_refined_mesh_keeps_every_selection() {
    let f = subdivide(&fixture());
    let job = TestJob::new();
    let template = job.template_path(&template_xml(&fixture()));
    let mesh = job.out_path("refined.vtk");
    export_vtk(&f, [0.0; 3], &mesh);
    let out = job.out_path("refined.feb");

    let report = prepare(&template, &mesh, &out).unwrap();
    assert_eq!(report.elements, 32);

    let doc = FebDoc::parse_file(&out).unwrap();
    let surfaces: HashMap<String, usize> = doc
        .surfaces()
        .unwrap()
        .into_iter()
        .map(|s| (s.name, s.faces.len()))
        .collect();
    assert_eq!(surfaces["RUBBER_BOTTOM_CONTACT_Secondary"], 4);
    assert_eq!(surfaces["RUBBER_SKIRT_CONTACT_Secondary"], 4);
    assert_eq!(surfaces["RUBBER_TOP_Secondary"], 4);
    assert_eq!(surfaces["PLUNGER_BOTTOM_Primary"], 4);
    assert_eq!(surfaces["RUBBER_SELF_Primary"], 8);
    assert_eq!(surfaces["RUBBER_SELF_Secondary"], 4);

    let node_sets = doc.node_sets().unwrap();
    assert_eq!(node_sets[0].name, "RUBBER_BOTTOM_FIX");
    assert_eq!(node_sets[0].ids.len(), 9);
    let element_sets = doc.element_sets().unwrap();
    assert_eq!(element_sets[0].ids.len(), 8);
}

#[test]
fn test_tilted_ground_face_is_reported_lost() {
    let mut f = fixture();
    // Lift two corners of the ground face off the bottom plane: no boundary
    // face lies on z_min any more.
    f.nodes[1][2] = 0.3;
    f.nodes[2][2] = 0.3;

    let job = TestJob::new();
    let template = job.template_path(&template_xml(&fixture()));
    let mesh = job.out_path("tilted.vtk");
    export_vtk(&f, [0.0; 3], &mesh);
    let out = job.out_path("tilted.feb");

    let err = prepare(&template, &mesh, &out).unwrap_err();
    assert!(matches!(
        err,
        CoreError::SelectionLost(name) if name == "RUBBER_BOTTOM_CONTACT_Secondary"
    ));
    assert!(!out.exists());
    assert!(!job.out_path("tilted.feb.tmp").exists());
}

#[test]
fn test_cancelled_preparation_leaves_no_output() {
    let f = fixture();
    let job = TestJob::new();
    let template = job.template_path(&template_xml(&f));
    let mesh = job.out_path("mesh.vtk");
    export_vtk(&f, [0.0; 3], &mesh);
    let out = job.out_path("prepared.feb");

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = prepare_document(
        &template,
        &mesh,
        &out,
        &PipelineConfig::default(),
        &RuleTable::standard(),
        &cancel,
    )
    .unwrap_err();
    assert!(matches!(err, CoreError::Cancelled));
    assert!(!out.exists());
}
