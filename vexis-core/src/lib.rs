//! VEXIS core - mesh-swap and set-reconstruction engine
//!
//! Swaps a freshly generated volumetric mesh into a hand-authored FEA
//! template and rebuilds every named selection the physics references from
//! purely geometric rules:
//! - Mesh loading from the mesher's unstructured-grid output
//! - Min-corner alignment into the template's coordinate frame
//! - Named-selection reconstruction (node sets, element sets, surfaces,
//!   contact pairs) from geometric predicates
//! - One-pass document rewrite that leaves the physics untouched
//!
//! ## Example
//! ```no_run
//! use vexis_core::prelude::*;
//! use std::path::Path;
//!
//! let config = PipelineConfig::default();
//! let table = RuleTable::standard();
//! let cancel = CancelToken::new();
//! let report = prepare_document(
//!     Path::new("template.feb"),
//!     Path::new("input/dome.vtk"),
//!     Path::new("temp/dome.feb"),
//!     &config,
//!     &table,
//!     &cancel,
//! )?;
//! println!("prepared {} ({} nodes)", report.output.display(), report.nodes);
//! # Ok::<(), vexis_core::error::CoreError>(())
//! ```

pub mod align;
pub mod cancel;
pub mod config;
pub mod doc;
pub mod error;
pub mod geometry;
pub mod mesh;
pub mod prepare;
pub mod reconstruct;
pub mod rewrite;

// Re-export common types
pub mod prelude {
    pub use crate::align::{align, alignment_delta};
    pub use crate::cancel::CancelToken;
    pub use crate::config::PipelineConfig;
    pub use crate::doc::FebDoc;
    pub use crate::error::{CoreError, CoreResult};
    pub use crate::geometry::{Aabb, Axis, Face};
    pub use crate::mesh::{Element, ElementKind, Mesh, Part};
    pub use crate::prepare::{prepare_document, prepare_from_doc, PrepareReport};
    pub use crate::reconstruct::{
        reconstruct, NewSelections, ReconstructContext, RelBox, Rule, RuleTable,
        Selection, SelectionKind,
    };
}
