//! Pipeline configuration
//!
//! The configuration is built once at startup and passed into the pipeline
//! by value; nothing in the core reads ambient state.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

fn default_solver_path() -> String {
    "febio4".to_string()
}

fn default_eps_rel() -> f64 {
    1e-6
}

fn default_normal_angle() -> f64 {
    45.0
}

fn default_cross_part_distance() -> f64 {
    0.05
}

/// Tuning knobs consumed by the preparation pipeline and the solver driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Primary solver executable.
    #[serde(default = "default_solver_path")]
    pub febio_path: String,

    /// Alternate executable tried once when the primary exits with the
    /// dll-not-found status.
    #[serde(default)]
    pub febio_fallback_path: Option<String>,

    /// Relative epsilon for coordinate comparisons, scaled by the largest
    /// bounding-box edge of the mesh.
    #[serde(default = "default_eps_rel")]
    pub tolerance_eps_rel: f64,

    /// Angular threshold in degrees for face-normal classification.
    #[serde(default = "default_normal_angle")]
    pub normal_angle_deg: f64,

    /// Cross-part proximity distance as a fraction of the largest
    /// bounding-box edge of the whole mesh.
    #[serde(default = "default_cross_part_distance")]
    pub cross_part_distance_rel: f64,

    /// Part used for min-corner alignment. When unset, the first part
    /// declared by the template's mesh domains is used.
    #[serde(default)]
    pub reference_part_name: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            febio_path: default_solver_path(),
            febio_fallback_path: None,
            tolerance_eps_rel: default_eps_rel(),
            normal_angle_deg: default_normal_angle(),
            cross_part_distance_rel: default_cross_part_distance(),
            reference_part_name: None,
        }
    }
}

impl PipelineConfig {
    /// Build a configuration from a flat key/value mapping. Unknown keys are
    /// ignored; missing keys keep their defaults.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = map.get("febio_path") {
            cfg.febio_path = v.clone();
        }
        if let Some(v) = map.get("febio_fallback_path") {
            cfg.febio_fallback_path = Some(v.clone());
        }
        if let Some(v) = map.get("tolerance_eps_rel").and_then(|v| v.parse().ok()) {
            cfg.tolerance_eps_rel = v;
        }
        if let Some(v) = map.get("normal_angle_deg").and_then(|v| v.parse().ok()) {
            cfg.normal_angle_deg = v;
        }
        if let Some(v) = map
            .get("cross_part_distance_rel")
            .and_then(|v| v.parse().ok())
        {
            cfg.cross_part_distance_rel = v;
        }
        if let Some(v) = map.get("reference_part_name") {
            cfg.reference_part_name = Some(v.clone());
        }
        cfg
    }

    /// Read a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(std::io::Error::other)
    }

    /// Cosine of the normal classification threshold.
    pub fn cos_normal_angle(&self) -> f64 {
        self.normal_angle_deg.to_radians().cos()
    }
}
