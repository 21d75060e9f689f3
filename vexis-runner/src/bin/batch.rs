//! Batch runner
//!
//! Scans a job directory (`input/*.vtk|*.vtu` next to a `template.feb` and
//! an optional `vexis.json`), runs every job strictly in sequence, and
//! reports the batch outcome through the exit code: 0 all ok, 1 at least
//! one job failed, 2 no inputs.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vexis_core::cancel::CancelToken;
use vexis_core::config::PipelineConfig;
use vexis_core::reconstruct::RuleTable;
use vexis_runner::job::{run_job_to_completion, JobPaths};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "vexis_batch=info,vexis_runner=info,vexis_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let template = root.join("template.feb");
    anyhow::ensure!(
        template.exists(),
        "no template.feb in {}",
        root.display()
    );

    let config_path = root.join("vexis.json");
    let mut config = if config_path.exists() {
        PipelineConfig::from_json_file(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?
    } else {
        PipelineConfig::default()
    };
    if let Ok(path) = std::env::var("FEBIO_PATH") {
        config.febio_path = path;
    }

    // Probe the solver once up front; jobs will fail later if it is absent,
    // but a missing executable is worth a loud warning immediately.
    match std::process::Command::new(&config.febio_path)
        .arg("-v")
        .output()
    {
        Ok(_) => tracing::info!("solver found: {}", config.febio_path),
        Err(err) => tracing::warn!(
            "solver '{}' not accessible ({err}); set FEBIO_PATH or vexis.json",
            config.febio_path
        ),
    }

    let input_dir = root.join("input");
    let mut inputs: Vec<PathBuf> = match std::fs::read_dir(&input_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("vtk") | Some("vtu")
                )
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    inputs.sort();
    if inputs.is_empty() {
        tracing::error!("no mesh inputs in {}", input_dir.display());
        return Ok(ExitCode::from(2));
    }

    let table = RuleTable::standard();
    let cancel = CancelToken::new();
    let temp_dir = root.join("temp");
    let results_dir = root.join("results");

    let mut failed = 0usize;
    for mesh in &inputs {
        let paths = JobPaths::new(mesh, &template, &temp_dir, &results_dir);
        tracing::info!("=== job '{}' ===", paths.name);
        if !run_job_to_completion(&paths, &config, &table, &cancel) {
            failed += 1;
        }
    }

    tracing::info!(
        "batch finished: {}/{} jobs ok",
        inputs.len() - failed,
        inputs.len()
    );
    Ok(ExitCode::from(if failed > 0 { 1 } else { 0 }))
}
