//! Per-job orchestration
//!
//! One job runs the stages strictly in sequence: prepare the document, drive
//! the solver, extract the curve. Artifacts live under the job's temp and
//! results directories and are named after the mesh file stem, so a batch
//! run is reproducible file-for-file. A fatal error leaves a `.err`
//! diagnostic next to the prepared document; cancellation promotes nothing.

use std::path::{Path, PathBuf};

use vexis_core::cancel::CancelToken;
use vexis_core::config::PipelineConfig;
use vexis_core::prepare::prepare_document;
use vexis_core::reconstruct::RuleTable;
use vexis_core::rewrite::discard_tmp;

use crate::driver::{SolveRequest, SolverDriver};
use crate::error::RunnerResult;
use crate::extract::{parse_rigid_body_rows, write_curve_csv};
use crate::plot::write_curve_plot;

/// Filesystem layout of one job.
#[derive(Debug, Clone)]
pub struct JobPaths {
    pub name: String,
    pub mesh: PathBuf,
    pub template: PathBuf,
    pub temp_dir: PathBuf,
    pub results_dir: PathBuf,
}

impl JobPaths {
    pub fn new(mesh: &Path, template: &Path, temp_dir: &Path, results_dir: &Path) -> Self {
        let name = mesh
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "job".to_string());
        Self {
            name,
            mesh: mesh.to_path_buf(),
            template: template.to_path_buf(),
            temp_dir: temp_dir.to_path_buf(),
            results_dir: results_dir.to_path_buf(),
        }
    }

    pub fn prepared(&self) -> PathBuf {
        self.temp_dir.join(format!("{}.feb", self.name))
    }

    pub fn log(&self) -> PathBuf {
        self.temp_dir.join(format!("{}.log", self.name))
    }

    pub fn err_file(&self) -> PathBuf {
        self.temp_dir.join(format!("{}.err", self.name))
    }

    pub fn csv(&self) -> PathBuf {
        self.results_dir.join(format!("{}.csv", self.name))
    }

    pub fn png(&self) -> PathBuf {
        self.results_dir.join(format!("{}.png", self.name))
    }
}

/// What a finished job produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// CSV and plot written.
    Curve { points: usize },
    /// Solver ran but the log carried no rigid-body rows; the CSV is empty
    /// and the plot is skipped.
    NoCurve,
}

/// Run one job end to end.
pub fn run_job(
    paths: &JobPaths,
    config: &PipelineConfig,
    table: &RuleTable,
    cancel: &CancelToken,
) -> RunnerResult<JobOutcome> {
    std::fs::create_dir_all(&paths.temp_dir)?;
    std::fs::create_dir_all(&paths.results_dir)?;

    let prepared = paths.prepared();
    let report = prepare_document(
        &paths.template,
        &paths.mesh,
        &prepared,
        config,
        table,
        cancel,
    )?;

    let log_path = paths.log();
    let job_name = paths.name.clone();
    SolverDriver::new(config).run(
        &SolveRequest {
            input: &prepared,
            log_path: &log_path,
            work_dir: &paths.temp_dir,
            total_time: report.total_time,
        },
        cancel,
        &mut |progress| {
            tracing::info!(
                job = job_name.as_str(),
                "solver at t={:.4} ({:.0}%)",
                progress.time,
                progress.fraction * 100.0
            );
        },
    )?;

    let log_text = std::fs::read_to_string(&log_path)?;
    let points = parse_rigid_body_rows(&log_text);
    write_curve_csv(&points, &paths.csv())?;
    if points.is_empty() {
        tracing::warn!(
            job = paths.name.as_str(),
            "no rigid-body rows in solver log; curve is empty"
        );
        return Ok(JobOutcome::NoCurve);
    }
    write_curve_plot(&points, &paths.png())?;
    Ok(JobOutcome::Curve {
        points: points.len(),
    })
}

/// Run one job, translating every outcome into batch bookkeeping: `true`
/// when the job counts as successful. Fatal errors leave a `.err`
/// diagnostic; cancellation cleans up and promotes nothing.
pub fn run_job_to_completion(
    paths: &JobPaths,
    config: &PipelineConfig,
    table: &RuleTable,
    cancel: &CancelToken,
) -> bool {
    match run_job(paths, config, table, cancel) {
        Ok(JobOutcome::Curve { points }) => {
            tracing::info!(job = paths.name.as_str(), points, "job complete");
            true
        }
        Ok(JobOutcome::NoCurve) => {
            tracing::info!(job = paths.name.as_str(), "job complete (empty curve)");
            true
        }
        Err(err) if err.is_cancelled() => {
            discard_tmp(&paths.prepared());
            let _ = std::fs::remove_file(paths.csv());
            let _ = std::fs::remove_file(paths.png());
            tracing::info!(job = paths.name.as_str(), "job cancelled");
            false
        }
        Err(err) => {
            let diagnostic = format!(
                "kind: {}\nmessage: {}\ntime: {}\n",
                err.kind(),
                err,
                chrono::Utc::now().to_rfc3339()
            );
            if let Err(write_err) = std::fs::write(paths.err_file(), diagnostic) {
                tracing::warn!(
                    job = paths.name.as_str(),
                    "could not write error diagnostic: {write_err}"
                );
            }
            tracing::error!(job = paths.name.as_str(), "job failed: {err}");
            false
        }
    }
}
