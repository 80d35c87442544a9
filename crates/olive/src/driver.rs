use std::fs;
use std::path::{Path, PathBuf};

use olive_ast::Program;
use olive_check::dashboard::OliveSummary;
use olive_check::{Catalogue, CatalogueError, CheckConfig, compile};
use olive_diag::{Diagnostic, Severity};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "OLIVE_LOG";

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to read `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse `{path}`: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Catalogue(#[from] CatalogueError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOptions {
    pub program: PathBuf,
    pub catalogue: PathBuf,
    pub config: Option<PathBuf>,
}

#[derive(Debug)]
pub struct CheckResult {
    pub compiled: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub summaries: Vec<OliveSummary>,
}

impl CheckResult {
    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }
}

/// Send `tracing` output to stderr, filtered by `OLIVE_LOG` (default `warn`).
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read(path: &Path) -> Result<String, DriverError> {
    fs::read_to_string(path).map_err(|source| DriverError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse<T: serde::de::DeserializeOwned>(path: &Path, text: &str) -> Result<T, DriverError> {
    serde_json::from_str(text).map_err(|source| DriverError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Load a program, its catalogue and optional configuration from disk and
/// check them.
pub fn check_file(options: &CheckOptions) -> Result<CheckResult, DriverError> {
    let program: Program = parse(&options.program, &read(&options.program)?)?;
    let catalogue = Catalogue::load(&options.catalogue)?;
    let config = match &options.config {
        Some(path) => parse(path, &read(path)?)?,
        None => CheckConfig::default(),
    };
    debug!(
        program = %options.program.display(),
        olives = program.olives.len(),
        "loaded program"
    );
    Ok(check_program(&program, &catalogue, &config))
}

pub fn check_program(program: &Program, catalogue: &Catalogue, config: &CheckConfig) -> CheckResult {
    let mut diagnostics = Vec::new();
    let compilation = compile(program, catalogue, config, &mut diagnostics);
    info!(
        compiled = compilation.compiled,
        diagnostics = diagnostics.len(),
        "check finished"
    );
    CheckResult {
        compiled: compilation.compiled,
        diagnostics,
        summaries: compilation.summaries,
    }
}

pub fn emit_diagnostics(diags: &[Diagnostic]) {
    for diag in diags {
        eprintln!("{}", diag.render());
    }
}

pub fn summary_json(summaries: &[OliveSummary]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summaries)
}
