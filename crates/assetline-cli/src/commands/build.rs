//! One-shot build of every category.

use assetline_core::task::FileOutcome;
use assetline_core::{Config, TaskReport};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::Path;

/// `--json` output: one object on stdout.
#[derive(Debug, Serialize)]
pub struct BuildSummary {
    pub ok: bool,
    pub categories: Vec<CategorySummary>,
}

#[derive(Debug, Serialize)]
pub struct CategorySummary {
    pub category: &'static str,
    pub items: usize,
    pub written: usize,
    pub duration_ms: u64,
    pub failures: Vec<FailureSummary>,
}

#[derive(Debug, Serialize)]
pub struct FailureSummary {
    pub file: String,
    pub error: String,
}

impl BuildSummary {
    fn from_reports(reports: &[TaskReport], root: &Path) -> Self {
        let categories: Vec<CategorySummary> = reports
            .iter()
            .map(|report| CategorySummary {
                category: report.category.as_str(),
                items: report.items(),
                written: report.written(),
                duration_ms: report.duration.as_millis() as u64,
                failures: report
                    .files
                    .iter()
                    .filter_map(|file| match &file.outcome {
                        FileOutcome::Failed(e) => Some(FailureSummary {
                            file: file
                                .source
                                .strip_prefix(root)
                                .unwrap_or(&file.source)
                                .display()
                                .to_string(),
                            error: e.to_string(),
                        }),
                        _ => None,
                    })
                    .collect(),
            })
            .collect();

        Self {
            ok: categories.iter().all(|c| c.failures.is_empty()),
            categories,
        }
    }
}

/// Build once. Exits non-zero if any file failed.
pub fn run(config: &Config) -> Result<()> {
    let orchestrator = super::orchestrator(config, None)?;

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let reports = runtime.block_on(orchestrator.build_all());
    let summary = BuildSummary::from_reports(&reports, orchestrator.root());

    if config.json_logs {
        println!("{}", serde_json::to_string(&summary).into_diagnostic()?);
    }

    if !summary.ok {
        std::process::exit(1);
    }
    Ok(())
}
