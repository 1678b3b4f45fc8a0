//! Runs a transform task off the reactor, logs its outcome and signals reload.

use crate::reload::{ReloadEvent, ReloadHub};
use assetline_core::task::{FileOutcome, SkipReason};
use assetline_core::{TaskReport, TransformTask};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Run one task to completion.
///
/// File failures are logged and kept in the report. A completed run of a
/// category that reloads always sends its reload event, even when some
/// files failed.
pub async fn run_category(
    task: Arc<TransformTask>,
    hub: &ReloadHub,
) -> Result<TaskReport, tokio::task::JoinError> {
    let category = task.category();
    debug!(category = %category, "Running task");

    let root = task.paths().root().to_path_buf();
    let report = tokio::task::spawn_blocking(move || task.run()).await?;

    log_report(&report, &root);

    if let Some(kind) = category.reload_kind() {
        let event = ReloadEvent::from(kind);
        let receivers = hub.send(event);
        debug!(category = %category, ?event, receivers, "Reload signalled");
    }

    Ok(report)
}

fn log_report(report: &TaskReport, root: &Path) {
    let category = report.category;
    let rel_display = |path: &Path| {
        path.strip_prefix(root)
            .unwrap_or(path)
            .display()
            .to_string()
    };

    for file in &report.files {
        let source = rel_display(&file.source);
        match &file.outcome {
            FileOutcome::Written(outputs) => {
                for output in outputs {
                    info!(category = %category, file = %rel_display(output), "{} {}", category.title(), rel_display(output));
                }
            }
            FileOutcome::Unchanged(outputs) => {
                for output in outputs {
                    debug!(category = %category, file = %rel_display(output), "Unchanged");
                }
            }
            FileOutcome::Skipped(SkipReason::Partial) => {
                debug!(category = %category, file = %source, "Skipped partial");
            }
            FileOutcome::Skipped(SkipReason::UpToDate) => {
                debug!(category = %category, file = %source, "Up to date");
            }
            FileOutcome::Failed(err) => {
                error!(category = %category, file = %source, error = %err, "Transform failed");
            }
        }
    }

    let items = report.items();
    let duration_ms = report.duration.as_millis() as u64;
    if report.has_failures() {
        let failed = report.failures().count();
        warn!(
            category = %category,
            items,
            failed,
            duration_ms,
            "{}: {} items, {} failed",
            category.title(),
            items,
            failed
        );
    } else {
        info!(
            category = %category,
            items,
            duration_ms,
            "{}: {} items",
            category.title(),
            items
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetline_core::registry::{Category, Registry};
    use assetline_core::task::TaskOptions;
    use tempfile::tempdir;

    fn task(root: &Path, category: Category) -> Arc<TransformTask> {
        let compiled = Registry::default().compile(root).unwrap();
        Arc::new(TransformTask::new(
            compiled.get(category).clone(),
            TaskOptions::default(),
        ))
    }

    #[tokio::test]
    async fn test_styles_run_sends_style_reload() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/styles")).unwrap();
        std::fs::write(dir.path().join("src/styles/a.css"), "a { color: red }").unwrap();

        let hub = ReloadHub::default();
        let mut rx = hub.subscribe();
        let report = run_category(task(dir.path(), Category::Styles), &hub)
            .await
            .unwrap();

        assert_eq!(report.items(), 2);
        assert_eq!(rx.recv().await.unwrap(), ReloadEvent::Styles);
    }

    #[tokio::test]
    async fn test_fonts_run_sends_nothing() {
        let dir = tempdir().unwrap();
        let hub = ReloadHub::default();

        let report = run_category(task(dir.path(), Category::Fonts), &hub)
            .await
            .unwrap();

        assert!(report.files.is_empty());
        assert_eq!(hub.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_run_still_reloads() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/js")).unwrap();
        std::fs::write(dir.path().join("src/js/bad.js"), "let = ;").unwrap();

        let hub = ReloadHub::default();
        let report = run_category(task(dir.path(), Category::Scripts), &hub)
            .await
            .unwrap();

        assert!(report.has_failures());
        assert_eq!(hub.sent_count(), 1);
    }
}
