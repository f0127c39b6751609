use super::planning::status_update;
use super::{Flow, WorkflowEngine};
use crate::core::task::{OutputFormat, TaskRecord};
use crate::core::task_state::TaskStatus;
use crate::db::Patch;
use crate::errors::WorkflowError;
use crate::event::EventKind;
use chrono::Local;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

impl WorkflowEngine {
    /// Composes the final report and writes it to the output directory
    pub(super) async fn report(
        &self,
        record: &mut TaskRecord,
        events: &mut Vec<EventKind>,
    ) -> Result<Flow, WorkflowError> {
        let plan = record.plan.as_ref().ok_or_else(|| {
            WorkflowError::Execution(format!("task {} has no plan to report on", record.id))
        })?;

        let report = self
            .collaborators
            .rapporteur
            .compose(&record.query, plan, &record.results, record.output_format)
            .await?;

        let output_path = match write_report(&self.output_dir, &report, record.output_format).await
        {
            Ok(path) => {
                info!("Report of task {} written to {}", record.id, path.display());
                Some(path.display().to_string())
            }
            Err(e) => {
                warn!("Could not write report of task {}: {}", record.id, e);
                None
            }
        };

        record.final_report = Some(report.clone());
        record.output_path = output_path.clone();
        record.status = TaskStatus::Completed;

        events.push(EventKind::ReportReady {
            report,
            format: record.output_format,
            output_path,
        });
        events.push(status_update(TaskStatus::Completed, "Research completed"));
        Ok(Flow::Advance(Patch::new()))
    }
}

/// Writes `research_report_<timestamp>.<ext>` into `dir`
async fn write_report(
    dir: &Path,
    report: &str,
    format: OutputFormat,
) -> std::io::Result<PathBuf> {
    let stem = format!("research_report_{}", Local::now().format("%Y%m%d_%H%M%S"));
    write_unique(dir, &stem, format.extension(), report).await
}

/// Writes `report` to `<stem>.<ext>`, or to `<stem>_<n>.<ext>` with the
/// first free `n` when reports finished within the same second
async fn write_unique(
    dir: &Path,
    stem: &str,
    extension: &str,
    report: &str,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let mut attempt = 1u32;
    loop {
        let file_name = match attempt {
            1 => format!("{}.{}", stem, extension),
            n => format!("{}_{}.{}", stem, n, extension),
        };
        let path = dir.join(file_name);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                file.write_all(report.as_bytes()).await?;
                file.flush().await?;
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_of_the_same_second_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("outputs");

        let first = write_unique(&out, "research_report_20240101_120000", "md", "first")
            .await
            .unwrap();
        let second = write_unique(&out, "research_report_20240101_120000", "md", "second")
            .await
            .unwrap();

        assert_ne!(first, second);
        assert!(second.ends_with("research_report_20240101_120000_2.md"));
        assert_eq!(tokio::fs::read_to_string(&first).await.unwrap(), "first");
        assert_eq!(tokio::fs::read_to_string(&second).await.unwrap(), "second");
    }
}
