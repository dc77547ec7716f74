use crate::core::models::status::JobStatus;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("CSV writing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
struct StatusRecord<'a> {
    index: usize,
    name: &'a str,
    package: &'a str,
    work_dir: String,
    state: &'static str,
    retries: usize,
    error: bool,
    run_time_secs: f64,
}

impl<'a> From<&'a JobStatus> for StatusRecord<'a> {
    fn from(status: &'a JobStatus) -> Self {
        Self {
            index: status.index,
            name: &status.name,
            package: &status.package,
            work_dir: status.work_dir.display().to_string(),
            state: status.state.as_str(),
            retries: status.retries,
            error: status.is_error,
            run_time_secs: status.run_time.as_secs_f64(),
        }
    }
}

/// Writes one CSV row per job, preceded by a header row.
pub fn write_status_report<W: Write>(
    statuses: &[JobStatus],
    writer: W,
    label: &str,
) -> Result<(), ReportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for status in statuses {
        csv_writer
            .serialize(StatusRecord::from(status))
            .map_err(|e| ReportError::Csv {
                path: label.to_string(),
                source: e,
            })?;
    }
    csv_writer.flush().map_err(|e| ReportError::Io {
        path: label.to_string(),
        source: e,
    })
}

pub fn write_status_report_to_path(statuses: &[JobStatus], path: &Path) -> Result<(), ReportError> {
    let label = path.to_string_lossy().to_string();
    let file = std::fs::File::create(path).map_err(|e| ReportError::Io {
        path: label.clone(),
        source: e,
    })?;
    write_status_report(statuses, file, &label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::status::JobState;
    use std::path::PathBuf;
    use std::time::Duration;

    fn status(index: usize, name: &str, state: JobState, error: bool) -> JobStatus {
        JobStatus {
            index,
            name: name.to_string(),
            package: "SOMD".to_string(),
            work_dir: PathBuf::from("/work").join(name),
            state,
            retries: if error { 5 } else { 0 },
            is_running: false,
            is_error: error,
            run_time: Duration::from_millis(1500),
        }
    }

    #[test]
    fn report_has_header_and_one_row_per_job() {
        let statuses = vec![
            status(0, "lam0", JobState::Finished, false),
            status(1, "lam1", JobState::Finished, true),
        ];
        let mut buffer = Vec::new();

        write_status_report(&statuses, &mut buffer, "buffer").unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            "index,name,package,work_dir,state,retries,error,run_time_secs"
        );
        assert_eq!(lines[1], "0,lam0,SOMD,/work/lam0,finished,0,false,1.5");
        assert_eq!(lines[2], "1,lam1,SOMD,/work/lam1,finished,5,true,1.5");
    }

    #[test]
    fn report_can_be_written_to_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");

        write_status_report_to_path(&[status(0, "a", JobState::Queued, false)], &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("0,a,SOMD,/work/a,queued,0,false,1.5"));
    }

    #[test]
    fn unwritable_path_is_an_io_error() {
        let result = write_status_report_to_path(&[], Path::new("/nonexistent/dir/report.csv"));
        assert!(matches!(result, Err(ReportError::Io { .. })));
    }
}
