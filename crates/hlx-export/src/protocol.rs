//! Newline-delimited JSON command protocol.
//!
//! Each input line is one [`Command`]; each gets exactly one [`Response`]
//! line back.

use serde::{Deserialize, Serialize};

use hlx_models::{ExportJob, ExportRequest, JobId, ProjectId};

use crate::controller::JobController;
use crate::error::ExportError;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    StartExport(ExportRequest),
    CancelExport { job_id: JobId },
    GetExportProgress { job_id: JobId },
    ListExportJobs { project_id: ProjectId },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Started { job_id: JobId },
    CancelRequested { job_id: JobId },
    Job { job: Box<ExportJob> },
    Jobs { jobs: Vec<ExportJob> },
    Error { code: String, message: String },
}

impl Response {
    fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<ExportError> for Response {
    fn from(e: ExportError) -> Self {
        Response::error(e.code(), e.to_string())
    }
}

/// Parse one command line.
pub fn parse_command(line: &str) -> Result<Command, serde_json::Error> {
    serde_json::from_str(line)
}

/// Execute a command against the controller.
pub async fn dispatch(controller: &JobController, command: Command) -> Response {
    let result = match command {
        Command::StartExport(request) => controller
            .start_export(request)
            .await
            .map(|job_id| Response::Started { job_id }),
        Command::CancelExport { job_id } => controller
            .cancel_export(&job_id)
            .await
            .map(|()| Response::CancelRequested { job_id }),
        Command::GetExportProgress { job_id } => controller
            .get_export_progress(&job_id)
            .await
            .map(|job| Response::Job { job: Box::new(job) }),
        Command::ListExportJobs { project_id } => controller
            .list_export_jobs(&project_id)
            .await
            .map(|jobs| Response::Jobs { jobs }),
    };

    result.unwrap_or_else(Response::from)
}

/// Parse and execute one input line.
pub async fn handle_line(controller: &JobController, line: &str) -> Response {
    match parse_command(line) {
        Ok(command) => dispatch(controller, command).await,
        Err(e) => Response::error("bad_request", e.to_string()),
    }
}
