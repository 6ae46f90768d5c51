//! Tool providers and the registry that dispatches model tool calls to them.

mod error;
mod provider;
mod registry;

pub mod blob;
pub mod databricks;
pub mod jobs;
pub mod local;
pub mod survey;

pub use error::{ToolError, ToolResult};
pub use provider::{
    optional_object, optional_str, reject_unknown, required_str, tool_fn, ToolFuture,
    ToolHandler, ToolMap, ToolProvider,
};
pub use registry::ToolRegistry;

use std::sync::Arc;

use crate::errors::AgentResult;
use crate::settings::Settings;
use blob::BlobStorageTools;
use databricks::DatabricksJobTools;
use jobs::{RemoteJobRunner, TokioSleeper};
use local::LocalStorageTools;
use survey::SurveyJobTools;

/// The built-in providers whose settings are present: blob storage, local storage, databricks
/// jobs, then the survey jobs
pub fn default_providers(settings: &Settings) -> AgentResult<Vec<Arc<dyn ToolProvider>>> {
    let mut providers: Vec<Arc<dyn ToolProvider>> = Vec::new();

    if let Some(blob) = &settings.azure_blob {
        providers.push(Arc::new(BlobStorageTools::azure(blob, &settings.local_storage)?));
    }

    providers.push(Arc::new(LocalStorageTools::new(&settings.local_storage)));

    if let Some(databricks) = &settings.databricks {
        let runner = Arc::new(RemoteJobRunner::new(databricks, Arc::new(TokioSleeper))?);
        providers.push(Arc::new(DatabricksJobTools::new(runner.clone(), databricks)));

        if let Some(notebooks) = &databricks.survey_notebooks {
            providers.push(Arc::new(SurveyJobTools::new(
                runner,
                notebooks.clone(),
                &databricks.survey_mount,
            )));
        }
    }

    Ok(providers)
}
