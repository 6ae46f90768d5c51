use indoc::indoc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

use super::error::ToolResult;
use super::jobs::RemoteJobRunner;
use super::provider::{optional_object, optional_str, reject_unknown, tool_fn, ToolMap, ToolProvider};
use crate::models::tool::{Arguments, ToolSpec};
use crate::settings::DatabricksSettings;

/// Runs an arbitrary notebook on the configured cluster and waits for its output
#[derive(Clone)]
pub struct DatabricksJobTools {
    runner: Arc<RemoteJobRunner>,
    default_notebook_path: Arc<String>,
}

impl DatabricksJobTools {
    pub fn new(runner: Arc<RemoteJobRunner>, settings: &DatabricksSettings) -> Self {
        Self {
            runner,
            default_notebook_path: Arc::new(settings.default_notebook_path.clone()),
        }
    }

    async fn run_databricks_job(&self, arguments: Arguments) -> ToolResult<Value> {
        reject_unknown(&arguments, &["notebook_path", "parameters"])?;
        let notebook_path = optional_str(&arguments, "notebook_path")?
            .unwrap_or_else(|| self.default_notebook_path.as_ref().clone());
        let parameters: Map<String, Value> =
            optional_object(&arguments, "parameters")?.unwrap_or_default();

        info!(notebook = %notebook_path, "Running databricks job");
        Ok(self.runner.run_to_completion(&notebook_path, &parameters).await)
    }
}

impl ToolProvider for DatabricksJobTools {
    fn name(&self) -> &str {
        "databricks"
    }

    fn get_tools(&self) -> ToolMap {
        let mut tools = ToolMap::new();
        let this = self.clone();
        tools.insert(
            "run_databricks_job".to_string(),
            tool_fn(move |arguments| {
                let this = this.clone();
                async move { this.run_databricks_job(arguments).await }
            }),
        );
        tools
    }

    fn get_tools_description(&self) -> Vec<ToolSpec> {
        vec![ToolSpec::new(
            "run_databricks_job",
            indoc! {r#"
                Trigger a job inside databricks and wait for it to finish. Returns the notebook
                output when the job succeeds.
            "#},
            json!({
                "type": "object",
                "properties": {
                    "notebook_path": {
                        "type": "string",
                        "description": "(Optional) The path of the notebook to trigger. If no path is specified, the default path will be used."
                    },
                    "parameters": {
                        "type": "object",
                        "description": "(Optional) A dictionary of parameters to pass to the notebook. Defaults to None.",
                        "additionalProperties": true
                    }
                }
            }),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::jobs::tests::{mount_run_states, settings, RecordingSleeper};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    async fn tools_for(server: &MockServer) -> DatabricksJobTools {
        let settings = settings(&server.uri());
        let runner = RemoteJobRunner::new(&settings, Arc::new(RecordingSleeper::default())).unwrap();
        DatabricksJobTools::new(Arc::new(runner), &settings)
    }

    async fn mount_success(server: &MockServer) {
        mount_run_states(
            server,
            &[json!({ "life_cycle_state": "TERMINATED", "result_state": "SUCCESS" })],
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/api/2.1/jobs/runs/get-output"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "notebook_output": { "result": "done" } })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_blank_arguments_use_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/2.1/jobs/runs/submit"))
            .and(body_partial_json(json!({
                "notebook_task": { "notebook_path": "/Workspace/agent/test", "base_parameters": {} }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "run_id": 1 })))
            .expect(1)
            .mount(&server)
            .await;
        mount_success(&server).await;

        let tools = tools_for(&server).await;
        let result = tools
            .run_databricks_job(args(json!({ "notebook_path": "", "parameters": "{}" })))
            .await
            .unwrap();
        assert_eq!(result, json!({ "status": "success", "output": { "result": "done" } }));
    }

    #[tokio::test]
    async fn test_explicit_notebook_and_parameters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/2.1/jobs/runs/submit"))
            .and(body_partial_json(json!({
                "notebook_task": {
                    "notebook_path": "/Workspace/jobs/clean",
                    "base_parameters": { "table": "answers" }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "run_id": 2 })))
            .expect(1)
            .mount(&server)
            .await;
        mount_success(&server).await;

        let tools = tools_for(&server).await;
        let result = tools
            .run_databricks_job(args(json!({
                "notebook_path": "/Workspace/jobs/clean",
                "parameters": { "table": "answers" }
            })))
            .await
            .unwrap();
        assert_eq!(result["status"], "success");
    }

    #[tokio::test]
    async fn test_tool_is_registered_under_its_name() {
        let server = MockServer::start().await;
        let tools = tools_for(&server).await;
        let names: Vec<String> = tools.get_tools().into_keys().collect();
        assert_eq!(names, vec!["run_databricks_job".to_string()]);
        assert_eq!(tools.get_tools_description()[0].name, "run_databricks_job");
    }
}
