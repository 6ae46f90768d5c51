//! Remote notebook jobs on a Databricks workspace.
//!
//! [`RemoteJobRunner`] is shared by the tool providers that launch jobs. It submits a one-off
//! notebook run, then polls the run until it reaches a terminal [`JobState`]. Waiting between
//! polls goes through a [`Sleeper`] so the loop can be driven without real delays.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::errors::{AgentError, AgentResult};
use crate::settings::DatabricksSettings;

const RUN_NAME: &str = "AI Agent | Triggered via API";

/// Waits between status polls
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Where a submitted run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Pending | JobState::Running)
    }
}

/// The `state` object of a `runs/get` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunState {
    #[serde(default)]
    pub life_cycle_state: String,
    #[serde(default)]
    pub result_state: Option<String>,
    #[serde(default)]
    pub state_message: String,
}

impl RunState {
    pub fn job_state(&self) -> JobState {
        match self.life_cycle_state.as_str() {
            "PENDING" | "QUEUED" | "BLOCKED" => JobState::Pending,
            "RUNNING" | "TERMINATING" => JobState::Running,
            _ => match self.result_state.as_deref() {
                Some("SUCCESS") => JobState::Success,
                Some("CANCELED") => JobState::Canceled,
                _ => JobState::Failed,
            },
        }
    }
}

fn error_status(message: impl std::fmt::Display) -> Value {
    json!({ "status": "error", "message": message.to_string() })
}

/// Submits notebook runs to a Databricks workspace and follows them to completion
pub struct RemoteJobRunner {
    client: Client,
    workspace_url: String,
    token: String,
    cluster_id: String,
    poll_interval: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl RemoteJobRunner {
    pub fn new(settings: &DatabricksSettings, sleeper: Arc<dyn Sleeper>) -> AgentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(200))
            .build()
            .map_err(|e| AgentError::Configuration(format!("http client: {}", e)))?;

        info!(workspace = %settings.workspace_url, "Initializing remote job runner");
        Ok(Self {
            client,
            workspace_url: settings.workspace_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            cluster_id: settings.cluster_id.clone(),
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            sleeper,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/2.1/jobs/{}", self.workspace_url, endpoint)
    }

    async fn get_json(&self, endpoint: &str, run_id: i64) -> Result<Value> {
        let response = self
            .client
            .get(self.url(endpoint))
            .bearer_auth(&self.token)
            .query(&[("run_id", run_id)])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Submit a one-off run of `notebook_path` on the configured cluster.
    ///
    /// Notebook widgets only take text, so non-string parameter values are sent in their
    /// JSON text form.
    pub async fn trigger_notebook(&self, notebook_path: &str, parameters: &Map<String, Value>) -> Value {
        let base_parameters: Map<String, Value> = parameters
            .iter()
            .map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), Value::String(text))
            })
            .collect();
        let payload = json!({
            "run_name": RUN_NAME,
            "existing_cluster_id": self.cluster_id,
            "notebook_task": {
                "notebook_path": notebook_path,
                "base_parameters": base_parameters,
            }
        });

        info!(notebook = %notebook_path, "Triggering notebook");
        let result: Result<Value> = async {
            let response = self
                .client
                .post(self.url("runs/submit"))
                .bearer_auth(&self.token)
                .json(&payload)
                .send()
                .await?
                .error_for_status()?;
            Ok(response.json().await?)
        }
        .await;

        match result {
            Ok(body) => match body.get("run_id").and_then(Value::as_i64) {
                Some(run_id) => {
                    info!(run_id, "Notebook triggered successfully");
                    json!({ "status": "success", "run_id": run_id })
                }
                None => {
                    error!("Submit response carried no run id: {}", body);
                    error_status("submit response carried no run_id")
                }
            },
            Err(e) => {
                error!("Failed to trigger notebook: {:#}", e);
                error_status(format!("{:#}", e))
            }
        }
    }

    pub async fn check_run_status(&self, run_id: i64) -> Value {
        debug!(run_id, "Checking run status");
        match self.get_json("runs/get", run_id).await {
            Ok(body) => {
                let state = body.get("state").cloned().unwrap_or_else(|| json!({}));
                debug!(run_id, state = %state, "Run status");
                json!({ "status": "success", "state": state })
            }
            Err(e) => {
                error!(run_id, "Failed to check run status: {:#}", e);
                error_status(format!("{:#}", e))
            }
        }
    }

    pub async fn check_run_output(&self, run_id: i64) -> Value {
        info!(run_id, "Retrieving run output");
        match self.get_json("runs/get-output", run_id).await {
            Ok(body) => {
                let output = body
                    .get("notebook_output")
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                json!({ "status": "success", "output": output })
            }
            Err(e) => {
                error!(run_id, "Failed to retrieve run output: {:#}", e);
                error_status(format!("{:#}", e))
            }
        }
    }

    /// Trigger a notebook and poll it until it stops, returning the notebook output on success
    /// or an error status describing why it did not succeed.
    pub async fn run_to_completion(&self, notebook_path: &str, parameters: &Map<String, Value>) -> Value {
        let submitted = self.trigger_notebook(notebook_path, parameters).await;
        let Some(run_id) = submitted.get("run_id").and_then(Value::as_i64) else {
            return submitted;
        };

        let mut job_state = JobState::Running;
        let mut run_state = RunState::default();
        while !job_state.is_terminal() {
            info!(
                run_id,
                "Job still in process, sleeping for {} seconds",
                self.poll_interval.as_secs()
            );
            self.sleeper.sleep(self.poll_interval).await;

            let status = self.check_run_status(run_id).await;
            if status["status"] != "success" {
                return status;
            }
            run_state = match serde_json::from_value(status["state"].clone()) {
                Ok(state) => state,
                Err(e) => return error_status(format!("unreadable run state: {}", e)),
            };
            job_state = run_state.job_state();
            info!(run_id, state = ?job_state, life_cycle = %run_state.life_cycle_state, "Run state");
        }

        match job_state {
            JobState::Success => {
                info!(run_id, "The job completed successfully, checking its return");
                self.check_run_output(run_id).await
            }
            _ => {
                error!(run_id, state = ?job_state, "Job failed with error: {}", run_state.state_message);
                error_status(&run_state.state_message)
            }
        }
    }
}
