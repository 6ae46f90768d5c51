use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use super::error::{ToolError, ToolResult};
use super::jobs::RemoteJobRunner;
use super::provider::{optional_str, reject_unknown, required_str, tool_fn, ToolMap, ToolProvider};
use crate::models::tool::{Arguments, ToolSpec};
use crate::settings::SurveyNotebooks;

const SUPPORTED_FORMATS: [&str; 2] = ["xlsx", "csv"];

/// Survey pipeline jobs: ingesting raw survey exports and building answer categories
#[derive(Clone)]
pub struct SurveyJobTools {
    runner: Arc<RemoteJobRunner>,
    notebooks: Arc<SurveyNotebooks>,
    mount: Arc<PathBuf>,
}

fn coerce_int(arguments: &Arguments, key: &str) -> ToolResult<i64> {
    let invalid = || ToolError::InvalidParameters(format!("'{}' must be an integer", key));
    match arguments.get(key) {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid()),
        None | Some(Value::Null) => Err(ToolError::InvalidParameters(format!(
            "'{}' parameter required",
            key
        ))),
        Some(_) => Err(invalid()),
    }
}

fn coerce_float(arguments: &Arguments, key: &str) -> ToolResult<f64> {
    let invalid = || ToolError::InvalidParameters(format!("'{}' must be a number", key));
    match arguments.get(key) {
        Some(Value::Number(n)) => n.as_f64().ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid()),
        None | Some(Value::Null) => Err(ToolError::InvalidParameters(format!(
            "'{}' parameter required",
            key
        ))),
        Some(_) => Err(invalid()),
    }
}

impl SurveyJobTools {
    pub fn new(runner: Arc<RemoteJobRunner>, notebooks: SurveyNotebooks, mount: &str) -> Self {
        Self {
            runner,
            notebooks: Arc::new(notebooks),
            mount: Arc::new(PathBuf::from(mount)),
        }
    }

    async fn run_ingestion_job(&self, arguments: Arguments) -> ToolResult<Value> {
        reject_unknown(&arguments, &["path_to_input_file", "format_file", "sheet_name"])?;
        let path_to_input_file = required_str(&arguments, "path_to_input_file")?;
        let format_file =
            optional_str(&arguments, "format_file")?.unwrap_or_else(|| "xlsx".to_string());
        let sheet_name =
            optional_str(&arguments, "sheet_name")?.unwrap_or_else(|| "Export".to_string());

        if !SUPPORTED_FORMATS.contains(&format_file.as_str()) {
            let message = format!(
                "Invalid file format: {}. Supported formats are 'xlsx' and 'csv'.",
                format_file
            );
            error!("{}", message);
            return Ok(json!({ "status": "error", "message": message }));
        }

        // An absolute input path replaces the mount rather than nesting under it
        let file_path = self.mount.join(&path_to_input_file);
        info!(
            file = %file_path.display(),
            format = %format_file,
            sheet = %sheet_name,
            "Running ingestion job"
        );

        let mut parameters = Map::new();
        parameters.insert("file_path".into(), json!(file_path.display().to_string()));
        parameters.insert("file_format".into(), json!(format_file));
        parameters.insert("sheet_name".into(), json!(sheet_name));

        Ok(self
            .runner
            .run_to_completion(&self.notebooks.ingestion, &parameters)
            .await)
    }

    async fn run_creation_of_categories_job(&self, arguments: Arguments) -> ToolResult<Value> {
        reject_unknown(
            &arguments,
            &[
                "number_of_categories",
                "sample_fraction",
                "question_id",
                "survey_id",
                "study_id",
                "language",
            ],
        )?;
        let number_of_categories = coerce_int(&arguments, "number_of_categories")?;
        let sample_fraction = coerce_float(&arguments, "sample_fraction")?;
        let question_id = required_str(&arguments, "question_id")?;
        let study_id = required_str(&arguments, "study_id")?;
        let survey_id = required_str(&arguments, "survey_id")?;
        let language =
            optional_str(&arguments, "language")?.unwrap_or_else(|| "English".to_string());

        info!(
            number_of_categories,
            sample_fraction,
            question = %question_id,
            survey = %survey_id,
            study = %study_id,
            "Running creation of categories job"
        );

        let mut parameters = Map::new();
        parameters.insert("number_of_categories".into(), json!(number_of_categories));
        parameters.insert("sample_fraction".into(), json!(sample_fraction));
        parameters.insert("question_id".into(), json!(question_id));
        parameters.insert("study_id".into(), json!(study_id));
        parameters.insert("survey_id".into(), json!(survey_id));
        parameters.insert("language".into(), json!(language));

        Ok(self
            .runner
            .run_to_completion(&self.notebooks.categories, &parameters)
            .await)
    }
}

impl ToolProvider for SurveyJobTools {
    fn name(&self) -> &str {
        "survey"
    }

    fn get_tools(&self) -> ToolMap {
        let mut tools = ToolMap::new();

        let this = self.clone();
        tools.insert(
            "run_ingestion_job".to_string(),
            tool_fn(move |arguments| {
                let this = this.clone();
                async move { this.run_ingestion_job(arguments).await }
            }),
        );
        let this = self.clone();
        tools.insert(
            "run_creation_of_categories_job".to_string(),
            tool_fn(move |arguments| {
                let this = this.clone();
                async move { this.run_creation_of_categories_job(arguments).await }
            }),
        );

        tools
    }

    fn get_tools_description(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new(
                "run_ingestion_job",
                "Trigger the ingestion job inside databricks, for survey data ingestion. This job will \
                 ingest the survey data from the input file. The job will take the file path, the file \
                 format and the sheet name as input parameters. The file format can be 'xlsx' or 'csv'. \
                 The sheet name is only required if the file format is 'xlsx'. The job will create a table \
                 that will be saved in unity catalog inside databricks.",
                json!({
                    "type": "object",
                    "properties": {
                        "path_to_input_file": {
                            "type": "string",
                            "description": "The file path pointing to the file containing the survey data."
                        },
                        "format_file": {
                            "type": "string",
                            "description": "(Optional) The format of the input file. Defaults to 'xlsx' for excel files."
                        },
                        "sheet_name": {
                            "type": "string",
                            "description": "(Optional) The name of the sheet to read from the input file, if input file format is 'xlsx'. Defaults to 'Export'."
                        }
                    },
                    "required": ["path_to_input_file"]
                }),
            ),
            ToolSpec::new(
                "run_creation_of_categories_job",
                "Trigger the creation of categories job in databricks, for survey open answers from \
                 survey data. This job will create categories for the open answers in the survey data. \
                 The categories will be created using the AI model. The job will take the \
                 number of categories to create, the sample fraction of the open answers to use to create \
                 the categories, the question id, the study id, the survey id and the language on which the \
                 answers are written as input parameters. A study id can contain multiple surveys and the \
                 surveys can contain multiple questions.",
                json!({
                    "type": "object",
                    "properties": {
                        "number_of_categories": {
                            "type": "string",
                            "description": "The number of categories to create for the open answers."
                        },
                        "sample_fraction": {
                            "type": "string",
                            "description": "The sample fraction of the open answers to use to create the categories."
                        },
                        "question_id": {
                            "type": "string",
                            "description": "The question id of the open answers to create the categories for."
                        },
                        "survey_id": {
                            "type": "string",
                            "description": "The survey id containing the open answers to create the categories for."
                        },
                        "study_id": {
                            "type": "string",
                            "description": "The study id containing the survey data."
                        },
                        "language": {
                            "type": "string",
                            "description": "(Optional) The language of the open answers. Defaults to 'English'."
                        }
                    },
                    "required": ["number_of_categories", "sample_fraction", "question_id", "survey_id", "study_id"]
                }),
            ),
        ]
    }
}
