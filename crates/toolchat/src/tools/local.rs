use indoc::indoc;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::error::ToolResult;
use super::provider::{optional_str, reject_unknown, required_str, tool_fn, ToolMap, ToolProvider};
use crate::models::tool::{Arguments, ToolSpec};
use crate::settings::LocalStorageSettings;

/// Lists and deletes files on the machine the agent runs on
#[derive(Clone)]
pub struct LocalStorageTools {
    default_folder: Arc<PathBuf>,
}

impl LocalStorageTools {
    pub fn new(settings: &LocalStorageSettings) -> Self {
        Self {
            default_folder: Arc::new(settings.folder_path()),
        }
    }

    async fn list_local_files(&self, arguments: Arguments) -> ToolResult<Value> {
        reject_unknown(&arguments, &["local_folder"])?;
        let folder = optional_str(&arguments, "local_folder")?
            .map(|f| PathBuf::from(shellexpand::tilde(&f).as_ref()))
            .unwrap_or_else(|| self.default_folder.as_ref().clone());
        debug!(folder = %folder.display(), "Listing files in local folder");

        let (files, status) = match std::fs::read_dir(&folder) {
            Ok(entries) => {
                let mut files: Vec<String> = entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect();
                files.sort();
                debug!(count = files.len(), "Found files in local folder");
                (files, "success")
            }
            Err(e) => {
                error!(folder = %folder.display(), "Error listing files from local folder: {}", e);
                (Vec::new(), "error")
            }
        };

        Ok(json!({
            "local_folder": folder.display().to_string(),
            "files": files,
            "status": status,
        }))
    }

    async fn delete_local_file(&self, arguments: Arguments) -> ToolResult<Value> {
        reject_unknown(&arguments, &["file_path"])?;
        let file_path = required_str(&arguments, "file_path")?;
        warn!(file = %file_path, "Deleting local file");

        let status = match std::fs::remove_file(&file_path) {
            Ok(()) => "success",
            Err(e) => {
                error!(file = %file_path, "Error deleting file: {}", e);
                "error"
            }
        };

        Ok(json!({ "file_path": file_path, "status": status }))
    }
}

impl ToolProvider for LocalStorageTools {
    fn name(&self) -> &str {
        "local_storage"
    }

    fn get_tools(&self) -> ToolMap {
        let mut tools = ToolMap::new();

        let this = self.clone();
        tools.insert(
            "list_local_files".to_string(),
            tool_fn(move |arguments| {
                let this = this.clone();
                async move { this.list_local_files(arguments).await }
            }),
        );

        let this = self.clone();
        tools.insert(
            "delete_local_file".to_string(),
            tool_fn(move |arguments| {
                let this = this.clone();
                async move { this.delete_local_file(arguments).await }
            }),
        );

        tools
    }

    fn get_tools_description(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec::new(
                "list_local_files",
                indoc! {"
                    List local files on a given folder path. If no path is specified, the default
                    path will be used.
                "},
                json!({
                    "type": "object",
                    "properties": {
                        "local_folder": {
                            "type": "string",
                            "description": "(Optional) The folder path where the files scan will be performed"
                        }
                    }
                }),
            ),
            ToolSpec::new(
                "delete_local_file",
                "Delete a local file given its full path.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "The full file path of the local file to delete"
                        }
                    },
                    "required": ["file_path"]
                }),
            ),
        ]
    }
}
