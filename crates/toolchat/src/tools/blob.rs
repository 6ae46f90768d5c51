use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::error::{ToolError, ToolResult};
use super::provider::{optional_str, reject_unknown, required_str, tool_fn, ToolMap, ToolProvider};
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Arguments, ToolSpec};
use crate::settings::{AzureBlobSettings, LocalStorageSettings};

const DEFAULT_TARGET_FOLDER: &str = "drop_zone";
const STORAGE_API_VERSION: &str = "2021-08-06";

/// Remote object storage the blob tools operate on
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn list_blobs(&self, container: &str) -> Result<Vec<String>>;
    async fn download_blob(&self, container: &str, blob: &str) -> Result<Vec<u8>>;
    async fn upload_blob(&self, container: &str, blob: &str, data: Vec<u8>) -> Result<()>;
    async fn delete_blob(&self, container: &str, blob: &str) -> Result<()>;
}

/// Azure Blob Storage over its REST api, authorized by a shared access signature
pub struct AzureBlobStore {
    client: Client,
    endpoint: Url,
    sas: String,
}

impl AzureBlobStore {
    /// Build from a connection string such as
    /// `BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=sv=...`
    pub fn from_connection_string(connection_string: &str) -> AgentResult<Self> {
        let mut blob_endpoint = None;
        let mut account_name = None;
        let mut endpoint_suffix = None;
        let mut sas = None;

        for part in connection_string.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                AgentError::Configuration(format!("malformed connection string segment '{}'", part))
            })?;
            match key.trim() {
                "BlobEndpoint" => blob_endpoint = Some(value.trim().to_string()),
                "AccountName" => account_name = Some(value.trim().to_string()),
                "EndpointSuffix" => endpoint_suffix = Some(value.trim().to_string()),
                "SharedAccessSignature" => {
                    sas = Some(value.trim().trim_start_matches('?').to_string())
                }
                _ => {}
            }
        }

        let endpoint = match (blob_endpoint, account_name) {
            (Some(endpoint), _) => endpoint,
            (None, Some(account)) => format!(
                "https://{}.blob.{}",
                account,
                endpoint_suffix.as_deref().unwrap_or("core.windows.net")
            ),
            (None, None) => {
                return Err(AgentError::Configuration(
                    "connection string needs BlobEndpoint or AccountName".to_string(),
                ))
            }
        };
        let sas = sas.ok_or_else(|| {
            AgentError::Configuration(
                "connection string needs a SharedAccessSignature".to_string(),
            )
        })?;

        let endpoint = Url::parse(&format!("{}/", endpoint.trim_end_matches('/')))
            .map_err(|e| AgentError::Configuration(format!("invalid blob endpoint: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(200))
            .build()
            .map_err(|e| AgentError::Configuration(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            sas,
        })
    }

    fn container_url(&self, container: &str) -> String {
        format!("{}{}", self.endpoint, urlencoding::encode(container))
    }

    fn blob_url(&self, container: &str, blob: &str) -> String {
        let path: Vec<String> = blob
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!(
            "{}/{}?{}",
            self.container_url(container),
            path.join("/"),
            self.sas
        )
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn list_blobs(&self, container: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = format!(
                "{}?restype=container&comp=list&{}",
                self.container_url(container),
                self.sas
            );
            if let Some(marker) = &marker {
                url.push_str(&format!("&marker={}", urlencoding::encode(marker)));
            }

            let body = self
                .client
                .get(&url)
                .header("x-ms-version", STORAGE_API_VERSION)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;

            let page = BlobListPage::parse(&body)?;
            marker = page.next_marker();
            names.extend(page.names());
            if marker.is_none() {
                break;
            }
        }
        Ok(names)
    }

    async fn download_blob(&self, container: &str, blob: &str) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .get(self.blob_url(container, blob))
            .header("x-ms-version", STORAGE_API_VERSION)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn upload_blob(&self, container: &str, blob: &str, data: Vec<u8>) -> Result<()> {
        self.client
            .put(self.blob_url(container, blob))
            .header("x-ms-version", STORAGE_API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .body(data)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> Result<()> {
        self.client
            .delete(self.blob_url(container, blob))
            .header("x-ms-version", STORAGE_API_VERSION)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// One page of a List Blobs response
#[derive(Debug, Default, Deserialize)]
struct BlobListPage {
    #[serde(rename = "Blobs", default)]
    blobs: BlobList,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
struct BlobItem {
    #[serde(rename = "Name")]
    name: String,
}

impl BlobListPage {
    fn parse(body: &str) -> Result<Self> {
        quick_xml::de::from_str(body).context("malformed blob listing")
    }

    fn names(self) -> impl Iterator<Item = String> {
        self.blobs.items.into_iter().map(|item| item.name)
    }

    fn next_marker(&self) -> Option<String> {
        self.next_marker.clone().filter(|m| !m.is_empty())
    }
}

fn base_name(path: &str) -> Result<String> {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("'{}' has no file name", path))
}

/// List, download, upload and delete blobs in a storage container
#[derive(Clone)]
pub struct BlobStorageTools {
    store: Arc<dyn BlobStore>,
    default_container: Arc<String>,
    local_folder: Arc<PathBuf>,
}

impl BlobStorageTools {
    pub fn new(
        store: Arc<dyn BlobStore>,
        settings: &AzureBlobSettings,
        local: &LocalStorageSettings,
    ) -> Self {
        Self {
            store,
            default_container: Arc::new(settings.default_container.clone()),
            local_folder: Arc::new(local.folder_path()),
        }
    }

    /// Connect to Azure with the configured connection string
    pub fn azure(settings: &AzureBlobSettings, local: &LocalStorageSettings) -> AgentResult<Self> {
        let store = AzureBlobStore::from_connection_string(&settings.connection_string)?;
        Ok(Self::new(Arc::new(store), settings, local))
    }

    fn container(&self, arguments: &Arguments) -> ToolResult<String> {
        Ok(optional_str(arguments, "container_name")?
            .unwrap_or_else(|| self.default_container.as_ref().clone()))
    }

    async fn list_blob_files(&self, arguments: Arguments) -> ToolResult<Value> {
        reject_unknown(&arguments, &["container_name"])?;
        let container = self.container(&arguments)?;
        debug!(container = %container, "Listing blobs in container");

        let (files, status) = match self.store.list_blobs(&container).await {
            Ok(files) => {
                debug!(count = files.len(), "Found files in container");
                (files, "success")
            }
            Err(e) => {
                error!(container = %container, "Error listing blobs from container: {:#}", e);
                (Vec::new(), "error")
            }
        };

        Ok(json!({ "container_name": container, "files": files, "status": status }))
    }

    async fn download_blob(&self, arguments: Arguments) -> ToolResult<Value> {
        reject_unknown(&arguments, &["blob_name", "container_name"])?;
        let blob = required_str(&arguments, "blob_name")?;
        let container = self.container(&arguments)?;
        let output_file = self
            .local_folder
            .join(base_name(&blob).map_err(|e| ToolError::InvalidParameters(e.to_string()))?);
        info!(blob = %blob, container = %container, output = %output_file.display(), "Downloading blob");

        let status = match self.store.download_blob(&container, &blob).await {
            Ok(data) => {
                std::fs::write(&output_file, data).map_err(|e| {
                    ToolError::ExecutionError(format!(
                        "could not write '{}': {}",
                        output_file.display(),
                        e
                    ))
                })?;
                "success"
            }
            Err(e) => {
                error!(blob = %blob, "Error while downloading the blob: {:#}", e);
                "error"
            }
        };

        Ok(json!({
            "container_name": container,
            "output_file": output_file.display().to_string(),
            "status": status,
        }))
    }

    async fn upload_blob(&self, arguments: Arguments) -> ToolResult<Value> {
        reject_unknown(&arguments, &["local_file_path", "target_folder", "container_name"])?;
        let local_file_path = required_str(&arguments, "local_file_path")?;
        let target_folder = optional_str(&arguments, "target_folder")?
            .unwrap_or_else(|| DEFAULT_TARGET_FOLDER.to_string());
        let container = self.container(&arguments)?;
        let output_blob = format!(
            "{}/{}",
            target_folder.trim_end_matches('/'),
            base_name(&local_file_path).map_err(|e| ToolError::InvalidParameters(e.to_string()))?
        );

        let data = std::fs::read(&local_file_path)
            .with_context(|| format!("could not read '{}'", local_file_path))
            .map_err(|e| ToolError::ExecutionError(format!("{:#}", e)))?;
        info!(file = %local_file_path, blob = %output_blob, container = %container, "Uploading blob");

        let status = match self.store.upload_blob(&container, &output_blob, data).await {
            Ok(()) => "success",
            Err(e) => {
                error!(blob = %output_blob, "Error while uploading the blob: {:#}", e);
                "error"
            }
        };

        Ok(json!({ "container_name": container, "output_blob": output_blob, "status": status }))
    }

    async fn delete_blob(&self, arguments: Arguments) -> ToolResult<Value> {
        reject_unknown(&arguments, &["blob_name", "container_name"])?;
        let blob = required_str(&arguments, "blob_name")?;
        let container = self.container(&arguments)?;
        warn!(blob = %blob, container = %container, "Deleting blob");

        let status = match self.store.delete_blob(&container, &blob).await {
            Ok(()) => "success",
            Err(e) => {
                error!(blob = %blob, "Error while deleting the blob: {:#}", e);
                "error"
            }
        };

        Ok(json!({ "container_name": container, "blob": blob, "status": status }))
    }
}

impl ToolProvider for BlobStorageTools {
    fn name(&self) -> &str {
        "blob_storage"
    }

    fn get_tools(&self) -> ToolMap {
        let mut tools = ToolMap::new();

        let this = self.clone();
        tools.insert(
            "list_blob_files".to_string(),
            tool_fn(move |arguments| {
                let this = this.clone();
                async move { this.list_blob_files(arguments).await }
            }),
        );
        let this = self.clone();
        tools.insert(
            "download_blob".to_string(),
            tool_fn(move |arguments| {
                let this = this.clone();
                async move { this.download_blob(arguments).await }
            }),
        );
        let this = self.clone();
        tools.insert(
            "upload_blob".to_string(),
            tool_fn(move |arguments| {
                let this = this.clone();
                async move { this.upload_blob(arguments).await }
            }),
        );
        let this = self.clone();
        tools.insert(
            "delete_blob".to_string(),
            tool_fn(move |arguments| {
                let this = this.clone();
                async move { this.delete_blob(arguments).await }
            }),
        );

        tools
    }

    fn get_tools_description(&self) -> Vec<ToolSpec> {
        let container = json!({
            "type": "string",
            "description": "(Optional) The name of the Azure Blob Storage container."
        });

        vec![
            ToolSpec::new(
                "list_blob_files",
                "List all files in a specified Azure Blob Storage container. If no container is specified, the default container will be used.",
                json!({
                    "type": "object",
                    "properties": { "container_name": container }
                }),
            ),
            ToolSpec::new(
                "download_blob",
                "Download a blob file from Azure Blob Storage. If no container is specified, the default container will be used.",
                json!({
                    "type": "object",
                    "properties": {
                        "blob_name": {
                            "type": "string",
                            "description": "The name of the blob file to download."
                        },
                        "container_name": container
                    },
                    "required": ["blob_name"]
                }),
            ),
            ToolSpec::new(
                "upload_blob",
                "Upload a file to an Azure Blob Storage. If no container is specified, the default container will be used.",
                json!({
                    "type": "object",
                    "properties": {
                        "local_file_path": {
                            "type": "string",
                            "description": "Local file path of file to upload to the Azure Blob Storage container"
                        },
                        "target_folder": {
                            "type": "string",
                            "description": "(Optional) Folder inside the container to upload into. Defaults to 'drop_zone'."
                        },
                        "container_name": container
                    },
                    "required": ["local_file_path"]
                }),
            ),
            ToolSpec::new(
                "delete_blob",
                "Delete a blob file from Azure Blob Storage. If no container is specified, the default container will be used.",
                json!({
                    "type": "object",
                    "properties": {
                        "blob_name": {
                            "type": "string",
                            "description": "The name of the blob file to delete."
                        },
                        "container_name": container
                    },
                    "required": ["blob_name"]
                }),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct MemoryBlobStore {
        blobs: Mutex<HashMap<(String, String), Vec<u8>>>,
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn list_blobs(&self, container: &str) -> Result<Vec<String>> {
            if container == "forbidden" {
                return Err(anyhow!("403 Forbidden"));
            }
            let mut names: Vec<String> = self
                .blobs
                .lock()
                .unwrap()
                .keys()
                .filter(|(c, _)| c == container)
                .map(|(_, b)| b.clone())
                .collect();
            names.sort();
            Ok(names)
        }

        async fn download_blob(&self, container: &str, blob: &str) -> Result<Vec<u8>> {
            self.blobs
                .lock()
                .unwrap()
                .get(&(container.to_string(), blob.to_string()))
                .cloned()
                .ok_or_else(|| anyhow!("404 BlobNotFound"))
        }

        async fn upload_blob(&self, container: &str, blob: &str, data: Vec<u8>) -> Result<()> {
            self.blobs
                .lock()
                .unwrap()
                .insert((container.to_string(), blob.to_string()), data);
            Ok(())
        }

        async fn delete_blob(&self, container: &str, blob: &str) -> Result<()> {
            self.blobs
                .lock()
                .unwrap()
                .remove(&(container.to_string(), blob.to_string()))
                .map(|_| ())
                .ok_or_else(|| anyhow!("404 BlobNotFound"))
        }
    }

    fn tools(folder: &Path, store: Arc<MemoryBlobStore>) -> BlobStorageTools {
        BlobStorageTools::new(
            store,
            &AzureBlobSettings {
                connection_string: String::new(),
                default_container: "surveys".to_string(),
            },
            &LocalStorageSettings {
                folder: folder.display().to_string(),
            },
        )
    }

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_upload_then_list_and_download() {
        let dir = tempdir().unwrap();
        let local = dir.path().join("answers.csv");
        std::fs::write(&local, "q1,yes").unwrap();
        let store = Arc::new(MemoryBlobStore::default());
        let tools = tools(dir.path(), store);

        let uploaded = tools
            .upload_blob(args(json!({"local_file_path": local.display().to_string()})))
            .await
            .unwrap();
        assert_eq!(uploaded["status"], "success");
        assert_eq!(uploaded["output_blob"], "drop_zone/answers.csv");
        assert_eq!(uploaded["container_name"], "surveys");

        let listed = tools.list_blob_files(Arguments::new()).await.unwrap();
        assert_eq!(listed["files"], json!(["drop_zone/answers.csv"]));

        std::fs::remove_file(&local).unwrap();
        let downloaded = tools
            .download_blob(args(json!({"blob_name": "drop_zone/answers.csv"})))
            .await
            .unwrap();
        assert_eq!(downloaded["status"], "success");
        assert_eq!(std::fs::read_to_string(&local).unwrap(), "q1,yes");
    }

    #[tokio::test]
    async fn test_list_failure_reports_error_status() {
        let dir = tempdir().unwrap();
        let tools = tools(dir.path(), Arc::new(MemoryBlobStore::default()));
        let listed = tools
            .list_blob_files(args(json!({"container_name": "forbidden"})))
            .await
            .unwrap();
        assert_eq!(listed, json!({"container_name": "forbidden", "files": [], "status": "error"}));
    }

    #[tokio::test]
    async fn test_download_missing_blob_reports_error_status() {
        let dir = tempdir().unwrap();
        let tools = tools(dir.path(), Arc::new(MemoryBlobStore::default()));
        let result = tools
            .download_blob(args(json!({"blob_name": "nope.csv", "container_name": ""})))
            .await
            .unwrap();
        assert_eq!(result["status"], "error");
        assert_eq!(result["container_name"], "surveys");
    }

    #[tokio::test]
    async fn test_upload_missing_local_file_fails() {
        let dir = tempdir().unwrap();
        let tools = tools(dir.path(), Arc::new(MemoryBlobStore::default()));
        let err = tools
            .upload_blob(args(json!({"local_file_path": "/does/not/exist.csv"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionError(_)));
    }

    #[tokio::test]
    async fn test_delete_blob() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryBlobStore::default());
        store
            .upload_blob("surveys", "old.csv", b"x".to_vec())
            .await
            .unwrap();
        let tools = tools(dir.path(), store);

        let deleted = tools
            .delete_blob(args(json!({"blob_name": "old.csv"})))
            .await
            .unwrap();
        assert_eq!(deleted, json!({"container_name": "surveys", "blob": "old.csv", "status": "success"}));

        let again = tools
            .delete_blob(args(json!({"blob_name": "old.csv"})))
            .await
            .unwrap();
        assert_eq!(again["status"], "error");
    }

    #[test]
    fn test_connection_string_requires_sas() {
        let result = AzureBlobStore::from_connection_string(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=abc==;EndpointSuffix=core.windows.net",
        );
        assert!(matches!(result, Err(AgentError::Configuration(_))));
    }

    #[test]
    fn test_connection_string_from_account_name() {
        let store = AzureBlobStore::from_connection_string(
            "AccountName=acct;SharedAccessSignature=?sv=2022&sig=abc",
        )
        .unwrap();
        assert_eq!(store.endpoint.as_str(), "https://acct.blob.core.windows.net/");
        assert_eq!(
            store.blob_url("surveys", "drop zone/a.csv"),
            "https://acct.blob.core.windows.net/surveys/drop%20zone/a.csv?sv=2022&sig=abc"
        );
    }

    #[tokio::test]
    async fn test_azure_list_follows_markers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/surveys"))
            .and(query_param("comp", "list"))
            .and(query_param("marker", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<EnumerationResults><Blobs><Blob><Name>b&amp;c.csv</Name></Blob></Blobs><NextMarker /></EnumerationResults>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/surveys"))
            .and(query_param("comp", "list"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<EnumerationResults><Blobs><Blob><Name>a.csv</Name></Blob></Blobs><NextMarker>page2</NextMarker></EnumerationResults>",
            ))
            .mount(&server)
            .await;

        let store = AzureBlobStore::from_connection_string(&format!(
            "BlobEndpoint={};SharedAccessSignature=sv=1&sig=x",
            server.uri()
        ))
        .unwrap();
        let names = store.list_blobs("surveys").await.unwrap();
        assert_eq!(names, vec!["a.csv", "b&c.csv"]);
    }

    #[test]
    fn test_blob_listing_tolerates_real_service_xml() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/" ContainerName="surveys">
  <Blobs>
    <Blob><Name><![CDATA[raw <2024>.csv]]></Name><Properties><Content-Length>12</Content-Length></Properties></Blob>
    <Blob><Name>q&amp;a.xlsx</Name><Properties /></Blob>
  </Blobs>
  <NextMarker>2!next</NextMarker>
</EnumerationResults>"#;

        let page = BlobListPage::parse(body).unwrap();
        assert_eq!(page.next_marker().as_deref(), Some("2!next"));
        assert_eq!(
            page.names().collect::<Vec<_>>(),
            vec!["raw <2024>.csv", "q&a.xlsx"]
        );

        let empty = BlobListPage::parse(
            "<EnumerationResults><Blobs /><NextMarker /></EnumerationResults>",
        )
        .unwrap();
        assert_eq!(empty.next_marker(), None);
        assert_eq!(empty.names().count(), 0);

        assert!(BlobListPage::parse("<EnumerationResults><Blobs>").is_err());
    }

    #[tokio::test]
    async fn test_azure_upload_sends_block_blob() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/surveys/drop_zone/a.csv"))
            .and(header("x-ms-blob-type", "BlockBlob"))
            .and(query_param("sig", "x"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = AzureBlobStore::from_connection_string(&format!(
            "BlobEndpoint={}/;SharedAccessSignature=sv=1&sig=x",
            server.uri()
        ))
        .unwrap();
        store
            .upload_blob("surveys", "drop_zone/a.csv", b"data".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_azure_http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = AzureBlobStore::from_connection_string(&format!(
            "BlobEndpoint={};SharedAccessSignature=sv=1&sig=x",
            server.uri()
        ))
        .unwrap();
        assert!(store.delete_blob("surveys", "gone.csv").await.is_err());
    }
}
