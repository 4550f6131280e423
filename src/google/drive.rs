use crate::config::{DRIVE_FILES_URL, DRIVE_UPLOAD_URL};
use crate::error::{FerryError, truncate_body};
use reqwest::{Body, multipart};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use url::Url;

const METADATA_FIELDS: &str = "id,name,size,mimeType,modifiedTime";
const LIST_FIELDS: &str = "nextPageToken, files(id, name, size, mimeType, modifiedTime, createdTime)";
const SEARCH_FIELDS: &str = "files(id, name, size, mimeType, modifiedTime)";

const SHORT_TIMEOUT: Duration = Duration::from_secs(30);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

const DEFAULT_PAGE_SIZE: u32 = 100;
const MAX_PAGE_SIZE: u32 = 1000;
const SEARCH_PAGE_SIZE: u32 = 50;

/// One Drive object as returned by the files endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    /// Drive reports `size` as a decimal string; absent for Google-native docs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

impl DriveFile {
    pub fn size_bytes(&self) -> u64 {
        self.size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Stateless request/response wrappers around the Drive v3 REST API.
///
/// Every call takes a bearer token, issues one HTTP request, and maps any
/// non-2xx response to [`FerryError::DriveApi`] with the status and a
/// truncated body.
#[derive(Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    chunk_size: usize,
}

impl DriveClient {
    pub fn new(http: reqwest::Client, chunk_size: usize) -> Self {
        Self { http, chunk_size }
    }

    pub async fn metadata(&self, token: &str, file_id: &str) -> Result<DriveFile, FerryError> {
        let resp = self
            .http
            .get(file_url(file_id))
            .query(&[("fields", METADATA_FIELDS), ("supportsAllDrives", "true")])
            .bearer_auth(token)
            .timeout(SHORT_TIMEOUT)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Server-side copy: Drive duplicates the bytes internally, nothing
    /// passes through this process.
    pub async fn copy(
        &self,
        token: &str,
        file_id: &str,
        new_name: &str,
    ) -> Result<Value, FerryError> {
        let mut url = file_url(file_id);
        url.path_segments_mut()
            .expect("Drive files URL is a valid base")
            .push("copy");
        let resp = self
            .http
            .post(url)
            .query(&[("supportsAllDrives", "true")])
            .bearer_auth(token)
            .json(&json!({ "name": new_name }))
            .timeout(TRANSFER_TIMEOUT)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn list(
        &self,
        token: &str,
        page_token: Option<&str>,
        page_size: Option<u32>,
    ) -> Result<DriveFileList, FerryError> {
        let page_size = clamp_page_size(page_size);
        let mut req = self
            .http
            .get(DRIVE_FILES_URL.clone())
            .query(&[
                ("pageSize", page_size.to_string().as_str()),
                ("fields", LIST_FIELDS),
                ("orderBy", "modifiedTime desc"),
                ("q", "trashed=false"),
            ])
            .bearer_auth(token)
            .timeout(SHORT_TIMEOUT);
        if let Some(page_token) = page_token {
            req = req.query(&[("pageToken", page_token)]);
        }
        let resp = req.send().await?;
        Ok(check(resp).await?.json().await?)
    }

    pub async fn search(&self, token: &str, query: &str) -> Result<DriveFileList, FerryError> {
        let filter = format!(
            "name contains '{}' and trashed=false",
            escape_query_value(query)
        );
        let resp = self
            .http
            .get(DRIVE_FILES_URL.clone())
            .query(&[
                ("q", filter.as_str()),
                ("fields", SEARCH_FIELDS),
                ("pageSize", SEARCH_PAGE_SIZE.to_string().as_str()),
            ])
            .bearer_auth(token)
            .timeout(SHORT_TIMEOUT)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Drive answers 204 on success; any 2xx is accepted.
    pub async fn delete(&self, token: &str, file_id: &str) -> Result<(), FerryError> {
        let resp = self
            .http
            .delete(file_url(file_id))
            .query(&[("supportsAllDrives", "true")])
            .bearer_auth(token)
            .timeout(SHORT_TIMEOUT)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    /// Stream a file's content (`alt=media`). No overall timeout: the body
    /// is consumed incrementally by the caller.
    pub async fn download(
        &self,
        token: &str,
        file_id: &str,
    ) -> Result<reqwest::Response, FerryError> {
        let resp = self
            .http
            .get(file_url(file_id))
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .bearer_auth(token)
            .send()
            .await?;
        check(resp).await
    }

    /// Multipart upload: one JSON metadata part, then the file bytes
    /// streamed from disk.
    pub async fn upload_multipart(
        &self,
        token: &str,
        path: &Path,
        file_name: &str,
        mime_type: &str,
    ) -> Result<Value, FerryError> {
        let file = tokio::fs::File::open(path).await?;
        let stream = ReaderStream::with_capacity(file, self.chunk_size);

        let metadata = json!({ "name": file_name, "mimeType": mime_type });
        let form = multipart::Form::new()
            .part(
                "metadata",
                multipart::Part::text(metadata.to_string())
                    .mime_str("application/json; charset=UTF-8")?,
            )
            .part(
                "file",
                multipart::Part::stream(Body::wrap_stream(stream))
                    .file_name(file_name.to_string())
                    .mime_str("application/octet-stream")?,
            );

        let resp = self
            .http
            .post(DRIVE_UPLOAD_URL.clone())
            .query(&[("uploadType", "multipart")])
            .bearer_auth(token)
            .multipart(form)
            .timeout(TRANSFER_TIMEOUT)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

fn file_url(file_id: &str) -> Url {
    let mut url = DRIVE_FILES_URL.clone();
    url.path_segments_mut()
        .expect("Drive files URL is a valid base")
        .push(file_id);
    url
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, FerryError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = truncate_body(&resp.text().await.unwrap_or_default());
    Err(FerryError::DriveApi { status, body })
}

fn clamp_page_size(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
}

/// Escape a value for interpolation into a Drive `q` filter string.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_and_backslashes_in_filters() {
        assert_eq!(escape_query_value("report"), "report");
        assert_eq!(escape_query_value("o'brien"), "o\\'brien");
        assert_eq!(escape_query_value("a\\b"), "a\\\\b");
        assert_eq!(escape_query_value("it's a\\'mix"), "it\\'s a\\\\\\'mix");
    }

    #[test]
    fn page_size_clamps_to_api_maximum() {
        assert_eq!(clamp_page_size(None), 100);
        assert_eq!(clamp_page_size(Some(10)), 10);
        assert_eq!(clamp_page_size(Some(1000)), 1000);
        assert_eq!(clamp_page_size(Some(5000)), 1000);
    }

    #[test]
    fn size_parses_drive_string_sizes() {
        let file = DriveFile {
            id: "x".into(),
            name: "doc.pdf".into(),
            size: Some("1048576".into()),
            mime_type: None,
            modified_time: None,
            created_time: None,
        };
        assert_eq!(file.size_bytes(), 1_048_576);

        let folder = DriveFile { size: None, ..file };
        assert_eq!(folder.size_bytes(), 0);
    }

    #[test]
    fn file_url_percent_encodes_path_input() {
        let url = file_url("abc/..%zz");
        assert!(url.as_str().starts_with("https://www.googleapis.com/drive/v3/files/"));
        assert!(!url.path().contains("/../"));
    }
}
