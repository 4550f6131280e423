use super::registry::{TaskRegistry, TaskStatus};
use crate::error::FerryError;
use crate::google::{drive::DriveClient, token::TokenCache};
use futures::stream::{self, StreamExt};
use reqwest::header::CONTENT_DISPOSITION;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Share of the progress range reserved for the download phase; the
/// remainder is granted when the Drive upload lands.
const DOWNLOAD_PROGRESS_CEIL: u8 = 90;

const FALLBACK_FILE_NAME: &str = "downloaded_file";

#[derive(Debug)]
pub enum TaskJob {
    UploadFromUrl {
        task_id: String,
        download_url: String,
        file_name: Option<String>,
    },
    Extract {
        task_id: String,
        file_id: String,
    },
}

impl TaskJob {
    fn task_id(&self) -> &str {
        match self {
            TaskJob::UploadFromUrl { task_id, .. } | TaskJob::Extract { task_id, .. } => task_id,
        }
    }
}

enum StreamOutcome {
    Done,
    Cancelled,
}

struct WorkerContext {
    registry: Arc<TaskRegistry>,
    tokens: Arc<TokenCache>,
    drive: DriveClient,
    http: reqwest::Client,
}

/// Handle for submitting background jobs to the bounded worker pool.
///
/// Jobs queue without limit; at most `concurrency` run at a time.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::UnboundedSender<TaskJob>,
}

impl TaskQueue {
    pub fn spawn(
        registry: Arc<TaskRegistry>,
        tokens: Arc<TokenCache>,
        drive: DriveClient,
        http: reqwest::Client,
        concurrency: usize,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<TaskJob>();
        let concurrency = concurrency.max(1);
        let ctx = Arc::new(WorkerContext {
            registry,
            tokens,
            drive,
            http,
        });

        tokio::spawn(async move {
            info!(concurrency, "task worker pool started");
            let jobs = stream::unfold(rx, |mut rx| async move {
                let job = rx.recv().await;
                job.map(|job| (job, rx))
            });

            jobs.map(move |job| {
                let ctx = ctx.clone();
                async move { run_job(ctx, job).await }
            })
            .buffer_unordered(concurrency)
            .for_each(|_| async {})
            .await;
            info!("task worker pool stopped (channel closed)");
        });

        Self { tx }
    }

    pub fn submit(&self, job: TaskJob) -> Result<(), FerryError> {
        self.tx.send(job).map_err(|_| FerryError::QueueClosed)
    }
}

async fn run_job(ctx: Arc<WorkerContext>, job: TaskJob) {
    let task_id = job.task_id().to_string();
    let Some(cancel) = ctx.registry.cancel_token(&task_id) else {
        warn!(%task_id, "job without a registry entry dropped");
        return;
    };

    let outcome = match job {
        TaskJob::UploadFromUrl {
            task_id,
            download_url,
            file_name,
        } => upload_from_url(&ctx, &task_id, &download_url, file_name, &cancel).await,
        TaskJob::Extract { task_id, file_id } => extract(&ctx, &task_id, &file_id, &cancel).await,
    };

    if let Err(err) = outcome {
        error!(%task_id, error = %err, "background task failed");
        ctx.registry.fail(&task_id, err.to_string());
    }
}

/// Stream an external URL to a spool file, then re-upload the bytes to
/// Drive. The spool file is removed on every exit path.
async fn upload_from_url(
    ctx: &WorkerContext,
    task_id: &str,
    download_url: &str,
    custom_name: Option<String>,
    cancel: &CancellationToken,
) -> Result<(), FerryError> {
    ctx.registry.set_status(task_id, TaskStatus::Downloading);

    let resp = ctx
        .http
        .get(download_url)
        .send()
        .await?
        .error_for_status()?;
    let detected = file_name_from_response(&resp, download_url);
    ctx.registry.set_file_name(task_id, &detected);

    let spool = spool_path(task_id, &detected);
    let streamed =
        stream_to_spool(ctx, task_id, resp, &spool, cancel, DOWNLOAD_PROGRESS_CEIL, 0).await;

    let result = match streamed {
        Ok(StreamOutcome::Done) => {
            let upload_name = custom_name.unwrap_or(detected);
            upload_spool(ctx, task_id, &spool, &upload_name, cancel).await
        }
        Ok(StreamOutcome::Cancelled) => Ok(()),
        Err(err) => Err(err),
    };

    remove_spool(&spool).await;
    result
}

/// Pull a Drive file's actual bytes to a local spool file, reporting real
/// progress, then discard the spool. Serves as a server-side retrievability
/// pass over the stored object.
async fn extract(
    ctx: &WorkerContext,
    task_id: &str,
    file_id: &str,
    cancel: &CancellationToken,
) -> Result<(), FerryError> {
    let token = ctx.tokens.valid_token().await?;
    let meta = ctx.drive.metadata(&token, file_id).await?;
    ctx.registry.set_file_name(task_id, &meta.name);
    ctx.registry.set_status(task_id, TaskStatus::Extracting);

    let resp = ctx.drive.download(&token, file_id).await?;
    let spool = spool_path(task_id, &meta.name);
    // media responses may omit content-length; fall back to the metadata size
    let streamed = stream_to_spool(ctx, task_id, resp, &spool, cancel, 100, meta.size_bytes()).await;
    remove_spool(&spool).await;

    match streamed? {
        StreamOutcome::Done => {
            ctx.registry.complete(task_id, None);
            info!(%task_id, file = %meta.name, "extract task completed");
        }
        StreamOutcome::Cancelled => debug!(%task_id, "extract task cancelled"),
    }
    Ok(())
}

async fn upload_spool(
    ctx: &WorkerContext,
    task_id: &str,
    spool: &Path,
    upload_name: &str,
    cancel: &CancellationToken,
) -> Result<(), FerryError> {
    if cancel.is_cancelled() {
        return Ok(());
    }
    ctx.registry.set_file_name(task_id, upload_name);
    ctx.registry.set_status(task_id, TaskStatus::Uploading);

    let token = ctx.tokens.valid_token().await?;
    let uploaded = ctx
        .drive
        .upload_multipart(&token, spool, upload_name, "application/octet-stream")
        .await?;
    let file_id = uploaded
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string);

    ctx.registry.complete(task_id, file_id);
    info!(%task_id, file = %upload_name, "upload-from-url task completed");
    Ok(())
}

async fn stream_to_spool(
    ctx: &WorkerContext,
    task_id: &str,
    mut resp: reqwest::Response,
    spool: &Path,
    cancel: &CancellationToken,
    progress_ceil: u8,
    total_hint: u64,
) -> Result<StreamOutcome, FerryError> {
    let total = resp.content_length().filter(|len| *len > 0).unwrap_or(total_hint);
    let mut file = tokio::fs::File::create(spool).await?;
    let mut received: u64 = 0;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamOutcome::Cancelled),
            chunk = resp.chunk() => chunk?,
        };
        let Some(bytes) = chunk else { break };

        file.write_all(&bytes).await?;
        received += bytes.len() as u64;
        if total > 0 {
            let progress = (received.min(total) * u64::from(progress_ceil) / total) as u8;
            ctx.registry.advance_progress(task_id, progress);
        }
    }

    file.flush().await?;
    Ok(StreamOutcome::Done)
}

fn file_name_from_response(resp: &reqwest::Response, url: &str) -> String {
    content_disposition_filename(resp)
        .or_else(|| url_file_name(url))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

fn content_disposition_filename(resp: &reqwest::Response) -> Option<String> {
    let raw = resp.headers().get(CONTENT_DISPOSITION)?.to_str().ok()?;
    let (_, rest) = raw.split_once("filename=")?;
    let name = rest.split(';').next()?.trim().trim_matches('"');
    (!name.is_empty()).then(|| name.to_string())
}

fn url_file_name(url: &str) -> Option<String> {
    let tail = url.split('/').next_back()?.split('?').next()?;
    (!tail.is_empty()).then(|| tail.to_string())
}

fn spool_path(task_id: &str, file_name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "driveferry-{}-{}",
        flatten(task_id),
        flatten(file_name)
    ))
}

/// Spool names are built from client-supplied strings; keep them flat.
fn flatten(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn remove_spool(spool: &Path) {
    if let Err(err) = tokio::fs::remove_file(spool).await
        && err.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %spool.display(), error = %err, "failed to remove spool file");
    }
}
