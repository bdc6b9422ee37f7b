//! Download HTTP Routes
//!
//! `GET /download?sessionToken=..&owners=a&sources=/x&owners=b&sources=/y`
//! streams every requested file or directory as one zip archive.
//!
//! The listing runs before any byte is sent, so an ACL or path error is a
//! normal JSON error response. File contents are then read through the
//! proxy chain chunk by chunk; each member is sent once it is complete. The
//! worker stays checked out until the stream ends or the client goes away.

use std::collections::HashSet;
use std::io::{self, Seek, SeekFrom, Write};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::{stream, FutureExt};
use thiserror::Error;
use tokio::sync::mpsc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::api_routes::render;
use super::state::GatewayState;
use crate::api::{
    group_parameters, panic_message, ApiError, ApiResult, ApiValue, UriParameters, WireResponse,
};
use crate::core::{CoreError, CoreResult, File, ProxyChain, WorkerContext};
use crate::observability::{Event, MetricsRegistry, ObservationScope};
use crate::pool::WorkerGuard;

/// Zip content type
pub const CONTENT_TYPE_ZIP: &str = "application/zip";

/// Chunks buffered between the archive writer and the response body
const STREAM_BUFFER_CHUNKS: usize = 8;

/// Create download routes
pub fn download_routes(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/", get(download_handler))
        .with_state(state)
}

/// Parsed download request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub session_token: Option<String>,
    /// (owner, source) pairs in request order
    pub targets: Vec<(String, String)>,
}

impl DownloadRequest {
    pub fn parse(parameters: &UriParameters) -> ApiResult<Self> {
        let mut session_token = None;
        let mut owners: &[String] = &[];
        let mut sources: &[String] = &[];

        for (key, values) in parameters {
            match key.as_str() {
                "sessionToken" => match values.as_slice() {
                    [token] => session_token = Some(token.clone()),
                    _ => {
                        return Err(ApiError::incorrect_parameters(
                            "Parameter 'sessionToken' must have exactly one value",
                        ))
                    }
                },
                "owners" => owners = values,
                "sources" => sources = values,
                other => {
                    return Err(ApiError::incorrect_parameters(format!(
                        "Unknown download parameter '{}'",
                        other
                    )))
                }
            }
        }

        if owners.is_empty() {
            return Err(ApiError::incorrect_parameters(
                "At least one owner/source pair is required",
            ));
        }
        if owners.len() != sources.len() {
            return Err(ApiError::incorrect_parameters(format!(
                "Got {} owners but {} sources",
                owners.len(),
                sources.len()
            ))
            .with_detail("owners", owners.len())
            .with_detail("sources", sources.len()));
        }

        Ok(Self {
            session_token,
            targets: owners.iter().cloned().zip(sources.iter().cloned()).collect(),
        })
    }
}

/// One zip member
#[derive(Debug, Clone, PartialEq, Eq)]
struct ArchiveEntry {
    owner: String,
    path: String,
    /// `owner/rel/path`, with a trailing `/` for directories
    name: String,
    directory: bool,
    size: Option<u64>,
}

impl ArchiveEntry {
    fn from_file(file: File) -> Self {
        let relative = file.path.trim_start_matches('/');
        let mut name = if relative.is_empty() {
            file.owner.clone()
        } else {
            format!("{}/{}", file.owner, relative)
        };
        if file.directory {
            name.push('/');
        }
        Self {
            owner: file.owner,
            path: file.path,
            name,
            directory: file.directory,
            size: file.size,
        }
    }
}

/// Flatten listings into unique archive entries, first occurrence wins
fn collect_entries(listings: Vec<Vec<File>>) -> Vec<ArchiveEntry> {
    let mut seen = HashSet::new();
    listings
        .into_iter()
        .flatten()
        .map(ArchiveEntry::from_file)
        .filter(|entry| seen.insert(entry.name.clone()))
        .collect()
}

#[derive(Debug, Error)]
enum ArchiveError {
    #[error("client disconnected")]
    Disconnected,

    #[error("worker already released")]
    Released,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("zip: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Seekable sink the zip writer fills and the streaming task drains
///
/// The zip writer seeks back to patch each member's local header once the
/// member's data is written, then flushes. Bytes before the last flush are
/// never touched again and can leave the process; everything after stays
/// in `pending` until the next flush.
#[derive(Debug, Default)]
struct Spool {
    /// Archive offset of `pending[0]`
    base: u64,
    pending: Vec<u8>,
    position: u64,
    /// Offset of the last flush
    settled: u64,
}

#[derive(Debug, Clone, Default)]
struct SpoolBuffer(Arc<Mutex<Spool>>);

impl SpoolBuffer {
    fn lock(&self) -> io::Result<MutexGuard<'_, Spool>> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("archive buffer poisoned"))
    }

    /// Remove the bytes the zip writer has flushed
    fn take_settled(&self) -> io::Result<Vec<u8>> {
        let mut spool = self.lock()?;
        let settled = (spool.settled - spool.base) as usize;
        let bytes: Vec<u8> = spool.pending.drain(..settled).collect();
        spool.base = spool.settled;
        Ok(bytes)
    }

    /// Remove everything; only once the archive is finished
    fn take_all(&self) -> io::Result<Vec<u8>> {
        let mut spool = self.lock()?;
        let end = spool.base + spool.pending.len() as u64;
        spool.base = end;
        spool.settled = end;
        spool.position = end;
        Ok(std::mem::take(&mut spool.pending))
    }
}

impl Write for SpoolBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut spool = self.lock()?;
        let start = (spool.position - spool.base) as usize;
        let end = start + buf.len();
        if spool.pending.len() < end {
            spool.pending.resize(end, 0);
        }
        spool.pending[start..end].copy_from_slice(buf);
        spool.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut spool = self.lock()?;
        spool.settled = spool.settled.max(spool.position);
        Ok(())
    }
}

impl Seek for SpoolBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let mut spool = self.lock()?;
        let end = spool.base + spool.pending.len() as u64;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => end.checked_add_signed(delta),
            SeekFrom::Current(delta) => spool.position.checked_add_signed(delta),
        };
        match target {
            Some(target) if target >= spool.settled => {
                spool.position = target;
                Ok(target)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek into bytes already sent",
            )),
        }
    }
}

type ChunkSender = mpsc::Sender<io::Result<Bytes>>;

async fn send_chunk(bytes: Vec<u8>, tx: &ChunkSender) -> Result<u64, ArchiveError> {
    if bytes.is_empty() {
        return Ok(0);
    }
    let len = bytes.len() as u64;
    tx.send(Ok(Bytes::from(bytes)))
        .await
        .map_err(|_| ArchiveError::Disconnected)?;
    Ok(len)
}

/// Each member goes out as soon as the next one starts
async fn write_archive(
    chain: &ProxyChain,
    guard: &mut WorkerGuard,
    entries: &[ArchiveEntry],
    chunk_size: i32,
    tx: &ChunkSender,
) -> Result<u64, ArchiveError> {
    let buffer = SpoolBuffer::default();
    let mut zip = ZipWriter::new(buffer.clone());
    zip.set_flush_on_finish_file(true);
    let mut sent = 0u64;

    for entry in entries {
        if entry.directory {
            zip.add_directory(entry.name.as_str(), SimpleFileOptions::default())?;
            continue;
        }

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(entry.size.unwrap_or(0) > u64::from(u32::MAX));
        zip.start_file(entry.name.as_str(), options)?;
        sent += send_chunk(buffer.take_settled()?, tx).await?;

        let ctx = guard.context_mut().ok_or(ArchiveError::Released)?;
        let mut offset = 0i64;
        loop {
            let data = chain
                .read(ctx, &entry.owner, &entry.path, offset, chunk_size)
                .await?;
            if data.is_empty() {
                break;
            }
            zip.write_all(&data)?;
            offset += data.len() as i64;
            if data.len() < chunk_size as usize {
                break;
            }
        }
    }

    zip.finish()?;
    sent += send_chunk(buffer.take_all()?, tx).await?;
    Ok(sent)
}

async fn stream_archive(
    chain: Arc<ProxyChain>,
    mut guard: WorkerGuard,
    entries: Vec<ArchiveEntry>,
    chunk_size: i32,
    tx: ChunkSender,
    metrics: Arc<MetricsRegistry>,
    scope: ObservationScope,
) {
    let written = AssertUnwindSafe(write_archive(&chain, &mut guard, &entries, chunk_size, &tx))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(ArchiveError::Panicked(panic_message(&*payload))));
    match written {
        Ok(sent) => {
            guard.finish(false);
            metrics.increment_archives_streamed();
            scope.complete(&[("bytes", &sent.to_string())]);
        }
        Err(e) => {
            // Truncate the body with an error so the client sees a broken archive
            if !matches!(e, ArchiveError::Disconnected) {
                let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
            }
            guard.finish(true);
            metrics.increment_archives_aborted();
            scope.fail(&e.to_string());
        }
    }
}

async fn list_targets(
    chain: &ProxyChain,
    ctx: &mut WorkerContext,
    targets: &[(String, String)],
) -> CoreResult<Vec<Vec<File>>> {
    let mut listings = Vec::with_capacity(targets.len());
    for (owner, source) in targets {
        listings.push(chain.list(ctx, owner, source, true).await?);
    }
    Ok(listings)
}

async fn download_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    match start_download(&state, &group_parameters(query)).await {
        Ok(response) => response,
        Err(e) => render(WireResponse::from(Err::<ApiValue, _>(e))),
    }
}

async fn start_download(state: &GatewayState, parameters: &UriParameters) -> ApiResult<Response> {
    let server = state.server();
    if server.is_shutting_down() {
        return Err(ApiError::shutting_down());
    }
    let request = DownloadRequest::parse(parameters)?;

    let worker = server.check_out().await?;
    let mut guard = WorkerGuard::new(Arc::clone(server.pool()), worker);
    let chain = Arc::clone(server.chain());

    let listed = {
        let ctx = guard
            .context_mut()
            .ok_or_else(|| ApiError::internal("Worker released before listing"))?;
        ctx.set_session_token(request.session_token.clone());
        AssertUnwindSafe(list_targets(&chain, ctx, &request.targets))
            .catch_unwind()
            .await
    };
    let entries = match listed {
        Ok(Ok(listings)) => collect_entries(listings),
        Ok(Err(e)) => {
            guard.finish(true);
            return Err(e.into());
        }
        Err(payload) => {
            guard.finish(true);
            return Err(ApiError::from_panic(&*payload));
        }
    };

    let chunk_size = state.max_read_size_in_bytes.clamp(1, i32::MAX as u64) as i32;
    let scope = ObservationScope::new(
        Event::ArchiveStreamStart,
        Event::ArchiveStreamComplete,
        Event::ArchiveStreamAborted,
        vec![
            ("worker_id", guard.worker_id().unwrap_or_default().to_string()),
            ("targets", request.targets.len().to_string()),
            ("entries", entries.len().to_string()),
        ],
    );

    let (tx, rx) = mpsc::channel(STREAM_BUFFER_CHUNKS);
    tokio::spawn(stream_archive(
        chain,
        guard,
        entries,
        chunk_size,
        tx,
        Arc::clone(&state.metrics),
        scope,
    ));

    let body = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, CONTENT_TYPE_ZIP),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"download.zip\""),
        ],
        Body::from_stream(body),
    )
        .into_response())
}
