// Copyright © 2026 the ftp-rs authors
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the “Software”), to
// deal in the Software without restriction, including without limitation the
// rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
// sell copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
// IN THE SOFTWARE.

//! # TRANSFER ENGINE
//!
//! Streams bytes between a local sink/source and the data channel, reports
//! progress, honors pause/cancel, and pairs the streaming phase with the
//! trailing final reply on the control channel.
//!
//! ---------------------------------------------------------------------------
//!
//! Because a session owns exactly one data channel, the [Transfer Engine]
//! fixes its concurrency at one in-flight byte-streaming phase: starting a
//! second transfer while one is in flight blocks the caller on a
//! [Slot] until the first releases it. The slot is acquired *before* the
//! transfer-initiating command is even written to the control channel —
//! otherwise two REST/RETR/STOR/APPE command lines could race onto the wire
//! with no way to tell their replies apart.
//!
//! - [New Engine]
//! - [Start Download], [Start Upload], [Start Append], [Start Listing]
//! - [Pause]/[Resume]/[Cancel] an in-flight [Transfer] by id
//! - [Wait For All] transfers to leave the active state
//!
//! [Transfer Engine]:  TransferEngine
//! [Slot]:             TransferEngine
//! [New Engine]:       TransferEngine::new
//! [Start Download]:   TransferEngine::start_download
//! [Start Upload]:     TransferEngine::start_upload
//! [Start Append]:     TransferEngine::start_append
//! [Start Listing]:    TransferEngine::start_listing
//! [Pause]:            TransferEngine::pause
//! [Resume]:           TransferEngine::resume
//! [Cancel]:           TransferEngine::cancel
//! [Wait For All]:     TransferEngine::wait_all
//! [Transfer]:         Transfer

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ftp_reply::Reply;

use crate::config::{ClientConfig, TRANSFER_CHUNK_SIZE};
use crate::control::ControlChannel;
use crate::data::DataChannel;
use crate::error::{FtpError, TransferError};

/// Invoked at least once after every chunk, with the cumulative byte count
/// and the total size if known. Guaranteed monotonically non-decreasing in
/// the first argument. May run on the worker thread in asynchronous mode —
/// implementations updating shared UI state must marshal onto their own
/// thread.
pub type ProgressCallback = Box<dyn Fn(u64, Option<u64>) + Send + 'static>;

/// Invoked exactly once when a transfer leaves the active state.
pub type CompletionCallback = Box<dyn FnOnce(TransferOutcome) + Send + 'static>;

/// ## TRANSFER KIND
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Download,
    Upload,
    Append,
    /// LIST/NLST — protocol-shaped like a download, but its bytes are a
    /// directory listing rather than file content.
    Listing,
}

/// ## TRANSFER STATUS
///
/// `Pending -> Running (-> Paused -> Running)* -> {Completed, Failed,
/// Cancelled}`. Cancel is accepted from any non-terminal state; pause/resume
/// are no-ops outside Running/Paused respectively; terminal states are
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_active(self) -> bool {
        matches!(self, TransferStatus::Running | TransferStatus::Paused)
    }

    pub fn is_complete(self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }
}

/// The payload delivered to a completion callback on success.
#[derive(Debug, Clone)]
pub enum TransferPayload {
    Bytes(Vec<u8>),
    LocalPath(PathBuf),
    Reply(Reply),
}

/// The outcome delivered to a completion callback.
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    Completed(TransferPayload),
    Failed(String),
    Cancelled,
}

/// The explicit stand-in for the source's dynamic `local_path=`/`offset=`/
/// `callback=`/`progress_callback=`/`async_mode=` keyword arguments.
#[derive(Default)]
pub struct TransferOptions {
    /// Download destination, or upload/append source file.
    pub local_path: Option<PathBuf>,
    /// Upload/append source buffer, used when `local_path` is absent.
    pub buffer: Option<Vec<u8>>,
    /// Restart offset; `0` means "from the beginning" and suppresses REST.
    pub offset: u64,
    /// Whether the byte-streaming phase runs on a spawned worker. The
    /// transfer-initiating command and its preliminary reply are always
    /// read synchronously regardless of this flag.
    pub async_mode: bool,
    pub progress_callback: Option<ProgressCallback>,
    pub completion_callback: Option<CompletionCallback>,
}

impl TransferOptions {
    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn with_buffer(mut self, buffer: Vec<u8>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_async(mut self, async_mode: bool) -> Self {
        self.async_mode = async_mode;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn with_completion_callback(mut self, callback: CompletionCallback) -> Self {
        self.completion_callback = Some(callback);
        self
    }
}

/// The pause gate: a flag with wait-until-clear semantics, checked by the
/// worker between chunks.
struct PauseGate {
    paused: Mutex<bool>,
    condvar: Condvar,
}

impl PauseGate {
    fn new() -> Self {
        Self {
            paused: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn set(&self, paused: bool) {
        *self.paused.lock().unwrap() = paused;
        if !paused {
            self.condvar.notify_all();
        }
    }

    fn wait_if_paused(&self) {
        let mut guard = self.paused.lock().unwrap();
        while *guard {
            guard = self.condvar.wait(guard).unwrap();
        }
    }
}

/// ## TRANSFER
///
/// A shared, queryable record of one transfer. Callers hold an
/// `Arc<Transfer>` (a [TransferHandle](type@TransferHandle)) to poll status
/// or request pause/resume/cancel while the worker streams bytes on another
/// thread.
pub struct Transfer {
    pub id: u64,
    pub kind: TransferKind,
    pub remote_path: String,
    pub local_path: Option<PathBuf>,
    pub restart_offset: u64,
    total_size: Mutex<Option<u64>>,
    bytes_transferred: AtomicU64,
    status: Mutex<TransferStatus>,
    status_cv: Condvar,
    pause_gate: PauseGate,
    cancel_flag: AtomicBool,
    start_time: Mutex<Option<Instant>>,
    end_time: Mutex<Option<Instant>>,
    last_error: Mutex<Option<String>>,
}

pub type TransferHandle = Arc<Transfer>;

impl Transfer {
    fn new(id: u64, kind: TransferKind, remote_path: String, local_path: Option<PathBuf>, offset: u64, total_size: Option<u64>) -> Self {
        Self {
            id,
            kind,
            remote_path,
            local_path,
            restart_offset: offset,
            total_size: Mutex::new(total_size),
            bytes_transferred: AtomicU64::new(offset),
            status: Mutex::new(TransferStatus::Pending),
            status_cv: Condvar::new(),
            pause_gate: PauseGate::new(),
            cancel_flag: AtomicBool::new(false),
            start_time: Mutex::new(None),
            end_time: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn status(&self) -> TransferStatus {
        *self.status.lock().unwrap()
    }

    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }

    pub fn is_complete(&self) -> bool {
        self.status().is_complete()
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::SeqCst)
    }

    pub fn total_size(&self) -> Option<u64> {
        *self.total_size.lock().unwrap()
    }

    pub fn percent(&self) -> Option<f64> {
        self.total_size().map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.bytes_transferred() as f64 / total as f64) * 100.0
            }
        })
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    /// Pauses a running transfer; a no-op outside the Running state.
    pub fn pause(&self) {
        let mut status = self.status.lock().unwrap();
        if *status == TransferStatus::Running {
            *status = TransferStatus::Paused;
            self.pause_gate.set(true);
        }
    }

    /// Resumes a paused transfer; a no-op outside the Paused state.
    pub fn resume(&self) {
        let mut status = self.status.lock().unwrap();
        if *status == TransferStatus::Paused {
            *status = TransferStatus::Running;
            self.pause_gate.set(false);
        }
    }

    /// Cancels the transfer from any non-terminal state. The final status
    /// is always Cancelled, regardless of whatever the server's trailing
    /// reply turns out to be.
    pub fn cancel(&self) {
        let mut status = self.status.lock().unwrap();
        if !status.is_complete() {
            *status = TransferStatus::Cancelled;
            self.cancel_flag.store(true, Ordering::SeqCst);
            // Wake a worker blocked on the pause gate so it can observe
            // the cancel flag at the next chunk boundary.
            self.pause_gate.set(false);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    /// Blocks until the transfer reaches a terminal status, or `timeout`
    /// elapses. Returns the status observed when it returned.
    pub fn wait(&self, timeout: Option<Duration>) -> TransferStatus {
        let mut status = self.status.lock().unwrap();
        match timeout {
            None => {
                while !status.is_complete() {
                    status = self.status_cv.wait(status).unwrap();
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !status.is_complete() {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    let (guard, result) = self.status_cv.wait_timeout(status, remaining).unwrap();
                    status = guard;
                    if result.timed_out() {
                        break;
                    }
                }
            }
        }
        *status
    }

    fn set_running(&self) {
        *self.status.lock().unwrap() = TransferStatus::Running;
        *self.start_time.lock().unwrap() = Some(Instant::now());
    }

    fn finish(&self, outcome: &TransferOutcome) {
        let mut status = self.status.lock().unwrap();
        *status = match outcome {
            TransferOutcome::Completed(_) => TransferStatus::Completed,
            TransferOutcome::Failed(message) => {
                *self.last_error.lock().unwrap() = Some(message.clone());
                TransferStatus::Failed
            }
            TransferOutcome::Cancelled => TransferStatus::Cancelled,
        };
        *self.end_time.lock().unwrap() = Some(Instant::now());
        self.status_cv.notify_all();
    }

    fn add_bytes(&self, n: u64, progress: &Option<ProgressCallback>) {
        let total = self.bytes_transferred.fetch_add(n, Ordering::SeqCst) + n;
        if let Some(callback) = progress {
            callback(total, self.total_size());
        }
    }
}

/// What a transfer-initiating dispatch call hands back to its caller: the
/// preliminary reply, plus either the already-obtained outcome
/// (synchronous mode) or a handle to the in-flight transfer (asynchronous
/// mode).
pub enum TransferLaunch {
    Sync(TransferOutcome),
    Async(TransferHandle),
}

struct Slot {
    occupied: Mutex<bool>,
    condvar: Condvar,
}

struct SlotGuard {
    slot: Arc<Slot>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        *self.slot.occupied.lock().unwrap() = false;
        self.slot.condvar.notify_one();
    }
}

fn acquire_slot(slot: &Arc<Slot>) -> SlotGuard {
    let mut occupied = slot.occupied.lock().unwrap();
    while *occupied {
        occupied = slot.condvar.wait(occupied).unwrap();
    }
    *occupied = true;
    drop(occupied);
    SlotGuard { slot: slot.clone() }
}

/// ## TRANSFER ENGINE
///
/// See the [module documentation][self].
pub struct TransferEngine {
    control: Arc<ControlChannel>,
    data: Arc<Mutex<DataChannel>>,
    config: ClientConfig,
    slot: Arc<Slot>,
    next_id: AtomicU64,
    registry: Mutex<HashMap<u64, TransferHandle>>,
    workers: Mutex<Vec<thread::JoinHandle<TransferOutcome>>>,
}

impl TransferEngine {
    pub fn new(control: Arc<ControlChannel>, data: Arc<Mutex<DataChannel>>, config: ClientConfig) -> Self {
        Self {
            control,
            data,
            config,
            slot: Arc::new(Slot {
                occupied: Mutex::new(false),
                condvar: Condvar::new(),
            }),
            next_id: AtomicU64::new(0),
            registry: Mutex::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
        }
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn register(&self, transfer: TransferHandle) {
        self.registry.lock().unwrap().insert(transfer.id, transfer);
    }

    pub fn get(&self, id: u64) -> Option<TransferHandle> {
        self.registry.lock().unwrap().get(&id).cloned()
    }

    pub fn list(&self) -> Vec<TransferHandle> {
        self.registry.lock().unwrap().values().cloned().collect()
    }

    pub fn pause(&self, id: u64) {
        if let Some(transfer) = self.get(id) {
            transfer.pause();
        }
    }

    pub fn resume(&self, id: u64) {
        if let Some(transfer) = self.get(id) {
            transfer.resume();
        }
    }

    /// Cancels the transfer, and issues an urgent ABOR on the control
    /// channel if it was actually streaming. The worker, not this call,
    /// drains the resulting 426/226 reply pairing, since it is the worker
    /// that owns the control channel's trailing-reply read for this
    /// transfer.
    pub fn cancel(&self, id: u64) {
        let Some(transfer) = self.get(id) else { return };
        let was_active = transfer.is_active();
        transfer.cancel();
        if was_active {
            let _ = self.control.send_abor_urgent();
        }
    }

    /// Cancels every registered transfer that has not already reached a
    /// terminal state, via the same path as [cancel].
    ///
    /// [cancel]: TransferEngine::cancel
    pub fn cancel_all(&self) {
        for transfer in self.list() {
            if !transfer.is_complete() {
                self.cancel(transfer.id);
            }
        }
    }

    /// Waits up to `per_worker_timeout` for every registered worker thread
    /// to leave the active state. Workers that do not finish in time are
    /// considered detached; their records may remain in a non-terminal
    /// status.
    pub fn wait_all(&self, per_worker_timeout: Duration) {
        let transfers = self.list();
        for transfer in transfers {
            transfer.wait(Some(per_worker_timeout));
        }
    }

    /// ### START DOWNLOAD
    ///
    /// Issues `REST` (if `options.offset > 0`) then `RETR remote_path`,
    /// reads the preliminary reply, and either streams inline
    /// (synchronous) or spawns a worker (asynchronous) per
    /// `options.async_mode`. `total_size` should be obtained via a
    /// preceding SIZE query by the caller.
    pub fn start_download(
        &self,
        remote_path: &str,
        total_size: Option<u64>,
        options: TransferOptions,
    ) -> Result<(Reply, TransferLaunch), FtpError> {
        let guard = acquire_slot(&self.slot);
        let preliminary = self.send_transfer_command("RETR", remote_path, options.offset)?;
        if !(preliminary.is_preliminary() || preliminary.is_success()) {
            return Ok((
                preliminary.clone(),
                TransferLaunch::Sync(TransferOutcome::Failed(FtpError::ServerReply(preliminary).to_string())),
            ));
        }

        let id = self.alloc_id();
        let transfer = Arc::new(Transfer::new(
            id,
            TransferKind::Download,
            remote_path.to_string(),
            options.local_path.clone(),
            options.offset,
            total_size,
        ));
        self.register(transfer.clone());
        transfer.set_running();

        let control = self.control.clone();
        let data = self.data.clone();
        let timeout = self.config.data_connect_timeout;
        let local_path = options.local_path.clone();
        let offset = options.offset;
        let progress = options.progress_callback;
        let completion = options.completion_callback;
        let transfer_for_worker = transfer.clone();

        let body = move || -> TransferOutcome {
            let outcome = run_download(&transfer_for_worker, &data, timeout, local_path.as_deref(), offset, &progress);
            let final_reply = read_trailing_reply(&control, &transfer_for_worker);
            let outcome = reconcile_outcome(&transfer_for_worker, outcome, final_reply);
            transfer_for_worker.finish(&outcome);
            if let Some(callback) = completion {
                callback(outcome.clone());
            }
            drop(guard);
            outcome
        };

        self.launch(options.async_mode, transfer, body, preliminary)
    }

    /// ### START UPLOAD
    ///
    /// Issues `REST` (if `options.offset > 0`) then `STOR remote_path`.
    pub fn start_upload(
        &self,
        remote_path: &str,
        options: TransferOptions,
    ) -> Result<(Reply, TransferLaunch), FtpError> {
        let guard = acquire_slot(&self.slot);
        let preliminary = self.send_transfer_command("STOR", remote_path, options.offset)?;
        if !(preliminary.is_preliminary() || preliminary.is_success()) {
            return Ok((
                preliminary.clone(),
                TransferLaunch::Sync(TransferOutcome::Failed(FtpError::ServerReply(preliminary).to_string())),
            ));
        }

        let total_size = source_len(&options)?;
        let id = self.alloc_id();
        let transfer = Arc::new(Transfer::new(
            id,
            TransferKind::Upload,
            remote_path.to_string(),
            options.local_path.clone(),
            options.offset,
            total_size,
        ));
        self.register(transfer.clone());
        transfer.set_running();

        let control = self.control.clone();
        let data = self.data.clone();
        let timeout = self.config.data_connect_timeout;
        let local_path = options.local_path.clone();
        let buffer = options.buffer.clone();
        let offset = options.offset;
        let progress = options.progress_callback;
        let completion = options.completion_callback;
        let transfer_for_worker = transfer.clone();

        let body = move || -> TransferOutcome {
            let outcome = run_upload(&transfer_for_worker, &data, timeout, local_path.as_deref(), buffer, offset, &progress);
            let final_reply = read_trailing_reply(&control, &transfer_for_worker);
            let outcome = reconcile_outcome(&transfer_for_worker, outcome, final_reply);
            transfer_for_worker.finish(&outcome);
            if let Some(callback) = completion {
                callback(outcome.clone());
            }
            drop(guard);
            outcome
        };

        self.launch(options.async_mode, transfer, body, preliminary)
    }

    /// ### START APPEND
    ///
    /// Issues `APPE remote_path` — no REST, the server does the
    /// appending.
    pub fn start_append(
        &self,
        remote_path: &str,
        options: TransferOptions,
    ) -> Result<(Reply, TransferLaunch), FtpError> {
        let guard = acquire_slot(&self.slot);
        let preliminary = self.send_transfer_command("APPE", remote_path, 0)?;
        if !(preliminary.is_preliminary() || preliminary.is_success()) {
            return Ok((
                preliminary.clone(),
                TransferLaunch::Sync(TransferOutcome::Failed(FtpError::ServerReply(preliminary).to_string())),
            ));
        }

        let total_size = source_len(&options)?;
        let id = self.alloc_id();
        let transfer = Arc::new(Transfer::new(
            id,
            TransferKind::Append,
            remote_path.to_string(),
            options.local_path.clone(),
            0,
            total_size,
        ));
        self.register(transfer.clone());
        transfer.set_running();

        let control = self.control.clone();
        let data = self.data.clone();
        let timeout = self.config.data_connect_timeout;
        let local_path = options.local_path.clone();
        let buffer = options.buffer.clone();
        let progress = options.progress_callback;
        let completion = options.completion_callback;
        let transfer_for_worker = transfer.clone();

        let body = move || -> TransferOutcome {
            let outcome = run_upload(&transfer_for_worker, &data, timeout, local_path.as_deref(), buffer, 0, &progress);
            let final_reply = read_trailing_reply(&control, &transfer_for_worker);
            let outcome = reconcile_outcome(&transfer_for_worker, outcome, final_reply);
            transfer_for_worker.finish(&outcome);
            if let Some(callback) = completion {
                callback(outcome.clone());
            }
            drop(guard);
            outcome
        };

        self.launch(options.async_mode, transfer, body, preliminary)
    }

    /// ### START LISTING
    ///
    /// Issues `LIST`/`NLST` `[path]`, protocol-shaped exactly like a
    /// download, with no restart support.
    pub fn start_listing(
        &self,
        command: &str,
        path: Option<&str>,
        options: TransferOptions,
    ) -> Result<(Reply, TransferLaunch), FtpError> {
        let guard = acquire_slot(&self.slot);
        let line = match path {
            Some(path) => format!("{command} {path}"),
            None => command.to_string(),
        };
        self.control.send_line(&line)?;
        let preliminary = self.control.recv_reply()?;
        if !(preliminary.is_preliminary() || preliminary.is_success()) {
            return Ok((
                preliminary.clone(),
                TransferLaunch::Sync(TransferOutcome::Failed(FtpError::ServerReply(preliminary).to_string())),
            ));
        }

        let id = self.alloc_id();
        let transfer = Arc::new(Transfer::new(
            id,
            TransferKind::Listing,
            path.unwrap_or(".").to_string(),
            options.local_path.clone(),
            0,
            None,
        ));
        self.register(transfer.clone());
        transfer.set_running();

        let control = self.control.clone();
        let data = self.data.clone();
        let timeout = self.config.data_connect_timeout;
        let local_path = options.local_path.clone();
        let progress = options.progress_callback;
        let completion = options.completion_callback;
        let transfer_for_worker = transfer.clone();

        let body = move || -> TransferOutcome {
            let outcome = run_download(&transfer_for_worker, &data, timeout, local_path.as_deref(), 0, &progress);
            let final_reply = read_trailing_reply(&control, &transfer_for_worker);
            let outcome = reconcile_outcome(&transfer_for_worker, outcome, final_reply);
            transfer_for_worker.finish(&outcome);
            if let Some(callback) = completion {
                callback(outcome.clone());
            }
            drop(guard);
            outcome
        };

        self.launch(options.async_mode, transfer, body, preliminary)
    }

    fn send_transfer_command(&self, command: &str, remote_path: &str, offset: u64) -> Result<Reply, FtpError> {
        if offset > 0 {
            self.control.send_line(&format!("REST {offset}"))?;
            let rest_reply = self.control.recv_reply()?;
            if rest_reply.code != 350 {
                return Err(FtpError::Sequence("REST was not answered with 350"));
            }
        }
        self.control.send_line(&format!("{command} {remote_path}"))?;
        self.control.recv_reply()
    }

    fn launch(
        &self,
        async_mode: bool,
        transfer: TransferHandle,
        body: impl FnOnce() -> TransferOutcome + Send + 'static,
        preliminary: Reply,
    ) -> Result<(Reply, TransferLaunch), FtpError> {
        if async_mode {
            let handle = thread::spawn(body);
            self.workers.lock().unwrap().push(handle);
            Ok((preliminary, TransferLaunch::Async(transfer)))
        } else {
            let outcome = body();
            Ok((preliminary, TransferLaunch::Sync(outcome)))
        }
    }
}

fn source_len(options: &TransferOptions) -> Result<Option<u64>, FtpError> {
    if let Some(buffer) = &options.buffer {
        return Ok(Some(buffer.len() as u64));
    }
    if let Some(path) = &options.local_path {
        let metadata = std::fs::metadata(path).map_err(TransferError::Io)?;
        return Ok(Some(metadata.len()));
    }
    Ok(None)
}

enum Sink {
    File(File),
    Memory(Vec<u8>),
}

impl Sink {
    fn open(local_path: Option<&std::path::Path>, offset: u64) -> Result<Self, TransferError> {
        match local_path {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .append(offset > 0)
                    .truncate(offset == 0)
                    .open(path)?;
                Ok(Sink::File(file))
            }
            None => Ok(Sink::Memory(Vec::new())),
        }
    }

    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), TransferError> {
        match self {
            Sink::File(file) => file.write_all(chunk)?,
            Sink::Memory(buffer) => buffer.extend_from_slice(chunk),
        }
        Ok(())
    }

    fn into_payload(self, local_path: Option<PathBuf>) -> TransferPayload {
        match self {
            Sink::File(_) => TransferPayload::LocalPath(local_path.unwrap_or_default()),
            Sink::Memory(buffer) => TransferPayload::Bytes(buffer),
        }
    }
}

/// Runs the download/listing streaming loop: connect the data channel,
/// read up to `TRANSFER_CHUNK_SIZE` bytes at a time until the peer closes,
/// honoring pause/cancel between chunks, then close the data channel.
/// Returns `Err(TransferError::Cancelled)` if cancelled, the payload on a
/// clean end-of-stream, or another `Err` on I/O failure.
fn run_download(
    transfer: &Transfer,
    data: &Mutex<DataChannel>,
    timeout: Duration,
    local_path: Option<&std::path::Path>,
    offset: u64,
    progress: &Option<ProgressCallback>,
) -> Result<TransferPayload, TransferError> {
    {
        let mut data = data.lock().unwrap();
        data.connect(timeout)?;
    }

    let mut sink = Sink::open(local_path, offset)?;

    loop {
        if transfer.is_cancelled() {
            break;
        }
        transfer.pause_gate.wait_if_paused();
        if transfer.is_cancelled() {
            break;
        }

        let chunk = {
            let mut data = data.lock().unwrap();
            data.recv_chunk()?
        };
        if chunk.is_empty() {
            break;
        }
        sink.write_chunk(&chunk)?;
        transfer.add_bytes(chunk.len() as u64, progress);
    }

    data.lock().unwrap().close();

    if transfer.is_cancelled() {
        Err(TransferError::Cancelled)
    } else {
        Ok(sink.into_payload(local_path.map(PathBuf::from)))
    }
}

/// Runs the upload/append streaming loop: connect the data channel, send
/// `TRANSFER_CHUNK_SIZE`-byte slices of the source until it is exhausted,
/// honoring pause/cancel between slices, then close the data channel to
/// signal end-of-file.
fn run_upload(
    transfer: &Transfer,
    data: &Mutex<DataChannel>,
    timeout: Duration,
    local_path: Option<&std::path::Path>,
    buffer: Option<Vec<u8>>,
    offset: u64,
    progress: &Option<ProgressCallback>,
) -> Result<TransferPayload, TransferError> {
    {
        let mut data = data.lock().unwrap();
        data.connect(timeout)?;
    }

    let source = load_source(local_path, buffer, offset)?;

    let mut position = 0usize;
    loop {
        if transfer.is_cancelled() {
            break;
        }
        transfer.pause_gate.wait_if_paused();
        if transfer.is_cancelled() {
            break;
        }
        if position >= source.len() {
            break;
        }
        let end = (position + TRANSFER_CHUNK_SIZE).min(source.len());
        let chunk = &source[position..end];
        {
            let mut data = data.lock().unwrap();
            data.send(chunk)?;
        }
        position = end;
        transfer.add_bytes(chunk.len() as u64, progress);
    }

    data.lock().unwrap().close();

    if transfer.is_cancelled() {
        Err(TransferError::Cancelled)
    } else {
        Ok(TransferPayload::Reply(Reply {
            code: 0,
            message: String::new(),
            lines: vec![],
        }))
    }
}

fn load_source(
    local_path: Option<&std::path::Path>,
    buffer: Option<Vec<u8>>,
    offset: u64,
) -> Result<Vec<u8>, TransferError> {
    if let Some(buffer) = buffer {
        return Ok(buffer[offset.min(buffer.len() as u64) as usize..].to_vec());
    }
    if let Some(path) = local_path {
        let mut file = File::open(path)?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        return Ok(data);
    }
    Err(TransferError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        "no buffer or local_path supplied for upload/append",
    )))
}

/// Reads the trailing final reply after the data channel has closed. When
/// the transfer was cancelled, the first reply from an urgent ABOR may be
/// a non-success acknowledgement (426) that must be followed by a second
/// read (226) before the control channel is back in sync.
fn read_trailing_reply(control: &ControlChannel, transfer: &Transfer) -> Result<Reply, FtpError> {
    let first = control.recv_reply()?;
    if transfer.is_cancelled() && !first.is_success() {
        control.recv_reply()
    } else {
        Ok(first)
    }
}

fn reconcile_outcome(
    transfer: &Transfer,
    streaming_result: Result<TransferPayload, TransferError>,
    final_reply: Result<Reply, FtpError>,
) -> TransferOutcome {
    if transfer.is_cancelled() {
        return TransferOutcome::Cancelled;
    }

    let payload = match streaming_result {
        Ok(payload) => payload,
        Err(TransferError::Cancelled) => return TransferOutcome::Cancelled,
        Err(error) => return TransferOutcome::Failed(error.to_string()),
    };

    match final_reply {
        Ok(reply) if reply.is_success() => match payload {
            TransferPayload::Reply(_) => TransferOutcome::Completed(TransferPayload::Reply(reply)),
            other => TransferOutcome::Completed(other),
        },
        Ok(reply) => TransferOutcome::Failed(TransferError::ServerReply(reply).to_string()),
        Err(error) => TransferOutcome::Failed(error.to_string()),
    }
}
