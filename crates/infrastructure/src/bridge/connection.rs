//! Worker connection and the bridge that owns it.
//!
//! A [`Bridge`] owns at most one live connection. Each connection has its
//! own [`CorrelationTable`], a read loop turning the worker's output into
//! settlements, and a writer task that serializes outbound frames so
//! concurrent callers never interleave partial lines. Replacing the
//! connection drains the old table; call ids keep increasing across
//! generations.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use postwhale_application::{ActionInvoker, BridgeError};
use postwhale_domain::{CallEnvelope, CallId};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::correlation::{CallOutcome, CorrelationTable};
use crate::codec::{DEFAULT_MAX_FRAME_BYTES, FrameCodec};

/// Default per-call deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

const READ_CHUNK: usize = 8 * 1024;

/// Tunables of a [`Bridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Deadline applied by [`ActionInvoker::invoke`].
    pub call_timeout: Duration,
    /// Largest accepted inbound frame.
    pub max_frame_bytes: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// How to launch the worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    /// Executable.
    pub program: PathBuf,
    /// Arguments.
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// Command without arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Errors starting a worker.
#[derive(Debug, Error)]
pub enum StartError {
    /// The process could not be spawned.
    #[error("failed to spawn worker {program}: {source}")]
    Spawn {
        /// Executable that failed.
        program: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A standard stream was not piped.
    #[error("worker {0} is not piped")]
    MissingPipe(&'static str),

    /// `restart` was called before any `start`.
    #[error("no worker command to restart")]
    NoWorkerCommand,
}

struct OutboundFrame {
    call_id: CallId,
    bytes: Vec<u8>,
}

/// One worker generation.
struct Connection {
    generation: u64,
    table: Arc<CorrelationTable>,
    frames: mpsc::UnboundedSender<OutboundFrame>,
    shutdown: CancellationToken,
}

impl Connection {
    fn close(&self) -> usize {
        self.shutdown.cancel();
        self.table.drain_all(&BridgeError::WorkerTerminated)
    }
}

/// Correlates calls to a worker process with its responses.
pub struct Bridge {
    options: BridgeOptions,
    ids: AtomicU64,
    generations: AtomicU64,
    current: Mutex<Option<Arc<Connection>>>,
    command: Mutex<Option<WorkerCommand>>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("options", &self.options)
            .field("generation", &self.generation())
            .field("pending", &self.pending_calls())
            .field("next_deadline", &self.next_deadline())
            .finish_non_exhaustive()
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeOptions::default())
    }
}

impl Bridge {
    /// Creates a bridge with no worker attached.
    #[must_use]
    pub const fn new(options: BridgeOptions) -> Self {
        Self {
            options,
            ids: AtomicU64::new(0),
            generations: AtomicU64::new(0),
            current: Mutex::new(None),
            command: Mutex::new(None),
        }
    }

    /// Bridge options.
    #[must_use]
    pub const fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Spawns the worker and attaches to its standard streams.
    ///
    /// The process is killed when its connection is shut down or replaced.
    /// Returns the new generation.
    ///
    /// # Errors
    ///
    /// Returns [`StartError`] if the process cannot be spawned.
    pub fn start(&self, command: &WorkerCommand) -> Result<u64, StartError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StartError::Spawn {
                program: command.program.display().to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(StartError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(StartError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(StartError::MissingPipe("stderr"))?;

        let connection = self.connect(stdout, stdin);
        tokio::spawn(forward_stderr(stderr, connection.generation));
        tokio::spawn(watch_exit(
            child,
            Arc::clone(&connection.table),
            connection.shutdown.clone(),
            connection.generation,
        ));

        tracing::info!(
            program = %command.program.display(),
            generation = connection.generation,
            "Worker started"
        );
        *self.command.lock() = Some(command.clone());
        Ok(connection.generation)
    }

    /// Attaches to an already running worker through arbitrary streams.
    ///
    /// End of `reader` is treated as worker exit. Returns the new
    /// generation.
    pub fn attach<R, W>(&self, reader: R, writer: W) -> u64
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.connect(reader, writer).generation
    }

    fn connect<R, W>(&self, reader: R, writer: W) -> Arc<Connection>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let table = CorrelationTable::new();
        let shutdown = CancellationToken::new();
        let (frames, outbound) = mpsc::unbounded_channel();

        tokio::spawn(read_loop(
            reader,
            FrameCodec::with_max_frame_len(self.options.max_frame_bytes),
            Arc::clone(&table),
            shutdown.clone(),
            generation,
        ));
        tokio::spawn(write_loop(
            writer,
            outbound,
            Arc::clone(&table),
            shutdown.clone(),
        ));

        let connection = Arc::new(Connection {
            generation,
            table,
            frames,
            shutdown,
        });

        let previous = self.current.lock().replace(Arc::clone(&connection));
        if let Some(previous) = previous {
            let drained = previous.close();
            tracing::info!(
                generation = previous.generation,
                pending = drained,
                "Replaced worker connection"
            );
        }

        connection
    }

    /// Shuts the current worker down and starts the last started command
    /// again with an empty table.
    ///
    /// # Errors
    ///
    /// Returns [`StartError::NoWorkerCommand`] if the bridge was never
    /// started from a command, or the spawn error.
    pub fn restart(&self) -> Result<u64, StartError> {
        let command = self.command.lock().clone().ok_or(StartError::NoWorkerCommand)?;
        self.shutdown();
        self.start(&command)
    }

    /// Detaches the current worker, killing it if the bridge spawned it.
    ///
    /// Every pending call fails with [`BridgeError::WorkerTerminated`].
    /// Returns how many calls were pending.
    pub fn shutdown(&self) -> usize {
        let Some(connection) = self.current.lock().take() else {
            return 0;
        };
        let drained = connection.close();
        tracing::info!(generation = connection.generation, pending = drained, "Worker shut down");
        drained
    }

    /// Generation of the current connection; 0 before the first attach.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.current
            .lock()
            .as_ref()
            .map_or(0, |connection| connection.generation)
    }

    /// Calls awaiting a response on the current connection.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.current
            .lock()
            .as_ref()
            .map_or(0, |connection| connection.table.len())
    }

    /// Earliest deadline among calls pending on the current connection.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.current
            .lock()
            .as_ref()
            .and_then(|connection| connection.table.next_deadline())
    }

    /// Returns true while a connection is attached and its worker is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|connection| !connection.table.is_closed())
    }

    /// Sends one call and waits for its settlement.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::RequestTimeout`] when `timeout` elapses first,
    /// [`BridgeError::WorkerWriteFailure`] if the frame cannot be written,
    /// [`BridgeError::WorkerTerminated`] if no worker is attached or it
    /// exits, and [`BridgeError::RemoteError`] with the worker's message.
    pub async fn invoke_with_timeout(
        &self,
        action: &str,
        data: Value,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let connection = self
            .current
            .lock()
            .clone()
            .ok_or(BridgeError::WorkerTerminated)?;

        let call_id = CallId::new(self.ids.fetch_add(1, Ordering::Relaxed) + 1);
        let (handle, settled) = oneshot::channel::<CallOutcome>();
        connection.table.register(call_id, handle, timeout)?;

        tracing::debug!(
            %call_id,
            action,
            generation = connection.generation,
            pending = connection.table.len(),
            "Sending call"
        );

        let queued = FrameCodec::encode(&CallEnvelope::new(call_id, action, data))
            .map_err(|error| error.to_string())
            .and_then(|bytes| {
                connection
                    .frames
                    .send(OutboundFrame { call_id, bytes })
                    .map_err(|_| "worker input is closed".to_string())
            });
        if let Err(message) = queued {
            tracing::warn!(%call_id, action, error = %message, "Failed to queue call");
            connection
                .table
                .resolve(call_id, Err(BridgeError::WorkerWriteFailure(message)));
        }
        drop(connection);

        settled.await.unwrap_or(Err(BridgeError::WorkerTerminated))
    }
}

impl ActionInvoker for Bridge {
    async fn invoke(&self, action: &str, data: Value) -> Result<Value, BridgeError> {
        self.invoke_with_timeout(action, data, self.options.call_timeout)
            .await
    }
}

async fn read_loop<R>(
    mut reader: R,
    mut codec: FrameCodec,
    table: Arc<CorrelationTable>,
    shutdown: CancellationToken,
    generation: u64,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0_u8; READ_CHUNK];

    loop {
        let read = tokio::select! {
            () = shutdown.cancelled() => break,
            read = reader.read(&mut chunk) => read,
        };

        match read {
            Ok(0) => {
                tracing::info!(generation, "Worker output closed");
                break;
            }
            Ok(n) => {
                for envelope in codec.feed(&chunk[..n]) {
                    let call_id = envelope.call_id;
                    let outcome = envelope.into_outcome().map_err(BridgeError::RemoteError);
                    table.resolve(call_id, outcome);
                }
            }
            Err(error) => {
                tracing::warn!(generation, %error, "Failed to read worker output");
                break;
            }
        }
    }

    let drained = table.drain_all(&BridgeError::WorkerTerminated);
    if drained > 0 {
        tracing::warn!(generation, pending = drained, "Worker gone with calls pending");
    }
}

// A failed write may leave a torn line on the stream, so the connection is
// closed instead of writing further frames after it.
async fn write_loop<W>(
    mut writer: W,
    mut frames: mpsc::UnboundedReceiver<OutboundFrame>,
    table: Arc<CorrelationTable>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let written = async {
            writer.write_all(&frame.bytes).await?;
            writer.flush().await
        }
        .await;

        if let Err(error) = written {
            tracing::warn!(call_id = %frame.call_id, %error, "Failed to write call to worker");
            table.resolve(
                frame.call_id,
                Err(BridgeError::WorkerWriteFailure(error.to_string())),
            );
            shutdown.cancel();
            let drained = table.drain_all(&BridgeError::WorkerTerminated);
            tracing::warn!(pending = drained, "Closed worker connection after write failure");
            break;
        }
    }
}

// Drains until EOF; closing the pipe early gets the worker killed by SIGPIPE.
async fn forward_stderr(stderr: ChildStderr, generation: u64) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end_matches(['\n', '\r']);
                tracing::warn!(target: "postwhale::worker", generation, "{text}");
            }
            Err(error) => {
                tracing::warn!(generation, %error, "Failed to read worker stderr");
                break;
            }
        }
    }
}

async fn watch_exit(
    mut child: Child,
    table: Arc<CorrelationTable>,
    shutdown: CancellationToken,
    generation: u64,
) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => tracing::info!(generation, %status, "Worker exited"),
            Err(error) => tracing::warn!(generation, %error, "Failed to wait for worker"),
        },
        () = shutdown.cancelled() => {
            if let Err(error) = child.kill().await {
                tracing::debug!(generation, %error, "Worker already gone");
            }
        }
    }

    table.drain_all(&BridgeError::WorkerTerminated);
}
