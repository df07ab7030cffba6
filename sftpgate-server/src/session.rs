//! The session state machine and concurrency core.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::Result;
use sftpgate_proto::{
    read_packet, write_packet, FileAttrs, NameEntry, Packet, ATTR_ACMODTIME, ATTR_PERMISSIONS,
    ATTR_SIZE, FXF_APPEND, FXF_CREAT, FXF_EXCL, FXF_READ, FXF_TRUNC, FXF_WRITE, FX_EOF,
    FX_FAILURE, FX_NO_SUCH_FILE, FX_OK, FX_OP_UNSUPPORTED, FX_PERMISSION_DENIED,
    PROTOCOL_VERSION, S_IFDIR, S_IFREG,
};
use sftpgate_vfs::{AccessMode, FileInfo, OpenFlags, Vfs, VfsError, VfsFile};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::longname::long_name;
use crate::paths::clean_path;

const CHANNEL_DEPTH: usize = 16;
const READDIR_BATCH: i64 = 64;
const MAX_READ_LEN: u32 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Log every decoded request and emitted response.
    pub debug: bool,
    /// Admission threshold for new file handles.
    pub max_files: usize,
    /// When false the VFS is wrapped in the read-only policy.
    pub write_access: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            debug: false,
            max_files: 64,
            write_access: true,
        }
    }
}

/// Single-shot shutdown signal, observable by every session task.
#[derive(Clone)]
struct Closed {
    tx: Arc<watch::Sender<bool>>,
}

impl Closed {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Closed { tx: Arc::new(tx) }
    }

    fn fire(&self) {
        self.tx.send_replace(true);
    }

    fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Posts response packets to the outbox, giving up once the session is
/// shutting down so no task can block forever on a full queue.
#[derive(Clone)]
struct Responder {
    outbox: mpsc::Sender<Packet>,
    closed: Closed,
}

impl Responder {
    async fn send(&self, packet: Packet) {
        tokio::select! {
            _ = self.closed.wait() => {}
            _ = self.outbox.send(packet) => {}
        }
    }

    async fn ok(&self, id: u32) {
        self.send(Packet::status(id, FX_OK, "")).await;
    }

    async fn failure(&self, id: u32, msg: &str) {
        self.send(Packet::status(id, FX_FAILURE, msg)).await;
    }

    async fn unsupported(&self, id: u32) {
        self.send(Packet::status(id, FX_OP_UNSUPPORTED, "unsupported operation"))
            .await;
    }

    /// Map a backend error to its status code; anything without a known
    /// kind becomes FX_FAILURE and the raw error is logged.
    async fn error(&self, id: u32, err: &VfsError) {
        let (code, msg) = match err {
            VfsError::Eof => (FX_EOF, err.to_string()),
            VfsError::NotFound => (FX_NO_SUCH_FILE, err.to_string()),
            VfsError::PermissionDenied => (FX_PERMISSION_DENIED, err.to_string()),
            VfsError::Unsupported => (FX_OP_UNSUPPORTED, err.to_string()),
            other => {
                warn!(error = %other, "unhandled backend error");
                (FX_FAILURE, "error".to_owned())
            }
        };
        self.send(Packet::status(id, code, msg)).await;
    }
}

/// Serve one SFTP session over the given stream halves.
///
/// Returns once the peer disconnects, the transport fails, or the codec
/// hits a fatal protocol error; per-request backend errors are reported to
/// the client in-band and do not end the session.
pub async fn serve<R, W>(
    options: SessionOptions,
    vfs: Arc<dyn Vfs>,
    input: R,
    output: W,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let closed = Closed::new();
    let (inbox_tx, inbox_rx) = mpsc::channel(CHANNEL_DEPTH);
    let (outbox_tx, outbox_rx) = mpsc::channel(CHANNEL_DEPTH);

    let vfs = if options.write_access {
        vfs
    } else {
        sftpgate_vfs::read_only(vfs)
    };

    let reader = tokio::spawn(read_loop(input, inbox_tx, closed.clone(), options.debug));
    let writer = tokio::spawn(write_loop(output, outbox_rx, closed.clone(), options.debug));

    let dispatcher = Dispatcher {
        options,
        vfs,
        handles: HashMap::new(),
        next_handle_id: 0,
        responder: Responder {
            outbox: outbox_tx,
            closed: closed.clone(),
        },
        closed,
    };
    let dispatch = tokio::spawn(dispatcher.run(inbox_rx));

    let (reader, writer, dispatch) = tokio::join!(reader, writer, dispatch);
    reader?;
    writer?;
    dispatch?;
    Ok(())
}

async fn read_loop<R>(mut input: R, inbox: mpsc::Sender<Packet>, closed: Closed, debug: bool)
where
    R: AsyncRead + Unpin,
{
    loop {
        let packet = match read_packet(&mut input).await {
            Ok(packet) => packet,
            Err(err) => {
                if debug {
                    debug!(error = %err, "reading packet failed");
                }
                break;
            }
        };
        if debug {
            debug!(packet = %packet.type_name(), id = ?packet.request_id(), "got packet");
        }
        let delivered = tokio::select! {
            _ = closed.wait() => false,
            sent = inbox.send(packet) => sent.is_ok(),
        };
        if !delivered {
            break;
        }
    }
    closed.fire();
}

async fn write_loop<W>(mut output: W, mut outbox: mpsc::Receiver<Packet>, closed: Closed, debug: bool)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let packet = tokio::select! {
            _ = closed.wait() => break,
            packet = outbox.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
        };
        if debug {
            debug!(packet = %packet.type_name(), id = ?packet.request_id(), "sending response");
        }
        if let Err(err) = write_packet(&mut output, &packet).await {
            warn!(error = %err, "writing response failed");
            break;
        }
    }
    closed.fire();
}

/// Per-handle state owned by the dispatcher.
struct HandleEntry {
    queue: mpsc::Sender<Packet>,
    worker: JoinHandle<()>,
    is_dir: bool,
}

/// Routes each request either straight to the VFS (path-scoped operations)
/// or onto the FIFO queue of the handle it targets. Exclusive owner of the
/// handle table.
struct Dispatcher {
    options: SessionOptions,
    vfs: Arc<dyn Vfs>,
    handles: HashMap<String, HandleEntry>,
    next_handle_id: u64,
    responder: Responder,
    closed: Closed,
}

impl Dispatcher {
    async fn run(mut self, mut inbox: mpsc::Receiver<Packet>) {
        loop {
            let packet = tokio::select! {
                _ = self.closed.wait() => break,
                packet = inbox.recv() => match packet {
                    Some(packet) => packet,
                    None => break,
                },
            };
            if !self.dispatch(packet).await {
                break;
            }
        }
        self.closed.fire();
        // Reclaim handles the client left open: dropping the queue ends the
        // worker, which discards anything still queued and closes the
        // backend object on its way out.
        for (_, entry) in self.handles.drain() {
            drop(entry.queue);
            let _ = entry.worker.await;
        }
    }

    /// Returns false when the session must stop.
    async fn dispatch(&mut self, packet: Packet) -> bool {
        match packet {
            Packet::Init { .. } => {
                self.responder
                    .send(Packet::Version {
                        version: PROTOCOL_VERSION,
                        extensions: vec![],
                    })
                    .await;
            }
            Packet::Stat { id, path } | Packet::Lstat { id, path } => {
                self.stat_path(id, &path).await;
            }
            Packet::RealPath { id, path } => self.realpath(id, &path).await,
            Packet::Remove { id, filename } => self.remove(id, &filename, false).await,
            Packet::RmDir { id, path } => self.remove(id, &path, true).await,
            Packet::MkDir { id, path, attrs } => self.mkdir(id, &path, &attrs).await,
            Packet::Rename {
                id,
                oldpath,
                newpath,
            } => match self.vfs.rename(&oldpath, &newpath).await {
                Ok(()) => self.responder.ok(id).await,
                Err(err) => self.responder.error(id, &err).await,
            },
            Packet::SetStat { id, path, attrs } => self.setstat(id, &path, &attrs).await,
            Packet::ReadLink { id, .. } | Packet::Symlink { id, .. } => {
                self.responder.unsupported(id).await;
            }
            Packet::Open {
                id,
                path,
                pflags,
                attrs,
            } => self.open(id, &path, pflags, &attrs).await,
            Packet::OpenDir { id, path } => self.opendir(id, &path).await,
            Packet::Close { id, handle } => self.close(id, handle).await,
            packet @ (Packet::Read { .. }
            | Packet::Write { .. }
            | Packet::Fstat { .. }
            | Packet::ReadDir { .. }
            | Packet::FSetStat { .. }) => self.forward(packet).await,
            other => {
                warn!(packet = %other.type_name(), "unexpected packet");
                return false;
            }
        }
        true
    }

    async fn stat_path(&self, id: u32, path: &str) {
        match self.vfs.stat(path).await {
            Ok(info) => {
                self.responder
                    .send(Packet::Attrs {
                        id,
                        attrs: attrs_from_info(&info),
                    })
                    .await;
            }
            Err(err) => self.responder.error(id, &err).await,
        }
    }

    async fn realpath(&self, id: u32, path: &str) {
        let mut path = path.to_owned();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        let path = clean_path(&path);
        self.responder
            .send(Packet::Name {
                id,
                entries: vec![NameEntry {
                    name: path.clone(),
                    long_name: path,
                    attrs: FileAttrs::default(),
                }],
            })
            .await;
    }

    /// REMOVE refuses directories, RMDIR refuses non-directories; both
    /// check before the backend `remove` is ever called.
    async fn remove(&self, id: u32, path: &str, want_dir: bool) {
        let info = match self.vfs.stat(path).await {
            Ok(info) => info,
            Err(err) => return self.responder.error(id, &err).await,
        };
        if info.is_dir != want_dir {
            return self.responder.unsupported(id).await;
        }
        match self.vfs.remove(path).await {
            Ok(()) => self.responder.ok(id).await,
            Err(err) => self.responder.error(id, &err).await,
        }
    }

    async fn mkdir(&self, id: u32, path: &str, attrs: &FileAttrs) {
        match self.vfs.mkdir(path, requested_mode(attrs)).await {
            Ok(()) => self.responder.ok(id).await,
            Err(err) => self.responder.error(id, &err).await,
        }
    }

    async fn setstat(&self, id: u32, path: &str, attrs: &FileAttrs) {
        if attrs.flags & ATTR_PERMISSIONS != 0 {
            if let Err(err) = self.vfs.chmod(path, attrs.mode & 0o777).await {
                return self.responder.error(id, &err).await;
            }
        }
        if attrs.flags & (ATTR_SIZE | ATTR_ACMODTIME) != 0 {
            return self.responder.unsupported(id).await;
        }
        self.responder.ok(id).await;
    }

    async fn open(&mut self, id: u32, path: &str, pflags: u32, attrs: &FileAttrs) {
        if self.handles.len() >= self.options.max_files {
            return self.responder.failure(id, "too many open files").await;
        }

        let access = match (pflags & FXF_READ != 0, pflags & FXF_WRITE != 0) {
            (true, true) => AccessMode::ReadWrite,
            (false, true) => AccessMode::Write,
            _ => AccessMode::Read,
        };
        let flags = OpenFlags {
            access,
            append: pflags & FXF_APPEND != 0,
            create: pflags & FXF_CREAT != 0,
            truncate: pflags & FXF_TRUNC != 0,
            exclusive: pflags & FXF_EXCL != 0,
        };
        let leftover =
            pflags & !(FXF_READ | FXF_WRITE | FXF_APPEND | FXF_CREAT | FXF_TRUNC | FXF_EXCL);
        if leftover != 0 {
            return self.responder.unsupported(id).await;
        }

        match self.vfs.open_file(path, flags, requested_mode(attrs)).await {
            Ok(file) => self.install_handle(id, file, false).await,
            Err(err) => self.responder.error(id, &err).await,
        }
    }

    async fn opendir(&mut self, id: u32, path: &str) {
        if self.handles.len() >= self.options.max_files {
            return self.responder.failure(id, "too many open files").await;
        }
        match self.vfs.open(path).await {
            Ok(file) => self.install_handle(id, file, true).await,
            Err(err) => self.responder.error(id, &err).await,
        }
    }

    async fn install_handle(&mut self, id: u32, file: Box<dyn VfsFile>, is_dir: bool) {
        let handle_id = self.next_handle_id.to_string();
        self.next_handle_id += 1;

        // Each handle gets its own worker and request queue: operations on
        // one file run in arrival order (some backends require in-order
        // writes) while separate handles proceed concurrently.
        let (queue_tx, queue_rx) = mpsc::channel(1);
        let worker = tokio::spawn(handle_worker(file, queue_rx, self.responder.clone()));

        if self.options.debug {
            debug!(handle = %handle_id, is_dir, "handle opened");
        }
        self.handles.insert(
            handle_id.clone(),
            HandleEntry {
                queue: queue_tx,
                worker,
                is_dir,
            },
        );
        self.responder
            .send(Packet::Handle {
                id,
                handle: handle_id,
            })
            .await;
    }

    /// The entry leaves the table before the close is enqueued, so no new
    /// request can be routed to a handle that is tearing down.
    async fn close(&mut self, id: u32, handle: String) {
        let Some(entry) = self.handles.remove(&handle) else {
            return self.responder.failure(id, "invalid handle").await;
        };
        if self.options.debug {
            debug!(handle = %handle, is_dir = entry.is_dir, "handle closed");
        }
        tokio::select! {
            _ = self.closed.wait() => {}
            _ = entry.queue.send(Packet::Close { id, handle }) => {}
        }
    }

    async fn forward(&mut self, packet: Packet) {
        let id = packet.request_id().unwrap_or(0);
        let Some(handle) = packet_handle(&packet) else {
            return;
        };
        match self.handles.get(handle) {
            Some(entry) => {
                let delivered = tokio::select! {
                    _ = self.closed.wait() => return,
                    sent = entry.queue.send(packet) => sent.is_ok(),
                };
                if !delivered {
                    self.responder.failure(id, "invalid handle").await;
                }
            }
            None => self.responder.failure(id, "invalid handle").await,
        }
    }
}

fn packet_handle(packet: &Packet) -> Option<&str> {
    match packet {
        Packet::Read { handle, .. }
        | Packet::Write { handle, .. }
        | Packet::Fstat { handle, .. }
        | Packet::ReadDir { handle, .. }
        | Packet::FSetStat { handle, .. }
        | Packet::Close { handle, .. } => Some(handle),
        _ => None,
    }
}

/// Drains one handle's queue in FIFO order. Exits after processing CLOSE,
/// or when the queue is dropped at session shutdown (the backend object is
/// closed either way).
async fn handle_worker(
    mut file: Box<dyn VfsFile>,
    mut queue: mpsc::Receiver<Packet>,
    responder: Responder,
) {
    while let Some(packet) = queue.recv().await {
        // Shutdown can race a request already sitting in the queue. An
        // operation in progress may complete, but one that has not started
        // must not touch the backend.
        if responder.closed.is_fired() {
            break;
        }
        match packet {
            Packet::Fstat { id, .. } => match file.stat().await {
                Ok(info) => {
                    responder
                        .send(Packet::Attrs {
                            id,
                            attrs: attrs_from_info(&info),
                        })
                        .await;
                }
                Err(err) => responder.error(id, &err).await,
            },
            Packet::Read {
                id, offset, len, ..
            } => {
                if len > MAX_READ_LEN {
                    responder.failure(id, "bad read").await;
                    continue;
                }
                let mut buf = vec![0u8; len as usize];
                match file.read_at(&mut buf, offset).await {
                    Ok(n) => {
                        buf.truncate(n);
                        responder.send(Packet::Data { id, data: buf }).await;
                    }
                    Err(err) => responder.error(id, &err).await,
                }
            }
            Packet::Write {
                id, offset, data, ..
            } => match file.write_at(&data, offset).await {
                Ok(_) => responder.ok(id).await,
                Err(err) => responder.error(id, &err).await,
            },
            Packet::ReadDir { id, .. } => match file.readdir(READDIR_BATCH).await {
                Ok(infos) => {
                    let entries = infos
                        .iter()
                        .map(|info| NameEntry {
                            name: info.name.clone(),
                            long_name: long_name(info),
                            attrs: attrs_from_info(info),
                        })
                        .collect();
                    responder.send(Packet::Name { id, entries }).await;
                }
                Err(err) => responder.error(id, &err).await,
            },
            Packet::FSetStat { id, attrs, .. } => {
                if attrs.flags & ATTR_PERMISSIONS != 0 {
                    if let Err(err) = file.chmod(attrs.mode & 0o777).await {
                        responder.error(id, &err).await;
                        continue;
                    }
                }
                if attrs.flags & (ATTR_SIZE | ATTR_ACMODTIME) != 0 {
                    responder.unsupported(id).await;
                    continue;
                }
                responder.ok(id).await;
            }
            Packet::Close { id, .. } => {
                match file.close().await {
                    Ok(()) => responder.ok(id).await,
                    Err(err) => responder.error(id, &err).await,
                }
                return;
            }
            other => debug!(packet = %other.type_name(), "unsupported file request"),
        }
    }
    // Queue dropped without a CLOSE; reclaim the backend object.
    let _ = file.close().await;
}

fn requested_mode(attrs: &FileAttrs) -> u32 {
    if attrs.flags & ATTR_PERMISSIONS != 0 {
        attrs.mode & 0o777
    } else {
        0o755
    }
}

fn attrs_from_info(info: &FileInfo) -> FileAttrs {
    let mtime = info
        .modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);
    FileAttrs {
        flags: ATTR_SIZE | ATTR_PERMISSIONS | ATTR_ACMODTIME,
        size: info.size,
        mode: (info.mode & 0o777) | if info.is_dir { S_IFDIR } else { S_IFREG },
        atime: mtime,
        mtime,
        ..Default::default()
    }
}
