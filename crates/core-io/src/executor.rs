//! The asynchronous I/O executor.
//!
//! One dedicated thread owns the projection reader and the projection-stack
//! writers and performs every file operation, strictly in request order.
//! Requesters identify each operation with a token and must call
//! [`IoExecutor::wait_for_buffer_release`] before touching the buffer again:
//! reads move the owned buffer into the executor and reclaim it at release,
//! writes share the buffer behind an `Arc` so computation continues
//! immediately.
//!
//! The first error is stored and re-surfaced on every subsequent wait,
//! possibly on a thread unrelated to the failing request, which is fine
//! because the only goal after any I/O error is an orderly stop. Requests
//! that fail still complete their token so that no waiter deadlocks.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use core_geom::Projection;
use crossbeam_channel::{unbounded, Sender};
use tracing::{debug, error, info};

use crate::error::IoError;
use crate::reader::ProjectionReader;
use crate::writer::SliceWriter;

/// Identifies one I/O request; allocated by the requester, unique among
/// in-flight requests.
pub type IoToken = u64;

const CLOSE_TOKEN: IoToken = u64::MAX;

/// Which output stream a write request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterId {
    Attenuation,
    Filtered,
}

enum Request {
    Read {
        image: Box<Projection>,
        token: IoToken,
    },
    Write {
        id: WriterId,
        image: Arc<Projection>,
        token: IoToken,
    },
    /// No-op marker; completes once everything queued before it has run.
    Flush {
        token: IoToken,
    },
    CloseAll {
        token: IoToken,
    },
}

#[derive(Default)]
struct CompletionState {
    completed: HashMap<IoToken, Option<Box<Projection>>>,
    error: Option<String>,
}

struct Shared {
    state: Mutex<CompletionState>,
    condvar: Condvar,
}

pub struct IoExecutor {
    tx: Option<Sender<Request>>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    flush_tokens: std::sync::atomic::AtomicU64,
}

// Tokens above this range are reserved for flush markers and shutdown.
const FLUSH_TOKEN_BASE: IoToken = u64::MAX - 0x1_0000;

impl IoExecutor {
    /// Launches the executor thread. It takes ownership of whichever reader
    /// and writers this pipeline uses; absent ones stay `None`.
    pub fn spawn(
        reader: Option<ProjectionReader>,
        attenuation_writer: Option<SliceWriter>,
        filtered_writer: Option<SliceWriter>,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(CompletionState::default()),
            condvar: Condvar::new(),
        });
        let (tx, rx) = unbounded::<Request>();
        let thread_shared = Arc::clone(&shared);

        let handle = std::thread::Builder::new()
            .name("io-executor".into())
            .spawn(move || {
                let mut reader = reader;
                let mut attenuation_writer = attenuation_writer;
                let mut filtered_writer = filtered_writer;
                for request in rx {
                    match request {
                        Request::Read { mut image, token } => {
                            let result = reader
                                .as_mut()
                                .expect("read request without a reader")
                                .read_projection(&mut image);
                            complete(&thread_shared, token, Some(image), result);
                        }
                        Request::Write { id, image, token } => {
                            let writer = match id {
                                WriterId::Attenuation => attenuation_writer.as_mut(),
                                WriterId::Filtered => filtered_writer.as_mut(),
                            };
                            let result = writer
                                .expect("write request without a writer")
                                .write_slice(image.view());
                            drop(image);
                            complete(&thread_shared, token, None, result);
                        }
                        Request::Flush { token } => {
                            complete(&thread_shared, token, None, Ok(()));
                        }
                        Request::CloseAll { token } => {
                            if let Some(r) = reader.as_mut() {
                                r.close();
                            }
                            let mut result = Ok(());
                            for writer in [attenuation_writer.as_mut(), filtered_writer.as_mut()]
                                .into_iter()
                                .flatten()
                            {
                                if let Err(e) = writer.close() {
                                    result = Err(e);
                                }
                            }
                            complete(&thread_shared, token, None, result);
                        }
                    }
                }
                debug!(target: "io", "executor thread exiting");
            })
            .expect("failed to spawn io-executor thread");

        info!(target: "io", "I/O executor started");
        Self {
            tx: Some(tx),
            shared,
            handle: Some(handle),
            flush_tokens: std::sync::atomic::AtomicU64::new(FLUSH_TOKEN_BASE),
        }
    }

    /// Queues a read of the next projection into `image`. Reclaim the
    /// buffer with `wait_for_buffer_release(token)`.
    pub fn request_read(&self, image: Box<Projection>, token: IoToken) -> Result<(), IoError> {
        self.send(Request::Read { image, token })
    }

    /// Queues a slice write. The `Arc` keeps the buffer readable elsewhere
    /// while the write is in flight; wait on the token before mutating it.
    pub fn request_write(
        &self,
        id: WriterId,
        image: Arc<Projection>,
        token: IoToken,
    ) -> Result<(), IoError> {
        self.send(Request::Write { id, image, token })
    }

    fn send(&self, request: Request) -> Result<(), IoError> {
        self.tx
            .as_ref()
            .ok_or(IoError::ExecutorClosed)?
            .send(request)
            .map_err(|_| IoError::ExecutorClosed)
    }

    /// Blocks until the request identified by `token` completes. Returns
    /// the buffer for reads, `None` for writes. Any stored executor error
    /// is returned instead, here and on every later wait.
    pub fn wait_for_buffer_release(&self, token: IoToken) -> Result<Option<Box<Projection>>, IoError> {
        let mut state = self.shared.state.lock().expect("io completion lock poisoned");
        loop {
            if let Some(message) = &state.error {
                return Err(IoError::AsyncFailure(message.clone()));
            }
            if let Some(image) = state.completed.remove(&token) {
                return Ok(image);
            }
            state = self
                .shared
                .condvar
                .wait(state)
                .expect("io completion lock poisoned");
        }
    }

    /// Returns once every request issued so far has executed. Write
    /// requesters must call this (or `finish`) before dropping the
    /// executor, otherwise queued writes may never happen.
    pub fn wait_for_completion(&self) -> Result<(), IoError> {
        let token = self
            .flush_tokens
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.send(Request::Flush { token })?;
        self.wait_for_buffer_release(token).map(|_| ())
    }

    /// Closes the reader and finalises every writer, then joins the
    /// executor thread. Must be called for the output metadata to land on
    /// disk.
    pub fn finish(mut self) -> Result<(), IoError> {
        self.send(Request::CloseAll { token: CLOSE_TOKEN })?;
        let result = self.wait_for_buffer_release(CLOSE_TOKEN).map(|_| ());
        self.tx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        result
    }
}

impl Drop for IoExecutor {
    fn drop(&mut self) {
        // Abrupt stop: close the queue and join. Normal shutdown goes
        // through `finish`, which has already taken the handle.
        self.tx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn complete(
    shared: &Shared,
    token: IoToken,
    image: Option<Box<Projection>>,
    result: Result<(), IoError>,
) {
    let mut state = shared.state.lock().expect("io completion lock poisoned");
    if let Err(e) = result {
        error!(target: "io", error = %e, "I/O request failed");
        // First error wins; later ones are dropped.
        state.error.get_or_insert_with(|| e.to_string());
    }
    state.completed.insert(token, image);
    shared.condvar.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_geom::{Dims2, Vec2f};
    use std::io::Write as _;
    use std::path::Path;

    fn write_dataset(dir: &Path, name: &str, frames: usize) {
        std::fs::write(
            dir.join(format!("{name}.mhd")),
            format!(
                "ObjectType = Image\nNDims = 3\nDimSize = 2 2 {frames}\n\
                 ElementType = MET_USHORT\nElementDataFile = {name}.raw\n"
            ),
        )
        .unwrap();
        let mut f = std::fs::File::create(dir.join(format!("{name}.raw"))).unwrap();
        for i in 0..frames {
            for _ in 0..4 {
                f.write_all(&(i as u16 * 10).to_le_bytes()).unwrap();
            }
        }
    }

    fn blank() -> Box<Projection> {
        Box::new(Projection::new(
            Dims2::new([2, 2]),
            Vec2f::ones(),
            Vec2f::zeros(),
        ))
    }

    #[test]
    fn reads_complete_in_request_order() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), "seq", 3);
        let mut reader = ProjectionReader::open(&dir.path().join("seq.mhd")).unwrap();
        reader.initialize().unwrap();

        let executor = IoExecutor::spawn(Some(reader), None, None);
        executor.request_read(blank(), 1).unwrap();
        executor.request_read(blank(), 2).unwrap();

        let first = executor.wait_for_buffer_release(1).unwrap().unwrap();
        let second = executor.wait_for_buffer_release(2).unwrap().unwrap();
        assert_eq!(first.at(0, 0), 0.0);
        assert_eq!(second.at(0, 0), 10.0);
        executor.finish().unwrap();
    }

    #[test]
    fn writes_share_the_buffer_and_finish_finalises() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("att.mhd");
        let mut writer = SliceWriter::create(&out, Dims2::new([2, 2]));
        writer.set_slice_geometry([1.0, 1.0], [0.0, 0.0]);
        writer.initialize().unwrap();

        let executor = IoExecutor::spawn(None, Some(writer), None);
        let image = Arc::new(Projection::from_vec(
            Dims2::new([2, 2]),
            Vec2f::ones(),
            Vec2f::zeros(),
            vec![1.0, 2.0, 3.0, 4.0],
        ));
        executor
            .request_write(WriterId::Attenuation, Arc::clone(&image), 7)
            .unwrap();
        executor.wait_for_completion().unwrap();
        assert!(executor.wait_for_buffer_release(7).unwrap().is_none());
        // The executor dropped its clone once the write completed.
        assert_eq!(Arc::strong_count(&image), 1);
        executor.finish().unwrap();

        let header = crate::meta::MetaHeader::read(&out).unwrap();
        assert_eq!(header.dim_size, vec![2, 2, 1]);
    }

    #[test]
    fn read_past_the_end_surfaces_an_error_on_wait() {
        let dir = tempfile::tempdir().unwrap();
        write_dataset(dir.path(), "short", 1);
        let mut reader = ProjectionReader::open(&dir.path().join("short.mhd")).unwrap();
        reader.initialize().unwrap();

        let executor = IoExecutor::spawn(Some(reader), None, None);
        executor.request_read(blank(), 1).unwrap();
        executor.request_read(blank(), 2).unwrap();
        let _ = executor.wait_for_buffer_release(1);
        assert!(matches!(
            executor.wait_for_buffer_release(2),
            Err(IoError::AsyncFailure(_))
        ));
    }
}
