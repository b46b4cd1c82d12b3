use std::io::Read;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::StreamError;

pub type InstanceId = Uuid;

/// Queue size for stream events; a full queue blocks the reader threads.
pub const STREAM_QUEUE_SIZE: usize = 256;

const READ_BUF_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Data(InstanceId, Vec<u8>),
    Exited(InstanceId, i32),
}

impl StreamEvent {
    pub fn instance_id(&self) -> InstanceId {
        match self {
            StreamEvent::Data(id, _) | StreamEvent::Exited(id, _) => *id,
        }
    }
}

/// One end of a spawned process: bytes out via [`StreamEvent`]s, bytes in
/// via `write`.
pub trait ByteStream: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<(), StreamError>;

    fn resize(&mut self, rows: u16, cols: u16) -> Result<(), StreamError>;

    /// Stop reading from the process until `resume`
    fn pause(&self);

    fn resume(&self);

    /// Kill the process and stop the reader. Safe to call twice.
    fn close(&mut self) -> Result<(), StreamError>;

    fn is_writable(&self) -> bool;
}

#[derive(Debug, Default)]
struct GateState {
    paused: bool,
    closed: bool,
}

/// Shared switch between a stream handle and its reader thread.
#[derive(Debug, Clone, Default)]
pub struct PauseGate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pause(&self) {
        self.state().paused = true;
    }

    pub fn resume(&self) {
        self.state().paused = false;
        self.inner.1.notify_all();
    }

    pub fn close(&self) {
        self.state().closed = true;
        self.inner.1.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Block while paused. Returns false once the gate is closed.
    pub fn wait_open(&self) -> bool {
        let mut state = self.state();
        while state.paused && !state.closed {
            state = self
                .inner
                .1
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        !state.closed
    }
}

#[derive(Debug)]
pub enum ReadEnd {
    Eof,
    Closed,
    Failed(std::io::Error),
}

/// Forward everything read from `reader` as `Data` events until EOF, an
/// error, the gate closing, or the receiver going away.
pub fn pump(
    id: InstanceId,
    reader: &mut dyn Read,
    tx: &mpsc::Sender<StreamEvent>,
    gate: &PauseGate,
) -> ReadEnd {
    let mut buf = [0u8; READ_BUF_SIZE];
    loop {
        if !gate.wait_open() {
            return ReadEnd::Closed;
        }
        match reader.read(&mut buf) {
            Ok(0) => return ReadEnd::Eof,
            Ok(n) => {
                if gate.is_closed() {
                    return ReadEnd::Closed;
                }
                if tx.blocking_send(StreamEvent::Data(id, buf[..n].to_vec())).is_err() {
                    return ReadEnd::Closed;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return ReadEnd::Failed(e),
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::pty::{SpawnRequest, StreamProvider};
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every call made through the stream seam.
    #[derive(Debug, Clone, Default)]
    pub struct Recorder {
        pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
        pub resizes: Arc<Mutex<Vec<(u16, u16)>>>,
        pub pauses: Arc<AtomicUsize>,
        pub resumes: Arc<AtomicUsize>,
        pub closes: Arc<AtomicUsize>,
    }

    impl Recorder {
        pub fn written(&self) -> Vec<u8> {
            self.writes.lock().unwrap().concat()
        }

        pub fn pause_count(&self) -> usize {
            self.pauses.load(Ordering::SeqCst)
        }

        pub fn resume_count(&self) -> usize {
            self.resumes.load(Ordering::SeqCst)
        }

        pub fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    pub struct MockStream {
        pub recorder: Recorder,
        pub writable: bool,
    }

    impl MockStream {
        pub fn new(writable: bool) -> (Self, Recorder) {
            let recorder = Recorder::default();
            (
                Self {
                    recorder: recorder.clone(),
                    writable,
                },
                recorder,
            )
        }
    }

    impl ByteStream for MockStream {
        fn write(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
            if !self.writable {
                return Err(StreamError::ReadOnly);
            }
            self.recorder.writes.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }

        fn resize(&mut self, rows: u16, cols: u16) -> Result<(), StreamError> {
            self.recorder.resizes.lock().unwrap().push((rows, cols));
            Ok(())
        }

        fn pause(&self) {
            self.recorder.pauses.fetch_add(1, Ordering::SeqCst);
        }

        fn resume(&self) {
            self.recorder.resumes.fetch_add(1, Ordering::SeqCst);
        }

        fn close(&mut self) -> Result<(), StreamError> {
            self.recorder.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn is_writable(&self) -> bool {
            self.writable
        }
    }

    /// Hands out mock streams and remembers every request.
    #[derive(Default)]
    pub struct MockProvider {
        pub requests: RefCell<Vec<SpawnRequest>>,
        pub recorders: RefCell<Vec<Recorder>>,
        pub fail: bool,
    }

    impl MockProvider {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn recorder(&self, index: usize) -> Recorder {
            self.recorders.borrow()[index].clone()
        }
    }

    impl StreamProvider for MockProvider {
        fn spawn(
            &self,
            _id: InstanceId,
            request: &SpawnRequest,
            _tx: mpsc::Sender<StreamEvent>,
        ) -> Result<Box<dyn ByteStream>, StreamError> {
            if self.fail {
                return Err(StreamError::spawn(request.command_line(), "no such file"));
            }
            self.requests.borrow_mut().push(request.clone());
            let (stream, recorder) = MockStream::new(request.kind.accepts_input());
            self.recorders.borrow_mut().push(recorder);
            Ok(Box::new(stream))
        }
    }

    /// Lets a test keep a handle on a provider it boxes into app state.
    impl StreamProvider for std::rc::Rc<MockProvider> {
        fn spawn(
            &self,
            id: InstanceId,
            request: &SpawnRequest,
            tx: mpsc::Sender<StreamEvent>,
        ) -> Result<Box<dyn ByteStream>, StreamError> {
            self.as_ref().spawn(id, request, tx)
        }
    }
}
