use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize, PtySystem};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::stream::{pump, ByteStream, InstanceId, PauseGate, ReadEnd, StreamEvent};
use crate::error::StreamError;
use crate::models::{InstanceConfig, TerminalKind};

/// What to start and at which size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    pub kind: TerminalKind,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub rows: u16,
    pub cols: u16,
}

impl SpawnRequest {
    pub fn live(config: &InstanceConfig, rows: u16, cols: u16) -> Self {
        let (program, args) = config.program();
        Self {
            kind: config.kind,
            program,
            args,
            cwd: config.cwd.clone(),
            env: config.env.clone(),
            rows,
            cols,
        }
    }

    /// The one-shot history read of a log panel, always read-only
    pub fn backfill(config: &InstanceConfig, rows: u16, cols: u16) -> Option<Self> {
        let (program, args) = config.backfill_program()?;
        Some(Self {
            kind: TerminalKind::ProcessLog,
            program,
            args,
            cwd: config.cwd.clone(),
            env: config.env.clone(),
            rows,
            cols,
        })
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Starts byte streams for terminal instances.
pub trait StreamProvider {
    fn spawn(
        &self,
        id: InstanceId,
        request: &SpawnRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<Box<dyn ByteStream>, StreamError>;
}

/// Interactive stream on a pseudo-terminal.
pub struct PtyStream {
    master: Box<dyn MasterPty + Send>,
    child_killer: Box<dyn ChildKiller + Send + Sync>,
    process_id: Option<u32>,
    writer: Box<dyn Write + Send>,
    gate: PauseGate,
    closed: bool,
}

impl ByteStream for PtyStream {
    fn write(&mut self, bytes: &[u8]) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    fn resize(&mut self, rows: u16, cols: u16) -> Result<(), StreamError> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| StreamError::Io(std::io::Error::other(e.to_string())))
    }

    fn pause(&self) {
        self.gate.pause();
    }

    fn resume(&self) {
        self.gate.resume();
    }

    fn close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.gate.close();
        kill_tree(self.process_id, || self.child_killer.kill())
    }

    fn is_writable(&self) -> bool {
        !self.closed
    }
}

/// Read-only stream over plain pipes, used for log tails.
pub struct PipeStream {
    child: Arc<Mutex<std::process::Child>>,
    process_id: u32,
    gate: PauseGate,
    closed: bool,
}

impl ByteStream for PipeStream {
    fn write(&mut self, _bytes: &[u8]) -> Result<(), StreamError> {
        Err(StreamError::ReadOnly)
    }

    fn resize(&mut self, _rows: u16, _cols: u16) -> Result<(), StreamError> {
        Ok(())
    }

    fn pause(&self) {
        self.gate.pause();
    }

    fn resume(&self) {
        self.gate.resume();
    }

    fn close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.gate.close();
        let child = self.child.clone();
        kill_tree(Some(self.process_id), move || {
            child.lock().unwrap_or_else(|e| e.into_inner()).kill()
        })
    }

    fn is_writable(&self) -> bool {
        false
    }
}

/// Kill the child's process group, falling back to killing just the child.
fn kill_tree(
    process_id: Option<u32>,
    fallback: impl FnOnce() -> std::io::Result<()>,
) -> Result<(), StreamError> {
    #[cfg(unix)]
    {
        // Both spawn paths make the child a group leader, so pid == pgid.
        if let Some(pgid) = process_id.filter(|pid| *pid > 0) {
            let result = unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
            if result == 0 {
                return Ok(());
            }
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
        }
    }
    #[cfg(not(unix))]
    let _ = process_id;

    match fallback() {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub struct StreamManager {
    pty_system: Box<dyn PtySystem + Send>,
}

impl StreamManager {
    pub fn new() -> Self {
        Self {
            pty_system: native_pty_system(),
        }
    }

    fn spawn_pty(
        &self,
        id: InstanceId,
        request: &SpawnRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<Box<dyn ByteStream>, StreamError> {
        let command_line = request.command_line();
        let pair = self
            .pty_system
            .openpty(PtySize {
                rows: request.rows,
                cols: request.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| StreamError::spawn(&command_line, e))?;

        let mut cmd = CommandBuilder::new(&request.program);
        cmd.args(&request.args);
        if let Some(cwd) = &request.cwd {
            cmd.cwd(cwd);
        }
        cmd.env("TERM", "xterm-256color");
        // Explicit size for programs that read it before the first SIGWINCH
        cmd.env("LINES", request.rows.to_string());
        cmd.env("COLUMNS", request.cols.to_string());
        for (key, value) in &request.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| StreamError::spawn(&command_line, e))?;
        let child_killer = child.clone_killer();
        let process_id = child.process_id();

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| StreamError::spawn(&command_line, e))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| StreamError::spawn(&command_line, e))?;

        let gate = PauseGate::new();
        let reader_gate = gate.clone();
        std::thread::spawn(move || {
            read_pty(id, &mut reader, tx, &reader_gate, child);
        });

        info!(%id, command = %command_line, pid = ?process_id, "pty stream started");
        Ok(Box::new(PtyStream {
            master: pair.master,
            child_killer,
            process_id,
            writer,
            gate,
            closed: false,
        }))
    }

    fn spawn_pipe(
        &self,
        id: InstanceId,
        request: &SpawnRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<Box<dyn ByteStream>, StreamError> {
        let command_line = request.command_line();
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| StreamError::spawn(&command_line, e))?;
        let process_id = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let child = Arc::new(Mutex::new(child));
        let gate = PauseGate::new();

        let stderr_pump = stderr.map(|mut stderr| {
            let tx = tx.clone();
            let gate = gate.clone();
            std::thread::spawn(move || {
                let _ = pump(id, &mut stderr, &tx, &gate);
            })
        });

        if let Some(mut stdout) = stdout {
            let waiter = child.clone();
            let gate = gate.clone();
            std::thread::spawn(move || {
                let end = pump(id, &mut stdout, &tx, &gate);
                // No Data may follow Exited for this id
                if let Some(handle) = stderr_pump {
                    let _ = handle.join();
                }
                let code = match end {
                    ReadEnd::Closed => return,
                    ReadEnd::Failed(e) => {
                        warn!(%id, error = %e, "pipe read failed");
                        1
                    }
                    ReadEnd::Eof => wait_for_exit(&waiter),
                };
                let _ = tx.blocking_send(StreamEvent::Exited(id, code));
            });
        }

        info!(%id, command = %command_line, pid = process_id, "pipe stream started");
        Ok(Box::new(PipeStream {
            child,
            process_id,
            gate,
            closed: false,
        }))
    }
}

impl StreamProvider for StreamManager {
    fn spawn(
        &self,
        id: InstanceId,
        request: &SpawnRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<Box<dyn ByteStream>, StreamError> {
        if request.kind.uses_pty() {
            self.spawn_pty(id, request, tx)
        } else {
            self.spawn_pipe(id, request, tx)
        }
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll instead of blocking in `wait` so `close` can still take the lock.
fn wait_for_exit(child: &Mutex<std::process::Child>) -> i32 {
    loop {
        let status = child.lock().unwrap_or_else(|e| e.into_inner()).try_wait();
        match status {
            Ok(Some(status)) => return status.code().unwrap_or(1),
            Ok(None) => std::thread::sleep(Duration::from_millis(25)),
            Err(_) => return 1,
        }
    }
}

/// Reader thread body for a pty: forward output, then report the real exit
/// status once the slave side hangs up.
fn read_pty(
    id: InstanceId,
    reader: &mut Box<dyn Read + Send>,
    tx: mpsc::Sender<StreamEvent>,
    gate: &PauseGate,
    mut child: Box<dyn Child + Send + Sync>,
) {
    let code = match pump(id, reader.as_mut(), &tx, gate) {
        ReadEnd::Closed => {
            debug!(%id, "pty reader stopped");
            return;
        }
        // EIO on the master is how Linux reports a closed slave
        ReadEnd::Eof | ReadEnd::Failed(_) => match child.wait() {
            Ok(status) => status.exit_code() as i32,
            Err(_) => 1,
        },
    };
    let _ = tx.blocking_send(StreamEvent::Exited(id, code));
}

#[cfg(test)]
mod tests {
    use super::*;
    use portable_pty::ExitStatus;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[derive(Debug)]
    struct DummyMaster;

    impl MasterPty for DummyMaster {
        fn resize(&self, _size: PtySize) -> std::result::Result<(), anyhow::Error> {
            Err(anyhow::anyhow!("unused"))
        }

        fn get_size(&self) -> std::result::Result<PtySize, anyhow::Error> {
            Err(anyhow::anyhow!("unused"))
        }

        fn try_clone_reader(&self) -> std::result::Result<Box<dyn Read + Send>, anyhow::Error> {
            Err(anyhow::anyhow!("unused"))
        }

        fn take_writer(&self) -> std::result::Result<Box<dyn io::Write + Send>, anyhow::Error> {
            Err(anyhow::anyhow!("unused"))
        }

        #[cfg(unix)]
        fn process_group_leader(&self) -> Option<libc::pid_t> {
            None
        }

        #[cfg(unix)]
        fn as_raw_fd(&self) -> Option<std::os::unix::io::RawFd> {
            None
        }
    }

    #[derive(Debug)]
    struct TestChildKiller {
        calls: Arc<AtomicUsize>,
    }

    impl ChildKiller for TestChildKiller {
        fn kill(&mut self) -> io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn clone_killer(&self) -> Box<dyn ChildKiller + Send + Sync> {
            Box::new(TestChildKiller {
                calls: self.calls.clone(),
            })
        }
    }

    #[derive(Debug)]
    struct TestChild {
        exit_status: ExitStatus,
    }

    impl ChildKiller for TestChild {
        fn kill(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn clone_killer(&self) -> Box<dyn ChildKiller + Send + Sync> {
            Box::new(TestChildKiller {
                calls: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    impl Child for TestChild {
        fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
            Ok(Some(self.exit_status.clone()))
        }

        fn wait(&mut self) -> io::Result<ExitStatus> {
            Ok(self.exit_status.clone())
        }

        fn process_id(&self) -> Option<u32> {
            None
        }

        #[cfg(windows)]
        fn as_raw_handle(&self) -> Option<std::os::windows::io::RawHandle> {
            None
        }
    }

    fn test_stream(calls: Arc<AtomicUsize>) -> PtyStream {
        PtyStream {
            master: Box::new(DummyMaster),
            child_killer: Box::new(TestChildKiller { calls }),
            process_id: None,
            writer: Box::new(io::sink()),
            gate: PauseGate::new(),
            closed: false,
        }
    }

    #[test]
    fn pty_reader_reports_exit_after_output() {
        let (tx, mut rx) = mpsc::channel(10);
        let id = Uuid::new_v4();
        let mut reader: Box<dyn Read + Send> = Box::new(io::Cursor::new(b"hello".to_vec()));
        let child: Box<dyn Child + Send + Sync> = Box::new(TestChild {
            exit_status: ExitStatus::with_exit_code(3),
        });

        read_pty(id, &mut reader, tx, &PauseGate::new(), child);

        assert_eq!(rx.try_recv().unwrap(), StreamEvent::Data(id, b"hello".to_vec()));
        assert_eq!(rx.try_recv().unwrap(), StreamEvent::Exited(id, 3));
    }

    #[test]
    fn closed_reader_reports_nothing() {
        let (tx, mut rx) = mpsc::channel(10);
        let gate = PauseGate::new();
        gate.close();
        let mut reader: Box<dyn Read + Send> = Box::new(io::Cursor::new(b"ignored".to_vec()));
        let child: Box<dyn Child + Send + Sync> = Box::new(TestChild {
            exit_status: ExitStatus::with_exit_code(0),
        });

        read_pty(Uuid::new_v4(), &mut reader, tx, &gate, child);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn close_uses_child_killer_without_pid_and_is_idempotent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut stream = test_stream(calls.clone());

        stream.close().unwrap();
        stream.close().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!stream.is_writable());
        assert!(matches!(stream.write(b"x"), Err(StreamError::Closed)));
    }

    #[test]
    fn spawn_request_from_config() {
        let mut config = InstanceConfig::log("tail -F app.log");
        config.backfill_command = Some("cat app.log".to_string());
        config.env.insert("LANG".into(), "C".into());

        let live = SpawnRequest::live(&config, 24, 80);
        assert_eq!(live.command_line(), "sh -c tail -F app.log");
        assert_eq!(live.env.get("LANG").map(String::as_str), Some("C"));

        let backfill = SpawnRequest::backfill(&config, 24, 80).unwrap();
        assert_eq!(backfill.kind, TerminalKind::ProcessLog);
        assert_eq!(backfill.args[1], "cat app.log");
        assert!(SpawnRequest::backfill(&InstanceConfig::shell(), 24, 80).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn pipe_stream_reads_output_and_exit_code() {
        let (tx, mut rx) = mpsc::channel(16);
        let id = Uuid::new_v4();
        let request = SpawnRequest::live(&InstanceConfig::log("echo one; exit 4"), 24, 80);

        let stream = StreamManager::new().spawn(id, &request, tx).unwrap();
        assert!(!stream.is_writable());

        let mut output = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let code = loop {
            match rx.try_recv() {
                Ok(StreamEvent::Data(_, bytes)) => output.extend(bytes),
                Ok(StreamEvent::Exited(_, code)) => break code,
                Err(_) => {
                    assert!(std::time::Instant::now() < deadline, "no exit event");
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        };
        assert_eq!(output, b"one\n");
        assert_eq!(code, 4);
    }

    #[cfg(unix)]
    #[test]
    fn pipe_stderr_arrives_before_exit() {
        let (tx, mut rx) = mpsc::channel(16);
        let id = Uuid::new_v4();
        let request = SpawnRequest::live(
            &InstanceConfig::log("exec 1>&-; sleep 0.2; echo late >&2"),
            24,
            80,
        );
        let _stream = StreamManager::new().spawn(id, &request, tx).unwrap();

        let mut output = Vec::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            match rx.try_recv() {
                Ok(StreamEvent::Data(_, bytes)) => output.extend(bytes),
                Ok(StreamEvent::Exited(..)) => break,
                Err(_) => {
                    assert!(std::time::Instant::now() < deadline, "no exit event");
                    std::thread::sleep(Duration::from_millis(10));
                }
            }
        }
        assert_eq!(output, b"late\n");
    }
}
