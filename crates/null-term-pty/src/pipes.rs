use std::io;
use std::io::Read;
use std::io::Write;
use std::process::Child;
use std::process::ChildStdin;
use std::process::Command;
use std::process::Stdio;
use std::thread;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use tracing::debug;

use crate::process::ShellProcess;
use crate::process::SpawnRequest;
use crate::process::SpawnedShell;
use crate::tree::terminate_tree;
use crate::PtyError;

const PIPE_READ_CHUNK: usize = 4096;

/// Fallback backend: plain pipes, stdout and stderr merged into one stream.
pub struct PipeProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    exit_code: Option<i32>,
}

impl Drop for PipeProcess {
    fn drop(&mut self) {
        if matches!(self.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            terminate_tree(self.child.id());
            let _ = self.child.wait();
        }
    }
}

impl PipeProcess {
    pub fn spawn(request: &SpawnRequest) -> Result<SpawnedShell, PtyError> {
        let mut cmd = Command::new(&request.shell);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("TERM", "dumb")
            .env("COLUMNS", request.cols.to_string())
            .env("LINES", request.rows.to_string());
        if let Some(dir) = &request.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        // Own process group, so kill reaches background jobs too.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| PtyError::spawn(&request.shell, e.to_string()))?;

        let stdin = child.stdin.take();
        let (tx, rx) = crossbeam_channel::unbounded();
        if let Some(stdout) = child.stdout.take() {
            forward(stdout, tx.clone(), "stdout")?;
        }
        if let Some(stderr) = child.stderr.take() {
            forward(stderr, tx, "stderr")?;
        }

        Ok(SpawnedShell {
            process: Box::new(PipeProcess {
                child,
                stdin,
                exit_code: None,
            }),
            output: Box::new(ChannelReader::new(rx)),
        })
    }
}

fn forward<R: Read + Send + 'static>(
    mut source: R,
    tx: Sender<Vec<u8>>,
    stream: &'static str,
) -> Result<(), PtyError> {
    thread::Builder::new()
        .name(format!("pipe-{}", stream))
        .spawn(move || {
            let mut buf = [0u8; PIPE_READ_CHUNK];
            loop {
                match source.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!(stream, error = %e, "Pipe read ended");
                        break;
                    }
                }
            }
        })
        .map(|_| ())
        .map_err(|e| PtyError::Open(format!("failed to spawn {} reader: {}", stream, e)))
}

impl ShellProcess for PipeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.child.id())
    }

    fn is_pty(&self) -> bool {
        false
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PtyError::Write("stdin closed".to_string()))?;
        stdin
            .write_all(data)
            .and_then(|()| stdin.flush())
            .map_err(|e| PtyError::Write(e.to_string()))
    }

    fn resize(&mut self, _cols: u16, _rows: u16) -> Result<bool, PtyError> {
        Ok(false)
    }

    fn kill(&mut self) -> Result<(), PtyError> {
        let result = if self.try_wait()?.is_some() {
            Ok(())
        } else {
            match self.child.kill() {
                Ok(()) => Ok(()),
                // Exited between the check and the signal.
                Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
                Err(e) => Err(PtyError::Kill(e.to_string())),
            }
        };
        // Background jobs outlive the shell unless their group is taken down.
        terminate_tree(self.child.id());
        self.stdin = None;
        result
    }

    fn try_wait(&mut self) -> Result<Option<i32>, PtyError> {
        if let Some(code) = self.exit_code {
            return Ok(Some(code));
        }
        let status = self
            .child
            .try_wait()
            .map_err(|e| PtyError::Read(e.to_string()))?;
        self.exit_code = status.map(exit_code_of);
        Ok(self.exit_code)
    }
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// `Read` over chunks arriving on a channel. Reports EOF once every sender
/// has hung up and the buffered tail is consumed.
pub struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    buffer: Vec<u8>,
    offset: usize,
}

impl ChannelReader {
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            buffer: Vec::new(),
            offset: 0,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset >= self.buffer.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.buffer = chunk;
                    self.offset = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let available = &self.buffer[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}
