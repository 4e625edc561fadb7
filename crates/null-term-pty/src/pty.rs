use std::io;
use std::io::Write;

use portable_pty::native_pty_system;
use portable_pty::Child;
use portable_pty::CommandBuilder;
use portable_pty::MasterPty;
use portable_pty::PtySize;

use crate::process::ShellProcess;
use crate::process::SpawnRequest;
use crate::process::SpawnedShell;
use crate::tree::terminate_tree;
use crate::PtyError;

pub struct PtyProcess {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    size: PtySize,
    exit_code: Option<i32>,
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        if matches!(self.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            if let Some(pid) = self.child.process_id() {
                terminate_tree(pid);
            }
        }
    }
}

impl PtyProcess {
    pub fn spawn(request: &SpawnRequest) -> Result<SpawnedShell, PtyError> {
        let size = pty_size(request.cols, request.rows);

        let pair = native_pty_system()
            .openpty(size)
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&request.shell);
        if let Some(dir) = &request.cwd {
            cmd.cwd(dir);
        }
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        cmd.env("TERM", "xterm-256color");

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::spawn(&request.shell, e.to_string()))?;
        // The reader only sees EOF once every slave handle is closed.
        drop(pair.slave);

        let output = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Open(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let process = PtyProcess {
            master: pair.master,
            child,
            writer,
            size,
            exit_code: None,
        };

        Ok(SpawnedShell {
            process: Box::new(process),
            output,
        })
    }
}

impl ShellProcess for PtyProcess {
    fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    fn is_pty(&self) -> bool {
        true
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
        if data.is_empty() {
            return Ok(());
        }
        let mut offset = 0;
        while offset < data.len() {
            match self.writer.write(&data[offset..]) {
                Ok(0) => {
                    return Err(PtyError::Write(
                        "write returned 0 bytes, PTY closed".to_string(),
                    ));
                }
                Ok(n) => offset += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(PtyError::Write(e.to_string())),
            }
        }
        self.writer
            .flush()
            .map_err(|e| PtyError::Write(e.to_string()))
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<bool, PtyError> {
        let size = pty_size(cols, rows);
        self.master
            .resize(size)
            .map_err(|e| PtyError::Resize(e.to_string()))?;
        self.size = size;
        Ok(true)
    }

    /// Kills the shell and every job it started. The shell leads its own
    /// session, so jobs are found even after the shell itself has exited.
    fn kill(&mut self) -> Result<(), PtyError> {
        let pid = self.child.process_id();
        let result = if self.try_wait()?.is_some() {
            Ok(())
        } else {
            self.child
                .kill()
                .map_err(|e| PtyError::Kill(e.to_string()))
        };
        if let Some(pid) = pid {
            terminate_tree(pid);
        }
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
        self.exit_code = status.map(|s| i32::try_from(s.exit_code()).unwrap_or(i32::MAX));
        Ok(self.exit_code)
    }
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}
