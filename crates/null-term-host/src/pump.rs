//! Per-session output plumbing.
//!
//! A reader thread blocks on the process output and forwards raw chunks; a
//! pump thread decodes them, publishes `data` events in order, watches for
//! process exit and finally publishes the single `exit` event.

use std::io;
use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use crossbeam_channel::RecvTimeoutError;
use crossbeam_channel::Sender;
use null_term_ipc::TerminalEvent;
use null_term_pty::PtyError;
use null_term_pty::Utf8Decoder;
use tracing::{debug, info, warn};

use crate::events::EventSink;
use crate::registry::LiveSession;
use crate::registry::SessionRegistry;

const READ_CHUNK: usize = 8192;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

pub(crate) struct Pump {
    pub session: Arc<LiveSession>,
    pub registry: Arc<SessionRegistry>,
    pub sink: Arc<dyn EventSink>,
    pub exit_grace: Duration,
}

impl Pump {
    pub(crate) fn start(self, output: Box<dyn Read + Send>) -> Result<(), PtyError> {
        let (tx, rx) = crossbeam_channel::unbounded::<Vec<u8>>();
        let id = self.session.id().to_string();

        thread::Builder::new()
            .name(format!("read-{}", id))
            .spawn(move || read_output(output, tx))
            .map_err(|e| PtyError::Open(format!("failed to spawn reader thread: {}", e)))?;

        thread::Builder::new()
            .name(format!("pump-{}", id))
            .spawn(move || self.run(rx))
            .map_err(|e| PtyError::Open(format!("failed to spawn pump thread: {}", e)))?;

        Ok(())
    }

    fn run(self, rx: crossbeam_channel::Receiver<Vec<u8>>) {
        let mut decoder = Utf8Decoder::new();
        let mut exit_code: Option<i32> = None;
        let mut drain_until: Option<Instant> = None;

        loop {
            match rx.recv_timeout(EXIT_POLL_INTERVAL) {
                Ok(chunk) => self.publish(decoder.decode(&chunk)),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if exit_code.is_none() {
                exit_code = self.poll_exit();
                if exit_code.is_some() {
                    drain_until = Some(Instant::now() + self.exit_grace);
                }
            }
            // A grandchild can keep the output open after the shell is gone.
            if drain_until.is_some_and(|deadline| Instant::now() >= deadline) {
                debug!(session_id = %self.session.id(), "Output still open after exit, closing");
                break;
            }
        }

        self.publish(decoder.finish());
        let exit_code = match exit_code {
            Some(code) => code,
            None => self.wait_exit(),
        };

        self.registry.remove_exact(&self.session);
        info!(
            session_id = %self.session.id(),
            exit_code,
            killed = self.session.is_killed(),
            "Terminal exited"
        );
        self.sink.emit(TerminalEvent::Exit {
            id: self.session.id().to_string(),
            exit_code,
        });
    }

    fn publish(&self, data: String) {
        if data.is_empty() || self.session.is_killed() {
            return;
        }
        self.sink.emit(TerminalEvent::Data {
            id: self.session.id().to_string(),
            data,
        });
    }

    fn poll_exit(&self) -> Option<i32> {
        match self.session.try_wait() {
            Ok(code) => code,
            Err(e) => {
                warn!(session_id = %self.session.id(), error = %e, "Exit status unavailable");
                Some(-1)
            }
        }
    }

    fn wait_exit(&self) -> i32 {
        loop {
            if let Some(code) = self.poll_exit() {
                return code;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
    }
}

fn read_output(mut output: Box<dyn Read + Send>, tx: Sender<Vec<u8>>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match output.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // EIO is how a PTY master reports that the slave side closed.
            Err(e) => {
                debug!(error = %e, "Output stream closed");
                break;
            }
        }
    }
}
