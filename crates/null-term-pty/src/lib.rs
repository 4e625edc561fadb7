#![deny(clippy::all)]

mod error;
mod pipes;
mod process;
mod pty;
mod shell;
mod tree;
mod utf8;

pub use error::PtyError;
pub use pipes::ChannelReader;
pub use pipes::PipeProcess;
pub use process::process_alive;
pub use process::spawn_shell;
pub use process::ShellProcess;
pub use process::SpawnMode;
pub use process::SpawnRequest;
pub use process::SpawnedShell;
pub use pty::PtyProcess;
pub use shell::default_shell_for;
pub use shell::locate_executable;
pub use shell::resolve_shell;
pub use shell::Platform;
pub use utf8::Utf8Decoder;

pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;
