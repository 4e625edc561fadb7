//! Method and notification names on the channel.

pub const SPAWN: &str = "terminal.spawn";
pub const WRITE: &str = "terminal.write";
pub const RESIZE: &str = "terminal.resize";
pub const KILL: &str = "terminal.kill";
pub const LIST: &str = "terminal.list";
pub const PING: &str = "ping";

pub const DATA: &str = "terminal.data";
pub const EXIT: &str = "terminal.exit";
