use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use null_term_pty::SpawnMode;

const LONG_ABOUT: &str = r#"null-term runs interactive shells in a host process and shows them as tabs
in a terminal panel.

The host owns the shell processes. The panel talks to it over a Unix socket
and starts it on demand.

PANEL COMMANDS:
    Lines are sent to the active terminal. Lines starting with '::' control
    the panel instead:

    ::new            open a terminal tab
    ::close          close the active tab
    ::next, ::prev   cycle through tabs
    ::tab N          select tab N (1-based)
    ::tabs           list tabs
    ::hide, ::show   hide or show the panel
    ::toggle         flip panel visibility
    ::height PX      set the panel height (100-600)
    ::quit           close every tab and exit

ENVIRONMENT:
    NULL_TERM_SOCKET          socket path (default: $XDG_RUNTIME_DIR/null-term.sock)
    NULL_TERM_LOG             write logs to this file instead of stderr
    NULL_TERM_SHELL           shell the host spawns when none is requested
    NULL_TERM_SPAWN_MODE      auto | pty | pipes
    NULL_TERM_MAX_SESSIONS    concurrent shells per host (default 16)

Every shell sees NULL_TERM_SESSION_ID, the id of the tab it runs in."#;

#[derive(Parser, Debug)]
#[command(name = "null-term")]
#[command(author, version)]
#[command(about = "Multi-session terminal panel backed by a shell host")]
#[command(long_about = LONG_ABOUT)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Socket the host listens on
    #[arg(long, global = true, env = "NULL_TERM_SOCKET")]
    pub socket: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the terminal host in the foreground
    Host {
        /// Maximum number of concurrent shells
        #[arg(long)]
        max_sessions: Option<usize>,

        /// Shell to spawn when a request names none
        #[arg(long)]
        shell: Option<String>,

        /// How shells are attached: auto, pty or pipes
        #[arg(long)]
        spawn_mode: Option<SpawnMode>,
    },

    /// Open the interactive terminal panel
    Panel {
        /// Shell to request for new tabs
        #[arg(long)]
        shell: Option<String>,

        /// Working directory for new tabs
        #[arg(long)]
        cwd: Option<String>,

        /// Fail instead of starting the host when it is not running
        #[arg(long)]
        no_autostart: bool,
    },

    /// List shells the host is running
    Sessions {
        /// Print the raw JSON result
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_host_flags() {
        let cli = Cli::parse_from([
            "null-term",
            "host",
            "--max-sessions",
            "4",
            "--spawn-mode",
            "pipes",
        ]);
        match cli.command {
            Commands::Host {
                max_sessions,
                spawn_mode,
                shell,
            } => {
                assert_eq!(max_sessions, Some(4));
                assert_eq!(spawn_mode, Some(SpawnMode::Pipes));
                assert!(shell.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_bad_spawn_mode_is_rejected() {
        let result = Cli::try_parse_from(["null-term", "host", "--spawn-mode", "telepathy"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_socket_flag() {
        let cli = Cli::parse_from(["null-term", "sessions", "--socket", "/tmp/x.sock"]);
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/x.sock")));
        assert!(matches!(cli.command, Commands::Sessions { json: false }));
    }
}
