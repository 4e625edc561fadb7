use clap::Parser;

use null_term::app;
use null_term::commands::Cli;
use null_term_common::init_tracing;

fn main() {
    let cli = Cli::parse();
    let telemetry = init_tracing(app::default_log_level(&cli));

    let code = match app::run(cli) {
        Ok(()) => app::exit_codes::SUCCESS,
        Err(e) => app::report_error(&e),
    };
    drop(telemetry);
    std::process::exit(code);
}
