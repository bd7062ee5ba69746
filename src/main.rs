//! Switchback CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use switchback::cli::{dispatch, Cli, Commands};
use switchback::ui::TerminalUi;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
///
/// Log level is controlled by:
/// 1. `--debug` flag sets level to DEBUG
/// 2. `RUST_LOG` environment variable (if set)
/// 3. Default is INFO
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("switchback=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("switchback=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    tracing::debug!("Switchback starting with args: {:?}", cli);

    if cli.no_color {
        std::env::set_var("NO_COLOR", "1");
    }

    let is_interactive = match &cli.command {
        Commands::Run(args) => !args.non_interactive && console::user_attended(),
        Commands::Resume(args) => !args.non_interactive && console::user_attended(),
        _ => console::user_attended(),
    };

    let mut ui = TerminalUi::new(is_interactive, cli.quiet);

    match dispatch(&cli, &mut ui) {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}
