//! Command-line interface.

pub mod args;
pub mod run;

pub use args::{CheckArgs, Cli, Commands, CompletionsArgs, ResumeArgs, RunArgs};
pub use run::{run_session, SessionOptions, EXIT_PENDING_REBOOT};

use clap::CommandFactory;

use crate::definition::loader;
use crate::error::{Result, SwitchbackError};
use crate::ui::WizardUi;
use crate::workflow::resume::ResumeState;

/// Dispatch a parsed command. Returns the process exit code.
pub fn dispatch(cli: &Cli, ui: &mut dyn WizardUi) -> Result<i32> {
    match &cli.command {
        Commands::Run(cmd_args) => {
            let options = SessionOptions {
                definition: cmd_args.definition.clone(),
                set: cmd_args.set.clone(),
                resume: None,
                log_dir: cmd_args.log_dir.clone(),
            };
            run_session(&options, ui)
        }
        Commands::Check(cmd_args) => check(cmd_args, ui),
        Commands::Resume(cmd_args) => resume(cmd_args, ui),
        Commands::Schema => {
            let schema = schemars::schema_for!(crate::definition::schema::LaunchDefinition);
            println!(
                "{}",
                serde_json::to_string_pretty(&schema).unwrap_or_default()
            );
            Ok(0)
        }
        Commands::Completions(cmd_args) => {
            clap_complete::generate(
                cmd_args.shell,
                &mut Cli::command(),
                "switchback",
                &mut std::io::stdout(),
            );
            Ok(0)
        }
    }
}

/// Validate a definition without running it.
fn check(cmd_args: &CheckArgs, ui: &mut dyn WizardUi) -> Result<i32> {
    match loader::load(&cmd_args.definition) {
        Ok(loaded) => {
            ui.success(&format!(
                "{} is valid ({} step(s))",
                cmd_args.definition.display(),
                loaded.steps().len()
            ));
            Ok(0)
        }
        Err(SwitchbackError::Configuration { message }) => {
            ui.error(&format!("{} has problems:", cmd_args.definition.display()));
            for problem in message.split("; ") {
                ui.error(&format!("  - {}", problem));
            }
            Ok(1)
        }
        Err(e) => Err(e),
    }
}

/// Relaunch the workflow paused for a reboot.
fn resume(_cmd_args: &ResumeArgs, ui: &mut dyn WizardUi) -> Result<i32> {
    let Some(state) = ResumeState::load().map_err(SwitchbackError::Other)? else {
        ui.error("No paused workflow to resume.");
        return Ok(1);
    };

    ui.message(&format!(
        "Resuming '{}' ({} task(s) already completed).",
        state.definition_path.display(),
        state.completed_tasks.len()
    ));

    let options = SessionOptions {
        definition: state.definition_path.clone(),
        set: Vec::new(),
        resume: Some(state),
        log_dir: None,
    };
    run_session(&options, ui)
}
