//! Switchback - script-driven wizard, dashboard, and workflow launcher.
//!
//! Switchback loads a declarative multi-step definition, renders each step
//! as a wizard form, dashboard, or workflow task list, binds declared
//! parameters to interactive fields, and executes the assembled script
//! through a pluggable script host with live streamed output.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`console`] - Terminal execution console controller
//! - [`definition`] - Definition loading, schema, and validation
//! - [`dispatch`] - Single-owner job queue and timers
//! - [`error`] - Error types and result aliases
//! - [`form`] - Session-scoped committed parameter values
//! - [`host`] - Script host abstraction and implementations
//! - [`interpolation`] - `${name}` template substitution
//! - [`orchestrator`] - Page construction, navigation, validation
//! - [`resolver`] - Dynamic choice-list resolution
//! - [`runlog`] - Structured run log files
//! - [`secrets`] - Secret masking for console and log output
//! - [`ui`] - Terminal prompts and the UI abstraction
//! - [`workflow`] - Sequential task execution with retry and resume
//!
//! # Example
//!
//! ```
//! use switchback::form::{FormData, Value};
//! use switchback::interpolation::resolve_template;
//!
//! let mut form = FormData::new();
//! form.commit("env", Value::Text("staging".to_string()));
//! let command = resolve_template("deploy --env ${env}", &form).unwrap();
//! assert_eq!(command, "deploy --env staging");
//! ```

pub mod cli;
pub mod console;
pub mod definition;
pub mod dispatch;
pub mod error;
pub mod form;
pub mod host;
pub mod interpolation;
pub mod orchestrator;
pub mod resolver;
pub mod runlog;
pub mod secrets;
pub mod ui;
pub mod workflow;

pub use error::{Result, SwitchbackError};
