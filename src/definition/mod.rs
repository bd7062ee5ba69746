//! Definition loading, schema, and declaration validation.

pub mod loader;
pub mod schema;
pub mod validate;

pub use loader::{load, LoadedDefinition};
pub use schema::{
    BannerSeverity, ControlConfig, LaunchDefinition, OnError, PageKind, ParamKind,
    ParameterConfig, PathKind, RejectBehavior, ScriptSpec, StepConfig, TaskConfig, TaskKind,
};
pub use validate::{check_definition, ensure_valid};
