//! Definition loading.
//!
//! Two concrete forms produce the same step shape:
//!
//! - declarative mode: a `.yml`/`.yaml` file containing a
//!   [`LaunchDefinition`] document;
//! - script mode: any other file carrying the same YAML document inside a
//!   comment header delimited by `# --- switchback` and `# ---`, with the
//!   remainder of the file becoming the terminal script body.
//!
//! The loader hashes the raw source at load time; the execution console
//! re-verifies that hash immediately before running.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::definition::schema::{LaunchDefinition, ScriptSpec, StepConfig};
use crate::definition::validate;
use crate::error::{Result, SwitchbackError};

/// Marker opening a script-mode definition header.
const HEADER_OPEN: &str = "# --- switchback";
/// Marker closing a script-mode definition header.
const HEADER_CLOSE: &str = "# ---";

/// A parsed definition plus its provenance.
#[derive(Debug, Clone)]
pub struct LoadedDefinition {
    pub definition: LaunchDefinition,
    pub source_path: PathBuf,
    /// SHA-256 of the raw file content, hex-encoded.
    pub integrity: String,
}

impl LoadedDefinition {
    /// Ordered steps of the definition.
    pub fn steps(&self) -> &[StepConfig] {
        &self.definition.steps
    }

    /// Re-read the source and compare its hash with the load-time hash.
    /// A mismatch refuses execution rather than silently proceeding.
    pub fn verify_integrity(&self) -> Result<()> {
        let content =
            std::fs::read(&self.source_path).map_err(|e| SwitchbackError::Security {
                message: format!(
                    "cannot re-read definition {}: {}",
                    self.source_path.display(),
                    e
                ),
            })?;
        let current = hash_hex(&content);
        if current != self.integrity {
            return Err(SwitchbackError::Security {
                message: format!(
                    "definition {} changed since load (hash mismatch)",
                    self.source_path.display()
                ),
            });
        }
        Ok(())
    }
}

/// Load a definition from a file, dispatching on extension.
pub fn load(path: &Path) -> Result<LoadedDefinition> {
    if !path.exists() {
        return Err(SwitchbackError::DefinitionNotFound {
            path: path.to_path_buf(),
        });
    }
    let raw = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&raw).into_owned();
    let integrity = hash_hex(&raw);

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yml") || e.eq_ignore_ascii_case("yaml"));

    let definition = if is_yaml {
        parse_declarative(path, &content)?
    } else {
        parse_script(path, &content)?
    };

    validate::ensure_valid(&definition)?;

    Ok(LoadedDefinition {
        definition,
        source_path: path.to_path_buf(),
        integrity,
    })
}

fn parse_declarative(path: &Path, content: &str) -> Result<LaunchDefinition> {
    serde_yaml::from_str(content).map_err(|e| SwitchbackError::DefinitionParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Extract the embedded header and treat the remainder as the terminal
/// script body (unless the header already declares one).
fn parse_script(path: &Path, content: &str) -> Result<LaunchDefinition> {
    let mut header_lines: Vec<&str> = Vec::new();
    let mut body_lines: Vec<&str> = Vec::new();
    let mut in_header = false;
    let mut saw_header = false;

    for line in content.lines() {
        if !saw_header && line.trim() == HEADER_OPEN {
            in_header = true;
            saw_header = true;
            continue;
        }
        if in_header {
            if line.trim() == HEADER_CLOSE {
                in_header = false;
                continue;
            }
            header_lines.push(line.trim_start_matches('#').strip_prefix(' ').unwrap_or(
                line.trim_start_matches('#'),
            ));
            continue;
        }
        body_lines.push(line);
    }

    if !saw_header {
        return Err(SwitchbackError::DefinitionParse {
            path: path.to_path_buf(),
            message: format!("no '{}' definition header found", HEADER_OPEN),
        });
    }
    if in_header {
        return Err(SwitchbackError::DefinitionParse {
            path: path.to_path_buf(),
            message: format!("definition header is not closed by '{}'", HEADER_CLOSE),
        });
    }

    let mut definition: LaunchDefinition =
        serde_yaml::from_str(&header_lines.join("\n")).map_err(|e| {
            SwitchbackError::DefinitionParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        })?;

    if definition.script.is_none() {
        let body = body_lines.join("\n");
        if !body.trim().is_empty() {
            definition.script = Some(ScriptSpec {
                template: Some(body),
                path: None,
            });
        }
    }

    Ok(definition)
}

fn hash_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
title: Provision
steps:
  - title: Basics
    parameters:
      - name: host
        mandatory: true
"#;

    #[test]
    fn loads_declarative_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wizard.yml");
        fs::write(&path, MINIMAL).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.definition.title.as_deref(), Some("Provision"));
        assert_eq!(loaded.steps().len(), 1);
        assert_eq!(loaded.integrity.len(), 64);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = load(Path::new("/definitely/missing.yml")).unwrap_err();
        assert!(matches!(err, SwitchbackError::DefinitionNotFound { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yml");
        fs::write(&path, "steps: [title: {").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, SwitchbackError::DefinitionParse { .. }));
    }

    #[test]
    fn invalid_declarations_are_configuration_errors() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yml");
        fs::write(
            &path,
            r#"
steps:
  - title: Basics
    parameters:
      - name: site
        dynamic: true
"#,
        )
        .unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, SwitchbackError::Configuration { .. }));
    }

    #[test]
    fn loads_script_mode_with_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("provision.sh");
        fs::write(
            &path,
            "#!/bin/sh\n\
             # --- switchback\n\
             # title: Provision\n\
             # steps:\n\
             #   - title: Basics\n\
             #     parameters:\n\
             #       - name: host\n\
             # ---\n\
             echo \"provisioning ${host}\"\n",
        )
        .unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.definition.title.as_deref(), Some("Provision"));
        let script = loaded.definition.script.as_ref().unwrap();
        assert!(script.template.as_ref().unwrap().contains("provisioning"));
        // The shebang line stays part of the body, not the header.
        assert!(script.template.as_ref().unwrap().contains("#!/bin/sh"));
    }

    #[test]
    fn script_mode_without_header_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("plain.sh");
        fs::write(&path, "echo hello\n").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, SwitchbackError::DefinitionParse { .. }));
        assert!(err.to_string().contains("definition header"));
    }

    #[test]
    fn unclosed_header_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("open.sh");
        fs::write(&path, "# --- switchback\n# title: X\n").unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("not closed"));
    }

    #[test]
    fn verify_integrity_accepts_unchanged_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wizard.yml");
        fs::write(&path, MINIMAL).unwrap();

        let loaded = load(&path).unwrap();
        assert!(loaded.verify_integrity().is_ok());
    }

    #[test]
    fn verify_integrity_refuses_tampered_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wizard.yml");
        fs::write(&path, MINIMAL).unwrap();

        let loaded = load(&path).unwrap();
        fs::write(&path, format!("{}\n# tampered", MINIMAL)).unwrap();

        let err = loaded.verify_integrity().unwrap_err();
        assert!(matches!(err, SwitchbackError::Security { .. }));
    }
}
