//! Load-time invariant checks for definitions.
//!
//! These guard the declarative shape only; committed values are checked
//! later by the orchestrator's cross-step validation. All problems are
//! collected and reported together as one configuration error.

use std::collections::HashSet;

use crate::definition::schema::{LaunchDefinition, PageKind, TaskKind};
use crate::error::{Result, SwitchbackError};

/// Check every declaration invariant, collecting all problems.
pub fn check_definition(definition: &LaunchDefinition) -> Vec<String> {
    let mut problems = Vec::new();

    if definition.steps.is_empty() {
        problems.push("definition declares no steps".to_string());
    }

    if let Some(script) = &definition.script {
        match (&script.template, &script.path) {
            (None, None) => {
                problems.push("script must set either 'template' or 'path'".to_string())
            }
            (Some(_), Some(_)) => {
                problems.push("script sets both 'template' and 'path'".to_string())
            }
            _ => {}
        }
    }

    let all_parameter_names: HashSet<&str> = definition
        .steps
        .iter()
        .flat_map(|s| s.parameters.iter())
        .map(|p| p.name.as_str())
        .collect();

    for (index, step) in definition.steps.iter().enumerate() {
        let step_no = index + 1;
        if step.title.trim().is_empty() {
            problems.push(format!("step {} has an empty title", step_no));
        }

        let mut seen = HashSet::new();
        for param in &step.parameters {
            if param.name.trim().is_empty() {
                problems.push(format!("step {} declares a parameter without a name", step_no));
                continue;
            }
            if !seen.insert(param.name.as_str()) {
                problems.push(format!(
                    "step {} declares parameter '{}' more than once",
                    step_no, param.name
                ));
            }

            if param.dynamic && param.source.as_deref().map_or(true, |s| s.trim().is_empty()) {
                problems.push(format!(
                    "dynamic parameter '{}' has no data source",
                    param.name
                ));
            }
            if !param.depends_on.is_empty() && !param.dynamic {
                problems.push(format!(
                    "parameter '{}' declares dependencies but is not dynamic",
                    param.name
                ));
            }
            for dep in &param.depends_on {
                if !all_parameter_names.contains(dep.as_str()) {
                    problems.push(format!(
                        "parameter '{}' depends on unknown parameter '{}'",
                        param.name, dep
                    ));
                }
            }

            if let Some(pattern) = &param.pattern {
                if let Err(e) = regex::Regex::new(pattern) {
                    problems.push(format!(
                        "parameter '{}' has an invalid pattern: {}",
                        param.name, e
                    ));
                }
            }
        }

        if !step.tasks.is_empty() && step.page != PageKind::Workflow {
            problems.push(format!(
                "step {} declares tasks but is not a workflow page",
                step_no
            ));
        }

        let mut task_names = HashSet::new();
        for task in &step.tasks {
            if task.name.trim().is_empty() {
                problems.push(format!("step {} declares a task without a name", step_no));
                continue;
            }
            if !task_names.insert(task.name.as_str()) {
                problems.push(format!(
                    "step {} declares task '{}' more than once",
                    step_no, task.name
                ));
            }

            match task.kind {
                TaskKind::Normal => match (&task.script, &task.script_path) {
                    (None, None) => problems.push(format!(
                        "task '{}' has neither 'script' nor 'script_path'",
                        task.name
                    )),
                    (Some(_), Some(_)) => problems.push(format!(
                        "task '{}' sets both 'script' and 'script_path'",
                        task.name
                    )),
                    _ => {}
                },
                TaskKind::ApprovalGate => {
                    if task.script.is_some() || task.script_path.is_some() {
                        problems.push(format!(
                            "approval gate '{}' must not carry a script",
                            task.name
                        ));
                    }
                }
            }

            if task.rollback.is_some() && task.rollback_path.is_some() {
                problems.push(format!(
                    "task '{}' sets both 'rollback' and 'rollback_path'",
                    task.name
                ));
            }
        }
    }

    problems
}

/// Run [`check_definition`] and fail with an aggregated
/// [`SwitchbackError::Configuration`] when anything is wrong.
pub fn ensure_valid(definition: &LaunchDefinition) -> Result<()> {
    let problems = check_definition(definition);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(SwitchbackError::Configuration {
            message: problems.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> LaunchDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn valid_definition_has_no_problems() {
        let def = parse(
            r#"
            steps:
              - title: Basics
                parameters:
                  - name: env
                    choices: [dev, prod]
                  - name: site
                    dynamic: true
                    depends_on: [env]
                    source: "list-sites"
        "#,
        );
        assert!(check_definition(&def).is_empty());
        assert!(ensure_valid(&def).is_ok());
    }

    #[test]
    fn empty_definition_is_flagged() {
        let def = parse("title: Empty");
        let problems = check_definition(&def);
        assert!(problems.iter().any(|p| p.contains("no steps")));
    }

    #[test]
    fn dynamic_without_source_is_flagged() {
        let def = parse(
            r#"
            steps:
              - title: Basics
                parameters:
                  - name: site
                    dynamic: true
        "#,
        );
        let problems = check_definition(&def);
        assert!(problems.iter().any(|p| p.contains("no data source")));
    }

    #[test]
    fn dependencies_require_dynamic() {
        let def = parse(
            r#"
            steps:
              - title: Basics
                parameters:
                  - name: env
                  - name: site
                    depends_on: [env]
        "#,
        );
        let problems = check_definition(&def);
        assert!(problems
            .iter()
            .any(|p| p.contains("dependencies but is not dynamic")));
    }

    #[test]
    fn unknown_dependency_is_flagged() {
        let def = parse(
            r#"
            steps:
              - title: Basics
                parameters:
                  - name: site
                    dynamic: true
                    depends_on: [ghost]
                    source: "list-sites"
        "#,
        );
        let problems = check_definition(&def);
        assert!(problems.iter().any(|p| p.contains("unknown parameter 'ghost'")));
    }

    #[test]
    fn duplicate_parameter_names_are_flagged() {
        let def = parse(
            r#"
            steps:
              - title: Basics
                parameters:
                  - name: env
                  - name: env
        "#,
        );
        let problems = check_definition(&def);
        assert!(problems.iter().any(|p| p.contains("more than once")));
    }

    #[test]
    fn invalid_pattern_is_flagged() {
        let def = parse(
            r#"
            steps:
              - title: Basics
                parameters:
                  - name: host
                    pattern: "["
        "#,
        );
        let problems = check_definition(&def);
        assert!(problems.iter().any(|p| p.contains("invalid pattern")));
    }

    #[test]
    fn tasks_on_non_workflow_page_are_flagged() {
        let def = parse(
            r#"
            steps:
              - title: Basics
                tasks:
                  - name: install
                    script: "echo hi"
        "#,
        );
        let problems = check_definition(&def);
        assert!(problems.iter().any(|p| p.contains("not a workflow page")));
    }

    #[test]
    fn task_without_script_is_flagged() {
        let def = parse(
            r#"
            steps:
              - title: Tasks
                type: workflow
                tasks:
                  - name: install
        "#,
        );
        let problems = check_definition(&def);
        assert!(problems
            .iter()
            .any(|p| p.contains("neither 'script' nor 'script_path'")));
    }

    #[test]
    fn approval_gate_with_script_is_flagged() {
        let def = parse(
            r#"
            steps:
              - title: Tasks
                type: workflow
                tasks:
                  - name: gate
                    type: approval_gate
                    script: "echo nope"
        "#,
        );
        let problems = check_definition(&def);
        assert!(problems.iter().any(|p| p.contains("must not carry a script")));
    }

    #[test]
    fn all_problems_are_collected() {
        let def = parse(
            r#"
            steps:
              - title: ""
                parameters:
                  - name: site
                    dynamic: true
                  - name: other
                    depends_on: [site]
        "#,
        );
        let problems = check_definition(&def);
        assert!(problems.len() >= 3);

        let err = ensure_valid(&def).unwrap_err();
        assert!(matches!(err, SwitchbackError::Configuration { .. }));
    }
}
