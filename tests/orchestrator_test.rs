//! Integration tests for page navigation and cross-step validation.

use switchback::definition::schema::StepConfig;
use switchback::form::{FormData, Value};
use switchback::host::MockHost;
use switchback::orchestrator::navigator::{Navigator, Transition};
use switchback::orchestrator::validation::collect_validation_errors;

fn steps(yaml: &str) -> Vec<StepConfig> {
    serde_yaml::from_str(yaml).unwrap()
}

/// Spec scenario: one wizard step, mandatory Name, dynamic Env.
const SCENARIO: &str = r#"
- title: Wizard
  parameters:
    - name: Name
      mandatory: true
    - name: Env
      dynamic: true
      source: "list-envs"
"#;

#[test]
fn empty_mandatory_field_blocks_finish_with_exact_message() {
    let mut nav = Navigator::new(steps(SCENARIO), std::env::temp_dir());
    let mut form = FormData::new();
    let host = MockHost::new();

    nav.enter_current(&form);
    match nav.next(&mut form, &host) {
        Transition::Blocked(report) => {
            assert_eq!(report.violations.len(), 1);
            assert_eq!(
                report.violations[0].to_string(),
                "Step 1 'Wizard': 'Name' is required."
            );
        }
        other => panic!("expected blocked, got {:?}", other),
    }
}

#[test]
fn filled_mandatory_field_finishes_with_form_data() {
    let mut nav = Navigator::new(steps(SCENARIO), std::env::temp_dir());
    let mut form = FormData::new();
    let host = MockHost::new();

    nav.enter_current(&form);
    nav.set_field_value("Name", Value::Text("x".into()), &mut form);
    nav.set_field_value("Env", Value::Text("dev".into()), &mut form);

    match nav.next(&mut form, &host) {
        Transition::Finish => {}
        other => panic!("expected finish, got {:?}", other),
    }
    assert_eq!(form.get("Name"), Some(&Value::Text("x".into())));
    assert_eq!(form.get("Env"), Some(&Value::Text("dev".into())));
}

#[test]
fn revisited_step_shows_last_committed_values() {
    let mut nav = Navigator::new(
        steps(
            r#"
- title: One
  parameters:
    - name: a
- title: Two
  parameters:
    - name: b
"#,
        ),
        std::env::temp_dir(),
    );
    let mut form = FormData::new();
    let host = MockHost::new();

    nav.enter_current(&form);
    nav.set_field_value("a", Value::Text("first".into()), &mut form);
    nav.next(&mut form, &host);
    nav.set_field_value("b", Value::Text("second".into()), &mut form);

    // Go back, change a, forward again, then back: the page must always
    // show what FormData last committed.
    nav.previous(&mut form);
    nav.set_field_value("a", Value::Text("edited".into()), &mut form);
    nav.next(&mut form, &host);
    nav.previous(&mut form);

    assert_eq!(
        nav.current_page().unwrap().fields()[0].value,
        Some(Value::Text("edited".into()))
    );
}

#[test]
fn validation_aggregates_across_steps_without_short_circuit() {
    let step_list = steps(
        r#"
- title: Connection
  parameters:
    - name: host
      mandatory: true
    - name: port
      mandatory: true
- title: Options
  parameters:
    - name: mode
      choices: [fast, safe]
"#,
    );
    let mut form = FormData::new();
    form.commit("mode", Value::Text("reckless".into()));
    let host = MockHost::new();

    let report =
        collect_validation_errors(&step_list, &form, &host, &std::env::temp_dir());

    assert_eq!(report.violations.len(), 3);
    insta::assert_snapshot!(report.summary(), @r###"
    Step 1 'Connection': 'host' is required.
    Step 1 'Connection': 'port' is required.
    Step 2 'Options': 'mode' value 'reckless' is not one of the allowed choices.
    "###);
}

#[test]
fn next_previous_round_trip_is_idempotent() {
    let mut nav = Navigator::new(
        steps(
            r#"
- title: One
  parameters:
    - name: a
      mandatory: true
- title: Two
"#,
        ),
        std::env::temp_dir(),
    );
    let mut form = FormData::new();
    let host = MockHost::new();

    nav.enter_current(&form);
    nav.set_field_value("a", Value::Text("v".into()), &mut form);
    nav.next(&mut form, &host);

    // One warm-up cycle so both steps' flags have been computed.
    nav.previous(&mut form);
    nav.next(&mut form, &host);

    let snapshot_form = form.clone();
    let snapshot_flags = nav.flags().to_vec();

    for _ in 0..3 {
        nav.previous(&mut form);
        nav.next(&mut form, &host);
    }

    assert_eq!(form.len(), snapshot_form.len());
    assert_eq!(form.get("a"), snapshot_form.get("a"));
    assert_eq!(nav.flags(), snapshot_flags.as_slice());
}
