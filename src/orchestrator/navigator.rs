//! The page navigation state machine.
//!
//! Holds the 1-based current step index, builds and caches per-step
//! presentation state on first visit, re-syncs cached pages from FormData
//! on every entry, gates the finish transition behind cross-step
//! validation, and keeps per-step completion/validity flags current so a
//! step indicator can render at any time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::definition::schema::StepConfig;
use crate::form::{FormData, Value};
use crate::host::ScriptHost;
use crate::orchestrator::pages::PresentationState;
use crate::orchestrator::validation::{collect_validation_errors, ValidationReport};

/// Visual flags for one step in the indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepFlags {
    pub completed: bool,
    pub valid: bool,
}

/// Result of a navigation request.
#[derive(Debug)]
pub enum Transition {
    /// Now on the given 1-based step.
    Moved(usize),
    /// Validation passed on the last step; enter the execution console.
    Finish,
    /// Validation failed; stay in place and show the aggregated report.
    Blocked(ValidationReport),
}

/// Session-scoped navigation state machine.
///
/// Owns the step list, the page cache, and the per-step flags. FormData is
/// passed in by the session that owns it; the navigator is the only writer.
pub struct Navigator {
    steps: Vec<StepConfig>,
    current: usize,
    cache: HashMap<usize, PresentationState>,
    flags: Vec<StepFlags>,
    base_dir: PathBuf,
}

impl Navigator {
    pub fn new(steps: Vec<StepConfig>, base_dir: impl Into<PathBuf>) -> Self {
        let flags = vec![StepFlags::default(); steps.len()];
        Self {
            steps,
            current: 1,
            cache: HashMap::new(),
            flags,
            base_dir: base_dir.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 1-based index of the current step.
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn is_last(&self) -> bool {
        self.current == self.steps.len()
    }

    pub fn flags(&self) -> &[StepFlags] {
        &self.flags
    }

    pub fn step_config(&self, index: usize) -> Option<&StepConfig> {
        self.steps.get(index.checked_sub(1)?)
    }

    pub fn current_step_config(&self) -> &StepConfig {
        &self.steps[self.current - 1]
    }

    /// Enter the current step: reuse the cached page if one exists,
    /// otherwise build it, then reconcile field values from FormData.
    /// FormData may have changed since the page was last shown (dependency
    /// refreshes, other steps committing shared values), so the sync runs
    /// on every entry, not just the first.
    pub fn enter_current(&mut self, form: &FormData) -> &mut PresentationState {
        let step = &self.steps[self.current - 1];
        let page = self
            .cache
            .entry(self.current)
            .or_insert_with(|| PresentationState::build(step, form));
        page.sync_from_form(form);
        page
    }

    /// The cached page for the current step, if entered before.
    pub fn current_page(&self) -> Option<&PresentationState> {
        self.cache.get(&self.current)
    }

    pub fn current_page_mut(&mut self) -> Option<&mut PresentationState> {
        self.cache.get_mut(&self.current)
    }

    /// Set a field's value on the current page and commit it to FormData
    /// immediately. Returns false if the field does not exist here.
    pub fn set_field_value(&mut self, name: &str, value: Value, form: &mut FormData) -> bool {
        let Some(page) = self.cache.get_mut(&self.current) else {
            return false;
        };
        let Some(field) = page.fields_mut().iter_mut().find(|f| f.name == name) else {
            return false;
        };
        field.value = Some(value.clone());
        form.commit(name, value);
        true
    }

    /// Persist the current page's field values into FormData and recompute
    /// this step's completion/validity flags.
    pub fn save_current(&mut self, form: &mut FormData) {
        if let Some(page) = self.cache.get(&self.current) {
            for field in page.fields() {
                if let Some(value) = &field.value {
                    form.commit(&field.name, value.clone());
                }
            }
        }
        self.refresh_flags(form);
    }

    /// Recompute mandatory-field completeness for the current step.
    fn refresh_flags(&mut self, form: &FormData) {
        let step = &self.steps[self.current - 1];
        let complete = step
            .parameters
            .iter()
            .filter(|p| !p.placeholder && p.mandatory)
            .all(|p| match form.get(&p.name) {
                Some(value) => !value.is_empty(),
                None => p.kind.is_boolean(),
            });
        let flags = &mut self.flags[self.current - 1];
        flags.completed = complete;
        flags.valid = complete;
    }

    /// Advance one step, or run the finish gate from the last step.
    pub fn next(&mut self, form: &mut FormData, host: &dyn ScriptHost) -> Transition {
        self.save_current(form);

        if self.current < self.steps.len() {
            self.current += 1;
            debug!("navigated forward to step {}", self.current);
            self.enter_current(form);
            return Transition::Moved(self.current);
        }

        // Last step: full cross-step validation gates the finish.
        let report = collect_validation_errors(&self.steps, form, host, &self.base_dir);
        if !report.is_ok() {
            debug!("finish blocked by {} violation(s)", report.violations.len());
            return Transition::Blocked(report);
        }

        for flags in &mut self.flags {
            flags.completed = true;
            flags.valid = true;
        }
        Transition::Finish
    }

    /// Go back one step. Backward navigation is always allowed while the
    /// index is above 1; no validation gate.
    pub fn previous(&mut self, form: &mut FormData) -> Transition {
        self.save_current(form);
        if self.current > 1 {
            self.current -= 1;
            debug!("navigated back to step {}", self.current);
            self.enter_current(form);
        }
        Transition::Moved(self.current)
    }

    /// Dashboard sidebar jump: any step is reachable without sequential
    /// gating. Out-of-range targets are ignored.
    pub fn navigate_to(&mut self, target: usize, form: &mut FormData) -> Transition {
        self.save_current(form);
        if target >= 1 && target <= self.steps.len() {
            self.current = target;
            debug!("jumped to step {}", self.current);
            self.enter_current(form);
        }
        Transition::Moved(self.current)
    }

    /// Base directory used for path validation and file data sources.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockHost;

    fn navigator(yaml: &str) -> Navigator {
        let steps: Vec<StepConfig> = serde_yaml::from_str(yaml).unwrap();
        Navigator::new(steps, std::env::temp_dir())
    }

    const TWO_STEPS: &str = r#"
        - title: First
          parameters:
            - name: host
              mandatory: true
        - title: Second
          parameters:
            - name: env
    "#;

    #[test]
    fn starts_on_step_one() {
        let nav = navigator(TWO_STEPS);
        assert_eq!(nav.current_index(), 1);
        assert_eq!(nav.len(), 2);
        assert!(!nav.is_last());
    }

    #[test]
    fn next_advances_and_builds_page() {
        let mut nav = navigator(TWO_STEPS);
        let mut form = FormData::new();
        let host = MockHost::new();

        nav.enter_current(&form);
        nav.set_field_value("host", Value::Text("web01".into()), &mut form);

        match nav.next(&mut form, &host) {
            Transition::Moved(2) => {}
            other => panic!("expected move to 2, got {:?}", other),
        }
        assert_eq!(nav.current_page().unwrap().title(), "Second");
    }

    #[test]
    fn next_persists_values_into_form() {
        let mut nav = navigator(TWO_STEPS);
        let mut form = FormData::new();
        let host = MockHost::new();

        nav.enter_current(&form);
        nav.current_page_mut().unwrap().fields_mut()[0].value =
            Some(Value::Text("web01".into()));
        nav.next(&mut form, &host);

        assert_eq!(form.get("host"), Some(&Value::Text("web01".into())));
    }

    #[test]
    fn revisit_reuses_cached_page_and_resyncs_from_form() {
        let mut nav = navigator(TWO_STEPS);
        let mut form = FormData::new();
        let host = MockHost::new();

        nav.enter_current(&form);
        nav.set_field_value("host", Value::Text("web01".into()), &mut form);
        nav.next(&mut form, &host);

        // Mutate FormData behind the cached page (e.g. a dependency
        // refresh committed a new value).
        form.commit("host", Value::Text("web02".into()));

        nav.previous(&mut form);
        let page = nav.current_page().unwrap();
        assert_eq!(
            page.fields()[0].value,
            Some(Value::Text("web02".into())),
            "FormData is the source of truth on re-entry"
        );
    }

    #[test]
    fn cached_ui_state_loses_to_form_data() {
        let mut nav = navigator(TWO_STEPS);
        let mut form = FormData::new();
        let host = MockHost::new();

        nav.enter_current(&form);
        nav.set_field_value("host", Value::Text("committed".into()), &mut form);
        nav.next(&mut form, &host);
        nav.previous(&mut form);

        // Simulate stale in-page edits that were never committed.
        nav.current_page_mut().unwrap().fields_mut()[0].value =
            Some(Value::Text("uncommitted-edit".into()));
        nav.next(&mut form, &host);
        nav.previous(&mut form);

        // The uncommitted edit was saved by next(); FormData holds it now.
        assert_eq!(
            nav.current_page().unwrap().fields()[0].value,
            Some(Value::Text("uncommitted-edit".into()))
        );
        assert_eq!(
            form.get("host"),
            Some(&Value::Text("uncommitted-edit".into()))
        );
    }

    #[test]
    fn previous_is_a_no_op_on_step_one() {
        let mut nav = navigator(TWO_STEPS);
        let mut form = FormData::new();
        nav.enter_current(&form);
        match nav.previous(&mut form) {
            Transition::Moved(1) => {}
            other => panic!("expected stay on 1, got {:?}", other),
        }
    }

    #[test]
    fn round_trip_without_edits_changes_nothing() {
        let mut nav = navigator(TWO_STEPS);
        let mut form = FormData::new();
        let host = MockHost::new();

        nav.enter_current(&form);
        nav.set_field_value("host", Value::Text("web01".into()), &mut form);
        nav.next(&mut form, &host);

        // One warm-up cycle so both steps' flags have been computed.
        nav.previous(&mut form);
        nav.next(&mut form, &host);

        let form_before = form.clone();
        let flags_before = nav.flags().to_vec();

        nav.previous(&mut form);
        nav.next(&mut form, &host);
        nav.previous(&mut form);
        nav.next(&mut form, &host);

        assert_eq!(form.len(), form_before.len());
        assert_eq!(form.get("host"), form_before.get("host"));
        assert_eq!(nav.flags(), flags_before.as_slice());
    }

    #[test]
    fn flags_track_mandatory_completeness() {
        let mut nav = navigator(TWO_STEPS);
        let mut form = FormData::new();
        let host = MockHost::new();

        nav.enter_current(&form);
        nav.next(&mut form, &host);
        assert!(!nav.flags()[0].completed, "host missing");

        nav.previous(&mut form);
        nav.set_field_value("host", Value::Text("web01".into()), &mut form);
        nav.next(&mut form, &host);
        assert!(nav.flags()[0].completed);
        assert!(nav.flags()[0].valid);
    }

    #[test]
    fn finish_is_blocked_by_aggregated_violations() {
        let mut nav = navigator(TWO_STEPS);
        let mut form = FormData::new();
        let host = MockHost::new();

        nav.enter_current(&form);
        nav.next(&mut form, &host); // to step 2, host still missing

        match nav.next(&mut form, &host) {
            Transition::Blocked(report) => {
                assert_eq!(report.violations.len(), 1);
                assert_eq!(
                    report.violations[0].to_string(),
                    "Step 1 'First': 'host' is required."
                );
            }
            other => panic!("expected blocked, got {:?}", other),
        }
        // No transition happened.
        assert_eq!(nav.current_index(), 2);
    }

    #[test]
    fn finish_marks_every_step_complete() {
        let mut nav = navigator(TWO_STEPS);
        let mut form = FormData::new();
        let host = MockHost::new();

        nav.enter_current(&form);
        nav.set_field_value("host", Value::Text("web01".into()), &mut form);
        nav.next(&mut form, &host);

        match nav.next(&mut form, &host) {
            Transition::Finish => {}
            other => panic!("expected finish, got {:?}", other),
        }
        assert!(nav.flags().iter().all(|f| f.completed && f.valid));
    }

    #[test]
    fn navigate_to_jumps_without_gating() {
        let mut nav = navigator(
            r#"
            - title: Overview
              type: dashboard
            - title: Details
              parameters:
                - name: x
                  mandatory: true
            - title: More
        "#,
        );
        let mut form = FormData::new();
        nav.enter_current(&form);

        match nav.navigate_to(3, &mut form) {
            Transition::Moved(3) => {}
            other => panic!("expected move to 3, got {:?}", other),
        }

        // Out of range is ignored.
        match nav.navigate_to(9, &mut form) {
            Transition::Moved(3) => {}
            other => panic!("expected stay on 3, got {:?}", other),
        }
    }

    #[test]
    fn set_field_value_commits_immediately() {
        let mut nav = navigator(TWO_STEPS);
        let mut form = FormData::new();
        nav.enter_current(&form);

        assert!(nav.set_field_value("host", Value::Text("web01".into()), &mut form));
        assert_eq!(form.get("host"), Some(&Value::Text("web01".into())));

        assert!(!nav.set_field_value("ghost", Value::Text("x".into()), &mut form));
        assert!(!form.contains("ghost"));
    }
}
