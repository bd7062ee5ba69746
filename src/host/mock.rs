//! Scriptable in-memory script host for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Result, SwitchbackError};
use crate::form::Value;

use super::{CancelToken, HostOutcome, RunState, ScriptHost, ScriptSource, StreamKind, StreamRecord, StreamSink};

/// Canned response for one `evaluate` expression.
#[derive(Debug, Clone)]
enum EvalResponse {
    Value(Value),
    Error(String),
}

/// Canned outcome for one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub records: Vec<StreamRecord>,
    pub state: RunState,
    pub exit_code: Option<i32>,
}

impl RunPlan {
    pub fn completed() -> Self {
        Self {
            records: Vec::new(),
            state: RunState::Completed,
            exit_code: Some(0),
        }
    }

    pub fn failed(exit_code: i32) -> Self {
        Self {
            records: Vec::new(),
            state: RunState::Failed,
            exit_code: Some(exit_code),
        }
    }

    pub fn with_record(mut self, kind: StreamKind, text: &str) -> Self {
        self.records.push(StreamRecord::new(kind, text));
        self
    }
}

#[derive(Default)]
struct MockState {
    eval_responses: HashMap<String, EvalResponse>,
    eval_log: Vec<String>,
    run_plans: VecDeque<RunPlan>,
    run_log: Vec<RunCall>,
}

/// One recorded `run` invocation.
#[derive(Debug, Clone)]
pub struct RunCall {
    pub source: String,
    /// Binding values rendered as strings, for assertion convenience.
    pub bindings: HashMap<String, String>,
}

/// Script host whose responses are scripted by the test.
///
/// Unmapped evaluations return empty text; unplanned runs complete
/// successfully with no output. Every call is recorded for assertions.
#[derive(Default)]
pub struct MockHost {
    state: Mutex<MockState>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an expression to a fixed evaluation result.
    pub fn set_eval(&self, expression: &str, value: Value) {
        self.state
            .lock()
            .unwrap()
            .eval_responses
            .insert(expression.to_string(), EvalResponse::Value(value));
    }

    /// Map an expression to an evaluation failure.
    pub fn set_eval_error(&self, expression: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .eval_responses
            .insert(expression.to_string(), EvalResponse::Error(message.to_string()));
    }

    /// Queue the outcome for the next `run` call (consumed in order).
    pub fn queue_run(&self, plan: RunPlan) {
        self.state.lock().unwrap().run_plans.push_back(plan);
    }

    /// Expressions evaluated so far, in call order.
    pub fn eval_log(&self) -> Vec<String> {
        self.state.lock().unwrap().eval_log.clone()
    }

    /// Number of times an expression was evaluated.
    pub fn eval_count(&self, expression: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .eval_log
            .iter()
            .filter(|e| e.as_str() == expression)
            .count()
    }

    /// Recorded `run` invocations.
    pub fn run_log(&self) -> Vec<RunCall> {
        self.state.lock().unwrap().run_log.clone()
    }

    pub fn run_count(&self) -> usize {
        self.state.lock().unwrap().run_log.len()
    }
}

impl ScriptHost for MockHost {
    fn run(
        &self,
        source: &ScriptSource,
        bindings: &HashMap<String, Value>,
        sink: StreamSink,
        cancel: &CancelToken,
    ) -> Result<HostOutcome> {
        let source_text = match source {
            ScriptSource::Inline(text) => text.clone(),
            ScriptSource::File(path) => path.display().to_string(),
        };
        let plan = {
            let mut state = self.state.lock().unwrap();
            state.run_log.push(RunCall {
                source: source_text,
                bindings: bindings
                    .iter()
                    .map(|(k, v)| (k.clone(), v.as_binding_string()))
                    .collect(),
            });
            state.run_plans.pop_front().unwrap_or_else(RunPlan::completed)
        };

        if cancel.is_canceled() {
            return Ok(HostOutcome {
                state: RunState::Canceled,
                exit_code: None,
                captured: Vec::new(),
                duration: Duration::ZERO,
            });
        }

        let mut captured = Vec::new();
        for record in plan.records {
            if record.kind == StreamKind::Output {
                captured.push(record.text.clone());
            }
            sink(record);
        }

        Ok(HostOutcome {
            state: plan.state,
            exit_code: plan.exit_code,
            captured,
            duration: Duration::ZERO,
        })
    }

    fn evaluate(&self, expression: &str, _bindings: &HashMap<String, Value>) -> Result<Value> {
        let response = {
            let mut state = self.state.lock().unwrap();
            state.eval_log.push(expression.to_string());
            state.eval_responses.get(expression).cloned()
        };
        match response {
            Some(EvalResponse::Value(value)) => Ok(value),
            Some(EvalResponse::Error(message)) => Err(SwitchbackError::Evaluation {
                expression: expression.to_string(),
                message,
            }),
            None => Ok(Value::Text(String::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_evaluate_returns_empty_text() {
        let host = MockHost::new();
        let value = host.evaluate("anything", &HashMap::new()).unwrap();
        assert_eq!(value, Value::Text(String::new()));
        assert_eq!(host.eval_count("anything"), 1);
    }

    #[test]
    fn mapped_evaluate_returns_scripted_value() {
        let host = MockHost::new();
        host.set_eval("list-envs", Value::List(vec!["dev".into(), "prod".into()]));
        let value = host.evaluate("list-envs", &HashMap::new()).unwrap();
        assert_eq!(value, Value::List(vec!["dev".into(), "prod".into()]));
    }

    #[test]
    fn eval_error_surfaces_as_evaluation_error() {
        let host = MockHost::new();
        host.set_eval_error("bad", "boom");
        let err = host.evaluate("bad", &HashMap::new()).unwrap_err();
        assert!(matches!(err, SwitchbackError::Evaluation { .. }));
    }

    #[test]
    fn queued_runs_are_consumed_in_order() {
        let host = MockHost::new();
        host.queue_run(RunPlan::failed(1));
        host.queue_run(RunPlan::completed());

        let sink: StreamSink = Box::new(|_| {});
        let first = host
            .run(
                &ScriptSource::Inline("a".into()),
                &HashMap::new(),
                sink,
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(first.state, RunState::Failed);

        let sink: StreamSink = Box::new(|_| {});
        let second = host
            .run(
                &ScriptSource::Inline("b".into()),
                &HashMap::new(),
                sink,
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(second.state, RunState::Completed);
        assert_eq!(host.run_count(), 2);
    }

    #[test]
    fn run_emits_planned_records_and_captures_output() {
        let host = MockHost::new();
        host.queue_run(
            RunPlan::completed()
                .with_record(StreamKind::Output, "line1")
                .with_record(StreamKind::Error, "oops"),
        );

        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let seen_clone = std::sync::Arc::clone(&seen);
        let sink: StreamSink = Box::new(move |r| seen_clone.lock().unwrap().push(r.text.clone()));

        let outcome = host
            .run(
                &ScriptSource::Inline("x".into()),
                &HashMap::new(),
                sink,
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(outcome.captured, vec!["line1".to_string()]);
        assert_eq!(*seen.lock().unwrap(), vec!["line1", "oops"]);
    }
}
