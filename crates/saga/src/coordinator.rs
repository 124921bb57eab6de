//! Saga coordinator.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::context::ExecutionContext;
use crate::error::ExecutionError;
use crate::log::ExecutionLog;
use crate::outcome::{CompensationStatus, ExecutionResult, ForwardStatus, StepOutcome};
use crate::saga::Saga;
use crate::state::SagaState;
use crate::step::Step;

/// Plays one saga.
///
/// Forward actions run strictly in insertion order under the operation
/// context. On the first failure (or once the operation context has ended)
/// no further step starts, and every attempted step is compensated in
/// reverse order under the compensation context. The failed step itself is
/// included, a step that never ran is not.
pub struct Coordinator<E> {
    operation: ExecutionContext,
    compensation: ExecutionContext,
    saga: Saga<E>,
    log: Arc<dyn ExecutionLog>,
}

impl<E> Coordinator<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new(
        operation: ExecutionContext,
        compensation: ExecutionContext,
        saga: Saga<E>,
        log: Arc<dyn ExecutionLog>,
    ) -> Self {
        Self {
            operation,
            compensation,
            saga,
            log,
        }
    }

    /// Runs the saga to completion or through its rollback.
    ///
    /// The returned error is the forward error of the first failing step.
    /// Compensation errors are recorded in the step outcomes and the log,
    /// never raised.
    #[tracing::instrument(skip(self), fields(saga = %self.saga.name(), steps = self.saga.len()))]
    pub async fn play(self) -> ExecutionResult<E> {
        let Coordinator {
            operation,
            compensation,
            saga,
            log,
        } = self;
        let (saga_name, steps) = saga.into_parts();

        metrics::counter!("saga_executions_total", "saga" => saga_name.clone()).increment(1);
        let saga_start = Instant::now();

        let mut state = SagaState::Running;

        let mut outcomes: Vec<StepOutcome> = Vec::with_capacity(steps.len());
        let mut error = None;

        for step in &steps {
            if operation.is_done() {
                tracing::warn!(step = step.name(), "operation context ended before step");
                error = Some(ExecutionError::Cancelled {
                    step: step.name().to_string(),
                });
                break;
            }

            tracing::debug!(step = step.name(), "saga step started");
            let started_at = Utc::now();
            let clock = Instant::now();
            let result = step.run_forward(operation.clone()).await;

            let forward = match &result {
                Ok(()) => ForwardStatus::Succeeded,
                Err(e) => ForwardStatus::Failed {
                    error: e.to_string(),
                },
            };
            outcomes.push(StepOutcome {
                step: step.name().to_string(),
                forward,
                compensation: None,
                started_at,
                duration: clock.elapsed(),
                options: step.step_options(),
            });

            if let Err(source) = result {
                tracing::warn!(step = step.name(), error = %source, "saga step failed");
                error = Some(ExecutionError::Step {
                    step: step.name().to_string(),
                    source,
                });
                break;
            }
        }

        if error.is_some() && state.can_compensate() {
            state = SagaState::Compensating;
            tracing::debug!(%state, "unwinding attempted steps");
            let failures = compensate(&saga_name, &steps, &mut outcomes, &compensation).await;
            state = if failures == 0 {
                SagaState::Compensated
            } else {
                SagaState::PartiallyCompensated
            };
            metrics::counter!("saga_failed", "saga" => saga_name.clone()).increment(1);
        } else {
            state = SagaState::Completed;
            metrics::counter!("saga_completed", "saga" => saga_name.clone()).increment(1);
        }

        log.record(&saga_name, &outcomes).await;

        metrics::histogram!("saga_duration_seconds", "saga" => saga_name.clone())
            .record(saga_start.elapsed().as_secs_f64());
        tracing::info!(%state, attempted = outcomes.len(), "saga finished");

        ExecutionResult {
            saga_name,
            state,
            steps: outcomes,
            error,
        }
    }
}

/// Compensates every attempted step in reverse. Returns the number of
/// compensations that failed.
async fn compensate<E>(
    saga_name: &str,
    steps: &[Step<E>],
    outcomes: &mut [StepOutcome],
    ctx: &ExecutionContext,
) -> usize
where
    E: std::error::Error + Send + Sync + 'static,
{
    let mut failures = 0;

    // outcomes[i] always belongs to steps[i]: attempted steps form a prefix.
    for (step, outcome) in steps.iter().zip(outcomes.iter_mut()).rev() {
        if !step.has_compensation() {
            outcome.compensation = Some(CompensationStatus::NotRequired);
            continue;
        }

        if ctx.is_done() {
            tracing::error!(
                step = step.name(),
                "compensation budget exhausted, step left for reconciliation"
            );
            outcome.compensation = Some(CompensationStatus::Failed {
                error: "compensation context ended".to_string(),
            });
            failures += 1;
            metrics::counter!("saga_compensation_failures", "saga" => saga_name.to_string())
                .increment(1);
            continue;
        }

        tracing::info!(step = step.name(), "compensating step");
        metrics::counter!("saga_compensations_total", "saga" => saga_name.to_string())
            .increment(1);

        outcome.compensation = match step.run_compensation(ctx.clone()).await {
            None => Some(CompensationStatus::NotRequired),
            Some(Ok(())) => Some(CompensationStatus::Compensated),
            Some(Err(e)) => {
                tracing::error!(step = step.name(), error = %e, "compensation failed");
                failures += 1;
                metrics::counter!("saga_compensation_failures", "saga" => saga_name.to_string())
                    .increment(1);
                Some(CompensationStatus::Failed {
                    error: e.to_string(),
                })
            }
        };
    }

    failures
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::context::CancelHandle;
    use crate::log::InMemoryExecutionLog;
    use crate::step::Step;

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("{0}")]
    struct TestError(String);

    type Calls = Arc<Mutex<Vec<String>>>;

    fn step(name: &str, calls: &Calls, fail_forward: bool, fail_compensate: bool) -> Step<TestError> {
        let fwd_calls = calls.clone();
        let comp_calls = calls.clone();
        let fwd_name = name.to_string();
        let comp_name = name.to_string();
        Step::new(name)
            .forward(move |_| {
                let calls = fwd_calls.clone();
                let name = fwd_name.clone();
                async move {
                    calls.lock().unwrap().push(format!("fwd:{name}"));
                    if fail_forward {
                        Err(TestError(format!("{name} refused")))
                    } else {
                        Ok(())
                    }
                }
            })
            .compensate(move |_| {
                let calls = comp_calls.clone();
                let name = comp_name.clone();
                async move {
                    calls.lock().unwrap().push(format!("comp:{name}"));
                    if fail_compensate {
                        Err(TestError(format!("{name} rollback failed")))
                    } else {
                        Ok(())
                    }
                }
            })
    }

    fn build(n: usize, failing: Option<usize>, calls: &Calls) -> Saga<TestError> {
        let mut saga = Saga::new("test");
        for i in 1..=n {
            saga.add_step(step(&format!("s{i}"), calls, Some(i) == failing, false))
                .unwrap();
        }
        saga
    }

    fn coordinator(saga: Saga<TestError>, log: &InMemoryExecutionLog) -> Coordinator<TestError> {
        Coordinator::new(
            ExecutionContext::background(),
            ExecutionContext::background(),
            saga,
            Arc::new(log.clone()),
        )
    }

    fn recorded(calls: &Calls) -> Vec<String> {
        calls.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_all_steps_succeed_without_compensation() {
        let calls = Calls::default();
        let log = InMemoryExecutionLog::new();

        let result = coordinator(build(3, None, &calls), &log).play().await;

        assert!(result.is_success());
        assert_eq!(result.state, SagaState::Completed);
        assert_eq!(recorded(&calls), vec!["fwd:s1", "fwd:s2", "fwd:s3"]);
        assert!(result.steps().iter().all(|s| s.compensation.is_none()));
        assert_eq!(log.len().await, 1);
    }

    #[tokio::test]
    async fn test_failure_unwinds_attempted_prefix_in_reverse() {
        for n in 1..=5 {
            for k in 1..=n {
                let calls = Calls::default();
                let log = InMemoryExecutionLog::new();

                let result = coordinator(build(n, Some(k), &calls), &log).play().await;

                let mut expected: Vec<String> = (1..=k).map(|i| format!("fwd:s{i}")).collect();
                expected.extend((1..=k).rev().map(|i| format!("comp:s{i}")));
                assert_eq!(recorded(&calls), expected, "n={n} k={k}");
                assert_eq!(result.steps().len(), k);
                assert_eq!(result.state, SagaState::Compensated);
                assert_eq!(result.error().unwrap().step(), format!("s{k}"));
            }
        }
    }

    #[tokio::test]
    async fn test_error_message_is_domain_message() {
        let calls = Calls::default();
        let log = InMemoryExecutionLog::new();

        let result = coordinator(build(3, Some(2), &calls), &log).play().await;

        let err = result.into_error().unwrap();
        assert_eq!(err.to_string(), "s2 refused");
        assert_eq!(err.domain_error(), Some(&TestError("s2 refused".into())));
    }

    #[tokio::test]
    async fn test_step_without_compensation_is_not_required() {
        let calls = Calls::default();
        let log = InMemoryExecutionLog::new();
        let mut saga = Saga::new("test");
        saga.add_step(Step::new("create_order").forward(|_| async { Ok(()) }))
            .unwrap();
        saga.add_step(step("call_bank", &calls, true, false)).unwrap();

        let result = coordinator(saga, &log).play().await;

        assert_eq!(
            result.steps()[0].compensation,
            Some(CompensationStatus::NotRequired)
        );
        assert!(result.steps()[1].compensated());
        assert_eq!(result.compensated_steps(), vec!["call_bank"]);
    }

    #[tokio::test]
    async fn test_compensation_failure_is_recorded_not_raised() {
        let calls = Calls::default();
        let log = InMemoryExecutionLog::new();
        let mut saga = Saga::new("test");
        saga.add_step(step("s1", &calls, false, false)).unwrap();
        saga.add_step(step("s2", &calls, false, true)).unwrap();
        saga.add_step(step("s3", &calls, true, false)).unwrap();

        let result = coordinator(saga, &log).play().await;

        // s2's rollback failing does not stop s1's.
        assert_eq!(
            recorded(&calls),
            vec!["fwd:s1", "fwd:s2", "fwd:s3", "comp:s3", "comp:s2", "comp:s1"]
        );
        assert_eq!(result.state, SagaState::PartiallyCompensated);
        assert!(result.steps()[1].compensation_failed());
        assert_eq!(result.error().unwrap().to_string(), "s3 refused");

        let record = log.last_for("test").await.unwrap();
        assert!(record.outcomes[1].compensation_failed());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step_runs_nothing() {
        let calls = Calls::default();
        let (op, handle) = ExecutionContext::cancellable();
        handle.cancel();

        let result = Coordinator::new(
            op,
            ExecutionContext::background(),
            build(3, None, &calls),
            Arc::new(InMemoryExecutionLog::new()),
        )
        .play()
        .await;

        assert!(recorded(&calls).is_empty());
        assert!(result.steps().is_empty());
        assert!(matches!(
            result.error(),
            Some(ExecutionError::Cancelled { step }) if step == "s1"
        ));
    }

    #[tokio::test]
    async fn test_cancel_mid_saga_compensates_on_separate_context() {
        let calls = Calls::default();
        let (op, handle) = ExecutionContext::cancellable();
        let handle: Arc<Mutex<Option<CancelHandle>>> = Arc::new(Mutex::new(Some(handle)));
        let comp_saw_done = Arc::new(Mutex::new(Vec::new()));

        let mut saga = Saga::new("test");
        saga.add_step(step("s1", &calls, false, false)).unwrap();
        let cancel = handle.clone();
        let seen = comp_saw_done.clone();
        saga.add_step(
            Step::new("s2")
                .forward(move |_| {
                    let cancel = cancel.clone();
                    async move {
                        // The client disconnects while s2 is in flight.
                        if let Some(h) = cancel.lock().unwrap().take() {
                            h.cancel();
                        }
                        Ok(())
                    }
                })
                .compensate(move |ctx| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().unwrap().push(ctx.is_done());
                        Ok(())
                    }
                }),
        )
        .unwrap();
        saga.add_step(step("s3", &calls, false, false)).unwrap();

        let result = Coordinator::new(
            op,
            ExecutionContext::with_timeout(Duration::from_secs(30)),
            saga,
            Arc::new(InMemoryExecutionLog::new()),
        )
        .play()
        .await;

        assert_eq!(recorded(&calls), vec!["fwd:s1", "comp:s1"]);
        assert_eq!(*comp_saw_done.lock().unwrap(), vec![false]);
        assert_eq!(result.steps().len(), 2);
        assert_eq!(result.state, SagaState::Compensated);
        assert!(matches!(
            result.error(),
            Some(ExecutionError::Cancelled { step }) if step == "s3"
        ));
    }

    #[tokio::test]
    async fn test_empty_saga_completes() {
        let log = InMemoryExecutionLog::new();
        let result = coordinator(Saga::new("empty"), &log).play().await;

        assert!(result.is_success());
        assert_eq!(result.state, SagaState::Completed);
        assert!(result.steps().is_empty());
    }

    #[tokio::test]
    async fn test_every_attempted_step_is_logged() {
        let calls = Calls::default();
        let log = InMemoryExecutionLog::new();

        coordinator(build(4, Some(3), &calls), &log).play().await;

        let record = log.last_for("test").await.unwrap();
        let names: Vec<_> = record.outcomes.iter().map(|o| o.step.as_str()).collect();
        assert_eq!(names, vec!["s1", "s2", "s3"]);
        assert!(matches!(record.outcomes[2].forward, ForwardStatus::Failed { .. }));
    }
}
