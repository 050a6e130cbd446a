//! The reconciler
//!
//! Drives the ordered model through the resource contract. `reconcile`
//! walks the model forward, threading three snapshots: `expected` and
//! `actual` accumulate what the expected/actual observations refine,
//! and `new` carries what apply learns. A failed step rolls this run's
//! creations back in reverse. `destroy` walks the model backward,
//! retrying each delete through the transient-error classifier.
//!
//! One logical control thread drives everything; the only concurrency
//! is the signal watcher feeding the interrupt flag, which the loops
//! poll once per model index.

use crate::compare;
use crate::error::{CloudError, Result};
use crate::model::Model;
use crate::plan::{Action, ActionType, Plan};
use crate::resource::{Resource, ResourceState, Session};
use crate::retry::{RetryPolicy, is_retryable};
use keel_core::cluster::Cluster;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Cooperative interrupt flag. Tripping it never aborts a provider call
/// in flight; the loops honor it at the next model index.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Trip the flag on Ctrl-C. The watcher task runs until the process
    /// exits.
    pub fn watch_ctrl_c(&self) {
        let flag = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current resource");
                flag.trip();
            }
        });
    }
}

/// Outcome of a cleanup walk that could not finish.
struct CleanupFailure {
    abandoned: Vec<String>,
    source: CloudError,
}

pub struct Reconciler {
    session: Session,
    interrupt: InterruptFlag,
}

impl Reconciler {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            interrupt: InterruptFlag::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Converge the cloud toward the known snapshot and return the
    /// refined snapshot of what now exists.
    ///
    /// On failure, every resource this run created is deleted again in
    /// reverse order. If that rollback itself fails, the error lists
    /// what was left behind.
    pub async fn reconcile(&self, known: &Cluster, model: &Model) -> Result<Cluster> {
        let mut expected_cluster = known.clone();
        let mut actual_cluster = known.clone();
        let mut new_cluster = known.clone();
        let mut created: Vec<(usize, ResourceState)> = Vec::new();

        info!(cluster = %known.name, resources = model.len(), "Reconciling");

        for (index, resource) in model.iter().enumerate() {
            if self.interrupt.is_tripped() {
                return Err(self
                    .rollback(model, &created, &new_cluster, CloudError::Interrupted)
                    .await);
            }

            let step = async {
                let (next_expected, expected_state) =
                    resource.expected(&self.session, &expected_cluster).await?;
                let (next_actual, actual_state) =
                    resource.actual(&self.session, &actual_cluster).await?;
                let (next_new, new_state) = resource
                    .apply(&self.session, &actual_state, &expected_state, &new_cluster)
                    .await?;
                Ok::<_, CloudError>((
                    next_expected,
                    next_actual,
                    next_new,
                    actual_state,
                    new_state,
                ))
            };

            match step.await {
                Ok((next_expected, next_actual, next_new, actual_state, new_state)) => {
                    expected_cluster = next_expected;
                    actual_cluster = next_actual;
                    new_cluster = next_new;
                    debug!(
                        kind = %resource.kind(),
                        name = %resource.name(),
                        identifier = %new_state.identifier(),
                        "Reconciled resource"
                    );
                    if !actual_state.exists() && new_state.exists() {
                        created.push((index, new_state));
                    }
                }
                Err(err) => {
                    error!(
                        kind = %resource.kind(),
                        name = %resource.name(),
                        error = %err,
                        "Resource failed, rolling back this run's creations"
                    );
                    let failure = CloudError::ApplyFailed {
                        kind: resource.kind().to_string(),
                        name: resource.name().to_string(),
                        source: Box::new(err),
                    };
                    return Err(self.rollback(model, &created, &new_cluster, failure).await);
                }
            }
        }

        info!(cluster = %known.name, created = created.len(), "Reconcile complete");
        Ok(new_cluster)
    }

    /// Delete everything in the model, in reverse order, and return the
    /// snapshot with every identifier cleared.
    ///
    /// Each index re-observes and retries through the transient-error
    /// classifier with capped backoff; a non-retryable failure (or an
    /// exhausted budget) aborts the whole walk.
    pub async fn destroy(&self, known: &Cluster, model: &Model) -> Result<Cluster> {
        let mut cluster = known.clone();
        let policy = RetryPolicy::destroy();

        info!(cluster = %known.name, resources = model.len(), "Destroying");

        for resource in model.iter().rev() {
            if self.interrupt.is_tripped() {
                return Err(CloudError::Interrupted);
            }

            let started = Instant::now();
            let mut attempt: u32 = 0;
            loop {
                let (next, actual_state) = match resource.actual(&self.session, &cluster).await {
                    Ok(observed) => observed,
                    Err(err)
                        if is_retryable(&err) && policy.allows(attempt, started.elapsed()) =>
                    {
                        let delay = policy.delay_for_attempt(attempt);
                        warn!(
                            kind = %resource.kind(),
                            name = %resource.name(),
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "Observation blocked by a transient error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    Err(err) => return Err(self.delete_failed(resource, err)),
                };
                cluster = next;

                if !actual_state.exists() {
                    debug!(kind = %resource.kind(), name = %resource.name(), "Already absent");
                    break;
                }

                match resource.delete(&self.session, &actual_state, &cluster).await {
                    Ok((next, _)) => {
                        cluster = next;
                        break;
                    }
                    Err(err) if is_retryable(&err) && policy.allows(attempt, started.elapsed()) => {
                        let delay = policy.delay_for_attempt(attempt);
                        warn!(
                            kind = %resource.kind(),
                            name = %resource.name(),
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "Delete blocked by a transient error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(err) => return Err(self.delete_failed(resource, err)),
                }
            }
        }

        info!(cluster = %known.name, "Destroy complete");
        Ok(cluster)
    }

    /// Preview what `reconcile` would do, without touching anything.
    pub async fn plan(&self, known: &Cluster, model: &Model) -> Result<Plan> {
        let mut expected_cluster = known.clone();
        let mut actual_cluster = known.clone();
        let mut actions = Vec::with_capacity(model.len());

        for resource in model.iter() {
            let (next_expected, expected_state) =
                resource.expected(&self.session, &expected_cluster).await?;
            expected_cluster = next_expected;
            let (next_actual, actual_state) =
                resource.actual(&self.session, &actual_cluster).await?;
            actual_cluster = next_actual;

            let action_type = if compare::is_equal(&actual_state, &expected_state)? {
                ActionType::NoOp
            } else if actual_state.exists() {
                ActionType::Update
            } else {
                ActionType::Create
            };

            actions.push(Action {
                kind: resource.kind(),
                name: resource.name().to_string(),
                action_type,
                detail: actual_state.identifier().to_string(),
            });
        }

        Ok(Plan::new(actions))
    }

    /// Preview what `destroy` would delete, in deletion order.
    pub async fn destroy_plan(&self, known: &Cluster, model: &Model) -> Result<Plan> {
        let mut actual_cluster = known.clone();
        let mut actions = Vec::with_capacity(model.len());

        for resource in model.iter().rev() {
            let (next_actual, actual_state) =
                resource.actual(&self.session, &actual_cluster).await?;
            actual_cluster = next_actual;

            actions.push(Action {
                kind: resource.kind(),
                name: resource.name().to_string(),
                action_type: if actual_state.exists() {
                    ActionType::Delete
                } else {
                    ActionType::NoOp
                },
                detail: actual_state.identifier().to_string(),
            });
        }

        Ok(Plan::new(actions))
    }

    /// Undo this run's creations in reverse and shape the resulting
    /// error: the original failure when rollback finishes, or
    /// `RollbackAbandoned` naming the leftovers when it does not.
    async fn rollback(
        &self,
        model: &Model,
        created: &[(usize, ResourceState)],
        cluster: &Cluster,
        failure: CloudError,
    ) -> CloudError {
        match self.cleanup(model, created, cluster).await {
            Ok(_) => failure,
            Err(cleanup) => {
                error!(error = %cleanup.source, "Rollback failed");
                CloudError::RollbackAbandoned {
                    abandoned: cleanup.abandoned,
                    source: Box::new(failure),
                }
            }
        }
    }

    /// Delete the recorded creations, most recent first, retrying each
    /// through the transient-error classifier.
    async fn cleanup(
        &self,
        model: &Model,
        created: &[(usize, ResourceState)],
        cluster: &Cluster,
    ) -> std::result::Result<Cluster, CleanupFailure> {
        let resources = model.resources();
        let mut cluster = cluster.clone();

        for (position, (index, state)) in created.iter().enumerate().rev() {
            let resource = resources[*index].as_ref();
            info!(
                kind = %resource.kind(),
                name = %resource.name(),
                identifier = %state.identifier(),
                "Rolling back"
            );

            match self.delete_with_retry(resource, state, &cluster).await {
                Ok((next, _)) => cluster = next,
                Err(source) => {
                    let abandoned = created[..=position]
                        .iter()
                        .map(|(i, s)| {
                            let r = resources[*i].as_ref();
                            format!("{} '{}' ({})", r.kind(), r.name(), s.identifier())
                        })
                        .collect();
                    return Err(CleanupFailure { abandoned, source });
                }
            }
        }
        Ok(cluster)
    }

    async fn delete_with_retry(
        &self,
        resource: &dyn Resource,
        state: &ResourceState,
        cluster: &Cluster,
    ) -> Result<(Cluster, ResourceState)> {
        let policy = &self.session.retry;
        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match resource.delete(&self.session, state, cluster).await {
                Ok(result) => return Ok(result),
                Err(err) if is_retryable(&err) && policy.allows(attempt, started.elapsed()) => {
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        kind = %resource.kind(),
                        name = %resource.name(),
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying rollback delete"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn delete_failed(&self, resource: &dyn Resource, source: CloudError) -> CloudError {
        CloudError::DeleteFailed {
            kind: resource.kind().to_string(),
            name: resource.name().to_string(),
            source: Box::new(source),
        }
    }
}
