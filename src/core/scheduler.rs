//! Purpose: Order and run hydration stages by their declared dependencies.
//! Exports: `StageGraph`, `Scheduler`, `StageEvent`, `StageFailure`, `RunReport`.
//! Role: Cooperative executor; fetches run as tasks, results are applied on the caller's task.
//! Invariants: A stage launches only after every dependency has succeeded in this run.
//! Invariants: A halting failure blocks its dependents only; independent branches still settle.
//! Invariants: Eligible stages launch in declaration order.
//! Invariants: Results are applied one at a time, so each state field has a single writer.
//! Invariants: A result that arrives after the epoch moved is discarded, never applied.

use super::epoch::{EpochClock, RunEpoch};
use super::error::{Error, ErrorKind, Severity};
use super::progress::{COMPLETE, Progress};
use super::stage::{Stage, StageId};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct StageGraph<S, D> {
    stages: Vec<Stage<S, D>>,
    // Indexes of each stage's dependencies; always point at earlier stages.
    deps: Vec<Vec<usize>>,
}

impl<S, D> StageGraph<S, D> {
    pub fn new(stages: Vec<Stage<S, D>>) -> Result<Self, Error> {
        let mut deps = Vec::with_capacity(stages.len());
        let mut total: u32 = 0;

        for (idx, stage) in stages.iter().enumerate() {
            let declared = &stages[..idx];
            if declared.iter().any(|earlier| earlier.id() == stage.id()) {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("duplicate stage id `{}`", stage.id()))
                    .with_stage(stage.id().as_str()));
            }
            if stage.progress_weight() > COMPLETE {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("stage weight must be within 0..=100")
                    .with_stage(stage.id().as_str()));
            }
            total += u32::from(stage.progress_weight());

            let mut resolved = Vec::with_capacity(stage.dependencies().len());
            for dep in stage.dependencies() {
                let Some(pos) = declared.iter().position(|earlier| earlier.id() == *dep) else {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!(
                            "stage `{}` depends on `{dep}`, which is not declared before it",
                            stage.id()
                        ))
                        .with_hint("Declare every stage after the stages it depends on.")
                        .with_stage(stage.id().as_str()));
                };
                if !resolved.contains(&pos) {
                    resolved.push(pos);
                }
            }
            deps.push(resolved);
        }

        if total != u32::from(COMPLETE) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("stage weights must sum to 100 (got {total})")));
        }

        Ok(Self { stages, deps })
    }

    pub fn stages(&self) -> &[Stage<S, D>] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, id: StageId) -> Option<&Stage<S, D>> {
        self.stages.iter().find(|stage| stage.id() == id)
    }

    /// Launch order when every fetch succeeds and completes in launch order.
    pub fn launch_order(&self) -> Vec<StageId> {
        let mut launched = vec![false; self.stages.len()];
        let mut done = vec![false; self.stages.len()];
        let mut running = VecDeque::new();
        let mut order = Vec::with_capacity(self.stages.len());

        loop {
            for idx in 0..self.stages.len() {
                if !launched[idx] && self.deps[idx].iter().all(|dep| done[*dep]) {
                    launched[idx] = true;
                    running.push_back(idx);
                    order.push(self.stages[idx].id());
                }
            }
            let Some(idx) = running.pop_front() else {
                break;
            };
            done[idx] = true;
        }
        order
    }

    fn is_eligible(&self, idx: usize, status: &[StageStatus]) -> bool {
        status[idx] == StageStatus::Waiting
            && self.deps[idx]
                .iter()
                .all(|dep| status[*dep] == StageStatus::Succeeded)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum StageStatus {
    Waiting,
    Running,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StageEvent {
    Launched { stage: StageId },
    Applied { stage: StageId, percent: u8 },
    /// An optional stage failed and its fallback value was applied instead.
    Recovered { stage: StageId, percent: u8 },
    Failed { stage: StageId, kind: ErrorKind },
    /// First halting failure of the run; emitted right after its `Failed` event.
    Halted { stage: StageId, message: Option<String> },
    Discarded { stage: StageId },
}

#[derive(Debug)]
pub struct StageFailure {
    pub stage: StageId,
    pub error: Error,
}

#[derive(Debug)]
pub enum RunReport {
    Completed,
    Halted(StageFailure),
    Failed(Vec<StageFailure>),
    Superseded { epoch: RunEpoch, current: RunEpoch },
}

#[derive(Debug)]
pub struct Scheduler<'g, S, D> {
    graph: &'g StageGraph<S, D>,
    clock: Arc<EpochClock>,
    epoch: RunEpoch,
    fetch_timeout: Duration,
}

impl<'g, S, D> Scheduler<'g, S, D>
where
    D: Send + 'static,
{
    pub fn new(graph: &'g StageGraph<S, D>, clock: Arc<EpochClock>, epoch: RunEpoch) -> Self {
        Self {
            graph,
            clock,
            epoch,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn epoch(&self) -> RunEpoch {
        self.epoch
    }

    /// Runs every stage once. `observe` sees each transition right after it happens.
    pub async fn run<F>(&self, state: &mut S, progress: &mut Progress, mut observe: F) -> RunReport
    where
        F: FnMut(&StageEvent, &S, &Progress),
    {
        let stages = self.graph.stages();
        let mut status = vec![StageStatus::Waiting; stages.len()];
        let mut tasks: JoinSet<(usize, Result<D, Error>)> = JoinSet::new();
        let mut halted: Option<StageFailure> = None;
        let mut failures = Vec::new();

        info!(epoch = %self.epoch, stages = stages.len(), "hydration run started");

        loop {
            if !self.clock.is_current(self.epoch) {
                tasks.abort_all();
                return self.superseded();
            }

            // Dependents of a failed stage are never eligible, halted or not.
            for idx in 0..stages.len() {
                if !self.graph.is_eligible(idx, &status) {
                    continue;
                }
                let stage = &stages[idx];
                status[idx] = StageStatus::Running;
                self.spawn_fetch(&mut tasks, idx, stage, state);
                debug!(epoch = %self.epoch, stage = %stage.id(), "stage launched");
                observe(&StageEvent::Launched { stage: stage.id() }, state, progress);
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (idx, result) = match joined {
                Ok(completed) => completed,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => continue,
            };
            let stage = &stages[idx];

            if !self.clock.is_current(self.epoch) {
                warn!(
                    epoch = %self.epoch,
                    stage = %stage.id(),
                    "discarding result from a superseded run"
                );
                observe(&StageEvent::Discarded { stage: stage.id() }, state, progress);
                tasks.abort_all();
                return self.superseded();
            }

            match self.settle(stage, result, state) {
                Ok(recovered) => {
                    status[idx] = StageStatus::Succeeded;
                    let percent = progress.advance(stage.progress_weight());
                    debug!(epoch = %self.epoch, stage = %stage.id(), percent, recovered, "stage applied");
                    let event = if recovered {
                        StageEvent::Recovered {
                            stage: stage.id(),
                            percent,
                        }
                    } else {
                        StageEvent::Applied {
                            stage: stage.id(),
                            percent,
                        }
                    };
                    observe(&event, state, progress);
                }
                Err(err) => {
                    status[idx] = StageStatus::Failed;
                    let err = if err.stage().is_none() {
                        err.with_stage(stage.id().as_str())
                    } else {
                        err
                    };
                    let kind = err.kind();
                    observe(
                        &StageEvent::Failed {
                            stage: stage.id(),
                            kind,
                        },
                        state,
                        progress,
                    );
                    let failure = StageFailure {
                        stage: stage.id(),
                        error: err,
                    };
                    if kind.severity() == Severity::Halt && halted.is_none() {
                        warn!(
                            epoch = %self.epoch,
                            stage = %stage.id(),
                            error = %failure.error,
                            "stage failed; halting its dependents"
                        );
                        observe(
                            &StageEvent::Halted {
                                stage: stage.id(),
                                message: failure.error.message().map(str::to_string),
                            },
                            state,
                            progress,
                        );
                        halted = Some(failure);
                    } else {
                        warn!(
                            epoch = %self.epoch,
                            stage = %stage.id(),
                            error = %failure.error,
                            "stage failed; dependents will not run"
                        );
                        failures.push(failure);
                    }
                }
            }
        }

        if let Some(failure) = halted {
            return RunReport::Halted(failure);
        }
        if !failures.is_empty() {
            return RunReport::Failed(failures);
        }
        debug_assert!(status.iter().all(|s| *s == StageStatus::Succeeded));
        info!(epoch = %self.epoch, percent = progress.percent(), "hydration run completed");
        RunReport::Completed
    }

    fn spawn_fetch(
        &self,
        tasks: &mut JoinSet<(usize, Result<D, Error>)>,
        idx: usize,
        stage: &Stage<S, D>,
        state: &S,
    ) {
        let fetch = stage.launch(state);
        let timeout = self.fetch_timeout;
        let id = stage.id();
        tasks.spawn(async move {
            let result = match tokio::time::timeout(timeout, fetch).await {
                Ok(result) => result,
                Err(_) => Err(Error::new(ErrorKind::Transient)
                    .with_message(format!("fetch timed out after {}ms", timeout.as_millis()))
                    .with_stage(id.as_str())),
            };
            (idx, result)
        });
    }

    // Ok(true) when an optional stage fell back to its recovery value.
    fn settle(
        &self,
        stage: &Stage<S, D>,
        result: Result<D, Error>,
        state: &mut S,
    ) -> Result<bool, Error> {
        match result {
            Ok(data) => stage.apply_to(data, state).map(|()| false),
            Err(err) if err.kind().severity() != Severity::Halt => match stage.recover_from(&err) {
                Some(fallback) => {
                    info!(stage = %stage.id(), error = %err, "optional stage degraded");
                    stage.apply_to(fallback, state).map(|()| true)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    fn superseded(&self) -> RunReport {
        let current = self.clock.current();
        info!(epoch = %self.epoch, current = %current, "hydration run superseded");
        RunReport::Superseded {
            epoch: self.epoch,
            current,
        }
    }
}
