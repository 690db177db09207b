//! Simulation worker processes.
//!
//! Each started backtest gets a [`Process`]: one tokio task owning the
//! [`TradingContext`] exclusively, fed through a single command channel.
//! Job steps, `post_exec` queries and pause/cancel signals all serialize
//! through that channel, so control-plane reads always observe a step
//! boundary. A shared semaphore bounds how many workers simulate at once;
//! a worker queued for a slot still answers queries and control commands.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};

use tickrig_core::{Error, Result};

use crate::context::{RunStatus, TradingContext};
use crate::jobs::{Job, StepOutcome};

type ExecFn = Box<dyn FnOnce(&mut TradingContext) + Send>;

enum Task {
    Run(Vec<Box<dyn Job>>),
    Exec(ExecFn),
    Pause,
    Cancel,
}

/// Handle to one simulation worker.
///
/// Dropping the handle closes the channel and winds the worker down.
pub struct Process {
    commands: mpsc::UnboundedSender<Task>,
}

impl Process {
    /// Spawn a worker owning `context`, drawing a slot from `pool` once
    /// jobs are submitted.
    pub fn spawn(context: TradingContext, pool: Arc<Semaphore>) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        let worker = Worker {
            context,
            inbox,
            pool,
            permit: None,
            jobs: VecDeque::new(),
            started: false,
        };
        tokio::spawn(worker.run());
        Self { commands }
    }

    /// Submit the jobs; execution begins once a pool slot is acquired.
    pub fn start(&self, jobs: Vec<Box<dyn Job>>) -> Result<()> {
        self.send(Task::Run(jobs))
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Task::Pause)
    }

    pub fn cancel(&self) -> Result<()> {
        self.send(Task::Cancel)
    }

    /// Run `f` inside the worker with exclusive access to the context.
    ///
    /// Resolves at the next step boundary, so the returned value is a
    /// consistent snapshot even immediately after a pause or cancel.
    pub async fn post_exec<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TradingContext) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply, answer) = oneshot::channel();
        self.send(Task::Exec(Box::new(move |context| {
            let _ = reply.send(f(context));
        })))?;
        answer
            .await
            .map_err(|_| Error::illegal_state("simulation worker is gone"))
    }

    fn send(&self, task: Task) -> Result<()> {
        self.commands
            .send(task)
            .map_err(|_| Error::illegal_state("simulation worker is gone"))
    }
}

struct Worker {
    context: TradingContext,
    inbox: mpsc::UnboundedReceiver<Task>,
    pool: Arc<Semaphore>,
    permit: Option<OwnedSemaphorePermit>,
    jobs: VecDeque<Box<dyn Job>>,
    started: bool,
}

impl Worker {
    async fn run(mut self) {
        loop {
            if self.waiting_for_slot() {
                tokio::select! {
                    biased;
                    task = self.inbox.recv() => match task {
                        Some(task) => self.handle(task),
                        None => break,
                    },
                    permit = Arc::clone(&self.pool).acquire_owned() => {
                        let Ok(permit) = permit else { break };
                        self.permit = Some(permit);
                        self.context.begin();
                    }
                }
            } else if self.context.status() == RunStatus::Running && !self.jobs.is_empty() {
                // Commands queued since the last step go first
                loop {
                    match self.inbox.try_recv() {
                        Ok(task) => self.handle(task),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => return,
                    }
                }
                if self.context.status() == RunStatus::Running && !self.jobs.is_empty() {
                    self.step().await;
                }
            } else {
                if self.context.status() == RunStatus::Running && self.jobs.is_empty() {
                    self.context.finish();
                }
                self.release_slot();
                match self.inbox.recv().await {
                    Some(task) => self.handle(task),
                    None => break,
                }
            }
        }
    }

    fn waiting_for_slot(&self) -> bool {
        self.started
            && self.permit.is_none()
            && self.context.status() == RunStatus::WaitForStart
    }

    fn release_slot(&mut self) {
        if self.context.status() != RunStatus::Running && self.permit.take().is_some() {
            tracing::debug!(
                backtest_id = %self.context.backtest_id(),
                "simulation slot released"
            );
        }
    }

    fn handle(&mut self, task: Task) {
        match task {
            Task::Run(jobs) => {
                if self.started {
                    tracing::warn!(
                        backtest_id = %self.context.backtest_id(),
                        "jobs already submitted to this worker; ignoring"
                    );
                    return;
                }
                self.jobs = jobs.into();
                self.started = true;
            }
            Task::Exec(func) => func(&mut self.context),
            Task::Pause => {
                if matches!(
                    self.context.status(),
                    RunStatus::WaitForStart | RunStatus::Running
                ) {
                    self.context.pause();
                    self.jobs.clear();
                }
            }
            Task::Cancel => {
                if matches!(
                    self.context.status(),
                    RunStatus::WaitForStart | RunStatus::Running | RunStatus::Paused
                ) {
                    self.context.cancel();
                    self.jobs.clear();
                }
            }
        }
    }

    /// Run one step of the frontmost job.
    ///
    /// A failing step marks the context failed and drops the remaining
    /// jobs; the error never propagates past this worker.
    async fn step(&mut self) {
        let Some(mut job) = self.jobs.pop_front() else {
            return;
        };
        match job.step(&mut self.context).await {
            Ok(StepOutcome::Continue) => self.jobs.push_front(job),
            Ok(StepOutcome::Finished) => {}
            Err(error) => {
                tracing::error!(
                    backtest_id = %self.context.backtest_id(),
                    error = %error,
                    "job step failed"
                );
                self.context.fail();
                self.jobs.clear();
            }
        }
    }
}
