//! Periodic trigger for the pipeline.
//!
//! Each firing runs in its own task with its own [`RunContext`]. What happens
//! when a firing lands while the previous run is still in flight is decided by
//! [`OverlapPolicy`], enforced through a [`RunGuard`] keyed on the pipeline name.
//!
//! [`RunContext`]: crate::pipeline::RunContext

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::pipeline::{Pipeline, RunReport};
use crate::UtcDateTime;

/// Trigger expression could not be understood.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported schedule '{expression}': {reason}")]
pub struct TriggerError {
    pub expression: String,
    pub reason: &'static str,
}

/// Fixed-period trigger.
///
/// Accepted forms: `every N seconds|minutes|hours` (singular units allowed,
/// `N` optional) and the cron shorthands `* * * * *` and `*/N * * * *`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    period: Duration,
}

impl Trigger {
    pub fn every(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::every(Duration::from_secs(60))
    }
}

impl Display for Trigger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "every {} seconds", self.period.as_secs())
    }
}

impl FromStr for Trigger {
    type Err = TriggerError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let fail = |reason| TriggerError {
            expression: expression.to_string(),
            reason,
        };
        let tokens: Vec<&str> = expression.split_whitespace().collect();

        let period = match tokens.as_slice() {
            ["every", rest @ ..] => {
                let (count, unit) = match rest {
                    [unit] => (1, *unit),
                    [count, unit] => (
                        count
                            .parse::<u64>()
                            .map_err(|_| fail("interval count must be a positive integer"))?,
                        *unit,
                    ),
                    _ => return Err(fail("expected 'every <N> <unit>'")),
                };
                let unit_secs = match unit.to_ascii_lowercase().trim_end_matches('s') {
                    "second" | "sec" => 1,
                    "minute" | "min" => 60,
                    "hour" => 3600,
                    _ => return Err(fail("unit must be seconds, minutes or hours")),
                };
                count.saturating_mul(unit_secs)
            }
            [minute, "*", "*", "*", "*"] => {
                let count = match *minute {
                    "*" => 1,
                    step => step
                        .strip_prefix("*/")
                        .and_then(|n| n.parse::<u64>().ok())
                        .ok_or_else(|| fail("only '*' and '*/N' minute fields are supported"))?,
                };
                count.saturating_mul(60)
            }
            _ => return Err(fail("expected 'every <N> <unit>' or '*/N * * * *'")),
        };

        if period == 0 {
            return Err(fail("period must be greater than zero"));
        }
        Ok(Self::every(Duration::from_secs(period)))
    }
}

/// What to do when a firing overlaps a run still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Start the new run regardless.
    Allow,
    /// Drop the firing.
    #[default]
    Skip,
    /// Queue the firing behind the running one.
    Serialize,
}

impl Display for OverlapPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::Skip => "skip",
            Self::Serialize => "serialize",
        })
    }
}

/// Single-flight slots keyed by pipeline name.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    slots: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key.to_string()).or_default().clone()
    }
}

/// Result of one firing, as sent on the report channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(RunReport),
    Skipped {
        pipeline: String,
        fired_at: UtcDateTime,
    },
    Failed {
        pipeline: String,
        run_id: String,
        code: &'static str,
        message: String,
    },
}

/// Fires a pipeline on a fixed period.
#[derive(Clone)]
pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    trigger: Trigger,
    overlap: OverlapPolicy,
    guard: RunGuard,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, trigger: Trigger, overlap: OverlapPolicy) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            trigger,
            overlap,
            guard: RunGuard::new(),
        }
    }

    /// Share single-flight slots with other schedulers.
    pub fn with_guard(mut self, guard: RunGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn overlap(&self) -> OverlapPolicy {
        self.overlap
    }

    /// Handle one firing under the overlap policy.
    pub async fn fire(&self) -> RunOutcome {
        match self.overlap {
            OverlapPolicy::Allow => self.run_once().await,
            OverlapPolicy::Skip => {
                let slot = self.guard.slot(self.pipeline.name());
                let Ok(_permit) = slot.try_lock_owned() else {
                    warn!(
                        pipeline = self.pipeline.name(),
                        "previous run still in flight; skipping firing"
                    );
                    return RunOutcome::Skipped {
                        pipeline: self.pipeline.name().to_string(),
                        fired_at: self.pipeline.now(),
                    };
                };
                self.run_once().await
            }
            OverlapPolicy::Serialize => {
                let _permit = self.guard.slot(self.pipeline.name()).lock_owned().await;
                self.run_once().await
            }
        }
    }

    async fn run_once(&self) -> RunOutcome {
        let mut context = self.pipeline.start_run();
        match self.pipeline.execute(&mut context).await {
            Ok(report) => RunOutcome::Completed(report),
            Err(e) => RunOutcome::Failed {
                pipeline: self.pipeline.name().to_string(),
                run_id: context.run_id,
                code: e.code(),
                message: e.to_string(),
            },
        }
    }

    /// Fire on every period until `shutdown` resolves, then wait for in-flight runs.
    ///
    /// Outcomes are sent on `outcomes`; a closed receiver is ignored.
    pub async fn run_until<F>(&self, shutdown: F, outcomes: mpsc::Sender<RunOutcome>)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.trigger.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight = JoinSet::new();
        tokio::pin!(shutdown);

        info!(
            pipeline = self.pipeline.name(),
            trigger = %self.trigger,
            overlap = %self.overlap,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let scheduler = self.clone();
                    let outcomes = outcomes.clone();
                    in_flight.spawn(async move {
                        let outcome = scheduler.fire().await;
                        let _ = outcomes.send(outcome).await;
                    });
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "pipeline run task aborted");
                    }
                }
            }
        }

        info!(in_flight = in_flight.len(), "scheduler stopping");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "pipeline run task aborted");
            }
        }
    }
}
