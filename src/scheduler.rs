use crate::tray::TraySink;
use crate::types::TrayCommand;

use chrono::{DateTime, Local};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub type Job = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid cron expression '{expression}': {source}")]
    Cron {
        expression: String,
        source: cron::error::Error,
    },

    #[error("A cron job is already registered")]
    AlreadyRegistered,

    #[error("Scheduler task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Owns at most one cron-triggered job and the timer task driving it.
pub struct Scheduler {
    runtime: Handle,
    tray: Arc<dyn TraySink>,
    job: Option<(Schedule, Job)>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(runtime: Handle, tray: Arc<dyn TraySink>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            runtime,
            tray,
            job: None,
            shutdown_tx,
            task: None,
        }
    }

    /// Registers `job` under `expression`. An empty expression registers nothing and returns `false`.
    pub fn register(&mut self, expression: &str, job: Job) -> Result<bool, SchedulerError> {
        if expression.trim().is_empty() {
            tracing::info!("No cron expression configured, skipping scheduled job");
            return Ok(false);
        }
        if self.job.is_some() {
            return Err(SchedulerError::AlreadyRegistered);
        }

        let schedule = parse_cron(expression)?;
        match schedule.upcoming(Local).next() {
            Some(next) => publish_next_fire(self.tray.as_ref(), next),
            None => tracing::warn!("Cron expression '{}' has no upcoming fire time", expression),
        }

        tracing::info!("Registered cron job '{}'", expression);
        self.job = Some((schedule, job));
        Ok(true)
    }

    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        let Some((schedule, job)) = self.job.clone() else {
            tracing::info!("Scheduler started without jobs");
            return;
        };

        let tray = self.tray.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.task = Some(
            self.runtime
                .spawn(run_timer(schedule, job, tray, shutdown_rx)),
        );
        tracing::info!("Scheduler started");
    }

    /// Stops future firings. Jobs already running are left to finish.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        self.shutdown_tx.send_replace(true);
        if let Some(task) = self.task.take() {
            task.await?;
        }
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}

async fn run_timer(
    schedule: Schedule,
    job: Job,
    tray: Arc<dyn TraySink>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let Some(mut next) = schedule.upcoming(Local).next() else {
        return;
    };

    loop {
        let wait = (next - Local::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown_rx.changed() => break,
        }

        let following = schedule.after(&next).next();
        match following {
            Some(at) => publish_next_fire(tray.as_ref(), at),
            None => tracing::warn!("Failed to compute next fire time"),
        }

        let job = job.clone();
        tokio::task::spawn_blocking(move || job());

        match following {
            Some(at) => next = at,
            None => break,
        }
    }
}

fn publish_next_fire(tray: &dyn TraySink, at: DateTime<Local>) {
    let text = format_fire_time(at);
    tracing::info!("Next fire time: {}", text);
    if !tray.post(TrayCommand::SetTooltip(text)) {
        tracing::warn!("Tray is gone, dropping tooltip update");
    }
}

pub fn format_fire_time(at: DateTime<Local>) -> String {
    at.format("%H:%M:%S").to_string()
}

/// Parses a seconds-enabled cron expression. Five-field expressions fire at second 0.
///
/// Numeric days of the week use the usual cron numbering (0 or 7 = Sunday,
/// 1 = Monday) and are rewritten for the `cron` crate, which counts from 1 = Sunday.
pub fn parse_cron(expression: &str) -> Result<Schedule, SchedulerError> {
    let expression = expression.trim();
    let normalized = if expression.starts_with('@') {
        expression.to_string()
    } else {
        let mut fields: Vec<String> = expression.split_whitespace().map(str::to_string).collect();
        if fields.len() == 5 {
            fields.insert(0, "0".to_string());
        }
        if let Some(dow) = fields.get_mut(DAY_OF_WEEK_FIELD) {
            *dow = translate_day_of_week(dow);
        }
        fields.join(" ")
    };

    Schedule::from_str(&normalized).map_err(|source| SchedulerError::Cron {
        expression: expression.to_string(),
        source,
    })
}

const DAY_OF_WEEK_FIELD: usize = 5;

/// Rewrites each numeric item of a day-of-week field (`1-5`, `0,6`, `*/2`, `1/2`)
/// as an explicit list in `cron` crate numbering. Named days, `*` and `?` pass
/// through, as does anything unparseable so the parser reports it.
fn translate_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|item| translate_day_item(item).unwrap_or_else(|| item.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

fn translate_day_item(item: &str) -> Option<String> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step.parse::<u32>().ok().filter(|s| *s > 0)?)),
        None => (item, None),
    };

    let (start, end) = match range {
        "*" | "?" if step.is_none() => return None,
        "*" | "?" => (0, 6),
        _ => match range.split_once('-') {
            Some((a, b)) => (parse_day(a)?, parse_day(b)?),
            None => {
                let day = parse_day(range)?;
                // "n/s" runs from n to the end of the week
                (day, if step.is_some() { 6 } else { day })
            }
        },
    };

    if start > end {
        return None;
    }

    let mut days: Vec<u32> = (start..=end)
        .step_by(step.unwrap_or(1) as usize)
        .map(|day| day % 7 + 1)
        .collect();
    days.sort_unstable();
    days.dedup();

    Some(
        days.iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn parse_day(value: &str) -> Option<u32> {
    value.parse::<u32>().ok().filter(|day| *day <= 7)
}
