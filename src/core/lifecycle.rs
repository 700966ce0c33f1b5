//! Lifecycle controller - The power state machine of one instance
//!
//! ```text
//! offline --start--> starting --(boot delay)--> running
//! running --stop---> stopping --(stop delay)--> offline
//! ```
//!
//! The controller never sleeps itself. Each call mutates the instance and may
//! return a [`Wakeup`]; the owner fires [`LifecycleController::on_timer`] once
//! that deadline passes. At most one wakeup is outstanding at a time, and power
//! requests that arrive meanwhile are queued and replayed afterwards, so
//! transitions never overlap. A queued request is checked against the current
//! status and the status the queue settles in; one either guard ignores is
//! dropped on arrival.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use super::instance::{Instance, InstanceStatus};
use super::logs::{LogEntry, LogKind};
use super::scanner::scan_output;
use super::settings::Timings;

/// A power request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerAction {
    Start,
    Stop,
    Restart,
}

impl PowerAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

/// Timer events that complete a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    BootComplete,
    StopComplete,
    RestartSettled,
}

/// Request to be called back at `at`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wakeup {
    pub timer: Timer,
    pub at: Instant,
}

pub struct LifecycleController {
    timings: Timings,
    in_flight: Option<Timer>,
    pending: VecDeque<PowerAction>,
    restart_deadline: Option<Instant>,
}

impl LifecycleController {
    pub fn new(timings: Timings) -> Self {
        Self {
            timings,
            in_flight: None,
            pending: VecDeque::new(),
            restart_deadline: None,
        }
    }

    /// Whether a transition is waiting on a timer
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Handle a power request
    pub fn request(
        &mut self,
        action: PowerAction,
        instance: &mut Instance,
        now: Instant,
    ) -> Option<Wakeup> {
        if self.in_flight.is_some() {
            let ahead = self.projected_status(instance);
            let ignored = match action {
                PowerAction::Start => instance.status.ignores_start() || ahead.ignores_start(),
                PowerAction::Stop => instance.status.ignores_stop() || ahead.ignores_stop(),
                PowerAction::Restart => false,
            };
            if ignored {
                debug!(
                    "{} ignored for {} ({}, settling {})",
                    action.label(),
                    instance.id,
                    instance.status,
                    ahead
                );
                return None;
            }
            debug!("Queueing {} for {} behind running transition", action.label(), instance.id);
            self.pending.push_back(action);
            return None;
        }

        match action {
            PowerAction::Start => self.begin_start(instance, now),
            PowerAction::Stop => self.begin_stop(instance, now),
            PowerAction::Restart => {
                info!("Restarting instance {}", instance.id);
                let deadline = now + ms(self.timings.restart_delay_ms);
                self.restart_deadline = Some(deadline);
                match self.begin_stop(instance, now) {
                    Some(wakeup) => Some(wakeup),
                    None => Some(self.arm(Timer::RestartSettled, deadline)),
                }
            }
        }
    }

    /// Handle an elapsed wakeup
    pub fn on_timer(&mut self, timer: Timer, instance: &mut Instance, now: Instant) -> Option<Wakeup> {
        if self.in_flight != Some(timer) {
            debug!("Ignoring stale {:?} for {}", timer, instance.id);
            return None;
        }
        self.in_flight = None;

        match timer {
            Timer::BootComplete => finish_start(instance),
            Timer::StopComplete => {
                finish_stop(instance);
                if let Some(deadline) = self.restart_deadline {
                    return Some(self.arm(Timer::RestartSettled, deadline.max(now)));
                }
            }
            Timer::RestartSettled => {
                self.restart_deadline = None;
                if let Some(wakeup) = self.begin_start(instance, now) {
                    return Some(wakeup);
                }
            }
        }

        self.drain(instance, now)
    }

    /// Status the instance settles in once the in-flight transition and every
    /// queued action have run
    fn projected_status(&self, instance: &Instance) -> InstanceStatus {
        let settled = match self.in_flight {
            Some(Timer::StopComplete) if self.restart_deadline.is_none() => InstanceStatus::Offline,
            Some(_) => InstanceStatus::Running,
            None => instance.status,
        };
        self.pending.iter().fold(settled, |_, action| match action {
            PowerAction::Stop => InstanceStatus::Offline,
            PowerAction::Start | PowerAction::Restart => InstanceStatus::Running,
        })
    }

    fn drain(&mut self, instance: &mut Instance, now: Instant) -> Option<Wakeup> {
        while let Some(action) = self.pending.pop_front() {
            if let Some(wakeup) = self.request(action, instance, now) {
                return Some(wakeup);
            }
        }
        None
    }

    fn arm(&mut self, timer: Timer, at: Instant) -> Wakeup {
        self.in_flight = Some(timer);
        Wakeup { timer, at }
    }

    fn begin_start(&mut self, instance: &mut Instance, now: Instant) -> Option<Wakeup> {
        if instance.status.ignores_start() {
            debug!("Start ignored for {} ({})", instance.id, instance.status);
            return None;
        }

        info!("Starting instance {}", instance.id);
        instance.status = InstanceStatus::Starting;
        instance.log(LogEntry::now(LogKind::Info, "Starting container process..."));
        instance.log(LogEntry::now(
            LogKind::Input,
            instance.runtime.startup_command.clone(),
        ));
        Some(self.arm(Timer::BootComplete, now + ms(self.timings.boot_delay_ms)))
    }

    fn begin_stop(&mut self, instance: &mut Instance, now: Instant) -> Option<Wakeup> {
        if instance.status.ignores_stop() {
            debug!("Stop ignored for {} ({})", instance.id, instance.status);
            return None;
        }

        info!("Stopping instance {}", instance.id);
        instance.status = InstanceStatus::Stopping;
        instance.log(LogEntry::now(LogKind::Warning, "Shutting down gracefully..."));
        Some(self.arm(Timer::StopComplete, now + ms(self.timings.stop_delay_ms)))
    }
}

fn finish_start(instance: &mut Instance) {
    instance.status = InstanceStatus::Running;
    instance.resources.simulate_running();
    instance.log(LogEntry::now(LogKind::Success, "Container is online."));

    let output: Vec<String> = instance
        .files
        .sources()
        .flat_map(|f| scan_output(f.content.as_deref().unwrap_or_default()))
        .collect();
    for line in output {
        instance.log(LogEntry::continuation(LogKind::Raw, line));
    }
    info!("Instance {} is running", instance.id);
}

fn finish_stop(instance: &mut Instance) {
    instance.status = InstanceStatus::Offline;
    instance.resources.reset_usage();
    instance.log(LogEntry::now(LogKind::Error, "Process exited with code 0"));
    info!("Instance {} is offline", instance.id);
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}
