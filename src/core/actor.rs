//! Instance actor - The single owner of one instance's mutable state
//!
//! Every mutation of an instance (power, console, files, pipeline steps,
//! timers) is a [`Command`] on the actor's channel and is applied in arrival
//! order. Timers and pipelines are tasks that send commands back; they hold
//! only a sender, so once the actor is gone their sends fail and they stop.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::console::ConsoleCommand;
use super::error::{EngineError, EngineResult};
use super::files::{FileId, FileItem};
use super::instance::{Instance, InstanceId, InstanceStatus};
use super::lifecycle::{LifecycleController, PowerAction, Timer, Wakeup};
use super::logs::{LogEntry, LogKind};
use super::pipeline::{Schedule, StepAction};
use super::settings::Timings;
use crate::persistence::PersistEvent;

/// Notification published after an instance changed
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceEvent {
    Created(InstanceId),
    Removed(InstanceId),
    StatusChanged {
        id: InstanceId,
        status: InstanceStatus,
    },
    LogAppended {
        id: InstanceId,
        entry: LogEntry,
    },
    LogsCleared(InstanceId),
    FilesChanged(InstanceId),
    StartupChanged(InstanceId),
}

/// How a delete treats the entries below a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeleteMode {
    /// Remove only the named entry; children stay behind, orphaned
    #[default]
    Single,
    /// Remove the entry and everything below it
    Tree,
}

pub(crate) enum Command {
    Power {
        action: PowerAction,
        reply: oneshot::Sender<InstanceStatus>,
    },
    Console {
        input: String,
        reply: oneshot::Sender<()>,
    },
    ClearLogs {
        reply: oneshot::Sender<()>,
    },
    CreateFile {
        path: String,
        name: String,
        is_directory: bool,
        content: Option<String>,
        reply: oneshot::Sender<EngineResult<FileId>>,
    },
    UploadFile {
        path: String,
        name: String,
        bytes: u64,
        reply: oneshot::Sender<EngineResult<FileId>>,
    },
    UpdateFile {
        file: FileId,
        content: String,
        reply: oneshot::Sender<bool>,
    },
    DeleteFile {
        file: FileId,
        mode: DeleteMode,
        reply: oneshot::Sender<Vec<FileItem>>,
    },
    Unzip {
        file: FileId,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    UpdateStartup {
        command: String,
        image: String,
        version: String,
        reply: oneshot::Sender<()>,
    },
    ListFiles {
        path: String,
        reply: oneshot::Sender<Vec<FileItem>>,
    },
    ListOrphans {
        reply: oneshot::Sender<Vec<FileItem>>,
    },
    Snapshot {
        reply: oneshot::Sender<Instance>,
    },
    Deploy,
    Timer(Timer),
    Step(StepAction),
    Shutdown {
        reply: oneshot::Sender<Instance>,
    },
}

/// Cloneable address of a running instance actor
#[derive(Clone)]
pub struct InstanceHandle {
    id: InstanceId,
    tx: mpsc::UnboundedSender<Command>,
}

impl InstanceHandle {
    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub(crate) fn send(&self, command: Command) -> EngineResult<()> {
        self.tx
            .send(command)
            .map_err(|_| EngineError::Unavailable(self.id.clone()))
    }

    /// Send a command and wait for the actor's reply
    pub(crate) async fn ask<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> EngineResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| EngineError::Unavailable(self.id.clone()))
    }
}

pub struct InstanceActor {
    instance: Instance,
    lifecycle: LifecycleController,
    timings: Timings,
    rx: mpsc::UnboundedReceiver<Command>,
    tx: mpsc::WeakUnboundedSender<Command>,
    events: broadcast::Sender<InstanceEvent>,
    persist: mpsc::UnboundedSender<PersistEvent>,
    tasks: Vec<JoinHandle<()>>,
    dirty: bool,
}

impl InstanceActor {
    /// Spawn the actor for `instance` on the current runtime
    pub fn spawn(
        instance: Instance,
        timings: Timings,
        events: broadcast::Sender<InstanceEvent>,
        persist: mpsc::UnboundedSender<PersistEvent>,
    ) -> InstanceHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = instance.id.clone();
        let actor = Self {
            instance,
            lifecycle: LifecycleController::new(timings.clone()),
            timings,
            rx,
            tx: tx.downgrade(),
            events,
            persist,
            tasks: Vec::new(),
            dirty: false,
        };

        tokio::spawn(actor.run());
        debug!("Spawned actor for instance {}", id);
        InstanceHandle { id, tx }
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            let keep_running = self.handle(command);
            if std::mem::take(&mut self.dirty) {
                self.persist();
            }
            if !keep_running {
                break;
            }
        }

        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!("Actor for instance {} stopped", self.instance.id);
    }

    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Power { action, reply } => {
                self.lifecycle_step(|ctl, inst, now| ctl.request(action, inst, now));
                let _ = reply.send(self.instance.status);
            }
            Command::Timer(timer) => {
                self.lifecycle_step(|ctl, inst, now| ctl.on_timer(timer, inst, now));
            }
            Command::Console { input, reply } => {
                self.console(&input);
                let _ = reply.send(());
            }
            Command::ClearLogs { reply } => {
                self.clear_logs();
                let _ = reply.send(());
            }
            Command::CreateFile {
                path,
                name,
                is_directory,
                content,
                reply,
            } => {
                let result = self
                    .instance
                    .files
                    .create(&path, &name, is_directory, content);
                if result.is_ok() {
                    self.files_changed();
                }
                let _ = reply.send(result);
            }
            Command::UploadFile {
                path,
                name,
                bytes,
                reply,
            } => {
                let result = self.instance.files.upload(&path, &name, bytes);
                if result.is_ok() {
                    self.files_changed();
                }
                let _ = reply.send(result);
            }
            Command::UpdateFile {
                file,
                content,
                reply,
            } => {
                let updated = self.instance.files.update(&file, &content);
                if updated {
                    self.files_changed();
                }
                let _ = reply.send(updated);
            }
            Command::DeleteFile { file, mode, reply } => {
                let removed = match mode {
                    DeleteMode::Single => self.instance.files.delete(&file).into_iter().collect(),
                    DeleteMode::Tree => self.instance.files.delete_tree(&file),
                };
                if !removed.is_empty() {
                    self.files_changed();
                }
                let _ = reply.send(removed);
            }
            Command::Unzip { file, reply } => {
                let _ = reply.send(self.unzip(&file));
            }
            Command::UpdateStartup {
                command,
                image,
                version,
                reply,
            } => {
                let runtime = &mut self.instance.runtime;
                runtime.startup_command = command;
                runtime.image = image;
                runtime.version = version;
                self.dirty = true;
                self.publish(InstanceEvent::StartupChanged(self.instance.id.clone()));
                let _ = reply.send(());
            }
            Command::ListFiles { path, reply } => {
                let _ = reply.send(self.instance.files.list(&path));
            }
            Command::ListOrphans { reply } => {
                let _ = reply.send(self.instance.files.orphans().into_iter().cloned().collect());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.instance.clone());
            }
            Command::Deploy => {
                let schedule = Schedule::image_deploy(
                    &self.instance.id,
                    &self.instance.runtime.image,
                    &self.instance.runtime.version,
                    &self.timings,
                );
                self.spawn_pipeline(schedule);
            }
            Command::Step(action) => self.apply_step(action),
            Command::Shutdown { reply } => {
                info!("Shutting down actor for instance {}", self.instance.id);
                for task in self.tasks.drain(..) {
                    task.abort();
                }
                let _ = reply.send(self.instance.clone());
                return false;
            }
        }
        true
    }

    /// Run a lifecycle call and publish whatever it changed
    fn lifecycle_step<F>(&mut self, f: F)
    where
        F: FnOnce(&mut LifecycleController, &mut Instance, Instant) -> Option<Wakeup>,
    {
        let status = self.instance.status;
        let logged = self.instance.logs.len();

        let wakeup = f(&mut self.lifecycle, &mut self.instance, Instant::now());

        if self.instance.status != status {
            self.dirty = true;
            self.publish(InstanceEvent::StatusChanged {
                id: self.instance.id.clone(),
                status: self.instance.status,
            });
        }
        let appended: Vec<LogEntry> = self.instance.logs.since(logged).to_vec();
        for entry in appended {
            self.dirty = true;
            self.publish(InstanceEvent::LogAppended {
                id: self.instance.id.clone(),
                entry,
            });
        }

        if let Some(wakeup) = wakeup {
            self.schedule_timer(wakeup);
        }
    }

    fn console(&mut self, input: &str) {
        let Some(command) = ConsoleCommand::parse(input) else {
            return;
        };

        self.append(LogEntry::now(LogKind::Input, input.trim()));
        match command {
            ConsoleCommand::Install { manager, package } => {
                info!(
                    "Installing {} dependencies for {}",
                    manager.label(),
                    self.instance.id
                );
                let schedule =
                    Schedule::dependency_install(manager, package.as_deref(), &self.timings);
                self.spawn_pipeline(schedule);
            }
            ConsoleCommand::Clear => self.clear_logs(),
            ConsoleCommand::Other(cmd) => {
                let schedule = Schedule::echo(&cmd, &self.timings);
                self.spawn_pipeline(schedule);
            }
        }
    }

    fn unzip(&mut self, file: &FileId) -> EngineResult<()> {
        let item = self
            .instance
            .files
            .get(file)
            .ok_or_else(|| EngineError::FileNotFound(file.clone()))?;
        let schedule = Schedule::unzip(item, &self.timings)
            .ok_or_else(|| EngineError::NotAnArchive(item.name.clone()))?;

        self.spawn_pipeline(schedule);
        Ok(())
    }

    fn apply_step(&mut self, action: StepAction) {
        match action {
            StepAction::Mutate(mutation) => {
                mutation.apply(&mut self.instance.files);
                self.files_changed();
            }
            log => {
                if let Some(entry) = log.entry() {
                    self.append(entry);
                }
            }
        }
    }

    fn append(&mut self, entry: LogEntry) {
        self.instance.log(entry.clone());
        self.dirty = true;
        self.publish(InstanceEvent::LogAppended {
            id: self.instance.id.clone(),
            entry,
        });
    }

    fn clear_logs(&mut self) {
        self.instance.logs.clear();
        self.dirty = true;
        self.publish(InstanceEvent::LogsCleared(self.instance.id.clone()));
    }

    fn files_changed(&mut self) {
        self.dirty = true;
        self.publish(InstanceEvent::FilesChanged(self.instance.id.clone()));
    }

    fn publish(&self, event: InstanceEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn persist(&self) {
        if self
            .persist
            .send(PersistEvent::Upsert(self.instance.clone()))
            .is_err()
        {
            warn!("Persister gone, instance {} not saved", self.instance.id);
        }
    }

    fn spawn_pipeline(&mut self, schedule: Schedule) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        debug!(
            "Running {} pipeline for {} ({} steps)",
            schedule.name,
            self.instance.id,
            schedule.steps.len()
        );
        let task = tokio::spawn(schedule.run(move |action| tx.send(Command::Step(action)).is_ok()));
        self.track(task);
    }

    fn schedule_timer(&mut self, wakeup: Wakeup) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(wakeup.at).await;
            let _ = tx.send(Command::Timer(wakeup.timer));
        });
        self.track(task);
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }
}
