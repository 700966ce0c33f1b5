//! Instance registry - Central state management for PteroEngine
//!
//! The registry owns no instance state itself. It maps ids to actor handles,
//! keeps creation order, and forwards every command to the owning actor.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

use super::actor::{Command, DeleteMode, InstanceActor, InstanceEvent, InstanceHandle};
use super::error::{EngineError, EngineResult};
use super::files::{FileId, FileItem};
use super::instance::{Instance, InstanceId, InstanceStatus, ProjectRequest};
use super::lifecycle::PowerAction;
use super::profile::Profile;
use super::settings::Settings;
use crate::persistence::{Database, PersistEvent, Persister};

/// Capacity of the event channel; slow subscribers see `Lagged`
const EVENT_CAPACITY: usize = 1024;

/// Asked before anything is deleted. Declining aborts with no mutation.
pub trait ConfirmGate {
    fn confirm(&mut self, prompt: &str) -> impl Future<Output = bool>;
}

impl<F> ConfirmGate for F
where
    F: FnMut(&str) -> bool,
{
    async fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Default)]
struct Handles {
    by_id: HashMap<InstanceId, InstanceHandle>,
    order: Vec<InstanceId>,
}

impl Handles {
    fn insert(&mut self, handle: InstanceHandle) {
        self.order.push(handle.id().clone());
        self.by_id.insert(handle.id().clone(), handle);
    }

    fn remove(&mut self, id: &InstanceId) -> Option<InstanceHandle> {
        let handle = self.by_id.remove(id)?;
        self.order.retain(|i| i != id);
        Some(handle)
    }

    fn ordered(&self) -> Vec<InstanceHandle> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect()
    }
}

/// Central application state
#[derive(Clone)]
pub struct InstanceRegistry {
    instances: Arc<RwLock<Handles>>,
    profile: Arc<RwLock<Profile>>,
    settings: Arc<RwLock<Settings>>,
    database: Arc<Database>,
    persist: mpsc::UnboundedSender<PersistEvent>,
    events: broadcast::Sender<InstanceEvent>,
}

impl InstanceRegistry {
    /// Restore the registry from `database` and spawn one actor per instance.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(database: Database) -> Result<Self> {
        // Load settings from database
        let settings = database.load_settings()?.unwrap_or_default();
        let snapshot = database.load_snapshot()?;
        let database = Arc::new(database);

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let persist = Persister::spawn(database.clone(), snapshot.clone());

        let mut handles = Handles::default();
        for instance in snapshot.instances {
            handles.insert(InstanceActor::spawn(
                instance,
                settings.timings.clone(),
                events.clone(),
                persist.clone(),
            ));
        }
        info!("Restored {} instances", handles.order.len());

        Ok(Self {
            instances: Arc::new(RwLock::new(handles)),
            profile: Arc::new(RwLock::new(snapshot.profile)),
            settings: Arc::new(RwLock::new(settings)),
            database,
            persist,
            events,
        })
    }

    fn read_handles(&self) -> RwLockReadGuard<'_, Handles> {
        self.instances.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_handles(&self) -> RwLockWriteGuard<'_, Handles> {
        self.instances.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, id: &InstanceId) -> EngineResult<InstanceHandle> {
        self.read_handles()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::InstanceNotFound(id.clone()))
    }

    /// Receive every change made from now on
    pub fn subscribe(&self) -> broadcast::Receiver<InstanceEvent> {
        self.events.subscribe()
    }

    // === Instances ===

    /// Create an instance from a project request and schedule its image deployment
    pub fn create_project(&self, request: ProjectRequest) -> EngineResult<InstanceId> {
        if request.name.trim().is_empty() {
            return Err(EngineError::EmptyName);
        }
        let settings = self.settings();

        let handle = {
            let mut handles = self.write_handles();
            let mut id = InstanceId::new();
            while handles.by_id.contains_key(&id) {
                id = InstanceId::new();
            }

            let instance = Instance::from_request(id, &request, &settings.default_ip);
            let _ = self.persist.send(PersistEvent::Upsert(instance.clone()));
            let handle = InstanceActor::spawn(
                instance,
                settings.timings.clone(),
                self.events.clone(),
                self.persist.clone(),
            );
            handles.insert(handle.clone());
            handle
        };

        let id = handle.id().clone();
        info!("Created instance {} ({})", id, request.template.id);
        let _ = self.events.send(InstanceEvent::Created(id.clone()));
        handle.send(Command::Deploy)?;
        Ok(id)
    }

    /// Delete an instance, aborting its timers and pipelines
    pub async fn delete_instance(&self, id: &InstanceId) -> EngineResult<()> {
        let handle = self
            .write_handles()
            .remove(id)
            .ok_or_else(|| EngineError::InstanceNotFound(id.clone()))?;

        // The actor may already be gone; the removal still stands
        let _ = handle.ask(|reply| Command::Shutdown { reply }).await;
        let _ = self.persist.send(PersistEvent::Remove(id.clone()));
        let _ = self.events.send(InstanceEvent::Removed(id.clone()));

        info!("Deleted instance {}", id);
        Ok(())
    }

    /// Snapshot of one instance
    pub async fn instance(&self, id: &InstanceId) -> EngineResult<Instance> {
        self.handle(id)?
            .ask(|reply| Command::Snapshot { reply })
            .await
    }

    /// Snapshots of every instance, in creation order
    pub async fn list_instances(&self) -> Vec<Instance> {
        let handles = self.read_handles().ordered();
        let mut instances = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.ask(|reply| Command::Snapshot { reply }).await {
                Ok(instance) => instances.push(instance),
                // Deleted while we were collecting
                Err(_) => continue,
            }
        }
        instances
    }

    pub fn instance_count(&self) -> usize {
        self.read_handles().order.len()
    }

    /// Replace the runtime image and startup command
    pub async fn update_startup(
        &self,
        id: &InstanceId,
        command: &str,
        image: &str,
        version: &str,
    ) -> EngineResult<()> {
        let (command, image, version) = (command.to_string(), image.to_string(), version.to_string());
        self.handle(id)?
            .ask(|reply| Command::UpdateStartup {
                command,
                image,
                version,
                reply,
            })
            .await
    }

    // === Power ===

    async fn power(&self, id: &InstanceId, action: PowerAction) -> EngineResult<InstanceStatus> {
        self.handle(id)?
            .ask(|reply| Command::Power { action, reply })
            .await
    }

    /// Start an instance. Returns the status right after the request was applied.
    pub async fn start(&self, id: &InstanceId) -> EngineResult<InstanceStatus> {
        self.power(id, PowerAction::Start).await
    }

    /// Stop an instance. Returns the status right after the request was applied.
    pub async fn stop(&self, id: &InstanceId) -> EngineResult<InstanceStatus> {
        self.power(id, PowerAction::Stop).await
    }

    /// Stop then start an instance after the restart delay
    pub async fn restart(&self, id: &InstanceId) -> EngineResult<InstanceStatus> {
        self.power(id, PowerAction::Restart).await
    }

    // === Console ===

    /// Feed one line of console input
    pub async fn send_command(&self, id: &InstanceId, input: &str) -> EngineResult<()> {
        let input = input.to_string();
        self.handle(id)?
            .ask(|reply| Command::Console { input, reply })
            .await
    }

    pub async fn clear_logs(&self, id: &InstanceId) -> EngineResult<()> {
        self.handle(id)?
            .ask(|reply| Command::ClearLogs { reply })
            .await
    }

    // === Files ===

    pub async fn list_files(&self, id: &InstanceId, path: &str) -> EngineResult<Vec<FileItem>> {
        let path = path.to_string();
        self.handle(id)?
            .ask(|reply| Command::ListFiles { path, reply })
            .await
    }

    pub async fn create_file(
        &self,
        id: &InstanceId,
        path: &str,
        name: &str,
        is_directory: bool,
        content: Option<String>,
    ) -> EngineResult<FileId> {
        let (path, name) = (path.to_string(), name.to_string());
        self.handle(id)?
            .ask(|reply| Command::CreateFile {
                path,
                name,
                is_directory,
                content,
                reply,
            })
            .await?
    }

    pub async fn upload_file(
        &self,
        id: &InstanceId,
        path: &str,
        name: &str,
        bytes: u64,
    ) -> EngineResult<FileId> {
        let (path, name) = (path.to_string(), name.to_string());
        self.handle(id)?
            .ask(|reply| Command::UploadFile {
                path,
                name,
                bytes,
                reply,
            })
            .await?
    }

    /// Replace a file's content. `false` when the id is unknown or names a directory.
    pub async fn update_file(
        &self,
        id: &InstanceId,
        file: &FileId,
        content: &str,
    ) -> EngineResult<bool> {
        let (file, content) = (file.clone(), content.to_string());
        self.handle(id)?
            .ask(|reply| Command::UpdateFile {
                file,
                content,
                reply,
            })
            .await
    }

    /// Delete a file or directory once `gate` agrees.
    ///
    /// Returns `Ok(false)` when the gate declines or nothing was removed.
    pub async fn delete_file(
        &self,
        id: &InstanceId,
        file: &FileId,
        mode: DeleteMode,
        gate: &mut impl ConfirmGate,
    ) -> EngineResult<bool> {
        let handle = self.handle(id)?;
        let prompt = match mode {
            DeleteMode::Single => format!("Delete {}?", file),
            DeleteMode::Tree => format!("Delete {} and everything below it?", file),
        };
        if !gate.confirm(&prompt).await {
            return Ok(false);
        }

        let file = file.clone();
        let removed = handle
            .ask(|reply| Command::DeleteFile { file, mode, reply })
            .await?;
        Ok(!removed.is_empty())
    }

    /// Entries whose parent directory no longer exists
    pub async fn orphans(&self, id: &InstanceId) -> EngineResult<Vec<FileItem>> {
        self.handle(id)?
            .ask(|reply| Command::ListOrphans { reply })
            .await
    }

    /// Extract an archive into a sibling directory
    pub async fn unzip(&self, id: &InstanceId, file: &FileId) -> EngineResult<()> {
        let file = file.clone();
        self.handle(id)?
            .ask(|reply| Command::Unzip { file, reply })
            .await?
    }

    // === Profile ===

    pub fn profile(&self) -> Profile {
        self.profile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_profile(&self, profile: Profile) {
        let mut current = self.profile.write().unwrap_or_else(PoisonError::into_inner);
        *current = profile.clone();
        // Queue the write under the lock so storage sees updates in memory order
        let _ = self.persist.send(PersistEvent::Profile(profile));
        drop(current);
        info!("Profile updated");
    }

    // === Settings ===

    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate and store new settings. Timings apply to instances created afterwards.
    pub fn save_settings(&self, mut settings: Settings) -> Result<()> {
        settings.validate();
        self.database.save_settings(&settings)?;
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
        Ok(())
    }

    /// Wait until every change made so far has been written
    pub async fn flush(&self) {
        // A round trip through each actor guarantees its pending writes are queued
        let handles = self.read_handles().ordered();
        for handle in handles {
            let _ = handle.ask(|reply| Command::Snapshot { reply }).await;
        }

        let (reply, done) = oneshot::channel();
        if self.persist.send(PersistEvent::Flush(reply)).is_err() || done.await.is_err() {
            warn!("Persister unavailable, state may not be saved");
        }
    }

    /// Flush state and stop every actor
    pub async fn shutdown(&self) {
        self.flush().await;
        let handles: Vec<_> = {
            let mut handles = self.write_handles();
            handles.order.clear();
            handles.by_id.drain().map(|(_, h)| h).collect()
        };
        for handle in handles {
            let _ = handle.ask(|reply| Command::Shutdown { reply }).await;
        }
        info!("Registry shut down");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::instance::Template;
    use crate::core::logs::LogKind;

    fn registry() -> InstanceRegistry {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        InstanceRegistry::new(db).unwrap()
    }

    fn request(name: &str) -> ProjectRequest {
        ProjectRequest {
            name: name.into(),
            template: Template {
                id: "nodejs".into(),
                icon: "JS".into(),
                image: "ghcr.io/yolks/nodejs".into(),
                versions: vec!["20".into()],
            },
            ram_limit_mb: 2048,
            disk_limit: "10 GB".into(),
        }
    }

    fn alpha() -> InstanceId {
        InstanceId::from("srv-001")
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_with_default_dataset() {
        let reg = registry();
        let instances = reg.list_instances().await;
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].name, "Production-Alpha");
        assert_eq!(reg.profile().name, "RootUser");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_boots_and_echoes_output() {
        let reg = registry();
        let id = alpha();

        assert_eq!(reg.start(&id).await.unwrap(), InstanceStatus::Starting);
        let starting = reg.instance(&id).await.unwrap();
        let messages: Vec<_> = starting.logs.entries().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["Starting container process...", "node index.js"]);

        sleep_ms(1600).await;
        let running = reg.instance(&id).await.unwrap();
        assert_eq!(running.status, InstanceStatus::Running);
        assert!(running.resources.cpu > 0);

        let tail: Vec<_> = running.logs.entries()[2..]
            .iter()
            .map(|e| (e.kind, e.message.as_str()))
            .collect();
        assert_eq!(
            tail,
            vec![
                (LogKind::Success, "Container is online."),
                (LogKind::Raw, "Server started successfully!"),
                (LogKind::Raw, "Listening on port 3000"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_guards_leave_no_trace() {
        let reg = registry();
        let id = alpha();

        assert_eq!(reg.stop(&id).await.unwrap(), InstanceStatus::Offline);
        assert!(reg.instance(&id).await.unwrap().logs.is_empty());

        reg.start(&id).await.unwrap();
        let before = reg.instance(&id).await.unwrap();
        assert_eq!(reg.start(&id).await.unwrap(), InstanceStatus::Starting);
        assert_eq!(reg.instance(&id).await.unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_visits_stopping_then_starting() {
        let reg = registry();
        let id = alpha();
        reg.start(&id).await.unwrap();
        sleep_ms(1600).await;

        let mut events = reg.subscribe();
        assert_eq!(reg.restart(&id).await.unwrap(), InstanceStatus::Stopping);
        sleep_ms(2000 + 1500 + 100).await;

        let mut statuses = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let InstanceEvent::StatusChanged { status, .. } = event {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![
                InstanceStatus::Stopping,
                InstanceStatus::Offline,
                InstanceStatus::Starting,
                InstanceStatus::Running,
            ]
        );
        assert_eq!(reg.instance(&id).await.unwrap().status, InstanceStatus::Running);
    }

    fn statuses(events: &mut broadcast::Receiver<InstanceEvent>) -> Vec<InstanceStatus> {
        let mut statuses = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let InstanceEvent::StatusChanged { status, .. } = event {
                statuses.push(status);
            }
        }
        statuses
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_while_starting_is_dropped_behind_stop() {
        let reg = registry();
        let id = alpha();
        let mut events = reg.subscribe();

        reg.start(&id).await.unwrap();
        assert_eq!(reg.stop(&id).await.unwrap(), InstanceStatus::Starting);
        assert_eq!(reg.start(&id).await.unwrap(), InstanceStatus::Starting);
        sleep_ms(10_000).await;

        assert_eq!(
            statuses(&mut events),
            vec![
                InstanceStatus::Starting,
                InstanceStatus::Running,
                InstanceStatus::Stopping,
                InstanceStatus::Offline,
            ]
        );
        assert_eq!(reg.instance(&id).await.unwrap().status, InstanceStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_while_starting_runs_after_boot() {
        let reg = registry();
        let id = alpha();
        let mut events = reg.subscribe();

        reg.start(&id).await.unwrap();
        assert_eq!(reg.restart(&id).await.unwrap(), InstanceStatus::Starting);
        sleep_ms(1500 + 2000 + 1500 + 100).await;

        assert_eq!(
            statuses(&mut events),
            vec![
                InstanceStatus::Starting,
                InstanceStatus::Running,
                InstanceStatus::Stopping,
                InstanceStatus::Offline,
                InstanceStatus::Starting,
                InstanceStatus::Running,
            ]
        );
        assert_eq!(reg.instance(&id).await.unwrap().status, InstanceStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_npm_install_creates_node_modules() {
        let reg = registry();
        let id = alpha();

        reg.send_command(&id, "npm install").await.unwrap();
        sleep_ms(5000).await;

        let root = reg.list_files(&id, "/").await.unwrap();
        let modules: Vec<_> = root.iter().filter(|f| f.name == "node_modules").collect();
        assert_eq!(modules.len(), 1);
        assert!(modules[0].is_directory);

        let logs = reg.instance(&id).await.unwrap().logs;
        assert_eq!(logs.entries()[0].kind, LogKind::Input);
        assert_eq!(logs.entries()[0].message, "npm install");
        assert_eq!(
            logs.last().map(|e| e.message.as_str()),
            Some("Successfully installed package.json.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_command_is_echoed() {
        let reg = registry();
        let id = alpha();

        reg.send_command(&id, "ls -la").await.unwrap();
        sleep_ms(250).await;

        let logs = reg.instance(&id).await.unwrap().logs;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs.entries()[1].message, "bash: ls -la: command executed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_then_append() {
        let reg = registry();
        let id = alpha();
        reg.send_command(&id, "whoami").await.unwrap();
        sleep_ms(250).await;

        reg.clear_logs(&id).await.unwrap();
        assert!(reg.instance(&id).await.unwrap().logs.is_empty());

        reg.start(&id).await.unwrap();
        let logs = reg.instance(&id).await.unwrap().logs;
        assert_eq!(logs.entries()[0].message, "Starting container process...");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_command_empties_stream() {
        let reg = registry();
        let id = alpha();
        reg.send_command(&id, "whoami").await.unwrap();
        reg.send_command(&id, "CLEAR").await.unwrap();
        sleep_ms(250).await;

        // The pending echo still lands after the clear
        let logs = reg.instance(&id).await.unwrap().logs;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs.entries()[0].message, "bash: whoami: command executed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unzip_sample() {
        let reg = registry();
        let id = alpha();
        let zip = reg
            .upload_file(&id, "/", "sample.zip", 2048)
            .await
            .unwrap();

        reg.unzip(&id, &zip).await.unwrap();
        sleep_ms(900).await;

        let root = reg.list_files(&id, "/").await.unwrap();
        let dirs: Vec<_> = root.iter().filter(|f| f.name == "sample").collect();
        assert_eq!(dirs.len(), 1);
        assert!(dirs[0].is_directory);

        let nested = reg.list_files(&id, "/sample").await.unwrap();
        assert_eq!(nested.len(), 1);
        assert!(!nested[0].is_directory);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unzip_rejects_other_files() {
        let reg = registry();
        let id = alpha();
        let file = reg.list_files(&id, "/").await.unwrap()[0].id.clone();

        assert_eq!(
            reg.unzip(&id, &file).await,
            Err(EngineError::NotAnArchive("index.js".into()))
        );
        let missing = FileId::from("nope");
        assert_eq!(
            reg.unzip(&id, &missing).await,
            Err(EngineError::FileNotFound(missing.clone()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_operations() {
        let reg = registry();
        let id = alpha();

        assert_eq!(
            reg.create_file(&id, "/", "  ", false, None).await,
            Err(EngineError::EmptyName)
        );

        let a = reg.create_file(&id, "/", "a.txt", false, Some("x".into())).await.unwrap();
        let b = reg.create_file(&id, "/", "a.txt", false, None).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.list_files(&id, "/").await.unwrap().len(), 3);

        assert!(reg.update_file(&id, &a, "hello").await.unwrap());
        assert!(!reg.update_file(&id, &FileId::from("nope"), "x").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_requires_confirmation() {
        let reg = registry();
        let id = alpha();
        let file = reg.list_files(&id, "/").await.unwrap()[0].id.clone();

        let declined = reg
            .delete_file(&id, &file, DeleteMode::Single, &mut |_: &str| false)
            .await
            .unwrap();
        assert!(!declined);
        assert_eq!(reg.list_files(&id, "/").await.unwrap().len(), 1);

        let deleted = reg
            .delete_file(&id, &file, DeleteMode::Single, &mut |_: &str| true)
            .await
            .unwrap();
        assert!(deleted);
        assert!(reg.list_files(&id, "/").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_directory_delete_modes() {
        let reg = registry();
        let id = alpha();
        let mut prompts = Vec::new();
        let mut yes = |prompt: &str| {
            prompts.push(prompt.to_string());
            true
        };
        assert!(reg.orphans(&id).await.unwrap().is_empty());

        let lib = reg.create_file(&id, "/", "lib", true, None).await.unwrap();
        let util = reg.create_file(&id, "/lib", "util.js", false, None).await.unwrap();
        reg.delete_file(&id, &lib, DeleteMode::Single, &mut yes).await.unwrap();
        // The child is orphaned, still listable by its path
        assert_eq!(reg.list_files(&id, "/lib").await.unwrap().len(), 1);
        let orphans = reg.orphans(&id).await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, util);

        let src = reg.create_file(&id, "/", "src", true, None).await.unwrap();
        reg.create_file(&id, "/src", "main.js", false, None).await.unwrap();
        reg.delete_file(&id, &src, DeleteMode::Tree, &mut yes).await.unwrap();
        assert!(reg.list_files(&id, "/src").await.unwrap().is_empty());
        assert_eq!(reg.orphans(&id).await.unwrap().len(), 1);

        assert_eq!(
            prompts,
            vec![
                format!("Delete {}?", lib),
                format!("Delete {} and everything below it?", src),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_instance() {
        let reg = registry();
        let ghost = InstanceId::from("srv-ghost");
        assert_eq!(
            reg.start(&ghost).await,
            Err(EngineError::InstanceNotFound(ghost.clone()))
        );
        assert_eq!(
            reg.delete_instance(&ghost).await,
            Err(EngineError::InstanceNotFound(ghost.clone()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_project_deploys_image() {
        let reg = registry();
        assert_eq!(reg.create_project(request("  ")), Err(EngineError::EmptyName));

        let id = reg.create_project(request("api")).unwrap();
        assert_eq!(reg.instance_count(), 2);
        sleep_ms(5000).await;

        let instance = reg.instance(&id).await.unwrap();
        assert_eq!(instance.status, InstanceStatus::Offline);
        assert_eq!(instance.runtime.startup_command, "node index.js");
        assert_eq!(
            instance.logs.last().map(|e| e.message.as_str()),
            Some("Deployment Finished. Ready to start.")
        );

        let order: Vec<_> = reg.list_instances().await.into_iter().map(|i| i.id).collect();
        assert_eq!(order, vec![alpha(), id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_aborts_pipelines() {
        let reg = registry();
        let id = reg.create_project(request("short-lived")).unwrap();
        reg.start(&id).await.unwrap();
        sleep_ms(600).await;

        let mut events = reg.subscribe();
        reg.delete_instance(&id).await.unwrap();
        sleep_ms(10_000).await;

        assert!(matches!(events.try_recv(), Ok(InstanceEvent::Removed(_))));
        assert!(events.try_recv().is_err());
        assert!(reg.instance(&id).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_startup() {
        let reg = registry();
        let id = alpha();
        reg.update_startup(&id, "node server.js", "ghcr.io/yolks/nodejs", "22")
            .await
            .unwrap();

        reg.start(&id).await.unwrap();
        let instance = reg.instance(&id).await.unwrap();
        assert_eq!(instance.runtime.version, "22");
        assert_eq!(instance.logs.entries()[1].message, "node server.js");
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pteroengine.db");
        let open = || {
            let db = Database::new(&path).unwrap();
            db.initialize().unwrap();
            InstanceRegistry::new(db).unwrap()
        };

        let reg = open();
        let id = reg.create_project(request("persisted")).unwrap();
        reg.create_file(&id, "/", "notes.md", false, Some("# hi".into()))
            .await
            .unwrap();
        reg.start(&id).await.unwrap();
        reg.update_profile(Profile::new("ops"));
        reg.flush().await;
        let before = reg.instance(&id).await.unwrap();
        reg.shutdown().await;

        let reopened = open();
        let after = reopened.instance(&id).await.unwrap();
        assert_eq!(after.files, before.files);
        assert_eq!(after.logs, before.logs);
        // Restored mid-boot instances come back at rest
        assert_eq!(after.status, InstanceStatus::Offline);
        assert_eq!(reopened.profile().name, "ops");
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_profile_update_is_stored() {
        let reg = registry();
        let writers: Vec<_> = ["first", "second", "third"]
            .into_iter()
            .map(|name| {
                let reg = reg.clone();
                tokio::spawn(async move { reg.update_profile(Profile::new(name)) })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }
        reg.flush().await;

        let stored = reg.database.load_snapshot().unwrap();
        assert_eq!(stored.profile, reg.profile());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_state_falls_back_to_defaults() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.save_state_json("not json at all").unwrap();

        let reg = InstanceRegistry::new(db).unwrap();
        let instances = reg.list_instances().await;
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].id, alpha());
    }
}
