//! Provisioning pipelines - Timed sequences of log emissions and store mutations
//!
//! A [`Schedule`] is plain data: an ordered list of steps, each waiting for its
//! delay after the previous step completed. [`Schedule::run`] drives one on the
//! current tokio runtime and hands each step to a sink, which is how steps
//! reach the owning instance actor.

use std::time::Duration;

use tracing::trace;

use super::console::PackageManager;
use super::files::{join_path, FileId, FileItem, FileStore};
use super::instance::InstanceId;
use super::logs::{LogEntry, LogKind};
use super::settings::Timings;

/// Width of the dependency-install progress bar, in cells
pub const INSTALL_BAR_WIDTH: usize = 40;

/// Width of the image-layer progress bars, in cells
pub const LAYER_BAR_WIDTH: usize = 10;

/// Percentage increment of each install tick
pub const INSTALL_STEP_PERCENT: u8 = 10;

/// Name of the file materialized inside an extracted archive
pub const EXTRACTED_FILE: &str = "app.js";

const EXTRACTED_CONTENT: &str = "console.log(\"Extracted successfully\");";

const FILLED: char = '█';
const EMPTY: char = '░';

/// Render `percent` as a bar of `width` cells
pub fn progress_bar(percent: u8, width: usize) -> String {
    let percent = percent.min(100) as usize;
    let filled = percent * width / 100;
    let mut bar = String::with_capacity(width * FILLED.len_utf8());
    bar.extend(std::iter::repeat(FILLED).take(filled));
    bar.extend(std::iter::repeat(EMPTY).take(width - filled));
    bar
}

/// Store mutation performed as a pipeline side effect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Create one directory entry
    CreateDirectory { path: String, name: String },
    /// Create `folder` under `path` plus one canned file inside it
    Extract { path: String, folder: String },
}

impl Mutation {
    /// Apply to a file store, returning the ids of created entries
    pub fn apply(&self, files: &mut FileStore) -> Vec<FileId> {
        match self {
            Self::CreateDirectory { path, name } => {
                vec![files.insert(FileItem::directory(path, name.as_str()))]
            }
            Self::Extract { path, folder } => {
                let dir = files.insert(FileItem::directory(path, folder.as_str()));
                let inner = files.insert(FileItem::file(
                    &join_path(path, folder),
                    EXTRACTED_FILE,
                    EXTRACTED_CONTENT,
                ));
                vec![dir, inner]
            }
        }
    }
}

/// What a step does once its delay elapsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Append a log entry; unstamped entries are continuation lines
    Log {
        kind: LogKind,
        message: String,
        stamped: bool,
    },
    /// Mutate the file store
    Mutate(Mutation),
}

impl StepAction {
    fn log(kind: LogKind, message: impl Into<String>) -> Self {
        Self::Log {
            kind,
            message: message.into(),
            stamped: true,
        }
    }

    fn raw(message: impl Into<String>) -> Self {
        Self::Log {
            kind: LogKind::Raw,
            message: message.into(),
            stamped: false,
        }
    }

    /// The log entry this step appends, stamped at call time
    pub fn entry(&self) -> Option<LogEntry> {
        match self {
            Self::Log {
                kind,
                message,
                stamped: true,
            } => Some(LogEntry::now(*kind, message.as_str())),
            Self::Log { kind, message, .. } => {
                Some(LogEntry::continuation(*kind, message.as_str()))
            }
            Self::Mutate(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub delay: Duration,
    pub action: StepAction,
}

impl Step {
    fn after(ms: u64, action: StepAction) -> Self {
        Self {
            delay: Duration::from_millis(ms),
            action,
        }
    }

    fn now(action: StepAction) -> Self {
        Self::after(0, action)
    }
}

/// A strictly sequential, non-pausable sequence of steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub name: &'static str,
    pub steps: Vec<Step>,
}

impl Schedule {
    /// Simulated image pull and container creation, run once per new instance
    pub fn image_deploy(id: &InstanceId, image: &str, version: &str, timings: &Timings) -> Self {
        let docker = |msg: String| StepAction::log(LogKind::Docker, msg);
        let layer = |n: u8, pct: u8, state: &str| {
            docker(format!(
                "Layer {}: [{}] {}% ({})",
                n,
                progress_bar(pct, LAYER_BAR_WIDTH),
                pct,
                state
            ))
        };

        let steps = vec![
            Step::after(
                timings.deploy_start_delay_ms,
                docker(format!("Initializing deployment for {}:{}...", image, version)),
            ),
            Step::after(500, docker(format!("Pulling from {}...", image))),
            Step::after(300, layer(1, 100, "Pull complete")),
            Step::after(800, layer(2, 60, "Downloading...")),
            Step::after(300, layer(2, 100, "Pull complete")),
            Step::after(100, layer(3, 100, "Pull complete")),
            Step::after(200, docker("Digest: sha256:72c42ed3583...".to_string())),
            Step::after(
                400,
                docker(format!("Status: Downloaded newer image for {}:{}", image, version)),
            ),
            Step::after(600, docker("Creating container...".to_string())),
            Step::after(400, docker("Configuring network interfaces...".to_string())),
            Step::after(300, docker("Volume binding: /home/container -> /root".to_string())),
            Step::after(100, docker(format!("Container ID: docker_{}", id))),
            Step::now(StepAction::log(
                LogKind::Success,
                "Deployment Finished. Ready to start.",
            )),
        ];

        Self {
            name: "image-deploy",
            steps,
        }
    }

    /// Progress-bar install that ends by creating the manager's artifact directory at `/`
    pub fn dependency_install(
        manager: PackageManager,
        package: Option<&str>,
        timings: &Timings,
    ) -> Self {
        let label = package.unwrap_or(manager.manifest());
        let mut steps = vec![Step::now(StepAction::log(
            LogKind::Termux,
            format!("[*] (1) Fetching package {}...", label),
        ))];

        let mut delay = timings.install_fetch_delay_ms + timings.install_tick_ms;
        let mut progress = 0u8;
        while progress < 100 {
            progress = (progress + INSTALL_STEP_PERCENT).min(100);
            steps.push(Step::after(
                delay,
                StepAction::raw(format!(
                    "⸩ {}% [{}] Installing {}...",
                    progress,
                    progress_bar(progress, INSTALL_BAR_WIDTH),
                    label
                )),
            ));
            delay = timings.install_tick_ms;
        }

        steps.push(Step::now(StepAction::log(
            LogKind::Success,
            format!("Successfully installed {}.", label),
        )));
        steps.push(Step::now(StepAction::Mutate(Mutation::CreateDirectory {
            path: "/".to_string(),
            name: manager.artifact_dir().to_string(),
        })));

        Self {
            name: "dependency-install",
            steps,
        }
    }

    /// Extraction of an archive entry. Returns `None` if `file` is not an archive.
    pub fn unzip(file: &FileItem, timings: &Timings) -> Option<Self> {
        let folder = file.archive_stem()?.to_string();
        let steps = vec![
            Step::now(StepAction::log(
                LogKind::Info,
                format!("Extracting: {} -> ./{}", file.name, folder),
            )),
            Step::after(
                timings.unzip_delay_ms,
                StepAction::Mutate(Mutation::Extract {
                    path: file.path.clone(),
                    folder,
                }),
            ),
            Step::now(StepAction::log(
                LogKind::Success,
                format!("{} extracted.", file.name),
            )),
        ];

        Some(Self {
            name: "unzip",
            steps,
        })
    }

    /// Delayed echo for console input that is not a recognized command
    pub fn echo(command: &str, timings: &Timings) -> Self {
        Self {
            name: "echo",
            steps: vec![Step::after(
                timings.echo_delay_ms,
                StepAction::raw(format!("bash: {}: command executed", command)),
            )],
        }
    }

    /// Total time from start to the last step
    pub fn duration(&self) -> Duration {
        self.steps.iter().map(|s| s.delay).sum()
    }

    /// Run every step in order, waiting each step's delay after the previous one
    /// finished. Stops early when `deliver` reports the target is gone.
    pub async fn run<F>(self, mut deliver: F)
    where
        F: FnMut(StepAction) -> bool,
    {
        let name = self.name;
        for step in self.steps {
            if !step.delay.is_zero() {
                tokio::time::sleep(step.delay).await;
            }
            trace!("Pipeline {} emitting {:?}", name, step.action);
            if !deliver(step.action) {
                trace!("Pipeline {} target gone, stopping", name);
                return;
            }
        }
    }
}
