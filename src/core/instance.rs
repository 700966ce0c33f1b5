//! Instance management - Represents a single hosted instance

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::files::{FileItem, FileStore};
use super::logs::{LogEntry, LogStream};
use super::resource::Resources;

/// Unique identifier for an instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl InstanceId {
    /// A fresh `srv-xxxxx` id; the registry re-rolls on collision
    pub fn new() -> Self {
        Self(format!("srv-{}", &Uuid::new_v4().simple().to_string()[..5]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Status of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    /// Instance is not running
    Offline,
    /// Instance is booting
    Starting,
    /// Instance is running normally
    Running,
    /// Instance is shutting down
    Stopping,
}

impl InstanceStatus {
    /// A transition is in progress
    pub fn is_transitional(&self) -> bool {
        matches!(self, Self::Starting | Self::Stopping)
    }

    /// `start` has no effect in this status
    pub fn ignores_start(&self) -> bool {
        matches!(self, Self::Running | Self::Starting)
    }

    /// `stop` has no effect in this status
    pub fn ignores_stop(&self) -> bool {
        matches!(self, Self::Offline | Self::Stopping)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Network address of an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAddress {
    pub ip: String,
    pub port: u16,
}

impl NetworkAddress {
    /// Address with a random unprivileged port
    pub fn random_port(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port: rand::thread_rng().gen_range(1024..65535),
        }
    }
}

impl std::fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Runtime image an instance is deployed from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeImage {
    pub image: String,
    pub version: String,
    pub startup_command: String,
}

/// Runtime template a project is created from (supplied by the catalog)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    /// Catalog id, e.g. `nodejs`
    pub id: String,
    /// Short badge, e.g. `JS`
    pub icon: String,
    pub image: String,
    /// Available versions; the first one is deployed
    pub versions: Vec<String>,
}

impl Template {
    /// Startup command and seed file `(command, file name, file content)` for this template
    pub fn entrypoint(&self) -> (&'static str, &'static str, &'static str) {
        match self.id.as_str() {
            "nodejs" => ("node index.js", "index.js", "console.log(\"Node server started!\");"),
            "python" => ("python main.py", "main.py", "print(\"Python server started!\")"),
            "bun" => ("bun run index.ts", "index.ts", "console.log(\"Bun server started!\");"),
            "deno" => ("deno run main.ts", "main.ts", "console.log(\"Deno server started!\");"),
            "go" => (
                "go run main.go",
                "main.go",
                "package main\n\nfunc main() {\n\tprintln(\"Go server started!\")\n}",
            ),
            "rust" => (
                "cargo run",
                "main.rs",
                "fn main() {\n    println!(\"Rust server started!\");\n}",
            ),
            "php" => ("php index.php", "index.php", "<?php\necho \"PHP server started!\";"),
            "ruby" => ("ruby main.rb", "main.rb", "print(\"Ruby server started!\")"),
            "java" => (
                "java Main.java",
                "Main.java",
                "class Main {\n    public static void main(String[] a) {\n        System.out.println(\"Java server started!\");\n    }\n}",
            ),
            _ => ("sh start.sh", "start.sh", "echo \"Server started!\""),
        }
    }

    pub fn default_version(&self) -> &str {
        self.versions.first().map(String::as_str).unwrap_or("latest")
    }
}

/// Parameters of a project-creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRequest {
    pub name: String,
    pub template: Template,
    /// Memory limit in MB
    pub ram_limit_mb: u64,
    /// Disk limit label, e.g. `10 GB`
    pub disk_limit: String,
}

/// Represents a managed hosted instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    /// Unique identifier
    pub id: InstanceId,
    /// Display name
    pub name: String,
    /// Current status
    pub status: InstanceStatus,
    pub network: NetworkAddress,
    pub resources: Resources,
    pub runtime: RuntimeImage,
    /// Badge of the template this instance was created from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_icon: Option<String>,
    /// Virtual file store
    pub files: FileStore,
    /// Console history
    pub logs: LogStream,
}

impl Instance {
    /// Build an offline instance for a project request
    pub fn from_request(id: InstanceId, request: &ProjectRequest, ip: &str) -> Self {
        let (command, file_name, content) = request.template.entrypoint();
        let mut files = FileStore::new();
        files.insert(FileItem::file("/", file_name, content));

        Self {
            id,
            name: request.name.trim().to_string(),
            status: InstanceStatus::Offline,
            network: NetworkAddress::random_port(ip),
            resources: Resources::new(request.ram_limit_mb, request.disk_limit.clone()),
            runtime: RuntimeImage {
                image: request.template.image.clone(),
                version: request.template.default_version().to_string(),
                startup_command: command.to_string(),
            },
            template_icon: Some(request.template.icon.clone()),
            files,
            logs: LogStream::new(),
        }
    }

    pub fn log(&mut self, entry: LogEntry) {
        self.logs.append(entry);
    }

    /// Put the instance at rest: offline, with no usage.
    ///
    /// Used for instances restored from storage, whose timers did not survive.
    pub fn settle(&mut self) {
        self.status = InstanceStatus::Offline;
        self.resources.reset_usage();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_template() -> Template {
        Template {
            id: "nodejs".into(),
            icon: "JS".into(),
            image: "ghcr.io/yolks/nodejs".into(),
            versions: vec!["20".into(), "18".into()],
        }
    }

    #[test]
    fn test_status_guards() {
        assert!(InstanceStatus::Running.ignores_start());
        assert!(InstanceStatus::Starting.ignores_start());
        assert!(!InstanceStatus::Offline.ignores_start());
        assert!(!InstanceStatus::Stopping.ignores_start());

        assert!(InstanceStatus::Offline.ignores_stop());
        assert!(InstanceStatus::Stopping.ignores_stop());
        assert!(!InstanceStatus::Running.ignores_stop());
        assert!(!InstanceStatus::Starting.ignores_stop());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&InstanceStatus::Stopping).unwrap(),
            "\"stopping\""
        );
    }

    #[test]
    fn test_from_request() {
        let request = ProjectRequest {
            name: "  api  ".into(),
            template: node_template(),
            ram_limit_mb: 2048,
            disk_limit: "10 GB".into(),
        };
        let instance = Instance::from_request(InstanceId::from("srv-abcde"), &request, "10.0.0.1");

        assert_eq!(instance.name, "api");
        assert_eq!(instance.status, InstanceStatus::Offline);
        assert_eq!(instance.runtime.version, "20");
        assert_eq!(instance.runtime.startup_command, "node index.js");
        assert!((1024..65535).contains(&instance.network.port));
        assert_eq!(instance.network.ip, "10.0.0.1");

        let files = instance.files.list("/");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "index.js");
        assert!(instance.logs.is_empty());
    }

    #[test]
    fn test_generated_ids() {
        let id = InstanceId::new();
        assert!(id.as_str().starts_with("srv-"));
        assert_eq!(id.as_str().len(), 9);
    }

    #[test]
    fn test_settle() {
        let request = ProjectRequest {
            name: "api".into(),
            template: node_template(),
            ram_limit_mb: 2048,
            disk_limit: "10 GB".into(),
        };
        let mut instance = Instance::from_request(InstanceId::new(), &request, "10.0.0.1");
        instance.status = InstanceStatus::Stopping;
        instance.resources.simulate_running();

        instance.settle();
        assert_eq!(instance.status, InstanceStatus::Offline);
        assert!(instance.resources.is_idle());
    }
}
