//! Persisted state - The `{ instances, profile }` pair stored in one slot

use serde::{Deserialize, Serialize};

use crate::core::files::{FileId, FileItem, FileStore};
use crate::core::instance::{Instance, InstanceId, InstanceStatus, NetworkAddress, RuntimeImage};
use crate::core::logs::LogStream;
use crate::core::profile::Profile;
use crate::core::resource::Resources;

/// Everything the panel remembers between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub instances: Vec<Instance>,
    pub profile: Profile,
}

impl Default for Snapshot {
    /// The bundled dataset used on first run and when the slot cannot be decoded
    fn default() -> Self {
        let mut resources = Resources::new(2048, "10 GB");
        resources.disk = "1.2 GB".to_string();

        let mut seed = FileItem::file(
            "/",
            "index.js",
            "console.log(\"Server started successfully!\");\nconsole.log(\"Listening on port 3000\");",
        );
        seed.id = FileId::from("1");

        let alpha = Instance {
            id: InstanceId::from("srv-001"),
            name: "Production-Alpha".to_string(),
            status: InstanceStatus::Offline,
            network: NetworkAddress {
                ip: "192.168.1.10".to_string(),
                port: 3000,
            },
            resources,
            runtime: RuntimeImage {
                image: "ghcr.io/yolks/nodejs".to_string(),
                version: "20".to_string(),
                startup_command: "node index.js".to_string(),
            },
            template_icon: Some("JS".to_string()),
            files: FileStore::from_entries(vec![seed]),
            logs: LogStream::new(),
        };

        Self {
            instances: vec![alpha],
            profile: Profile::default(),
        }
    }
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Bring restored instances to rest; their timers did not survive the restart
    pub fn settle(&mut self) {
        for instance in &mut self.instances {
            instance.settle();
        }
    }

    pub fn upsert(&mut self, instance: Instance) {
        match self.instances.iter_mut().find(|i| i.id == instance.id) {
            Some(existing) => *existing = instance,
            None => self.instances.push(instance),
        }
    }

    pub fn remove(&mut self, id: &InstanceId) -> bool {
        let before = self.instances.len();
        self.instances.retain(|i| &i.id != id);
        self.instances.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::logs::{LogEntry, LogKind};

    #[test]
    fn test_default_dataset() {
        let snapshot = Snapshot::default();
        assert_eq!(snapshot.instances.len(), 1);

        let alpha = &snapshot.instances[0];
        assert_eq!(alpha.id.as_str(), "srv-001");
        assert_eq!(alpha.name, "Production-Alpha");
        assert_eq!(alpha.network.port, 3000);
        assert_eq!(alpha.files.list("/")[0].name, "index.js");
        assert_eq!(snapshot.profile.name, "RootUser");
    }

    #[test]
    fn test_json_round_trip() {
        let mut snapshot = Snapshot::default();
        let alpha = &mut snapshot.instances[0];
        alpha.log(LogEntry::now(LogKind::Info, "booting"));
        alpha.log(LogEntry::continuation(LogKind::Raw, "  50% [#####]"));
        alpha.files.create("/", "lib", true, None).unwrap();
        snapshot.profile = Profile::new("ops").with_bio("On call");

        let json = snapshot.to_json().unwrap();
        assert_eq!(Snapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn test_field_names_are_camel_case() {
        let json = Snapshot::default().to_json().unwrap();
        assert!(json.contains("\"isDirectory\""));
        assert!(json.contains("\"startupCommand\""));
        assert!(json.contains("\"ramUsage\""));
        assert!(json.contains("\"templateIcon\""));
    }

    #[test]
    fn test_upsert_keeps_order() {
        let mut snapshot = Snapshot::default();
        let mut beta = snapshot.instances[0].clone();
        beta.id = InstanceId::from("srv-002");
        snapshot.upsert(beta.clone());

        beta.name = "Renamed".into();
        snapshot.upsert(beta);

        let names: Vec<_> = snapshot.instances.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Production-Alpha", "Renamed"]);

        assert!(snapshot.remove(&InstanceId::from("srv-001")));
        assert!(!snapshot.remove(&InstanceId::from("srv-001")));
        assert_eq!(snapshot.instances.len(), 1);
    }

    #[test]
    fn test_settle_normalizes_status() {
        let mut snapshot = Snapshot::default();
        snapshot.instances[0].status = InstanceStatus::Running;
        snapshot.instances[0].resources.simulate_running();

        snapshot.settle();
        assert_eq!(snapshot.instances[0].status, InstanceStatus::Offline);
        assert!(snapshot.instances[0].resources.is_idle());
    }
}
