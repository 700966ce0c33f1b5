//! Resource management - Limits and simulated usage of an instance

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Resource descriptors of an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    /// CPU usage percentage (0-100)
    pub cpu: u8,
    /// Memory in use, in MB
    pub ram_usage: u64,
    /// Memory limit, in MB
    pub max_ram: u64,
    /// Disk usage label
    pub disk: String,
    /// Disk limit label
    pub max_disk: String,
}

impl Resources {
    pub fn new(max_ram: u64, max_disk: impl Into<String>) -> Self {
        Self {
            cpu: 0,
            ram_usage: 0,
            max_ram,
            disk: "0 GB".to_string(),
            max_disk: max_disk.into(),
        }
    }

    /// Memory limit as a human-readable label
    pub fn ram_label(&self) -> String {
        format!("{:.1} GB", self.max_ram as f64 / 1024.0)
    }

    /// Draw plausible readings for a freshly booted process
    pub fn simulate_running(&mut self) {
        let mut rng = rand::thread_rng();
        self.cpu = rng.gen_range(5..20);
        let ram: u64 = rng.gen_range(96..=160);
        self.ram_usage = if self.max_ram > 0 {
            ram.min(self.max_ram)
        } else {
            ram
        };
    }

    /// Reset usage after the process exited
    pub fn reset_usage(&mut self) {
        self.cpu = 0;
        self.ram_usage = 0;
    }

    pub fn is_idle(&self) -> bool {
        self.cpu == 0 && self.ram_usage == 0
    }
}
