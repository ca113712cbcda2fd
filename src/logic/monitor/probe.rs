//! Resource probe
//!
//! CPU and memory usage of a named process (summed over every process with
//! that name), attached to change reports when configured.

use serde::{Deserialize, Serialize};
use sysinfo::System;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub cpu_percent: f32,
    pub memory_mb: f64,
    pub memory_percent: f32,
}

pub trait ResourceProbe: Send {
    /// `None` when no such process is running.
    fn probe(&mut self) -> Option<ResourceStats>;
}

/// sysinfo-backed probe for one process name.
pub struct ProcessProbe {
    name: String,
    sys: System,
}

impl ProcessProbe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sys: System::new(),
        }
    }
}

impl ResourceProbe for ProcessProbe {
    fn probe(&mut self) -> Option<ResourceStats> {
        // CPU usage needs two samples
        self.sys.refresh_processes();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.sys.refresh_processes();
        self.sys.refresh_memory();

        let total_memory = self.sys.total_memory() as f64;
        let mut found = false;
        let mut cpu = 0.0f32;
        let mut memory_bytes = 0u64;

        for process in self.sys.processes().values() {
            if process.name() != self.name {
                continue;
            }
            found = true;
            cpu += process.cpu_usage();
            memory_bytes += process.memory();
        }

        if !found {
            log::debug!("Process '{}' not running, no resource stats", self.name);
            return None;
        }

        Some(ResourceStats {
            cpu_percent: cpu,
            memory_mb: memory_bytes as f64 / 1024.0 / 1024.0,
            memory_percent: if total_memory > 0.0 {
                (memory_bytes as f64 / total_memory * 100.0) as f32
            } else {
                0.0
            },
        })
    }
}
