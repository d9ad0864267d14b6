//! Target process detection.

use sysinfo::{ProcessRefreshKind, System};

/// Executable names FL Studio is known to run under, lowercase.
const EXACT_NAMES: &[&str] = &[
    "fl64.exe",
    "fl64",
    "fl32.exe",
    "fl32",
    "fl.exe",
    "fl",
    "flstudio.exe",
    "flstudio",
];

/// Prefixes for versioned or duplicated launches ("FL Studio 2024.exe",
/// "FL64 (2).exe").
const NAME_PREFIXES: &[&str] = &["fl studio", "flstudio", "fl64", "fl32"];

pub fn matches_target(process_name: &str) -> bool {
    let name = process_name.trim().to_lowercase();
    if name.is_empty() {
        return false;
    }
    EXACT_NAMES.contains(&name.as_str())
        || NAME_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

pub trait ProcessProbe: Send {
    fn is_running(&mut self) -> bool;
}

/// Scans the OS process table through `sysinfo`.
pub struct SysinfoProbe {
    system: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn refresh(&mut self) -> bool {
        self.system
            .refresh_processes_specifics(ProcessRefreshKind::new());
        !self.system.processes().is_empty()
    }

    /// Names of every running process that looks like FL Studio.
    pub fn matching_processes(&mut self) -> Vec<(u32, String)> {
        if !self.refresh() {
            return Vec::new();
        }
        let mut matches: Vec<(u32, String)> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| matches_target(process.name()))
            .map(|(pid, process)| (pid.as_u32(), process.name().to_string()))
            .collect();
        matches.sort();
        matches
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SysinfoProbe {
    fn is_running(&mut self) -> bool {
        if !self.refresh() {
            // An empty table means enumeration failed; report "not running".
            tracing::warn!("Process enumeration returned no processes");
            return false;
        }
        let found = self
            .system
            .processes()
            .values()
            .find(|process| matches_target(process.name()));
        if let Some(process) = found {
            tracing::trace!(name = %process.name(), pid = %process.pid(), "Found FL Studio process");
            true
        } else {
            false
        }
    }
}
