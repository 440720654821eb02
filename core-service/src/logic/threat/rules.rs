//! Detection Rule Table
//!
//! String heuristics as data: suspicious patterns, exclusions, VM indicators.
//! Loaded from config, matched here, never inlined in the scan loop.

use serde::{Deserialize, Serialize};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Result of matching one process name or window title
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome<'a> {
    /// On the exclusion list (checked first, wins over everything)
    Excluded,
    /// First suspicious pattern that matched
    Suspicious(&'a str),
    Clean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleTable {
    /// Substrings of analysis/debugging tool names
    pub suspicious_patterns: Vec<String>,
    /// The agent's own process/window identifiers
    pub exclusions: Vec<String>,
    /// Substrings of a virtualized system descriptor
    pub vm_indicators: Vec<String>,
    /// VM guest helper process names
    pub vm_processes: Vec<String>,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            suspicious_patterns: strings(&[
                "wireshark", "fiddler", "charles", "burpsuite", "mitmproxy",
                "x64dbg", "x32dbg", "ollydbg", "windbg", "ida64", "idaq", "ghidra",
                "cheatengine", "cheat engine", "processhacker", "process hacker",
                "procmon", "frida", "dnspy", "radare2", "gdb", "lldb", "strace",
            ]),
            exclusions: strings(&["guardian-core", "guardian"]),
            vm_indicators: strings(&[
                "vmware", "virtualbox", "vbox", "qemu", "kvm", "xen", "hyper-v",
                "parallels", "bochs", "virtual machine",
            ]),
            vm_processes: strings(&[
                "vmtoolsd", "vmwaretray", "vmwareuser", "vboxservice", "vboxtray",
                "qemu-ga", "prl_tools", "prl_cc", "xenservice",
            ]),
        }
    }
}

impl RuleTable {
    /// Match a process name or window title.
    ///
    /// Exclusion is checked first and short-circuits; then the first matching
    /// suspicious pattern wins.
    pub fn classify(&self, name: &str) -> MatchOutcome<'_> {
        let name = name.to_lowercase();
        if self.exclusions.iter().any(|e| name.contains(&e.to_lowercase())) {
            return MatchOutcome::Excluded;
        }
        self.suspicious_patterns
            .iter()
            .find(|p| name.contains(&p.to_lowercase()))
            .map(|p| MatchOutcome::Suspicious(p.as_str()))
            .unwrap_or(MatchOutcome::Clean)
    }

    pub fn vm_indicator_in(&self, descriptor: &str) -> Option<&str> {
        let descriptor = descriptor.to_lowercase();
        self.vm_indicators
            .iter()
            .find(|i| descriptor.contains(&i.to_lowercase()))
            .map(|i| i.as_str())
    }

    pub fn vm_process(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.vm_processes
            .iter()
            .find(|p| name.contains(&p.to_lowercase()))
            .map(|p| p.as_str())
    }

    /// Add an exclusion (e.g. the running executable's own name)
    pub fn exclude(&mut self, identifier: &str) {
        let identifier = identifier.to_lowercase();
        if !identifier.is_empty() && !self.exclusions.contains(&identifier) {
            self.exclusions.push(identifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suspicious_match_is_case_insensitive() {
        let rules = RuleTable::default();
        assert_eq!(rules.classify("Wireshark.exe"), MatchOutcome::Suspicious("wireshark"));
        assert_eq!(rules.classify("notepad"), MatchOutcome::Clean);
    }

    #[test]
    fn test_exclusion_wins_over_suspicious() {
        let rules = RuleTable {
            suspicious_patterns: strings(&["gdb"]),
            exclusions: strings(&["guardian"]),
            ..Default::default()
        };
        // Matches both lists -> excluded
        assert_eq!(rules.classify("guardian-gdb-helper"), MatchOutcome::Excluded);
    }

    #[test]
    fn test_first_pattern_wins() {
        let rules = RuleTable {
            suspicious_patterns: strings(&["dbg", "x64dbg"]),
            exclusions: vec![],
            ..Default::default()
        };
        assert_eq!(rules.classify("x64dbg"), MatchOutcome::Suspicious("dbg"));
    }

    #[test]
    fn test_vm_indicators() {
        let rules = RuleTable::default();
        assert_eq!(rules.vm_indicator_in("Linux 6.1 QEMU Standard PC"), Some("qemu"));
        assert_eq!(rules.vm_indicator_in("Dell Latitude 7420"), None);
        assert_eq!(rules.vm_process("VBoxService.exe"), Some("vboxservice"));
        assert_eq!(rules.vm_process("sshd"), None);
    }

    #[test]
    fn test_exclude_is_idempotent() {
        let mut rules = RuleTable::default();
        let before = rules.exclusions.len();
        rules.exclude("My-Agent");
        rules.exclude("my-agent");
        assert_eq!(rules.exclusions.len(), before + 1);
        assert_eq!(rules.classify("my-agent --daemon"), MatchOutcome::Excluded);
    }
}
