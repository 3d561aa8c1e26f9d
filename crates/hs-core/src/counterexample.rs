//! Counterexample representation and rendering.
//!
//! When an invariant check fails, a counterexample records what the
//! checker saw: state snapshots, per-thread actions, and any memory
//! safety issue it could pin to an address.

use std::fmt::{self, Write as _};

/// A failure path for an invariant violation.
#[derive(Debug, Clone, Default)]
pub struct Counterexample {
    /// State snapshots in step order
    pub states: Vec<StateSnapshot>,
    /// Thread actions that led to the failure
    pub interleaving: Vec<ThreadAction>,
    /// Memory-safety findings
    pub memory_issues: Vec<MemoryIssue>,
    /// Seed that reproduces the run, if it came from DST
    pub dst_seed: Option<u64>,
    /// Free-form summary
    pub description: Option<String>,
}

/// Snapshot of observable state at one step.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub step: u64,
    pub description: String,
    /// `(name, rendered value)` pairs
    pub variables: Vec<(String, String)>,
}

/// One thread's action at one step.
#[derive(Debug, Clone)]
pub struct ThreadAction {
    pub thread_id: u64,
    pub step: u64,
    pub action: String,
    pub success: bool,
}

/// Memory-safety issue tied to a node address or a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryIssue {
    /// A node was reclaimed while a validated hazard still named it.
    UseAfterReclaim { address: usize, holder_thread: u64 },
    /// The same pushed value came out of more than one pop.
    DoubleReturn { value: u64, returns: usize },
    /// A retired node was never reclaimed after the system went quiet.
    Leak { address: usize },
}

impl Counterexample {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counterexample that carries a DST seed for reproduction.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        debug_assert!(seed != 0, "DST seed should not be zero");
        Self {
            dst_seed: Some(seed),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn add_state(&mut self, state: StateSnapshot) {
        debug_assert!(
            self.states.last().map_or(true, |last| state.step > last.step),
            "States must be added in order"
        );
        self.states.push(state);
    }

    pub fn add_action(&mut self, action: ThreadAction) {
        self.interleaving.push(action);
    }

    pub fn add_memory_issue(&mut self, issue: MemoryIssue) {
        self.memory_issues.push(issue);
    }

    /// Render as a thread diagram:
    ///
    /// ```text
    /// DST_SEED=12345
    ///
    /// Step | Thread 0 | Thread 1 | State
    /// -----|----------|----------|------
    ///    1 | publish  |          | head=N1
    ///    2 |          | pop      | head=N0
    /// ```
    #[must_use]
    pub fn render_diagram(&self) -> String {
        let mut out = String::new();

        if let Some(seed) = self.dst_seed {
            let _ = writeln!(out, "DST_SEED={seed}\n");
        }
        if let Some(desc) = &self.description {
            let _ = writeln!(out, "Failure: {desc}\n");
        }

        let mut threads: Vec<u64> = self.interleaving.iter().map(|a| a.thread_id).collect();
        threads.sort_unstable();
        threads.dedup();

        if threads.is_empty() {
            out.push_str("(no thread actions recorded)\n");
        } else {
            out.push_str("Step |");
            for tid in &threads {
                let _ = write!(out, " Thread {tid} |");
            }
            out.push_str(" State\n-----|");
            for _ in &threads {
                out.push_str("----------|");
            }
            out.push_str("------\n");

            let last_step = self.interleaving.iter().map(|a| a.step).max().unwrap_or(0);
            for step in 1..=last_step {
                let _ = write!(out, "{step:4} |");
                for tid in &threads {
                    let action = self
                        .interleaving
                        .iter()
                        .find(|a| a.step == step && a.thread_id == *tid);
                    match action {
                        Some(a) if a.success => {
                            let _ = write!(out, " {} |", a.action);
                        }
                        Some(a) => {
                            let _ = write!(out, " {} [FAIL] |", a.action);
                        }
                        None => out.push_str("          |"),
                    }
                }
                if let Some(state) = self.states.iter().find(|s| s.step == step) {
                    let _ = write!(out, " {}", state.description);
                }
                out.push('\n');
            }
        }

        if !self.memory_issues.is_empty() {
            out.push_str("\nMemory Issues:\n");
            for issue in &self.memory_issues {
                let _ = writeln!(out, "  - {issue}");
            }
        }

        out
    }
}

impl fmt::Display for MemoryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryIssue::UseAfterReclaim {
                address,
                holder_thread,
            } => write!(
                f,
                "Use-after-reclaim: node 0x{address:x} freed while thread {holder_thread} held a hazard on it"
            ),
            MemoryIssue::DoubleReturn { value, returns } => {
                write!(f, "Double return: value {value} popped {returns} times")
            }
            MemoryIssue::Leak { address } => {
                write!(f, "Leak: retired node 0x{address:x} never reclaimed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counterexample_with_seed() {
        let ce = Counterexample::with_seed(12345);
        assert_eq!(ce.dst_seed, Some(12345));
        assert!(ce.states.is_empty());
        assert!(ce.interleaving.is_empty());
    }

    #[test]
    fn test_render_diagram() {
        let mut ce = Counterexample::with_seed(42).with_description("premature free");

        ce.add_action(ThreadAction {
            thread_id: 0,
            step: 1,
            action: "publish(N1)".to_string(),
            success: true,
        });
        ce.add_action(ThreadAction {
            thread_id: 1,
            step: 2,
            action: "reclaim(N1)".to_string(),
            success: false,
        });
        ce.add_state(StateSnapshot {
            step: 1,
            description: "head=N1".to_string(),
            variables: vec![],
        });
        ce.add_memory_issue(MemoryIssue::UseAfterReclaim {
            address: 0x1000,
            holder_thread: 0,
        });

        let diagram = ce.render_diagram();
        assert!(diagram.contains("DST_SEED=42"));
        assert!(diagram.contains("Failure: premature free"));
        assert!(diagram.contains("Thread 1"));
        assert!(diagram.contains("reclaim(N1) [FAIL]"));
        assert!(diagram.contains("node 0x1000"));
    }

    #[test]
    fn test_render_without_actions() {
        let ce = Counterexample::new();
        assert!(ce.render_diagram().contains("no thread actions recorded"));
    }
}
