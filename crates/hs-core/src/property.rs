//! Property results and the checker trait.

use std::fmt;

use crate::counterexample::Counterexample;

/// Outcome of checking one named invariant.
#[derive(Debug, Clone)]
pub struct PropertyResult {
    /// Invariant name, e.g. `NoLostElements`
    pub name: &'static str,
    /// Whether the invariant held
    pub holds: bool,
    /// Human-readable description of the violation
    pub violation: Option<String>,
    /// Failure path, when the checker could reconstruct one
    pub counterexample: Option<Counterexample>,
}

impl PropertyResult {
    /// A passing result.
    #[must_use]
    pub fn pass(name: &'static str) -> Self {
        Self {
            name,
            holds: true,
            violation: None,
            counterexample: None,
        }
    }

    /// A failing result.
    #[must_use]
    pub fn fail(
        name: &'static str,
        violation: impl Into<String>,
        counterexample: Option<Counterexample>,
    ) -> Self {
        Self {
            name,
            holds: false,
            violation: Some(violation.into()),
            counterexample,
        }
    }
}

impl fmt::Display for PropertyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.violation {
            None => write!(f, "[PASS] {}", self.name),
            Some(violation) => {
                write!(f, "[FAIL] {}: {}", self.name, violation)?;
                if let Some(ce) = &self.counterexample {
                    write!(f, "\n{}", ce.render_diagram())?;
                }
                Ok(())
            }
        }
    }
}

/// Something that can evaluate a fixed set of invariants.
pub trait PropertyChecker {
    /// Check every invariant and return one result per invariant.
    fn check_all(&self) -> Vec<PropertyResult>;

    /// True when every invariant holds.
    fn all_hold(&self) -> bool {
        self.check_all().iter().all(|r| r.holds)
    }

    /// Only the failing results.
    fn failures(&self) -> Vec<PropertyResult> {
        self.check_all().into_iter().filter(|r| !r.holds).collect()
    }

    /// Multi-line report suitable for assertion messages.
    fn report(&self) -> String {
        self.check_all()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<PropertyResult>);

    impl PropertyChecker for Fixed {
        fn check_all(&self) -> Vec<PropertyResult> {
            self.0.clone()
        }
    }

    #[test]
    fn test_all_hold_and_failures() {
        let checker = Fixed(vec![
            PropertyResult::pass("A"),
            PropertyResult::fail("B", "broken", None),
        ]);

        assert!(!checker.all_hold());
        let failures = checker.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].name, "B");
        assert!(checker.report().contains("[FAIL] B: broken"));
    }
}
