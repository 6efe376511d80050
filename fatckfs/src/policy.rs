// SPDX-License-Identifier: BSD-2-Clause

//! Repair decision policy.
//!
//! Every fix the checker can apply is gated through [`RepairPolicy::ask`],
//! so "always fix", "report only" and interactive prompting are all just
//! different implementations handed in by the caller.

/// Decides whether a proposed repair should be applied.
pub trait RepairPolicy {
    /// `what` names the repair ("Truncate", "Fix", ...); `default_yes` is
    /// the answer a non-interactive run should lean towards.
    fn ask(&mut self, default_yes: bool, what: &str) -> bool;
}

/// Applies every proposed repair (`-y` runs).
#[derive(Debug, Default, Clone, Copy)]
pub struct FixAll;

impl RepairPolicy for FixAll {
    fn ask(&mut self, _default_yes: bool, _what: &str) -> bool {
        true
    }
}

/// Declines every repair; anomalies are only reported (`-n` runs and
/// read-only tables).
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportOnly;

impl RepairPolicy for ReportOnly {
    fn ask(&mut self, _default_yes: bool, _what: &str) -> bool {
        false
    }
}

/// Takes each prompt's default answer (preen-style runs).
#[derive(Debug, Default, Clone, Copy)]
pub struct UseDefault;

impl RepairPolicy for UseDefault {
    fn ask(&mut self, default_yes: bool, _what: &str) -> bool {
        default_yes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_policies() {
        assert!(FixAll.ask(false, "Truncate"));
        assert!(!ReportOnly.ask(true, "Fix"));
        assert!(UseDefault.ask(true, "Fix"));
        assert!(!UseDefault.ask(false, "Clear"));
    }
}
