// SPDX-License-Identifier: BSD-2-Clause

use core::cmp::Ordering;
use core::fmt;

use bitflags::bitflags;

bitflags! {
    /// Combined result of a check step. Empty means "nothing to report";
    /// fatal conditions travel as [`crate::errors::CheckError`] instead.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Outcome: u8 {
        /// A structural fix was applied to the in-memory table and must
        /// eventually be persisted via write-back.
        const MODIFIED   = 1 << 0;
        /// Corruption was found but policy declined the fix; the on-disk
        /// state stays inconsistent and the run must not claim success.
        const UNRESOLVED = 1 << 1;
        /// Advisory: the table carries unclean-shutdown markers.
        const DIRTY      = 1 << 2;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        fn rank(s: Severity) -> u8 {
            match s {
                Severity::Info => 0,
                Severity::Warn => 1,
                Severity::Error => 2,
            }
        }
        rank(*self).cmp(&rank(*other))
    }
}

/// One observation made during a check, tagged with a short stable code
/// (e.g. `CHAIN.CROSS`) so callers can filter without parsing messages.
#[derive(Clone, Debug)]
pub struct Finding {
    pub sev: Severity,
    pub code: &'static str,
    pub msg: String,
}

impl Finding {
    pub fn info(code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            sev: Severity::Info,
            code,
            msg: msg.into(),
        }
    }
    pub fn warn(code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            sev: Severity::Warn,
            code,
            msg: msg.into(),
        }
    }
    pub fn err(code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            sev: Severity::Error,
            code,
            msg: msg.into(),
        }
    }
}

/// Accumulated findings for one table check.
#[derive(Clone, Debug, Default)]
pub struct CheckReport {
    pub findings: Vec<Finding>,
}

impl CheckReport {
    pub fn push(&mut self, f: Finding) {
        self.findings.push(f)
    }

    pub fn has_error(&self) -> bool {
        self.findings
            .iter()
            .any(|f| matches!(f.sev, Severity::Error))
    }

    pub fn count(&self, s: Severity) -> usize {
        self.findings.iter().filter(|f| f.sev == s).count()
    }

    pub fn by_code<'a>(&'a self, code: &'static str) -> impl Iterator<Item = &'a Finding> {
        self.findings.iter().filter(move |f| f.code == code)
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for it in &self.findings {
            let tag = match it.sev {
                Severity::Info => "INFO",
                Severity::Warn => "WARN",
                Severity::Error => "ERR ",
            };
            writeln!(f, "{tag}: {:<12} {}", it.code, it.msg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_combines() {
        let out = Outcome::MODIFIED | Outcome::DIRTY;
        assert!(out.contains(Outcome::MODIFIED));
        assert!(!out.contains(Outcome::UNRESOLVED));
        assert!(Outcome::empty().is_empty());
    }

    #[test]
    fn test_report_filters() {
        let mut rep = CheckReport::default();
        rep.push(Finding::info("FAT.SIG", "signature ok"));
        rep.push(Finding::warn("CHAIN.CROSS", "cross-linked"));
        assert!(!rep.has_error());
        assert_eq!(rep.count(Severity::Warn), 1);
        assert_eq!(rep.by_code("CHAIN.CROSS").count(), 1);
    }
}
