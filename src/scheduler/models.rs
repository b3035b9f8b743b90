use std::fmt;

use serde::Serialize;

/// Outcome of one scheduler pass over a cohort of templates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Occurrences inserted
    pub created: u32,
    /// Due occurrences that already existed
    pub skipped: u32,
    /// Templates whose processing failed and was rolled back
    pub failed: u32,
}

impl RunReport {
    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.skipped == 0 && self.failed == 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} skipped={} failed={}",
            self.created, self.skipped, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_report_is_empty() {
        assert!(RunReport::default().is_empty());
        let report = RunReport {
            created: 2,
            ..Default::default()
        };
        assert!(!report.is_empty());
        assert_eq!(report.to_string(), "created=2 skipped=0 failed=0");
    }
}
