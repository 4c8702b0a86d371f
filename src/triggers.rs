//! Trigger / annotation label audit.
//!
//! Purely informational: the report lists how often each label occurred and
//! which expected labels are missing or unexpected, for the operator to
//! check.  Nothing here fails on a mismatch.
use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriggerReport {
    /// Total number of observed annotations (with repetitions).
    pub n_observed: usize,
    /// `(label, count)`, most frequent first, ties by label.
    pub counts: Vec<(String, usize)>,
    /// Expected labels never observed.  Empty when no expected set was given.
    pub missing: Vec<String>,
    /// Observed labels outside the expected set.  Empty when no expected set
    /// was given.
    pub unexpected: Vec<String>,
}

impl TriggerReport {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }

    pub fn count(&self, label: &str) -> usize {
        self.counts
            .iter()
            .find(|(l, _)| l == label)
            .map_or(0, |&(_, n)| n)
    }

    /// Emit the report as tracing events.
    pub fn log(&self, subject: &str, task: &str) {
        if self.n_observed == 0 {
            tracing::info!(subject, task, "no annotations found");
            return;
        }
        tracing::info!(subject, task, n = self.n_observed, counts = ?self.counts, "annotations");
        if !self.missing.is_empty() {
            tracing::warn!(subject, task, missing = ?self.missing, "expected trigger labels missing");
        }
        if !self.unexpected.is_empty() {
            tracing::warn!(subject, task, unexpected = ?self.unexpected, "unexpected trigger labels");
        }
    }
}

/// Compare `observed` labels against the optional `expected` set.
pub fn audit_triggers<S: AsRef<str>>(observed: &[S], expected: Option<&[String]>) -> TriggerReport {
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for label in observed {
        *freq.entry(label.as_ref()).or_default() += 1;
    }

    let mut counts: Vec<(String, usize)> =
        freq.iter().map(|(&l, &n)| (l.to_string(), n)).collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let (missing, unexpected) = match expected {
        Some(expected) if !expected.is_empty() => {
            let expected: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
            let present: BTreeSet<&str> = freq.keys().copied().collect();
            (
                expected.difference(&present).map(|s| s.to_string()).collect(),
                present.difference(&expected).map(|s| s.to_string()).collect(),
            )
        }
        _ => (Vec::new(), Vec::new()),
    };

    TriggerReport { n_observed: observed.len(), counts, missing, unexpected }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn counts_sorted_by_frequency_then_label() {
        let obs = ["Gen1", "CSminus", "Gen1", "USface", "CSminus", "Gen1"];
        let r = audit_triggers(&obs, None);
        assert_eq!(r.n_observed, 6);
        assert_eq!(
            r.counts,
            vec![
                ("Gen1".to_string(), 3),
                ("CSminus".to_string(), 2),
                ("USface".to_string(), 1)
            ]
        );
        assert_eq!(r.count("CSminus"), 2);
        assert_eq!(r.count("Gen7"), 0);
    }

    #[test]
    fn no_expected_set_reports_no_discrepancies() {
        let r = audit_triggers(&["anything"], None);
        assert!(r.missing.is_empty());
        assert!(r.unexpected.is_empty());
        assert!(r.is_consistent());
    }

    #[test]
    fn missing_and_unexpected_are_set_differences() {
        let expected = labels(&["startACQ", "CSminus", "USface"]);
        let r = audit_triggers(&["CSminus", "CSminus", "Gen9"], Some(&expected));
        assert_eq!(r.missing, ["USface", "startACQ"]);
        assert_eq!(r.unexpected, ["Gen9"]);
        assert!(!r.is_consistent());
    }

    #[test]
    fn empty_observation_is_not_an_error() {
        let expected = labels(&["startACQ"]);
        let r = audit_triggers::<&str>(&[], Some(&expected));
        assert_eq!(r.n_observed, 0);
        assert_eq!(r.missing, ["startACQ"]);
        r.log("C01", "audio_base");
    }
}
