//! Longitudinal study design: which sample belongs to which subject and time point.

use crate::error::{LufError, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::warn;

/// The two observation times of a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimePoint {
    First,
    Second,
}

/// Maps the free-text time labels of a sample sheet onto [`TimePoint`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeLabels {
    pub first: String,
    pub second: String,
}

impl Default for TimeLabels {
    fn default() -> Self {
        Self {
            first: "1".to_string(),
            second: "2".to_string(),
        }
    }
}

impl TimeLabels {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    pub fn parse(&self, label: &str) -> Option<TimePoint> {
        let label = label.trim();
        if label == self.first.trim() {
            Some(TimePoint::First)
        } else if label == self.second.trim() {
            Some(TimePoint::Second)
        } else {
            None
        }
    }

    pub fn label(&self, time: TimePoint) -> &str {
        match time {
            TimePoint::First => &self.first,
            TimePoint::Second => &self.second,
        }
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimePoint::First => write!(f, "time 1"),
            TimePoint::Second => write!(f, "time 2"),
        }
    }
}

/// One row of a sample sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleEntry {
    pub sample_id: String,
    pub subject_id: String,
    pub time: TimePoint,
}

/// Subject and time point for each sample.
#[derive(Debug, Clone, Default)]
pub struct SampleSheet {
    entries: Vec<SampleEntry>,
}

impl SampleSheet {
    /// Wrap sheet rows, rejecting a sample ID listed more than once.
    pub fn new(entries: Vec<SampleEntry>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        if let Some(dup) = entries.iter().find(|e| !seen.insert(e.sample_id.as_str())) {
            return Err(LufError::DuplicateSheetEntry(dup.sample_id.clone()));
        }
        Ok(Self { entries })
    }

    /// Build a sheet from parallel columns, mapping time labels through `labels`.
    pub fn from_columns(
        sample_ids: &[String],
        subject_ids: &[String],
        times: &[String],
        labels: &TimeLabels,
    ) -> Result<Self> {
        if subject_ids.len() != sample_ids.len() || times.len() != sample_ids.len() {
            return Err(LufError::DimensionMismatch {
                expected: sample_ids.len(),
                actual: subject_ids.len().min(times.len()),
            });
        }
        let entries = sample_ids
            .iter()
            .zip(subject_ids)
            .zip(times)
            .map(|((sample, subject), time)| {
                let time = labels.parse(time).ok_or_else(|| LufError::UnknownTimeLabel {
                    sample: sample.clone(),
                    label: time.clone(),
                })?;
                Ok(SampleEntry {
                    sample_id: sample.clone(),
                    subject_id: subject.clone(),
                    time,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }

    pub fn entries(&self) -> &[SampleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Row indices of each subject's two samples, in subject order.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectPairs {
    pub subjects: Vec<String>,
    pub first: Vec<usize>,
    pub second: Vec<usize>,
}

impl SubjectPairs {
    /// Pair up the samples of `sample_ids` (the rows of the proportion matrix).
    ///
    /// Subjects are ordered by the first row in which they appear.
    ///
    /// # Errors
    /// - a row has no sheet entry
    /// - a subject has two samples at the same time point
    /// - the subjects seen at the two time points differ
    pub fn resolve(sheet: &SampleSheet, sample_ids: &[String]) -> Result<Self> {
        let by_sample: HashMap<&str, &SampleEntry> = sheet
            .entries()
            .iter()
            .map(|e| (e.sample_id.as_str(), e))
            .collect();

        let row_ids: HashSet<&str> = sample_ids.iter().map(String::as_str).collect();
        let unused = sheet
            .entries()
            .iter()
            .filter(|e| !row_ids.contains(e.sample_id.as_str()))
            .count();
        if unused > 0 {
            warn!(unused, "sample sheet rows without a matching table sample were ignored");
        }

        let mut subjects: Vec<String> = Vec::new();
        let mut slot: HashMap<&str, usize> = HashMap::new();
        let mut first: Vec<Option<usize>> = Vec::new();
        let mut second: Vec<Option<usize>> = Vec::new();

        for (row, sample) in sample_ids.iter().enumerate() {
            let entry: &SampleEntry = by_sample
                .get(sample.as_str())
                .copied()
                .ok_or_else(|| LufError::MissingSample(sample.clone()))?;
            let idx = *slot.entry(entry.subject_id.as_str()).or_insert_with(|| {
                subjects.push(entry.subject_id.clone());
                first.push(None);
                second.push(None);
                subjects.len() - 1
            });
            let target = match entry.time {
                TimePoint::First => &mut first[idx],
                TimePoint::Second => &mut second[idx],
            };
            if target.replace(row).is_some() {
                return Err(LufError::DuplicateSample {
                    subject: entry.subject_id.clone(),
                    time: entry.time.to_string(),
                });
            }
        }

        let unpaired: Vec<String> = subjects
            .iter()
            .zip(first.iter().zip(&second))
            .filter_map(|(subject, pair)| match pair {
                (Some(_), None) => Some(format!("'{subject}' only at time 1")),
                (None, Some(_)) => Some(format!("'{subject}' only at time 2")),
                _ => None,
            })
            .collect();
        if !unpaired.is_empty() {
            return Err(LufError::SubjectMismatch(unpaired.join(", ")));
        }

        Ok(Self {
            subjects,
            first: first.into_iter().flatten().collect(),
            second: second.into_iter().flatten().collect(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn sheet(rows: &[(&str, &str, &str)]) -> Result<SampleSheet> {
        let samples: Vec<String> = rows.iter().map(|r| r.0.to_string()).collect();
        let subjects: Vec<String> = rows.iter().map(|r| r.1.to_string()).collect();
        let times: Vec<String> = rows.iter().map(|r| r.2.to_string()).collect();
        SampleSheet::from_columns(&samples, &subjects, &times, &TimeLabels::default())
    }

    #[test]
    fn test_pairs_follow_row_order() {
        let sheet = sheet(&[
            ("a2", "alice", "2"),
            ("b1", "bob", "1"),
            ("a1", "alice", "1"),
            ("b2", "bob", "2"),
        ])
        .unwrap();
        let rows = strings(&["b1", "a1", "b2", "a2"]);
        let pairs = SubjectPairs::resolve(&sheet, &rows).unwrap();
        assert_eq!(pairs.subjects, strings(&["bob", "alice"]));
        assert_eq!(pairs.first, vec![0, 1]);
        assert_eq!(pairs.second, vec![2, 3]);
    }

    #[test]
    fn test_custom_time_labels() {
        let labels = TimeLabels::new("pre", "post");
        assert_eq!(labels.parse(" post "), Some(TimePoint::Second));
        assert_eq!(labels.parse("2"), None);
        assert_eq!(labels.label(TimePoint::First), "pre");
    }

    #[test]
    fn test_unknown_time_label() {
        let result = sheet(&[("a1", "alice", "1"), ("a3", "alice", "3")]);
        assert!(matches!(result, Err(LufError::UnknownTimeLabel { .. })));
    }

    #[test]
    fn test_subject_sets_must_match() {
        let sheet = sheet(&[("a1", "alice", "1"), ("a2", "alice", "2"), ("b1", "bob", "1")]).unwrap();
        let rows = strings(&["a1", "a2", "b1"]);
        match SubjectPairs::resolve(&sheet, &rows) {
            Err(LufError::SubjectMismatch(msg)) => assert!(msg.contains("bob")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_time_point() {
        let sheet = sheet(&[("a1", "alice", "1"), ("a1b", "alice", "1"), ("a2", "alice", "2")]).unwrap();
        let rows = strings(&["a1", "a1b", "a2"]);
        assert!(matches!(
            SubjectPairs::resolve(&sheet, &rows),
            Err(LufError::DuplicateSample { .. })
        ));
    }

    #[test]
    fn test_missing_sheet_entry() {
        let sheet = sheet(&[("a1", "alice", "1"), ("a2", "alice", "2")]).unwrap();
        let rows = strings(&["a1", "a2", "zz"]);
        match SubjectPairs::resolve(&sheet, &rows) {
            Err(LufError::MissingSample(s)) => assert_eq!(s, "zz"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_extra_sheet_rows_are_ignored() {
        let sheet = sheet(&[
            ("a1", "alice", "1"),
            ("a2", "alice", "2"),
            ("c1", "carol", "1"),
        ])
        .unwrap();
        let rows = strings(&["a1", "a2"]);
        let pairs = SubjectPairs::resolve(&sheet, &rows).unwrap();
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_repeated_sample_is_rejected() {
        // Same sample at both time points: accepting it would swap x and y
        let swapped = sheet(&[("x", "p", "1"), ("y", "p", "2"), ("x", "p", "2"), ("y", "p", "1")]);
        assert!(matches!(swapped, Err(LufError::DuplicateSheetEntry(s)) if s == "x"));

        let two_subjects = sheet(&[("a1", "alice", "1"), ("a1", "bob", "1")]);
        assert!(matches!(two_subjects, Err(LufError::DuplicateSheetEntry(s)) if s == "a1"));

        let entry = |subject: &str| SampleEntry {
            sample_id: "s1".to_string(),
            subject_id: subject.to_string(),
            time: TimePoint::First,
        };
        assert!(SampleSheet::new(vec![entry("alice"), entry("alice")]).is_err());
        assert_eq!(SampleSheet::new(vec![entry("alice")]).unwrap().len(), 1);
    }
}
