// samples.rs

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::diagnostics::Diagnostics;
use crate::error::{ProjectionError, Result};

/// A sample identifier from a PLINK `.fam` file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleId {
    pub fid: String,
    pub iid: String,
}

impl SampleId {
    pub fn new(fid: impl Into<String>, iid: impl Into<String>) -> Self {
        Self {
            fid: fid.into(),
            iid: iid.into(),
        }
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.fid, self.iid)
    }
}

/// Fails on the first repeated `(FID, IID)` pair.
pub fn ensure_unique_samples(ids: &[SampleId], dataset: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id) {
            return Err(ProjectionError::DataIntegrity(format!(
                "samples with duplicated FID + IID detected in the {} dataset ({}); please remove and retry",
                dataset, id
            )));
        }
    }
    Ok(())
}

/// Reads a keep-list: one `FID IID` pair per line, whitespace separated.
/// Blank lines and lines starting with `#` are skipped.
pub fn read_sample_filter(path: &Path) -> Result<HashSet<SampleId>> {
    let content = fs::read_to_string(path).map_err(|e| ProjectionError::io(path, e))?;
    let mut keep = HashSet::new();
    for (line_num, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() < 2 {
            return Err(ProjectionError::artifact(
                path,
                format!("line {}: expected 'FID IID', found '{}'", line_num + 1, trimmed),
            ));
        }
        keep.insert(SampleId::new(parts[0], parts[1]));
    }
    Ok(keep)
}

/// Indices (in dataset order) of the samples present in `keep`.
///
/// No overlap at all is fatal; a partial overlap is reported and the
/// matched subset is used.
pub fn select_samples(
    ids: &[SampleId],
    keep: &HashSet<SampleId>,
    diag: &dyn Diagnostics,
) -> Result<Vec<usize>> {
    let selected: Vec<usize> = ids
        .iter()
        .enumerate()
        .filter_map(|(idx, id)| keep.contains(id).then_some(idx))
        .collect();
    if selected.is_empty() {
        return Err(ProjectionError::DataIntegrity(format!(
            "0 / {} ids in filter list match the study dataset",
            keep.len()
        )));
    }
    if selected.len() < keep.len() {
        diag.warn(&format!(
            "Only {} / {} ids in filter list match the study dataset.",
            selected.len(),
            keep.len()
        ));
    } else {
        diag.info(&format!("Extracted {} samples from study genotyping data.", selected.len()));
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use std::io::Write;

    fn ids(pairs: &[(&str, &str)]) -> Vec<SampleId> {
        pairs.iter().map(|(f, i)| SampleId::new(*f, *i)).collect()
    }

    #[test]
    fn duplicated_pairs_are_rejected() {
        let dup = ids(&[("samp001", "a"), ("samp001", "b"), ("samp001", "a")]);
        let err = ensure_unique_samples(&dup, "study").unwrap_err();
        assert!(matches!(err, ProjectionError::DataIntegrity(_)));
        assert!(err.to_string().contains("duplicated FID + IID"));
    }

    #[test]
    fn same_iid_under_distinct_fids_is_accepted() {
        let ok = ids(&[("f1", "a"), ("f2", "a")]);
        assert!(ensure_unique_samples(&ok, "study").is_ok());
    }

    #[test]
    fn partial_overlap_warns_and_keeps_matches() {
        let all = ids(&[("f", "a"), ("f", "b"), ("f", "c")]);
        let keep: HashSet<SampleId> = ids(&[("f", "c"), ("f", "a"), ("f", "z")]).into_iter().collect();
        let diag = RecordingDiagnostics::new();
        let selected = select_samples(&all, &keep, &diag).unwrap();
        assert_eq!(selected, vec![0, 2]);
        assert!(diag.warnings()[0].contains("2 / 3"));
    }

    #[test]
    fn zero_overlap_is_fatal() {
        let all = ids(&[("f", "a")]);
        let keep: HashSet<SampleId> = ids(&[("g", "a")]).into_iter().collect();
        let diag = RecordingDiagnostics::new();
        assert!(matches!(
            select_samples(&all, &keep, &diag),
            Err(ProjectionError::DataIntegrity(_))
        ));
    }

    #[test]
    fn filter_file_is_parsed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# keep list").unwrap();
        writeln!(file, "fam1\tind1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "fam2 ind2 extra").unwrap();
        let keep = read_sample_filter(file.path()).unwrap();
        assert_eq!(keep.len(), 2);
        assert!(keep.contains(&SampleId::new("fam2", "ind2")));
    }
}
