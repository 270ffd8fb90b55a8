// variants.rs

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use crate::diagnostics::Diagnostics;
use crate::error::{ProjectionError, Result};

/// (chromosome, position, allele1, allele2); unique within a dataset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey {
    pub chromosome: String,
    pub position: i64,
    pub allele1: String,
    pub allele2: String,
}

impl VariantKey {
    pub fn new(
        chromosome: impl Into<String>,
        position: i64,
        allele1: impl Into<String>,
        allele2: impl Into<String>,
    ) -> Self {
        Self {
            chromosome: chromosome.into(),
            position,
            allele1: allele1.into(),
            allele2: allele2.into(),
        }
    }
}

impl fmt::Display for VariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.chromosome, self.position, self.allele1, self.allele2
        )
    }
}

impl FromStr for VariantKey {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 4 {
            return Err(ProjectionError::DataIntegrity(format!(
                "variant key '{}' is not of the form chrom:pos:a1:a2",
                s
            )));
        }
        let position = parts[1].parse::<i64>().map_err(|e| {
            ProjectionError::DataIntegrity(format!("variant key '{}' has a bad position: {}", s, e))
        })?;
        Ok(VariantKey::new(parts[0], position, parts[2], parts[3]))
    }
}

/// How a study variant list relates to the reference list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantMatch {
    /// Same keys in the same order.
    Ordered,
    /// Same key set, different order. `permutation[r]` is the study row
    /// holding reference variant `r`.
    DifferentOrder { permutation: Vec<usize> },
    DifferentSize { reference: usize, study: usize },
    DifferentIdentity { missing_from_study: usize },
}

/// Fails when a variant key occurs more than once.
pub fn ensure_unique_variants(keys: &[VariantKey], dataset: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(keys.len());
    for key in keys {
        if !seen.insert(key) {
            return Err(ProjectionError::DataIntegrity(format!(
                "variant {} occurs more than once in the {} dataset",
                key, dataset
            )));
        }
    }
    Ok(())
}

/// Classifies the relationship between the two variant lists.
pub fn compare_variants(reference: &[VariantKey], study: &[VariantKey]) -> VariantMatch {
    if reference.len() != study.len() {
        return VariantMatch::DifferentSize {
            reference: reference.len(),
            study: study.len(),
        };
    }
    if reference == study {
        return VariantMatch::Ordered;
    }
    let study_index: HashMap<&VariantKey, usize> =
        study.iter().enumerate().map(|(i, k)| (k, i)).collect();
    let missing_from_study = reference
        .iter()
        .filter(|k| !study_index.contains_key(k))
        .count();
    if missing_from_study > 0 {
        return VariantMatch::DifferentIdentity { missing_from_study };
    }
    let permutation = reference.iter().map(|k| study_index[k]).collect();
    VariantMatch::DifferentOrder { permutation }
}

/// Checks the study variants against the reference.
///
/// Returns `None` when no reordering is needed, or the row permutation that
/// puts the study genotypes into reference order. Different sizes and
/// different key sets abort the run.
pub fn reconcile_variants(
    reference: &[VariantKey],
    study: &[VariantKey],
    diag: &dyn Diagnostics,
) -> Result<Option<Vec<usize>>> {
    ensure_unique_variants(reference, "reference")?;
    ensure_unique_variants(study, "study")?;
    match compare_variants(reference, study) {
        VariantMatch::Ordered => {
            diag.info("Variants match across reference and study datasets.");
            Ok(None)
        }
        VariantMatch::DifferentOrder { permutation } => {
            diag.warn("Study variants are ordered differently from the reference; re-ordering study genotypes.");
            Ok(Some(permutation))
        }
        VariantMatch::DifferentSize { reference, study } => Err(ProjectionError::DataIntegrity(format!(
            "different number of variants between reference ({}) and study ({}) datasets",
            reference, study
        ))),
        VariantMatch::DifferentIdentity { missing_from_study } => Err(ProjectionError::DataIntegrity(format!(
            "variants do not match across datasets (keys chrom, pos, a1, a2): {} reference variant(s) absent from the study",
            missing_from_study
        ))),
    }
}
