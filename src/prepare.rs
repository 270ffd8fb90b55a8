// prepare.rs

use std::path::{Path, PathBuf};

use bed_reader::{Bed, ReadOptions};
use log::debug;
use ndarray::Array2;

use crate::error::{ProjectionError, Result};
use crate::samples::SampleId;
use crate::standardize::is_missing;
use crate::variants::VariantKey;

/// bed-reader's missing code for `i8` reads.
const BED_MISSING_I8: i8 = -127;

// --- Genotype Source Abstraction ---

/// Supplies a dataset's variant keys, sample identifiers and dosages.
///
/// Dosages are returned as a variants × samples matrix with values in
/// {0, 1, 2} or the caller's missing sentinel.
pub trait GenotypeSource {
    /// Stable name of the dataset, used in cache fingerprints and messages.
    fn label(&self) -> String;

    fn variants(&self) -> &[VariantKey];

    fn samples(&self) -> &[SampleId];

    /// Reads all samples, or only `sample_indices` in the given order.
    fn read_dosages(&mut self, sample_indices: Option<&[usize]>, missing: f64) -> Result<Array2<f64>>;

    fn num_variants(&self) -> usize {
        self.variants().len()
    }

    fn num_samples(&self) -> usize {
        self.samples().len()
    }
}

fn check_indices(indices: &[usize], num_samples: usize) -> Result<()> {
    match indices.iter().find(|&&i| i >= num_samples) {
        Some(&bad) => Err(ProjectionError::DimensionMismatch {
            context: "sample index (samples in dataset)",
            expected: num_samples,
            found: bad,
        }),
        None => Ok(()),
    }
}

// --- PLINK .bed/.bim/.fam ---

/// A PLINK binary fileset opened through bed-reader.
///
/// Dosages count allele 2, so homozygous allele-1 carriers read as 0.
pub struct PlinkGenotypes {
    prefix: PathBuf,
    bed: Bed,
    variants: Vec<VariantKey>,
    samples: Vec<SampleId>,
}

impl PlinkGenotypes {
    /// Opens `<prefix>.bed` together with its `.bim` and `.fam`.
    pub fn open(prefix: &Path) -> Result<Self> {
        let bed_path = PathBuf::from(format!("{}.bed", prefix.display()));
        if !bed_path.exists() {
            return Err(ProjectionError::Genotype(format!(
                "PLINK file {} not found",
                bed_path.display()
            )));
        }
        let mut bed = Bed::new(&bed_path)?;

        let chromosomes = bed.chromosome()?.to_owned();
        let positions = bed.bp_position()?.to_owned();
        let allele_1 = bed.allele_1()?.to_owned();
        let allele_2 = bed.allele_2()?.to_owned();
        let variants: Vec<VariantKey> = chromosomes
            .iter()
            .zip(positions.iter())
            .zip(allele_1.iter().zip(allele_2.iter()))
            .map(|((chrom, &pos), (a1, a2))| VariantKey::new(chrom.as_str(), pos as i64, a1.as_str(), a2.as_str()))
            .collect();

        let fids = bed.fid()?.to_owned();
        let iids = bed.iid()?.to_owned();
        let samples: Vec<SampleId> = fids
            .iter()
            .zip(iids.iter())
            .map(|(fid, iid)| SampleId::new(fid.as_str(), iid.as_str()))
            .collect();

        debug!(
            "Opened {}: {} variants, {} samples.",
            bed_path.display(),
            variants.len(),
            samples.len()
        );
        Ok(Self {
            prefix: prefix.to_path_buf(),
            bed,
            variants,
            samples,
        })
    }
}

impl GenotypeSource for PlinkGenotypes {
    fn label(&self) -> String {
        self.prefix.display().to_string()
    }

    fn variants(&self) -> &[VariantKey] {
        &self.variants
    }

    fn samples(&self) -> &[SampleId] {
        &self.samples
    }

    fn read_dosages(&mut self, sample_indices: Option<&[usize]>, missing: f64) -> Result<Array2<f64>> {
        let indices: Vec<isize> = match sample_indices {
            Some(indices) => {
                check_indices(indices, self.samples.len())?;
                indices.iter().map(|&i| i as isize).collect()
            }
            None => (0..self.samples.len() as isize).collect(),
        };
        let samples_by_variants = ReadOptions::builder()
            .iid_index(&indices)
            .i8()
            .count_a2()
            .read(&mut self.bed)?;
        Ok(samples_by_variants
            .t()
            .mapv(|v| if v == BED_MISSING_I8 { missing } else { v as f64 }))
    }
}

// --- In-Memory Genotypes ---

/// Genotypes already held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryGenotypes {
    label: String,
    variants: Vec<VariantKey>,
    samples: Vec<SampleId>,
    dosages: Array2<f64>,
    missing: f64,
}

impl InMemoryGenotypes {
    /// `dosages` is variants × samples; entries equal to `missing` are missing.
    pub fn new(
        label: impl Into<String>,
        variants: Vec<VariantKey>,
        samples: Vec<SampleId>,
        dosages: Array2<f64>,
        missing: f64,
    ) -> Result<Self> {
        if dosages.nrows() != variants.len() {
            return Err(ProjectionError::DimensionMismatch {
                context: "in-memory genotypes (variant rows)",
                expected: variants.len(),
                found: dosages.nrows(),
            });
        }
        if dosages.ncols() != samples.len() {
            return Err(ProjectionError::DimensionMismatch {
                context: "in-memory genotypes (sample columns)",
                expected: samples.len(),
                found: dosages.ncols(),
            });
        }
        Ok(Self {
            label: label.into(),
            variants,
            samples,
            dosages,
            missing,
        })
    }
}

impl GenotypeSource for InMemoryGenotypes {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn variants(&self) -> &[VariantKey] {
        &self.variants
    }

    fn samples(&self) -> &[SampleId] {
        &self.samples
    }

    fn read_dosages(&mut self, sample_indices: Option<&[usize]>, missing: f64) -> Result<Array2<f64>> {
        let selected = match sample_indices {
            Some(indices) => {
                check_indices(indices, self.samples.len())?;
                self.dosages.select(ndarray::Axis(1), indices)
            }
            None => self.dosages.clone(),
        };
        let stored = self.missing;
        Ok(selected.mapv(|v| if is_missing(v, stored) { missing } else { v }))
    }
}
