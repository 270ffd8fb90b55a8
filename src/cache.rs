// cache.rs
//
// Reference artifacts are computed once per reference panel and reused by
// every later run. A cache lookup is an explicit hit or miss; a miss always
// means "recompute".

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::decompose::{DecompositionMethod, ReferenceDecomposition};
use crate::diagnostics::Diagnostics;
use crate::error::{ProjectionError, Result};
use crate::standardize::StandardizationParams;
use crate::variants::VariantKey;

/// Fingerprint of everything the cached artifacts depend on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheKey {
    pub reference: String,
    pub num_variants: usize,
    pub num_samples: usize,
    pub components: usize,
    pub method: DecompositionMethod,
    pub with_cross_product: bool,
}

/// The frozen reference state that is persisted between runs.
#[derive(Debug, Clone)]
pub struct ReferenceArtifacts {
    pub params: StandardizationParams,
    pub decomposition: ReferenceDecomposition,
    pub cross_product: Option<Array2<f64>>,
    pub variants: Vec<VariantKey>,
}

#[derive(Debug)]
pub enum CacheLookup {
    Hit(ReferenceArtifacts),
    /// Nothing usable was found; the reason is for diagnostics only.
    Miss(String),
}

pub trait ReferenceCache {
    fn load(&self, key: &CacheKey, diag: &dyn Diagnostics) -> Result<CacheLookup>;
    fn store(&self, key: &CacheKey, artifacts: &ReferenceArtifacts, diag: &dyn Diagnostics) -> Result<()>;
}

/// Never hits and never stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl ReferenceCache for NoCache {
    fn load(&self, _key: &CacheKey, _diag: &dyn Diagnostics) -> Result<CacheLookup> {
        Ok(CacheLookup::Miss("caching disabled".to_string()))
    }

    fn store(&self, _key: &CacheKey, _artifacts: &ReferenceArtifacts, _diag: &dyn Diagnostics) -> Result<()> {
        Ok(())
    }
}

// --- Directory Cache ---

/// Plain-text artifacts next to a file prefix:
/// `_mnsd.dat`, `_s.dat`, `_V.dat`, `_U.dat`, `_XTX.dat`, `_vars.dat` and
/// `_manifest.json`.
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    prefix: PathBuf,
}

impl DirectoryCache {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn path(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.prefix.display(), suffix))
    }

    fn manifest_path(&self) -> PathBuf {
        self.path("_manifest.json")
    }

    fn read_artifacts(&self, key: &CacheKey) -> Result<ReferenceArtifacts> {
        let mnsd_path = self.path("_mnsd.dat");
        let mnsd = read_matrix(&mnsd_path)?;
        expect_shape(&mnsd_path, &mnsd, (key.num_variants, 2))?;
        let params = StandardizationParams::new(mnsd.column(0).to_owned(), mnsd.column(1).to_owned())?;

        let s_path = self.path("_s.dat");
        let s = read_matrix(&s_path)?;
        expect_shape(&s_path, &s, (key.components, 1))?;
        let singular_values: Array1<f64> = s.column(0).to_owned();

        let v_path = self.path("_V.dat");
        let right = read_matrix(&v_path)?;
        expect_shape(&v_path, &right, (key.num_samples, key.components))?;

        let u_path = self.path("_U.dat");
        let loadings = read_matrix(&u_path)?;
        expect_shape(&u_path, &loadings, (key.num_variants, key.components))?;

        let cross_product = if key.with_cross_product {
            let xtx_path = self.path("_XTX.dat");
            let xtx = read_matrix(&xtx_path)?;
            expect_shape(&xtx_path, &xtx, (key.num_samples, key.num_samples))?;
            Some(xtx)
        } else {
            None
        };

        let vars_path = self.path("_vars.dat");
        let variants = read_variants(&vars_path)?;
        if variants.len() != key.num_variants {
            return Err(ProjectionError::artifact(
                &vars_path,
                format!("expected {} variants, found {}", key.num_variants, variants.len()),
            ));
        }

        Ok(ReferenceArtifacts {
            params,
            decomposition: ReferenceDecomposition {
                singular_values,
                right,
                loadings: Some(loadings),
            },
            cross_product,
            variants,
        })
    }
}

impl ReferenceCache for DirectoryCache {
    fn load(&self, key: &CacheKey, diag: &dyn Diagnostics) -> Result<CacheLookup> {
        let manifest_path = self.manifest_path();
        let manifest = match fs::read_to_string(&manifest_path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(CacheLookup::Miss(format!("{} not found", manifest_path.display())));
            }
            Err(e) => return Err(ProjectionError::io(&manifest_path, e)),
        };
        let stored: CacheKey = match serde_json::from_str(&manifest) {
            Ok(stored) => stored,
            Err(e) => {
                diag.warn(&format!(
                    "Ignoring unreadable cache manifest {}: {}",
                    manifest_path.display(),
                    e
                ));
                return Ok(CacheLookup::Miss("unreadable manifest".to_string()));
            }
        };
        if &stored != key {
            diag.warn(&format!(
                "Cached reference artifacts at {} were built with different parameters; recomputing.",
                manifest_path.display()
            ));
            return Ok(CacheLookup::Miss("parameter fingerprint differs".to_string()));
        }

        match self.read_artifacts(key) {
            Ok(artifacts) => Ok(CacheLookup::Hit(artifacts)),
            Err(ProjectionError::Io { path, source }) if source.kind() == ErrorKind::NotFound => {
                Ok(CacheLookup::Miss(format!("{} not found", path.display())))
            }
            Err(e) => {
                diag.warn(&format!("Ignoring cached reference artifacts: {}", e));
                Ok(CacheLookup::Miss(e.to_string()))
            }
        }
    }

    fn store(&self, key: &CacheKey, artifacts: &ReferenceArtifacts, diag: &dyn Diagnostics) -> Result<()> {
        // The manifest goes last; an interrupted store is therefore a miss.
        let manifest_path = self.manifest_path();
        if manifest_path.exists() {
            fs::remove_file(&manifest_path).map_err(|e| ProjectionError::io(&manifest_path, e))?;
        }

        let params = &artifacts.params;
        let mnsd = Array2::from_shape_fn((params.num_variants(), 2), |(i, j)| {
            if j == 0 {
                params.mean[i]
            } else {
                params.std[i]
            }
        });
        write_matrix(&self.path("_mnsd.dat"), mnsd.view())?;

        let decomposition = &artifacts.decomposition;
        let s = decomposition.singular_values.view().insert_axis(ndarray::Axis(1));
        write_matrix(&self.path("_s.dat"), s)?;
        write_matrix(&self.path("_V.dat"), decomposition.right.view())?;
        let loadings = decomposition.loadings.as_ref().ok_or_else(|| {
            ProjectionError::Config("cannot cache a reference decomposition without loadings".to_string())
        })?;
        write_matrix(&self.path("_U.dat"), loadings.view())?;
        if key.with_cross_product {
            let xtx = artifacts.cross_product.as_ref().ok_or_else(|| {
                ProjectionError::Config("cache key requires XᵗX but none was supplied".to_string())
            })?;
            write_matrix(&self.path("_XTX.dat"), xtx.view())?;
        }
        write_variants(&self.path("_vars.dat"), &artifacts.variants)?;

        let json = serde_json::to_string_pretty(key)?;
        fs::write(&manifest_path, json).map_err(|e| ProjectionError::io(&manifest_path, e))?;
        diag.info(&format!(
            "Reference artifacts saved under {}_*",
            self.prefix.display()
        ));
        Ok(())
    }
}

// --- Text Matrix Format ---

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| ProjectionError::io(path, e))?;
    Ok(BufWriter::new(file))
}

/// One row per line, space separated, shortest round-trip float text.
pub fn write_matrix(path: &Path, m: ArrayView2<f64>) -> Result<()> {
    let mut writer = create(path)?;
    for row in m.rows() {
        let line: Vec<String> = row.iter().map(|v| format!("{:e}", v)).collect();
        writeln!(writer, "{}", line.join(" ")).map_err(|e| ProjectionError::io(path, e))?;
    }
    writer.flush().map_err(|e| ProjectionError::io(path, e))
}

pub fn read_matrix(path: &Path) -> Result<Array2<f64>> {
    let content = fs::read_to_string(path).map_err(|e| ProjectionError::io(path, e))?;
    let mut values = Vec::new();
    let mut cols: Option<usize> = None;
    let mut rows = 0usize;
    for (line_num, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let before = values.len();
        for token in line.split_whitespace() {
            let v = token.parse::<f64>().map_err(|e| {
                ProjectionError::artifact(path, format!("line {}: '{}': {}", line_num + 1, token, e))
            })?;
            values.push(v);
        }
        let width = values.len() - before;
        match cols {
            None => cols = Some(width),
            Some(c) if c != width => {
                return Err(ProjectionError::artifact(
                    path,
                    format!("line {} has {} values, expected {}", line_num + 1, width, c),
                ))
            }
            Some(_) => {}
        }
        rows += 1;
    }
    Array2::from_shape_vec((rows, cols.unwrap_or(0)), values)
        .map_err(|e| ProjectionError::artifact(path, e.to_string()))
}

fn expect_shape(path: &Path, m: &Array2<f64>, shape: (usize, usize)) -> Result<()> {
    if m.dim() != shape {
        return Err(ProjectionError::artifact(
            path,
            format!("expected a {}x{} matrix, found {}x{}", shape.0, shape.1, m.nrows(), m.ncols()),
        ));
    }
    Ok(())
}

fn write_variants(path: &Path, variants: &[VariantKey]) -> Result<()> {
    let mut writer = create(path)?;
    for key in variants {
        writeln!(writer, "{}", key).map_err(|e| ProjectionError::io(path, e))?;
    }
    writer.flush().map_err(|e| ProjectionError::io(path, e))
}

fn read_variants(path: &Path) -> Result<Vec<VariantKey>> {
    let content = fs::read_to_string(path).map_err(|e| ProjectionError::io(path, e))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.parse::<VariantKey>()
                .map_err(|e| ProjectionError::artifact(path, e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use ndarray::array;

    fn artifacts() -> ReferenceArtifacts {
        ReferenceArtifacts {
            params: StandardizationParams::new(array![0.5, 1.25, 2.0 / 3.0], array![0.1, 1.0, 0.7]).unwrap(),
            decomposition: ReferenceDecomposition {
                singular_values: array![3.5, 0.1 + 0.2],
                right: array![[0.6, -0.8], [0.8, 0.6]],
                loadings: Some(array![[1.0e-17, 0.3], [0.25, -1.0 / 3.0], [0.0, 1.0]]),
            },
            cross_product: Some(array![[2.0, -0.5], [-0.5, 1.0]]),
            variants: (0..3).map(|i| VariantKey::new("3", 10 + i, "C", "T")).collect(),
        }
    }

    fn key() -> CacheKey {
        CacheKey {
            reference: "panel".to_string(),
            num_variants: 3,
            num_samples: 2,
            components: 2,
            method: DecompositionMethod::Exact,
            with_cross_product: true,
        }
    }

    #[test]
    fn stored_artifacts_reload_bit_for_bit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirectoryCache::new(dir.path().join("panel"));
        let diag = RecordingDiagnostics::new();
        let original = artifacts();
        cache.store(&key(), &original, &diag).unwrap();
        assert!(cache.path("_XTX.dat").exists());

        match cache.load(&key(), &diag).unwrap() {
            CacheLookup::Hit(loaded) => {
                assert_eq!(loaded.params, original.params);
                assert_eq!(loaded.decomposition.singular_values, original.decomposition.singular_values);
                assert_eq!(loaded.decomposition.right, original.decomposition.right);
                assert_eq!(loaded.decomposition.loadings, original.decomposition.loadings);
                assert_eq!(loaded.cross_product, original.cross_product);
                assert_eq!(loaded.variants, original.variants);
            }
            CacheLookup::Miss(reason) => panic!("expected a hit, got miss: {}", reason),
        }
    }

    #[test]
    fn empty_directory_is_a_silent_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirectoryCache::new(dir.path().join("panel"));
        let diag = RecordingDiagnostics::new();
        assert!(matches!(cache.load(&key(), &diag).unwrap(), CacheLookup::Miss(_)));
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn different_fingerprint_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirectoryCache::new(dir.path().join("panel"));
        let diag = RecordingDiagnostics::new();
        cache.store(&key(), &artifacts(), &diag).unwrap();

        let mut other = key();
        other.components = 1;
        assert!(matches!(cache.load(&other, &diag).unwrap(), CacheLookup::Miss(_)));
        assert!(diag.contains("different parameters"));
    }

    #[test]
    fn missing_or_corrupt_files_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirectoryCache::new(dir.path().join("panel"));
        let diag = RecordingDiagnostics::new();
        cache.store(&key(), &artifacts(), &diag).unwrap();

        fs::write(cache.path("_V.dat"), "0.6 oops\n0.8 0.6\n").unwrap();
        assert!(matches!(cache.load(&key(), &diag).unwrap(), CacheLookup::Miss(_)));
        assert_eq!(diag.warnings().len(), 1);

        fs::remove_file(cache.path("_V.dat")).unwrap();
        assert!(matches!(cache.load(&key(), &diag).unwrap(), CacheLookup::Miss(_)));
        assert_eq!(diag.warnings().len(), 1);
    }

    #[test]
    fn ragged_matrix_text_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.dat");
        fs::write(&path, "1 2 3\n4 5\n").unwrap();
        assert!(matches!(read_matrix(&path), Err(ProjectionError::Artifact { .. })));
    }
}
