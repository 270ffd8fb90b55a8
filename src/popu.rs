// popu.rs
//
// Population assignment from finished PC coordinates: a k-nearest-neighbour
// vote among the labelled reference individuals.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use crate::diagnostics::Diagnostics;
use crate::error::{ProjectionError, Result};
use crate::samples::SampleId;

pub const DEFAULT_NEIGHBORS: usize = 20;

/// Outcome for one study individual.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationPrediction {
    pub label: String,
    /// Share of the neighbours voting for `label`.
    pub probability: f64,
    /// Distance to the farthest of the neighbours used.
    pub distance: f64,
    /// One share per class, in [`KnnClassifier::classes`] order.
    pub probabilities: Vec<f64>,
}

/// Uniform-weight k-nearest-neighbour classifier over PC coordinates.
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    n_neighbors: usize,
    classes: Vec<String>,
    coordinates: Array2<f64>,
    class_of: Vec<usize>,
}

impl KnnClassifier {
    pub fn fit(coordinates: ArrayView2<f64>, labels: &[String], n_neighbors: usize) -> Result<Self> {
        if coordinates.nrows() != labels.len() {
            return Err(ProjectionError::DimensionMismatch {
                context: "classifier training set (coordinates vs labels)",
                expected: coordinates.nrows(),
                found: labels.len(),
            });
        }
        if labels.is_empty() {
            return Err(ProjectionError::DataIntegrity(
                "no labelled reference individuals to train on".to_string(),
            ));
        }
        if n_neighbors == 0 {
            return Err(ProjectionError::Config("n_neighbors must be at least 1".to_string()));
        }
        let classes: Vec<String> = labels.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        let index: HashMap<&str, usize> = classes.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();
        let class_of = labels.iter().map(|l| index[l.as_str()]).collect();
        Ok(Self {
            n_neighbors: n_neighbors.min(labels.len()),
            classes,
            coordinates: coordinates.to_owned(),
            class_of,
        })
    }

    /// Sorted distinct labels.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn predict(&self, point: ArrayView1<f64>) -> Result<PopulationPrediction> {
        if point.len() != self.coordinates.ncols() {
            return Err(ProjectionError::DimensionMismatch {
                context: "classifier query (PC dimensions)",
                expected: self.coordinates.ncols(),
                found: point.len(),
            });
        }
        let mut distances: Vec<(f64, usize)> = self
            .coordinates
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(i, row)| {
                let d2: f64 = row.iter().zip(point.iter()).map(|(a, b)| (a - b).powi(2)).sum();
                (d2.sqrt(), i)
            })
            .collect();
        distances.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1)));
        let neighbours = &distances[..self.n_neighbors];

        let mut votes = vec![0usize; self.classes.len()];
        for &(_, i) in neighbours {
            votes[self.class_of[i]] += 1;
        }
        // Ties go to the first class in sorted order.
        let mut best = 0;
        for (c, &count) in votes.iter().enumerate() {
            if count > votes[best] {
                best = c;
            }
        }
        let k = self.n_neighbors as f64;
        let probabilities: Vec<f64> = votes.iter().map(|&v| v as f64 / k).collect();
        Ok(PopulationPrediction {
            label: self.classes[best].clone(),
            probability: probabilities[best],
            distance: neighbours.last().map(|n| n.0).unwrap_or(0.0),
            probabilities,
        })
    }
}

/// Reads `FID IID label` rows.
pub fn read_population_labels(path: &Path) -> Result<HashMap<SampleId, String>> {
    let content = fs::read_to_string(path).map_err(|e| ProjectionError::io(path, e))?;
    let mut labels = HashMap::new();
    for (line_num, line) in content.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 3 {
            return Err(ProjectionError::artifact(
                path,
                format!("line {}: expected 'FID IID label'", line_num + 1),
            ));
        }
        labels.insert(SampleId::new(fields[0], fields[1]), fields[2].to_string());
    }
    Ok(labels)
}

/// Predicts a population for every study row and writes `out_path`:
/// `FID IID label proba dist p_1..p_L label_1..label_L`, no header.
#[allow(clippy::too_many_arguments)]
pub fn predict_populations(
    ref_ids: &[SampleId],
    ref_pcs: ArrayView2<f64>,
    ref_labels: &HashMap<SampleId, String>,
    stu_ids: &[SampleId],
    stu_pcs: ArrayView2<f64>,
    n_neighbors: usize,
    out_path: &Path,
    diag: &dyn Diagnostics,
) -> Result<Vec<PopulationPrediction>> {
    let labelled: Vec<usize> = (0..ref_ids.len())
        .filter(|&i| ref_labels.contains_key(&ref_ids[i]))
        .collect();
    if labelled.len() < ref_ids.len() {
        diag.warn(&format!(
            "Only {} / {} reference individuals have a population label.",
            labelled.len(),
            ref_ids.len()
        ));
    }
    let labels: Vec<String> = labelled
        .iter()
        .filter_map(|&i| ref_labels.get(&ref_ids[i]).cloned())
        .collect();
    let train = ref_pcs.select(Axis(0), &labelled);
    let knn = KnnClassifier::fit(train.view(), &labels, n_neighbors)?;

    let predictions: Vec<PopulationPrediction> = (0..stu_pcs.nrows())
        .into_par_iter()
        .map(|i| knn.predict(stu_pcs.row(i)))
        .collect::<Result<_>>()?;

    let file = File::create(out_path).map_err(|e| ProjectionError::io(out_path, e))?;
    let mut writer = BufWriter::new(file);
    let io_err = |e: std::io::Error| ProjectionError::io(out_path, e);
    for (id, pred) in stu_ids.iter().zip(predictions.iter()) {
        write!(
            writer,
            "{}\t{}\t{}\t{}\t{:.3}",
            id.fid, id.iid, pred.label, pred.probability, pred.distance
        )
        .map_err(io_err)?;
        for p in &pred.probabilities {
            write!(writer, "\t{}", p).map_err(io_err)?;
        }
        for class in knn.classes() {
            write!(writer, "\t{}", class).map_err(io_err)?;
        }
        writeln!(writer).map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;
    diag.info(&format!("Predicted study populations saved to {}", out_path.display()));
    Ok(predictions)
}
