//! Long-format TSV output of the probability tensor.
//!
//! One row per patient and biomarker:
//! `sample_id  biomarker  p_normal  p_abnormal`.

use crate::prob_mat::ProbabilityTensor;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to write TSV output: {0}")]
    Csv(#[from] csv::Error),
    #[error("Tensor shape {patients} × {biomarkers} does not match {ids} sample ids and {names} biomarker names.")]
    ShapeMismatch {
        patients: usize,
        biomarkers: usize,
        ids: usize,
        names: usize,
    },
}

#[derive(Serialize)]
struct ProbabilityRow<'a> {
    sample_id: &'a str,
    biomarker: &'a str,
    p_normal: f64,
    p_abnormal: f64,
}

/// Writes `tensor` to `writer` as a tab-separated table with a header row.
pub fn write_prob_mat<W: Write>(
    writer: W,
    tensor: &ProbabilityTensor,
    sample_ids: &[String],
    biomarkers: &[String],
) -> Result<(), OutputError> {
    if tensor.n_patients() != sample_ids.len() || tensor.n_biomarkers() != biomarkers.len() {
        return Err(OutputError::ShapeMismatch {
            patients: tensor.n_patients(),
            biomarkers: tensor.n_biomarkers(),
            ids: sample_ids.len(),
            names: biomarkers.len(),
        });
    }

    let mut tsv = csv::WriterBuilder::new().delimiter(b'\t').from_writer(writer);
    for (patient, sample_id) in sample_ids.iter().enumerate() {
        for (biomarker, name) in biomarkers.iter().enumerate() {
            tsv.serialize(ProbabilityRow {
                sample_id,
                biomarker: name,
                p_normal: tensor.normal(patient, biomarker),
                p_abnormal: tensor.abnormal(patient, biomarker),
            })?;
        }
    }
    tsv.flush()?;
    Ok(())
}

/// Creates (or truncates) `path` and writes the tensor to it.
pub fn write_prob_mat_tsv(
    path: &Path,
    tensor: &ProbabilityTensor,
    sample_ids: &[String],
    biomarkers: &[String],
) -> Result<(), OutputError> {
    let file = File::create(path)?;
    write_prob_mat(file, tensor, sample_ids, biomarkers)?;
    log::info!(
        "Wrote {} probabilities to {}",
        tensor.n_patients() * tensor.n_biomarkers(),
        path.display()
    );
    Ok(())
}
