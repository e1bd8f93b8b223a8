//! Assembly of the patient × biomarker × {normal, abnormal} probability tensor.

use crate::data::MeasurementTable;
use crate::model::{MixtureError, MixtureModel};
use ndarray::{Array1, Array3, Axis};
use std::ops::Deref;
use thiserror::Error;

/// Probability assigned to each class when a measurement is missing.
pub const MISSING_PROBABILITY: f64 = 0.5;

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("Got {models} fitted models for a table with {biomarkers} biomarkers.")]
    ModelCountMismatch { models: usize, biomarkers: usize },
    #[error("Failed to evaluate the mixture model for biomarker {biomarker}: {source}")]
    Model {
        biomarker: usize,
        #[source]
        source: MixtureError,
    },
}

/// Shape `(patients, biomarkers, 2)`; slot 0 is P(normal), slot 1 is P(abnormal).
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityTensor(pub Array3<f64>);

impl Deref for ProbabilityTensor {
    type Target = Array3<f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ProbabilityTensor {
    pub fn n_patients(&self) -> usize {
        self.0.shape()[0]
    }

    pub fn n_biomarkers(&self) -> usize {
        self.0.shape()[1]
    }

    pub fn normal(&self, patient: usize, biomarker: usize) -> f64 {
        self.0[[patient, biomarker, 0]]
    }

    pub fn abnormal(&self, patient: usize, biomarker: usize) -> f64 {
        self.0[[patient, biomarker, 1]]
    }
}

/// Evaluates every biomarker's model on all patients, whatever their diagnosis.
///
/// Present values get the model's P(normal) in slot 0; missing values get 0.5.
/// Slot 1 is always computed as `1 - slot 0`.
pub fn get_prob_mat<M: MixtureModel>(
    table: &MeasurementTable,
    models: &[M],
) -> Result<ProbabilityTensor, AssemblyError> {
    if models.len() != table.n_biomarkers() {
        return Err(AssemblyError::ModelCountMismatch {
            models: models.len(),
            biomarkers: table.n_biomarkers(),
        });
    }

    let mut probs = Array3::<f64>::zeros((table.n_patients(), table.n_biomarkers(), 2));
    for (biomarker, model) in models.iter().enumerate() {
        let column = table.column(biomarker);
        let (rows, values): (Vec<usize>, Vec<f64>) = column
            .iter()
            .enumerate()
            .filter_map(|(row, cell)| cell.map(|v| (row, v)))
            .unzip();

        let normal = model
            .probability_normal(Array1::from_vec(values).view())
            .map_err(|source| AssemblyError::Model { biomarker, source })?;

        probs
            .index_axis_mut(Axis(1), biomarker)
            .column_mut(0)
            .fill(MISSING_PROBABILITY);
        for (&row, &p) in rows.iter().zip(normal.iter()) {
            probs[[row, biomarker, 0]] = p;
        }
        log::debug!(
            "Biomarker {}: {} present, {} missing.",
            biomarker,
            rows.len(),
            table.n_patients() - rows.len()
        );
    }

    let normal = probs.index_axis(Axis(2), 0).to_owned();
    probs.index_axis_mut(Axis(2), 1).assign(&normal.mapv(|p| 1.0 - p));
    Ok(ProbabilityTensor(probs))
}
