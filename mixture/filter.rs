//! Training-set selection.
//!
//! Only patients labelled control or diseased take part in fitting. Each
//! biomarker is then trained on the subset of those patients that actually have
//! a measurement for it. Both filters are stable: original row order is kept and
//! every value stays paired with its own patient's label.

use crate::data::{Class, Cohort, Diagnosis};
use ndarray::Array1;

/// The rows of a cohort that carry a trainable label.
#[derive(Debug, Clone)]
pub struct TrainingSet<'a> {
    cohort: &'a Cohort,
    rows: Vec<usize>,
    classes: Vec<Class>,
}

/// One biomarker's present, two-class training measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct BiomarkerSamples {
    pub values: Array1<f64>,
    pub classes: Vec<Class>,
}

impl BiomarkerSamples {
    pub fn new(values: Array1<f64>, classes: Vec<Class>) -> Self {
        debug_assert_eq!(values.len(), classes.len());
        Self { values, classes }
    }

    /// Builds samples from raw values and diagnosis codes. Values whose code is
    /// excluded from training (`>= 2`) are dropped.
    pub fn from_codes(values: &[f64], codes: &[u32]) -> Self {
        debug_assert_eq!(values.len(), codes.len());
        let (values, classes): (Vec<f64>, Vec<Class>) = values
            .iter()
            .zip(codes)
            .filter_map(|(&v, &code)| Diagnosis::from_code(code).class().map(|class| (v, class)))
            .unzip();
        Self::new(Array1::from_vec(values), classes)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values of one class, in sample order.
    pub fn class_values(&self, class: Class) -> Vec<f64> {
        self.values
            .iter()
            .zip(&self.classes)
            .filter(|(_, c)| **c == class)
            .map(|(v, _)| *v)
            .collect()
    }

    pub fn count(&self, class: Class) -> usize {
        self.classes.iter().filter(|c| **c == class).count()
    }
}

/// Selects the control and diseased rows of `cohort`, in original order.
pub fn training_subset(cohort: &Cohort) -> TrainingSet<'_> {
    let mut rows = Vec::with_capacity(cohort.n_patients());
    let mut classes = Vec::with_capacity(cohort.n_patients());
    for (row, diagnosis) in cohort.diagnoses().iter().enumerate() {
        if let Some(class) = diagnosis.class() {
            rows.push(row);
            classes.push(class);
        }
    }
    TrainingSet {
        cohort,
        rows,
        classes,
    }
}

impl TrainingSet<'_> {
    /// Indices into the original cohort of the selected rows.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Training rows of one biomarker whose measurement is present.
    pub fn biomarker_samples(&self, biomarker: usize) -> BiomarkerSamples {
        let column = self.cohort.table().column(biomarker);
        let mut values = Vec::with_capacity(self.rows.len());
        let mut classes = Vec::with_capacity(self.rows.len());
        for (&row, &class) in self.rows.iter().zip(&self.classes) {
            if let Some(value) = column[row] {
                values.push(value);
                classes.push(class);
            }
        }
        BiomarkerSamples::new(Array1::from_vec(values), classes)
    }

    /// The selected rows as a standalone cohort.
    pub fn to_cohort(&self) -> Cohort {
        self.cohort.select_rows(&self.rows)
    }
}
