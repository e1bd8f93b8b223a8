//! # Cohort Data Model and Loading
//!
//! This module owns the patient × biomarker measurement table and the diagnosis
//! labels that travel with it. It is also the single entry point for user-provided
//! cohort files.
//!
//! - Explicit Missingness: every cell is an `Option<f64>`. A missing measurement is
//!   `None`, never a numeric sentinel, so downstream code filters on presence and
//!   cannot accidentally do arithmetic on a placeholder.
//! - Strict Schema: the cohort TSV must carry a `diagnosis` column. An optional
//!   `sample_id` column names the rows; every other column is a biomarker.
//! - User-Centric Errors: failures are assumed to be user-input errors and are
//!   reported through `DataError` with the offending column and row.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Name of the required label column in a cohort TSV.
pub const DIAGNOSIS_COLUMN: &str = "diagnosis";
/// Name of the optional row-identifier column in a cohort TSV.
pub const SAMPLE_ID_COLUMN: &str = "sample_id";

/// Cell tokens (compared case-insensitively) that denote a missing measurement.
const MISSING_TOKENS: [&str; 5] = ["", "na", "nan", "null", "none"];

/// A comprehensive error type for all cohort construction and loading failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "Column '{column_name}' contains the non-numeric value '{value}' at data row {row}. Use an empty cell or NA for missing measurements."
    )]
    ColumnWrongType {
        column_name: String,
        row: usize,
        value: String,
    },
    #[error("The input file does not contain any biomarker columns.")]
    NoBiomarkers,
    #[error("The input file does not contain any data rows.")]
    EmptyCohort,
    #[error("Missing diagnosis label at data row {0}. Every patient needs a diagnosis code.")]
    MissingDiagnosis(usize),
    #[error(
        "Invalid diagnosis label {value} at data row {row}. Diagnosis codes must be non-negative integers."
    )]
    InvalidDiagnosis { row: usize, value: f64 },
    #[error(
        "Non-finite measurement for biomarker '{biomarker}' at row {row}. Missing values must be left empty, not encoded as infinity."
    )]
    NonFiniteValue { biomarker: String, row: usize },
    #[error("{names} biomarker names were given for a table with {columns} columns.")]
    BiomarkerCountMismatch { names: usize, columns: usize },
    #[error("The table has {rows} patient rows but {labels} diagnosis labels were supplied.")]
    LabelCountMismatch { rows: usize, labels: usize },
}

/// Diagnostic class of one patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Diagnosis {
    /// Code `0`, a cognitively normal control.
    Control,
    /// Code `1`, a patient with the disease.
    Diseased,
    /// Any code `>= 2` (e.g. undetermined). Never used for fitting.
    Excluded(u32),
}

impl Diagnosis {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Diagnosis::Control,
            1 => Diagnosis::Diseased,
            other => Diagnosis::Excluded(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Diagnosis::Control => 0,
            Diagnosis::Diseased => 1,
            Diagnosis::Excluded(code) => code,
        }
    }

    /// The training class of this label, or `None` for an excluded label.
    pub fn class(self) -> Option<Class> {
        match self {
            Diagnosis::Control => Some(Class::Control),
            Diagnosis::Diseased => Some(Class::Diseased),
            Diagnosis::Excluded(_) => None,
        }
    }
}

/// The two classes a mixture model is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Class {
    Control,
    Diseased,
}

impl std::fmt::Display for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Class::Control => write!(f, "control"),
            Class::Diseased => write!(f, "diseased"),
        }
    }
}

/// Dense patients × biomarkers table with explicitly optional cells.
///
/// Every present value is finite. The table is never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementTable {
    biomarkers: Vec<String>,
    values: Array2<Option<f64>>,
}

impl MeasurementTable {
    /// Builds a table from named columns, rejecting non-finite present values.
    pub fn new(biomarkers: Vec<String>, values: Array2<Option<f64>>) -> Result<Self, DataError> {
        if biomarkers.len() != values.ncols() {
            return Err(DataError::BiomarkerCountMismatch {
                names: biomarkers.len(),
                columns: values.ncols(),
            });
        }
        for ((row, col), cell) in values.indexed_iter() {
            if let Some(v) = cell {
                if !v.is_finite() {
                    return Err(DataError::NonFiniteValue {
                        biomarker: biomarkers[col].clone(),
                        row,
                    });
                }
            }
        }
        Ok(Self { biomarkers, values })
    }

    /// Builds a table from a raw matrix where NaN marks a missing measurement.
    ///
    /// Columns are named `biomarker_1`, `biomarker_2`, ... in column order.
    pub fn from_nan_matrix(raw: ArrayView2<f64>) -> Result<Self, DataError> {
        let names = (1..=raw.ncols()).map(|i| format!("biomarker_{i}")).collect();
        let values = raw.mapv(|v| if v.is_nan() { None } else { Some(v) });
        Self::new(names, values)
    }

    pub fn n_patients(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_biomarkers(&self) -> usize {
        self.values.ncols()
    }

    pub fn biomarkers(&self) -> &[String] {
        &self.biomarkers
    }

    pub fn biomarker_name(&self, biomarker: usize) -> &str {
        &self.biomarkers[biomarker]
    }

    pub fn values(&self) -> ArrayView2<'_, Option<f64>> {
        self.values.view()
    }

    /// All cells of one biomarker, in patient order.
    pub fn column(&self, biomarker: usize) -> ArrayView1<'_, Option<f64>> {
        self.values.column(biomarker)
    }

    pub fn get(&self, patient: usize, biomarker: usize) -> Option<f64> {
        self.values[[patient, biomarker]]
    }

    /// A new table containing only `rows`, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            biomarkers: self.biomarkers.clone(),
            values: self.values.select(Axis(0), rows),
        }
    }
}

/// A measurement table together with one diagnosis per patient row.
#[derive(Debug, Clone, PartialEq)]
pub struct Cohort {
    table: MeasurementTable,
    diagnoses: Vec<Diagnosis>,
}

impl Cohort {
    pub fn new(table: MeasurementTable, diagnoses: Vec<Diagnosis>) -> Result<Self, DataError> {
        if table.n_patients() != diagnoses.len() {
            return Err(DataError::LabelCountMismatch {
                rows: table.n_patients(),
                labels: diagnoses.len(),
            });
        }
        Ok(Self { table, diagnoses })
    }

    /// Convenience constructor from integer diagnosis codes.
    pub fn from_codes(table: MeasurementTable, codes: &[u32]) -> Result<Self, DataError> {
        Self::new(table, codes.iter().map(|&c| Diagnosis::from_code(c)).collect())
    }

    pub fn table(&self) -> &MeasurementTable {
        &self.table
    }

    pub fn diagnoses(&self) -> &[Diagnosis] {
        &self.diagnoses
    }

    pub fn n_patients(&self) -> usize {
        self.table.n_patients()
    }

    pub fn n_biomarkers(&self) -> usize {
        self.table.n_biomarkers()
    }

    /// A new cohort containing only `rows`, labels kept aligned.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            table: self.table.select_rows(rows),
            diagnoses: rows.iter().map(|&row| self.diagnoses[row]).collect(),
        }
    }
}

/// A cohort read from disk together with its row identifiers.
#[derive(Debug)]
pub struct LoadedCohort {
    /// From the `sample_id` column if present, otherwise 1-based row numbers.
    pub sample_ids: Vec<String>,
    pub cohort: Cohort,
}

/// Loads a tab-separated cohort file.
pub fn load_cohort(path: &Path) -> Result<LoadedCohort, DataError> {
    internal::load_cohort(path)
}

/// Internal module for the loading logic.
mod internal {
    use super::*;

    pub(super) fn load_cohort(path: &Path) -> Result<LoadedCohort, DataError> {
        log::info!("Loading cohort from '{}'", path.display());

        let df = CsvReader::new(File::open(path)?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_infer_schema_length(None)
                    .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
            )
            .finish()?;

        let n_rows = df.height();
        if n_rows == 0 {
            return Err(DataError::EmptyCohort);
        }

        let column_names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        if !column_names.iter().any(|c| c == DIAGNOSIS_COLUMN) {
            return Err(DataError::ColumnNotFound(DIAGNOSIS_COLUMN.to_string()));
        }

        let biomarkers: Vec<String> = column_names
            .iter()
            .filter(|c| c.as_str() != DIAGNOSIS_COLUMN && c.as_str() != SAMPLE_ID_COLUMN)
            .cloned()
            .collect();
        if biomarkers.is_empty() {
            return Err(DataError::NoBiomarkers);
        }

        // --- Diagnosis labels ---
        let raw_labels = extract_optional_column(&df, DIAGNOSIS_COLUMN)?;
        let mut diagnoses = Vec::with_capacity(n_rows);
        for (row, value) in raw_labels.into_iter().enumerate() {
            let value = value.ok_or(DataError::MissingDiagnosis(row + 1))?;
            if value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
                return Err(DataError::InvalidDiagnosis {
                    row: row + 1,
                    value,
                });
            }
            diagnoses.push(Diagnosis::from_code(value as u32));
        }

        // --- Biomarker measurements ---
        let mut values = Array2::from_elem((n_rows, biomarkers.len()), None);
        for (col, name) in biomarkers.iter().enumerate() {
            let column = extract_optional_column(&df, name)?;
            for (row, cell) in column.into_iter().enumerate() {
                values[[row, col]] = cell;
            }
        }

        let sample_ids = build_sample_ids(&df, &column_names, n_rows)?;
        let table = MeasurementTable::new(biomarkers, values)?;
        let cohort = Cohort::new(table, diagnoses)?;

        let n_missing = cohort.table().values().iter().filter(|c| c.is_none()).count();
        log::info!(
            "Loaded {} patients x {} biomarkers ({} missing measurements).",
            cohort.n_patients(),
            cohort.n_biomarkers(),
            n_missing
        );

        Ok(LoadedCohort { sample_ids, cohort })
    }

    /// Reads one column as optional finite-or-missing numbers.
    ///
    /// String columns are parsed cell by cell so that tokens such as `NA` become
    /// `None` while genuinely non-numeric text is reported. NaN becomes `None`.
    fn extract_optional_column(
        df: &DataFrame,
        column_name: &str,
    ) -> Result<Vec<Option<f64>>, DataError> {
        let column = df.column(column_name)?;
        let values = match column.dtype() {
            DataType::String => {
                let mut out = Vec::with_capacity(column.len());
                for (row, cell) in column.str()?.into_iter().enumerate() {
                    out.push(parse_cell(column_name, row, cell)?);
                }
                out
            }
            _ => {
                let casted = column.cast(&DataType::Float64)?;
                casted.f64()?.into_iter().collect()
            }
        };
        Ok(values
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect())
    }

    fn parse_cell(
        column_name: &str,
        row: usize,
        cell: Option<&str>,
    ) -> Result<Option<f64>, DataError> {
        let Some(text) = cell else {
            return Ok(None);
        };
        let trimmed = text.trim();
        if MISSING_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
        {
            return Ok(None);
        }
        trimmed
            .parse::<f64>()
            .map(Some)
            .map_err(|_| DataError::ColumnWrongType {
                column_name: column_name.to_string(),
                row: row + 1,
                value: trimmed.to_string(),
            })
    }

    fn build_sample_ids(
        df: &DataFrame,
        column_names: &[String],
        n: usize,
    ) -> Result<Vec<String>, DataError> {
        if !column_names.iter().any(|c| c == SAMPLE_ID_COLUMN) {
            return Ok((1..=n).map(|i| i.to_string()).collect());
        }
        let casted = df.column(SAMPLE_ID_COLUMN)?.cast(&DataType::String)?;
        let ids = casted
            .str()?
            .into_iter()
            .enumerate()
            .map(|(i, value)| match value {
                Some(text) if !text.trim().is_empty() => text.trim().to_string(),
                _ => (i + 1).to_string(),
            })
            .collect();
        Ok(ids)
    }
}
