use ebmix::data::{Cohort, MeasurementTable};
use ebmix::fit::{
    FitError, KdeFitSettings, fit_all_gmm_models, fit_all_kde_models, fit_all_kde_models_plus,
};
use ebmix::model::MixtureModel;
use ebmix::params::ScalarOrList;
use ebmix::prob_mat::{ProbabilityTensor, get_prob_mat};
use ndarray::{Array2, array};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

fn separated_cohort() -> Cohort {
    let raw = array![[0.0, 0.1], [0.2, 0.3], [10.0, 9.8], [10.3, 10.1]];
    let table = MeasurementTable::from_nan_matrix(raw.view()).unwrap();
    Cohort::from_codes(table, &[0, 0, 1, 1]).unwrap()
}

fn random_cohort(seed: u64, n_per_class: usize, n_biomarkers: usize) -> Cohort {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = 2 * n_per_class;
    let codes: Vec<u32> = (0..n).map(|i| u32::from(i >= n_per_class)).collect();
    let raw = Array2::from_shape_fn((n, n_biomarkers), |(row, _)| {
        let noise: f64 = rng.sample(StandardNormal);
        if rng.gen_range(0.0..1.0) < 0.1 {
            f64::NAN
        } else {
            noise + 2.5 * f64::from(codes[row])
        }
    });
    let table = MeasurementTable::from_nan_matrix(raw.view()).unwrap();
    Cohort::from_codes(table, &codes).unwrap()
}

fn assert_complementary(tensor: &ProbabilityTensor) {
    for p in 0..tensor.n_patients() {
        for b in 0..tensor.n_biomarkers() {
            let (normal, abnormal) = (tensor.normal(p, b), tensor.abnormal(p, b));
            assert!((0.0..=1.0).contains(&normal), "P(normal) out of range at ({p}, {b}): {normal}");
            assert_eq!(normal + abnormal, 1.0, "slots do not sum to one at ({p}, {b})");
        }
    }
}

#[test]
fn clean_separation_gives_confident_probabilities() {
    let cohort = separated_cohort();

    let gmm = fit_all_gmm_models(&cohort).unwrap();
    let kde = fit_all_kde_models(&cohort, &KdeFitSettings::default(), 0.3, None).unwrap();
    for tensor in [
        get_prob_mat(cohort.table(), &gmm).unwrap(),
        get_prob_mat(cohort.table(), &kde).unwrap(),
    ] {
        assert_eq!(tensor.shape(), &[4, 2, 2]);
        assert_complementary(&tensor);
        for b in 0..2 {
            assert!(tensor.abnormal(0, b) < 0.05);
            assert!(tensor.abnormal(1, b) < 0.05);
            assert!(tensor.abnormal(2, b) > 0.95);
            assert!(tensor.abnormal(3, b) > 0.95);
        }
    }
}

#[test]
fn missing_cell_falls_back_to_half() {
    let raw = array![[0.0, 0.1], [0.2, 0.3], [10.0, f64::NAN], [10.3, 10.1]];
    let table = MeasurementTable::from_nan_matrix(raw.view()).unwrap();
    let cohort = Cohort::from_codes(table, &[0, 0, 1, 1]).unwrap();

    let models = fit_all_kde_models(&cohort, &KdeFitSettings::default(), 0.3, None).unwrap();
    let tensor = get_prob_mat(cohort.table(), &models).unwrap();
    assert_eq!(tensor.normal(2, 1), 0.5);
    assert_eq!(tensor.abnormal(2, 1), 0.5);
    assert!(tensor.abnormal(2, 0) > 0.95);
    assert_complementary(&tensor);

    let gmm = fit_all_gmm_models(&cohort).unwrap();
    let tensor = get_prob_mat(cohort.table(), &gmm).unwrap();
    assert_eq!(tensor.normal(2, 1), 0.5);
    assert_eq!(tensor.abnormal(2, 1), 0.5);
}

#[test]
fn excluded_patients_are_evaluated_but_not_fit() {
    let raw = array![[0.0, 0.1], [0.2, 0.3], [10.0, 9.8], [10.3, 10.1], [5.0, 5.0]];
    let table = MeasurementTable::from_nan_matrix(raw.view()).unwrap();
    let with_excluded = Cohort::from_codes(table.clone(), &[0, 0, 1, 1, 2]).unwrap();

    let models = fit_all_gmm_models(&with_excluded).unwrap();
    let tensor = get_prob_mat(with_excluded.table(), &models).unwrap();
    assert_eq!(tensor.n_patients(), 5);
    assert_complementary(&tensor);

    // The excluded row must not influence the fit.
    let reference = fit_all_gmm_models(&separated_cohort()).unwrap();
    let reference_tensor = get_prob_mat(&table, &reference).unwrap();
    assert_eq!(tensor, reference_tensor);
}

#[test]
fn plus_variant_broadcasts_scalar_alpha_to_beta() {
    let cohort = random_cohort(7, 30, 3);
    let alphas = ScalarOrList::Scalar(0.5);
    let models = fit_all_kde_models_plus(&cohort, &KdeFitSettings::default(), Some(&alphas), None).unwrap();
    assert_eq!(models.len(), 3);
    assert_eq!(models.iter().map(|m| m.alpha()).collect::<Vec<_>>(), vec![0.5; 3]);
    assert_eq!(models.iter().map(|m| m.beta()).collect::<Vec<_>>(), vec![0.5; 3]);
}

#[test]
fn repeated_runs_are_identical() {
    let cohort = random_cohort(11, 40, 2);
    let run = || {
        let models = fit_all_kde_models(&cohort, &KdeFitSettings::default(), 0.3, Some(0.2)).unwrap();
        get_prob_mat(cohort.table(), &models).unwrap()
    };
    assert_eq!(run(), run());

    let gmm_run = || get_prob_mat(cohort.table(), &fit_all_gmm_models(&cohort).unwrap()).unwrap();
    assert_eq!(gmm_run(), gmm_run());
}

#[test]
fn random_cohort_probabilities_are_well_formed() {
    let cohort = random_cohort(3, 50, 4);
    let models = fit_all_kde_models(&cohort, &KdeFitSettings::default(), 0.3, None).unwrap();
    assert!(models.iter().all(|m| m.is_fitted()));
    let tensor = get_prob_mat(cohort.table(), &models).unwrap();
    assert_complementary(&tensor);

    for p in 0..tensor.n_patients() {
        for b in 0..tensor.n_biomarkers() {
            if cohort.table().get(p, b).is_none() {
                assert_eq!(tensor.normal(p, b), 0.5);
            }
        }
    }
}

#[test]
fn single_class_cohort_fails_naming_the_biomarker() {
    let raw = array![[0.0], [0.2], [0.4]];
    let table = MeasurementTable::from_nan_matrix(raw.view()).unwrap();
    let cohort = Cohort::from_codes(table, &[0, 0, 2]).unwrap();

    match fit_all_kde_models(&cohort, &KdeFitSettings::default(), 0.3, None) {
        Err(FitError::Model { biomarker, name, .. }) => {
            assert_eq!(biomarker, 0);
            assert_eq!(name, "biomarker_1");
        }
        other => panic!("Expected FitError::Model, got {:?}", other.map(|m| m.len())),
    }
}
