use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ebmix::data::{Cohort, MeasurementTable};
use ebmix::fit::{KdeFitSettings, fit_all_gmm_models, fit_all_kde_models};
use ebmix::prob_mat::get_prob_mat;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

fn random_cohort(n_patients: usize, n_biomarkers: usize) -> Cohort {
    let mut rng = StdRng::seed_from_u64(0x5EED_EB + n_patients as u64);
    let codes: Vec<u32> = (0..n_patients).map(|i| (i % 3) as u32).collect();
    let raw = Array2::from_shape_fn((n_patients, n_biomarkers), |(row, _)| {
        let noise: f64 = rng.sample(StandardNormal);
        noise + 2.0 * f64::from(codes[row])
    });
    let table = MeasurementTable::from_nan_matrix(raw.view()).expect("finite values");
    Cohort::from_codes(table, &codes).expect("one code per row")
}

fn benchmark_fit(c: &mut Criterion) {
    let sizes = [100_usize, 300, 1000];
    let cohorts: Vec<_> = sizes.iter().map(|&n| (n, random_cohort(n, 4))).collect();

    let mut group = c.benchmark_group("fit_and_assemble");
    group.sample_size(10);
    for (size, cohort) in cohorts.iter() {
        group.throughput(Throughput::Elements((*size * cohort.n_biomarkers()) as u64));

        group.bench_with_input(BenchmarkId::new("gmm", size), cohort, |b, input| {
            b.iter(|| {
                let models = fit_all_gmm_models(black_box(input)).expect("gmm fit");
                black_box(get_prob_mat(input.table(), &models).expect("assembly"));
            });
        });

        group.bench_with_input(BenchmarkId::new("kde", size), cohort, |b, input| {
            b.iter(|| {
                let models = fit_all_kde_models(black_box(input), &KdeFitSettings::default(), 0.3, None)
                    .expect("kde fit");
                black_box(get_prob_mat(input.table(), &models).expect("assembly"));
            });
        });
    }
    group.finish();
}

criterion_group!(fit_benchmark, benchmark_fit);
criterion_main!(fit_benchmark);
