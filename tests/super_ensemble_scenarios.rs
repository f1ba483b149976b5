use approx::assert_abs_diff_eq;
use ndarray::{Array2, Axis, array};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use superloc::boosting::BoostingParams;
use superloc::kernel::{KernelRidgeParams, KernelSpec};
use superloc::localize::{DEFAULT_EPSILON, calculate_localization, crosscov, variance};
use superloc::{RegressorConfig, run_pipeline, super_ensemble_localization};

fn normal_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).expect("valid normal");
    Array2::from_shape_fn((rows, cols), |_| normal.sample(&mut rng))
}

#[test]
fn linear_surrogate_reproduces_linear_relation_on_super_ensemble() {
    let x_train = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
    let y_train = x_train.map_axis(Axis(1), |row| 2.0 * row[0] - 3.0 * row[1] + 1.0);
    let y_train = y_train.insert_axis(Axis(1));
    assert_eq!(y_train, array![[1.0], [3.0], [-2.0]]);

    let x_super = normal_matrix(1000, 2, 17);
    let config = RegressorConfig::KernelRidge(KernelRidgeParams {
        kernel: KernelSpec::Linear,
        alpha: 1e-10,
    });
    let output = run_pipeline(x_train.view(), y_train.view(), x_super.view(), &config)
        .expect("pipeline runs");

    assert_eq!(output.y_super.dim(), (1000, 1));
    for (row, predicted) in x_super.rows().into_iter().zip(output.y_super.iter()) {
        let expected = 2.0 * row[0] - 3.0 * row[1] + 1.0;
        assert_abs_diff_eq!(*predicted, expected, epsilon = 1e-6);
    }

    let r = super_ensemble_localization(
        x_train.view(),
        x_super.view(),
        output.y_super.view(),
        DEFAULT_EPSILON,
    )
    .expect("localization runs");
    assert_eq!(r.dim(), (2, 1));
    assert!(r.iter().all(|w| w.is_finite() && (0.0..=1.0).contains(w)));
}

#[test]
fn independent_parameter_gets_zero_weight() {
    // samples as rows; the observation copies the second parameter
    let x_super = array![
        [1.0, 1.0],
        [-1.0, 1.0],
        [1.0, -1.0],
        [-1.0, -1.0]
    ];
    let y_super = array![[1.0], [1.0], [-1.0], [-1.0]];
    let x_train = Array2::<f64>::zeros((10, 2));

    let r = super_ensemble_localization(
        x_train.view(),
        x_super.view(),
        y_super.view(),
        DEFAULT_EPSILON,
    )
    .expect("localization runs");
    assert_eq!(r[[0, 0]], 0.0);
    // perfect correlation: c² = var_m var_d, so R = 1 / (1 + 2 / Ne)
    assert_abs_diff_eq!(r[[1, 0]], 1.0 / 1.2, epsilon = 1e-12);
}

fn correlated_ensemble() -> (Array2<f64>, Array2<f64>) {
    let x = normal_matrix(500, 3, 5);
    let noise = normal_matrix(500, 2, 6);
    let mut y = Array2::zeros((500, 2));
    for i in 0..500 {
        y[[i, 0]] = 2.0 * x[[i, 0]] + 0.1 * noise[[i, 0]];
        y[[i, 1]] = -x[[i, 1]] + x[[i, 2]] + 0.1 * noise[[i, 1]];
    }
    (x, y)
}

#[test]
fn ensemble_size_controls_damping() {
    let (x, y) = correlated_ensemble();
    let (m, d) = (x.t(), y.t());

    let damped = calculate_localization(&m, &d, 1, DEFAULT_EPSILON).expect("Ne = 1");
    assert!(damped.iter().all(|&w| (0.0..=0.5 + 1e-12).contains(&w)));

    let sharp = calculate_localization(&m, &d, 1_000_000_000, DEFAULT_EPSILON).expect("large Ne");
    for (i, j) in [(0, 0), (1, 1), (2, 1)] {
        assert!(sharp[[i, j]] > 0.999, "R[{i}, {j}] = {}", sharp[[i, j]]);
        assert!(damped[[i, j]] < sharp[[i, j]]);
    }
}

#[test]
fn covariance_laws_hold_on_random_ensembles() {
    let m = normal_matrix(4, 200, 9);
    let d = normal_matrix(3, 200, 10);

    let cmd = crosscov(&m, &d).expect("crosscov");
    let cdm = crosscov(&d, &m).expect("crosscov");
    assert_eq!(cmd.dim(), (4, 3));
    for (a, b) in cmd.iter().zip(cdm.t().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }

    let cmm = crosscov(&m, &m).expect("crosscov");
    let var = variance(&m).expect("variance");
    let d_var = variance(&d).expect("variance");
    for i in 0..4 {
        assert_abs_diff_eq!(cmm[[i, i]], var[[i, 0]], epsilon = 1e-12);
    }

    let r = calculate_localization(&m, &d, 50, DEFAULT_EPSILON).expect("localization");
    for ((i, j), &w) in r.indexed_iter() {
        assert!((0.0..=1.0).contains(&w));
        let threshold = DEFAULT_EPSILON * (var[[i, 0]] * d_var[[j, 0]]).sqrt();
        if cmd[[i, j]].abs() < threshold {
            assert_eq!(w, 0.0);
        }
    }
}

#[test]
fn boosted_surrogate_runs_end_to_end() {
    let mut rng = StdRng::seed_from_u64(23);
    let x_train = Array2::from_shape_fn((60, 3), |_| rng.gen_range(-1.0..1.0));
    let y_train = Array2::from_shape_fn((60, 2), |(i, j)| match j {
        0 => 3.0 * x_train[[i, 0]],
        _ => x_train[[i, 1]] * x_train[[i, 1]],
    });
    let x_super = Array2::from_shape_fn((2000, 3), |_| rng.gen_range(-1.0..1.0));

    let config = RegressorConfig::GradientBoosting(BoostingParams::default());
    let output = run_pipeline(x_train.view(), y_train.view(), x_super.view(), &config)
        .expect("pipeline runs");
    assert_eq!(output.y_super.dim(), (2000, 2));
    assert!(output.y_super.iter().all(|v| v.is_finite()));
    assert!(output.surrogate.training_rmse() < 0.5);

    let r = super_ensemble_localization(
        x_train.view(),
        x_super.view(),
        output.y_super.view(),
        DEFAULT_EPSILON,
    )
    .expect("localization runs");
    assert_eq!(r.dim(), (3, 2));
    assert!(r.iter().all(|w| (0.0..=1.0).contains(w)));
    assert!(r[[0, 0]] > 0.5, "R[0, 0] = {}", r[[0, 0]]);
}

#[test]
fn mean_only_boosted_surrogate_gives_zero_localization() {
    // ten members cannot fill two leaves of twenty, so every prediction is the mean
    let mut rng = StdRng::seed_from_u64(41);
    let x_train = Array2::from_shape_fn((10, 2), |_| rng.gen_range(-1.0..1.0));
    let y_train = Array2::from_shape_fn((10, 2), |(i, j)| {
        0.1 * x_train[[i, j]] + 0.3 * x_train[[i, 1 - j]]
    });
    let x_super = Array2::from_shape_fn((1000, 2), |_| rng.gen_range(-1.0..1.0));

    let output = run_pipeline(
        x_train.view(),
        y_train.view(),
        x_super.view(),
        &RegressorConfig::default(),
    )
    .expect("pipeline runs");
    for column in output.y_super.columns() {
        assert!(column.iter().all(|&v| v == column[0]));
    }

    let r = super_ensemble_localization(
        x_train.view(),
        x_super.view(),
        output.y_super.view(),
        DEFAULT_EPSILON,
    )
    .expect("localization runs");
    assert_eq!(r.dim(), (2, 2));
    assert!(r.iter().all(|&w| w == 0.0), "{r}");
}
