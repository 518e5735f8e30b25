//! Outlier channel detection on noise-like spectra.

use faraday_core::dataset::Dataset;
use faraday_core::flagger::{FlagStrategy, Flagger};
use num_complex::Complex64;
use rand::prelude::*;
use rand_distr::StandardNormal;

fn noisy_dataset(rng: &mut StdRng, n: usize, outliers: &[(usize, f64)]) -> Dataset {
    let nu: Vec<f64> = (0..n).map(|i| 0.8e9 + i as f64 * 1.0e7).collect();
    let mut data: Vec<Complex64> = (0..n)
        .map(|_| {
            let q: f64 = rng.sample(StandardNormal);
            let u: f64 = rng.sample(StandardNormal);
            Complex64::new(q, u)
        })
        .collect();
    for &(i, amp) in outliers {
        data[i] += Complex64::new(amp, amp);
    }
    Dataset::with_uniform_noise(nu, 1.0, Some(data), None).unwrap()
}

#[test]
fn test_median_flagger_finds_injected_outliers() {
    let mut rng = StdRng::seed_from_u64(42);
    let bad = [3, 17, 40, 41, 88];
    let outliers: Vec<(usize, f64)> = bad.iter().map(|&i| (i, 10.0)).collect();
    let ds = noisy_dataset(&mut rng, 100, &outliers);

    let outcome = Flagger::default().run(&ds).unwrap();
    eprintln!("removed channels: {:?}", outcome.removed);
    assert_eq!(outcome.kept.len(), 95);
    assert_eq!(outcome.removed, bad.to_vec());
    // Flagged channels stay in place with zero weight.
    assert_eq!(outcome.dataset.len(), 100);
    for &i in &bad {
        assert_eq!(outcome.dataset.w()[i], 0.0);
    }
    assert_eq!(outcome.dataset.active_channels(), outcome.kept);
}

#[test]
fn test_deleting_flagged_channels_shrinks_dataset() {
    let mut rng = StdRng::seed_from_u64(9);
    let ds = noisy_dataset(&mut rng, 60, &[(10, 12.0), (30, -12.0)]);
    let outcome = Flagger::new(5.0, true).run(&ds).unwrap();
    assert_eq!(outcome.removed, vec![10, 30]);
    assert_eq!(outcome.dataset.len(), 58);
    assert_eq!(outcome.dataset.nu()[10], ds.nu()[11]);
}

#[test]
fn test_mean_strategy_catches_a_gross_outlier() {
    let mut rng = StdRng::seed_from_u64(1);
    let ds = noisy_dataset(&mut rng, 100, &[(50, 1000.0)]);
    let outcome = Flagger::default().with_strategy(FlagStrategy::Mean).run(&ds).unwrap();
    assert_eq!(outcome.removed, vec![50]);
}

#[test]
fn test_clean_data_keeps_every_channel() {
    let mut rng = StdRng::seed_from_u64(77);
    let ds = noisy_dataset(&mut rng, 100, &[]);
    let outcome = Flagger::new(8.0, false).run(&ds).unwrap();
    assert!(outcome.removed.is_empty());
}
