//! Property-based tests over randomly sized inputs.

use approx::abs_diff_eq;
use ndarray::Array2;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use genomic_projection::decompose::decompose_reference;
use genomic_projection::variants::compare_variants;
use genomic_projection::{
    procrustes, procrustes_diffdim, standardize, DecompositionMethod, ProcrustesOptions, RecordingDiagnostics,
    VariantKey, VariantMatch, MISSING_GENOTYPE,
};

fn gaussian(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.sample::<f64, _>(StandardNormal))
}

fn dosages(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.random_range(0..3) as f64)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_singular_values_sorted_and_non_negative(
        variants in 5usize..60,
        individuals in 2usize..20,
        seed in 0u64..1000,
    ) {
        let diag = RecordingDiagnostics::new();
        let mut x = dosages(variants, individuals, seed);
        standardize(&mut x, None, MISSING_GENOTYPE, &diag).unwrap();
        let (decomposition, _) =
            decompose_reference(x.view(), individuals, DecompositionMethod::Exact, &diag).unwrap();
        let s = decomposition.singular_values.to_vec();
        prop_assert!(s.iter().all(|&v| v >= 0.0));
        prop_assert!(s.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn prop_standardization_round_trips(
        variants in 1usize..30,
        individuals in 2usize..15,
        seed in 0u64..1000,
    ) {
        let diag = RecordingDiagnostics::new();
        let original = dosages(variants, individuals, seed);
        let mut x = original.clone();
        let params = standardize(&mut x, None, MISSING_GENOTYPE, &diag).unwrap();
        let restored = params.restore(x.view()).unwrap();
        for (a, b) in restored.iter().zip(original.iter()) {
            prop_assert!(abs_diff_eq!(a, b, epsilon = 1e-10));
        }
    }

    #[test]
    fn prop_self_alignment_is_identity(
        n in 3usize..25,
        d in 1usize..5,
        seed in 0u64..1000,
    ) {
        let x = gaussian(n, d, seed);
        let t = procrustes(x.view(), x.view()).unwrap();
        prop_assert!(abs_diff_eq!(t.scale, 1.0, epsilon = 1e-9));
        let aligned = t.apply(x.view());
        for (a, b) in aligned.iter().zip(x.iter()) {
            prop_assert!(abs_diff_eq!(a, b, epsilon = 1e-9));
        }
    }

    #[test]
    fn prop_equal_dimension_iteration_matches_closed_form(
        n in 3usize..25,
        d in 1usize..5,
        seed in 0u64..1000,
    ) {
        let diag = RecordingDiagnostics::new();
        let y = gaussian(n, d, seed);
        let x = gaussian(n, d, seed + 1);
        let closed = procrustes(y.view(), x.view()).unwrap();
        let fit = procrustes_diffdim(y.view(), x.view(), &ProcrustesOptions::default(), &diag).unwrap();
        prop_assert_eq!(fit.transform.rotation, closed.rotation);
        prop_assert_eq!(fit.transform.scale, closed.scale);
        prop_assert_eq!(fit.transform.translation, closed.translation);
    }

    #[test]
    fn prop_reordering_is_recovered(
        len in 1usize..40,
        seed in 0u64..1000,
    ) {
        let reference: Vec<VariantKey> = (0..len)
            .map(|i| VariantKey::new("7", i as i64 * 11, "A", "C"))
            .collect();
        let mut order: Vec<usize> = (0..len).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for i in (1..len).rev() {
            let j = rng.random_range(0..=i);
            order.swap(i, j);
        }
        let study: Vec<VariantKey> = order.iter().map(|&i| reference[i].clone()).collect();
        match compare_variants(&reference, &study) {
            VariantMatch::Ordered => prop_assert_eq!(&study, &reference),
            VariantMatch::DifferentOrder { permutation } => {
                let gathered: Vec<VariantKey> = permutation.iter().map(|&r| study[r].clone()).collect();
                prop_assert_eq!(gathered, reference);
            }
            other => prop_assert!(false, "unexpected classification {:?}", other),
        }
    }
}
