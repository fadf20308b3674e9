use proptest::prelude::*;
use textcrop::export::{split_sizes, SplitMode};

proptest! {
    #[test]
    fn split_sizes_partition_exactly(
        n in 0usize..5000,
        train_pct in 1u32..99,
        valid_pct in 0u32..99,
    ) {
        prop_assume!(train_pct + valid_pct <= 100);
        let train_ratio = f64::from(train_pct) / 100.0;
        let valid_ratio = f64::from(valid_pct) / 100.0;

        for mode in [SplitMode::Region, SplitMode::Image] {
            let (train, valid, test) = split_sizes(n, train_ratio, valid_ratio, mode);
            prop_assert_eq!(train + valid + test, n);
        }
    }

    #[test]
    fn split_sizes_are_deterministic(
        n in 0usize..5000,
        train_pct in 1u32..99,
        valid_pct in 0u32..99,
    ) {
        prop_assume!(train_pct + valid_pct <= 100);
        let train_ratio = f64::from(train_pct) / 100.0;
        let valid_ratio = f64::from(valid_pct) / 100.0;

        let first = split_sizes(n, train_ratio, valid_ratio, SplitMode::Region);
        let second = split_sizes(n, train_ratio, valid_ratio, SplitMode::Region);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn image_mode_never_starves_validation_of_large_corpora(
        n in 3usize..5000,
        train_pct in 1u32..99,
    ) {
        let train_ratio = f64::from(train_pct) / 100.0;

        // valid_ratio small enough that its floor could be zero.
        let (_, valid, _) = split_sizes(n, train_ratio, 0.0, SplitMode::Image);
        prop_assert!(valid >= 1);
    }
}
