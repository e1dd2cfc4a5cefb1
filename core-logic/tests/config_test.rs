use core_logic::{AmountRange, ConfigError, CountRange, DelayRange};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Sample {
    bridge_percentage_range: AmountRange,
    arbitrum: CountRange,
    tx_delay_range: DelayRange,
}

#[test]
fn test_ranges_deserialize_from_arrays() {
    let sample: Sample = serde_json::from_str(
        r#"{"bridge_percentage_range": [45.0, 50.0], "arbitrum": [0, 1], "tx_delay_range": [10, 15]}"#,
    )
    .unwrap();

    assert_eq!(sample.bridge_percentage_range, AmountRange::new(45.0, 50.0).unwrap());
    assert_eq!(sample.arbitrum, CountRange::new(0, 1).unwrap());
    assert_eq!(sample.tx_delay_range.min_secs, 10);
    assert_eq!(sample.tx_delay_range.max_secs, 15);
}

#[test]
fn test_inverted_range_is_rejected() {
    let err = serde_json::from_str::<Sample>(
        r#"{"bridge_percentage_range": [50.0, 45.0], "arbitrum": [0, 1], "tx_delay_range": [10, 15]}"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("greater than"));
}

#[test]
fn test_amount_range_sample_stays_in_bounds() {
    let range = AmountRange::new(0.005, 0.01).unwrap();
    let mut rng = rand::thread_rng();
    for _ in 0..100 {
        let v = range.sample(&mut rng);
        assert!((0.005..=0.01).contains(&v));
    }
}

#[test]
fn test_count_range_error_value() {
    assert_eq!(
        CountRange::new(3, 1),
        Err(ConfigError::InvalidRange {
            min: "3".into(),
            max: "1".into()
        })
    );
}
