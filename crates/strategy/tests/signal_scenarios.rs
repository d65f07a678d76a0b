use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{Candle, CandleSeries, Error, SignalKind};
use strategy::{BollingerBands, HeikinAshi, SignalDetector, StrategyParams};

fn ts(i: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::hours(2 * i as i64)
}

/// Twenty doji candles at 100: HA candles are flat green dojis and the
/// bands collapse onto 100 once defined.
fn flat_prefix() -> Vec<Candle> {
    (0..20)
        .map(|i| Candle::new(ts(i), 100.0, 101.0, 99.0, 100.0))
        .collect()
}

fn series(mut candles: Vec<Candle>, tail: &[(f64, f64, f64, f64)]) -> CandleSeries {
    let start = candles.len();
    for (k, &(o, h, l, c)) in tail.iter().enumerate() {
        candles.push(Candle::new(ts(start + k), o, h, l, c));
    }
    CandleSeries::new("TESTUSDT", candles).unwrap()
}

/// Candle 20: red HA (open 100, close 95) with its low at 80 under the lower
/// band, body 25% so the preceding pair stays quiet.
/// Candle 21: green HA (open 97.5, close 98.5, range 97..99), body 50%.
fn buy_setup() -> CandleSeries {
    series(
        flat_prefix(),
        &[(100.0, 100.0, 80.0, 100.0), (99.0, 99.0, 97.0, 99.0)],
    )
}

/// Mirror of `buy_setup` at the upper band.
fn sell_setup() -> CandleSeries {
    series(
        flat_prefix(),
        &[(100.0, 120.0, 100.0, 100.0), (101.0, 103.0, 101.0, 101.0)],
    )
}

#[test]
fn red_touch_then_strong_green_gives_one_buy() {
    let detector = SignalDetector::default();
    let s = buy_setup();

    let analysis = detector.analyze(s.candles()).unwrap();
    assert!(analysis.heikin_ashi[20].is_red());
    assert!(analysis.heikin_ashi[20].low <= analysis.bands[20].unwrap().lower);
    assert!(analysis.heikin_ashi[21].is_green());
    assert_eq!(analysis.heikin_ashi[21].body_pct(), 50.0);

    let signals = detector.detect_series(&s).unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].kind, SignalKind::Buy);
    assert_eq!(signals[0].index, 21);
    assert_eq!(signals[0].timestamp, ts(21));
    assert_eq!(signals[0].instrument, "TESTUSDT");
}

#[test]
fn green_touch_then_strong_red_gives_one_sell() {
    let detector = SignalDetector::default();
    let signals = detector.detect_series(&sell_setup()).unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].kind, SignalKind::Sell);
    assert_eq!(signals[0].index, 21);
}

#[test]
fn weak_confirmation_body_gives_nothing() {
    // HA open 97.5, close 98, range 95..100: body 10%
    let s = series(
        flat_prefix(),
        &[(100.0, 100.0, 80.0, 100.0), (98.5, 100.0, 95.0, 98.5)],
    );
    let detector = SignalDetector::default();
    let analysis = detector.analyze(s.candles()).unwrap();
    assert!((analysis.heikin_ashi[21].body_pct() - 10.0).abs() < 1e-9);
    assert!(detector.detect_series(&s).unwrap().is_empty());
}

#[test]
fn zero_range_confirmation_is_quiet_and_not_an_error() {
    // every price equals the HA open of candle 21, so its range is zero
    let s = series(
        flat_prefix(),
        &[(100.0, 100.0, 80.0, 100.0), (97.5, 97.5, 97.5, 97.5)],
    );
    let detector = SignalDetector::default();
    let analysis = detector.analyze(s.candles()).unwrap();
    assert_eq!(analysis.heikin_ashi[21].range(), 0.0);
    assert!(detector.detect_series(&s).unwrap().is_empty());
}

#[test]
fn live_mode_only_sees_the_most_recent_pair() {
    let s = series(
        flat_prefix(),
        &[
            (100.0, 100.0, 80.0, 100.0),
            (99.0, 99.0, 97.0, 99.0),
            (99.0, 99.0, 99.0, 99.0),
        ],
    );

    let narrow = SignalDetector::default();
    assert!(narrow.detect_latest(&s).unwrap().is_empty());

    let wide = SignalDetector::new(StrategyParams {
        lookback_pairs: 2,
        ..StrategyParams::default()
    });
    let signals = wide.detect_latest(&s).unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].kind, SignalKind::Buy);
    assert_eq!(signals[0].index, 21);
}

#[test]
fn live_and_backtest_modes_agree_on_the_last_pair() {
    let detector = SignalDetector::default();
    for s in [buy_setup(), sell_setup()] {
        let live = detector.detect_latest(&s).unwrap();
        let all = detector.detect_series(&s).unwrap();
        let last: Vec<_> = all
            .into_iter()
            .filter(|sig| sig.index == s.len() - 1)
            .collect();
        assert_eq!(live, last);
    }
}

#[test]
fn higher_body_threshold_suppresses_the_buy() {
    let detector = SignalDetector::new(StrategyParams {
        min_body_pct: 50.5,
        ..StrategyParams::default()
    });
    assert!(detector.detect_series(&buy_setup()).unwrap().is_empty());
}

#[test]
fn bands_reject_one_candle_short_of_period() {
    let candles: Vec<Candle> = flat_prefix().into_iter().take(19).collect();
    let err = BollingerBands::default().compute(&candles).unwrap_err();
    assert!(matches!(err, Error::InsufficientData { required: 20, actual: 19 }));
}

#[test]
fn detector_rejects_one_candle_short_of_period_plus_two() {
    let s = series(flat_prefix(), &[(100.0, 101.0, 99.0, 100.0)]);
    let err = SignalDetector::default().detect_series(&s).unwrap_err();
    assert!(matches!(err, Error::InsufficientData { required: 22, actual: 21 }));
    let err = SignalDetector::default().detect_latest(&s).unwrap_err();
    assert!(matches!(err, Error::InsufficientData { required: 22, actual: 21 }));
}

#[test]
fn repeated_runs_are_identical() {
    let detector = SignalDetector::default();
    let s = buy_setup();
    assert_eq!(
        HeikinAshi::transform(s.candles()).unwrap(),
        HeikinAshi::transform(s.candles()).unwrap()
    );
    assert_eq!(
        detector.analyze(s.candles()).unwrap(),
        detector.analyze(s.candles()).unwrap()
    );
    assert_eq!(
        detector.detect_series(&s).unwrap(),
        detector.detect_series(&s).unwrap()
    );
}
