//! Cache behaviour of the sensitivity engine across evaluation times and
//! model changes.

mod common;

use common::{valuations, StubSwap};
use proptest::prelude::*;
use simm_core::simm::{CurveIndex, MaturityBucket, RiskClass};
use simm_models::{FlatCurveModel, SimulatedLiborModel, TermStructureModel};
use simm_sensitivity::{
    DeltaKind, LadderSensitivityScheme, SensitivityEngine, SensitivityMode, SensitivityQuery,
};
use std::sync::Arc;

fn libor_model(seed: u64) -> Arc<dyn TermStructureModel> {
    Arc::new(
        SimulatedLiborModel::builder()
            .number_of_rates(10)
            .period_length(0.5)
            .number_of_paths(200)
            .seed(seed)
            .build()
            .unwrap(),
    )
}

fn engine(mode: SensitivityMode) -> (SensitivityEngine<StubSwap>, Arc<std::sync::atomic::AtomicUsize>) {
    let product = StubSwap::new(5.0);
    let counter = product.valuation_counter();
    let engine = SensitivityEngine::new(product, Arc::new(LadderSensitivityScheme::new(mode)));
    (engine, counter)
}

#[test]
fn test_bucketed_sensitivities_are_idempotent() {
    let (mut engine, counter) = engine(SensitivityMode::Exact);
    engine.bind_model(libor_model(7)).unwrap();

    let first = engine
        .bucket_sensitivities(RiskClass::InterestRate, &CurveIndex::libor_6m(), 1.0)
        .unwrap();
    let builds = engine.operator_builds();
    let second = engine
        .bucket_sensitivities(RiskClass::InterestRate, &CurveIndex::libor_6m(), 1.0)
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(valuations(&counter), 1);
    assert_eq!(engine.operator_builds(), builds);
    assert_eq!(engine.cache().bucketed_stats().hits, 1);
}

#[test]
fn test_single_bucket_queries_share_one_computation() {
    let (mut engine, counter) = engine(SensitivityMode::Exact);
    engine.bind_model(libor_model(7)).unwrap();

    for bucket in MaturityBucket::ALL {
        let query = SensitivityQuery::ir_delta(CurveIndex::Ois, bucket, "EUR", 0.5);
        assert!(engine.get_sensitivity(&query).unwrap().is_supported());
    }

    assert_eq!(valuations(&counter), 1);
    assert_eq!(engine.cache().bucketed_len(), 1);
    assert_eq!(engine.cache().bucketed_stats().misses, 1);
    assert_eq!(engine.cache().bucketed_stats().hits, 11);
}

#[test]
fn test_gradient_recomputed_once_per_model_change() {
    let (mut engine, counter) = engine(SensitivityMode::Exact);
    engine.bind_model(libor_model(1)).unwrap();

    for t in [0.0, 0.5, 1.0, 1.5] {
        engine
            .bucket_sensitivities(RiskClass::InterestRate, &CurveIndex::Ois, t)
            .unwrap();
    }
    assert_eq!(valuations(&counter), 1);

    let stale = engine
        .bucket_sensitivities(RiskClass::InterestRate, &CurveIndex::libor_6m(), 1.5)
        .unwrap();
    engine.bind_model(libor_model(2)).unwrap();
    assert_eq!(valuations(&counter), 2);
    assert_eq!(engine.cache().exact_len(), 0);
    assert_eq!(engine.cache().bucketed_len(), 0);

    let fresh = engine
        .bucket_sensitivities(RiskClass::InterestRate, &CurveIndex::libor_6m(), 1.5)
        .unwrap();
    assert_ne!(stale, fresh);
    assert_eq!(engine.stats().gradient_recomputations, 2);
}

#[test]
fn test_time_change_empties_bucketed_tier() {
    let (mut engine, _) = engine(SensitivityMode::Exact);
    engine.bind_model(libor_model(3)).unwrap();

    let at_one = engine
        .bucket_sensitivities(RiskClass::InterestRate, &CurveIndex::libor_6m(), 1.0)
        .unwrap();
    assert_eq!(engine.cache().bucketed_len(), 1);

    engine.on_evaluation_time_changed(2.0);
    assert_eq!(engine.cache().bucketed_len(), 0);
    assert!(engine.cache().exact_len() > 0);

    let at_two = engine
        .bucket_sensitivities(RiskClass::InterestRate, &CurveIndex::libor_6m(), 2.0)
        .unwrap();
    assert_ne!(at_one, at_two);
}

#[test]
fn test_exact_tier_survives_time_changes() {
    let (mut engine, _) = engine(SensitivityMode::Exact);
    engine.bind_model(libor_model(4)).unwrap();

    let first = engine
        .get_exact_delta_from_cache(1.0, RiskClass::InterestRate, &CurveIndex::Ois, DeltaKind::Model)
        .unwrap();
    engine.on_evaluation_time_changed(3.0);
    let second = engine
        .get_exact_delta_from_cache(1.0, RiskClass::InterestRate, &CurveIndex::Ois, DeltaKind::Model)
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(engine.cache().exact_stats().hits, 1);

    engine.clear_exact_cache();
    assert_eq!(engine.cache().exact_len(), 0);
}

#[test]
fn test_melting_reads_time_zero_exact_deltas_only() {
    let (mut engine, _) = engine(SensitivityMode::Melting);
    engine.bind_model(Arc::new(FlatCurveModel::new(0.02, 0.5, 10).unwrap())).unwrap();

    for t in [0.5, 1.0, 2.5] {
        engine
            .bucket_sensitivities(RiskClass::InterestRate, &CurveIndex::libor_6m(), t)
            .unwrap();
    }

    // Model and market-rate kinds for both product curves at time 0
    assert_eq!(engine.cache().exact_len(), 4);
}

#[test]
fn test_interpolation_fills_coarse_grid_only() {
    let (mut engine, _) = engine(SensitivityMode::Interpolation);
    engine.bind_model(Arc::new(FlatCurveModel::new(0.02, 0.5, 10).unwrap())).unwrap();

    engine
        .bucket_sensitivities(RiskClass::InterestRate, &CurveIndex::libor_6m(), 1.25)
        .unwrap();
    engine
        .bucket_sensitivities(RiskClass::InterestRate, &CurveIndex::libor_6m(), 1.75)
        .unwrap();

    // Grid times 1.0 and 2.0, two kinds, two curves
    assert_eq!(engine.cache().exact_len(), 8);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_repeated_bucket_queries_are_identical(
        t in 0.0f64..4.5,
        discount in any::<bool>(),
        mode in prop::sample::select(vec![
            SensitivityMode::Exact,
            SensitivityMode::Melting,
            SensitivityMode::Interpolation,
        ]),
    ) {
        let (mut engine, counter) = engine(mode);
        engine.bind_model(Arc::new(FlatCurveModel::new(0.02, 0.5, 10).unwrap())).unwrap();
        let curve = if discount { CurveIndex::Ois } else { CurveIndex::libor_6m() };

        let first = engine.bucket_sensitivities(RiskClass::InterestRate, &curve, t).unwrap();
        let exact_entries = engine.cache().exact_len();
        let second = engine.bucket_sensitivities(RiskClass::InterestRate, &curve, t).unwrap();

        prop_assert_eq!(first, second);
        prop_assert_eq!(valuations(&counter), 1);
        prop_assert_eq!(engine.cache().exact_len(), exact_entries);
    }
}
