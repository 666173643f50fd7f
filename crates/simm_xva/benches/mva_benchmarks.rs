//! Criterion benchmarks for margin profiles and MVA.
//!
//! Compares the three sensitivity modes on the same product, since melting
//! and interpolation trade accuracy for fewer regressions.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use simm_core::simm::{CurveIndex, ProductClass, RiskClass};
use simm_core::types::{Currency, MarginError, RandomVariable};
use simm_models::{
    Gradient, ProductClassification, SimmProduct, SimulatedLiborModel, TermStructureModel,
    Valuation,
};
use simm_sensitivity::SensitivityMode;
use simm_xva::{
    IrDeltaAggregation, IrDeltaParameters, MarginConfig, MarginOrchestrator, MvaConfig,
};
use std::sync::Arc;

struct LevelSwap {
    classification: ProductClassification,
}

impl SimmProduct for LevelSwap {
    fn classification(&self) -> &ProductClassification {
        &self.classification
    }

    fn final_maturity(&self) -> f64 {
        10.0
    }

    fn value_with_gradient(
        &self,
        _evaluation_time: f64,
        model: &dyn TermStructureModel,
    ) -> Result<Valuation, MarginError> {
        let mut gradient = Gradient::new();
        for time_index in 0..model.time_discretization().len() {
            for rate_index in 0..model.number_of_forward_rates() {
                gradient.insert(
                    model.forward_rate_factor(time_index, rate_index),
                    RandomVariable::one(),
                );
            }
        }
        for (_, adjustment) in model.numeraire_adjustments().iter() {
            gradient.insert(adjustment.factor, RandomVariable::deterministic(-1.0));
        }
        Ok(Valuation {
            value: RandomVariable::zero(),
            gradient,
        })
    }
}

fn orchestrator(mode: SensitivityMode) -> MarginOrchestrator<LevelSwap> {
    let product = LevelSwap {
        classification: ProductClassification::new(
            ProductClass::RatesFx,
            vec![RiskClass::InterestRate],
            vec![CurveIndex::Ois, CurveIndex::libor_6m()],
            Currency::eur(),
        ),
    };
    let config = MarginConfig::default()
        .with_sensitivity_mode(mode)
        .with_mva(MvaConfig::default().with_time_step(0.25).with_funding_spread(0.01));
    let aggregation = IrDeltaParameters::flat(1.0, 0.3)
        .map(IrDeltaAggregation::new)
        .expect("flat parameters are valid");
    MarginOrchestrator::new(product, config, Arc::new(aggregation))
}

/// Benchmark a full MVA per sensitivity mode.
fn bench_mva_by_mode(c: &mut Criterion) {
    let model: Arc<dyn TermStructureModel> = Arc::new(
        SimulatedLiborModel::builder()
            .number_of_rates(20)
            .number_of_paths(500)
            .build()
            .expect("model parameters are valid"),
    );

    let mut group = c.benchmark_group("mva");
    group.sample_size(10);

    for mode in [
        SensitivityMode::Exact,
        SensitivityMode::Melting,
        SensitivityMode::Interpolation,
    ] {
        group.bench_with_input(
            BenchmarkId::new("mode", format!("{:?}", mode)),
            &mode,
            |b, &mode| {
                b.iter(|| orchestrator(mode).mva(black_box(&model)).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_mva_by_mode);
criterion_main!(benches);
