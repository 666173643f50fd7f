//! Per-product sensitivity engine.
//!
//! [`SensitivityEngine`] owns one product together with everything derived
//! from it: the time-0 gradient, the numeraire adjustment map, the bound
//! regression operator and both cache tiers. It answers single-bucket
//! sensitivity queries from a SIMM aggregation through [`SensitivitySource`].
//!
//! # Query resolution
//!
//! 1. A product without optionality has zero vega and curvature.
//! 2. A product class or risk class the product does not carry gives zero.
//! 3. Interest-rate delta on one of the product's curves, in its bucket key,
//!    is served from the bucketed cache, computing the curve's 12-bucket
//!    vector on a miss. Other curves or bucket keys give zero.
//! 4. Delta in any other risk class, vega and curvature are `Unsupported`.

use crate::cache::{CacheStats, ExactDeltaKey, SensitivityCache};
use crate::gradient::GradientProvider;
use crate::projector::{discount_pivot_maturities, forward_pivot_maturities, CurveSensitivityProjector};
use crate::scheme::{BucketRequest, DeltaKind, ExactDeltaSource, SensitivityScheme};
use simm_core::simm::{
    BucketSensitivities, CurveIndex, MaturityBucket, ProductClass, RiskClass, RiskType,
    SensitivityValue,
};
use simm_core::types::{MarginError, RandomVariable};
use simm_models::{
    Gradient, NumeraireAdjustmentMap, ProductClassification, SimmProduct, TermStructureModel,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// A single-bucket sensitivity query.
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityQuery {
    /// SIMM product class.
    pub product_class: ProductClass,
    /// SIMM risk class.
    pub risk_class: RiskClass,
    /// Maturity bucket on the interest-rate ladder.
    pub maturity_bucket: MaturityBucket,
    /// Curve the sensitivity refers to.
    pub curve: CurveIndex,
    /// SIMM bucket key (the currency for interest rates).
    pub bucket_key: String,
    /// Delta, vega or curvature.
    pub risk_type: RiskType,
    /// Evaluation time in years.
    pub evaluation_time: f64,
}

impl SensitivityQuery {
    /// Interest-rate delta query for a rates product.
    ///
    /// # Examples
    ///
    /// ```
    /// use simm_core::simm::{CurveIndex, MaturityBucket, RiskType};
    /// use simm_sensitivity::SensitivityQuery;
    ///
    /// let q = SensitivityQuery::ir_delta(CurveIndex::Ois, MaturityBucket::Y5, "EUR", 1.0);
    /// assert_eq!(q.risk_type, RiskType::Delta);
    /// ```
    pub fn ir_delta(
        curve: CurveIndex,
        maturity_bucket: MaturityBucket,
        bucket_key: impl Into<String>,
        evaluation_time: f64,
    ) -> Self {
        Self {
            product_class: ProductClass::RatesFx,
            risk_class: RiskClass::InterestRate,
            maturity_bucket,
            curve,
            bucket_key: bucket_key.into(),
            risk_type: RiskType::Delta,
            evaluation_time,
        }
    }

    /// Same query with another risk type.
    pub fn with_risk_type(mut self, risk_type: RiskType) -> Self {
        self.risk_type = risk_type;
        self
    }
}

/// Sensitivity lookup used by margin aggregation.
pub trait SensitivitySource {
    /// Classification of the product behind this source.
    fn classification(&self) -> &ProductClassification;

    /// Sensitivity of the product for one SIMM bucket.
    fn get_sensitivity(&mut self, query: &SensitivityQuery)
        -> Result<SensitivityValue, MarginError>;
}

/// Sensitivity state of one product.
///
/// The engine holds the model it is bound to. Binding a model with a
/// different identity drops the gradient and both cache tiers; the gradient
/// is then recomputed eagerly.
pub struct SensitivityEngine<P> {
    product: P,
    scheme: Arc<dyn SensitivityScheme>,
    model: Option<Arc<dyn TermStructureModel>>,
    gradient: GradientProvider,
    adjustments: NumeraireAdjustmentMap,
    projector: CurveSensitivityProjector,
    cache: SensitivityCache,
}

impl<P> fmt::Debug for SensitivityEngine<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensitivityEngine")
            .field("scheme", &self.scheme)
            .field("model", &self.model.as_ref().map(|m| m.id()))
            .field("gradient", &self.gradient)
            .field("projector", &self.projector)
            .field("cache", &self.cache)
            .finish()
    }
}

impl<P: SimmProduct> SensitivityEngine<P> {
    /// Creates an unbound engine for `product`.
    pub fn new(product: P, scheme: Arc<dyn SensitivityScheme>) -> Self {
        Self {
            product,
            scheme,
            model: None,
            gradient: GradientProvider::new(),
            adjustments: NumeraireAdjustmentMap::new(),
            projector: CurveSensitivityProjector::new(),
            cache: SensitivityCache::new(),
        }
    }

    /// The product.
    pub fn product(&self) -> &P {
        &self.product
    }

    /// Consumes the engine and returns the product.
    pub fn into_product(self) -> P {
        self.product
    }

    /// The sensitivity scheme.
    pub fn scheme(&self) -> &Arc<dyn SensitivityScheme> {
        &self.scheme
    }

    /// Replaces the sensitivity scheme. Both cache tiers and the product's
    /// extra state are dropped; the gradient is kept.
    pub fn set_scheme(&mut self, scheme: Arc<dyn SensitivityScheme>) {
        debug!(
            mode = ?scheme.sensitivity_mode(),
            weight = ?scheme.weight_mode(),
            "replacing sensitivity scheme"
        );
        self.scheme = scheme;
        self.cache.on_model_changed();
        self.product.clear_extra_state();
    }

    /// The bound model.
    pub fn model(&self) -> Option<&Arc<dyn TermStructureModel>> {
        self.model.as_ref()
    }

    /// The cache.
    pub fn cache(&self) -> &SensitivityCache {
        &self.cache
    }

    /// Number of AAD passes performed so far.
    pub fn gradient_computations(&self) -> u64 {
        self.gradient.computations()
    }

    /// Number of regression operators built so far.
    pub fn operator_builds(&self) -> u64 {
        self.projector.operator_builds()
    }

    /// Statistics over both cache tiers and the gradient.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self
            .cache
            .bucketed_stats()
            .combined(&self.cache.exact_stats());
        stats.gradient_recomputations = self.gradient.computations();
        stats
    }

    /// Binds `model`. Returns `true` if the model differs from the bound one,
    /// in which case all derived state is dropped and the gradient is
    /// recomputed.
    ///
    /// # Errors
    ///
    /// Propagates the valuation failure of the gradient computation. The
    /// model stays bound and the next access retries.
    pub fn bind_model(&mut self, model: Arc<dyn TermStructureModel>) -> Result<bool, MarginError> {
        if self.model.as_ref().map(|m| m.id()) == Some(model.id()) {
            return Ok(false);
        }
        debug!(
            from = ?self.model.as_ref().map(|m| m.id().value()),
            to = %model.id(),
            "binding model"
        );
        self.model = Some(model);
        self.on_model_changed();
        self.ensure_gradient()?;
        Ok(true)
    }

    /// Time-0 gradient of the product under `model`, binding it if needed.
    pub fn gradient(&mut self, model: &Arc<dyn TermStructureModel>) -> Result<&Gradient, MarginError> {
        self.bind_model(Arc::clone(model))?;
        self.ensure_gradient()?;
        self.gradient.current().ok_or_else(missing_gradient)
    }

    /// Numeraire adjustment factors collected from the bound model.
    pub fn numeraire_adjustment_map(&mut self) -> Result<&NumeraireAdjustmentMap, MarginError> {
        self.ensure_gradient()?;
        Ok(&self.adjustments)
    }

    /// Forward-rate sensitivities at `evaluation_time` under the bound model.
    pub fn forward_rate_sensitivities(
        &mut self,
        evaluation_time: f64,
    ) -> Result<Vec<RandomVariable>, MarginError> {
        self.ensure_gradient()?;
        let model = self.bound_model()?;
        let gradient = self.gradient.current().ok_or_else(missing_gradient)?;
        self.projector
            .forward_rate_sensitivities(evaluation_time, model.as_ref(), gradient)
    }

    /// Discount-bond sensitivities at `evaluation_time` under the bound model.
    pub fn discount_bond_sensitivities(
        &mut self,
        evaluation_time: f64,
        risk_class: RiskClass,
    ) -> Result<Vec<RandomVariable>, MarginError> {
        self.ensure_gradient()?;
        let model = self.bound_model()?;
        let gradient = self.gradient.current().ok_or_else(missing_gradient)?;
        self.projector.discount_bond_sensitivities(
            evaluation_time,
            risk_class,
            model.as_ref(),
            gradient,
            &self.adjustments,
        )
    }

    /// 12-bucket vector for `curve` at `evaluation_time`, served from the
    /// bucketed tier when possible.
    pub fn bucket_sensitivities(
        &mut self,
        risk_class: RiskClass,
        curve: &CurveIndex,
        evaluation_time: f64,
    ) -> Result<BucketSensitivities, MarginError> {
        self.on_evaluation_time_changed(evaluation_time);
        if let Some(buckets) = self.cache.bucketed(risk_class, curve) {
            trace!(%risk_class, %curve, evaluation_time, "bucketed cache hit");
            return Ok(buckets.clone());
        }

        self.ensure_gradient()?;
        let scheme = Arc::clone(&self.scheme);
        let request = BucketRequest {
            risk_class,
            curve,
            evaluation_time,
            final_maturity: self.product.final_maturity(),
        };
        let buckets = scheme.bucket_sensitivities(&request, self)?;

        debug!(%risk_class, %curve, evaluation_time, "computed bucket sensitivities");
        self.cache
            .insert_bucketed(risk_class, curve.clone(), buckets.clone());
        Ok(buckets)
    }

    /// Sensitivity of the product for one SIMM bucket.
    pub fn get_sensitivity(
        &mut self,
        query: &SensitivityQuery,
    ) -> Result<SensitivityValue, MarginError> {
        let classification = self.product.classification();
        if !classification.has_optionality() && query.risk_type != RiskType::Delta {
            return Ok(SensitivityValue::zero());
        }
        let in_scope = classification.product_class() == query.product_class
            && classification.has_risk_class(query.risk_class);
        let on_product_curve = classification.curve_indices().contains(&query.curve)
            && classification.effective_bucket_key() == query.bucket_key;

        self.on_evaluation_time_changed(query.evaluation_time);

        if !in_scope {
            return Ok(SensitivityValue::zero());
        }

        match (query.risk_type, query.risk_class) {
            (RiskType::Delta, RiskClass::InterestRate) => {
                if !on_product_curve {
                    return Ok(SensitivityValue::zero());
                }
                let buckets =
                    self.bucket_sensitivities(query.risk_class, &query.curve, query.evaluation_time)?;
                Ok(SensitivityValue::Supported(
                    buckets.get(query.maturity_bucket).clone(),
                ))
            }
            _ => Ok(SensitivityValue::Unsupported),
        }
    }

    /// Exact pivot sensitivities at `time`, from the persistent tier.
    ///
    /// A miss computes and stores the sensitivities of every curve of the
    /// product (and of `curve`) at `time`, so later requests for the other
    /// curves hit.
    pub fn get_exact_delta_from_cache(
        &mut self,
        time: f64,
        risk_class: RiskClass,
        curve: &CurveIndex,
        kind: DeltaKind,
    ) -> Result<Vec<RandomVariable>, MarginError> {
        let key = ExactDeltaKey::new(time, risk_class, curve.clone(), kind);
        if let Some(hit) = self.cache.exact(&key) {
            trace!(time, %curve, %kind, "exact cache hit");
            return Ok(hit.clone());
        }

        self.ensure_gradient()?;
        let mut curves = self.product.classification().curve_indices().to_vec();
        if !curves.contains(curve) {
            curves.push(curve.clone());
        }

        for other in curves {
            let other_key = ExactDeltaKey::new(time, risk_class, other.clone(), kind);
            if self.cache.contains_exact(&other_key) {
                continue;
            }
            let values = match kind {
                DeltaKind::Model => self.model_sensitivities(time, risk_class, &other)?,
                DeltaKind::MarketRate => {
                    let model_values =
                        self.get_exact_delta_from_cache(time, risk_class, &other, DeltaKind::Model)?;
                    let model = self.bound_model()?;
                    self.scheme
                        .market_rate_sensitivities(&other, time, &model_values, model.as_ref())?
                }
            };
            debug!(time, curve = %other, %kind, pivots = values.len(), "computed exact sensitivities");
            self.cache.insert_exact(other_key, values);
        }

        self.cache.peek_exact(&key).cloned().ok_or_else(|| {
            MarginError::InvalidInput(format!("no exact sensitivities for {} at {}", curve, time))
        })
    }

    /// Drops the gradient, the adjustment map, both cache tiers, the bound
    /// regression operator and the product's extra state.
    pub fn on_model_changed(&mut self) {
        self.gradient.invalidate();
        self.adjustments.clear();
        self.projector.reset();
        self.cache.on_model_changed();
        self.product.clear_extra_state();
    }

    /// Drops the bucketed tier if `time` differs from the last evaluation time.
    pub fn on_evaluation_time_changed(&mut self, time: f64) {
        self.cache.on_evaluation_time_changed(time);
    }

    /// Drops the persistent tier.
    pub fn clear_exact_cache(&mut self) {
        self.cache.clear_exact();
    }

    fn bound_model(&self) -> Result<Arc<dyn TermStructureModel>, MarginError> {
        self.model
            .clone()
            .ok_or_else(|| MarginError::InvalidInput("no model bound".to_string()))
    }

    fn ensure_gradient(&mut self) -> Result<(), MarginError> {
        let model = self.bound_model()?;
        let recomputed = self
            .gradient
            .ensure(&self.product, model.as_ref(), &mut self.adjustments)?;
        if recomputed {
            self.projector.reset();
            self.cache.on_model_changed();
        }
        Ok(())
    }

    fn model_sensitivities(
        &mut self,
        time: f64,
        risk_class: RiskClass,
        curve: &CurveIndex,
    ) -> Result<Vec<RandomVariable>, MarginError> {
        if curve.is_discount() {
            self.discount_bond_sensitivities(time, risk_class)
        } else {
            self.forward_rate_sensitivities(time)
        }
    }
}

impl<P: SimmProduct> ExactDeltaSource for SensitivityEngine<P> {
    fn exact_delta(
        &mut self,
        time: f64,
        risk_class: RiskClass,
        curve: &CurveIndex,
        kind: DeltaKind,
    ) -> Result<Vec<RandomVariable>, MarginError> {
        self.get_exact_delta_from_cache(time, risk_class, curve, kind)
    }

    fn pivot_maturities(&self, time: f64, curve: &CurveIndex) -> Result<Vec<f64>, MarginError> {
        let model = self.bound_model()?;
        if curve.is_discount() {
            discount_pivot_maturities(time, model.as_ref())
        } else {
            forward_pivot_maturities(time, model.as_ref())
        }
    }

    fn conditional_expectation(
        &mut self,
        time: f64,
        value: &RandomVariable,
    ) -> Result<RandomVariable, MarginError> {
        let model = self.bound_model()?;
        self.projector
            .conditional_expectation(time, model.as_ref())?
            .expectation(value)
    }
}

impl<P: SimmProduct> SensitivitySource for SensitivityEngine<P> {
    fn classification(&self) -> &ProductClassification {
        self.product.classification()
    }

    fn get_sensitivity(
        &mut self,
        query: &SensitivityQuery,
    ) -> Result<SensitivityValue, MarginError> {
        SensitivityEngine::get_sensitivity(self, query)
    }
}

fn missing_gradient() -> MarginError {
    MarginError::ValuationFailure("gradient unavailable".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::LadderSensitivityScheme;
    use simm_core::types::Currency;
    use simm_models::{FlatCurveModel, Valuation};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProduct {
        classification: ProductClassification,
        valuations: Arc<AtomicUsize>,
        extra_state_clears: usize,
    }

    impl StubProduct {
        fn new(valuations: Arc<AtomicUsize>) -> Self {
            Self {
                classification: ProductClassification::new(
                    ProductClass::RatesFx,
                    vec![RiskClass::InterestRate],
                    vec![CurveIndex::Ois, CurveIndex::libor_6m()],
                    Currency::eur(),
                ),
                valuations,
                extra_state_clears: 0,
            }
        }
    }

    impl SimmProduct for StubProduct {
        fn classification(&self) -> &ProductClassification {
            &self.classification
        }

        fn final_maturity(&self) -> f64 {
            5.0
        }

        fn value_with_gradient(
            &self,
            _evaluation_time: f64,
            model: &dyn TermStructureModel,
        ) -> Result<Valuation, MarginError> {
            self.valuations.fetch_add(1, Ordering::SeqCst);
            let mut gradient = Gradient::new();
            for i in 0..model.number_of_forward_rates() {
                gradient.insert(model.forward_rate_factor(i, i), RandomVariable::deterministic(1.0));
            }
            for (_, adjustment) in model.numeraire_adjustments().iter() {
                gradient.insert(adjustment.factor, RandomVariable::deterministic(-1.0));
            }
            Ok(Valuation {
                value: RandomVariable::zero(),
                gradient,
            })
        }

        fn clear_extra_state(&mut self) {
            self.extra_state_clears += 1;
        }
    }

    fn engine() -> (SensitivityEngine<StubProduct>, Arc<AtomicUsize>) {
        let valuations = Arc::new(AtomicUsize::new(0));
        let engine = SensitivityEngine::new(
            StubProduct::new(Arc::clone(&valuations)),
            Arc::new(LadderSensitivityScheme::default()),
        );
        (engine, valuations)
    }

    fn flat_model() -> Arc<dyn TermStructureModel> {
        Arc::new(FlatCurveModel::new(0.02, 0.5, 10).unwrap())
    }

    #[test]
    fn test_unbound_engine_reports_error() {
        let (mut engine, _) = engine();
        let query = SensitivityQuery::ir_delta(CurveIndex::Ois, MaturityBucket::Y1, "EUR", 0.0);
        assert!(engine.get_sensitivity(&query).is_err());
    }

    #[test]
    fn test_bind_same_model_is_noop() {
        let (mut engine, valuations) = engine();
        let model = flat_model();
        assert!(engine.bind_model(Arc::clone(&model)).unwrap());
        assert!(!engine.bind_model(Arc::clone(&model)).unwrap());
        assert_eq!(valuations.load(Ordering::SeqCst), 1);
        assert_eq!(engine.product().extra_state_clears, 1);
    }

    #[test]
    fn test_gradient_is_computed_once_per_model() {
        let (mut engine, valuations) = engine();
        let model = flat_model();

        let gradient = engine.gradient(&model).unwrap();
        assert_eq!(gradient.len(), 2 * model.number_of_forward_rates());
        assert_eq!(gradient.derivative(model.forward_rate_factor(3, 3)).get(0), 1.0);
        assert_eq!(gradient.derivative(model.forward_rate_factor(3, 4)).get(0), 0.0);
        let adjustments = model.numeraire_adjustments();
        let (_, last) = adjustments.iter().last().unwrap();
        assert_eq!(gradient.derivative(last.factor).get(0), -1.0);

        let again = engine.gradient(&model).unwrap().len();
        assert_eq!(again, 2 * model.number_of_forward_rates());
        assert_eq!(valuations.load(Ordering::SeqCst), 1);
        assert_eq!(engine.gradient_computations(), 1);

        engine.gradient(&flat_model()).unwrap();
        assert_eq!(valuations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_numeraire_adjustment_map_follows_bound_model() {
        let (mut engine, _) = engine();
        assert!(engine.numeraire_adjustment_map().is_err());

        let model = flat_model();
        engine.bind_model(Arc::clone(&model)).unwrap();
        let map = engine.numeraire_adjustment_map().unwrap();

        assert_eq!(map, &model.numeraire_adjustments());
        assert_eq!(map.len(), 10);
        assert!(map.get(0.0).is_none());
        assert_eq!(map.get(2.5).unwrap().value.get(0), 1.0);
    }

    #[test]
    fn test_non_optional_product_has_zero_vega() {
        let (mut engine, _) = engine();
        engine.bind_model(flat_model()).unwrap();
        let query = SensitivityQuery::ir_delta(CurveIndex::Ois, MaturityBucket::Y1, "EUR", 0.0)
            .with_risk_type(RiskType::Vega);
        assert_eq!(engine.get_sensitivity(&query).unwrap(), SensitivityValue::zero());
    }

    #[test]
    fn test_optional_product_vega_is_unsupported() {
        let valuations = Arc::new(AtomicUsize::new(0));
        let mut product = StubProduct::new(valuations);
        product.classification = product.classification.clone().with_optionality(true);
        let mut engine = SensitivityEngine::new(product, Arc::new(LadderSensitivityScheme::default()));
        engine.bind_model(flat_model()).unwrap();

        let query = SensitivityQuery::ir_delta(CurveIndex::Ois, MaturityBucket::Y1, "EUR", 0.0)
            .with_risk_type(RiskType::Curvature);
        assert_eq!(engine.get_sensitivity(&query).unwrap(), SensitivityValue::Unsupported);
    }

    #[test]
    fn test_other_currency_and_curve_are_zero() {
        let (mut engine, _) = engine();
        engine.bind_model(flat_model()).unwrap();

        let usd = SensitivityQuery::ir_delta(CurveIndex::Ois, MaturityBucket::Y1, "USD", 0.0);
        assert_eq!(engine.get_sensitivity(&usd).unwrap(), SensitivityValue::zero());

        let other = SensitivityQuery::ir_delta(
            CurveIndex::Forward("Libor3m".to_string()),
            MaturityBucket::Y1,
            "EUR",
            0.0,
        );
        assert_eq!(engine.get_sensitivity(&other).unwrap(), SensitivityValue::zero());
        assert_eq!(engine.cache().bucketed_len(), 0);
    }

    #[test]
    fn test_credit_delta_is_unsupported_for_credit_product() {
        let valuations = Arc::new(AtomicUsize::new(0));
        let mut product = StubProduct::new(valuations);
        product.classification = ProductClassification::new(
            ProductClass::Credit,
            vec![RiskClass::CreditQ],
            vec![CurveIndex::Ois],
            Currency::eur(),
        );
        let mut engine = SensitivityEngine::new(product, Arc::new(LadderSensitivityScheme::default()));
        engine.bind_model(flat_model()).unwrap();

        let mut query = SensitivityQuery::ir_delta(CurveIndex::Ois, MaturityBucket::Y1, "EUR", 0.0);
        query.product_class = ProductClass::Credit;
        query.risk_class = RiskClass::CreditQ;
        assert_eq!(engine.get_sensitivity(&query).unwrap(), SensitivityValue::Unsupported);
    }

    #[test]
    fn test_exact_miss_fills_all_product_curves() {
        let (mut engine, _) = engine();
        engine.bind_model(flat_model()).unwrap();

        engine
            .get_exact_delta_from_cache(1.0, RiskClass::InterestRate, &CurveIndex::Ois, DeltaKind::Model)
            .unwrap();
        assert_eq!(engine.cache().exact_len(), 2);

        engine
            .get_exact_delta_from_cache(1.0, RiskClass::InterestRate, &CurveIndex::libor_6m(), DeltaKind::Model)
            .unwrap();
        assert_eq!(engine.cache().exact_stats().hits, 1);
    }

    #[test]
    fn test_scheme_change_keeps_gradient() {
        let (mut engine, valuations) = engine();
        engine.bind_model(flat_model()).unwrap();
        engine
            .bucket_sensitivities(RiskClass::InterestRate, &CurveIndex::Ois, 1.0)
            .unwrap();
        assert!(engine.cache().exact_len() > 0);

        engine.set_scheme(Arc::new(LadderSensitivityScheme::default().with_ois_sensitivities(false)));

        assert_eq!(engine.cache().exact_len(), 0);
        assert_eq!(engine.cache().bucketed_len(), 0);
        let buckets = engine
            .bucket_sensitivities(RiskClass::InterestRate, &CurveIndex::Ois, 1.0)
            .unwrap();
        assert!(buckets.is_zero());
        assert_eq!(valuations.load(Ordering::SeqCst), 1);
    }
}
