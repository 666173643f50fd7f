//! Portfolio-level MVA.
//!
//! Each [`MarginOrchestrator`] owns its gradient, regression operator and
//! caches, so independent products are processed in parallel without shared
//! mutable state.

use crate::orchestrator::MarginOrchestrator;
use rayon::prelude::*;
use serde::Serialize;
use simm_core::types::MarginError;
use simm_models::{SimmProduct, TermStructureModel};
use std::sync::Arc;
use tracing::info;

/// MVA of every product and their sum.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioMva {
    /// MVA per product, in input order.
    pub per_product: Vec<f64>,
    /// Sum over the portfolio.
    pub total: f64,
}

/// Computes the MVA of every product under `model` in parallel.
///
/// # Errors
///
/// The first failing product fails the whole portfolio.
pub fn portfolio_mva<P>(
    products: &mut [MarginOrchestrator<P>],
    model: &Arc<dyn TermStructureModel>,
) -> Result<PortfolioMva, MarginError>
where
    P: SimmProduct,
{
    let per_product: Vec<f64> = products
        .par_iter_mut()
        .map(|orchestrator| orchestrator.mva(model))
        .collect::<Result<_, _>>()?;
    let total = per_product.iter().sum();

    info!(products = per_product.len(), total, "computed portfolio MVA");
    Ok(PortfolioMva { per_product, total })
}
