//! SARIMA model order specification.

use serde::{Deserialize, Serialize};

use crate::domain::error::{ForecastError, Result};

/// Non-seasonal order `(p, d, q)`. Serialized as `[p, d, q]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[usize; 3]", into = "[usize; 3]")]
pub struct ModelOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ModelOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }
}

impl From<[usize; 3]> for ModelOrder {
    fn from(v: [usize; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<ModelOrder> for [usize; 3] {
    fn from(o: ModelOrder) -> Self {
        [o.p, o.d, o.q]
    }
}

/// Seasonal order `(P, D, Q, s)`. Serialized as `[P, D, Q, s]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[usize; 4]", into = "[usize; 4]")]
pub struct SeasonalOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub period: usize,
}

impl SeasonalOrder {
    pub fn new(p: usize, d: usize, q: usize, period: usize) -> Self {
        Self { p, d, q, period }
    }

    /// No seasonal component.
    pub fn none() -> Self {
        Self::new(0, 0, 0, 0)
    }

    pub fn has_terms(&self) -> bool {
        self.p > 0 || self.d > 0 || self.q > 0
    }
}

impl Default for SeasonalOrder {
    fn default() -> Self {
        Self::none()
    }
}

impl From<[usize; 4]> for SeasonalOrder {
    fn from(v: [usize; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<SeasonalOrder> for [usize; 4] {
    fn from(o: SeasonalOrder) -> Self {
        [o.p, o.d, o.q, o.period]
    }
}

/// Full SARIMA specification handed to the model adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SarimaConfig {
    pub order: ModelOrder,
    #[serde(default)]
    pub seasonal_order: SeasonalOrder,
}

impl SarimaConfig {
    pub fn new(order: ModelOrder, seasonal_order: SeasonalOrder) -> Self {
        Self {
            order,
            seasonal_order,
        }
    }

    /// Check the orders are usable by the adapter.
    ///
    /// Orders are unsigned, so only the seasonal period needs checking:
    /// it must exceed 1 whenever a seasonal term is present.
    pub fn validate(&self) -> Result<()> {
        let s = &self.seasonal_order;
        if s.has_terms() && s.period <= 1 {
            return Err(ForecastError::config(format!(
                "seasonal period must be > 1 when seasonal terms are set, got s={}",
                s.period
            )));
        }
        Ok(())
    }

    /// Largest autoregressive lag in the expanded polynomial.
    pub fn max_ar_lag(&self) -> usize {
        self.order.p + self.seasonal_order.p * self.seasonal_order.period
    }

    /// Largest moving-average lag in the expanded polynomial.
    pub fn max_ma_lag(&self) -> usize {
        self.order.q + self.seasonal_order.q * self.seasonal_order.period
    }

    /// Observations consumed by differencing.
    pub fn differencing_loss(&self) -> usize {
        self.order.d + self.seasonal_order.d * self.seasonal_order.period
    }
}

impl std::fmt::Display for SarimaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let o = &self.order;
        let s = &self.seasonal_order;
        write!(
            f,
            "SARIMA({},{},{})x({},{},{},{})",
            o.p, o.d, o.q, s.p, s.d, s.q, s.period
        )
    }
}
