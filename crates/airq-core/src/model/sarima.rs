//! Seasonal ARIMA estimator.
//!
//! The multiplicative lag structure `φ(B)Φ(B^s)` / `θ(B)Θ(B^s)` is expanded
//! to its full lag set and every lag gets a free coefficient, which keeps
//! estimation linear. Parameters are estimated on the differenced series
//! `(1-B)^d (1-B^s)^D y` with two-stage Hannan–Rissanen least squares:
//!
//! 1. a long autoregression supplies proxy innovations;
//! 2. the differenced series is regressed jointly on its AR lags and the
//!    lagged proxy innovations.
//!
//! Stationarity and invertibility are not enforced. A mean is estimated
//! only when no differencing is applied.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::domain::{ForecastError, Result, SarimaConfig};
use crate::model::{FittedModel, Forecaster};

/// Floor on the long autoregression order used for proxy innovations.
const LONG_AR_MIN_ORDER: usize = 8;

/// Singular values below this (relative) threshold are treated as zero.
const SVD_EPS: f64 = 1e-10;

/// SARIMA forecaster bound to a fixed order specification.
#[derive(Debug, Clone, PartialEq)]
pub struct Sarima {
    config: SarimaConfig,
}

impl Sarima {
    /// Create a forecaster after validating the orders.
    pub fn new(config: SarimaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SarimaConfig {
        &self.config
    }

    /// Minimum number of raw observations this order can be fit on.
    pub fn min_observations(&self) -> usize {
        let layout = Layout::new(&self.config);
        self.config.differencing_loss() + layout.start_index() + layout.columns() + 1
    }
}

/// Lag layout shared by estimation and forecasting.
struct Layout {
    ar_lags: Vec<usize>,
    ma_lags: Vec<usize>,
    max_ar: usize,
    max_ma: usize,
    include_mean: bool,
}

impl Layout {
    fn new(config: &SarimaConfig) -> Self {
        let s = &config.seasonal_order;
        Self {
            ar_lags: expand_lags(config.order.p, s.p, s.period),
            ma_lags: expand_lags(config.order.q, s.q, s.period),
            max_ar: config.max_ar_lag(),
            max_ma: config.max_ma_lag(),
            include_mean: config.order.d == 0 && s.d == 0,
        }
    }

    fn max_ar(&self) -> usize {
        self.max_ar
    }

    fn max_ma(&self) -> usize {
        self.max_ma
    }

    fn long_ar_order(&self) -> usize {
        if self.ma_lags.is_empty() {
            0
        } else {
            (self.max_ar().max(self.max_ma()) + 1).max(LONG_AR_MIN_ORDER)
        }
    }

    /// First differenced index with every regressor available.
    fn start_index(&self) -> usize {
        if self.ma_lags.is_empty() {
            self.max_ar()
        } else {
            self.max_ar().max(self.long_ar_order() + self.max_ma())
        }
    }

    fn columns(&self) -> usize {
        usize::from(self.include_mean) + self.ar_lags.len() + self.ma_lags.len()
    }
}

/// Lags `i + j*s` for `0 <= i <= p`, `0 <= j <= P`, excluding zero.
fn expand_lags(p: usize, seasonal_p: usize, period: usize) -> Vec<usize> {
    let mut lags: Vec<usize> = (0..=seasonal_p)
        .flat_map(|j| (0..=p).map(move |i| i + j * period))
        .filter(|lag| *lag > 0)
        .collect();
    lags.sort_unstable();
    lags.dedup();
    lags
}

/// Coefficients of `(1-B)^d (1-B^s)^D`, lowest power first.
fn differencing_polynomial(config: &SarimaConfig) -> Vec<f64> {
    let mut poly = vec![1.0];
    for _ in 0..config.order.d {
        poly = poly_mul_one_minus_lag(&poly, 1);
    }
    for _ in 0..config.seasonal_order.d {
        poly = poly_mul_one_minus_lag(&poly, config.seasonal_order.period);
    }
    poly
}

fn poly_mul_one_minus_lag(poly: &[f64], lag: usize) -> Vec<f64> {
    let mut out = vec![0.0; poly.len() + lag];
    for (k, c) in poly.iter().enumerate() {
        out[k] += c;
        out[k + lag] -= c;
    }
    out
}

fn apply_differencing(y: &[f64], poly: &[f64]) -> Vec<f64> {
    let loss = poly.len() - 1;
    (loss..y.len())
        .map(|t| poly.iter().enumerate().map(|(k, c)| c * y[t - k]).sum())
        .collect()
}

/// Least squares `X b = y` via SVD; rank-deficient designs get the
/// minimum-norm solution.
fn least_squares(rows: usize, cols: usize, design: Vec<f64>, target: Vec<f64>) -> Result<Vec<f64>> {
    let x = DMatrix::from_row_slice(rows, cols, &design);
    let y = DVector::from_vec(target);
    let beta = x
        .svd(true, true)
        .solve(&y, SVD_EPS)
        .map_err(|e| ForecastError::fit(format!("least squares failed: {}", e)))?;
    if beta.iter().any(|b| !b.is_finite()) {
        return Err(ForecastError::fit("least squares produced non-finite coefficients"));
    }
    Ok(beta.iter().copied().collect())
}

/// Long autoregression residuals; zero before `order`.
fn proxy_innovations(w: &[f64], order: usize, include_mean: bool) -> Result<Vec<f64>> {
    let cols = usize::from(include_mean) + order;
    let rows = w.len() - order;
    let mut design = Vec::with_capacity(rows * cols);
    let mut target = Vec::with_capacity(rows);
    for t in order..w.len() {
        if include_mean {
            design.push(1.0);
        }
        design.extend((1..=order).map(|lag| w[t - lag]));
        target.push(w[t]);
    }
    let beta = least_squares(rows, cols, design, target)?;

    let mut resid = vec![0.0; w.len()];
    for t in order..w.len() {
        let mut pred = if include_mean { beta[0] } else { 0.0 };
        let offset = usize::from(include_mean);
        for lag in 1..=order {
            pred += beta[offset + lag - 1] * w[t - lag];
        }
        resid[t] = w[t] - pred;
    }
    Ok(resid)
}

impl Forecaster for Sarima {
    type Model = SarimaModel;

    fn fit(&self, history: &[f64]) -> Result<SarimaModel> {
        if let Some(bad) = history.iter().find(|v| !v.is_finite()) {
            return Err(ForecastError::fit(format!("history contains non-finite value {}", bad)));
        }

        let layout = Layout::new(&self.config);
        let poly = differencing_polynomial(&self.config);
        let required = self.min_observations();
        if history.len() < required {
            return Err(ForecastError::fit(format!(
                "insufficient data for {}: need at least {} observations, got {}",
                self.config,
                required,
                history.len()
            )));
        }

        let w = apply_differencing(history, &poly);
        let start = layout.start_index();
        let cols = layout.columns();

        let proxies = if layout.ma_lags.is_empty() {
            Vec::new()
        } else {
            proxy_innovations(&w, layout.long_ar_order(), layout.include_mean)?
        };

        let (intercept, ar, ma) = if cols == 0 {
            (0.0, Vec::new(), Vec::new())
        } else {
            let rows = w.len() - start;
            let mut design = Vec::with_capacity(rows * cols);
            let mut target = Vec::with_capacity(rows);
            for t in start..w.len() {
                if layout.include_mean {
                    design.push(1.0);
                }
                design.extend(layout.ar_lags.iter().map(|lag| w[t - lag]));
                design.extend(layout.ma_lags.iter().map(|lag| proxies[t - lag]));
                target.push(w[t]);
            }
            let beta = least_squares(rows, cols, design, target)?;

            let mut idx = 0;
            let intercept = if layout.include_mean {
                idx = 1;
                beta[0]
            } else {
                0.0
            };
            let ar: Vec<(usize, f64)> = layout
                .ar_lags
                .iter()
                .map(|lag| {
                    let c = (*lag, beta[idx]);
                    idx += 1;
                    c
                })
                .collect();
            let ma: Vec<(usize, f64)> = layout
                .ma_lags
                .iter()
                .map(|lag| {
                    let c = (*lag, beta[idx]);
                    idx += 1;
                    c
                })
                .collect();
            (intercept, ar, ma)
        };

        let mut model = SarimaModel {
            config: self.config,
            intercept,
            ar,
            ma,
            diff_poly: poly,
            conditioning: layout.max_ar(),
            sigma2: 0.0,
            log_likelihood: 0.0,
            aic: 0.0,
            bic: 0.0,
            y: history.to_vec(),
            w: Vec::with_capacity(w.len()),
            resid: Vec::with_capacity(w.len()),
        };

        // Conditional residuals under the final coefficients.
        for value in w {
            let e = if model.w.len() >= model.conditioning {
                value - model.predict_next(&model.w, &model.resid)
            } else {
                0.0
            };
            if !e.is_finite() {
                return Err(ForecastError::fit(
                    "residual recursion diverged (non-invertible moving average)",
                ));
            }
            model.w.push(value);
            model.resid.push(e);
        }

        let n_eff = (model.w.len() - model.conditioning).max(1) as f64;
        let sigma2 = model.resid.iter().map(|e| e * e).sum::<f64>() / n_eff;
        let k = (cols + 1) as f64;
        let log_likelihood =
            -0.5 * n_eff * ((2.0 * std::f64::consts::PI * sigma2.max(f64::EPSILON)).ln() + 1.0);
        model.sigma2 = sigma2;
        model.log_likelihood = log_likelihood;
        model.aic = 2.0 * k - 2.0 * log_likelihood;
        model.bic = k * n_eff.ln() - 2.0 * log_likelihood;

        Ok(model)
    }
}

/// Estimated SARIMA model together with its conditioning data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SarimaModel {
    config: SarimaConfig,
    intercept: f64,
    /// `(lag, coefficient)` on the differenced series.
    ar: Vec<(usize, f64)>,
    /// `(lag, coefficient)` on past innovations.
    ma: Vec<(usize, f64)>,
    diff_poly: Vec<f64>,
    conditioning: usize,
    sigma2: f64,
    log_likelihood: f64,
    aic: f64,
    bic: f64,
    y: Vec<f64>,
    w: Vec<f64>,
    resid: Vec<f64>,
}

impl SarimaModel {
    pub fn config(&self) -> &SarimaConfig {
        &self.config
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn ar_coefficients(&self) -> &[(usize, f64)] {
        &self.ar
    }

    pub fn ma_coefficients(&self) -> &[(usize, f64)] {
        &self.ma
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn bic(&self) -> f64 {
        self.bic
    }

    /// Number of raw observations the model conditions on.
    pub fn nobs(&self) -> usize {
        self.y.len()
    }

    fn predict_next(&self, w: &[f64], resid: &[f64]) -> f64 {
        let t = w.len();
        let mut pred = self.intercept;
        for (lag, c) in &self.ar {
            if t >= *lag {
                pred += c * w[t - lag];
            }
        }
        for (lag, c) in &self.ma {
            if t >= *lag {
                pred += c * resid[t - lag];
            }
        }
        pred
    }

    /// Undo differencing: `y_t = w_t - sum_{k>=1} delta_k y_{t-k}`.
    fn integrate(&self, w_t: f64, y: &[f64]) -> f64 {
        let n = y.len();
        w_t - self
            .diff_poly
            .iter()
            .enumerate()
            .skip(1)
            .map(|(k, c)| c * y[n - k])
            .sum::<f64>()
    }
}

impl FittedModel for SarimaModel {
    fn forecast(&self, steps: usize) -> Result<Vec<f64>> {
        let mut y = self.y.clone();
        let mut w = self.w.clone();
        let mut resid = self.resid.clone();
        let mut out = Vec::with_capacity(steps);

        for _ in 0..steps {
            let w_hat = self.predict_next(&w, &resid);
            let y_hat = self.integrate(w_hat, &y);
            if !y_hat.is_finite() {
                return Err(ForecastError::fit("forecast produced a non-finite value"));
            }
            w.push(w_hat);
            resid.push(0.0);
            y.push(y_hat);
            out.push(y_hat);
        }
        Ok(out)
    }

    fn append(&mut self, observation: f64) -> Result<()> {
        if !observation.is_finite() {
            return Err(ForecastError::fit(format!(
                "cannot append non-finite observation {}",
                observation
            )));
        }
        let loss = self.diff_poly.len() - 1;
        self.y.push(observation);
        let n = self.y.len();
        if n <= loss {
            return Ok(());
        }
        let w_t: f64 = self
            .diff_poly
            .iter()
            .enumerate()
            .map(|(k, c)| c * self.y[n - 1 - k])
            .sum();
        let e = if self.w.len() >= self.conditioning {
            w_t - self.predict_next(&self.w, &self.resid)
        } else {
            0.0
        };
        self.w.push(w_t);
        self.resid.push(e);
        Ok(())
    }

    fn summary(&self) -> String {
        let mut s = format!("{} Model Summary\n", self.config);
        s.push_str(&"=".repeat(48));
        s.push('\n');
        s.push_str(&format!("Observations: {}\n", self.y.len()));
        s.push_str(&format!("Differenced observations: {}\n", self.w.len()));

        if !self.ar.is_empty() {
            s.push_str("AR coefficients:\n");
            for (lag, c) in &self.ar {
                s.push_str(&format!("  ar.L{:<4} = {:>12.6}\n", lag, c));
            }
        }
        if !self.ma.is_empty() {
            s.push_str("MA coefficients:\n");
            for (lag, c) in &self.ma {
                s.push_str(&format!("  ma.L{:<4} = {:>12.6}\n", lag, c));
            }
        }
        if self.config.order.d == 0 && self.config.seasonal_order.d == 0 {
            s.push_str(&format!("Intercept: {:.6}\n", self.intercept));
        }
        s.push_str(&format!("Sigma2: {:.6}\n", self.sigma2));
        s.push_str(&format!("Log likelihood: {:.3}\n", self.log_likelihood));
        s.push_str(&format!("AIC: {:.3}\n", self.aic));
        s.push_str(&format!("BIC: {:.3}\n", self.bic));
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelOrder, SeasonalOrder};

    /// Deterministic zero-mean noise in [-0.5, 0.5).
    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut x = seed;
        (0..n)
            .map(|_| {
                x = x
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (x >> 11) as f64 / (1u64 << 53) as f64 - 0.5
            })
            .collect()
    }

    fn sarima(order: (usize, usize, usize), seasonal: (usize, usize, usize, usize)) -> Sarima {
        Sarima::new(SarimaConfig::new(
            ModelOrder::new(order.0, order.1, order.2),
            SeasonalOrder::new(seasonal.0, seasonal.1, seasonal.2, seasonal.3),
        ))
        .unwrap()
    }

    #[test]
    fn test_expand_lags_multiplicative() {
        assert_eq!(expand_lags(2, 1, 28), vec![1, 2, 28, 29, 30]);
        assert_eq!(expand_lags(0, 1, 4), vec![4]);
        assert_eq!(expand_lags(1, 0, 0), vec![1]);
        assert!(expand_lags(0, 0, 0).is_empty());
    }

    #[test]
    fn test_layout_extent_matches_expanded_lags() {
        for (order, seasonal) in [
            ((2, 1, 3), (1, 0, 1, 28)),
            ((1, 0, 0), (0, 0, 0, 0)),
            ((0, 0, 0), (2, 1, 1, 4)),
        ] {
            let cfg = *sarima(order, seasonal).config();
            let layout = Layout::new(&cfg);
            assert_eq!(layout.max_ar(), layout.ar_lags.last().copied().unwrap_or(0));
            assert_eq!(layout.max_ma(), layout.ma_lags.last().copied().unwrap_or(0));
        }
    }

    #[test]
    fn test_differencing_polynomial() {
        let cfg = SarimaConfig::new(ModelOrder::new(0, 1, 0), SeasonalOrder::new(0, 1, 0, 4));
        // (1-B)(1-B^4) = 1 - B - B^4 + B^5
        assert_eq!(
            differencing_polynomial(&cfg),
            vec![1.0, -1.0, 0.0, 0.0, -1.0, 1.0]
        );
    }

    #[test]
    fn test_recovers_ar1_coefficient() {
        let e = noise(600, 7);
        let mut y = vec![0.0; e.len()];
        for t in 1..e.len() {
            y[t] = 0.6 * y[t - 1] + e[t];
        }
        let model = sarima((1, 0, 0), (0, 0, 0, 0)).fit(&y).unwrap();
        let (lag, phi) = model.ar_coefficients()[0];
        assert_eq!(lag, 1);
        assert!((phi - 0.6).abs() < 0.1, "phi = {}", phi);
        assert!(model.intercept().abs() < 0.1);
    }

    #[test]
    fn test_recovers_ma1_coefficient() {
        let e = noise(1200, 11);
        let y: Vec<f64> = (1..e.len()).map(|t| e[t] + 0.5 * e[t - 1]).collect();
        let model = sarima((0, 0, 1), (0, 0, 0, 0)).fit(&y).unwrap();
        let (lag, theta) = model.ma_coefficients()[0];
        assert_eq!(lag, 1);
        assert!((theta - 0.5).abs() < 0.2, "theta = {}", theta);
        assert!(model.forecast(5).unwrap().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_random_walk_forecasts_last_value() {
        let y = vec![3.0, 5.0, 4.0, 8.0, 7.5];
        let model = sarima((0, 1, 0), (0, 0, 0, 0)).fit(&y).unwrap();
        assert_eq!(model.forecast(3).unwrap(), vec![7.5, 7.5, 7.5]);
    }

    #[test]
    fn test_accepts_trending_series() {
        let y: Vec<f64> = (0..40).map(|t| 2.0 * t as f64).collect();
        let model = sarima((1, 1, 0), (0, 0, 0, 0)).fit(&y).unwrap();
        let f = model.forecast(2).unwrap();
        assert!((f[0] - 80.0).abs() < 1e-6, "got {}", f[0]);
        assert!((f[1] - 82.0).abs() < 1e-6, "got {}", f[1]);
    }

    #[test]
    fn test_seasonal_difference_repeats_pattern() {
        let pattern = [10.0, 20.0, 15.0, 5.0];
        let y: Vec<f64> = (0..24).map(|t| pattern[t % 4]).collect();
        let model = sarima((0, 0, 0), (0, 1, 0, 4)).fit(&y).unwrap();
        let f = model.forecast(4).unwrap();
        for (got, want) in f.iter().zip(pattern.iter()) {
            assert!((got - want).abs() < 1e-9);
        }
    }

    #[test]
    fn test_append_extends_conditioning_data() {
        let mut model = sarima((0, 1, 0), (0, 0, 0, 0))
            .fit(&[1.0, 2.0, 3.0])
            .unwrap();
        model.append(10.0).unwrap();
        assert_eq!(model.nobs(), 4);
        assert_eq!(model.forecast_one().unwrap(), 10.0);
        assert!(model.append(f64::NAN).is_err());
    }

    #[test]
    fn test_insufficient_data_is_fit_error() {
        let err = sarima((2, 1, 3), (1, 0, 1, 28)).fit(&[1.0; 20]).unwrap_err();
        assert!(matches!(err, ForecastError::Fit(_)));
        assert!(err.to_string().contains("insufficient data"));
    }

    #[test]
    fn test_non_finite_history_is_fit_error() {
        let err = sarima((1, 0, 0), (0, 0, 0, 0))
            .fit(&[1.0, f64::INFINITY, 2.0])
            .unwrap_err();
        assert!(matches!(err, ForecastError::Fit(_)));
    }

    #[test]
    fn test_invalid_seasonal_period_rejected() {
        let cfg = SarimaConfig::new(ModelOrder::new(1, 0, 0), SeasonalOrder::new(1, 0, 0, 0));
        assert!(matches!(Sarima::new(cfg), Err(ForecastError::Config(_))));
    }

    #[test]
    fn test_summary_and_serde_roundtrip() {
        let e = noise(200, 3);
        let model = sarima((1, 0, 0), (0, 0, 0, 0)).fit(&e).unwrap();
        let summary = model.summary();
        assert!(summary.contains("SARIMA(1,0,0)x(0,0,0,0)"));
        assert!(summary.contains("ar.L1"));
        assert!(summary.contains("AIC"));

        let json = serde_json::to_string(&model).unwrap();
        let back: SarimaModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.forecast(3).unwrap(), model.forecast(3).unwrap());
    }

    #[test]
    fn test_fit_is_deterministic() {
        let e = noise(300, 5);
        let f = sarima((2, 0, 1), (0, 0, 0, 0));
        let a = f.fit(&e).unwrap().forecast(4).unwrap();
        let b = f.fit(&e).unwrap().forecast(4).unwrap();
        assert_eq!(a, b);
    }
}
