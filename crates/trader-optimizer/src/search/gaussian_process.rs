//! 가우시안 프로세스 서로게이트.
//!
//! 단위 초입방체 입력에 대한 RBF(제곱 지수) 커널, 표준화된 목표값,
//! 촐레스키 분해로 학습합니다. 목표값은 작을수록 좋은 비용입니다.

use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use crate::error::{OptimizerError, Result};

/// 행렬이 양의 정부호가 될 때까지 순서대로 시도하는 대각 지터
const JITTER_STEPS: [f64; 5] = [1e-10, 1e-8, 1e-6, 1e-4, 1e-2];

/// 관측 잡음 분산 (표준화 스케일)
const NOISE_VARIANCE: f64 = 1e-6;

/// 학습된 가우시안 프로세스.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    inputs: Vec<Vec<f64>>,
    /// 하삼각 촐레스키 인자 (행 우선, n × n)
    chol: Vec<f64>,
    /// K⁻¹ y (표준화 스케일)
    alpha: Vec<f64>,
    length_scale: f64,
    y_mean: f64,
    y_std: f64,
}

impl GaussianProcess {
    /// 관측값으로 모델 학습.
    pub fn fit(inputs: Vec<Vec<f64>>, targets: &[f64], length_scale: f64) -> Result<Self> {
        let n = inputs.len();
        if n == 0 || n != targets.len() {
            return Err(OptimizerError::Surrogate(format!(
                "입력 {}개와 목표값 {}개가 맞지 않습니다",
                n,
                targets.len()
            )));
        }
        if !(length_scale.is_finite() && length_scale > 0.0) {
            return Err(OptimizerError::Surrogate(format!(
                "잘못된 길이 척도: {}",
                length_scale
            )));
        }
        if targets.iter().any(|y| !y.is_finite()) {
            return Err(OptimizerError::Surrogate("유한하지 않은 목표값".to_string()));
        }

        let y_mean = targets.iter().sum::<f64>() / n as f64;
        let variance = targets.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / n as f64;
        let y_std = if variance.sqrt() > 1e-12 { variance.sqrt() } else { 1.0 };
        let y: Vec<f64> = targets.iter().map(|t| (t - y_mean) / y_std).collect();

        let mut kernel = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..=i {
                let k = rbf(&inputs[i], &inputs[j], length_scale);
                kernel[i * n + j] = k;
                kernel[j * n + i] = k;
            }
        }

        let chol = JITTER_STEPS
            .iter()
            .find_map(|jitter| cholesky(&kernel, n, NOISE_VARIANCE + jitter))
            .ok_or_else(|| {
                OptimizerError::Surrogate("커널 행렬이 양의 정부호가 아닙니다".to_string())
            })?;

        let alpha = back_substitute(&chol, n, &forward_substitute(&chol, n, &y));

        Ok(Self {
            inputs,
            chol,
            alpha,
            length_scale,
            y_mean,
            y_std,
        })
    }

    /// 학습 데이터 수.
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// 학습 데이터가 비어있는지 여부 (학습에 성공했다면 항상 `false`).
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// 예측 평균과 표준편차 (원래 스케일).
    pub fn predict(&self, point: &[f64]) -> (f64, f64) {
        let n = self.inputs.len();
        let k_star: Vec<f64> = self
            .inputs
            .iter()
            .map(|x| rbf(x, point, self.length_scale))
            .collect();

        let mean: f64 = k_star.iter().zip(&self.alpha).map(|(k, a)| k * a).sum();
        let v = forward_substitute(&self.chol, n, &k_star);
        let variance = (1.0 + NOISE_VARIANCE - v.iter().map(|x| x * x).sum::<f64>()).max(1e-12);

        (mean * self.y_std + self.y_mean, variance.sqrt() * self.y_std)
    }
}

/// 최소화 문제의 Expected Improvement.
///
/// `best`는 지금까지 관측된 가장 작은 비용, `xi`는 탐험 계수입니다.
pub fn expected_improvement(mean: f64, std: f64, best: f64, xi: f64) -> f64 {
    let improvement = best - mean - xi;
    if std <= 1e-12 {
        return improvement.max(0.0);
    }

    let z = improvement / std;
    match Normal::new(0.0, 1.0) {
        Ok(normal) => (improvement * normal.cdf(z) + std * normal.pdf(z)).max(0.0),
        Err(_) => improvement.max(0.0),
    }
}

fn rbf(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (-0.5 * sq / (length_scale * length_scale)).exp()
}

/// A + jitter·I = L Lᵀ (실패 시 `None`).
fn cholesky(a: &[f64], n: usize, jitter: f64) -> Option<Vec<f64>> {
    let mut l = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[i * n + j];
            if i == j {
                sum += jitter;
            }
            for k in 0..j {
                sum -= l[i * n + k] * l[j * n + k];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i * n + j] = sum.sqrt();
            } else {
                l[i * n + j] = sum / l[j * n + j];
            }
        }
    }
    Some(l)
}

/// L x = b
fn forward_substitute(l: &[f64], n: usize, b: &[f64]) -> Vec<f64> {
    let mut x = vec![0.0; n];
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * x[j];
        }
        x[i] = sum / l[i * n + i];
    }
    x
}

/// Lᵀ x = y
fn back_substitute(l: &[f64], n: usize, y: &[f64]) -> Vec<f64> {
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[j * n + i] * x[j];
        }
        x[i] = sum / l[i * n + i];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolates_training_points() {
        let inputs = vec![vec![0.0], vec![0.5], vec![1.0]];
        let targets = [1.0, 0.0, 1.0];
        let gp = GaussianProcess::fit(inputs, &targets, 0.3).unwrap();

        let (mean, std) = gp.predict(&[0.5]);
        assert!((mean - 0.0).abs() < 1e-2);
        assert!(std < 1e-2);

        // 학습 데이터에서 멀어질수록 불확실성 증가
        let (_, far_std) = gp.predict(&[0.25]);
        assert!(far_std > std);
    }

    #[test]
    fn test_duplicate_inputs_fit_with_jitter() {
        let inputs = vec![vec![0.2, 0.2], vec![0.2, 0.2], vec![0.8, 0.1]];
        let gp = GaussianProcess::fit(inputs, &[1.0, 1.0, 3.0], 0.5);
        assert!(gp.is_ok());
        assert_eq!(gp.unwrap().len(), 3);
    }

    #[test]
    fn test_constant_targets() {
        let gp = GaussianProcess::fit(vec![vec![0.1], vec![0.9]], &[2.0, 2.0], 0.5).unwrap();
        let (mean, _) = gp.predict(&[0.5]);
        assert!((mean - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(GaussianProcess::fit(vec![], &[], 0.5).is_err());
        assert!(GaussianProcess::fit(vec![vec![0.0]], &[f64::NAN], 0.5).is_err());
        assert!(GaussianProcess::fit(vec![vec![0.0]], &[1.0], 0.0).is_err());
    }

    #[test]
    fn test_expected_improvement_prefers_low_mean_and_uncertainty() {
        let certain_better = expected_improvement(0.0, 1e-15, 1.0, 0.0);
        assert!((certain_better - 1.0).abs() < 1e-12);

        assert_eq!(expected_improvement(2.0, 0.0, 1.0, 0.0), 0.0);

        let uncertain = expected_improvement(1.0, 1.0, 1.0, 0.0);
        let confident = expected_improvement(1.0, 0.1, 1.0, 0.0);
        assert!(uncertain > confident);
        assert!(uncertain > 0.0);
    }
}
