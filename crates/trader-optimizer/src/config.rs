//! 최적화 실행 설정.
//!
//! # 사용 예시
//!
//! ```rust,ignore
//! use trader_optimizer::{Algorithm, BacktestWindow, Objective, OptimizationConfig};
//!
//! let config = OptimizationConfig::new(
//!     Algorithm::Genetic,
//!     vec![Objective::SharpeRatio, Objective::MaxDrawdown],
//!     BacktestWindow::new(start, end),
//! )
//! .with_max_iterations(30)
//! .with_seed(42);
//!
//! config.validate()?;
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::{OptimizerError, Result},
    objective::Objective,
    params::ParameterDefinition,
};

/// 탐색 알고리즘.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// 서로게이트 모델 기반 (가우시안 프로세스)
    Bayesian,
    /// 개체군 기반 (NSGA-II 스타일)
    Genetic,
}

impl Algorithm {
    /// 알고리즘별 기본 반복 횟수.
    ///
    /// 유전 알고리즘은 더 넓게 탐색하는 대신 더 많은 평가가 필요합니다.
    pub fn default_max_iterations(self) -> usize {
        match self {
            Algorithm::Bayesian => 50,
            Algorithm::Genetic => 100,
        }
    }

    /// 문자열에서 파싱.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bayesian" | "bayes" | "gp" => Some(Self::Bayesian),
            "genetic" | "ga" | "nsga2" => Some(Self::Genetic),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Bayesian => write!(f, "bayesian"),
            Algorithm::Genetic => write!(f, "genetic"),
        }
    }
}

/// 백테스트 리밸런싱 주기.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceInterval {
    Hourly,
    #[default]
    Daily,
    Weekly,
}

/// 전체 백테스트 기간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestWindow {
    /// 시작 시각
    pub start_date: DateTime<Utc>,
    /// 종료 시각
    pub end_date: DateTime<Utc>,
}

impl BacktestWindow {
    /// 새 기간 생성.
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            start_date,
            end_date,
        }
    }
}

/// 베이지안 최적화 설정.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianSettings {
    /// 워밍업 후보 수 (라틴 하이퍼큐브)
    #[serde(default = "default_warmup_size")]
    pub warmup_size: usize,

    /// 획득 함수를 평가할 무작위 샘플 수
    #[serde(default = "default_acquisition_samples")]
    pub acquisition_samples: usize,

    /// Expected Improvement 탐험 계수 (xi)
    #[serde(default = "default_exploration")]
    pub exploration: f64,

    /// RBF 커널 길이 척도 (단위 초입방체 기준, 미설정 시 차원 기반 자동)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length_scale: Option<f64>,
}

/// 유전 알고리즘 설정.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneticSettings {
    /// 개체군 크기
    #[serde(default = "default_population_size")]
    pub population_size: usize,

    /// 파라미터별 돌연변이 확률 (예: 0.1 = 10%)
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,

    /// 돌연변이 표준편차 (범위 대비 비율)
    #[serde(default = "default_mutation_scale")]
    pub mutation_scale: f64,

    /// 토너먼트 크기
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
}

/// 워크포워드 검증 설정.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSettings {
    /// 검증 구간 비율 (기본: 마지막 1/6)
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    /// 과최적화 판정 기준 성능 저하율 (%)
    #[serde(default = "default_overfit_threshold_pct")]
    pub overfit_threshold_pct: f64,
}

/// 최적화 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// 탐색 알고리즘
    pub algorithm: Algorithm,

    /// 최적화 목표 (2개 이상, 첫 번째가 주 목표)
    pub objectives: Vec<Objective>,

    /// 최대 반복 횟수 (미설정 시 알고리즘 기본값, 0이면 즉시 종료)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,

    /// 명시적 탐색 공간 (미설정 시 블록에서 추출)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<ParameterDefinition>>,

    /// 백테스트 기간
    pub backtest_window: BacktestWindow,

    /// 초기 자본금
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Decimal,

    /// 리밸런싱 주기
    #[serde(default)]
    pub rebalance_interval: RebalanceInterval,

    /// 베이지안 최적화 설정
    #[serde(default)]
    pub bayesian: BayesianSettings,

    /// 유전 알고리즘 설정
    #[serde(default)]
    pub genetic: GeneticSettings,

    /// 워크포워드 검증 설정
    #[serde(default)]
    pub walk_forward: WalkForwardSettings,

    /// 최대 동시 워커 수 (미설정 시 CPU 병렬도)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,

    /// 평가 캐시 최대 항목 수
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// 난수 시드 (재현 가능한 실행용)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

// 설정 기본값 함수들 (serde default용)
fn default_warmup_size() -> usize {
    5
}
fn default_acquisition_samples() -> usize {
    512
}
fn default_exploration() -> f64 {
    0.01
}
fn default_population_size() -> usize {
    20
}
fn default_mutation_rate() -> f64 {
    0.1
} // 10%
fn default_mutation_scale() -> f64 {
    0.1
}
fn default_tournament_size() -> usize {
    2
}
fn default_test_fraction() -> f64 {
    1.0 / 6.0
}
fn default_overfit_threshold_pct() -> f64 {
    50.0
}
fn default_initial_capital() -> Decimal {
    Decimal::new(10_000, 0)
}
fn default_cache_capacity() -> usize {
    1024
}

impl Default for BayesianSettings {
    fn default() -> Self {
        Self {
            warmup_size: default_warmup_size(),
            acquisition_samples: default_acquisition_samples(),
            exploration: default_exploration(),
            length_scale: None,
        }
    }
}

impl Default for GeneticSettings {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            mutation_rate: default_mutation_rate(),
            mutation_scale: default_mutation_scale(),
            tournament_size: default_tournament_size(),
        }
    }
}

impl Default for WalkForwardSettings {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            overfit_threshold_pct: default_overfit_threshold_pct(),
        }
    }
}

impl OptimizationConfig {
    /// 새 최적화 설정을 생성합니다.
    pub fn new(
        algorithm: Algorithm,
        objectives: Vec<Objective>,
        backtest_window: BacktestWindow,
    ) -> Self {
        Self {
            algorithm,
            objectives,
            max_iterations: None,
            parameters: None,
            backtest_window,
            initial_capital: default_initial_capital(),
            rebalance_interval: RebalanceInterval::default(),
            bayesian: BayesianSettings::default(),
            genetic: GeneticSettings::default(),
            walk_forward: WalkForwardSettings::default(),
            max_workers: None,
            cache_capacity: default_cache_capacity(),
            seed: None,
        }
    }

    /// 최대 반복 횟수 설정
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// 명시적 탐색 공간 설정
    pub fn with_parameters(mut self, parameters: Vec<ParameterDefinition>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// 초기 자본금 설정
    pub fn with_initial_capital(mut self, capital: Decimal) -> Self {
        self.initial_capital = capital;
        self
    }

    /// 최대 워커 수 설정
    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    /// 난수 시드 설정
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 개체군 크기 설정
    pub fn with_population_size(mut self, size: usize) -> Self {
        self.genetic.population_size = size;
        self
    }

    /// 워밍업 크기 설정
    pub fn with_warmup_size(mut self, size: usize) -> Self {
        self.bayesian.warmup_size = size;
        self
    }

    /// 실제로 사용할 최대 반복 횟수.
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
            .unwrap_or_else(|| self.algorithm.default_max_iterations())
    }

    /// 주 목표 (목표 목록의 첫 번째).
    pub fn primary_objective(&self) -> Option<Objective> {
        self.objectives.first().copied()
    }

    /// 실제로 사용할 워커 수.
    pub fn worker_count(&self) -> usize {
        self.max_workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            })
            .max(1)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.objectives.len() < 2 {
            return Err(OptimizerError::Config(format!(
                "최적화 목표는 2개 이상이어야 합니다 (현재 {}개)",
                self.objectives.len()
            )));
        }
        for (i, objective) in self.objectives.iter().enumerate() {
            if self.objectives[..i].contains(objective) {
                return Err(OptimizerError::Config(format!(
                    "중복된 최적화 목표: {}",
                    objective
                )));
            }
        }
        if self.backtest_window.end_date <= self.backtest_window.start_date {
            return Err(OptimizerError::Window(
                "종료 시각은 시작 시각 이후여야 합니다".to_string(),
            ));
        }
        if self.initial_capital <= Decimal::ZERO {
            return Err(OptimizerError::Config(
                "초기 자본은 0보다 커야 합니다".to_string(),
            ));
        }
        if self.max_workers == Some(0) {
            return Err(OptimizerError::Config(
                "워커 수는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.bayesian.warmup_size == 0 {
            return Err(OptimizerError::Config(
                "워밍업 크기는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.bayesian.acquisition_samples == 0 {
            return Err(OptimizerError::Config(
                "획득 함수 샘플 수는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.genetic.population_size < 2 {
            return Err(OptimizerError::Config(
                "개체군 크기는 2 이상이어야 합니다".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.genetic.mutation_rate) {
            return Err(OptimizerError::Config(
                "돌연변이 확률은 0과 1 사이여야 합니다".to_string(),
            ));
        }
        if self.genetic.mutation_scale <= 0.0 || self.genetic.tournament_size == 0 {
            return Err(OptimizerError::Config(
                "돌연변이 척도와 토너먼트 크기는 0보다 커야 합니다".to_string(),
            ));
        }
        let fraction = self.walk_forward.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(OptimizerError::Config(format!(
                "검증 구간 비율은 0과 1 사이여야 합니다 (현재 {})",
                fraction
            )));
        }
        if self.cache_capacity == 0 {
            return Err(OptimizerError::Config(
                "캐시 용량은 1 이상이어야 합니다".to_string(),
            ));
        }
        Ok(())
    }
}
