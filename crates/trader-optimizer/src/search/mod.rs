//! 탐색 전략 모듈
//!
//! 오케스트레이터는 [`SearchStrategy`]에 후보 묶음을 요청하고, 평가 결과를
//! 같은 순서로 되돌려줍니다.
//!
//! # 주요 구성요소
//!
//! - [`BayesianOptimizer`]: 워밍업 후 가우시안 프로세스 서로게이트 기반 탐색
//! - [`GeneticOptimizer`]: NSGA-II 스타일 개체군 탐색
//! - [`gaussian_process`]: 서로게이트 모델과 Expected Improvement

pub mod bayesian;
pub mod gaussian_process;
pub mod genetic;

pub use bayesian::{BayesianOptimizer, BayesianPhase};
pub use genetic::GeneticOptimizer;

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    block::ParameterSet,
    config::{Algorithm, OptimizationConfig},
    objective::ObjectiveScores,
    params::ParameterSpace,
};

/// 후보 하나의 평가 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// 평가한 후보
    pub parameters: ParameterSet,
    /// 학습 구간 점수 (평가 실패 시 `None`)
    pub scores: Option<ObjectiveScores>,
}

impl Observation {
    /// 성공한 평가.
    pub fn scored(parameters: ParameterSet, scores: ObjectiveScores) -> Self {
        Self {
            parameters,
            scores: Some(scores),
        }
    }

    /// 실패한 평가.
    pub fn failed(parameters: ParameterSet) -> Self {
        Self {
            parameters,
            scores: None,
        }
    }
}

/// 탐색 전략 공통 인터페이스.
///
/// `next_batch()`로 받은 후보들의 결과는 같은 순서로 `observe()`에 전달되어야
/// 합니다. 반복 횟수의 단위는 전략마다 다릅니다 (베이지안: 평가한 후보 수,
/// 유전: 세대 수).
pub trait SearchStrategy: Send {
    /// 전략 이름.
    fn name(&self) -> &'static str;

    /// 다음에 평가할 후보 묶음 (종료되었으면 빈 벡터).
    fn next_batch(&mut self) -> Vec<ParameterSet>;

    /// 직전 묶음의 평가 결과 반영.
    fn observe(&mut self, observations: &[Observation]);

    /// 종료 조건 도달 여부.
    fn is_finished(&self) -> bool;

    /// 완료한 반복 횟수.
    fn iterations_completed(&self) -> usize;

    /// 최대 반복 횟수.
    fn max_iterations(&self) -> usize;
}

/// 설정에 맞는 탐색 전략 생성.
///
/// 시드가 있으면 같은 설정과 같은 평가 결과에 대해 같은 후보 순서를 냅니다.
pub fn create_strategy(config: &OptimizationConfig, space: ParameterSpace) -> Box<dyn SearchStrategy> {
    let rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let max_iterations = config.max_iterations();

    match config.algorithm {
        Algorithm::Bayesian => Box::new(BayesianOptimizer::new(
            space,
            config.objectives.clone(),
            config.bayesian.clone(),
            max_iterations,
            rng,
        )),
        Algorithm::Genetic => Box::new(GeneticOptimizer::new(
            space,
            config.objectives.clone(),
            config.genetic.clone(),
            max_iterations,
            rng,
        )),
    }
}
