//! 다목적 전략 파라미터 최적화 엔진.
//!
//! 이 crate는 다음을 제공합니다:
//! - 전략 블록에서 탐색 공간 추출
//! - 베이지안 최적화와 유전 알고리즘 두 가지 탐색 전략
//! - 파레토 프런티어 관리와 워크포워드 과최적화 검증
//! - 제한된 워커 풀, 평가 캐시, 취소를 갖춘 실행 오케스트레이터
//!
//! # 예제
//!
//! ```rust,ignore
//! use trader_optimizer::{Algorithm, BacktestWindow, Objective, OptimizationConfig, StrategyOptimizer};
//!
//! let optimizer = StrategyOptimizer::new(runner);
//! let config = OptimizationConfig::new(
//!     Algorithm::Bayesian,
//!     vec![Objective::SharpeRatio, Objective::MaxDrawdown],
//!     BacktestWindow::new(start, end),
//! );
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! // 수신 측은 별도 태스크에서 소비
//! let printer = tokio::spawn(async move {
//!     while let Some(progress) = rx.recv().await {
//!         println!("{}/{}", progress.iteration, progress.max_iterations);
//!     }
//! });
//!
//! let result = optimizer.optimize(&blocks, config, Some(tx)).await?;
//! printer.await?;
//! println!("{}", result.summary());
//! ```

pub mod block;
pub mod cache;
pub mod config;
pub mod error;
pub mod objective;
pub mod orchestrator;
pub mod pareto;
pub mod params;
pub mod report;
pub mod scorer;
pub mod search;
pub mod solution;
pub mod walk_forward;
pub mod worker;

// 주요 타입 재내보내기
pub use block::{apply_parameters, ParameterSet, StrategyBlock};
pub use cache::{CachedOutcome, EvaluationCache};
pub use config::{
    Algorithm, BacktestWindow, BayesianSettings, GeneticSettings, OptimizationConfig,
    RebalanceInterval, WalkForwardSettings,
};
pub use error::{OptimizerError, Result};
pub use objective::{Direction, Objective, ObjectiveScores};
pub use orchestrator::StrategyOptimizer;
pub use pareto::{crowding_distance, dominates, non_dominated_sort, pareto_front, ParetoFrontier};
pub use params::{extract, is_tunable_block_type, ParameterDefinition, ParameterKind, ParameterSpace, MAX_PARAMETERS};
pub use report::{OptimizationProgress, OptimizationResult, ProgressPhase};
pub use scorer::{BacktestMetrics, BacktestRequest, BacktestRunner, Evaluation, ObjectiveScorer};
// 탐색 전략
pub use search::{
    create_strategy, BayesianOptimizer, BayesianPhase, GeneticOptimizer, Observation,
    SearchStrategy,
};
pub use solution::{Degradation, OptimizationSolution};
pub use walk_forward::{DateRange, WalkForwardValidator, WalkForwardWindow};
pub use worker::{EvaluationBatch, EvaluationOutcome, EvaluationRequest, EvaluationResponse, WorkerPool};
