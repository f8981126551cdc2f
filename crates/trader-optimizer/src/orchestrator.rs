//! 최적화 실행 오케스트레이터.
//!
//! # 반복 루프
//!
//! ```text
//! optimize()
//! ├── 설정 검증 / 탐색 공간 확정 / 구간 분할   (실패 시 즉시 오류)
//! └── loop
//!     ├── 취소 확인
//!     ├── SearchStrategy::next_batch()
//!     ├── 캐시 조회 (fingerprint, 배치 내 중복은 한 번만 평가)
//!     ├── WorkerPool::spawn_batch()  ──> 완료 순서대로 Evaluating 진행 이벤트
//!     ├── 해 기록 / 캐시 저장 / SearchStrategy::observe()
//!     ├── ParetoFrontier::recompute()
//!     ├── WalkForwardValidator::revalidate()
//!     └── 반복 카운터 갱신 ──> BatchComplete 진행 이벤트
//! ```
//!
//! 캐시, 해 목록, 프런티어는 이 루프에서만 변경됩니다.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant,
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    block::{ParameterSet, StrategyBlock},
    cache::{CachedOutcome, EvaluationCache},
    config::OptimizationConfig,
    error::{OptimizerError, Result},
    objective::ObjectiveScores,
    params::{extract, ParameterSpace},
    pareto::ParetoFrontier,
    report::{OptimizationProgress, OptimizationResult, ProgressPhase, MAX_RECORDED_ERRORS},
    scorer::{BacktestRunner, ObjectiveScorer},
    search::{create_strategy, Observation},
    solution::OptimizationSolution,
    walk_forward::{WalkForwardValidator, WalkForwardWindow},
    worker::{EvaluationOutcome, EvaluationRequest, WorkerPool},
};

/// 전략 파라미터 최적화기.
///
/// 인스턴스 하나가 실행 하나를 담당하며, 취소 토큰을 소유합니다.
pub struct StrategyOptimizer {
    runner: Arc<dyn BacktestRunner>,
    cancel: CancellationToken,
}

impl StrategyOptimizer {
    /// 백테스트 협력자로 최적화기 생성.
    pub fn new(runner: Arc<dyn BacktestRunner>) -> Self {
        Self {
            runner,
            cancel: CancellationToken::new(),
        }
    }

    /// 실행 중단 요청.
    ///
    /// 다음 배치 전에 루프가 멈추고, 아직 시작하지 않은 평가는 취소됩니다.
    /// 이미 실행 중인 백테스트는 끝까지 실행됩니다.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("최적화 중단 요청");
        }
        self.cancel.cancel();
    }

    /// 중단 요청 여부.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 외부에서 중단을 연결하기 위한 토큰 사본 (예: Ctrl+C 처리).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 최적화 실행.
    ///
    /// 설정 오류는 평가 전에 `Err`로 반환됩니다. 모든 평가가 실패한 경우와
    /// 중단된 경우는 `Ok`이며, 각각 `error`와 `cancelled`로 구분합니다.
    pub async fn optimize(
        &self,
        blocks: &[StrategyBlock],
        config: OptimizationConfig,
        progress: Option<mpsc::Sender<OptimizationProgress>>,
    ) -> Result<OptimizationResult> {
        config.validate()?;
        let space = resolve_space(blocks, &config)?;
        let window = WalkForwardWindow::split(&config.backtest_window, config.walk_forward.test_fraction)?;
        let primary = config
            .primary_objective()
            .ok_or_else(|| OptimizerError::Config("최적화 목표가 없습니다".to_string()))?;

        let worker_count = config.worker_count();
        let max_iterations = config.max_iterations();

        if max_iterations == 0 {
            info!("최대 반복 횟수가 0이므로 평가 없이 종료");
            return Ok(OptimizationResult::empty(config, worker_count));
        }

        info!(
            algorithm = %config.algorithm,
            dimensions = space.dimensions(),
            objectives = config.objectives.len(),
            max_iterations,
            workers = worker_count,
            train_end = %window.train_end,
            "최적화 시작"
        );

        let scorer = ObjectiveScorer::new(
            self.runner.clone(),
            config.initial_capital,
            config.rebalance_interval,
        );
        let pool = WorkerPool::new(Arc::new(scorer), worker_count);
        let validator = WalkForwardValidator::new(window, primary, config.walk_forward.overfit_threshold_pct);
        let shared_blocks = Arc::new(blocks.to_vec());
        let mut strategy = create_strategy(&config, space);
        let mut run = RunState::new(config, max_iterations, progress, self.cancel.clone());
        let mut cancelled = false;

        loop {
            if self.is_stopped() {
                cancelled = true;
                break;
            }
            if strategy.is_finished() {
                break;
            }

            let batch = strategy.next_batch();
            if batch.is_empty() {
                debug!(strategy = strategy.name(), "더 이상 제안할 후보 없음");
                break;
            }

            let fingerprints: Vec<String> = batch.iter().map(ParameterSet::fingerprint).collect();
            let mut resolved: Vec<Option<CachedOutcome>> = vec![None; batch.len()];
            let mut fresh = vec![false; batch.len()];
            let mut aliases: Vec<(usize, usize)> = Vec::new();
            let mut first_seen: HashMap<&str, usize> = HashMap::new();
            let mut requests = Vec::new();

            for (i, candidate) in batch.iter().enumerate() {
                let fingerprint = fingerprints[i].as_str();
                if let Some(&first) = first_seen.get(fingerprint) {
                    aliases.push((i, first));
                    continue;
                }
                first_seen.insert(fingerprint, i);

                if let Some(outcome) = run.cache.lookup(fingerprint) {
                    resolved[i] = Some(outcome);
                    run.completed_evaluations += 1;
                    run.publish(ProgressPhase::Evaluating, pool.active_workers()).await;
                    continue;
                }

                fresh[i] = true;
                requests.push(EvaluationRequest {
                    id: i,
                    blocks: shared_blocks.clone(),
                    parameters: candidate.clone(),
                    range: validator.window().train(),
                });
            }

            debug!(
                batch = batch.len(),
                dispatched = requests.len(),
                duplicates = aliases.len(),
                "배치 평가 시작"
            );

            let mut interrupted = false;
            let mut evaluations = pool.spawn_batch(requests, &self.cancel);
            while let Some(response) = evaluations.next().await {
                match response.outcome {
                    EvaluationOutcome::Scored(scores) => {
                        resolved[response.id] = Some(CachedOutcome::Scored(scores));
                    }
                    EvaluationOutcome::Failed(message) => {
                        warn!(candidate = response.id, error = %message, "후보 평가 실패");
                        run.record_error(message.clone());
                        resolved[response.id] = Some(CachedOutcome::Failed(message));
                    }
                    EvaluationOutcome::Cancelled => {
                        interrupted = true;
                        continue;
                    }
                }
                run.completed_evaluations += 1;
                run.publish(ProgressPhase::Evaluating, pool.active_workers()).await;
            }

            for (i, first) in aliases {
                resolved[i] = resolved[first].clone();
                if resolved[i].is_some() {
                    run.completed_evaluations += 1;
                }
            }

            let mut observations = Vec::with_capacity(batch.len());
            for (i, candidate) in batch.into_iter().enumerate() {
                let Some(outcome) = resolved[i].take() else {
                    continue;
                };
                if fresh[i] {
                    run.cache.insert(fingerprints[i].clone(), outcome.clone());
                }
                match outcome {
                    CachedOutcome::Scored(scores) => {
                        run.record_solution(&fingerprints[i], &candidate, &scores);
                        observations.push(Observation::scored(candidate, scores));
                    }
                    CachedOutcome::Failed(_) => {
                        run.failed_evaluations += 1;
                        observations.push(Observation::failed(candidate));
                    }
                }
            }

            run.frontier.recompute(&mut run.solutions);

            // 취소로 끝까지 평가되지 못한 배치는 반복으로 세지 않음
            if interrupted || self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            strategy.observe(&observations);

            let revalidation_errors = validator
                .revalidate(&mut run.solutions, &pool, &shared_blocks, &self.cancel)
                .await;
            for message in revalidation_errors {
                run.record_error(message);
            }

            run.iteration = strategy.iterations_completed();
            info!(
                iteration = run.iteration,
                max_iterations,
                solutions = run.solutions.len(),
                frontier = run.frontier.members().len(),
                "최적화 반복 완료"
            );
            run.publish(ProgressPhase::BatchComplete, pool.active_workers()).await;
        }

        let result = run.finish(cancelled, pool.max_workers());
        match &result.error {
            Some(error) => warn!(error = %error, "최적화 실패"),
            None => info!(
                iterations = result.total_iterations,
                solutions = result.solutions.len(),
                frontier = result.pareto_frontier.len(),
                cache_hit_rate = result.cache_hit_rate,
                elapsed_secs = result.total_time_seconds,
                cancelled = result.cancelled,
                "최적화 완료"
            ),
        }
        Ok(result)
    }
}

impl std::fmt::Debug for StrategyOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyOptimizer")
            .field("stopped", &self.cancel.is_cancelled())
            .finish()
    }
}

/// 명시적 탐색 공간이 있으면 검증하여 사용하고, 없으면 블록에서 추출.
fn resolve_space(blocks: &[StrategyBlock], config: &OptimizationConfig) -> Result<ParameterSpace> {
    let definitions = match &config.parameters {
        Some(definitions) => definitions.clone(),
        None => extract(blocks),
    };
    let space = ParameterSpace::new(definitions)?;
    if space.is_empty() {
        return Err(OptimizerError::EmptyParameterSpace);
    }
    Ok(space)
}

/// 실행 하나의 변경 가능한 상태.
struct RunState {
    config: OptimizationConfig,
    cache: EvaluationCache,
    solutions: Vec<OptimizationSolution>,
    recorded: HashSet<String>,
    frontier: ParetoFrontier,
    errors: Vec<String>,
    last_error: Option<String>,
    iteration: usize,
    max_iterations: usize,
    completed_evaluations: usize,
    failed_evaluations: usize,
    started: Instant,
    progress: Option<mpsc::Sender<OptimizationProgress>>,
    cancel: CancellationToken,
}

impl RunState {
    fn new(
        config: OptimizationConfig,
        max_iterations: usize,
        progress: Option<mpsc::Sender<OptimizationProgress>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cache: EvaluationCache::new(config.cache_capacity),
            frontier: ParetoFrontier::new(config.objectives.clone()),
            config,
            solutions: Vec::new(),
            recorded: HashSet::new(),
            errors: Vec::new(),
            last_error: None,
            iteration: 0,
            max_iterations,
            completed_evaluations: 0,
            failed_evaluations: 0,
            started: Instant::now(),
            progress,
            cancel,
        }
    }

    /// 새 해 기록 (같은 후보는 한 번만).
    fn record_solution(&mut self, fingerprint: &str, parameters: &ParameterSet, scores: &ObjectiveScores) {
        if !self.recorded.insert(fingerprint.to_string()) {
            return;
        }
        let index = self.solutions.len();
        self.solutions
            .push(OptimizationSolution::new(index, parameters.clone(), scores.clone()));
    }

    fn record_error(&mut self, message: String) {
        if self.errors.len() < MAX_RECORDED_ERRORS {
            self.errors.push(message.clone());
        }
        self.last_error = Some(message);
    }

    /// 반복당 평균 소요 시간 × 남은 반복 수.
    fn estimated_remaining_secs(&self) -> f64 {
        if self.iteration == 0 {
            return 0.0;
        }
        let per_iteration = self.started.elapsed().as_secs_f64() / self.iteration as f64;
        per_iteration * self.max_iterations.saturating_sub(self.iteration) as f64
    }

    fn best_solution(&self) -> Option<OptimizationSolution> {
        self.frontier.best(&self.solutions).cloned()
    }

    /// 진행 상황 발행.
    ///
    /// 평가 단위 이벤트는 채널이 가득 차면 버립니다. 배치 완료 이벤트는 자리가
    /// 날 때까지 기다리지만 중단 요청이 오면 포기합니다. 수신 측이 읽지 않거나
    /// 닫혀도 실행은 멈추지 않습니다.
    async fn publish(&self, phase: ProgressPhase, workers_active: usize) {
        let Some(tx) = &self.progress else {
            return;
        };

        let snapshot = OptimizationProgress {
            phase,
            iteration: self.iteration,
            max_iterations: self.max_iterations,
            completed_evaluations: self.completed_evaluations,
            best_solution: self.best_solution(),
            pareto_frontier: self.frontier.snapshot(&self.solutions),
            estimated_time_remaining_seconds: self.estimated_remaining_secs(),
            workers_active,
            last_error: self.last_error.clone(),
        };

        match phase {
            ProgressPhase::Evaluating => match tx.try_send(snapshot) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => trace!("진행 상황 채널이 가득 차 평가 이벤트 생략"),
                Err(TrySendError::Closed(_)) => debug!("진행 상황 수신자가 닫힘"),
            },
            ProgressPhase::BatchComplete => {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        debug!("중단 요청으로 배치 진행 상황 발행 생략");
                    }
                    sent = tx.send(snapshot) => {
                        if sent.is_err() {
                            debug!("진행 상황 수신자가 닫힘");
                        }
                    }
                }
            }
        }
    }

    fn finish(self, cancelled: bool, worker_count: usize) -> OptimizationResult {
        let error = if self.solutions.is_empty() && self.failed_evaluations > 0 && !cancelled {
            Some(format!(
                "모든 후보 평가({}회)가 실패하여 최적화를 완료할 수 없습니다. 전략 설정이 올바른지 확인하세요 (마지막 오류: {})",
                self.failed_evaluations,
                self.last_error.as_deref().unwrap_or("알 수 없음")
            ))
        } else {
            None
        };

        OptimizationResult {
            best_solution: self.best_solution(),
            pareto_frontier: self.frontier.snapshot(&self.solutions),
            total_iterations: self.iteration,
            total_time_seconds: self.started.elapsed().as_secs_f64(),
            cache_hit_rate: self.cache.hit_rate(),
            worker_count,
            evaluations: self.completed_evaluations,
            failed_evaluations: self.failed_evaluations,
            errors: self.errors,
            error,
            cancelled,
            solutions: self.solutions,
            config: self.config,
        }
    }
}
