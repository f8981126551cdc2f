//! 워크포워드 (학습/검증) 검증.
//!
//! 백테스트 기간의 마지막 일부를 검증 구간으로 떼어두고, 파레토 해를
//! 검증 구간에서 다시 평가하여 성능 저하율로 과최적화를 판정합니다.
//!
//! ```text
//! |<------------- 학습 구간 ------------->|<-- 검증 구간 -->|
//! start                          train_end == test_start    end
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    block::StrategyBlock,
    config::BacktestWindow,
    error::{OptimizerError, Result},
    objective::{Direction, Objective, ObjectiveScores},
    solution::{Degradation, OptimizationSolution},
    worker::{EvaluationOutcome, EvaluationRequest, WorkerPool},
};

/// 시간 구간 `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// 학습/검증 구간 분할.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    pub train_start: DateTime<Utc>,
    pub train_end: DateTime<Utc>,
    pub test_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
}

impl WalkForwardWindow {
    /// 전체 기간의 마지막 `test_fraction`을 검증 구간으로 분할.
    pub fn split(window: &BacktestWindow, test_fraction: f64) -> Result<Self> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(OptimizerError::Window(format!(
                "검증 구간 비율은 0과 1 사이여야 합니다 (현재 {})",
                test_fraction
            )));
        }
        if window.end_date <= window.start_date {
            return Err(OptimizerError::Window(
                "종료 시각은 시작 시각 이후여야 합니다".to_string(),
            ));
        }

        let total_ms = (window.end_date - window.start_date).num_milliseconds();
        let test_ms = (total_ms as f64 * test_fraction).round() as i64;
        if test_ms <= 0 || test_ms >= total_ms {
            return Err(OptimizerError::Window(
                "기간이 너무 짧아 학습/검증 구간으로 나눌 수 없습니다".to_string(),
            ));
        }

        let test_start = window.end_date - Duration::milliseconds(test_ms);
        Ok(Self {
            train_start: window.start_date,
            train_end: test_start,
            test_start,
            test_end: window.end_date,
        })
    }

    /// 학습 구간.
    pub fn train(&self) -> DateRange {
        DateRange {
            start: self.train_start,
            end: self.train_end,
        }
    }

    /// 검증 구간.
    pub fn test(&self) -> DateRange {
        DateRange {
            start: self.test_start,
            end: self.test_end,
        }
    }
}

/// 워크포워드 검증기.
#[derive(Debug, Clone)]
pub struct WalkForwardValidator {
    window: WalkForwardWindow,
    primary: Objective,
    overfit_threshold_pct: f64,
}

impl WalkForwardValidator {
    /// 새 검증기 생성.
    pub fn new(window: WalkForwardWindow, primary: Objective, overfit_threshold_pct: f64) -> Self {
        Self {
            window,
            primary,
            overfit_threshold_pct,
        }
    }

    /// 구간 분할.
    pub fn window(&self) -> &WalkForwardWindow {
        &self.window
    }

    /// 주 목표 기준 성능 저하율 계산.
    ///
    /// 양수는 항상 "검증 구간에서 더 나빠짐"을 뜻합니다.
    /// 학습 점수가 0이거나 어느 한쪽 점수가 없으면 계산 불가로 표시합니다.
    pub fn degradation(&self, in_sample: &ObjectiveScores, out_of_sample: &ObjectiveScores) -> Degradation {
        let undefined = Degradation {
            objective: self.primary,
            pct: 0.0,
            undefined: true,
            overfit: false,
        };

        let (Some(train), Some(test)) = (in_sample.get(self.primary), out_of_sample.get(self.primary))
        else {
            return undefined;
        };
        if train == 0.0 {
            return undefined;
        }

        let pct = match self.primary.direction() {
            Direction::Maximize => (train - test) / train.abs() * 100.0,
            Direction::Minimize => (test - train) / train.abs() * 100.0,
        };

        Degradation {
            objective: self.primary,
            pct,
            undefined: false,
            overfit: pct > self.overfit_threshold_pct,
        }
    }

    /// 검증 구간 결과가 없는 파레토 해를 재평가.
    ///
    /// 한 번의 배치로 워커 풀에 제출하며, 실패한 해는 빈 검증 점수와 계산 불가
    /// 저하율로 기록되어 다시 시도되지 않습니다. 취소된 해는 기록하지 않습니다.
    /// 반환값은 비치명적 오류 메시지 목록입니다.
    pub async fn revalidate(
        &self,
        solutions: &mut [OptimizationSolution],
        pool: &WorkerPool,
        blocks: &Arc<Vec<StrategyBlock>>,
        cancel: &CancellationToken,
    ) -> Vec<String> {
        let requests: Vec<EvaluationRequest> = solutions
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_pareto_optimal && !s.is_validated())
            .map(|(id, s)| EvaluationRequest {
                id,
                blocks: blocks.clone(),
                parameters: s.parameters.clone(),
                range: self.window.test(),
            })
            .collect();

        if requests.is_empty() || cancel.is_cancelled() {
            return Vec::new();
        }

        let submitted = requests.len();
        let mut batch = pool.spawn_batch(requests, cancel);
        let mut errors = Vec::new();
        let mut overfit = 0usize;

        while let Some(response) = batch.next().await {
            let Some(solution) = solutions.get_mut(response.id) else {
                continue;
            };
            match response.outcome {
                EvaluationOutcome::Scored(scores) => {
                    let degradation = self.degradation(&solution.in_sample_scores, &scores);
                    if degradation.overfit {
                        overfit += 1;
                    }
                    debug!(
                        evaluation = solution.evaluation_index,
                        pct = degradation.pct,
                        undefined = degradation.undefined,
                        "검증 구간 평가 완료"
                    );
                    solution.out_of_sample_scores = Some(scores);
                    solution.degradation = Some(degradation);
                }
                EvaluationOutcome::Failed(message) => {
                    warn!(
                        evaluation = solution.evaluation_index,
                        error = %message,
                        "검증 구간 평가 실패"
                    );
                    let empty = ObjectiveScores::new();
                    solution.degradation = Some(self.degradation(&solution.in_sample_scores, &empty));
                    solution.out_of_sample_scores = Some(empty);
                    errors.push(format!(
                        "검증 구간 평가 실패 (평가 #{}): {}",
                        solution.evaluation_index, message
                    ));
                }
                EvaluationOutcome::Cancelled => {}
            }
        }

        info!(
            submitted,
            failed = errors.len(),
            overfit,
            "워크포워드 재검증 완료"
        );
        errors
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::{
        block::ParameterSet,
        config::RebalanceInterval,
        scorer::{BacktestMetrics, BacktestRequest, BacktestRunner, ObjectiveScorer},
    };

    fn window() -> BacktestWindow {
        BacktestWindow::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 7, 0, 0, 0).unwrap(),
        )
    }

    fn validator(primary: Objective) -> WalkForwardValidator {
        let split = WalkForwardWindow::split(&window(), 1.0 / 6.0).unwrap();
        WalkForwardValidator::new(split, primary, 50.0)
    }

    #[test]
    fn test_split_holds_out_last_sixth() {
        let split = WalkForwardWindow::split(&window(), 1.0 / 6.0).unwrap();
        assert_eq!(split.train_start, window().start_date);
        assert_eq!(split.test_end, window().end_date);
        assert_eq!(split.train_end, split.test_start);
        // 6일 중 마지막 1일
        assert_eq!(split.test_start, Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_split_rejects_invalid_input() {
        let w = window();
        assert!(WalkForwardWindow::split(&BacktestWindow::new(w.end_date, w.start_date), 0.2).is_err());
        assert!(WalkForwardWindow::split(&w, 0.0).is_err());
        assert!(WalkForwardWindow::split(&w, 1.0).is_err());
    }

    #[test]
    fn test_degradation_maximize() {
        let v = validator(Objective::SharpeRatio);
        let in_s = ObjectiveScores::new().with(Objective::SharpeRatio, 2.0);
        let out_s = ObjectiveScores::new().with(Objective::SharpeRatio, 0.5);

        let d = v.degradation(&in_s, &out_s);
        assert!((d.pct - 75.0).abs() < 1e-9);
        assert!(d.overfit);
        assert!(!d.undefined);
    }

    #[test]
    fn test_degradation_minimize_positive_means_worse() {
        let v = validator(Objective::MaxDrawdown);
        let in_s = ObjectiveScores::new().with(Objective::MaxDrawdown, 10.0);
        let out_s = ObjectiveScores::new().with(Objective::MaxDrawdown, 12.0);

        let d = v.degradation(&in_s, &out_s);
        assert!((d.pct - 20.0).abs() < 1e-9);
        assert!(!d.overfit);
    }

    #[test]
    fn test_degradation_zero_in_sample_is_undefined() {
        let v = validator(Objective::SharpeRatio);
        let in_s = ObjectiveScores::new().with(Objective::SharpeRatio, 0.0);
        let out_s = ObjectiveScores::new().with(Objective::SharpeRatio, 1.0);

        let d = v.degradation(&in_s, &out_s);
        assert!(d.undefined);
        assert_eq!(d.pct, 0.0);
        assert!(!d.overfit);

        let missing = v.degradation(&out_s, &ObjectiveScores::new());
        assert!(missing.undefined);
    }

    /// 검증 구간에서 샤프 비율이 절반이 되는 러너.
    struct HalvingRunner {
        test_start: DateTime<Utc>,
    }

    #[async_trait]
    impl BacktestRunner for HalvingRunner {
        async fn run_backtest(
            &self,
            request: BacktestRequest,
        ) -> std::result::Result<BacktestMetrics, Box<dyn std::error::Error + Send + Sync>>
        {
            assert_eq!(request.start_date, self.test_start);
            let amount = request.parameter_overrides.get("swap", "amount").unwrap_or(0.0);
            if amount < 0.0 {
                return Err("검증 구간 데이터 없음".into());
            }
            Ok(BacktestMetrics {
                sharpe_ratio: Some(amount / 2.0),
                ..Default::default()
            })
        }
    }

    fn solution(index: usize, amount: f64, sharpe: f64, pareto: bool) -> OptimizationSolution {
        let mut parameters = ParameterSet::new();
        parameters.set("swap", "amount", amount);
        let mut s = OptimizationSolution::new(
            index,
            parameters,
            ObjectiveScores::new().with(Objective::SharpeRatio, sharpe),
        );
        s.is_pareto_optimal = pareto;
        s
    }

    #[tokio::test]
    async fn test_revalidate_only_unvalidated_frontier() {
        let v = validator(Objective::SharpeRatio);
        let runner = Arc::new(HalvingRunner {
            test_start: v.window().test_start,
        });
        let scorer = ObjectiveScorer::new(runner, dec!(1000), RebalanceInterval::Daily);
        let pool = WorkerPool::new(Arc::new(scorer), 2);
        let blocks = Arc::new(vec![StrategyBlock::new("swap", "uniswap_swap").with_param("amount", 1.0)]);
        let cancel = CancellationToken::new();

        let mut solutions = vec![
            solution(0, 4.0, 4.0, true),
            solution(1, 2.0, 2.0, false),
            solution(2, -1.0, 1.0, true),
        ];

        let errors = v.revalidate(&mut solutions, &pool, &blocks, &cancel).await;

        assert_eq!(errors.len(), 1);
        let d = solutions[0].degradation.as_ref().unwrap();
        assert!((d.pct - 50.0).abs() < 1e-9);
        assert!(!d.overfit);
        assert!(!solutions[1].is_validated());
        // 실패한 해는 다시 시도하지 않도록 기록됨
        assert!(solutions[2].is_validated());
        assert!(solutions[2].degradation.as_ref().unwrap().undefined);

        let again = v.revalidate(&mut solutions, &pool, &blocks, &cancel).await;
        assert!(again.is_empty());
    }
}
