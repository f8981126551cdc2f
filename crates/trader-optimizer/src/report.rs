//! 진행 상황과 최종 결과.

use serde::{Deserialize, Serialize};

use crate::{config::OptimizationConfig, solution::OptimizationSolution};

/// 결과에 보관하는 비치명적 오류 최대 개수
pub const MAX_RECORDED_ERRORS: usize = 50;

/// 진행 상황 이벤트 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    /// 평가 하나 완료 (완료 순서대로 발행)
    Evaluating,
    /// 배치 하나가 모두 끝나고 반복 카운터가 갱신됨
    BatchComplete,
}

/// 최적화 진행 상황 스냅샷.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationProgress {
    /// 이벤트 종류
    pub phase: ProgressPhase,
    /// 완료된 반복 수 (단조 증가)
    pub iteration: usize,
    /// 최대 반복 수
    pub max_iterations: usize,
    /// 지금까지 완료된 평가 수 (캐시 적중 포함)
    pub completed_evaluations: usize,
    /// 주 목표 기준 최고 해
    pub best_solution: Option<OptimizationSolution>,
    /// 현재 파레토 프런티어
    pub pareto_frontier: Vec<OptimizationSolution>,
    /// 예상 남은 시간 (초)
    pub estimated_time_remaining_seconds: f64,
    /// 현재 평가 중인 워커 수
    pub workers_active: usize,
    /// 가장 최근의 평가 오류
    pub last_error: Option<String>,
}

/// 최적화 최종 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// 실행 설정
    pub config: OptimizationConfig,
    /// 평가에 성공한 모든 해 (평가 순서)
    pub solutions: Vec<OptimizationSolution>,
    /// 파레토 프런티어
    pub pareto_frontier: Vec<OptimizationSolution>,
    /// 주 목표 기준 최고 해
    pub best_solution: Option<OptimizationSolution>,
    /// 완료된 반복 수
    pub total_iterations: usize,
    /// 총 소요 시간 (초)
    pub total_time_seconds: f64,
    /// 캐시 적중률 (0.0 ~ 1.0)
    pub cache_hit_rate: f64,
    /// 사용한 워커 수
    pub worker_count: usize,
    /// 수행한 평가 수 (캐시 적중 포함)
    pub evaluations: usize,
    /// 실패한 평가 수
    pub failed_evaluations: usize,
    /// 비치명적 오류 (최대 [`MAX_RECORDED_ERRORS`]개)
    pub errors: Vec<String>,
    /// 실행 수준 실패 사유
    pub error: Option<String>,
    /// 사용자 요청으로 중단되었는지 여부
    pub cancelled: bool,
}

impl OptimizationResult {
    /// 평가 없이 끝난 빈 결과.
    pub fn empty(config: OptimizationConfig, worker_count: usize) -> Self {
        Self {
            config,
            solutions: Vec::new(),
            pareto_frontier: Vec::new(),
            best_solution: None,
            total_iterations: 0,
            total_time_seconds: 0.0,
            cache_hit_rate: 0.0,
            worker_count,
            evaluations: 0,
            failed_evaluations: 0,
            errors: Vec::new(),
            error: None,
            cancelled: false,
        }
    }

    /// 실행이 정상적으로 해를 냈는지 여부.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.solutions.is_empty()
    }

    /// 과최적화로 판정된 프런티어 해 수.
    pub fn overfit_count(&self) -> usize {
        self.pareto_frontier
            .iter()
            .filter(|s| s.degradation.as_ref().is_some_and(|d| d.overfit))
            .count()
    }

    /// 결과 요약 문자열.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "=== 최적화 결과 ===".to_string(),
            format!("알고리즘: {}", self.config.algorithm),
            format!(
                "목표: {}",
                self.config
                    .objectives
                    .iter()
                    .map(|o| o.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            format!(
                "반복: {}/{} ({:.1}초)",
                self.total_iterations,
                self.config.max_iterations(),
                self.total_time_seconds
            ),
            format!(
                "평가: {}회 (실패 {}회, 캐시 적중률 {:.1}%, 워커 {}개)",
                self.evaluations,
                self.failed_evaluations,
                self.cache_hit_rate * 100.0,
                self.worker_count
            ),
            format!(
                "해: {}개, 파레토 프런티어: {}개 (과최적화 {}개)",
                self.solutions.len(),
                self.pareto_frontier.len(),
                self.overfit_count()
            ),
        ];

        if let Some(best) = &self.best_solution {
            let scores = best
                .in_sample_scores
                .iter()
                .map(|(o, v)| format!("{}={:.4}", o, v))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("최고 해 (평가 #{}): {}", best.evaluation_index, scores));
        }
        if self.cancelled {
            lines.push("사용자 요청으로 중단됨 (부분 결과)".to_string());
        }
        if let Some(error) = &self.error {
            lines.push(format!("실패: {}", error));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{
        block::ParameterSet,
        config::{Algorithm, BacktestWindow},
        objective::{Objective, ObjectiveScores},
        solution::Degradation,
    };

    fn config() -> OptimizationConfig {
        OptimizationConfig::new(
            Algorithm::Bayesian,
            vec![Objective::SharpeRatio, Objective::MaxDrawdown],
            BacktestWindow::new(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            ),
        )
    }

    #[test]
    fn test_empty_result() {
        let result = OptimizationResult::empty(config(), 4);
        assert!(!result.is_success());
        assert_eq!(result.total_iterations, 0);
        assert!(result.summary().contains("bayesian"));
    }

    #[test]
    fn test_summary_mentions_best_and_overfit() {
        let mut best = OptimizationSolution::new(
            3,
            ParameterSet::new(),
            ObjectiveScores::new().with(Objective::SharpeRatio, 1.5),
        );
        best.is_pareto_optimal = true;
        best.degradation = Some(Degradation {
            objective: Objective::SharpeRatio,
            pct: 80.0,
            undefined: false,
            overfit: true,
        });

        let mut result = OptimizationResult::empty(config(), 2);
        result.solutions = vec![best.clone()];
        result.pareto_frontier = vec![best.clone()];
        result.best_solution = Some(best);
        result.cancelled = true;

        assert!(result.is_success());
        assert_eq!(result.overfit_count(), 1);
        let summary = result.summary();
        assert!(summary.contains("평가 #3"));
        assert!(summary.contains("sharpeRatio=1.5000"));
        assert!(summary.contains("중단"));
    }

    #[test]
    fn test_result_serializes_snake_case() {
        let json = serde_json::to_value(OptimizationResult::empty(config(), 1)).unwrap();
        assert!(json.get("total_iterations").is_some());
        assert!(json.get("cache_hit_rate").is_some());
        assert_eq!(json["cancelled"], false);
    }
}
