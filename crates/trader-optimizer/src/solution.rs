//! 평가된 후보 (최적화 해).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    block::ParameterSet,
    objective::{Objective, ObjectiveScores},
};

/// 워크포워드 성능 저하 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
    /// 기준 목표 (주 목표)
    pub objective: Objective,
    /// 학습 → 검증 성능 저하율 (%), 양수일수록 검증 구간에서 나빠짐
    pub pct: f64,
    /// 학습 점수가 0이거나 점수가 없어 계산 불가 (이때 `pct`는 0)
    pub undefined: bool,
    /// 과최적화 판정 여부
    pub overfit: bool,
}

/// 최적화 해 하나.
///
/// 학습 구간 평가 시 생성되며, 이후 변경되는 것은 파레토 플래그와
/// (최초 한 번 기록되는) 검증 구간 결과뿐입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationSolution {
    /// 해 ID
    pub id: Uuid,
    /// 평가 순서 (동률 처리 기준)
    pub evaluation_index: usize,
    /// 후보 파라미터
    pub parameters: ParameterSet,
    /// 학습 구간 점수
    pub in_sample_scores: ObjectiveScores,
    /// 검증 구간 점수 (파레토 해만 검증됨)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_of_sample_scores: Option<ObjectiveScores>,
    /// 성능 저하 결과
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation: Option<Degradation>,
    /// 파레토 최적 여부
    pub is_pareto_optimal: bool,
}

impl OptimizationSolution {
    /// 학습 구간 평가 결과로 새 해 생성.
    pub fn new(evaluation_index: usize, parameters: ParameterSet, in_sample_scores: ObjectiveScores) -> Self {
        Self {
            id: Uuid::new_v4(),
            evaluation_index,
            parameters,
            in_sample_scores,
            out_of_sample_scores: None,
            degradation: None,
            is_pareto_optimal: false,
        }
    }

    /// 학습 구간 점수 조회.
    pub fn score(&self, objective: Objective) -> Option<f64> {
        self.in_sample_scores.get(objective)
    }

    /// 검증 구간 결과가 기록되었는지 여부.
    pub fn is_validated(&self) -> bool {
        self.out_of_sample_scores.is_some()
    }
}
