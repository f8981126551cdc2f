//! 베이지안 최적화 (다목적, ParEGO 스칼라화).
//!
//! # 상태
//!
//! ```text
//! Warmup ──(워밍업 결과 관측)──> ModelGuided ──(최대 반복 도달)──> 종료
//! ```
//!
//! - `Warmup`: 라틴 하이퍼큐브 샘플 `min(warmup_size, max_iterations)`개를 한 번에 제안
//! - `ModelGuided`: 반복마다 무작위 가중치로 목표들을 스칼라화하고, 가우시안
//!   프로세스 위의 Expected Improvement가 가장 큰 후보 하나를 제안

use std::collections::HashSet;

use rand::{rngs::StdRng, Rng};
use tracing::{debug, warn};

use super::{
    gaussian_process::{expected_improvement, GaussianProcess},
    Observation, SearchStrategy,
};
use crate::{
    block::ParameterSet,
    config::BayesianSettings,
    error::Result,
    objective::Objective,
    params::ParameterSpace,
};

/// 증강 체비쇼프 스칼라화의 합 항 계수
const AUGMENTATION: f64 = 0.05;

/// 베이지안 최적화 단계.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BayesianPhase {
    /// 서로게이트 초기화용 샘플링
    Warmup,
    /// 서로게이트 기반 탐색
    ModelGuided,
}

/// 가우시안 프로세스 기반 다목적 최적화기.
#[derive(Debug)]
pub struct BayesianOptimizer {
    space: ParameterSpace,
    objectives: Vec<Objective>,
    settings: BayesianSettings,
    max_iterations: usize,
    rng: StdRng,
    phase: BayesianPhase,
    warmup_proposed: bool,
    proposed: usize,
    history: Vec<Observation>,
    seen: HashSet<String>,
}

impl BayesianOptimizer {
    /// 새 최적화기 생성.
    pub fn new(
        space: ParameterSpace,
        objectives: Vec<Objective>,
        settings: BayesianSettings,
        max_iterations: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            space,
            objectives,
            settings,
            max_iterations,
            rng,
            phase: BayesianPhase::Warmup,
            warmup_proposed: false,
            proposed: 0,
            history: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// 현재 단계.
    pub fn phase(&self) -> BayesianPhase {
        self.phase
    }

    /// 워밍업 후보 수.
    pub fn warmup_count(&self) -> usize {
        self.settings.warmup_size.max(1).min(self.max_iterations)
    }

    /// RBF 길이 척도 (미설정 시 차원 수 기반).
    fn length_scale(&self) -> f64 {
        self.settings
            .length_scale
            .unwrap_or_else(|| 0.25 * (self.space.dimensions().max(1) as f64).sqrt())
    }

    fn remember(&mut self, batch: &[ParameterSet]) {
        self.proposed += batch.len();
        for candidate in batch {
            self.seen.insert(candidate.fingerprint());
        }
    }

    /// 서로게이트로 다음 후보 하나 선택.
    fn propose_guided(&mut self) -> ParameterSet {
        match self.try_propose_guided() {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                debug!("관측 부족 또는 미탐색 후보 없음, 무작위 샘플로 대체");
                self.space.sample(&mut self.rng)
            }
            Err(e) => {
                warn!(error = %e, "서로게이트 학습 실패, 무작위 샘플로 대체");
                self.space.sample(&mut self.rng)
            }
        }
    }

    fn try_propose_guided(&mut self) -> Result<Option<ParameterSet>> {
        let scored: Vec<&Observation> = self.history.iter().filter(|o| o.scores.is_some()).collect();
        if scored.len() < 2 {
            return Ok(None);
        }

        let weights = random_simplex(self.objectives.len(), &mut self.rng);
        let targets = scalarize(&scored, &self.objectives, &weights);
        let inputs: Vec<Vec<f64>> = scored.iter().map(|o| self.space.to_unit(&o.parameters)).collect();

        let gp = GaussianProcess::fit(inputs, &targets, self.length_scale())?;
        let best = targets.iter().copied().fold(f64::INFINITY, f64::min);

        let mut choice: Option<(f64, ParameterSet)> = None;
        for _ in 0..self.settings.acquisition_samples {
            let candidate = self.space.sample(&mut self.rng);
            if self.seen.contains(&candidate.fingerprint()) {
                continue;
            }
            let (mean, std) = gp.predict(&self.space.to_unit(&candidate));
            let ei = expected_improvement(mean, std, best, self.settings.exploration);
            if choice.as_ref().map_or(true, |(top, _)| ei > *top) {
                choice = Some((ei, candidate));
            }
        }

        if let Some((ei, _)) = &choice {
            debug!(ei, observations = gp.len(), "획득 함수 최대 후보 선택");
        }
        Ok(choice.map(|(_, candidate)| candidate))
    }
}

impl SearchStrategy for BayesianOptimizer {
    fn name(&self) -> &'static str {
        "bayesian"
    }

    fn next_batch(&mut self) -> Vec<ParameterSet> {
        if self.proposed >= self.max_iterations {
            return Vec::new();
        }

        let batch = match self.phase {
            BayesianPhase::Warmup if !self.warmup_proposed => {
                self.warmup_proposed = true;
                self.space.latin_hypercube(self.warmup_count(), &mut self.rng)
            }
            // 워밍업 결과를 아직 관측하지 않음
            BayesianPhase::Warmup => Vec::new(),
            BayesianPhase::ModelGuided => vec![self.propose_guided()],
        };

        self.remember(&batch);
        batch
    }

    fn observe(&mut self, observations: &[Observation]) {
        self.history.extend(observations.iter().cloned());
        if self.phase == BayesianPhase::Warmup && self.warmup_proposed {
            self.phase = BayesianPhase::ModelGuided;
            debug!(observed = self.history.len(), "워밍업 완료, 서로게이트 탐색 시작");
        }
    }

    fn is_finished(&self) -> bool {
        self.history.len() >= self.max_iterations
    }

    fn iterations_completed(&self) -> usize {
        self.history.len()
    }

    fn max_iterations(&self) -> usize {
        self.max_iterations
    }
}

/// 합이 1인 무작위 가중치 (단체 위 균등 분포).
fn random_simplex(k: usize, rng: &mut StdRng) -> Vec<f64> {
    let raw: Vec<f64> = (0..k).map(|_| -(1.0 - rng.gen::<f64>()).ln()).collect();
    let total: f64 = raw.iter().sum();
    if total > 0.0 && total.is_finite() {
        raw.iter().map(|w| w / total).collect()
    } else {
        vec![1.0 / k as f64; k]
    }
}

/// 증강 체비쇼프 스칼라화 (작을수록 좋음).
///
/// 목표별 비용을 관측 범위로 `[0, 1]` 정규화하며, 점수가 없으면 1(최악)입니다.
fn scalarize(observations: &[&Observation], objectives: &[Objective], weights: &[f64]) -> Vec<f64> {
    let costs: Vec<Vec<Option<f64>>> = observations
        .iter()
        .map(|o| {
            objectives
                .iter()
                .map(|obj| {
                    o.scores
                        .as_ref()
                        .and_then(|s| s.get(*obj))
                        .map(|v| obj.to_cost(v))
                })
                .collect()
        })
        .collect();

    let bounds: Vec<(f64, f64)> = (0..objectives.len())
        .map(|i| {
            costs.iter().filter_map(|c| c[i]).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            })
        })
        .collect();

    costs
        .iter()
        .map(|row| {
            let weighted: Vec<f64> = row
                .iter()
                .zip(&bounds)
                .zip(weights)
                .map(|((cost, (lo, hi)), w)| {
                    let normalized = match cost {
                        Some(c) if hi > lo => (c - lo) / (hi - lo),
                        Some(_) => 0.0,
                        None => 1.0,
                    };
                    w * normalized
                })
                .collect();
            let max = weighted.iter().copied().fold(0.0, f64::max);
            max + AUGMENTATION * weighted.iter().sum::<f64>()
        })
        .collect()
}
