//! 평가 결과 캐시.
//!
//! 파라미터 세트의 내용 해시([`ParameterSet::fingerprint`])를 키로 학습 구간
//! 평가 결과를 저장합니다. 한 번의 최적화 실행이 소유하며, 오케스트레이터만
//! 갱신하므로 잠금이 필요 없습니다.
//!
//! # 구조
//!
//! ```text
//! EvaluationCache
//! ├── entries    // fingerprint → 결과
//! ├── order      // 삽입 순서 (FIFO 제거용)
//! └── hits/misses
//! ```
//!
//! [`ParameterSet::fingerprint`]: crate::block::ParameterSet::fingerprint

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::objective::ObjectiveScores;

/// 캐시된 평가 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedOutcome {
    /// 점수 산출 성공
    Scored(ObjectiveScores),
    /// 평가 실패 (같은 후보를 다시 평가해도 실패하므로 함께 캐시)
    Failed(String),
}

/// 크기 제한 평가 캐시 (FIFO 제거).
#[derive(Debug)]
pub struct EvaluationCache {
    entries: HashMap<String, CachedOutcome>,
    order: VecDeque<String>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl EvaluationCache {
    /// 최대 항목 수로 빈 캐시 생성 (최소 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity.min(1024)),
            order: VecDeque::new(),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    /// 캐시 조회 (적중/실패 횟수 갱신).
    pub fn lookup(&mut self, fingerprint: &str) -> Option<CachedOutcome> {
        match self.entries.get(fingerprint) {
            Some(outcome) => {
                self.hits += 1;
                trace!(fingerprint, "캐시 적중");
                Some(outcome.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// 결과 저장.
    ///
    /// 이미 있는 키는 값만 갱신하고, 용량을 넘으면 가장 오래된 항목부터 제거합니다.
    pub fn insert(&mut self, fingerprint: String, outcome: CachedOutcome) {
        if let Some(existing) = self.entries.get_mut(&fingerprint) {
            *existing = outcome;
            return;
        }

        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }

        self.order.push_back(fingerprint.clone());
        self.entries.insert(fingerprint, outcome);
    }

    /// 저장된 항목 수.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 비어있는지 여부.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 적중 횟수.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// 실패 횟수.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// 적중률 (0.0 ~ 1.0, 조회가 없으면 0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
