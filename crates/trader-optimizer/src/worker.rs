//! 백테스트 평가 워커 풀.
//!
//! 동시 실행 수는 `Semaphore`로 제한하고, 각 평가는 `JoinSet` 태스크로
//! 실행됩니다. 요청과 응답은 `id`로 대응됩니다.
//!
//! 취소 시 아직 시작하지 않은 평가는 `Cancelled`로 끝나고, 이미 실행 중인
//! 평가는 외부 백테스트 상태를 깨뜨리지 않도록 끝까지 실행됩니다.

use std::{
    any::Any,
    collections::BTreeMap,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use futures::FutureExt;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    block::{ParameterSet, StrategyBlock},
    objective::ObjectiveScores,
    scorer::ObjectiveScorer,
    walk_forward::DateRange,
};

/// 평가 요청.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    /// 대응용 ID
    pub id: usize,
    /// 원본 블록 (공유, 읽기 전용)
    pub blocks: Arc<Vec<StrategyBlock>>,
    /// 후보 파라미터
    pub parameters: ParameterSet,
    /// 평가 구간
    pub range: DateRange,
}

/// 평가 결과.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    /// 점수 산출 성공
    Scored(ObjectiveScores),
    /// 평가 실패 (메시지)
    Failed(String),
    /// 시작 전에 취소됨
    Cancelled,
}

/// 평가 응답.
#[derive(Debug, Clone)]
pub struct EvaluationResponse {
    /// 요청 ID
    pub id: usize,
    /// 후보 파라미터
    pub parameters: ParameterSet,
    /// 결과
    pub outcome: EvaluationOutcome,
}

/// 제한된 크기의 평가 워커 풀.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    scorer: Arc<ObjectiveScorer>,
    semaphore: Arc<Semaphore>,
    max_workers: usize,
    active: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// 새 워커 풀 생성 (최소 1개 워커).
    pub fn new(scorer: Arc<ObjectiveScorer>, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            scorer,
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 최대 워커 수.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// 현재 평가 중인 워커 수.
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// 요청 묶음을 제출.
    ///
    /// 반환된 [`EvaluationBatch`]에서 완료 순서대로 응답을 받습니다.
    pub fn spawn_batch(
        &self,
        requests: Vec<EvaluationRequest>,
        cancel: &CancellationToken,
    ) -> EvaluationBatch {
        let mut tasks = JoinSet::new();
        let mut pending = BTreeMap::new();

        for request in requests {
            pending.insert(request.id, request.parameters.clone());

            let scorer = self.scorer.clone();
            let semaphore = self.semaphore.clone();
            let active = self.active.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let EvaluationRequest {
                    id,
                    blocks,
                    parameters,
                    range,
                } = request;

                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return EvaluationResponse {
                            id,
                            parameters,
                            outcome: EvaluationOutcome::Cancelled,
                        };
                    }
                    permit = semaphore.acquire_owned() => permit,
                };
                let _permit = match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        return EvaluationResponse {
                            id,
                            parameters,
                            outcome: EvaluationOutcome::Failed("워커 풀이 닫혔습니다".to_string()),
                        };
                    }
                };

                active.fetch_add(1, Ordering::SeqCst);
                let result = AssertUnwindSafe(scorer.score_segment(&blocks, &parameters, range))
                    .catch_unwind()
                    .await;
                active.fetch_sub(1, Ordering::SeqCst);

                let outcome = match result {
                    Ok(Ok(scores)) => EvaluationOutcome::Scored(scores),
                    Ok(Err(e)) => EvaluationOutcome::Failed(e.to_string()),
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        warn!(id, error = %message, "평가 워커 패닉");
                        EvaluationOutcome::Failed(format!("워커 비정상 종료: {}", message))
                    }
                };

                EvaluationResponse {
                    id,
                    parameters,
                    outcome,
                }
            });
        }

        debug!(submitted = pending.len(), "평가 배치 제출");
        EvaluationBatch { tasks, pending }
    }
}

/// 제출된 평가 묶음.
pub struct EvaluationBatch {
    tasks: JoinSet<EvaluationResponse>,
    pending: BTreeMap<usize, ParameterSet>,
}

impl EvaluationBatch {
    /// 다음으로 완료된 응답.
    ///
    /// 태스크가 응답 없이 사라진 경우, 모든 태스크가 끝난 뒤 해당 요청마다
    /// 실패 응답을 만들어 반환합니다. 모든 요청이 응답되면 `None`.
    pub async fn next(&mut self) -> Option<EvaluationResponse> {
        loop {
            match self.tasks.join_next().await {
                Some(Ok(response)) => {
                    self.pending.remove(&response.id);
                    return Some(response);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "평가 태스크 조인 실패");
                }
                None => {
                    let (id, parameters) = self.pending.pop_first()?;
                    return Some(EvaluationResponse {
                        id,
                        parameters,
                        outcome: EvaluationOutcome::Failed(
                            "평가 태스크가 응답 없이 종료되었습니다".to_string(),
                        ),
                    });
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "알 수 없는 패닉".to_string()
    }
}
