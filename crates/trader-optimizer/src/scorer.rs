//! 목표 점수 산출기.
//!
//! 외부 백테스트 협력자를 감싸 후보 하나를 점수화합니다.
//!
//! ```text
//! ObjectiveScorer
//! ├── score_segment()   // 학습 또는 검증 구간 하나
//! └── evaluate()        // 학습 구간 + 검증 구간
//!         │
//!         └──> BacktestRunner::run_backtest()  (외부, 동시 호출 가능)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    block::{apply_parameters, ParameterSet, StrategyBlock},
    config::RebalanceInterval,
    error::{OptimizerError, Result},
    objective::{Objective, ObjectiveScores},
    walk_forward::{DateRange, WalkForwardWindow},
};

/// 백테스트 실행 요청.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    /// 후보 값이 적용된 블록 사본
    pub blocks: Vec<StrategyBlock>,
    /// 적용된 후보 값
    pub parameter_overrides: ParameterSet,
    /// 시작 시각
    pub start_date: DateTime<Utc>,
    /// 종료 시각
    pub end_date: DateTime<Utc>,
    /// 초기 자본금
    pub initial_capital: Decimal,
    /// 리밸런싱 주기
    pub rebalance_interval: RebalanceInterval,
}

/// 백테스트 결과 지표.
///
/// 계산할 수 없었던 지표는 `None`입니다 (예: 거래가 없으면 승률 없음).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub sharpe_ratio: Option<f64>,
    pub total_return: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub win_rate: Option<f64>,
    pub gas_costs: Option<f64>,
    pub protocol_fees: Option<f64>,
    /// 총 거래 수
    #[serde(default)]
    pub total_trades: Option<u32>,
}

impl BacktestMetrics {
    /// 목표 점수로 변환 (유한하지 않은 값은 제외).
    pub fn to_scores(&self) -> ObjectiveScores {
        [
            (Objective::SharpeRatio, self.sharpe_ratio),
            (Objective::TotalReturn, self.total_return),
            (Objective::MaxDrawdown, self.max_drawdown),
            (Objective::WinRate, self.win_rate),
            (Objective::GasCosts, self.gas_costs),
            (Objective::ProtocolFees, self.protocol_fees),
        ]
        .into_iter()
        .filter_map(|(objective, value)| value.map(|v| (objective, v)))
        .collect()
    }
}

/// 외부 백테스트 협력자.
///
/// 서로 다른 파라미터로 여러 워커에서 동시에 호출될 수 있어야 합니다.
#[async_trait]
pub trait BacktestRunner: Send + Sync {
    /// 백테스트 한 번 실행.
    async fn run_backtest(
        &self,
        request: BacktestRequest,
    ) -> std::result::Result<BacktestMetrics, Box<dyn std::error::Error + Send + Sync>>;
}

/// 학습/검증 구간 점수.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 학습 구간 점수
    pub in_sample: ObjectiveScores,
    /// 검증 구간 점수
    pub out_of_sample: ObjectiveScores,
}

/// 후보 파라미터 점수 산출기.
pub struct ObjectiveScorer {
    runner: Arc<dyn BacktestRunner>,
    initial_capital: Decimal,
    rebalance_interval: RebalanceInterval,
}

impl ObjectiveScorer {
    /// 새 점수 산출기 생성.
    pub fn new(
        runner: Arc<dyn BacktestRunner>,
        initial_capital: Decimal,
        rebalance_interval: RebalanceInterval,
    ) -> Self {
        Self {
            runner,
            initial_capital,
            rebalance_interval,
        }
    }

    /// 구간 하나에 대해 후보를 점수화.
    ///
    /// 원본 블록은 변경되지 않습니다. 백테스트 오류나 유효한 점수가 전혀 없는
    /// 결과는 [`OptimizerError::Evaluation`]으로 반환됩니다.
    pub async fn score_segment(
        &self,
        blocks: &[StrategyBlock],
        parameters: &ParameterSet,
        range: DateRange,
    ) -> Result<ObjectiveScores> {
        let request = BacktestRequest {
            blocks: apply_parameters(blocks, parameters),
            parameter_overrides: parameters.clone(),
            start_date: range.start,
            end_date: range.end,
            initial_capital: self.initial_capital,
            rebalance_interval: self.rebalance_interval,
        };

        let metrics = self
            .runner
            .run_backtest(request)
            .await
            .map_err(|e| OptimizerError::Evaluation(e.to_string()))?;

        let scores = metrics.to_scores();
        if scores.is_empty() {
            return Err(OptimizerError::Evaluation(
                "백테스트 결과에 사용할 수 있는 지표가 없습니다".to_string(),
            ));
        }

        debug!(
            start = %range.start,
            end = %range.end,
            trades = ?metrics.total_trades,
            "구간 점수 산출 완료"
        );
        Ok(scores)
    }

    /// 학습 구간과 검증 구간을 모두 점수화.
    pub async fn evaluate(
        &self,
        blocks: &[StrategyBlock],
        parameters: &ParameterSet,
        window: &WalkForwardWindow,
    ) -> Result<Evaluation> {
        let in_sample = self.score_segment(blocks, parameters, window.train()).await?;
        let out_of_sample = self.score_segment(blocks, parameters, window.test()).await?;
        Ok(Evaluation {
            in_sample,
            out_of_sample,
        })
    }
}

impl std::fmt::Debug for ObjectiveScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectiveScorer")
            .field("initial_capital", &self.initial_capital)
            .field("rebalance_interval", &self.rebalance_interval)
            .finish()
    }
}
