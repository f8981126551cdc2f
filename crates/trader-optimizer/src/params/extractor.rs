//! 전략 블록에서 탐색 공간을 추출.
//!
//! 블록 타입별 규칙 테이블이 조정 가능한 필드와 범위 정책을 정합니다.
//!
//! | 정책 | 범위 |
//! |------|------|
//! | 슬리피지 | 0.1 ~ 2.0 고정 |
//! | 수량 | 현재 값 ±50% |
//! | 가격 트리거 목표가 | 현재 값 ±20% |
//! | 백분율 (손절 등) | 1 ~ 20 고정 |
//!
//! 결과는 우선순위(리스크 → 진입 → 비용 → 사이징) 순으로 정렬되며
//! 최대 [`MAX_PARAMETERS`]개까지만 유지됩니다.

use tracing::{debug, info};

use super::definition::{ParameterDefinition, ParameterKind};
use crate::block::StrategyBlock;

/// 추출 가능한 최대 파라미터 수.
pub const MAX_PARAMETERS: usize = 10;

/// 슬리피지 고정 범위 (%)
const SLIPPAGE_RANGE: (f64, f64) = (0.1, 2.0);
/// 백분율 필드 고정 범위 (%)
const PERCENTAGE_RANGE: (f64, f64) = (1.0, 20.0);
/// 수량 필드 상대 범위
const AMOUNT_SPREAD: f64 = 0.5;
/// 가격 트리거 상대 범위
const PRICE_TARGET_SPREAD: f64 = 0.2;
/// 시간 트리거 간격 선택지 (시간)
const INTERVAL_HOURS: &[f64] = &[1.0, 4.0, 12.0, 24.0, 72.0, 168.0];

/// 파라미터 중요도 분류 (선언 순서가 우선순위).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParameterPriority {
    /// 리스크 (손절/익절)
    Risk,
    /// 진입 조건
    Entry,
    /// 비용 (슬리피지)
    Cost,
    /// 포지션 크기
    Sizing,
}

/// 범위 결정 정책.
#[derive(Debug, Clone, Copy)]
enum BoundsPolicy {
    /// 현재 값과 무관한 고정 범위
    Fixed { min: f64, max: f64 },
    /// 현재 값 기준 ±비율
    Relative { spread: f64 },
    /// 백분율 고정 범위
    Percentage,
    /// 이산 선택지
    Choices(&'static [f64]),
}

/// 블록 타입별 조정 가능 필드 규칙.
struct FieldRule {
    block_type: &'static str,
    field: &'static str,
    policy: BoundsPolicy,
    priority: ParameterPriority,
}

const fn rule(
    block_type: &'static str,
    field: &'static str,
    policy: BoundsPolicy,
    priority: ParameterPriority,
) -> FieldRule {
    FieldRule {
        block_type,
        field,
        policy,
        priority,
    }
}

const SLIPPAGE: BoundsPolicy = BoundsPolicy::Fixed {
    min: SLIPPAGE_RANGE.0,
    max: SLIPPAGE_RANGE.1,
};
const AMOUNT: BoundsPolicy = BoundsPolicy::Relative {
    spread: AMOUNT_SPREAD,
};

static FIELD_RULES: &[FieldRule] = &[
    // 리스크
    rule("stop_loss", "percentage", BoundsPolicy::Percentage, ParameterPriority::Risk),
    rule("take_profit", "percentage", BoundsPolicy::Percentage, ParameterPriority::Risk),
    rule("trailing_stop", "percentage", BoundsPolicy::Percentage, ParameterPriority::Risk),
    // 진입
    rule(
        "price_trigger",
        "targetPrice",
        BoundsPolicy::Relative {
            spread: PRICE_TARGET_SPREAD,
        },
        ParameterPriority::Entry,
    ),
    rule(
        "time_trigger",
        "intervalHours",
        BoundsPolicy::Choices(INTERVAL_HOURS),
        ParameterPriority::Entry,
    ),
    // 비용
    rule("uniswap_swap", "slippage", SLIPPAGE, ParameterPriority::Cost),
    rule("curve_swap", "slippage", SLIPPAGE, ParameterPriority::Cost),
    // 사이징
    rule("uniswap_swap", "amount", AMOUNT, ParameterPriority::Sizing),
    rule("curve_swap", "amount", AMOUNT, ParameterPriority::Sizing),
    rule("aave_supply", "amount", AMOUNT, ParameterPriority::Sizing),
    rule("aave_borrow", "amount", AMOUNT, ParameterPriority::Sizing),
    rule("uniswap_add_liquidity", "amount", AMOUNT, ParameterPriority::Sizing),
];

/// 블록 타입이 최적화 규칙을 가지고 있는지 여부.
pub fn is_tunable_block_type(block_type: &str) -> bool {
    FIELD_RULES.iter().any(|r| r.block_type == block_type)
}

/// 블록 목록에서 파라미터 정의를 추출.
///
/// 같은 입력에 대해 항상 같은 결과를 반환하는 순수 함수입니다.
/// 빈 결과는 오류가 아니며, 실행 여부는 오케스트레이터가 판단합니다.
pub fn extract(blocks: &[StrategyBlock]) -> Vec<ParameterDefinition> {
    let mut candidates: Vec<(ParameterPriority, ParameterDefinition)> = Vec::new();

    for block in blocks {
        for rule in FIELD_RULES.iter().filter(|r| r.block_type == block.block_type) {
            match build_definition(block, rule) {
                Some(definition) => candidates.push((rule.priority, definition)),
                None => debug!(
                    block_id = %block.id,
                    block_type = %block.block_type,
                    field = rule.field,
                    "조정 불가 필드 건너뜀"
                ),
            }
        }
    }

    // 안정 정렬: 같은 우선순위 안에서는 블록 순서 유지
    candidates.sort_by_key(|(priority, _)| *priority);

    let found = candidates.len();
    if found > MAX_PARAMETERS {
        for (priority, dropped) in &candidates[MAX_PARAMETERS..] {
            debug!(
                block_id = %dropped.block_id,
                param = %dropped.param_name,
                priority = ?priority,
                "파라미터 상한 초과로 제외"
            );
        }
    }

    let definitions: Vec<ParameterDefinition> = candidates
        .into_iter()
        .take(MAX_PARAMETERS)
        .map(|(_, d)| d)
        .collect();

    info!(
        blocks = blocks.len(),
        found,
        extracted = definitions.len(),
        "탐색 공간 추출 완료"
    );

    definitions
}

/// 규칙 하나를 블록에 적용하여 정의 생성.
fn build_definition(block: &StrategyBlock, rule: &FieldRule) -> Option<ParameterDefinition> {
    let current = block.numeric_param(rule.field)?;

    let (kind, min, max, default_value) = match rule.policy {
        BoundsPolicy::Fixed { min, max } => {
            (ParameterKind::Continuous, min, max, current.clamp(min, max))
        }
        BoundsPolicy::Percentage => {
            let (min, max) = PERCENTAGE_RANGE;
            (ParameterKind::Percentage, min, max, current.clamp(min, max))
        }
        BoundsPolicy::Relative { spread } => {
            if current <= 0.0 {
                return None;
            }
            let min = current * (1.0 - spread);
            let max = current * (1.0 + spread);
            (ParameterKind::Continuous, min, max, current)
        }
        BoundsPolicy::Choices(values) => {
            let values = values.to_vec();
            let kind = ParameterKind::Discrete {
                values: values.clone(),
            };
            let min = values[0];
            let max = values[values.len() - 1];
            let default_value = values
                .iter()
                .copied()
                .min_by(|a, b| {
                    (a - current)
                        .abs()
                        .partial_cmp(&(b - current).abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(min);
            (kind, min, max, default_value)
        }
    };

    let definition = ParameterDefinition {
        block_id: block.id.clone(),
        block_type: block.block_type.clone(),
        param_name: rule.field.to_string(),
        kind,
        min,
        max,
        default_value,
    };

    definition.validate().ok().map(|_| definition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniswap_swap_scenario() {
        let blocks = vec![StrategyBlock::new("swap-1", "uniswap_swap")
            .with_param("slippage", 0.5)
            .with_param("amount", 100.0)];

        let defs = extract(&blocks);
        assert_eq!(defs.len(), 2);

        let slippage = defs.iter().find(|d| d.param_name == "slippage").unwrap();
        assert_eq!(slippage.kind, ParameterKind::Continuous);
        assert_eq!((slippage.min, slippage.max), (0.1, 2.0));
        assert_eq!(slippage.default_value, 0.5);

        let amount = defs.iter().find(|d| d.param_name == "amount").unwrap();
        assert_eq!(amount.kind, ParameterKind::Continuous);
        assert_eq!((amount.min, amount.max), (50.0, 150.0));
        assert_eq!(amount.default_value, 100.0);
    }

    #[test]
    fn test_percentage_fixed_range_clamps_default() {
        let blocks = vec![StrategyBlock::new("sl", "stop_loss").with_param("percentage", 35.0)];
        let defs = extract(&blocks);

        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].kind, ParameterKind::Percentage);
        assert_eq!((defs[0].min, defs[0].max), (1.0, 20.0));
        assert_eq!(defs[0].default_value, 20.0);
    }

    #[test]
    fn test_price_trigger_relative_bounds() {
        let blocks =
            vec![StrategyBlock::new("pt", "price_trigger").with_param("targetPrice", 2000.0)];
        let defs = extract(&blocks);

        assert_eq!(defs.len(), 1);
        assert!((defs[0].min - 1600.0).abs() < 1e-9);
        assert!((defs[0].max - 2400.0).abs() < 1e-9);
    }

    #[test]
    fn test_time_trigger_discrete_snaps_default() {
        let blocks = vec![StrategyBlock::new("tt", "time_trigger").with_param("intervalHours", 20.0)];
        let defs = extract(&blocks);

        assert_eq!(defs.len(), 1);
        assert!(matches!(defs[0].kind, ParameterKind::Discrete { .. }));
        assert_eq!(defs[0].default_value, 24.0);
    }

    #[test]
    fn test_unknown_and_invalid_fields_skipped() {
        let blocks = vec![
            StrategyBlock::new("x", "wallet_connect").with_param("amount", 10.0),
            StrategyBlock::new("a", "aave_supply").with_param("amount", 0.0),
            StrategyBlock::new("s", "uniswap_swap"),
        ];
        assert!(extract(&blocks).is_empty());
        assert!(extract(&[]).is_empty());
    }

    #[test]
    fn test_cap_keeps_highest_priority() {
        let mut blocks = Vec::new();
        for i in 0..9 {
            blocks.push(
                StrategyBlock::new(format!("swap-{}", i), "uniswap_swap")
                    .with_param("slippage", 0.5)
                    .with_param("amount", 100.0),
            );
        }
        blocks.push(StrategyBlock::new("sl", "stop_loss").with_param("percentage", 5.0));

        let defs = extract(&blocks);
        assert_eq!(defs.len(), MAX_PARAMETERS);
        // 리스크 파라미터가 가장 먼저, 사이징 파라미터는 모두 제외
        assert_eq!(defs[0].block_type, "stop_loss");
        assert!(defs.iter().all(|d| d.param_name != "amount"));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let blocks = vec![
            StrategyBlock::new("swap", "uniswap_swap")
                .with_param("slippage", 0.3)
                .with_param("amount", 42.0),
            StrategyBlock::new("tp", "take_profit").with_param("percentage", 8.0),
        ];
        assert_eq!(extract(&blocks), extract(&blocks));
        assert!(is_tunable_block_type("curve_swap"));
        assert!(!is_tunable_block_type("notify"));
    }
}
