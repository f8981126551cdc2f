//! 전략 블록과 파라미터 세트.
//!
//! 전략 블록은 외부(전략 에디터)에서 정의되는 느슨한 형식의 데이터입니다.
//! 엔진은 블록의 `params`에서 숫자 값을 읽고, 후보 파라미터를 블록 **사본**에
//! 적용할 때만 값을 씁니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// 전략을 구성하는 블록 하나.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyBlock {
    /// 블록 ID
    pub id: String,
    /// 블록 타입 (예: `uniswap_swap`, `stop_loss`)
    pub block_type: String,
    /// 블록 파라미터 (자유 형식)
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl StrategyBlock {
    /// 새 블록 생성.
    pub fn new(id: impl Into<String>, block_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            block_type: block_type.into(),
            params: Map::new(),
        }
    }

    /// 빌더 스타일 숫자 파라미터 설정.
    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set_numeric_param(name, value);
        self
    }

    /// 숫자 파라미터 조회.
    ///
    /// JSON 숫자와 숫자 문자열(`"0.5"`)을 모두 허용하며 유한한 값만 반환합니다.
    pub fn numeric_param(&self, name: &str) -> Option<f64> {
        let value = match self.params.get(name)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        value.is_finite().then_some(value)
    }

    /// 숫자 파라미터 저장.
    pub fn set_numeric_param(&mut self, name: impl Into<String>, value: f64) {
        let json = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        self.params.insert(name.into(), json);
    }
}

/// 후보 파라미터 값 (`block_id -> {param_name -> value}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet(BTreeMap<String, BTreeMap<String, f64>>);

impl ParameterSet {
    /// 빈 파라미터 세트 생성.
    pub fn new() -> Self {
        Self::default()
    }

    /// 값 조회.
    pub fn get(&self, block_id: &str, param_name: &str) -> Option<f64> {
        self.0.get(block_id)?.get(param_name).copied()
    }

    /// 값 저장.
    pub fn set(&mut self, block_id: impl Into<String>, param_name: impl Into<String>, value: f64) {
        self.0
            .entry(block_id.into())
            .or_default()
            .insert(param_name.into(), value);
    }

    /// 저장된 값 개수.
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    /// 비어있는지 여부.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (block_id, param_name, value) 순회.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, f64)> + '_ {
        self.0.iter().flat_map(|(block_id, params)| {
            params
                .iter()
                .map(move |(name, value)| (block_id.as_str(), name.as_str(), *value))
        })
    }

    /// 내용 기반 해시 (평가 캐시 키).
    ///
    /// 값은 소수점 9자리로 정규화되므로 부동소수점 잡음만 다른 두 세트는
    /// 같은 키를 가집니다.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (block_id, name, value) in self.iter() {
            let mut formatted = format!("{:.9}", value);
            // 반올림 후 0이 된 음수(-0.000000000)는 0과 같은 키
            if formatted.trim_start_matches('-').bytes().all(|c| c == b'0' || c == b'.') {
                formatted = format!("{:.9}", 0.0);
            }
            hasher.update(block_id.as_bytes());
            hasher.update([0x1f]);
            hasher.update(name.as_bytes());
            hasher.update([0x1f]);
            hasher.update(formatted.as_bytes());
            hasher.update([0x1e]);
        }
        hex::encode(hasher.finalize())
    }
}

/// 블록 사본에 파라미터 세트를 적용.
///
/// 원본 블록은 변경되지 않습니다. 세트에 있지만 블록 목록에 없는 ID는 무시됩니다.
pub fn apply_parameters(blocks: &[StrategyBlock], parameters: &ParameterSet) -> Vec<StrategyBlock> {
    blocks
        .iter()
        .map(|block| {
            let mut copy = block.clone();
            if let Some(overrides) = parameters.0.get(&block.id) {
                for (name, value) in overrides {
                    copy.set_numeric_param(name.clone(), *value);
                }
            }
            copy
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_numeric_param_accepts_strings() {
        let mut block = StrategyBlock::new("b1", "uniswap_swap");
        block.params.insert("slippage".into(), json!("0.5"));
        block.params.insert("amount".into(), json!(100));
        block.params.insert("token".into(), json!("USDC"));

        assert_eq!(block.numeric_param("slippage"), Some(0.5));
        assert_eq!(block.numeric_param("amount"), Some(100.0));
        assert_eq!(block.numeric_param("token"), None);
        assert_eq!(block.numeric_param("missing"), None);
    }

    #[test]
    fn test_apply_parameters_does_not_mutate_original() {
        let blocks = vec![StrategyBlock::new("b1", "uniswap_swap").with_param("amount", 100.0)];
        let mut set = ParameterSet::new();
        set.set("b1", "amount", 120.0);
        set.set("unknown", "amount", 1.0);

        let applied = apply_parameters(&blocks, &set);

        assert_eq!(blocks[0].numeric_param("amount"), Some(100.0));
        assert_eq!(applied[0].numeric_param("amount"), Some(120.0));
        assert_eq!(applied.len(), 1);
    }

    #[test]
    fn test_fingerprint_normalizes_noise() {
        let mut a = ParameterSet::new();
        a.set("b1", "slippage", 0.5);
        a.set("b2", "percentage", 5.0);

        let mut b = ParameterSet::new();
        b.set("b2", "percentage", 5.0 + 1e-12);
        b.set("b1", "slippage", 0.5);

        let mut c = ParameterSet::new();
        c.set("b1", "slippage", 0.6);
        c.set("b2", "percentage", 5.0);

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_fingerprint_treats_rounded_negative_zero_as_zero() {
        let fingerprint = |value: f64| {
            let mut set = ParameterSet::new();
            set.set("b1", "targetPrice", value);
            set.fingerprint()
        };

        assert_eq!(fingerprint(-1e-12), fingerprint(1e-12));
        assert_eq!(fingerprint(-0.0), fingerprint(0.0));
        assert_eq!(fingerprint(-1e-12), fingerprint(0.0));
        assert_ne!(fingerprint(-1e-3), fingerprint(1e-3));
    }
}
