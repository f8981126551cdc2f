//! 탐색 공간 정의.

use std::collections::HashSet;

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    block::ParameterSet,
    error::{OptimizerError, Result},
};

/// 파라미터 종류 (닫힌 집합).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterKind {
    /// 연속 값
    Continuous,
    /// 백분율 값 (연속, 고정 범위)
    Percentage,
    /// 이산 선택지 (오름차순)
    Discrete { values: Vec<f64> },
}

/// 최적화 대상 파라미터 하나.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// 소속 블록 ID
    pub block_id: String,
    /// 소속 블록 타입
    pub block_type: String,
    /// 블록 내 파라미터 이름
    pub param_name: String,
    /// 파라미터 종류
    #[serde(flatten)]
    pub kind: ParameterKind,
    /// 하한
    pub min: f64,
    /// 상한
    pub max: f64,
    /// 기본값 (블록의 현재 값)
    pub default_value: f64,
}

impl ParameterDefinition {
    /// 연속 파라미터 생성.
    pub fn continuous(
        block_id: impl Into<String>,
        block_type: impl Into<String>,
        param_name: impl Into<String>,
        min: f64,
        max: f64,
        default_value: f64,
    ) -> Self {
        Self {
            block_id: block_id.into(),
            block_type: block_type.into(),
            param_name: param_name.into(),
            kind: ParameterKind::Continuous,
            min,
            max,
            default_value,
        }
    }

    /// 불변식 검증.
    ///
    /// - 모든 수치는 유한해야 함
    /// - `min <= default_value <= max`
    /// - 이산 파라미터는 선택지가 비어있지 않고 오름차순이며 기본값을 포함해야 함
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| OptimizerError::InvalidParameter {
            block_id: self.block_id.clone(),
            param_name: self.param_name.clone(),
            reason,
        };

        if !(self.min.is_finite() && self.max.is_finite() && self.default_value.is_finite()) {
            return Err(invalid("유한하지 않은 값".to_string()));
        }
        if self.min > self.max {
            return Err(invalid(format!("min({}) > max({})", self.min, self.max)));
        }
        if self.default_value < self.min || self.default_value > self.max {
            return Err(invalid(format!(
                "기본값 {}이(가) 범위 [{}, {}]를 벗어남",
                self.default_value, self.min, self.max
            )));
        }
        if let ParameterKind::Discrete { values } = &self.kind {
            if values.is_empty() {
                return Err(invalid("이산 선택지가 비어있음".to_string()));
            }
            if values.iter().any(|v| !v.is_finite()) || values.windows(2).any(|w| w[0] >= w[1]) {
                return Err(invalid("이산 선택지는 유한한 오름차순이어야 함".to_string()));
            }
            if !values.contains(&self.default_value) {
                return Err(invalid("기본값이 이산 선택지에 없음".to_string()));
            }
        }
        Ok(())
    }

    /// 값을 허용 범위로 보정 (이산 파라미터는 가장 가까운 선택지로 스냅).
    pub fn clamp(&self, value: f64) -> f64 {
        match &self.kind {
            ParameterKind::Discrete { values } => nearest_choice(values, value),
            _ => {
                if value.is_nan() {
                    self.default_value
                } else {
                    value.clamp(self.min, self.max)
                }
            }
        }
    }

    /// 균등 분포에서 값 하나를 추출.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match &self.kind {
            ParameterKind::Discrete { values } => {
                values.choose(rng).copied().unwrap_or(self.default_value)
            }
            _ => self.from_unit(rng.gen::<f64>()),
        }
    }

    /// 값을 `[0, 1]` 구간으로 사상.
    pub fn to_unit(&self, value: f64) -> f64 {
        match &self.kind {
            // 선택지마다 같은 폭의 구간을 차지하고, 값은 구간 중앙으로 사상
            ParameterKind::Discrete { values } => {
                if values.is_empty() {
                    return 0.5;
                }
                let idx = values
                    .iter()
                    .position(|v| *v == nearest_choice(values, value))
                    .unwrap_or(0);
                (idx as f64 + 0.5) / values.len() as f64
            }
            _ => {
                let range = self.max - self.min;
                if range <= 0.0 {
                    0.5
                } else {
                    ((value - self.min) / range).clamp(0.0, 1.0)
                }
            }
        }
    }

    /// `[0, 1]` 값을 파라미터 값으로 역사상.
    pub fn from_unit(&self, unit: f64) -> f64 {
        let unit = if unit.is_nan() { 0.5 } else { unit.clamp(0.0, 1.0) };
        match &self.kind {
            ParameterKind::Discrete { values } => {
                if values.is_empty() {
                    return self.default_value;
                }
                let idx = (unit * values.len() as f64).floor() as usize;
                values[idx.min(values.len() - 1)]
            }
            _ => self.min + unit * (self.max - self.min),
        }
    }

    /// 탐색 범위 폭.
    pub fn range(&self) -> f64 {
        self.max - self.min
    }
}

/// 정렬된 선택지에서 가장 가까운 값.
fn nearest_choice(values: &[f64], value: f64) -> f64 {
    values
        .iter()
        .copied()
        .min_by(|a, b| {
            (a - value)
                .abs()
                .partial_cmp(&(b - value).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(value)
}

/// 한 번의 최적화 실행에서 사용하는 탐색 공간.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSpace {
    definitions: Vec<ParameterDefinition>,
}

impl ParameterSpace {
    /// 정의 목록으로 탐색 공간 생성.
    ///
    /// 각 정의를 검증하고, 같은 `(block_id, param_name)`이 두 번 나오면 거부합니다.
    pub fn new(definitions: Vec<ParameterDefinition>) -> Result<Self> {
        let mut seen = HashSet::new();
        for definition in &definitions {
            definition.validate()?;
            if !seen.insert((definition.block_id.as_str(), definition.param_name.as_str())) {
                return Err(OptimizerError::InvalidParameter {
                    block_id: definition.block_id.clone(),
                    param_name: definition.param_name.clone(),
                    reason: "같은 파라미터가 두 번 정의됨".to_string(),
                });
            }
        }
        Ok(Self { definitions })
    }

    /// 파라미터 정의 목록.
    pub fn definitions(&self) -> &[ParameterDefinition] {
        &self.definitions
    }

    /// 차원 수.
    pub fn dimensions(&self) -> usize {
        self.definitions.len()
    }

    /// 비어있는지 여부.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// 모든 파라미터를 기본값으로 채운 세트.
    pub fn defaults(&self) -> ParameterSet {
        let mut set = ParameterSet::new();
        for d in &self.definitions {
            set.set(&d.block_id, &d.param_name, d.default_value);
        }
        set
    }

    /// 균등 무작위 후보 하나.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterSet {
        let mut set = ParameterSet::new();
        for d in &self.definitions {
            set.set(&d.block_id, &d.param_name, d.sample(rng));
        }
        set
    }

    /// 라틴 하이퍼큐브 샘플링.
    ///
    /// 각 차원을 `n`개 구간으로 나누고, 구간마다 정확히 한 점이 오도록
    /// 무작위 순열로 배치합니다.
    pub fn latin_hypercube<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<ParameterSet> {
        if n == 0 {
            return Vec::new();
        }

        let mut points = vec![vec![0.0; self.dimensions()]; n];
        for dim in 0..self.dimensions() {
            let mut strata: Vec<usize> = (0..n).collect();
            strata.shuffle(rng);
            for (point, stratum) in points.iter_mut().zip(strata) {
                point[dim] = (stratum as f64 + rng.gen::<f64>()) / n as f64;
            }
        }

        points.iter().map(|p| self.from_unit(p)).collect()
    }

    /// 파라미터 세트를 단위 초입방체 좌표로 변환 (없는 값은 기본값 사용).
    pub fn to_unit(&self, set: &ParameterSet) -> Vec<f64> {
        self.definitions
            .iter()
            .map(|d| {
                let value = set
                    .get(&d.block_id, &d.param_name)
                    .unwrap_or(d.default_value);
                d.to_unit(value)
            })
            .collect()
    }

    /// 단위 초입방체 좌표를 파라미터 세트로 변환.
    pub fn from_unit(&self, point: &[f64]) -> ParameterSet {
        let mut set = ParameterSet::new();
        for (i, d) in self.definitions.iter().enumerate() {
            let unit = point.get(i).copied().unwrap_or(0.5);
            set.set(&d.block_id, &d.param_name, d.from_unit(unit));
        }
        set
    }

    /// 모든 값을 허용 범위로 보정한 세트 (없는 값은 기본값).
    pub fn clamp(&self, set: &ParameterSet) -> ParameterSet {
        let mut clamped = ParameterSet::new();
        for d in &self.definitions {
            let value = set
                .get(&d.block_id, &d.param_name)
                .map(|v| d.clamp(v))
                .unwrap_or(d.default_value);
            clamped.set(&d.block_id, &d.param_name, value);
        }
        clamped
    }

    /// 세트의 모든 값이 정의 범위 안에 있는지 여부.
    pub fn contains(&self, set: &ParameterSet) -> bool {
        self.definitions.iter().all(|d| {
            set.get(&d.block_id, &d.param_name).is_some_and(|v| match &d.kind {
                ParameterKind::Discrete { values } => values.contains(&v),
                _ => v >= d.min && v <= d.max,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn discrete() -> ParameterDefinition {
        ParameterDefinition {
            block_id: "t1".into(),
            block_type: "time_trigger".into(),
            param_name: "intervalHours".into(),
            kind: ParameterKind::Discrete {
                values: vec![1.0, 4.0, 12.0, 24.0],
            },
            min: 1.0,
            max: 24.0,
            default_value: 4.0,
        }
    }

    #[test]
    fn test_validate_rejects_default_out_of_bounds() {
        let d = ParameterDefinition::continuous("b", "uniswap_swap", "slippage", 0.1, 2.0, 3.0);
        assert!(d.validate().is_err());

        let ok = ParameterDefinition::continuous("b", "uniswap_swap", "slippage", 0.1, 2.0, 0.5);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_discrete() {
        let mut d = discrete();
        d.kind = ParameterKind::Discrete { values: vec![] };
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_discrete_clamp_snaps() {
        let d = discrete();
        assert_eq!(d.clamp(10.0), 12.0);
        assert_eq!(d.clamp(100.0), 24.0);
        assert_eq!(d.from_unit(0.0), 1.0);
        assert_eq!(d.from_unit(1.0), 24.0);
        assert_eq!(d.to_unit(24.0), 0.875);
    }

    #[test]
    fn test_discrete_choices_share_unit_interval_equally() {
        let d = discrete();
        // 4개 선택지 → 각 0.25 폭
        assert_eq!(d.from_unit(0.24), 1.0);
        assert_eq!(d.from_unit(0.26), 4.0);
        assert_eq!(d.from_unit(0.74), 12.0);
        assert_eq!(d.from_unit(0.76), 24.0);
        for v in [1.0, 4.0, 12.0, 24.0] {
            assert_eq!(d.from_unit(d.to_unit(v)), v);
        }

        let space = ParameterSpace::new(vec![d]).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let mut picked: Vec<f64> = space
            .latin_hypercube(4, &mut rng)
            .iter()
            .map(|s| s.get("t1", "intervalHours").unwrap())
            .collect();
        picked.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(picked, vec![1.0, 4.0, 12.0, 24.0]);
    }

    #[test]
    fn test_space_rejects_duplicate_parameter() {
        let swap = ParameterDefinition::continuous("swap", "uniswap_swap", "slippage", 0.1, 2.0, 0.5);
        let err = ParameterSpace::new(vec![swap.clone(), swap]).unwrap_err();
        assert!(matches!(
            err,
            OptimizerError::InvalidParameter { ref block_id, ref param_name, .. }
                if block_id == "swap" && param_name == "slippage"
        ));

        let amount = ParameterDefinition::continuous("swap", "uniswap_swap", "amount", 50.0, 150.0, 100.0);
        let other = ParameterDefinition::continuous("swap2", "uniswap_swap", "slippage", 0.1, 2.0, 0.5);
        assert!(ParameterSpace::new(vec![amount, other]).is_ok());
    }

    #[test]
    fn test_unit_round_trip_continuous() {
        let d = ParameterDefinition::continuous("b", "uniswap_swap", "amount", 50.0, 150.0, 100.0);
        assert!((d.from_unit(d.to_unit(75.0)) - 75.0).abs() < 1e-9);
        assert_eq!(d.to_unit(1000.0), 1.0);
    }

    #[test]
    fn test_latin_hypercube_covers_strata() {
        let space = ParameterSpace::new(vec![ParameterDefinition::continuous(
            "b", "uniswap_swap", "slippage", 0.0, 1.0, 0.5,
        )])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        let samples = space.latin_hypercube(5, &mut rng);
        assert_eq!(samples.len(), 5);

        let mut strata: Vec<usize> = samples
            .iter()
            .map(|s| (s.get("b", "slippage").unwrap() * 5.0).floor() as usize)
            .collect();
        strata.sort_unstable();
        assert_eq!(strata, vec![0, 1, 2, 3, 4]);
        assert!(samples.iter().all(|s| space.contains(s)));
    }

    #[test]
    fn test_serde_tagged_kind() {
        let json = serde_json::to_value(discrete()).unwrap();
        assert_eq!(json["kind"], "discrete");
        assert_eq!(json["values"][0], 1.0);
        let back: ParameterDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(back, discrete());
    }
}
