//! 최적화 목표(objective) 정의.
//!
//! 각 목표는 고정된 최적화 방향을 가집니다.
//!
//! | 목표 | 방향 |
//! |------|------|
//! | `sharpeRatio`, `totalReturn`, `winRate` | 최대화 |
//! | `maxDrawdown`, `gasCosts`, `protocolFees` | 최소화 |

use std::{cmp::Ordering, collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::OptimizerError;

/// 최적화 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// 클수록 좋음
    Maximize,
    /// 작을수록 좋음
    Minimize,
}

/// 백테스트 결과에서 산출되는 최적화 목표.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Objective {
    /// 샤프 비율
    SharpeRatio,
    /// 총 수익률
    TotalReturn,
    /// 최대 낙폭
    MaxDrawdown,
    /// 승률
    WinRate,
    /// 가스 비용
    GasCosts,
    /// 프로토콜 수수료
    ProtocolFees,
}

impl Objective {
    /// 전체 목표 목록.
    pub const ALL: [Objective; 6] = [
        Objective::SharpeRatio,
        Objective::TotalReturn,
        Objective::MaxDrawdown,
        Objective::WinRate,
        Objective::GasCosts,
        Objective::ProtocolFees,
    ];

    /// 목표의 최적화 방향.
    pub fn direction(self) -> Direction {
        match self {
            Objective::SharpeRatio | Objective::TotalReturn | Objective::WinRate => {
                Direction::Maximize
            }
            Objective::MaxDrawdown | Objective::GasCosts | Objective::ProtocolFees => {
                Direction::Minimize
            }
        }
    }

    /// 외부 인터페이스에서 사용하는 이름 (camelCase).
    pub fn as_str(self) -> &'static str {
        match self {
            Objective::SharpeRatio => "sharpeRatio",
            Objective::TotalReturn => "totalReturn",
            Objective::MaxDrawdown => "maxDrawdown",
            Objective::WinRate => "winRate",
            Objective::GasCosts => "gasCosts",
            Objective::ProtocolFees => "protocolFees",
        }
    }

    /// 두 값을 이 목표의 방향으로 비교.
    ///
    /// `Greater`는 `a`가 더 좋다는 의미입니다. 값이 없으면 가장 나쁜 값으로
    /// 취급하며, 둘 다 없으면 동률입니다.
    pub fn compare(self, a: Option<f64>, b: Option<f64>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (Some(x), Some(y)) => {
                let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                match self.direction() {
                    Direction::Maximize => ord,
                    Direction::Minimize => ord.reverse(),
                }
            }
        }
    }

    /// 값을 "작을수록 좋은" 비용으로 변환.
    pub fn to_cost(self, value: f64) -> f64 {
        match self.direction() {
            Direction::Maximize => -value,
            Direction::Minimize => value,
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Objective {
    type Err = OptimizerError;

    /// `sharpeRatio`, `sharpe_ratio`, `SHARPE_RATIO` 모두 허용.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        Objective::ALL
            .into_iter()
            .find(|o| o.as_str().to_lowercase() == normalized)
            .ok_or_else(|| OptimizerError::Config(format!("알 수 없는 최적화 목표: {}", s)))
    }
}

/// 목표별 점수 (희소).
///
/// 백테스트가 계산하지 못한 점수(예: 거래 0건의 승률)는 존재하지 않습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectiveScores(BTreeMap<Objective, f64>);

impl ObjectiveScores {
    /// 빈 점수 집합 생성.
    pub fn new() -> Self {
        Self::default()
    }

    /// 점수 조회.
    pub fn get(&self, objective: Objective) -> Option<f64> {
        self.0.get(&objective).copied()
    }

    /// 점수 저장. 유한하지 않은 값은 무시됩니다.
    pub fn insert(&mut self, objective: Objective, value: f64) {
        if value.is_finite() {
            self.0.insert(objective, value);
        }
    }

    /// 빌더 스타일 점수 추가.
    pub fn with(mut self, objective: Objective, value: f64) -> Self {
        self.insert(objective, value);
        self
    }

    /// 점수가 하나도 없는지 여부.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// (목표, 점수) 순회.
    pub fn iter(&self) -> impl Iterator<Item = (Objective, f64)> + '_ {
        self.0.iter().map(|(o, v)| (*o, *v))
    }
}

impl FromIterator<(Objective, f64)> for ObjectiveScores {
    fn from_iter<I: IntoIterator<Item = (Objective, f64)>>(iter: I) -> Self {
        let mut scores = ObjectiveScores::new();
        for (objective, value) in iter {
            scores.insert(objective, value);
        }
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directions() {
        assert_eq!(Objective::SharpeRatio.direction(), Direction::Maximize);
        assert_eq!(Objective::WinRate.direction(), Direction::Maximize);
        assert_eq!(Objective::MaxDrawdown.direction(), Direction::Minimize);
        assert_eq!(Objective::ProtocolFees.direction(), Direction::Minimize);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("sharpeRatio".parse::<Objective>().unwrap(), Objective::SharpeRatio);
        assert_eq!("max_drawdown".parse::<Objective>().unwrap(), Objective::MaxDrawdown);
        assert_eq!("GAS_COSTS".parse::<Objective>().unwrap(), Objective::GasCosts);
        assert!("profit".parse::<Objective>().is_err());
    }

    #[test]
    fn test_compare_missing_is_worst() {
        let o = Objective::MaxDrawdown;
        assert_eq!(o.compare(Some(10.0), Some(15.0)), Ordering::Greater);
        assert_eq!(o.compare(None, Some(99.0)), Ordering::Less);
        assert_eq!(o.compare(None, None), Ordering::Equal);
    }

    #[test]
    fn test_scores_drop_non_finite() {
        let scores = ObjectiveScores::new()
            .with(Objective::SharpeRatio, f64::NAN)
            .with(Objective::TotalReturn, 12.0);
        assert_eq!(scores.get(Objective::SharpeRatio), None);
        assert_eq!(scores.get(Objective::TotalReturn), Some(12.0));
    }

    #[test]
    fn test_serde_camel_case() {
        let scores = ObjectiveScores::new().with(Objective::SharpeRatio, 1.5);
        let json = serde_json::to_string(&scores).unwrap();
        assert_eq!(json, r#"{"sharpeRatio":1.5}"#);
    }
}
