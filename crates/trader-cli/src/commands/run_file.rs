//! 최적화 실행 파일 (TOML/JSON).
//!
//! ```toml
//! [[blocks]]
//! id = "swap"
//! block_type = "uniswap_swap"
//! params = { slippage = 0.5, amount = 1000.0 }
//!
//! [optimization]
//! algorithm = "bayesian"
//! objectives = ["sharpeRatio", "maxDrawdown"]
//! max_iterations = 30
//!
//! [optimization.backtest_window]
//! start_date = "2024-01-01T00:00:00Z"
//! end_date = "2024-07-01T00:00:00Z"
//! ```

use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use trader_optimizer::{OptimizationConfig, StrategyBlock};

/// 실행 파일 형식
#[derive(Debug, Clone, Deserialize)]
pub struct RunFile {
    /// 실행 이름 (로그용)
    #[serde(default)]
    pub name: Option<String>,
    /// 최적화할 전략 블록
    pub blocks: Vec<StrategyBlock>,
    /// 최적화 설정
    pub optimization: OptimizationConfig,
}

impl RunFile {
    /// 로그에 표시할 이름.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}

/// 실행 파일 로드
pub fn load_run_file(path: &Path) -> Result<RunFile> {
    if !path.exists() {
        return Err(anyhow!("실행 파일을 찾을 수 없습니다: {}", path.display()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("실행 파일 읽기 실패 ({}): {}", path.display(), e))?;

    if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content)
            .map_err(|e| anyhow!("실행 파일 TOML 파싱 실패 ({}): {}", path.display(), e))
    } else if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content)
            .map_err(|e| anyhow!("실행 파일 JSON 파싱 실패 ({}): {}", path.display(), e))
    } else {
        Err(anyhow!(
            "지원하지 않는 형식입니다. .toml 또는 .json을 사용하세요: {}",
            path.display()
        ))
    }
}

#[cfg(test)]
mod tests {
    use trader_optimizer::{Algorithm, Objective};

    use super::*;

    const TOML_RUN: &str = r#"
name = "swap-tuning"

[[blocks]]
id = "swap"
block_type = "uniswap_swap"
params = { slippage = 0.5, amount = 1000.0 }

[[blocks]]
id = "timer"
block_type = "time_trigger"
params = { intervalHours = 24 }

[optimization]
algorithm = "genetic"
objectives = ["sharpeRatio", "maxDrawdown", "gasCosts"]
max_iterations = 10
seed = 7

[optimization.backtest_window]
start_date = "2024-01-01T00:00:00Z"
end_date = "2024-07-01T00:00:00Z"

[optimization.genetic]
population_size = 12
"#;

    #[test]
    fn test_parse_toml() {
        let run: RunFile = toml::from_str(TOML_RUN).unwrap();
        assert_eq!(run.display_name(), "swap-tuning");
        assert_eq!(run.blocks.len(), 2);
        assert_eq!(run.blocks[0].numeric_param("slippage"), Some(0.5));
        assert_eq!(run.blocks[1].numeric_param("intervalHours"), Some(24.0));

        let config = &run.optimization;
        assert_eq!(config.algorithm, Algorithm::Genetic);
        assert_eq!(config.objectives[2], Objective::GasCosts);
        assert_eq!(config.max_iterations(), 10);
        assert_eq!(config.genetic.population_size, 12);
        // 지정하지 않은 값은 기본값
        assert_eq!(config.genetic.tournament_size, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "blocks": [{ "id": "swap", "block_type": "uniswap_swap", "params": { "slippage": 1.0 } }],
            "optimization": {
                "algorithm": "bayesian",
                "objectives": ["totalReturn", "maxDrawdown"],
                "backtest_window": {
                    "start_date": "2024-01-01T00:00:00Z",
                    "end_date": "2024-03-01T00:00:00Z"
                }
            }
        }"#;
        let run: RunFile = serde_json::from_str(json).unwrap();
        assert_eq!(run.display_name(), "unnamed");
        assert_eq!(run.optimization.algorithm, Algorithm::Bayesian);
        assert_eq!(run.optimization.max_iterations(), 50);
    }

    #[test]
    fn test_missing_file() {
        let err = load_run_file(Path::new("does/not/exist.toml")).unwrap_err();
        assert!(err.to_string().contains("찾을 수 없습니다"));
    }
}
