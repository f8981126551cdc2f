//! 탐색 공간 확인 명령어.
//!
//! 최적화를 돌리기 전에 실행 파일에서 어떤 파라미터가 어떤 범위로
//! 탐색될지 보여줍니다.
//!
//! ```bash
//! trader params -c config/optimizer.example.toml
//! ```

use std::path::Path;

use anyhow::{anyhow, Result};
use trader_optimizer::{
    extract, is_tunable_block_type, ParameterDefinition, ParameterKind, ParameterSpace,
};

use crate::commands::run_file::load_run_file;

/// 실행 파일에서 계산한 탐색 공간.
#[derive(Debug, Clone)]
pub struct ResolvedSpace {
    /// 탐색할 파라미터 정의
    pub definitions: Vec<ParameterDefinition>,
    /// 설정의 명시적 `parameters`를 사용했는지 여부
    pub explicit: bool,
    /// 최적화 규칙이 없는 블록 (`id (block_type)`)
    pub untunable_blocks: Vec<String>,
}

/// 실행 파일의 탐색 공간 계산.
///
/// 명시적 `parameters`가 있으면 그것을, 없으면 블록에서 추출한 정의를 사용합니다.
pub fn resolve_definitions(path: &Path) -> Result<ResolvedSpace> {
    let run = load_run_file(path)?;
    let untunable_blocks = run
        .blocks
        .iter()
        .filter(|b| !is_tunable_block_type(&b.block_type))
        .map(|b| format!("{} ({})", b.id, b.block_type))
        .collect();

    let (definitions, explicit) = match run.optimization.parameters {
        Some(explicit) => {
            // 범위와 중복 검증을 위해 공간을 한 번 만들어 봄
            ParameterSpace::new(explicit.clone())?;
            (explicit, true)
        }
        None => (extract(&run.blocks), false),
    };

    Ok(ResolvedSpace {
        definitions,
        explicit,
        untunable_blocks,
    })
}

/// 탐색 공간 출력.
pub fn print_parameters(path: &Path) -> Result<()> {
    let resolved = resolve_definitions(path)?;
    if !resolved.untunable_blocks.is_empty() {
        println!(
            "조정 규칙이 없어 건너뛴 블록: {}",
            resolved.untunable_blocks.join(", ")
        );
    }

    let definitions = &resolved.definitions;
    if definitions.is_empty() {
        return Err(anyhow!(
            "조정 가능한 파라미터가 없습니다: {}",
            path.display()
        ));
    }

    println!(
        "\n=== 탐색 공간 ({}개, {}) ===",
        definitions.len(),
        if resolved.explicit { "명시적 정의" } else { "블록에서 추출" }
    );
    println!(
        "{:<12} {:<22} {:<16} {:<10} {:>12} {:>12} {:>12}",
        "블록", "타입", "파라미터", "종류", "최소", "최대", "기본값"
    );
    println!("{}", "-".repeat(100));
    for d in definitions {
        let kind = match &d.kind {
            ParameterKind::Continuous => "continuous".to_string(),
            ParameterKind::Percentage => "percentage".to_string(),
            ParameterKind::Discrete { values } => format!("discrete({})", values.len()),
        };
        println!(
            "{:<12} {:<22} {:<16} {:<10} {:>12.4} {:>12.4} {:>12.4}",
            d.block_id, d.block_type, d.param_name, kind, d.min, d.max, d.default_value
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("trader-cli-params-{}-{}.toml", name, std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    const WINDOW: &str = r#"
[optimization]
algorithm = "bayesian"
objectives = ["sharpeRatio", "maxDrawdown"]

[optimization.backtest_window]
start_date = "2024-01-01T00:00:00Z"
end_date = "2024-07-01T00:00:00Z"
"#;

    #[test]
    fn test_extracted_from_blocks() {
        let path = write(
            "extract",
            &format!(
                "[[blocks]]\nid = \"swap\"\nblock_type = \"uniswap_swap\"\nparams = {{ slippage = 0.5, amount = 100.0 }}\n{}",
                WINDOW
            ),
        );
        let resolved = resolve_definitions(&path).unwrap();
        assert!(!resolved.explicit);
        assert_eq!(resolved.definitions.len(), 2);
        assert!(resolved.definitions.iter().all(|d| d.block_id == "swap"));
        assert!(resolved.untunable_blocks.is_empty());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_no_tunable_blocks_is_error() {
        let path = write(
            "empty",
            &format!("[[blocks]]\nid = \"w\"\nblock_type = \"wallet_connect\"\n{}", WINDOW),
        );
        assert_eq!(
            resolve_definitions(&path).unwrap().untunable_blocks,
            vec!["w (wallet_connect)".to_string()]
        );
        assert!(print_parameters(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
