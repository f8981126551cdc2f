//! 최적화 명령어.
//!
//! 실행 파일의 전략 블록을 가상 백테스트로 최적화하고 결과를 출력합니다.
//!
//! # 사용 예시
//!
//! ```bash
//! # 베이지안 최적화 (실행 파일 설정 그대로)
//! trader optimize -c config/optimizer.example.toml
//!
//! # 유전 알고리즘으로 바꾸고 30세대만 실행
//! trader optimize -c config/optimizer.example.toml -a genetic -n 30
//!
//! # 결과를 JSON으로 저장
//! trader optimize -c config/optimizer.example.toml -o results/run.json
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trader_optimizer::{
    Algorithm, BacktestRunner, OptimizationProgress, OptimizationResult, OptimizationSolution,
    ProgressPhase, StrategyOptimizer,
};

use crate::commands::run_file::load_run_file;

/// 진행 상황 채널 크기
const PROGRESS_CHANNEL_SIZE: usize = 64;

/// 최적화 CLI 설정
#[derive(Debug, Clone, Default)]
pub struct OptimizeCliConfig {
    /// 실행 파일 경로
    pub config_path: PathBuf,
    /// 알고리즘 덮어쓰기
    pub algorithm: Option<String>,
    /// 최대 반복 횟수 덮어쓰기
    pub max_iterations: Option<usize>,
    /// 최대 워커 수 덮어쓰기
    pub max_workers: Option<usize>,
    /// 난수 시드 덮어쓰기
    pub seed: Option<u64>,
    /// 결과 JSON 저장 경로
    pub output_path: Option<PathBuf>,
}

/// 최적화 실행.
///
/// `cancel`이 취소되면 진행 중인 평가만 마치고 부분 결과를 반환합니다.
pub async fn run_optimize(
    config: OptimizeCliConfig,
    runner: Arc<dyn BacktestRunner>,
    cancel: CancellationToken,
) -> Result<OptimizationResult> {
    let run = load_run_file(&config.config_path)?;
    let mut optimization = run.optimization.clone();

    if let Some(name) = &config.algorithm {
        optimization.algorithm = Algorithm::parse(name).ok_or_else(|| {
            anyhow!(
                "알 수 없는 알고리즘: {}. 지원: bayesian, genetic",
                name
            )
        })?;
    }
    if let Some(n) = config.max_iterations {
        optimization = optimization.with_max_iterations(n);
    }
    if let Some(workers) = config.max_workers {
        optimization = optimization.with_max_workers(workers);
    }
    if let Some(seed) = config.seed {
        optimization = optimization.with_seed(seed);
    }

    info!(
        run = run.display_name(),
        algorithm = %optimization.algorithm,
        blocks = run.blocks.len(),
        max_iterations = optimization.max_iterations(),
        workers = optimization.worker_count(),
        "최적화 시작"
    );

    let optimizer = Arc::new(StrategyOptimizer::new(runner));

    // 외부 종료 신호를 최적화기 취소로 전달
    let stop_forwarder = {
        let optimizer = optimizer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            warn!("종료 신호 수신, 진행 중인 평가를 마치고 중단합니다");
            optimizer.stop();
        })
    };

    let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_SIZE);
    let printer = tokio::spawn(print_progress(rx));

    let outcome = optimizer.optimize(&run.blocks, optimization, Some(tx)).await;
    stop_forwarder.abort();
    // 송신자가 모두 drop되면 출력 태스크가 끝남
    printer.await.ok();

    let result = outcome.context("최적화를 시작할 수 없습니다")?;

    println!("\n{}", result.summary());
    print_frontier(&result);

    if let Some(path) = &config.output_path {
        write_result(&result, path)?;
        println!("\n결과 저장 위치: {}", path.display());
    }

    if let Some(error) = &result.error {
        return Err(anyhow!("최적화 실패: {}", error));
    }
    Ok(result)
}

/// 진행 상황 출력 (채널이 닫힐 때까지).
async fn print_progress(mut rx: mpsc::Receiver<OptimizationProgress>) {
    while let Some(progress) = rx.recv().await {
        match progress.phase {
            ProgressPhase::Evaluating => {
                debug!(
                    completed = progress.completed_evaluations,
                    workers = progress.workers_active,
                    "평가 완료"
                );
                if let Some(error) = &progress.last_error {
                    debug!(error = %error, "최근 평가 오류");
                }
            }
            ProgressPhase::BatchComplete => {
                let best = progress
                    .best_solution
                    .as_ref()
                    .map(format_scores)
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "[{:>4}/{:<4}] 평가 {:>5} | 프런티어 {:>3} | 최고 {} | 남은 시간 {:.0}초",
                    progress.iteration,
                    progress.max_iterations,
                    progress.completed_evaluations,
                    progress.pareto_frontier.len(),
                    best,
                    progress.estimated_time_remaining_seconds
                );
            }
        }
    }
}

fn format_scores(solution: &OptimizationSolution) -> String {
    solution
        .in_sample_scores
        .iter()
        .map(|(o, v)| format!("{}={:.3}", o, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 파레토 프런티어 표 출력.
fn print_frontier(result: &OptimizationResult) {
    if result.pareto_frontier.is_empty() {
        return;
    }

    println!("\n=== 파레토 프런티어 ===");
    for solution in &result.pareto_frontier {
        let params = solution
            .parameters
            .iter()
            .map(|(block, name, value)| format!("{}.{}={:.4}", block, name, value))
            .collect::<Vec<_>>()
            .join(", ");
        let validation = match &solution.degradation {
            Some(d) if d.undefined => "검증 불가".to_string(),
            Some(d) if d.overfit => format!("과최적화 ({:.1}% 저하)", d.pct),
            Some(d) => format!("{:.1}% 저하", d.pct),
            None => "미검증".to_string(),
        };
        println!(
            "#{:<5} {} | {} | {}",
            solution.evaluation_index,
            format_scores(solution),
            validation,
            params
        );
    }
}

/// 결과를 JSON 파일로 저장.
fn write_result(result: &OptimizationResult, path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("출력 디렉토리 생성 실패: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json)
        .with_context(|| format!("결과 저장 실패: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticBacktest;

    const RUN: &str = r#"
[[blocks]]
id = "swap"
block_type = "uniswap_swap"
params = { slippage = 0.5, amount = 1000.0 }

[[blocks]]
id = "sl"
block_type = "stop_loss"
params = { percentage = 10.0 }

[optimization]
algorithm = "bayesian"
objectives = ["sharpeRatio", "maxDrawdown"]
max_iterations = 7
max_workers = 2
seed = 3

[optimization.backtest_window]
start_date = "2024-01-01T00:00:00Z"
end_date = "2024-07-01T00:00:00Z"
"#;

    fn write_run(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("run.toml");
        std::fs::write(&path, RUN).unwrap();
        path
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("trader-cli-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_optimize_writes_result() {
        let dir = temp_dir("optimize");
        let output = dir.join("out/result.json");
        let config = OptimizeCliConfig {
            config_path: write_run(&dir),
            output_path: Some(output.clone()),
            ..Default::default()
        };

        let result = run_optimize(config, Arc::new(SyntheticBacktest::new()), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.total_iterations, 7);
        assert!(!result.pareto_frontier.is_empty());

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(saved["total_iterations"], 7);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_overrides_apply() {
        let dir = temp_dir("overrides");
        let config = OptimizeCliConfig {
            config_path: write_run(&dir),
            algorithm: Some("ga".to_string()),
            max_iterations: Some(2),
            ..Default::default()
        };

        let result = run_optimize(config, Arc::new(SyntheticBacktest::new()), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.config.algorithm, Algorithm::Genetic);
        assert_eq!(result.total_iterations, 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_unknown_algorithm_rejected() {
        let dir = temp_dir("unknown");
        let config = OptimizeCliConfig {
            config_path: write_run(&dir),
            algorithm: Some("annealing".to_string()),
            ..Default::default()
        };

        let err = run_optimize(config, Arc::new(SyntheticBacktest::new()), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("annealing"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
