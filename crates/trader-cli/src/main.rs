//! 전략 파라미터 최적화 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 탐색 공간 확인
//! trader params -c config/optimizer.example.toml
//!
//! # 베이지안 최적화 실행
//! trader optimize -c config/optimizer.example.toml
//!
//! # 유전 알고리즘, 워커 8개, 결과 저장
//! trader optimize -c config/optimizer.example.toml -a genetic -w 8 -o results/ga.json
//!
//! # 상세 로그
//! RUST_LOG=trader_optimizer=debug trader optimize -c config/optimizer.example.toml
//! ```

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod synthetic;

use commands::{
    optimize::{run_optimize, OptimizeCliConfig},
    params::print_parameters,
};
use synthetic::SyntheticBacktest;

#[derive(Parser)]
#[command(name = "trader")]
#[command(about = "Strategy optimizer CLI - 다목적 전략 파라미터 최적화", long_about = None)]
#[command(version)]
struct Cli {
    /// 로그 레벨 (RUST_LOG가 없을 때 사용)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 전략 블록 최적화 실행 (가상 백테스트)
    Optimize {
        /// 실행 파일 경로 (.toml / .json)
        #[arg(short, long)]
        config: PathBuf,

        /// 탐색 알고리즘 (bayesian, genetic)
        #[arg(short, long)]
        algorithm: Option<String>,

        /// 최대 반복 횟수 (베이지안: 평가 수, 유전: 세대 수)
        #[arg(short = 'n', long)]
        max_iterations: Option<usize>,

        /// 최대 동시 워커 수
        #[arg(short, long, env = "OPTIMIZER_MAX_WORKERS")]
        workers: Option<usize>,

        /// 난수 시드 (재현 가능한 실행)
        #[arg(long)]
        seed: Option<u64>,

        /// 결과 JSON 저장 경로
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 실행 파일의 탐색 공간 출력
    Params {
        /// 실행 파일 경로 (.toml / .json)
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env 파일 로드 (없어도 에러 안남)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "trader={},trader_optimizer={}",
                    cli.log_level, cli.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Optimize {
            config,
            algorithm,
            max_iterations,
            workers,
            seed,
            output,
        } => {
            let config = OptimizeCliConfig {
                config_path: config,
                algorithm,
                max_iterations,
                max_workers: workers,
                seed,
                output_path: output,
            };

            // Ctrl+C → 최적화 중단 (부분 결과 출력)
            let shutdown = CancellationToken::new();
            let signal_task = {
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Ctrl+C 수신");
                        shutdown.cancel();
                    }
                })
            };

            let outcome = run_optimize(config, Arc::new(SyntheticBacktest::new()), shutdown).await;
            signal_task.abort();

            match outcome {
                Ok(result) => {
                    info!(
                        iterations = result.total_iterations,
                        frontier = result.pareto_frontier.len(),
                        cancelled = result.cancelled,
                        "최적화 종료"
                    );
                }
                Err(e) => {
                    error!("Optimization failed: {:#}", e);
                    return Err(e.into());
                }
            }
        }

        Commands::Params { config } => {
            if let Err(e) = print_parameters(&config) {
                error!("Parameter listing failed: {:#}", e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}
