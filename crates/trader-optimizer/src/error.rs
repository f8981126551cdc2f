//! 최적화 엔진 에러 타입 정의.

use thiserror::Error;

/// 최적화 엔진 오류
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// 설정 오류 (실행 전 즉시 실패)
    #[error("최적화 설정 오류: {0}")]
    Config(String),

    /// 조정 가능한 파라미터 없음
    #[error("최적화할 수 있는 파라미터가 없습니다. 전략 블록에 조정 가능한 값이 있는지 확인하세요")]
    EmptyParameterSpace,

    /// 파라미터 정의 불변식 위반
    #[error("파라미터 정의 오류 [{block_id}.{param_name}]: {reason}")]
    InvalidParameter {
        block_id: String,
        param_name: String,
        reason: String,
    },

    /// 백테스트 기간 오류
    #[error("백테스트 기간 오류: {0}")]
    Window(String),

    /// 후보 하나의 평가 실패 (실행은 계속됨)
    #[error("평가 실패: {0}")]
    Evaluation(String),

    /// 서로게이트 모델 학습 실패
    #[error("서로게이트 모델 오류: {0}")]
    Surrogate(String),
}

impl OptimizerError {
    /// 실행 시작 전에 호출자에게 바로 보고되는 설정 계열 오류인지 여부.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::EmptyParameterSpace
                | Self::InvalidParameter { .. }
                | Self::Window(_)
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, OptimizerError>;
