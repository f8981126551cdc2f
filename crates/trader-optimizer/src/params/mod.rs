//! 파라미터 추출 모듈
//!
//! # 주요 구성요소
//!
//! - [`extract`]: 전략 블록에서 탐색 공간 추출
//! - [`ParameterDefinition`]: 파라미터 하나의 종류/범위/기본값
//! - [`ParameterSpace`]: 샘플링과 단위 좌표 변환을 제공하는 탐색 공간

pub mod definition;
pub mod extractor;

pub use definition::{ParameterDefinition, ParameterKind, ParameterSpace};
pub use extractor::{extract, is_tunable_block_type, ParameterPriority, MAX_PARAMETERS};
