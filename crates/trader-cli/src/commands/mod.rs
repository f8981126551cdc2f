//! CLI 명령어 모듈.

pub mod optimize;
pub mod params;
pub mod run_file;
