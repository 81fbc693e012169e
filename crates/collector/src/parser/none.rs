//! 무형식 파서
//!
//! 라인 내용은 해석하지 않습니다. 타임스탬프는 트랜스포트가 준 값만 사용합니다.

use chrono::{DateTime, Utc};

use gleaner_core::types::RawLine;

/// 내용을 해석하지 않는 라인 파서
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneParser;

impl NoneParser {
    /// 트랜스포트 타임스탬프 (`kubectl logs --timestamps`)
    pub fn extract(&self, line: &RawLine) -> Option<DateTime<Utc>> {
        line.timestamp_from_transport
    }
}
