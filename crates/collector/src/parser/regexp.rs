//! 정규식 파서
//!
//! 첫 번째 캡처 그룹을 타임스탬프로 해석합니다.
//! syslog / combined log 내장 형식도 이 파서의 사전 설정입니다.

use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;

use gleaner_core::types::RawLine;

use super::timestamp::parse_timestamp;

/// 정규식 기반 라인 파서
#[derive(Debug, Clone)]
pub struct RegexpParser {
    regex: Regex,
    time_format: Option<String>,
    zone: Option<FixedOffset>,
}

impl RegexpParser {
    /// 새 파서를 생성합니다.
    ///
    /// `zone`은 대상에 명시된 시간대이며, 없으면 라인의 시간대 힌트를 사용합니다.
    pub fn new(
        pattern: &str,
        time_format: Option<String>,
        zone: Option<FixedOffset>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            time_format,
            zone,
        })
    }

    /// 타임스탬프 형식이 설정되어 있는지
    pub fn has_time_format(&self) -> bool {
        self.time_format.is_some()
    }

    /// 라인에서 타임스탬프를 추출합니다.
    ///
    /// 매칭 실패와 해석 실패는 모두 `None`입니다.
    pub fn extract(&self, line: &RawLine) -> Option<DateTime<Utc>> {
        let format = self.time_format.as_deref()?;
        let captured = self.regex.captures(&line.content)?.get(1)?;
        parse_timestamp(format, self.zone.or(line.time_zone_hint), captured.as_str()).ok()
    }
}
