//! 로그 파싱 모듈 -- 원시 라인을 타임스탬프가 붙은 레코드로 조립
//!
//! [`LineParser`]는 대상의 레코드 형식으로 한 번 선택되며, 각 라인의 타임스탬프를
//! 추출합니다. [`RecordAssembler`]가 이어받기, 멀티라인 조립, 시간 창 필터링을
//! 세션 단위 상태로 수행합니다.
//!
//! # 지원 형식
//! - 정규식 ([`RegexpParser`]), syslog / combined log 내장 설정 포함
//! - 무형식 ([`NoneParser`])
//!
//! # 사용 예시
//! ```ignore
//! use gleaner_collector::parser::{LineParser, RecordAssembler};
//!
//! let parser = LineParser::from_target(&target)?;
//! let mut assembler = RecordAssembler::new(parser, &target, window, 1000);
//! let mut out = Vec::new();
//! assembler.push(line, &mut out);
//! ```

pub mod assembler;
pub mod none;
pub mod regexp;
pub mod timestamp;

pub use assembler::{Flow, GateState, RecordAssembler, WindowGate, run_parser};
pub use none::NoneParser;
pub use regexp::RegexpParser;
pub use timestamp::{parse_timestamp, parse_timestamp_on};

use chrono::{DateTime, Utc};

use gleaner_core::types::{RawLine, RecordType, Target};

use crate::error::CollectError;

/// syslog 라인 (`Mar  5 23:59:59 host app: ...`)
pub const SYSLOG_REGEXP: &str = r"^(\w{3}  ?\d{1,2} \d{2}:\d{2}:\d{2}) .+$";

/// syslog 타임스탬프 형식
pub const SYSLOG_TIME_FORMAT: &str = "%b %e %H:%M:%S";

/// Apache / NGINX combined log 라인
pub const COMBINED_REGEXP: &str = r"^[\d\.]+ - [^ ]+ \[(.+)\] .+$";

/// combined log 타임스탬프 형식
pub const COMBINED_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// 대상의 타임스탬프 형식
///
/// 내장 형식은 고정 값을, `regexp`는 대상 설정을, `none`은 `None`을 반환합니다.
pub fn time_format_for(target: &Target) -> Option<String> {
    match target.record_type {
        RecordType::Syslog => Some(SYSLOG_TIME_FORMAT.to_owned()),
        RecordType::CombinedLog => Some(COMBINED_TIME_FORMAT.to_owned()),
        RecordType::Regexp => target.time_format.clone(),
        RecordType::None => None,
    }
}

/// 라인 하나에 대한 타임스탬프 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    /// 레코드 타임스탬프
    pub timestamp: Option<DateTime<Utc>>,
    /// 직전 타임스탬프를 이어받았는지
    pub filled: bool,
    /// 라인에서 새로 얻은 타임스탬프인지
    pub fresh: bool,
}

/// 대상 형식별 라인 파서
#[derive(Debug, Clone)]
pub enum LineParser {
    /// 정규식 (내장 형식 포함)
    Regexp(RegexpParser),
    /// 무형식
    None(NoneParser),
}

impl LineParser {
    /// 대상 설정으로 파서를 선택합니다.
    pub fn from_target(target: &Target) -> Result<Self, CollectError> {
        let zone = target.zone()?;
        let parser = match target.record_type {
            RecordType::Syslog => RegexpParser::new(SYSLOG_REGEXP, time_format_for(target), zone)?,
            RecordType::CombinedLog => {
                RegexpParser::new(COMBINED_REGEXP, time_format_for(target), zone)?
            }
            RecordType::Regexp => {
                let pattern = target.regexp.as_deref().ok_or_else(|| CollectError::Config {
                    field: "regexp".to_owned(),
                    reason: format!("target {} has no pattern", target.id),
                })?;
                RegexpParser::new(pattern, time_format_for(target), zone)?
            }
            RecordType::None => return Ok(Self::None(NoneParser)),
        };
        Ok(Self::Regexp(parser))
    }

    /// 라인 내용에서 타임스탬프를 해석하는지
    ///
    /// 해석하지 않는 파서의 무시각 레코드는 시간 창 시작 경계에 막히지 않습니다.
    pub fn parses_content(&self) -> bool {
        match self {
            Self::Regexp(p) => p.has_time_format(),
            Self::None(_) => false,
        }
    }

    /// 라인의 타임스탬프를 결정합니다.
    ///
    /// 새 값을 얻지 못하면 `last`를 이어받습니다.
    /// 형식이 없는 정규식 파서는 타임스탬프를 만들지 않습니다.
    pub fn stamp(&self, line: &RawLine, last: Option<DateTime<Utc>>) -> Stamp {
        let extracted = match self {
            Self::Regexp(p) if !p.has_time_format() => {
                return Stamp {
                    timestamp: None,
                    filled: false,
                    fresh: false,
                };
            }
            Self::Regexp(p) => p.extract(line),
            Self::None(p) => p.extract(line),
        };

        match extracted {
            Some(ts) => Stamp {
                timestamp: Some(ts),
                filled: false,
                fresh: true,
            },
            None => Stamp {
                timestamp: last,
                filled: last.is_some(),
                fresh: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_core::types::{LOCALHOST, Scheme};

    fn target(record_type: RecordType, regexp: Option<&str>, time_format: Option<&str>) -> Target {
        Target {
            id: 3,
            source: "file:///var/log/app.log".to_owned(),
            description: String::new(),
            scheme: Scheme::File,
            host: LOCALHOST.to_owned(),
            user: None,
            port: None,
            path: "/var/log/app.log".to_owned(),
            record_type,
            regexp: regexp.map(str::to_owned),
            time_format: time_format.map(str::to_owned),
            time_zone: Some("+0000".to_owned()),
            multi_line: false,
            tags: Vec::new(),
        }
    }

    fn line(content: &str) -> RawLine {
        RawLine::new(LOCALHOST, "/var/log/app.log", content)
    }

    #[test]
    fn builtin_formats() {
        assert_eq!(
            time_format_for(&target(RecordType::Syslog, None, Some("%H"))).as_deref(),
            Some(SYSLOG_TIME_FORMAT)
        );
        assert_eq!(
            time_format_for(&target(RecordType::CombinedLog, None, None)).as_deref(),
            Some(COMBINED_TIME_FORMAT)
        );
        assert_eq!(time_format_for(&target(RecordType::None, None, Some("%H"))), None);
    }

    #[test]
    fn selects_variant_by_record_type() {
        let none = LineParser::from_target(&target(RecordType::None, None, None)).unwrap();
        assert!(matches!(none, LineParser::None(_)));
        assert!(!none.parses_content());

        let syslog = LineParser::from_target(&target(RecordType::Syslog, None, None)).unwrap();
        assert!(matches!(syslog, LineParser::Regexp(_)));
        assert!(syslog.parses_content());
    }

    #[test]
    fn regexp_without_pattern_is_rejected() {
        let err = LineParser::from_target(&target(RecordType::Regexp, None, None)).unwrap_err();
        assert!(matches!(err, CollectError::Config { .. }));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = LineParser::from_target(&target(RecordType::Regexp, Some("(["), None)).unwrap_err();
        assert!(matches!(err, CollectError::Regex(_)));
    }

    #[test]
    fn carry_forward_after_a_parsed_line() {
        let parser = LineParser::from_target(&target(
            RecordType::Regexp,
            Some(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) "),
            Some("%Y-%m-%d %H:%M:%S"),
        ))
        .unwrap();

        let first = parser.stamp(&line("no timestamp here"), None);
        assert_eq!(first.timestamp, None);
        assert!(!first.filled);

        let parsed = parser.stamp(&line("2020-01-01 10:00:00 A"), None);
        assert!(parsed.fresh);
        let ts = parsed.timestamp.unwrap();
        assert_eq!(ts.to_rfc3339(), "2020-01-01T10:00:00+00:00");

        let carried = parser.stamp(&line("trailing detail"), Some(ts));
        assert_eq!(carried.timestamp, Some(ts));
        assert!(carried.filled);
        assert!(!carried.fresh);
    }

    #[test]
    fn regexp_without_format_leaves_timestamps_absent() {
        let parser =
            LineParser::from_target(&target(RecordType::Regexp, Some(r"^(\S+)"), None)).unwrap();
        let now = Utc::now();
        let stamp = parser.stamp(&line("2020-01-01"), Some(now));
        assert_eq!(stamp.timestamp, None);
        assert!(!stamp.filled);
    }
}
