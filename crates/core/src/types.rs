//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 수집 대상([`Target`]), 트랜스포트가 내보내는 원시 라인([`RawLine`]),
//! 파서가 조립한 레코드([`Record`]), 시간 창([`Window`])을 정의합니다.

use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 로컬 파일 대상의 호스트 이름
pub const LOCALHOST: &str = "localhost";

/// 수집 대상의 접근 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// 로컬 파일 (`file://`)
    File,
    /// 원격 호스트 (`ssh://`)
    Ssh,
    /// 쿠버네티스 파드 컨테이너 (`k8s://`)
    K8s,
}

impl Scheme {
    /// URL 스킴 문자열에서 변환합니다.
    pub fn from_url_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "file" => Some(Self::File),
            "ssh" => Some(Self::Ssh),
            "k8s" => Some(Self::K8s),
            _ => None,
        }
    }

    /// URL 스킴 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Ssh => "ssh",
            Self::K8s => "k8s",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 로그 레코드 형식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordType {
    /// RFC 3164 스타일 syslog (`Mar  5 23:59:59 host ...`)
    Syslog,
    /// Apache/Nginx combined log
    CombinedLog,
    /// 타임스탬프 추출 없음
    #[default]
    None,
    /// 사용자 정의 정규식 (캡처 그룹 1 = 타임스탬프)
    Regexp,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Syslog => "syslog",
            Self::CombinedLog => "combinedLog",
            Self::None => "none",
            Self::Regexp => "regexp",
        };
        f.write_str(s)
    }
}

/// 수집 대상
///
/// 설정 파일의 소스 URL 하나가 하나의 `Target`으로 해석됩니다.
/// `id`는 설정 파일 내 등장 순서이며 실행 중에는 변하지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// 안정적인 숫자 ID
    pub id: u64,
    /// 원본 소스 URL
    pub source: String,
    /// 설명
    pub description: String,
    /// 접근 방식
    pub scheme: Scheme,
    /// 호스트 (file 대상은 `localhost`, k8s 대상은 context)
    pub host: String,
    /// SSH 사용자
    pub user: Option<String>,
    /// SSH 포트
    pub port: Option<u16>,
    /// 파일 경로 glob 또는 `/namespace/pod-glob`
    pub path: String,
    /// 레코드 형식
    pub record_type: RecordType,
    /// 사용자 정의 정규식 (`RecordType::Regexp`에서만 사용)
    pub regexp: Option<String>,
    /// 타임스탬프 형식 (strftime 또는 `unixtime`)
    pub time_format: Option<String>,
    /// 타임스탬프 해석 시간대 (`+0900` 형식)
    pub time_zone: Option<String>,
    /// 멀티라인 레코드 여부
    pub multi_line: bool,
    /// 태그
    pub tags: Vec<String>,
}

impl Target {
    /// 설정된 시간대를 오프셋으로 해석합니다.
    ///
    /// 시간대가 없으면 `Ok(None)`을 반환합니다.
    pub fn zone(&self) -> Result<Option<FixedOffset>, ConfigError> {
        self.time_zone
            .as_deref()
            .map(|tz| {
                parse_utc_offset(tz).ok_or_else(|| ConfigError::InvalidValue {
                    field: "time_zone".to_owned(),
                    reason: format!("'{tz}' is not a UTC offset like +0900"),
                })
            })
            .transpose()
    }

    /// 디렉토리 부분 (`/var/log/app.log` -> `/var/log`)
    pub fn dir(&self) -> &str {
        match self.path.rfind('/') {
            Some(0) => "/",
            Some(idx) => &self.path[..idx],
            None => ".",
        }
    }

    /// 파일 이름 부분 (`/var/log/app*.log` -> `app*.log`)
    pub fn base(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[idx + 1..],
            None => &self.path,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.source)
    }
}

/// 트랜스포트가 읽어낸 한 줄
///
/// 파서가 한 번 소비하면 버려집니다.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    /// 원본 호스트
    pub host: String,
    /// 원본 경로
    pub path: String,
    /// 줄 내용 (개행 제외)
    pub content: String,
    /// 세션 시작 시 확인한 원격 호스트의 시간대
    pub time_zone_hint: Option<FixedOffset>,
    /// 트랜스포트가 직접 제공한 타임스탬프 (k8s `--timestamps`)
    pub timestamp_from_transport: Option<DateTime<Utc>>,
}

impl RawLine {
    /// 내용만 가진 라인을 생성합니다.
    pub fn new(host: impl Into<String>, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            content: content.into(),
            time_zone_hint: None,
            timestamp_from_transport: None,
        }
    }

    /// 시간대 힌트를 설정합니다.
    pub fn with_zone(mut self, zone: Option<FixedOffset>) -> Self {
        self.time_zone_hint = zone;
        self
    }

    /// 트랜스포트 타임스탬프를 설정합니다.
    pub fn with_timestamp(mut self, ts: Option<DateTime<Utc>>) -> Self {
        self.timestamp_from_transport = ts;
        self
    }
}

/// 파서가 조립한 로그 레코드
///
/// 방출 시점에 내용이 완결되어 있습니다 (멀티라인 포함).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 원본 호스트
    pub host: String,
    /// 원본 경로
    pub path: String,
    /// 타임스탬프 (추출 불가 시 `None`)
    pub timestamp: Option<DateTime<Utc>>,
    /// 직전 레코드의 타임스탬프를 이어받았는지 여부
    pub filled_by_previous_timestamp: bool,
    /// 레코드 내용
    pub content: String,
    /// 출처 대상 ID
    pub target_id: u64,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp {
            Some(ts) => write!(
                f,
                "{} {}:{} {}",
                ts.to_rfc3339(),
                self.host,
                self.path,
                self.content
            ),
            None => write!(f, "- {}:{} {}", self.host, self.path, self.content),
        }
    }
}

/// 수집 시간 창
///
/// 시작 경계는 배타적입니다: `ts <= start`인 레코드는 방출되지 않습니다.
/// 종료 경계를 넘는 첫 레코드(`ts > end`)에서 수집이 종료됩니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// 시작 시각 (배타)
    pub start: Option<DateTime<Utc>>,
    /// 종료 시각
    pub end: Option<DateTime<Utc>>,
}

impl Window {
    /// 경계가 있는 창을 생성합니다.
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// 경계가 없는 창
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// 시작 경계를 넘었는지 (`ts > start`)
    pub fn is_after_start(&self, ts: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| ts > start)
    }

    /// 종료 경계를 넘었는지 (`ts > end`)
    pub fn is_after_end(&self, ts: DateTime<Utc>) -> bool {
        self.end.is_some_and(|end| ts > end)
    }
}

/// `+0900`, `-05:30`, `Z` 형식의 UTC 오프셋을 해석합니다.
pub fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s == "Z" || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn target(path: &str) -> Target {
        Target {
            id: 0,
            source: format!("file://{path}"),
            description: String::new(),
            scheme: Scheme::File,
            host: LOCALHOST.to_owned(),
            user: None,
            port: None,
            path: path.to_owned(),
            record_type: RecordType::None,
            regexp: None,
            time_format: None,
            time_zone: None,
            multi_line: false,
            tags: Vec::new(),
        }
    }

    #[test]
    fn target_dir_and_base() {
        let t = target("/var/log/app*.log");
        assert_eq!(t.dir(), "/var/log");
        assert_eq!(t.base(), "app*.log");

        let root = target("/syslog");
        assert_eq!(root.dir(), "/");
        assert_eq!(root.base(), "syslog");
    }

    #[test]
    fn parse_offsets() {
        assert_eq!(parse_utc_offset("+0900"), FixedOffset::east_opt(9 * 3600));
        assert_eq!(parse_utc_offset("-05:30"), FixedOffset::east_opt(-(5 * 3600 + 1800)));
        assert_eq!(parse_utc_offset("+0000"), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("Z"), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("0900"), None);
        assert_eq!(parse_utc_offset("+99:00"), None);
        assert_eq!(parse_utc_offset(""), None);
    }

    #[test]
    fn target_zone_rejects_garbage() {
        let mut t = target("/var/log/syslog");
        t.time_zone = Some("Asia/Seoul".to_owned());
        assert!(t.zone().is_err());

        t.time_zone = Some("+0900".to_owned());
        assert_eq!(t.zone().unwrap(), FixedOffset::east_opt(9 * 3600));

        t.time_zone = None;
        assert_eq!(t.zone().unwrap(), None);
    }

    #[test]
    fn window_bounds_are_strict() {
        let start = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap();
        let window = Window::new(Some(start), Some(end));

        assert!(!window.is_after_start(start));
        assert!(window.is_after_start(start + chrono::Duration::seconds(1)));
        assert!(!window.is_after_end(end));
        assert!(window.is_after_end(end + chrono::Duration::seconds(1)));

        let open = Window::unbounded();
        assert!(open.is_after_start(start));
        assert!(!open.is_after_end(end));
    }

    #[test]
    fn record_display_includes_origin() {
        let record = Record {
            host: "web-1".to_owned(),
            path: "/var/log/syslog".to_owned(),
            timestamp: None,
            filled_by_previous_timestamp: false,
            content: "hello".to_owned(),
            target_id: 3,
        };
        assert_eq!(record.to_string(), "- web-1:/var/log/syslog hello");
    }

    #[test]
    fn record_type_serde_names() {
        let t: RecordType = serde_json::from_str("\"combinedLog\"").unwrap();
        assert_eq!(t, RecordType::CombinedLog);
        assert_eq!(serde_json::to_string(&RecordType::Syslog).unwrap(), "\"syslog\"");
    }
}
