//! 타임스탬프 해석
//!
//! 형식은 chrono strftime 문법을 따르며, `unixtime`은 에포크 초를 의미합니다.
//! 형식에 날짜 성분이 빠져 있으면 기준일(오늘)로 채웁니다.
//!
//! - 연도 없음: 기준일의 연도
//! - 연/월/일 모두 없음: 기준일
//! - 내용에 오프셋이 있으면 `zone` 인자보다 우선합니다.
//! - 오프셋도 `zone`도 없으면 UTC로 간주합니다.

use chrono::format::ParseErrorKind;
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

use crate::error::CollectError;
use crate::transport::UNIXTIME;

/// 오늘 날짜를 기준으로 타임스탬프를 해석합니다.
///
/// 기준일은 `zone`(없으면 UTC) 기준의 현재 날짜입니다.
pub fn parse_timestamp(
    format: &str,
    zone: Option<FixedOffset>,
    value: &str,
) -> Result<DateTime<Utc>, CollectError> {
    let offset = zone.unwrap_or(utc());
    let today = Utc::now().with_timezone(&offset).date_naive();
    parse_timestamp_on(format, zone, value, today)
}

/// 지정한 기준일로 타임스탬프를 해석합니다.
pub fn parse_timestamp_on(
    format: &str,
    zone: Option<FixedOffset>,
    value: &str,
    today: NaiveDate,
) -> Result<DateTime<Utc>, CollectError> {
    let value = value.trim();
    if format == UNIXTIME {
        return parse_unixtime(value);
    }

    let year_filled = (format!("%Y {format}"), format!("{} {value}", today.year()));
    let date_filled = (
        format!("%Y-%m-%d {format}"),
        format!("{} {value}", today.format("%Y-%m-%d")),
    );
    let candidates = [
        (format.to_owned(), value.to_owned()),
        year_filled,
        date_filled,
    ];

    let mut last_reason = String::new();
    for (fmt, input) in &candidates {
        match parse_complete(fmt, input, zone) {
            Ok(ts) => return Ok(ts),
            Err(Incomplete::NotEnough(reason)) => last_reason = reason,
            Err(Incomplete::Invalid(reason)) => {
                return Err(timestamp_error(format, value, reason));
            }
        }
    }
    Err(timestamp_error(format, value, last_reason))
}

enum Incomplete {
    /// 성분이 부족함 (기준일로 보충 가능)
    NotEnough(String),
    /// 형식과 맞지 않음
    Invalid(String),
}

fn parse_complete(
    format: &str,
    input: &str,
    zone: Option<FixedOffset>,
) -> Result<DateTime<Utc>, Incomplete> {
    // 내용에 오프셋이 있으면 그대로 사용
    if let Ok(ts) = DateTime::parse_from_str(input, format) {
        return Ok(ts.with_timezone(&Utc));
    }

    match NaiveDateTime::parse_from_str(input, format) {
        Ok(naive) => zone
            .unwrap_or(utc())
            .from_local_datetime(&naive)
            .single()
            .map(|ts| ts.with_timezone(&Utc))
            .ok_or_else(|| Incomplete::Invalid("ambiguous local time".to_owned())),
        Err(e) if e.kind() == ParseErrorKind::NotEnough => Err(Incomplete::NotEnough(e.to_string())),
        Err(e) => Err(Incomplete::Invalid(e.to_string())),
    }
}

fn parse_unixtime(value: &str) -> Result<DateTime<Utc>, CollectError> {
    let secs: i64 = value
        .parse()
        .map_err(|e: std::num::ParseIntError| timestamp_error(UNIXTIME, value, e.to_string()))?;
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| timestamp_error(UNIXTIME, value, "out of range".to_owned()))
}

fn timestamp_error(format: &str, value: &str, reason: String) -> CollectError {
    CollectError::Timestamp {
        format: format.to_owned(),
        value: value.to_owned(),
        reason,
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}
