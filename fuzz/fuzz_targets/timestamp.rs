#![no_main]

use arbitrary::Arbitrary;
use chrono::FixedOffset;
use gleaner_collector::parser::{COMBINED_TIME_FORMAT, SYSLOG_TIME_FORMAT, parse_timestamp};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    format: FuzzFormat,
    /// 시간대 오프셋 (초, 범위 밖이면 None)
    offset_secs: i32,
    value: String,
}

#[derive(Arbitrary, Debug)]
enum FuzzFormat {
    Syslog,
    Combined,
    Unixtime,
    Custom(String),
}

fuzz_target!(|input: FuzzInput| {
    let format = match &input.format {
        FuzzFormat::Syslog => SYSLOG_TIME_FORMAT,
        FuzzFormat::Combined => COMBINED_TIME_FORMAT,
        FuzzFormat::Unixtime => "unixtime",
        FuzzFormat::Custom(f) => f.as_str(),
    };
    let zone = FixedOffset::east_opt(input.offset_secs);

    // 크래시나 패닉 없이 Ok 또는 Err을 반환해야 한다
    let _ = parse_timestamp(format, zone, &input.value);
});
