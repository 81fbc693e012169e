#![no_main]

use arbitrary::Arbitrary;
use gleaner_collector::parser::{LineParser, RecordAssembler};
use gleaner_core::types::{LOCALHOST, RawLine, RecordType, Scheme, Target, Window};
use libfuzzer_sys::fuzz_target;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    syslog: bool,
    multi_line: bool,
    /// 멀티라인 상한 (1..=16)
    max_multi_lines: u8,
    lines: Vec<String>,
}

fuzz_target!(|input: FuzzInput| {
    let (record_type, regexp, time_format) = if input.syslog {
        (RecordType::Syslog, None, None)
    } else {
        (
            RecordType::Regexp,
            Some(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})".to_owned()),
            Some("%Y-%m-%d %H:%M:%S".to_owned()),
        )
    };
    let target = Target {
        id: 0,
        source: "file:///var/log/fuzz.log".to_owned(),
        description: String::new(),
        scheme: Scheme::File,
        host: LOCALHOST.to_owned(),
        user: None,
        port: None,
        path: "/var/log/fuzz.log".to_owned(),
        record_type,
        regexp,
        time_format,
        time_zone: Some("+0000".to_owned()),
        multi_line: input.multi_line,
        tags: Vec::new(),
    };
    let Ok(parser) = LineParser::from_target(&target) else {
        return;
    };
    let max_multi_lines = usize::from(input.max_multi_lines % 16) + 1;
    let mut assembler = RecordAssembler::new(parser, &target, Window::unbounded(), max_multi_lines);

    let mut out = Vec::new();
    for line in &input.lines {
        assembler.push(RawLine::new(LOCALHOST, "/var/log/fuzz.log", line.as_str()), &mut out);
    }
    out.extend(assembler.finish());

    // 창이 없으면 어떤 줄도 사라지지 않는다
    if !input.multi_line {
        assert_eq!(out.len(), input.lines.len());
    }
});
