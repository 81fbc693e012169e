#![no_main]

use gleaner_core::config::TargetSet;
use gleaner_core::resolve_source;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        let set = TargetSet {
            sources: vec![source.to_owned()],
            ..TargetSet::default()
        };
        // 크래시나 패닉 없이 Ok 또는 Err을 반환해야 한다
        let _ = resolve_source(0, source, &set);
    }
});
