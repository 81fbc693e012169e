//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `gleaner_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(gleaner_core::metrics::RECORDS_EMITTED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 대상 스킴 레이블 키 (file, ssh, k8s)
pub const LABEL_SCHEME: &str = "scheme";

/// 수집 작업 레이블 키 (fetch, stream, list, copy, sample)
pub const LABEL_OPERATION: &str = "operation";

// ─── 수집 파이프라인 ────────────────────────────────────────────────

/// 트랜스포트에서 읽은 원시 라인 수
pub const LINES_READ_TOTAL: &str = "gleaner_lines_read_total";

/// 파서가 방출한 레코드 수
pub const RECORDS_EMITTED_TOTAL: &str = "gleaner_records_emitted_total";

/// 실패한 대상 수
pub const TARGET_FAILURES_TOTAL: &str = "gleaner_target_failures_total";

/// 현재 열린 트랜스포트 세션 수
pub const SESSIONS_ACTIVE: &str = "gleaner_sessions_active";

/// 최대 길이를 넘어 잘린 라인 수
pub const LINES_TRUNCATED_TOTAL: &str = "gleaner_lines_truncated_total";

/// 등록된 모든 메트릭 이름
pub const ALL_METRIC_NAMES: [&str; 5] = [
    LINES_READ_TOTAL,
    RECORDS_EMITTED_TOTAL,
    TARGET_FAILURES_TOTAL,
    SESSIONS_ACTIVE,
    LINES_TRUNCATED_TOTAL,
];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        LINES_READ_TOTAL,
        "Total number of raw lines read from all transports"
    );
    describe_counter!(
        RECORDS_EMITTED_TOTAL,
        "Total number of records emitted by parsers"
    );
    describe_counter!(
        TARGET_FAILURES_TOTAL,
        "Total number of targets whose collection failed"
    );
    describe_gauge!(SESSIONS_ACTIVE, "Number of open transport sessions");
    describe_counter!(
        LINES_TRUNCATED_TOTAL,
        "Total number of lines truncated to the maximum line length"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_have_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(name.starts_with("gleaner_"), "{name} must start with gleaner_");
        }
    }

    #[test]
    fn counters_end_with_total() {
        for name in ALL_METRIC_NAMES.iter().filter(|n| **n != SESSIONS_ACTIVE) {
            assert!(name.ends_with("_total"), "{name} must end with _total");
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }
}
