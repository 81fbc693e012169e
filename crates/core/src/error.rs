//! 에러 타입 — 도메인별 에러 정의

/// gleaner 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum GleanerError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 수집 에러
    #[error("collect error: {0}")]
    Collect(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 소스 URL 해석 실패
    #[error("invalid source '{source_url}': {reason}")]
    InvalidSource { source_url: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패 (수신측이 닫힘)
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 싱크 기록 실패
    #[error("sink write failed: {0}")]
    SinkWrite(String),
}
