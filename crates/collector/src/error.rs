//! 수집 에러 타입
//!
//! [`CollectError`]는 트랜스포트, 파서, 수집기, 오케스트레이터에서 발생하는
//! 모든 에러를 표현합니다. `From<CollectError> for GleanerError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use gleaner_core::error::{ConfigError, GleanerError, PipelineError};

/// 수집 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// 프로세스 실행 실패 (출력 전)
    #[error("failed to spawn '{command}': {reason}")]
    Spawn {
        /// 실행하려던 명령
        command: String,
        /// 실패 사유
        reason: String,
    },

    /// 원격 호스트 시간대 확인 실패
    #[error("time zone probe failed on {host}: {reason}")]
    TimeZoneProbe {
        /// 대상 호스트
        host: String,
        /// 실패 사유
        reason: String,
    },

    /// 스트림 도중 읽기 실패
    #[error("stream interrupted on {host}:{path}: {reason}")]
    StreamInterrupted {
        /// 대상 호스트
        host: String,
        /// 대상 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 명령이 실패 상태로 종료
    #[error("command '{command}' exited with {status}: {stderr}")]
    CommandFailed {
        /// 실행한 명령
        command: String,
        /// 종료 상태
        status: String,
        /// 표준 에러 출력 (일부)
        stderr: String,
    },

    /// 트랜스포트가 지원하지 않는 작업
    #[error("{operation} is not supported for {scheme} targets")]
    Unsupported {
        /// 대상 스킴
        scheme: String,
        /// 요청한 작업
        operation: String,
    },

    /// 레코드 싱크가 닫힘 (치명적)
    #[error("record sink closed: {0}")]
    SinkClosed(String),

    /// 타임스탬프 해석 실패
    #[error("cannot parse '{value}' with format '{format}': {reason}")]
    Timestamp {
        /// 시간 형식
        format: String,
        /// 입력 값
        value: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// 워커 태스크 조인 실패
    #[error("worker task failed: {0}")]
    Join(String),
}

impl CollectError {
    /// 전체 실행을 중단해야 하는 에러인지 여부
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SinkClosed(_))
    }
}

impl From<PipelineError> for CollectError {
    fn from(err: PipelineError) -> Self {
        CollectError::SinkClosed(err.to_string())
    }
}

impl From<ConfigError> for CollectError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidValue { field, reason } => CollectError::Config { field, reason },
            other => CollectError::Config {
                field: "target".to_owned(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<tokio::task::JoinError> for CollectError {
    fn from(err: tokio::task::JoinError) -> Self {
        CollectError::Join(err.to_string())
    }
}

impl From<CollectError> for GleanerError {
    fn from(err: CollectError) -> Self {
        match err {
            CollectError::SinkClosed(reason) => {
                GleanerError::Pipeline(PipelineError::ChannelSend(reason))
            }
            other => GleanerError::Collect(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_interrupted_display() {
        let err = CollectError::StreamInterrupted {
            host: "web-1".to_owned(),
            path: "/var/log/syslog".to_owned(),
            reason: "connection reset".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("web-1:/var/log/syslog"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn unsupported_display() {
        let err = CollectError::Unsupported {
            scheme: "k8s".to_owned(),
            operation: "copy".to_owned(),
        };
        assert_eq!(err.to_string(), "copy is not supported for k8s targets");
    }

    #[test]
    fn sink_errors_are_fatal() {
        let err: CollectError = PipelineError::ChannelSend("closed".to_owned()).into();
        assert!(err.is_fatal());
        assert!(!CollectError::Join("panic".to_owned()).is_fatal());
    }

    #[test]
    fn converts_to_gleaner_error() {
        let err: GleanerError = CollectError::Join("panic".to_owned()).into();
        assert!(matches!(err, GleanerError::Collect(_)));

        let err: GleanerError = CollectError::SinkClosed("closed".to_owned()).into();
        assert!(matches!(err, GleanerError::Pipeline(_)));
    }

    #[test]
    fn config_error_keeps_field() {
        let err: CollectError = ConfigError::InvalidValue {
            field: "time_zone".to_owned(),
            reason: "bad".to_owned(),
        }
        .into();
        assert!(matches!(err, CollectError::Config { ref field, .. } if field == "time_zone"));
    }
}
