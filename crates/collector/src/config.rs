//! 수집 세션 설정
//!
//! [`SessionConfig`]는 core의 [`CollectorConfig`](gleaner_core::config::CollectorConfig)를
//! 기반으로 트랜스포트 세션과 파서가 사용하는 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use gleaner_core::config::GleanerConfig;
//! use gleaner_collector::config::SessionConfig;
//!
//! let core_config = GleanerConfig::default();
//! let config = SessionConfig::from_core(&core_config.collector);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CollectError;

/// 샘플링 시 고를 수 있는 최대 줄 위치 (끝에서부터)
pub const DEFAULT_SAMPLE_DEPTH: usize = 100;

/// 수집 세션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 오케스트레이터 동시 실행 대상 수
    pub concurrency: usize,
    /// 단계 간 채널 용량
    pub channel_capacity: usize,
    /// 원격 명령에 sudo 사용
    pub sudo: bool,
    /// 한 줄 최대 길이 (바이트)
    pub max_line_length: usize,
    /// 멀티라인 레코드 최대 줄 수
    pub max_multi_lines: usize,
    /// k8s 파드 목록 폴링 주기 (밀리초)
    pub k8s_poll_interval_ms: u64,
    /// ssh 실행 파일
    pub ssh_command: String,
    /// ssh 추가 옵션
    pub ssh_options: Vec<String>,
    /// kubectl 실행 파일
    pub kubectl_command: String,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// 로컬 셸
    pub shell: String,
    /// 샘플링 최대 깊이
    pub sample_depth: usize,
    /// 표준 에러 캡처 최대 크기 (바이트)
    pub stderr_capture_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_core(&gleaner_core::config::CollectorConfig::default())
    }
}

impl SessionConfig {
    /// core의 `CollectorConfig`에서 세션 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값이 적용됩니다.
    pub fn from_core(core: &gleaner_core::config::CollectorConfig) -> Self {
        Self {
            concurrency: core.concurrency,
            channel_capacity: core.channel_capacity,
            sudo: core.sudo,
            max_line_length: core.max_line_length,
            max_multi_lines: core.max_multi_lines,
            k8s_poll_interval_ms: core.k8s_poll_interval_ms,
            ssh_command: core.ssh_command.clone(),
            ssh_options: core.ssh_options.clone(),
            kubectl_command: core.kubectl_command.clone(),
            shell: "sh".to_owned(),
            sample_depth: DEFAULT_SAMPLE_DEPTH,
            stderr_capture_limit: 4096,
        }
    }

    /// k8s 폴링 주기
    pub fn k8s_poll_interval(&self) -> Duration {
        Duration::from_millis(self.k8s_poll_interval_ms)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CollectError> {
        let positive = [
            ("concurrency", self.concurrency),
            ("channel_capacity", self.channel_capacity),
            ("max_line_length", self.max_line_length),
            ("max_multi_lines", self.max_multi_lines),
            ("sample_depth", self.sample_depth),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(CollectError::Config {
                    field: field.to_owned(),
                    reason: "must be greater than 0".to_owned(),
                });
            }
        }

        if self.k8s_poll_interval_ms == 0 {
            return Err(CollectError::Config {
                field: "k8s_poll_interval_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        for (field, value) in [
            ("shell", &self.shell),
            ("ssh_command", &self.ssh_command),
            ("kubectl_command", &self.kubectl_command),
        ] {
            if value.trim().is_empty() {
                return Err(CollectError::Config {
                    field: field.to_owned(),
                    reason: "must not be empty".to_owned(),
                });
            }
        }

        Ok(())
    }
}

/// 세션 설정 빌더
#[derive(Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 동시 실행 대상 수를 설정합니다.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    /// 채널 용량을 설정합니다.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// sudo 사용 여부를 설정합니다.
    pub fn sudo(mut self, sudo: bool) -> Self {
        self.config.sudo = sudo;
        self
    }

    /// 한 줄 최대 길이를 설정합니다.
    pub fn max_line_length(mut self, length: usize) -> Self {
        self.config.max_line_length = length;
        self
    }

    /// 멀티라인 최대 줄 수를 설정합니다.
    pub fn max_multi_lines(mut self, lines: usize) -> Self {
        self.config.max_multi_lines = lines;
        self
    }

    /// k8s 폴링 주기(밀리초)를 설정합니다.
    pub fn k8s_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.k8s_poll_interval_ms = ms;
        self
    }

    /// ssh 실행 파일을 설정합니다.
    pub fn ssh_command(mut self, command: impl Into<String>) -> Self {
        self.config.ssh_command = command.into();
        self
    }

    /// kubectl 실행 파일을 설정합니다.
    pub fn kubectl_command(mut self, command: impl Into<String>) -> Self {
        self.config.kubectl_command = command.into();
        self
    }

    /// 샘플링 최대 깊이를 설정합니다.
    pub fn sample_depth(mut self, depth: usize) -> Self {
        self.config.sample_depth = depth;
        self
    }

    /// 설정을 검증하고 `SessionConfig`를 생성합니다.
    pub fn build(self) -> Result<SessionConfig, CollectError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
