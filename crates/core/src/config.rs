//! 설정 관리 — gleaner.toml / gleaner.yaml 파싱 및 런타임 설정
//!
//! [`GleanerConfig`]는 일반 설정, 수집기 설정, 대상 집합을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`GLEANER_COLLECTOR_CONCURRENCY=4` 형식)
//! 3. 설정 파일 (`gleaner.toml` 또는 `gleaner.yaml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), gleaner_core::error::GleanerError> {
//! use gleaner_core::config::GleanerConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = GleanerConfig::load("gleaner.toml").await?;
//! let targets = config.targets()?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = GleanerConfig::parse("[collector]\nconcurrency = 4")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, GleanerError};
use crate::target::resolve_source;
use crate::types::{RecordType, Target};

/// 멀티라인 레코드 기본 최대 줄 수
pub const DEFAULT_MAX_MULTI_LINES: usize = 1000;

/// gleaner 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GleanerConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수집기 설정
    #[serde(default)]
    pub collector: CollectorConfig,
    /// 수집 대상 집합
    #[serde(default, alias = "targetSets")]
    pub target_sets: Vec<TargetSet>,
}

impl GleanerConfig {
    /// 설정 파일을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 확장자가 `.yaml` / `.yml`이면 YAML, 그 외에는 TOML로 해석합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, GleanerError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, GleanerError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GleanerError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                GleanerError::Io(e)
            }
        })?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        let config = if is_yaml {
            Self::parse_yaml(&content)?
        } else {
            Self::parse(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, GleanerError> {
        toml::from_str(toml_str).map_err(|e| {
            GleanerError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// YAML 문자열에서 설정을 파싱합니다.
    pub fn parse_yaml(yaml_str: &str) -> Result<Self, GleanerError> {
        if yaml_str.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml_str).map_err(|e| {
            GleanerError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `GLEANER_{SECTION}_{FIELD}`
    /// 예: `GLEANER_COLLECTOR_SUDO=true`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "GLEANER_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "GLEANER_GENERAL_LOG_FORMAT");

        // Collector
        override_usize(
            &mut self.collector.concurrency,
            "GLEANER_COLLECTOR_CONCURRENCY",
        );
        override_usize(
            &mut self.collector.channel_capacity,
            "GLEANER_COLLECTOR_CHANNEL_CAPACITY",
        );
        override_bool(&mut self.collector.sudo, "GLEANER_COLLECTOR_SUDO");
        override_u64(
            &mut self.collector.k8s_poll_interval_ms,
            "GLEANER_COLLECTOR_K8S_POLL_INTERVAL_MS",
        );
        override_usize(
            &mut self.collector.max_line_length,
            "GLEANER_COLLECTOR_MAX_LINE_LENGTH",
        );
        override_usize(
            &mut self.collector.max_multi_lines,
            "GLEANER_COLLECTOR_MAX_MULTI_LINES",
        );
        override_string(
            &mut self.collector.ssh_command,
            "GLEANER_COLLECTOR_SSH_COMMAND",
        );
        override_string(
            &mut self.collector.kubectl_command,
            "GLEANER_COLLECTOR_KUBECTL_COMMAND",
        );
        override_csv(&mut self.collector.ssh_options, "GLEANER_COLLECTOR_SSH_OPTIONS");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 모든 소스 URL이 해석 가능한지도 함께 확인합니다.
    pub fn validate(&self) -> Result<(), GleanerError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        let positive = [
            ("collector.concurrency", self.collector.concurrency as u64),
            (
                "collector.channel_capacity",
                self.collector.channel_capacity as u64,
            ),
            (
                "collector.k8s_poll_interval_ms",
                self.collector.k8s_poll_interval_ms,
            ),
            (
                "collector.max_line_length",
                self.collector.max_line_length as u64,
            ),
            (
                "collector.max_multi_lines",
                self.collector.max_multi_lines as u64,
            ),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }
        }

        if self.collector.ssh_command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "collector.ssh_command".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }
        if self.collector.kubectl_command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "collector.kubectl_command".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }

        for (idx, set) in self.target_sets.iter().enumerate() {
            set.validate(idx)?;
        }
        self.targets()?;

        Ok(())
    }

    /// 모든 대상 집합의 소스 URL을 [`Target`]으로 해석합니다.
    ///
    /// ID는 설정 파일 내 등장 순서대로 0부터 부여됩니다.
    pub fn targets(&self) -> Result<Vec<Target>, ConfigError> {
        let mut targets = Vec::new();
        for set in &self.target_sets {
            for source in &set.sources {
                let id = targets.len() as u64;
                targets.push(resolve_source(id, source, set)?);
            }
        }
        Ok(targets)
    }

    /// 태그별 대상 집합 수를 반환합니다.
    pub fn tags(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for set in &self.target_sets {
            for tag in &set.tags {
                *counts.entry(tag.clone()).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 수집기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// 동시에 실행할 대상 수
    pub concurrency: usize,
    /// 단계 간 채널 용량
    pub channel_capacity: usize,
    /// 원격 명령에 sudo 사용 여부
    pub sudo: bool,
    /// k8s 파드 목록 폴링 주기 (밀리초)
    pub k8s_poll_interval_ms: u64,
    /// 한 줄 최대 길이 (바이트, 초과분은 잘림)
    pub max_line_length: usize,
    /// 멀티라인 레코드 최대 줄 수
    pub max_multi_lines: usize,
    /// ssh 실행 파일
    pub ssh_command: String,
    /// ssh 추가 옵션 (`-o BatchMode=yes` 등)
    pub ssh_options: Vec<String>,
    /// kubectl 실행 파일
    pub kubectl_command: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            channel_capacity: 1,
            sudo: false,
            k8s_poll_interval_ms: 1000,
            max_line_length: 1024 * 1024, // 1MiB
            max_multi_lines: DEFAULT_MAX_MULTI_LINES,
            ssh_command: "ssh".to_owned(),
            ssh_options: Vec::new(),
            kubectl_command: "kubectl".to_owned(),
        }
    }
}

/// 대상 집합
///
/// 같은 형식과 태그를 공유하는 소스 URL 묶음입니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSet {
    /// 소스 URL 목록
    pub sources: Vec<String>,
    /// 설명
    pub description: String,
    /// 레코드 형식
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// 사용자 정의 정규식
    pub regexp: Option<String>,
    /// 멀티라인 레코드 여부
    #[serde(alias = "multiLine")]
    pub multi_line: bool,
    /// 타임스탬프 형식
    #[serde(alias = "timeFormat")]
    pub time_format: Option<String>,
    /// 타임스탬프 시간대
    #[serde(alias = "timeZone")]
    pub time_zone: Option<String>,
    /// 태그
    pub tags: Vec<String>,
}

impl TargetSet {
    fn validate(&self, idx: usize) -> Result<(), ConfigError> {
        if self.record_type == RecordType::Regexp {
            let Some(pattern) = self.regexp.as_deref() else {
                return Err(ConfigError::InvalidValue {
                    field: format!("target_sets[{idx}].regexp"),
                    reason: "required when type is regexp".to_owned(),
                });
            };
            let re = regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
                field: format!("target_sets[{idx}].regexp"),
                reason: e.to_string(),
            })?;
            if self.time_format.is_some() && re.captures_len() < 2 {
                return Err(ConfigError::InvalidValue {
                    field: format!("target_sets[{idx}].regexp"),
                    reason: "must have a capture group for the timestamp".to_owned(),
                });
            }
        }

        for tag in &self.tags {
            if tag.is_empty() || tag.contains(',') || tag.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidValue {
                    field: format!("target_sets[{idx}].tags"),
                    reason: format!("'{tag}' must be a non-empty word without commas"),
                });
            }
        }

        Ok(())
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
