//! 대상 해석 및 필터링
//!
//! 소스 URL을 [`Target`]으로 해석하고, 태그와 소스 정규식으로 대상을 고릅니다.
//!
//! | URL | 의미 |
//! |---|---|
//! | `file:///var/log/syslog` | 로컬 파일 glob |
//! | `ssh://user@host:22/var/log/*.log` | 원격 호스트 파일 glob |
//! | `k8s://context/namespace/pod-*` | 쿠버네티스 파드 glob |

use regex::Regex;
use url::Url;

use crate::config::TargetSet;
use crate::error::ConfigError;
use crate::types::{LOCALHOST, Scheme, Target};

/// 소스 URL 하나를 대상으로 해석합니다.
pub fn resolve_source(id: u64, source: &str, set: &TargetSet) -> Result<Target, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidSource {
        source_url: source.to_owned(),
        reason: reason.to_owned(),
    };

    let url = Url::parse(source).map_err(|e| invalid(&e.to_string()))?;
    let scheme = Scheme::from_url_scheme(url.scheme())
        .ok_or_else(|| invalid("unsupported scheme, expected file, ssh or k8s"))?;

    let host = match url.host_str().filter(|h| !h.is_empty()) {
        Some(h) => h.to_owned(),
        None if scheme == Scheme::File => LOCALHOST.to_owned(),
        None => return Err(invalid("missing host")),
    };

    let path = url.path().to_owned();
    if path.is_empty() || path == "/" || path.ends_with('/') {
        return Err(invalid("path must name a file glob"));
    }
    if scheme == Scheme::K8s && path.trim_matches('/').split('/').count() != 2 {
        return Err(invalid("k8s path must be /namespace/pod-glob"));
    }

    let user = Some(url.username())
        .filter(|u| !u.is_empty())
        .map(str::to_owned);

    let target = Target {
        id,
        source: source.to_owned(),
        description: set.description.clone(),
        scheme,
        host,
        user,
        port: url.port(),
        path,
        record_type: set.record_type,
        regexp: set.regexp.clone(),
        time_format: set.time_format.clone(),
        time_zone: set.time_zone.clone(),
        multi_line: set.multi_line,
        tags: set.tags.clone(),
    };
    target.zone()?;
    Ok(target)
}

/// 대상 필터 조건
#[derive(Debug, Clone, Default)]
pub struct TargetFilter {
    /// 포함할 태그 (하나라도 일치하면 포함, 쉼표로 여러 개 지정 가능)
    pub tags: Vec<String>,
    /// 제외할 태그
    pub ignore_tags: Vec<String>,
    /// 소스 URL 정규식
    pub source: Option<String>,
}

impl TargetFilter {
    fn split(tags: &[String]) -> Vec<&str> {
        tags.iter()
            .flat_map(|t| t.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// 필터 조건에 맞는 대상만 남깁니다.
///
/// 태그 조건과 소스 정규식 조건은 모두 만족해야 하며,
/// 제외 태그가 하나라도 붙은 대상은 항상 제외됩니다.
pub fn filter_targets(targets: &[Target], filter: &TargetFilter) -> Result<Vec<Target>, ConfigError> {
    let tags = TargetFilter::split(&filter.tags);
    let ignore = TargetFilter::split(&filter.ignore_tags);
    let source_re = filter
        .source
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            field: "source".to_owned(),
            reason: e.to_string(),
        })?;

    let selected = targets
        .iter()
        .filter(|t| tags.is_empty() || t.tags.iter().any(|tag| tags.contains(&tag.as_str())))
        .filter(|t| source_re.as_ref().is_none_or(|re| re.is_match(&t.source)))
        .filter(|t| !t.tags.iter().any(|tag| ignore.contains(&tag.as_str())))
        .cloned()
        .collect();
    Ok(selected)
}
