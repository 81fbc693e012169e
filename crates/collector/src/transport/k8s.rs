//! 쿠버네티스 트랜스포트
//!
//! 대상 경로 `/namespace/pod-glob`에 일치하는 파드의 컨테이너마다 로그 스트림을 엽니다.
//! 파드 목록은 주기적으로 폴링하며:
//! - 새로 나타난 컨테이너는 스트림을 열고
//! - 사라진 파드의 스트림은 취소하며
//! - 활성 스트림이 한 폴링 주기보다 오래 없으면 전체 감시를 끝냅니다.
//!
//! 클러스터 접근은 [`ClusterClient`] trait 뒤에 있으며, 기본 구현
//! [`KubectlClient`]는 `kubectl` 바이너리를 사용합니다.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Utc};
use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gleaner_core::types::{RawLine, Scheme, Target, Window};

use super::Transport;
use super::process::{LineSpec, capture, pump_lines};
use crate::config::SessionConfig;
use crate::error::CollectError;

/// 파드의 컨테이너 하나
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodContainer {
    /// 네임스페이스
    pub namespace: String,
    /// 파드 이름
    pub pod: String,
    /// 컨테이너 이름
    pub container: String,
}

impl PodContainer {
    /// 라인에 기록할 경로 (`/namespace/pod/container`)
    pub fn path(&self) -> String {
        format!("/{}/{}/{}", self.namespace, self.pod, self.container)
    }
}

/// 로그 스트림 옵션
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// 새 로그를 계속 따라갈지 여부
    pub follow: bool,
    /// 이 초 이후의 로그만
    pub since_seconds: Option<i64>,
    /// 끝에서부터 이 줄 수만
    pub tail_lines: Option<usize>,
    /// 이 줄 수만큼 전달한 뒤 종료
    pub limit: Option<usize>,
}

/// 클러스터 접근 추상화
pub trait ClusterClient: Send + Sync + 'static {
    /// 클러스터 context 이름 (라인의 호스트로 사용)
    fn context(&self) -> &str;

    /// 네임스페이스의 모든 컨테이너 목록
    fn containers(
        &self,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<PodContainer>, CollectError>> + Send;

    /// 컨테이너 하나의 로그를 채널로 보냅니다.
    ///
    /// 취소되거나 스트림이 끝나면 반환합니다.
    fn stream_logs(
        &self,
        container: &PodContainer,
        options: &LogOptions,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<RawLine>,
    ) -> impl Future<Output = Result<(), CollectError>> + Send;
}

// --- kubectl 구현 ---

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: PodMetadata,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
struct PodMetadata {
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(rename = "deletionTimestamp")]
    deletion_timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PodStatus {
    #[serde(rename = "initContainerStatuses", default)]
    init_container_statuses: Vec<ContainerStatus>,
    #[serde(rename = "containerStatuses", default)]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    name: String,
}

/// `kubectl get pods -o json` 출력에서 컨테이너 목록을 만듭니다.
///
/// 삭제 중인 파드는 제외합니다.
fn parse_pod_list(json: &str, namespace: &str) -> Result<Vec<PodContainer>, CollectError> {
    let list: PodList = serde_json::from_str(json).map_err(|e| CollectError::CommandFailed {
        command: "kubectl get pods".to_owned(),
        status: "invalid output".to_owned(),
        stderr: e.to_string(),
    })?;

    let mut containers = Vec::new();
    for pod in list.items {
        if pod.metadata.deletion_timestamp.is_some() {
            continue;
        }
        let ns = if pod.metadata.namespace.is_empty() {
            namespace.to_owned()
        } else {
            pod.metadata.namespace
        };
        let statuses = pod
            .status
            .init_container_statuses
            .into_iter()
            .chain(pod.status.container_statuses);
        for status in statuses {
            containers.push(PodContainer {
                namespace: ns.clone(),
                pod: pod.metadata.name.clone(),
                container: status.name,
            });
        }
    }
    Ok(containers)
}

/// `kubectl` 바이너리 기반 클러스터 클라이언트
#[derive(Debug, Clone)]
pub struct KubectlClient {
    kubectl: String,
    context: String,
    max_line_length: usize,
    stderr_limit: usize,
}

impl KubectlClient {
    /// 새 클라이언트를 생성합니다.
    pub fn new(context: impl Into<String>, config: &SessionConfig) -> Self {
        Self {
            kubectl: config.kubectl_command.clone(),
            context: context.into(),
            max_line_length: config.max_line_length,
            stderr_limit: config.stderr_capture_limit,
        }
    }

    fn command(&self, namespace: &str) -> Command {
        let mut cmd = Command::new(&self.kubectl);
        cmd.arg("--context")
            .arg(&self.context)
            .arg("--namespace")
            .arg(namespace);
        cmd
    }

    /// `kubectl logs` 인자 목록
    pub fn log_args(container: &PodContainer, options: &LogOptions) -> Vec<String> {
        let mut args = vec![
            "logs".to_owned(),
            container.pod.clone(),
            "--container".to_owned(),
            container.container.clone(),
            "--timestamps".to_owned(),
        ];
        if options.follow {
            args.push("--follow".to_owned());
        }
        if let Some(since) = options.since_seconds {
            args.push(format!("--since={}s", since.max(1)));
        }
        if let Some(tail) = options.tail_lines {
            args.push(format!("--tail={tail}"));
        }
        args
    }
}

impl ClusterClient for KubectlClient {
    fn context(&self) -> &str {
        &self.context
    }

    async fn containers(
        &self,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PodContainer>, CollectError> {
        let mut cmd = self.command(namespace);
        cmd.args(["get", "pods", "--output", "json"]);
        let out = capture(cmd, cancel, self.stderr_limit).await?;
        parse_pod_list(&out, namespace)
    }

    async fn stream_logs(
        &self,
        container: &PodContainer,
        options: &LogOptions,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        let mut cmd = self.command(&container.namespace);
        cmd.args(Self::log_args(container, options));
        let spec = LineSpec {
            host: self.context.clone(),
            path: container.path(),
            zone: FixedOffset::east_opt(0),
            transport_timestamps: true,
            max_line_length: self.max_line_length,
            limit: options.limit,
            stderr_limit: self.stderr_limit,
        };
        pump_lines(cmd, &spec, cancel, tx).await
    }
}

/// 파드 이름 glob을 정규식으로 변환합니다 (`*` → `.*`, 전체 일치).
pub fn pod_glob_regex(glob: &str) -> Result<Regex, CollectError> {
    let body: Vec<String> = glob.split('*').map(regex::escape).collect();
    Ok(Regex::new(&format!("^{}$", body.join(".*")))?)
}

/// 쿠버네티스 파드 로그 트랜스포트
pub struct K8sTransport<C> {
    client: Arc<C>,
    target_id: u64,
    namespace: String,
    pod_filter: Regex,
    poll_interval: Duration,
    sample_depth: usize,
}

impl<C: ClusterClient> K8sTransport<C> {
    /// 대상과 클라이언트로 트랜스포트를 생성합니다.
    ///
    /// 대상 경로는 `/namespace/pod-glob` 형식이어야 합니다.
    pub fn new(client: C, target: &Target, config: &SessionConfig) -> Result<Self, CollectError> {
        let mut parts = target.path.trim_matches('/').split('/');
        let (Some(namespace), Some(pod), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CollectError::Config {
                field: "source".to_owned(),
                reason: format!("k8s path '{}' must be /namespace/pod-glob", target.path),
            });
        };

        Ok(Self {
            client: Arc::new(client),
            target_id: target.id,
            namespace: namespace.to_owned(),
            pod_filter: pod_glob_regex(pod)?,
            poll_interval: config.k8s_poll_interval(),
            sample_depth: config.sample_depth,
        })
    }

    async fn matching(&self, cancel: &CancellationToken) -> Result<HashSet<PodContainer>, CollectError> {
        let containers = self.client.containers(&self.namespace, cancel).await?;
        Ok(containers
            .into_iter()
            .filter(|c| self.pod_filter.is_match(&c.pod))
            .collect())
    }

    /// 일치하는 컨테이너를 감시하며 스트림을 엽니다.
    ///
    /// 한 컨테이너는 감시 한 번에 최대 한 번만 스트리밍합니다.
    async fn watch(
        &self,
        options: LogOptions,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        let mut active: HashMap<PodContainer, CancellationToken> = HashMap::new();
        let mut seen: HashSet<PodContainer> = HashSet::new();
        let mut streams: JoinSet<(PodContainer, Result<(), CollectError>)> = JoinSet::new();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut idle_ticks = 0u32;
        let mut polled = false;

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                Some(joined) = streams.join_next(), if !streams.is_empty() => match joined {
                    Ok((container, res)) => {
                        active.remove(&container);
                        match res {
                            Ok(()) => debug!(path = %container.path(), "log stream finished"),
                            Err(e) => warn!(path = %container.path(), error = %e, "log stream failed"),
                        }
                    }
                    Err(e) => warn!(error = %e, "log stream task failed"),
                },
                _ = ticker.tick() => {
                    let matching = match self.matching(&cancel).await {
                        Ok(matching) => matching,
                        Err(e) if !polled => break Err(e),
                        Err(e) => {
                            warn!(namespace = %self.namespace, error = %e, "pod listing failed, retrying");
                            continue;
                        }
                    };
                    polled = true;

                    for (container, token) in &active {
                        if !matching.contains(container) {
                            info!(path = %container.path(), "pod vanished, closing stream");
                            token.cancel();
                        }
                    }

                    let mut fresh: Vec<PodContainer> = matching
                        .into_iter()
                        .filter(|c| !seen.contains(c))
                        .collect();
                    fresh.sort();
                    for container in fresh {
                        info!(
                            target_id = self.target_id,
                            context = self.client.context(),
                            path = %container.path(),
                            "opening log stream"
                        );
                        seen.insert(container.clone());
                        let token = cancel.child_token();
                        active.insert(container.clone(), token.clone());

                        let client = Arc::clone(&self.client);
                        let options = options.clone();
                        let tx = tx.clone();
                        streams.spawn(async move {
                            let res = client.stream_logs(&container, &options, &token, &tx).await;
                            (container, res)
                        });
                    }

                    if active.is_empty() {
                        idle_ticks += 1;
                        if idle_ticks > 1 {
                            debug!(namespace = %self.namespace, "no active streams, watch finished");
                            break Ok(());
                        }
                    } else {
                        idle_ticks = 0;
                    }
                }
            }
        };

        for token in active.values() {
            token.cancel();
        }
        while let Some(joined) = streams.join_next().await {
            if let Ok((container, Err(e))) = joined {
                warn!(path = %container.path(), error = %e, "log stream failed");
            }
        }
        result
    }
}

impl<C: ClusterClient> Transport for K8sTransport<C> {
    fn scheme(&self) -> Scheme {
        Scheme::K8s
    }

    async fn read(
        &self,
        window: Window,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        let since_seconds = window
            .start
            .map(|start| (Utc::now() - start).num_seconds().max(1));
        let options = LogOptions {
            follow: false,
            since_seconds,
            ..LogOptions::default()
        };
        self.watch(options, cancel, tx).await
    }

    async fn tail(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        let options = LogOptions {
            follow: true,
            since_seconds: Some(1),
            ..LogOptions::default()
        };
        self.watch(options, cancel, tx).await
    }

    async fn sample(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        let mut matching: Vec<PodContainer> = self.matching(&cancel).await?.into_iter().collect();
        matching.sort();
        let Some(container) = matching.into_iter().next() else {
            debug!(namespace = %self.namespace, "no matching pod to sample");
            return Ok(());
        };
        let options = LogOptions {
            tail_lines: Some(rand::random_range(1..=self.sample_depth)),
            limit: Some(1),
            ..LogOptions::default()
        };
        self.client
            .stream_logs(&container, &options, &cancel, &tx)
            .await
    }

    async fn list(
        &self,
        _window: Window,
        _cancel: CancellationToken,
        _tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        Err(CollectError::Unsupported {
            scheme: Scheme::K8s.to_string(),
            operation: "list".to_owned(),
        })
    }

    async fn copy(
        &self,
        _file_path: String,
        _dst_dir: PathBuf,
        _cancel: CancellationToken,
    ) -> Result<PathBuf, CollectError> {
        Err(CollectError::Unsupported {
            scheme: Scheme::K8s.to_string(),
            operation: "copy".to_owned(),
        })
    }
}
