//! 팬아웃 오케스트레이터 -- 여러 대상에 같은 작업을 동시에 실행합니다.
//!
//! [`Orchestrator`]는 대상마다 수집기를 하나씩 만들고, 세마포어로 동시 실행 수를
//! 제한하며, 모든 출력을 하나의 레코드 채널로 합칩니다.
//!
//! # 내부 아키텍처
//! ```text
//! targets -> acquire permit -> JoinSet worker (Collector::run) -> shared Sender<Record>
//!                                   |
//!                          failure -> RunSummary (siblings continue)
//!                          sink closed -> cancel run token
//! ```
//!
//! 공유 송신측은 모든 워커가 끝나고 허가를 반납한 뒤에만 닫힙니다.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gleaner_core::metrics::{LABEL_OPERATION, LABEL_SCHEME, TARGET_FAILURES_TOTAL};
use gleaner_core::types::{Record, Target};

use crate::collector::{Collector, Operation};
use crate::config::SessionConfig;
use crate::error::CollectError;
use crate::transport::{TargetTransport, Transport};

/// 대상별 트랜스포트 생성기
pub trait TransportFactory: Send + Sync + 'static {
    /// 생성되는 트랜스포트 타입
    type Transport: Transport;

    /// 대상 하나의 트랜스포트를 생성합니다.
    fn create(&self, target: &Target, config: &SessionConfig) -> Result<Self::Transport, CollectError>;
}

/// 스킴에 따라 file / ssh / k8s 트랜스포트를 생성합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    type Transport = TargetTransport;

    fn create(&self, target: &Target, config: &SessionConfig) -> Result<TargetTransport, CollectError> {
        TargetTransport::from_target(target, config)
    }
}

/// 실패한 대상 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    /// 대상 ID
    pub target_id: u64,
    /// 대상 소스 URL
    pub source: String,
    /// 에러 메시지
    pub error: String,
}

/// 실행 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// 정상 종료한 대상 수
    pub succeeded: usize,
    /// 실패한 대상 목록 (대상 ID 순)
    pub failed: Vec<TargetFailure>,
    /// 시작하지 못한 대상 수 (취소)
    pub skipped: usize,
}

impl RunSummary {
    /// 모든 대상이 성공했는지
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped == 0
    }
}

/// 팬아웃 오케스트레이터
pub struct Orchestrator<F = DefaultTransportFactory> {
    factory: Arc<F>,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl<F: TransportFactory> Orchestrator<F> {
    /// 세션 설정
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 모든 대상에 `operation`을 실행하고 레코드를 `sink`로 합칩니다.
    ///
    /// 대상별 실패는 요약에 기록되고 다른 대상은 계속 실행됩니다.
    /// 싱크가 닫히면 남은 작업을 모두 취소하고, 워커가 모두 끝난 뒤 에러를 반환합니다.
    pub async fn run(
        &self,
        targets: &[Target],
        operation: Operation,
        sink: mpsc::Sender<Record>,
    ) -> Result<RunSummary, CollectError> {
        let run_token = self.cancel.child_token();
        let _guard = run_token.clone().drop_guard();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let operation = Arc::new(operation);
        let mut workers = JoinSet::new();
        let mut running: HashMap<Id, (u64, String)> = HashMap::new();
        let mut summary = RunSummary::default();

        info!(
            targets = targets.len(),
            concurrency = self.config.concurrency,
            operation = operation.name(),
            "run started"
        );

        for (started, target) in targets.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = run_token.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                summary.skipped = targets.len() - started;
                break;
            };

            let factory = Arc::clone(&self.factory);
            let config = self.config.clone();
            let operation = Arc::clone(&operation);
            let token = run_token.clone();
            let sink = sink.clone();
            let target = target.clone();
            let spawned = (target.id, target.source.clone());
            let handle = workers.spawn(async move {
                let _permit = permit;
                let result = run_target(&*factory, &target, &config, &token, &sink, &operation).await;
                if let Err(e) = &result {
                    if e.is_fatal() {
                        token.cancel();
                    }
                }
                (target, result)
            });
            running.insert(handle.id(), spawned);
        }

        let mut fatal = None;
        while let Some(joined) = workers.join_next_with_id().await {
            let (target, result) = match joined {
                Ok((id, done)) => {
                    running.remove(&id);
                    done
                }
                Err(e) => {
                    let (target_id, source) = running.remove(&e.id()).unwrap_or_default();
                    warn!(target_id, source = %source, error = %e, "worker task failed");
                    summary.failed.push(TargetFailure {
                        target_id,
                        source,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            match result {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    warn!(
                        target_id = target.id,
                        source = %target.source,
                        operation = operation.name(),
                        error = %e,
                        "target failed"
                    );
                    counter!(
                        TARGET_FAILURES_TOTAL,
                        LABEL_SCHEME => target.scheme.as_str(),
                        LABEL_OPERATION => operation.name()
                    )
                    .increment(1);
                    summary.failed.push(TargetFailure {
                        target_id: target.id,
                        source: target.source.clone(),
                        error: e.to_string(),
                    });
                    if e.is_fatal() && fatal.is_none() {
                        fatal = Some(e);
                    }
                }
            }
        }
        drop(sink);

        summary.failed.sort_by_key(|f| f.target_id);
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            skipped = summary.skipped,
            "run finished"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

async fn run_target<F: TransportFactory>(
    factory: &F,
    target: &Target,
    config: &SessionConfig,
    cancel: &CancellationToken,
    sink: &mpsc::Sender<Record>,
    operation: &Operation,
) -> Result<(), CollectError> {
    let transport = factory.create(target, config)?;
    let collector = Collector::new(target, transport, config, cancel.clone())?;
    collector.run(sink, operation).await
}

/// 오케스트레이터 빌더
pub struct OrchestratorBuilder<F = DefaultTransportFactory> {
    factory: F,
    config: SessionConfig,
    cancel: Option<CancellationToken>,
}

impl OrchestratorBuilder<DefaultTransportFactory> {
    /// 기본 트랜스포트 생성기로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            factory: DefaultTransportFactory,
            config: SessionConfig::default(),
            cancel: None,
        }
    }
}

impl Default for OrchestratorBuilder<DefaultTransportFactory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: TransportFactory> OrchestratorBuilder<F> {
    /// 세션 설정을 지정합니다.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// 외부 취소 토큰을 연결합니다 (예: Ctrl-C).
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// 트랜스포트 생성기를 교체합니다.
    pub fn factory<G: TransportFactory>(self, factory: G) -> OrchestratorBuilder<G> {
        OrchestratorBuilder {
            factory,
            config: self.config,
            cancel: self.cancel,
        }
    }

    /// 설정을 검증하고 오케스트레이터를 생성합니다.
    pub fn build(self) -> Result<Orchestrator<F>, CollectError> {
        self.config.validate()?;
        Ok(Orchestrator {
            factory: Arc::new(self.factory),
            config: self.config,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}
