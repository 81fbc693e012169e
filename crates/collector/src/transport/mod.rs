//! 트랜스포트 -- 로그 소스에서 원시 라인을 읽어 옵니다.
//!
//! # 트랜스포트 종류
//! - [`FileTransport`]: 로컬 `sh -c` 파이프라인
//! - [`SshTransport`]: `ssh host` 위의 같은 파이프라인
//! - [`K8sTransport`]: 파드 컨테이너 로그 스트림 (`kubectl logs`)
//!
//! 모든 작업은 라인을 유한 용량 채널로 밀어 넣고, 끝나면 송신측을 놓아
//! 스트림을 닫습니다. 취소 시 외부 프로세스는 항상 종료됩니다.

pub mod command;
pub mod k8s;
pub(crate) mod process;
pub mod shell;

use std::future::Future;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gleaner_core::types::{RawLine, Scheme, Target, Window};

use crate::config::SessionConfig;
use crate::error::CollectError;

pub use command::{CommandBuilder, Dialect, UNIXTIME, grep_prefix, shell_quote};
pub use k8s::{ClusterClient, K8sTransport, KubectlClient, LogOptions, PodContainer};
pub use shell::{CommandTransport, FileTransport, LocalShell, Shell, SshShell, SshTransport};

/// 로그 소스 접근 trait
///
/// 각 작업은 `tx`로 라인을 보내고, 반환 시점에는 `tx`를 포함한 모든 송신측을
/// 해제합니다. `cancel`이 취소되면 가능한 빨리 `Ok(())`로 반환합니다.
pub trait Transport: Send + Sync + 'static {
    /// 대상 스킴
    fn scheme(&self) -> Scheme;

    /// 시간 창 범위의 로그를 읽습니다.
    fn read(
        &self,
        window: Window,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> impl Future<Output = Result<(), CollectError>> + Send;

    /// 새 로그를 계속 따라갑니다 (취소될 때까지).
    fn tail(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> impl Future<Output = Result<(), CollectError>> + Send;

    /// 최근 로그에서 한 줄을 무작위로 고릅니다.
    fn sample(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> impl Future<Output = Result<(), CollectError>> + Send;

    /// 시간 창 이후 수정된 파일 경로를 한 줄씩 보냅니다.
    fn list(
        &self,
        window: Window,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> impl Future<Output = Result<(), CollectError>> + Send;

    /// 파일 하나를 `dst_dir` 아래로 복사하고 저장 경로를 반환합니다.
    fn copy(
        &self,
        file_path: String,
        dst_dir: PathBuf,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<PathBuf, CollectError>> + Send;
}

/// 대상 스킴으로 한 번 선택되는 트랜스포트
pub enum TargetTransport {
    /// 로컬 파일
    File(FileTransport),
    /// SSH 원격 파일
    Ssh(SshTransport),
    /// 쿠버네티스 파드
    K8s(K8sTransport<KubectlClient>),
}

impl TargetTransport {
    /// 대상에 맞는 트랜스포트를 생성합니다.
    pub fn from_target(target: &Target, config: &SessionConfig) -> Result<Self, CollectError> {
        Ok(match target.scheme {
            Scheme::File => Self::File(FileTransport::new(target, config)?),
            Scheme::Ssh => Self::Ssh(SshTransport::new(target, config)?),
            Scheme::K8s => Self::K8s(K8sTransport::new(
                KubectlClient::new(&target.host, config),
                target,
                config,
            )?),
        })
    }
}

impl Transport for TargetTransport {
    fn scheme(&self) -> Scheme {
        match self {
            Self::File(t) => t.scheme(),
            Self::Ssh(t) => t.scheme(),
            Self::K8s(t) => t.scheme(),
        }
    }

    async fn read(
        &self,
        window: Window,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        match self {
            Self::File(t) => t.read(window, cancel, tx).await,
            Self::Ssh(t) => t.read(window, cancel, tx).await,
            Self::K8s(t) => t.read(window, cancel, tx).await,
        }
    }

    async fn tail(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        match self {
            Self::File(t) => t.tail(cancel, tx).await,
            Self::Ssh(t) => t.tail(cancel, tx).await,
            Self::K8s(t) => t.tail(cancel, tx).await,
        }
    }

    async fn sample(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        match self {
            Self::File(t) => t.sample(cancel, tx).await,
            Self::Ssh(t) => t.sample(cancel, tx).await,
            Self::K8s(t) => t.sample(cancel, tx).await,
        }
    }

    async fn list(
        &self,
        window: Window,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        match self {
            Self::File(t) => t.list(window, cancel, tx).await,
            Self::Ssh(t) => t.list(window, cancel, tx).await,
            Self::K8s(t) => t.list(window, cancel, tx).await,
        }
    }

    async fn copy(
        &self,
        file_path: String,
        dst_dir: PathBuf,
        cancel: CancellationToken,
    ) -> Result<PathBuf, CollectError> {
        match self {
            Self::File(t) => t.copy(file_path, dst_dir, cancel).await,
            Self::Ssh(t) => t.copy(file_path, dst_dir, cancel).await,
            Self::K8s(t) => t.copy(file_path, dst_dir, cancel).await,
        }
    }
}
