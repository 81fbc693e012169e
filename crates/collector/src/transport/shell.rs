//! file / ssh 트랜스포트
//!
//! 두 트랜스포트는 같은 셸 파이프라인을 실행하며, 명령을 어디서 실행하는지만 다릅니다.
//! [`Shell`]이 그 차이를 담당합니다.

use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use gleaner_core::types::{LOCALHOST, RawLine, Scheme, Target, Window};

use super::Transport;
use super::command::{CommandBuilder, Dialect, grep_prefix};
use super::process::{LineSpec, probe_time_zone, pump_lines, run_to_file};
use crate::config::SessionConfig;
use crate::error::CollectError;
use crate::parser::time_format_for;

/// 셸 스크립트를 실행할 위치
pub trait Shell: Send + Sync + 'static {
    /// 대상 스킴
    fn scheme(&self) -> Scheme;

    /// 라인에 기록할 호스트 이름
    fn host(&self) -> &str;

    /// 원격 도구 방언
    fn dialect(&self) -> Dialect;

    /// 스크립트를 실행하는 명령
    fn command(&self, script: &str) -> Command;

    /// 복사본을 저장할 로컬 경로
    fn copy_destination(&self, dst_dir: &Path, file_path: &str) -> PathBuf;
}

/// 로컬 `sh -c`
#[derive(Debug, Clone)]
pub struct LocalShell {
    shell: String,
}

impl LocalShell {
    /// 새 로컬 셸을 생성합니다.
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Shell for LocalShell {
    fn scheme(&self) -> Scheme {
        Scheme::File
    }

    fn host(&self) -> &str {
        LOCALHOST
    }

    fn dialect(&self) -> Dialect {
        Dialect::local()
    }

    fn command(&self, script: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(script);
        cmd
    }

    fn copy_destination(&self, dst_dir: &Path, file_path: &str) -> PathBuf {
        dst_dir.join(file_path.trim_start_matches('/'))
    }
}

/// `ssh [-p port] [-l user] host script`
///
/// 인증은 ssh 설정(에이전트, `~/.ssh/config`)에 맡깁니다.
#[derive(Debug, Clone)]
pub struct SshShell {
    ssh_command: String,
    options: Vec<String>,
    host: String,
    user: Option<String>,
    port: Option<u16>,
}

impl SshShell {
    /// 대상과 설정으로 ssh 셸을 생성합니다.
    pub fn new(target: &Target, config: &SessionConfig) -> Self {
        Self {
            ssh_command: config.ssh_command.clone(),
            options: config.ssh_options.clone(),
            host: target.host.clone(),
            user: target.user.clone(),
            port: target.port,
        }
    }

    /// ssh 인자 목록 (스크립트 제외)
    pub fn args(&self) -> Vec<String> {
        let mut args = self.options.clone();
        if let Some(port) = self.port {
            args.push("-p".to_owned());
            args.push(port.to_string());
        }
        if let Some(user) = &self.user {
            args.push("-l".to_owned());
            args.push(user.clone());
        }
        args.push(self.host.clone());
        args
    }
}

impl Shell for SshShell {
    fn scheme(&self) -> Scheme {
        Scheme::Ssh
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn dialect(&self) -> Dialect {
        Dialect::Gnu
    }

    fn command(&self, script: &str) -> Command {
        let mut cmd = Command::new(&self.ssh_command);
        cmd.args(self.args()).arg(script);
        cmd
    }

    fn copy_destination(&self, dst_dir: &Path, file_path: &str) -> PathBuf {
        dst_dir
            .join(&self.host)
            .join(file_path.trim_start_matches('/'))
    }
}

/// 셸 파이프라인 기반 트랜스포트
pub struct CommandTransport<S> {
    shell: S,
    target: Target,
    builder: CommandBuilder,
    time_format: Option<String>,
    target_zone: Option<FixedOffset>,
    config: SessionConfig,
}

/// 로컬 파일 트랜스포트
pub type FileTransport = CommandTransport<LocalShell>;

/// SSH 원격 파일 트랜스포트
pub type SshTransport = CommandTransport<SshShell>;

impl CommandTransport<LocalShell> {
    /// 로컬 파일 대상 트랜스포트를 생성합니다.
    pub fn new(target: &Target, config: &SessionConfig) -> Result<Self, CollectError> {
        Self::with_shell(LocalShell::new(&config.shell), target, config)
    }
}

impl CommandTransport<SshShell> {
    /// SSH 대상 트랜스포트를 생성합니다.
    pub fn new(target: &Target, config: &SessionConfig) -> Result<Self, CollectError> {
        Self::with_shell(SshShell::new(target, config), target, config)
    }
}

impl<S: Shell> CommandTransport<S> {
    /// 임의의 셸로 트랜스포트를 생성합니다.
    pub fn with_shell(shell: S, target: &Target, config: &SessionConfig) -> Result<Self, CollectError> {
        Ok(Self {
            builder: CommandBuilder::new(target, config.sudo, shell.dialect()),
            time_format: time_format_for(target),
            target_zone: target.zone()?,
            target: target.clone(),
            config: config.clone(),
            shell,
        })
    }

    /// 실행 위치
    pub fn shell(&self) -> &S {
        &self.shell
    }

    async fn session_zone(&self, cancel: &CancellationToken) -> Result<FixedOffset, CollectError> {
        probe_time_zone(self.shell.command("date +%z"), self.shell.host(), cancel).await
    }

    fn spec(&self, zone: FixedOffset, limit: Option<usize>) -> LineSpec {
        LineSpec {
            host: self.shell.host().to_owned(),
            path: self.target.path.clone(),
            zone: Some(zone),
            transport_timestamps: false,
            max_line_length: self.config.max_line_length,
            limit,
            stderr_limit: self.config.stderr_capture_limit,
        }
    }

    async fn run(
        &self,
        script: String,
        limit: Option<usize>,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        let zone = self.session_zone(&cancel).await?;
        pump_lines(self.shell.command(&script), &self.spec(zone, limit), &cancel, &tx).await
    }
}

impl<S: Shell> Transport for CommandTransport<S> {
    fn scheme(&self) -> Scheme {
        self.shell.scheme()
    }

    async fn read(
        &self,
        window: Window,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        let zone = self.session_zone(&cancel).await?;
        let prefix = grep_prefix(
            self.time_format.as_deref(),
            self.target_zone.unwrap_or(zone),
            &window,
            self.target.multi_line,
        );
        let script = self.builder.fetch(&window, prefix.as_deref());
        info!(
            target_id = self.target.id,
            host = self.shell.host(),
            path = %self.target.path,
            "fetching logs"
        );
        pump_lines(self.shell.command(&script), &self.spec(zone, None), &cancel, &tx).await
    }

    async fn tail(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        info!(
            target_id = self.target.id,
            host = self.shell.host(),
            path = %self.target.path,
            "following logs"
        );
        self.run(self.builder.tail(), None, cancel, tx).await
    }

    async fn sample(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        let depth = rand::random_range(1..=self.config.sample_depth);
        self.run(self.builder.sample(depth), Some(1), cancel, tx).await
    }

    async fn list(
        &self,
        window: Window,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        self.run(self.builder.list(&window), None, cancel, tx).await
    }

    async fn copy(
        &self,
        file_path: String,
        dst_dir: PathBuf,
        cancel: CancellationToken,
    ) -> Result<PathBuf, CollectError> {
        let dst = self.shell.copy_destination(&dst_dir, &file_path);
        run_to_file(
            self.shell.command(&self.builder.copy(&file_path)),
            &dst,
            &cancel,
            self.config.stderr_capture_limit,
        )
        .await?;
        info!(host = self.shell.host(), file = %file_path, dst = %dst.display(), "copied");
        Ok(dst)
    }
}
