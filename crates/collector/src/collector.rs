//! 수집기 -- 대상 하나의 트랜스포트와 파서를 묶습니다.
//!
//! 모든 작업은 같은 형태로 실행됩니다.
//!
//! ```text
//! Transport --RawLine--> Parser stage --Record--> Drain stage --> RecordSink
//!     \___________________ inner token (child of collector token) ___/
//! ```
//!
//! 세 단계는 `tokio::join!`으로 함께 대기하므로, 작업이 반환될 때는 세션과
//! 파생 작업이 모두 끝나 있습니다. 내부 토큰은 모든 종료 경로에서 취소됩니다.

use std::future::Future;
use std::path::{Path, PathBuf};

use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gleaner_core::metrics::{LABEL_SCHEME, RECORDS_EMITTED_TOTAL};
use gleaner_core::pipeline::RecordSink;
use gleaner_core::types::{RawLine, Record, Target, Window};

use crate::config::SessionConfig;
use crate::error::CollectError;
use crate::parser::{LineParser, RecordAssembler, run_parser};
use crate::transport::{TargetTransport, Transport};

/// 대상 하나에 대해 실행할 작업
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// 시간 창 범위 일괄 수집
    Fetch(Window),
    /// 새 로그 따라가기
    Stream,
    /// 로그 파일 목록
    ListFiles(Window),
    /// 로그 파일 복사
    Copy {
        /// 시간 창
        window: Window,
        /// 저장 디렉터리
        dst_dir: PathBuf,
    },
    /// 무작위 한 줄 샘플
    Sample,
}

impl Operation {
    /// 로그와 메트릭에 쓰는 작업 이름
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Stream => "stream",
            Self::ListFiles(_) => "list",
            Self::Copy { .. } => "copy",
            Self::Sample => "sample",
        }
    }
}

/// 대상 하나의 수집기
pub struct Collector<T> {
    target: Target,
    transport: T,
    parser: LineParser,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl Collector<TargetTransport> {
    /// 대상 스킴에 맞는 트랜스포트로 수집기를 생성합니다.
    pub fn from_target(
        target: &Target,
        config: &SessionConfig,
        cancel: CancellationToken,
    ) -> Result<Self, CollectError> {
        let transport = TargetTransport::from_target(target, config)?;
        Self::new(target, transport, config, cancel)
    }
}

impl<T: Transport> Collector<T> {
    /// 주어진 트랜스포트로 수집기를 생성합니다.
    ///
    /// `cancel`이 취소되면 진행 중인 모든 작업이 멈춥니다.
    pub fn new(
        target: &Target,
        transport: T,
        config: &SessionConfig,
        cancel: CancellationToken,
    ) -> Result<Self, CollectError> {
        Ok(Self {
            parser: LineParser::from_target(target)?,
            target: target.clone(),
            transport,
            config: config.clone(),
            cancel,
        })
    }

    /// 수집 대상
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// 작업 하나를 실행합니다.
    pub async fn run<S: RecordSink>(&self, sink: &S, operation: &Operation) -> Result<(), CollectError> {
        match operation {
            Operation::Fetch(window) => self.fetch(sink, *window).await,
            Operation::Stream => self.stream(sink).await,
            Operation::ListFiles(window) => self.list_files(sink, *window).await,
            Operation::Copy { window, dst_dir } => self.copy(sink, *window, dst_dir).await,
            Operation::Sample => self.sample(sink).await,
        }
    }

    /// 시간 창 범위의 로그를 한 번 읽어 `sink`로 보냅니다.
    ///
    /// 종료 경계 도달은 정상 종료입니다.
    pub async fn fetch<S: RecordSink>(&self, sink: &S, window: Window) -> Result<(), CollectError> {
        info!(
            target_id = self.target.id,
            host = %self.target.host,
            path = %self.target.path,
            start = ?window.start,
            end = ?window.end,
            "fetch started"
        );
        self.run_parsed(sink, window, |cancel, tx| {
            self.transport.read(window, cancel, tx)
        })
        .await
    }

    /// 취소될 때까지 새 로그를 따라갑니다.
    pub async fn stream<S: RecordSink>(&self, sink: &S) -> Result<(), CollectError> {
        info!(target_id = self.target.id, host = %self.target.host, "stream started");
        self.run_parsed(sink, Window::unbounded(), |cancel, tx| {
            self.transport.tail(cancel, tx)
        })
        .await
    }

    /// 최근 로그에서 한 줄을 골라 파싱 결과를 보냅니다.
    pub async fn sample<S: RecordSink>(&self, sink: &S) -> Result<(), CollectError> {
        self.run_parsed(sink, Window::unbounded(), |cancel, tx| {
            self.transport.sample(cancel, tx)
        })
        .await
    }

    /// 시간 창 이후 수정된 파일마다 레코드 하나를 보냅니다 (내용 = 파일 경로).
    pub async fn list_files<S: RecordSink>(&self, sink: &S, window: Window) -> Result<(), CollectError> {
        let inner = self.cancel.child_token();
        let _guard = inner.clone().drop_guard();
        let (line_tx, line_rx) = mpsc::channel(self.capacity());
        let (record_tx, record_rx) = mpsc::channel(self.capacity());

        let transport = stop_on_error(&inner, self.transport.list(window, inner.clone(), line_tx));
        let convert = stop_on_error(&inner, self.file_records(line_rx, record_tx, &inner));
        let drain = stop_on_error(&inner, self.drain(sink, record_rx));
        let (transport, convert, drain) = tokio::join!(transport, convert, drain);
        inner.cancel();

        first_error(transport, convert, drain)
    }

    /// 파일 목록을 모두 받은 뒤 파일마다 `dst_dir` 아래로 복사합니다.
    ///
    /// 개별 파일 실패는 기록만 하고 다음 파일로 넘어갑니다.
    /// 복사된 파일마다 저장 경로를 내용으로 하는 레코드를 보냅니다.
    pub async fn copy<S: RecordSink>(
        &self,
        sink: &S,
        window: Window,
        dst_dir: &Path,
    ) -> Result<(), CollectError> {
        let files = self.collect_files(window).await?;
        info!(
            target_id = self.target.id,
            host = %self.target.host,
            files = files.len(),
            dst = %dst_dir.display(),
            "copy started"
        );

        let inner = self.cancel.child_token();
        let _guard = inner.clone().drop_guard();
        let mut copied = 0usize;
        for file in files {
            if inner.is_cancelled() {
                break;
            }
            match self
                .transport
                .copy(file.clone(), dst_dir.to_path_buf(), inner.clone())
                .await
            {
                Ok(dst) => {
                    copied += 1;
                    let record = Record {
                        host: self.target.host.clone(),
                        path: file,
                        timestamp: None,
                        filled_by_previous_timestamp: false,
                        content: dst.display().to_string(),
                        target_id: self.target.id,
                    };
                    sink.accept(record).await?;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        target_id = self.target.id,
                        host = %self.target.host,
                        file = %file,
                        error = %e,
                        "copy failed"
                    );
                }
            }
        }
        info!(target_id = self.target.id, copied, "copy finished");
        Ok(())
    }

    async fn collect_files(&self, window: Window) -> Result<Vec<String>, CollectError> {
        let (tx, mut rx) = mpsc::channel::<Record>(self.capacity());
        let listing = async move { self.list_files(&tx, window).await };
        let gather = async {
            let mut files = Vec::new();
            while let Some(record) = rx.recv().await {
                files.push(record.content);
            }
            files
        };
        let (listed, files) = tokio::join!(listing, gather);
        listed?;
        Ok(files)
    }

    async fn run_parsed<S, F, Fut>(&self, sink: &S, window: Window, session: F) -> Result<(), CollectError>
    where
        S: RecordSink,
        F: FnOnce(CancellationToken, mpsc::Sender<RawLine>) -> Fut,
        Fut: Future<Output = Result<(), CollectError>>,
    {
        let inner = self.cancel.child_token();
        let _guard = inner.clone().drop_guard();
        let (line_tx, line_rx) = mpsc::channel(self.capacity());
        let (record_tx, record_rx) = mpsc::channel(self.capacity());
        let assembler = RecordAssembler::new(
            self.parser.clone(),
            &self.target,
            window,
            self.config.max_multi_lines,
        );

        let transport = stop_on_error(&inner, session(inner.clone(), line_tx));
        let parser = stop_on_error(&inner, run_parser(assembler, line_rx, record_tx, inner.clone()));
        let drain = stop_on_error(&inner, self.drain(sink, record_rx));
        let (transport, parser, drain) = tokio::join!(transport, parser, drain);
        inner.cancel();

        first_error(transport, parser, drain)
    }

    async fn file_records(
        &self,
        mut lines: mpsc::Receiver<RawLine>,
        records: mpsc::Sender<Record>,
        cancel: &CancellationToken,
    ) -> Result<(), CollectError> {
        loop {
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                line = lines.recv() => line,
            };
            let Some(line) = line else {
                return Ok(());
            };
            let record = Record {
                host: line.host,
                path: line.content.clone(),
                timestamp: None,
                filled_by_previous_timestamp: false,
                content: line.content,
                target_id: self.target.id,
            };
            records
                .send(record)
                .await
                .map_err(|_| CollectError::SinkClosed("file list channel closed".to_owned()))?;
        }
    }

    /// 레코드를 싱크로 옮깁니다. 수집기 토큰이 취소되면 즉시 멈춥니다.
    ///
    /// 내부(세션) 토큰은 보지 않습니다. 창 종료 뒤에도 조립된 레코드는 전달됩니다.
    async fn drain<S: RecordSink>(
        &self,
        sink: &S,
        mut records: mpsc::Receiver<Record>,
    ) -> Result<(), CollectError> {
        let scheme = self.target.scheme.as_str();
        let mut emitted = 0u64;
        loop {
            let record = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                record = records.recv() => record,
            };
            let Some(record) = record else {
                break;
            };
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                accepted = sink.accept(record) => accepted?,
            }
            emitted += 1;
            counter!(RECORDS_EMITTED_TOTAL, LABEL_SCHEME => scheme).increment(1);
        }
        debug!(target_id = self.target.id, emitted, "drain finished");
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.config.channel_capacity.max(1)
    }
}

async fn stop_on_error<T>(
    token: &CancellationToken,
    stage: impl Future<Output = Result<T, CollectError>>,
) -> Result<T, CollectError> {
    let result = stage.await;
    if result.is_err() {
        token.cancel();
    }
    result
}

/// 싱크 에러(치명적)를 우선하고, 그다음 트랜스포트, 파서 순으로 고릅니다.
fn first_error(
    transport: Result<(), CollectError>,
    stage: Result<(), CollectError>,
    drain: Result<(), CollectError>,
) -> Result<(), CollectError> {
    drain?;
    transport?;
    match stage {
        Err(e) if e.is_fatal() => Ok(()),
        other => other,
    }
}
