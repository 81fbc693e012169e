//! 자식 프로세스 실행 및 라인 펌프
//!
//! 모든 트랜스포트는 결국 외부 명령(`sh`, `ssh`, `kubectl`)의 표준 출력을
//! 줄 단위로 읽어 [`RawLine`]으로 채널에 밀어 넣습니다.
//!
//! 취소되면 프로세스 그룹 전체를 종료하고 채널 송신측을 놓습니다.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use chrono::{DateTime, FixedOffset, Utc};
use metrics::{counter, gauge};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use gleaner_core::metrics::{LINES_READ_TOTAL, LINES_TRUNCATED_TOTAL, SESSIONS_ACTIVE};
use gleaner_core::types::{RawLine, parse_utc_offset};

use crate::error::CollectError;

/// 펌프가 생성하는 라인의 공통 속성
#[derive(Debug, Clone)]
pub(crate) struct LineSpec {
    /// 원본 호스트
    pub host: String,
    /// 원본 경로
    pub path: String,
    /// 세션 시간대
    pub zone: Option<FixedOffset>,
    /// 각 줄 앞의 RFC 3339 타임스탬프를 분리할지 여부 (`kubectl logs --timestamps`)
    pub transport_timestamps: bool,
    /// 한 줄 최대 길이
    pub max_line_length: usize,
    /// 이 줄 수만큼 보낸 뒤 종료
    pub limit: Option<usize>,
    /// 표준 에러 캡처 최대 크기
    pub stderr_limit: usize,
}

impl LineSpec {
    fn line(&self, content: String) -> RawLine {
        let (timestamp, content) = if self.transport_timestamps {
            split_transport_timestamp(content)
        } else {
            (None, content)
        };
        RawLine {
            host: self.host.clone(),
            path: self.path.clone(),
            content,
            time_zone_hint: self.zone,
            timestamp_from_transport: timestamp,
        }
    }
}

/// `2024-03-05T10:00:00.123456789Z message` 형식에서 타임스탬프를 분리합니다.
///
/// 접두사가 타임스탬프가 아니면 줄을 그대로 돌려줍니다.
pub(crate) fn split_transport_timestamp(line: String) -> (Option<DateTime<Utc>>, String) {
    let Some((head, rest)) = line.split_once(' ') else {
        return match DateTime::parse_from_rfc3339(&line) {
            Ok(ts) => (Some(ts.with_timezone(&Utc)), String::new()),
            Err(_) => (None, line),
        };
    };
    match DateTime::parse_from_rfc3339(head) {
        Ok(ts) => (Some(ts.with_timezone(&Utc)), rest.to_owned()),
        Err(_) => (None, line),
    }
}

/// 명령을 사람이 읽을 수 있는 문자열로 표현합니다.
pub(crate) fn describe(command: &Command) -> String {
    let std = command.as_std();
    let mut out = std.get_program().to_string_lossy().into_owned();
    for arg in std.get_args() {
        out.push(' ');
        out.push_str(&arg.to_string_lossy());
    }
    out
}

fn spawn(command: &mut Command, stdout: Stdio) -> Result<Child, CollectError> {
    command
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    command.spawn().map_err(|e| CollectError::Spawn {
        command: describe(command),
        reason: e.to_string(),
    })
}

/// 자식 프로세스와 그 프로세스 그룹을 종료합니다.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: killpg(2)는 메모리를 건드리지 않으며, pid는 process_group(0)으로
        // 생성한 자식의 그룹 ID입니다. 이미 종료된 그룹이면 ESRCH만 반환합니다.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "child already exited");
    }
}

async fn read_capped<R: AsyncRead + Unpin>(reader: R, limit: usize) -> String {
    let mut buf = Vec::new();
    let mut limited = reader.take(limit as u64);
    if let Err(e) = limited.read_to_end(&mut buf).await {
        debug!(error = %e, "failed to read stderr");
    }
    String::from_utf8_lossy(&buf).trim().to_owned()
}

/// 최대 길이까지만 한 줄을 읽습니다.
///
/// 반환값: `None`이면 EOF, `Some(true)`이면 줄이 잘렸음.
pub(crate) async fn read_line_bounded<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
) -> std::io::Result<Option<bool>> {
    buf.clear();
    let mut truncated = false;
    let mut read_any = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(read_any.then_some(truncated));
        }
        read_any = true;

        let (chunk_len, consumed, done) = match available.iter().position(|b| *b == b'\n') {
            Some(idx) => (idx, idx + 1, true),
            None => (available.len(), available.len(), false),
        };
        let room = max.saturating_sub(buf.len());
        if chunk_len > room {
            truncated = true;
        }
        buf.extend_from_slice(&available[..chunk_len.min(room)]);
        reader.consume(consumed);

        if done {
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            return Ok(Some(truncated));
        }
    }
}

enum PumpEnd {
    Eof,
    Stopped,
}

/// 명령을 실행하고 표준 출력의 각 줄을 채널로 보냅니다.
///
/// - 취소, 수신측 종료, `limit` 도달 시 프로세스 그룹을 종료하고 `Ok(())`
/// - 읽기 실패 시 [`CollectError::StreamInterrupted`]
/// - 종료 코드는 실패로 취급하지 않습니다 (`grep`은 일치 없음에 1을 반환)
pub(crate) async fn pump_lines(
    mut command: Command,
    spec: &LineSpec,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<RawLine>,
) -> Result<(), CollectError> {
    let description = describe(&command);
    let mut child = spawn(&mut command, Stdio::piped())?;
    debug!(host = %spec.host, path = %spec.path, command = %description, "session opened");
    gauge!(SESSIONS_ACTIVE).increment(1.0);

    let stderr = child
        .stderr
        .take()
        .map(|s| tokio::spawn(read_capped(s, spec.stderr_limit)));
    let Some(stdout) = child.stdout.take() else {
        terminate(&mut child).await;
        gauge!(SESSIONS_ACTIVE).decrement(1.0);
        return Err(CollectError::Spawn {
            command: description,
            reason: "stdout not captured".to_owned(),
        });
    };

    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    let mut sent = 0usize;

    let outcome: Result<PumpEnd, CollectError> = loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(PumpEnd::Stopped),
            read = read_line_bounded(&mut reader, &mut buf, spec.max_line_length) => read,
        };

        match read {
            Ok(Some(truncated)) => {
                counter!(LINES_READ_TOTAL).increment(1);
                if truncated {
                    counter!(LINES_TRUNCATED_TOTAL).increment(1);
                    warn!(
                        host = %spec.host,
                        path = %spec.path,
                        max = spec.max_line_length,
                        "line exceeds maximum length, truncated"
                    );
                }
                let line = spec.line(String::from_utf8_lossy(&buf).into_owned());
                let delivered = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => false,
                    res = tx.send(line) => res.is_ok(),
                };
                if !delivered {
                    break Ok(PumpEnd::Stopped);
                }
                sent += 1;
                if spec.limit.is_some_and(|limit| sent >= limit) {
                    break Ok(PumpEnd::Stopped);
                }
            }
            Ok(None) => break Ok(PumpEnd::Eof),
            Err(e) => {
                break Err(CollectError::StreamInterrupted {
                    host: spec.host.clone(),
                    path: spec.path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    };
    drop(reader);

    let status = match outcome {
        Ok(PumpEnd::Eof) => child.wait().await.ok(),
        _ => {
            terminate(&mut child).await;
            None
        }
    };
    let stderr = match stderr {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
    log_exit(spec, &description, status, &stderr);

    match outcome {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(host = %spec.host, path = %spec.path, error = %e, "stream interrupted");
            Err(e)
        }
    }
}

fn log_exit(spec: &LineSpec, command: &str, status: Option<ExitStatus>, stderr: &str) {
    match status {
        Some(status) if !status.success() && !stderr.is_empty() => warn!(
            host = %spec.host,
            path = %spec.path,
            command,
            %status,
            stderr,
            "command reported errors"
        ),
        Some(status) => debug!(host = %spec.host, path = %spec.path, %status, "session closed"),
        None => debug!(host = %spec.host, path = %spec.path, "session cancelled"),
    }
}

/// 명령을 끝까지 실행하고 표준 출력을 문자열로 돌려줍니다.
///
/// 0이 아닌 종료 코드는 [`CollectError::CommandFailed`]입니다.
pub(crate) async fn capture(
    mut command: Command,
    cancel: &CancellationToken,
    stderr_limit: usize,
) -> Result<String, CollectError> {
    let description = describe(&command);
    let mut child = spawn(&mut command, Stdio::piped())?;
    let stderr = child
        .stderr
        .take()
        .map(|s| tokio::spawn(read_capped(s, stderr_limit)));
    let mut stdout = child.stdout.take();

    let mut out = Vec::new();
    let finished = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = async {
            if let Some(pipe) = stdout.as_mut() {
                pipe.read_to_end(&mut out).await?;
            }
            child.wait().await
        } => Some(res),
    };

    let status = match finished {
        Some(res) => res?,
        None => {
            terminate(&mut child).await;
            return Err(CollectError::CommandFailed {
                command: description,
                status: "cancelled".to_owned(),
                stderr: String::new(),
            });
        }
    };
    let stderr = match stderr {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };

    if !status.success() {
        return Err(CollectError::CommandFailed {
            command: description,
            status: status.to_string(),
            stderr,
        });
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// 세션 시작 시 `date +%z` 출력으로 시간대를 확인합니다.
pub(crate) async fn probe_time_zone(
    command: Command,
    host: &str,
    cancel: &CancellationToken,
) -> Result<FixedOffset, CollectError> {
    let out = capture(command, cancel, 1024)
        .await
        .map_err(|e| CollectError::TimeZoneProbe {
            host: host.to_owned(),
            reason: e.to_string(),
        })?;
    parse_utc_offset(out.trim()).ok_or_else(|| CollectError::TimeZoneProbe {
        host: host.to_owned(),
        reason: format!("unexpected offset '{}'", out.trim()),
    })
}

/// 명령의 표준 출력을 파일로 저장합니다 (바이트 그대로).
pub(crate) async fn run_to_file(
    mut command: Command,
    dst: &Path,
    cancel: &CancellationToken,
    stderr_limit: usize,
) -> Result<(), CollectError> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file = tokio::fs::File::create(dst).await?.into_std().await;

    let description = describe(&command);
    let mut child = spawn(&mut command, Stdio::from(file))?;
    let stderr = child
        .stderr
        .take()
        .map(|s| tokio::spawn(read_capped(s, stderr_limit)));

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = child.wait() => Some(res),
    };
    let status = match status {
        Some(res) => res?,
        None => {
            terminate(&mut child).await;
            return Err(CollectError::CommandFailed {
                command: description,
                status: "cancelled".to_owned(),
                stderr: String::new(),
            });
        }
    };

    if !status.success() {
        let stderr = match stderr {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        return Err(CollectError::CommandFailed {
            command: description,
            status: status.to_string(),
            stderr,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> LineSpec {
        LineSpec {
            host: "localhost".to_owned(),
            path: "/tmp/test.log".to_owned(),
            zone: FixedOffset::east_opt(9 * 3600),
            transport_timestamps: false,
            max_line_length: 16,
            limit: None,
            stderr_limit: 1024,
        }
    }

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn bounded_reader_truncates_long_lines() {
        let data: &[u8] = b"short\r\nthis line is far too long\nlast";
        let mut reader = BufReader::with_capacity(4, data);
        let mut buf = Vec::new();

        assert_eq!(read_line_bounded(&mut reader, &mut buf, 10).await.unwrap(), Some(false));
        assert_eq!(buf, b"short");
        assert_eq!(read_line_bounded(&mut reader, &mut buf, 10).await.unwrap(), Some(true));
        assert_eq!(buf, b"this line ");
        assert_eq!(read_line_bounded(&mut reader, &mut buf, 10).await.unwrap(), Some(false));
        assert_eq!(buf, b"last");
        assert_eq!(read_line_bounded(&mut reader, &mut buf, 10).await.unwrap(), None);
    }

    #[test]
    fn split_kubectl_timestamp_prefix() {
        let (ts, content) =
            split_transport_timestamp("2024-03-05T10:00:00.123456789Z GET /health 200".to_owned());
        assert_eq!(ts.unwrap().to_rfc3339(), "2024-03-05T10:00:00.123456789+00:00");
        assert_eq!(content, "GET /health 200");

        let (ts, content) = split_transport_timestamp("plain line".to_owned());
        assert!(ts.is_none());
        assert_eq!(content, "plain line");
    }

    #[tokio::test]
    async fn pump_sends_lines_with_zone_hint() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        pump_lines(sh("printf 'a\\nb\\n'"), &spec(), &cancel, &tx)
            .await
            .unwrap();
        drop(tx);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.content, "a");
        assert_eq!(first.time_zone_hint, FixedOffset::east_opt(9 * 3600));
        assert_eq!(rx.recv().await.unwrap().content, "b");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn pump_respects_limit() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let spec = LineSpec {
            limit: Some(1),
            ..spec()
        };
        pump_lines(sh("yes line"), &spec, &cancel, &tx).await.unwrap();
        drop(tx);

        assert_eq!(rx.recv().await.unwrap().content, "line");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn pump_stops_on_cancel() {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let pump_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            pump_lines(sh("while true; do echo tick; sleep 0.01; done"), &spec(), &pump_cancel, &tx)
                .await
        });

        assert_eq!(rx.recv().await.unwrap().content, "tick");
        cancel.cancel();
        handle.await.unwrap().unwrap();
        // 송신측이 해제되어 스트림이 닫힘
        while rx.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn pump_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let cancel = CancellationToken::new();
        pump_lines(sh("yes line"), &spec(), &cancel, &tx).await.unwrap();
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_before_output() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let err = pump_lines(
            Command::new("/nonexistent/gleaner-test-binary"),
            &spec(),
            &cancel,
            &tx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CollectError::Spawn { .. }));
    }

    #[tokio::test]
    async fn capture_reports_failure_status() {
        let cancel = CancellationToken::new();
        let err = capture(sh("echo oops >&2; exit 3"), &cancel, 1024)
            .await
            .unwrap_err();
        match err {
            CollectError::CommandFailed { stderr, .. } => assert_eq!(stderr, "oops"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn probe_parses_offset() {
        let cancel = CancellationToken::new();
        let zone = probe_time_zone(sh("echo +0530"), "localhost", &cancel)
            .await
            .unwrap();
        assert_eq!(zone, FixedOffset::east_opt(5 * 3600 + 1800).unwrap());

        let err = probe_time_zone(sh("echo garbage"), "localhost", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::TimeZoneProbe { .. }));
    }

    #[tokio::test]
    async fn run_to_file_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("nested/out.log");
        let cancel = CancellationToken::new();
        run_to_file(sh("printf 'x\\ny'"), &dst, &cancel, 1024)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "x\ny");
    }
}
