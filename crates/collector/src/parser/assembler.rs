//! 레코드 조립기
//!
//! 세션 하나의 상태(직전 타임스탬프, 조립 중인 멀티라인 레코드, 시간 창 상태)를
//! 명시적으로 들고 라인을 하나씩 접어 레코드를 만듭니다.
//!
//! ```text
//! RawLine -> LineParser::stamp -> (multi-line merge) -> WindowGate -> Record
//! ```

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use gleaner_core::types::{RawLine, Record, Target, Window};

use super::LineParser;
use crate::error::CollectError;

/// 멀티라인 상한 초과 시 주입되는 진단 레코드 내용
pub const TOO_MANY_ROWS: &str = "gleaner parse error: too many rows";

/// 시간 창 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// 시작 경계 이전
    NotStarted,
    /// 방출 중
    Started,
    /// 종료 경계 초과, 이후 입력은 모두 버림
    Ended,
}

/// 게이트 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Emit,
    Skip,
    End,
}

/// 시간 창 상태 기계
///
/// 경계 비교는 모두 strict `>`입니다.
#[derive(Debug, Clone)]
pub struct WindowGate {
    window: Window,
    state: GateState,
    untimed_passes: bool,
}

impl WindowGate {
    /// 새 게이트를 생성합니다.
    ///
    /// 시작 경계가 없으면 바로 `Started`입니다. `untimed_passes`가 참이면
    /// 타임스탬프가 없는 레코드는 시작 경계 이전에도 방출됩니다.
    pub fn new(window: Window, untimed_passes: bool) -> Self {
        let state = if window.start.is_some() {
            GateState::NotStarted
        } else {
            GateState::Started
        };
        Self {
            window,
            state,
            untimed_passes,
        }
    }

    /// 현재 상태
    pub fn state(&self) -> GateState {
        self.state
    }

    fn admit(&mut self, ts: Option<DateTime<Utc>>) -> Admission {
        match self.state {
            GateState::Ended => Admission::Skip,
            GateState::NotStarted => match ts {
                Some(t) if self.window.is_after_start(t) => {
                    self.state = GateState::Started;
                    self.admit_started(ts)
                }
                None if self.untimed_passes => Admission::Emit,
                _ => Admission::Skip,
            },
            GateState::Started => self.admit_started(ts),
        }
    }

    fn admit_started(&mut self, ts: Option<DateTime<Utc>>) -> Admission {
        match ts {
            Some(t) if self.window.is_after_end(t) => {
                self.state = GateState::Ended;
                Admission::End
            }
            _ => Admission::Emit,
        }
    }
}

/// 라인 하나를 처리한 뒤의 흐름
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// 계속 입력을 받음
    Continue,
    /// 종료 경계를 넘음, 세션을 멈춰야 함
    Ended,
}

#[derive(Debug)]
struct Pending {
    record: Record,
    lines: usize,
}

/// 세션 단위 레코드 조립기
#[derive(Debug)]
pub struct RecordAssembler {
    parser: LineParser,
    target_id: u64,
    multi_line: bool,
    max_multi_lines: usize,
    gate: WindowGate,
    last_timestamp: Option<DateTime<Utc>>,
    pending: Option<Pending>,
    /// 버려진 레코드의 후속 줄을 건너뛰는 중
    skipping: bool,
}

impl RecordAssembler {
    /// 대상 하나의 세션용 조립기를 생성합니다.
    pub fn new(parser: LineParser, target: &Target, window: Window, max_multi_lines: usize) -> Self {
        let gate = WindowGate::new(window, !parser.parses_content());
        Self {
            parser,
            target_id: target.id,
            multi_line: target.multi_line,
            max_multi_lines: max_multi_lines.max(1),
            gate,
            last_timestamp: None,
            pending: None,
            skipping: false,
        }
    }

    /// 시간 창 상태
    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// 가장 최근에 라인에서 얻은 타임스탬프
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }

    /// 라인 하나를 접습니다. 완성된 레코드는 `out`에 순서대로 추가됩니다.
    pub fn push(&mut self, line: RawLine, out: &mut Vec<Record>) -> Flow {
        if self.gate.state() == GateState::Ended {
            return Flow::Ended;
        }

        if self.multi_line && is_continuation(&line.content) {
            if self.skipping {
                return Flow::Continue;
            }
            if let Some(pending) = self.pending.as_mut() {
                pending.record.content.push('\n');
                pending.record.content.push_str(&line.content);
                pending.lines += 1;
                if pending.lines > self.max_multi_lines {
                    self.force_flush(out);
                }
                return Flow::Continue;
            }
        }

        let stamp = self.parser.stamp(&line, self.last_timestamp);
        if stamp.fresh {
            self.last_timestamp = stamp.timestamp;
        }

        let record = Record {
            host: line.host,
            path: line.path,
            timestamp: stamp.timestamp,
            filled_by_previous_timestamp: stamp.filled,
            content: line.content,
            target_id: self.target_id,
        };

        match self.gate.admit(record.timestamp) {
            Admission::Skip => {
                self.skipping = true;
                Flow::Continue
            }
            Admission::End => {
                self.flush(out);
                self.skipping = true;
                debug!(target_id = self.target_id, "window end reached");
                Flow::Ended
            }
            Admission::Emit => {
                self.skipping = false;
                if self.multi_line {
                    self.flush(out);
                    self.pending = Some(Pending { record, lines: 1 });
                } else {
                    out.push(record);
                }
                Flow::Continue
            }
        }
    }

    /// 스트림 종료 시 남은 레코드를 꺼냅니다.
    pub fn finish(&mut self) -> Option<Record> {
        self.pending.take().map(|p| p.record)
    }

    fn flush(&mut self, out: &mut Vec<Record>) {
        if let Some(pending) = self.pending.take() {
            out.push(pending.record);
        }
    }

    fn force_flush(&mut self, out: &mut Vec<Record>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        warn!(
            target_id = self.target_id,
            host = %pending.record.host,
            path = %pending.record.path,
            lines = pending.lines,
            "multi-line record exceeded limit, flushing"
        );
        let marker = Record {
            content: TOO_MANY_ROWS.to_owned(),
            filled_by_previous_timestamp: pending.record.timestamp.is_some(),
            ..pending.record.clone()
        };
        out.push(pending.record);
        out.push(marker);
    }
}

fn is_continuation(content: &str) -> bool {
    content.starts_with(' ') || content.starts_with('\t')
}

/// 파서 단계: 라인 채널을 레코드 채널로 변환합니다.
///
/// 종료 경계를 넘으면 `cancel`을 취소하고 나머지 입력은 버립니다.
/// `cancel`이 외부에서 취소되면 조립 중인 레코드 없이 바로 반환합니다.
pub async fn run_parser(
    mut assembler: RecordAssembler,
    mut lines: mpsc::Receiver<RawLine>,
    records: mpsc::Sender<Record>,
    cancel: CancellationToken,
) -> Result<(), CollectError> {
    let mut out = Vec::new();
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            break;
        };

        let flow = assembler.push(line, &mut out);
        for record in out.drain(..) {
            send(&records, record).await?;
        }
        if flow == Flow::Ended {
            cancel.cancel();
            return Ok(());
        }
    }

    if let Some(record) = assembler.finish() {
        send(&records, record).await?;
    }
    Ok(())
}

async fn send(records: &mpsc::Sender<Record>, record: Record) -> Result<(), CollectError> {
    records
        .send(record)
        .await
        .map_err(|_| CollectError::SinkClosed("parser output channel closed".to_owned()))
}
