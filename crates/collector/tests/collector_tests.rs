//! 수집기 / 오케스트레이터 통합 테스트
//!
//! 세션 열림/닫힘을 기록하는 가짜 트랜스포트로 취소, 동시성 제한, 격리를 검증합니다.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{Datelike, FixedOffset, NaiveDate, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use gleaner_collector::{
    CollectError, Collector, Operation, OrchestratorBuilder, SessionConfig, Transport,
    TransportFactory,
};
use gleaner_core::types::{LOCALHOST, RawLine, Record, RecordType, Scheme, Target, Window};

// --- 가짜 트랜스포트 ---

#[derive(Default)]
struct Tracker {
    active: AtomicUsize,
    max_active: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    listing_done: AtomicBool,
    copy_saw_partial_list: AtomicBool,
}

struct Session<'a>(&'a Tracker);

impl Tracker {
    fn open(&self) -> Session<'_> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        Session(self)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
        self.0.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
struct FakeTransport {
    lines: Vec<RawLine>,
    files: Vec<String>,
    delay: Duration,
    follow: bool,
    tracker: Arc<Tracker>,
}

impl FakeTransport {
    fn new(lines: Vec<RawLine>, tracker: Arc<Tracker>) -> Self {
        Self {
            lines,
            files: Vec::new(),
            delay: Duration::ZERO,
            follow: false,
            tracker,
        }
    }

    async fn session(
        &self,
        lines: Vec<RawLine>,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        let _session = self.tracker.open();
        for line in lines {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                sent = tx.send(line) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }
        if self.follow {
            cancel.cancelled().await;
        }
        Ok(())
    }
}

impl Transport for FakeTransport {
    fn scheme(&self) -> Scheme {
        Scheme::File
    }

    async fn read(
        &self,
        _window: Window,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        self.session(self.lines.clone(), cancel, tx).await
    }

    async fn tail(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        self.session(self.lines.clone(), cancel, tx).await
    }

    async fn sample(
        &self,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        self.session(self.lines.iter().take(1).cloned().collect(), cancel, tx)
            .await
    }

    async fn list(
        &self,
        _window: Window,
        cancel: CancellationToken,
        tx: mpsc::Sender<RawLine>,
    ) -> Result<(), CollectError> {
        let lines = self
            .files
            .iter()
            .map(|f| RawLine::new(LOCALHOST, "/var/log/*.log", f.clone()))
            .collect();
        let result = self.session(lines, cancel, tx).await;
        self.tracker.listing_done.store(true, Ordering::SeqCst);
        result
    }

    async fn copy(
        &self,
        file_path: String,
        dst_dir: PathBuf,
        _cancel: CancellationToken,
    ) -> Result<PathBuf, CollectError> {
        if !self.tracker.listing_done.load(Ordering::SeqCst) {
            self.tracker.copy_saw_partial_list.store(true, Ordering::SeqCst);
        }
        if file_path.ends_with("broken.log") {
            return Err(CollectError::CommandFailed {
                command: format!("cat {file_path}"),
                status: "exit status: 1".to_owned(),
                stderr: "Permission denied".to_owned(),
            });
        }
        Ok(dst_dir.join(file_path.trim_start_matches('/')))
    }
}

struct FakeFactory {
    tracker: Arc<Tracker>,
    failing: HashSet<u64>,
    panicking: HashSet<u64>,
    lines_per_target: usize,
    delay: Duration,
    follow: bool,
}

impl FakeFactory {
    fn new(tracker: Arc<Tracker>) -> Self {
        Self {
            tracker,
            failing: HashSet::new(),
            panicking: HashSet::new(),
            lines_per_target: 3,
            delay: Duration::ZERO,
            follow: false,
        }
    }
}

impl TransportFactory for FakeFactory {
    type Transport = FakeTransport;

    fn create(&self, target: &Target, _config: &SessionConfig) -> Result<FakeTransport, CollectError> {
        if self.panicking.contains(&target.id) {
            panic!("transport for target {} blew up", target.id);
        }
        if self.failing.contains(&target.id) {
            return Err(CollectError::Spawn {
                command: "ssh".to_owned(),
                reason: "connection refused".to_owned(),
            });
        }
        let lines = (0..self.lines_per_target)
            .map(|i| RawLine::new(LOCALHOST, &target.path, format!("target {} line {i}", target.id)))
            .collect();
        let mut transport = FakeTransport::new(lines, Arc::clone(&self.tracker));
        transport.delay = self.delay;
        transport.follow = self.follow;
        Ok(transport)
    }
}

// --- 헬퍼 ---

fn target(id: u64, record_type: RecordType) -> Target {
    Target {
        id,
        source: format!("file:///var/log/app{id}.log"),
        description: String::new(),
        scheme: Scheme::File,
        host: LOCALHOST.to_owned(),
        user: None,
        port: None,
        path: format!("/var/log/app{id}.log"),
        record_type,
        regexp: Some(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) ".to_owned()),
        time_format: Some("%Y-%m-%d %H:%M:%S".to_owned()),
        time_zone: None,
        multi_line: false,
        tags: Vec::new(),
    }
}

fn line(content: &str) -> RawLine {
    RawLine::new(LOCALHOST, "/var/log/app.log", content).with_zone(FixedOffset::east_opt(0))
}

fn config() -> SessionConfig {
    SessionConfig {
        channel_capacity: 1,
        ..SessionConfig::default()
    }
}

async fn collect(mut rx: mpsc::Receiver<Record>) -> Vec<Record> {
    let mut records = Vec::new();
    while let Some(record) = rx.recv().await {
        records.push(record);
    }
    records
}

// --- 수집기 ---

#[tokio::test]
async fn syslog_line_parses_in_transport_zone() {
    let tracker = Arc::new(Tracker::default());
    let kst = FixedOffset::east_opt(9 * 3600).unwrap();
    let transport = FakeTransport::new(
        vec![RawLine::new("web-1", "/var/log/syslog", "Mar 05 23:59:59 host app: started").with_zone(Some(kst))],
        Arc::clone(&tracker),
    );
    let collector = Collector::new(
        &target(0, RecordType::Syslog),
        transport,
        &config(),
        CancellationToken::new(),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel(8);
    collector.fetch(&tx, Window::unbounded()).await.unwrap();
    drop(tx);
    let records = collect(rx).await;

    let year = Utc::now().with_timezone(&kst).year();
    let expected = kst
        .from_local_datetime(
            &NaiveDate::from_ymd_opt(year, 3, 5)
                .unwrap()
                .and_hms_opt(23, 59, 59)
                .unwrap(),
        )
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].timestamp, Some(expected.with_timezone(&Utc)));
    assert!(!records[0].filled_by_previous_timestamp);
    assert_eq!(records[0].host, "web-1");
}

#[tokio::test]
async fn multi_line_records_are_reassembled() {
    let tracker = Arc::new(Tracker::default());
    let transport = FakeTransport::new(
        vec![
            line("2020-01-01 10:00:00 A"),
            line("  continuation"),
            line("2020-01-01 10:00:01 B"),
        ],
        tracker,
    );
    let mut t = target(1, RecordType::Regexp);
    t.multi_line = true;
    let collector = Collector::new(&t, transport, &config(), CancellationToken::new()).unwrap();

    let (tx, rx) = mpsc::channel(8);
    collector.fetch(&tx, Window::unbounded()).await.unwrap();
    drop(tx);
    let records = collect(rx).await;

    let contents: Vec<_> = records.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, ["2020-01-01 10:00:00 A\n  continuation", "2020-01-01 10:00:01 B"]);
    assert!(records.iter().all(|r| r.target_id == 1));
}

#[tokio::test]
async fn window_end_stops_the_session_cleanly() {
    let tracker = Arc::new(Tracker::default());
    let lines = (0..10)
        .map(|s| line(&format!("2020-01-01 10:00:0{s} line {s}")))
        .collect();
    let mut transport = FakeTransport::new(lines, Arc::clone(&tracker));
    transport.follow = true;
    let collector = Collector::new(
        &target(2, RecordType::Regexp),
        transport,
        &config(),
        CancellationToken::new(),
    )
    .unwrap();

    let start = Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 1).unwrap();
    let end = Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 3).unwrap();
    let (tx, rx) = mpsc::channel(16);
    let fetched = tokio::time::timeout(
        Duration::from_secs(5),
        collector.fetch(&tx, Window::new(Some(start), Some(end))),
    )
    .await
    .expect("fetch should stop at the window end");
    fetched.unwrap();
    drop(tx);

    let contents: Vec<_> = collect(rx).await.into_iter().map(|r| r.content).collect();
    assert_eq!(
        contents,
        ["2020-01-01 10:00:02 line 2", "2020-01-01 10:00:03 line 3"]
    );
    assert_eq!(tracker.active.load(Ordering::SeqCst), 0);
    assert_eq!(tracker.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelling_a_stream_closes_the_session() {
    let tracker = Arc::new(Tracker::default());
    let mut transport = FakeTransport::new(vec![line("2020-01-01 10:00:00 hello")], Arc::clone(&tracker));
    transport.follow = true;
    let cancel = CancellationToken::new();
    let collector =
        Collector::new(&target(3, RecordType::Regexp), transport, &config(), cancel.clone()).unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    let canceller = async {
        let first = rx.recv().await;
        assert_eq!(tracker.active.load(Ordering::SeqCst), 1);
        cancel.cancel();
        first
    };
    let (streamed, first) = tokio::time::timeout(
        Duration::from_secs(5),
        async { tokio::join!(collector.stream(&tx), canceller) },
    )
    .await
    .expect("stream should stop after cancellation");

    streamed.unwrap();
    assert_eq!(first.unwrap().content, "2020-01-01 10:00:00 hello");
    assert_eq!(tracker.active.load(Ordering::SeqCst), 0);
    assert_eq!(
        tracker.opened.load(Ordering::SeqCst),
        tracker.closed.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn closed_sink_is_fatal() {
    let tracker = Arc::new(Tracker::default());
    let mut transport = FakeTransport::new(vec![line("2020-01-01 10:00:00 a")], Arc::clone(&tracker));
    transport.follow = true;
    let collector = Collector::new(
        &target(4, RecordType::Regexp),
        transport,
        &config(),
        CancellationToken::new(),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let err = collector.fetch(&tx, Window::unbounded()).await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(tracker.active.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn list_files_emits_one_record_per_path() {
    let tracker = Arc::new(Tracker::default());
    let mut transport = FakeTransport::new(Vec::new(), tracker);
    transport.files = vec!["/var/log/app.log.1".to_owned(), "/var/log/app.log".to_owned()];
    let collector = Collector::new(
        &target(5, RecordType::None),
        transport,
        &config(),
        CancellationToken::new(),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel(8);
    collector.list_files(&tx, Window::unbounded()).await.unwrap();
    drop(tx);
    let records = collect(rx).await;

    let paths: Vec<_> = records.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(paths, ["/var/log/app.log.1", "/var/log/app.log"]);
    assert!(records.iter().all(|r| r.timestamp.is_none() && r.path == r.content));
}

#[tokio::test]
async fn copy_waits_for_the_full_list_and_skips_failures() {
    let tracker = Arc::new(Tracker::default());
    let mut transport = FakeTransport::new(Vec::new(), Arc::clone(&tracker));
    transport.files = vec![
        "/var/log/app.log.1".to_owned(),
        "/var/log/broken.log".to_owned(),
        "/var/log/app.log".to_owned(),
    ];
    let collector = Collector::new(
        &target(6, RecordType::None),
        transport,
        &config(),
        CancellationToken::new(),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel(8);
    collector
        .run(
            &tx,
            &Operation::Copy {
                window: Window::unbounded(),
                dst_dir: PathBuf::from("/backup"),
            },
        )
        .await
        .unwrap();
    drop(tx);
    let records = collect(rx).await;

    let copied: Vec<_> = records.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(copied, ["/backup/var/log/app.log.1", "/backup/var/log/app.log"]);
    assert!(!tracker.copy_saw_partial_list.load(Ordering::SeqCst));
}

#[tokio::test]
async fn sample_parses_a_single_line() {
    let tracker = Arc::new(Tracker::default());
    let transport = FakeTransport::new(
        vec![line("2020-01-01 10:00:00 first"), line("2020-01-01 10:00:01 second")],
        tracker,
    );
    let collector = Collector::new(
        &target(7, RecordType::Regexp),
        transport,
        &config(),
        CancellationToken::new(),
    )
    .unwrap();

    let (tx, rx) = mpsc::channel(8);
    collector.sample(&tx).await.unwrap();
    drop(tx);
    let records = collect(rx).await;
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].timestamp,
        Some(Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 0).unwrap())
    );
}

// --- 오케스트레이터 ---

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_limit_bounds_active_sessions() {
    let tracker = Arc::new(Tracker::default());
    let mut factory = FakeFactory::new(Arc::clone(&tracker));
    factory.delay = Duration::from_millis(10);
    let orchestrator = OrchestratorBuilder::new()
        .config(SessionConfig {
            concurrency: 2,
            ..config()
        })
        .factory(factory)
        .build()
        .unwrap();

    let targets: Vec<_> = (0..6).map(|id| target(id, RecordType::None)).collect();
    let (tx, rx) = mpsc::channel(4);
    let consumer = tokio::spawn(collect(rx));
    let summary = orchestrator
        .run(&targets, Operation::Fetch(Window::unbounded()), tx)
        .await
        .unwrap();
    let records = consumer.await.unwrap();

    assert_eq!(summary.succeeded, 6);
    assert!(summary.is_success());
    assert_eq!(records.len(), 18);
    assert!(tracker.max_active.load(Ordering::SeqCst) <= 2);
    assert_eq!(tracker.opened.load(Ordering::SeqCst), 6);
    assert_eq!(tracker.active.load(Ordering::SeqCst), 0);

    // 대상 내부 순서는 유지됩니다.
    for id in 0..6u64 {
        let own: Vec<_> = records
            .iter()
            .filter(|r| r.target_id == id)
            .map(|r| r.content.clone())
            .collect();
        let expected: Vec<_> = (0..3).map(|i| format!("target {id} line {i}")).collect();
        assert_eq!(own, expected);
    }
}

#[tokio::test]
async fn one_failing_target_does_not_stop_siblings() {
    let tracker = Arc::new(Tracker::default());
    let mut factory = FakeFactory::new(Arc::clone(&tracker));
    factory.failing.insert(2);
    let orchestrator = OrchestratorBuilder::new()
        .config(config())
        .factory(factory)
        .build()
        .unwrap();

    let targets: Vec<_> = (0..4).map(|id| target(id, RecordType::None)).collect();
    let (tx, rx) = mpsc::channel(4);
    let consumer = tokio::spawn(collect(rx));
    let summary = orchestrator
        .run(&targets, Operation::Fetch(Window::unbounded()), tx)
        .await
        .unwrap();
    let records = consumer.await.unwrap();

    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].target_id, 2);
    assert!(summary.failed[0].error.contains("connection refused"));
    assert_eq!(records.len(), 9);
}

#[tokio::test]
async fn panicked_worker_is_reported_against_its_target() {
    let tracker = Arc::new(Tracker::default());
    let mut factory = FakeFactory::new(Arc::clone(&tracker));
    factory.panicking.insert(1);
    let orchestrator = OrchestratorBuilder::new()
        .config(config())
        .factory(factory)
        .build()
        .unwrap();

    let targets: Vec<_> = (0..3).map(|id| target(id, RecordType::None)).collect();
    let (tx, rx) = mpsc::channel(4);
    let consumer = tokio::spawn(collect(rx));
    let summary = orchestrator
        .run(&targets, Operation::Fetch(Window::unbounded()), tx)
        .await
        .unwrap();
    let records = consumer.await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].target_id, 1);
    assert_eq!(summary.failed[0].source, "file:///var/log/app1.log");
    assert!(summary.failed[0].error.contains("panic"));
    assert_eq!(records.len(), 6);
}

#[tokio::test]
async fn closed_shared_sink_aborts_the_run() {
    let tracker = Arc::new(Tracker::default());
    let mut factory = FakeFactory::new(Arc::clone(&tracker));
    factory.follow = true;
    let orchestrator = OrchestratorBuilder::new()
        .config(SessionConfig {
            concurrency: 1,
            ..config()
        })
        .factory(factory)
        .build()
        .unwrap();

    let targets: Vec<_> = (0..3).map(|id| target(id, RecordType::None)).collect();
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.run(&targets, Operation::Stream, tx),
    )
    .await
    .expect("run should stop when the sink closes")
    .unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(tracker.active.load(Ordering::SeqCst), 0);
    assert_eq!(tracker.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn external_cancellation_stops_all_streams() {
    let tracker = Arc::new(Tracker::default());
    let mut factory = FakeFactory::new(Arc::clone(&tracker));
    factory.follow = true;
    let cancel = CancellationToken::new();
    let orchestrator = OrchestratorBuilder::new()
        .config(SessionConfig {
            concurrency: 2,
            ..config()
        })
        .cancel_token(cancel.clone())
        .factory(factory)
        .build()
        .unwrap();

    let targets: Vec<_> = (0..4).map(|id| target(id, RecordType::None)).collect();
    let (tx, mut rx) = mpsc::channel(1);
    let consumer = async {
        let mut seen = 0;
        while rx.recv().await.is_some() {
            seen += 1;
            if seen == 3 {
                cancel.cancel();
            }
        }
        seen
    };
    let (summary, seen) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(orchestrator.run(&targets, Operation::Stream, tx), consumer)
    })
    .await
    .expect("run should stop after cancellation");

    let summary = summary.unwrap();
    assert!(seen >= 3);
    assert!(summary.skipped > 0);
    assert_eq!(tracker.active.load(Ordering::SeqCst), 0);
    assert_eq!(
        tracker.opened.load(Ordering::SeqCst),
        tracker.closed.load(Ordering::SeqCst)
    );
}
