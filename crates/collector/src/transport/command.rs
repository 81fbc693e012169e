//! 셸 명령 빌더
//!
//! file / ssh 트랜스포트가 실행하는 셸 파이프라인을 생성합니다.
//! 모든 경로와 패턴은 작은따옴표로 인용됩니다.
//!
//! ```text
//! fetch:  find DIR/ -type f -name 'BASE' [-newermt 'START'] | xargs -r ls -tr | xargs -r zcat -f [| grep -aF 'PREFIX']
//! tail:   find DIR/ -type f -name 'BASE' | xargs -r ls -tr | tail -1 | xargs -r tail -F
//! list:   find DIR/ -type f -name 'BASE' [-newermt 'START'] | xargs -r ls -tr
//! sample: find DIR/ -type f -name 'BASE' | xargs -r ls -tr | tail -2 | xargs -r zcat -f | tail -n N | head -n 1
//! copy:   cat 'FILE'
//! ```

use std::fmt::Write as _;

use chrono::{DateTime, Duration, FixedOffset, Utc};

use gleaner_core::types::{Target, Window};

/// 에포크 초 단위 타임스탬프를 나타내는 특수 형식
pub const UNIXTIME: &str = "unixtime";

/// 원격 명령의 실행 환경
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// GNU 도구 (`zcat`)
    Gnu,
    /// macOS (`gzcat`)
    Darwin,
}

impl Dialect {
    /// 로컬 실행 환경
    pub fn local() -> Self {
        if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Gnu
        }
    }

    fn zcat(self) -> &'static str {
        match self {
            Self::Gnu => "zcat",
            Self::Darwin => "gzcat",
        }
    }
}

/// 셸 인용 (작은따옴표)
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// 두 문자열의 공통 접두사
pub fn common_prefix(a: &str, b: &str) -> String {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect()
}

/// 창 전체에서 렌더링한 시각들의 공통 접두사를 구할 때 쓰는 보폭 (초, 나노초)
///
/// 각 보폭은 해당 자릿수 필드가 창 안에서 가질 수 있는 값을 모두 드러냅니다.
const PREFIX_STEPS: [(i64, i64); 8] = [
    (0, 1),
    (0, 1_000),
    (0, 1_000_000),
    (1, 0),
    (60, 0),
    (3_600, 0),
    (86_400, 0),
    (365 * 86_400, 0),
];

/// 보폭 하나당 렌더링 횟수 상한
const MAX_PREFIX_SAMPLES: i64 = 1_000;

/// 시간 창 안의 모든 시각을 대상 형식으로 렌더링했을 때의 공통 접두사
///
/// 시작/종료 시각만 비교하면 `%d/%b/%Y`처럼 큰 단위가 뒤에 오는 형식이나
/// 연도가 없는 형식에서 창 안의 줄이 걸러집니다. 그래서 보폭별로 창을 훑어
/// 변하는 자릿수를 모두 찾습니다.
///
/// 다음 경우에는 사전 필터를 만들지 않습니다:
/// 멀티라인 대상, `unixtime` 형식, 형식 없음, 시작 또는 종료 경계 없음.
pub fn grep_prefix(
    time_format: Option<&str>,
    zone: FixedOffset,
    window: &Window,
    multi_line: bool,
) -> Option<String> {
    if multi_line {
        return None;
    }
    let format = time_format.filter(|f| *f != UNIXTIME)?;
    let (start, end) = (window.start?, window.end?);

    let render = |t: DateTime<Utc>| -> Option<String> {
        let mut out = String::new();
        write!(out, "{}", t.with_timezone(&zone).format(format)).ok()?;
        Some(out)
    };

    let mut prefix = common_prefix(&render(start)?, &render(end)?);
    for (secs, nanos) in PREFIX_STEPS {
        let step = Duration::seconds(secs) + Duration::nanoseconds(nanos);
        let mut t = start;
        for _ in 0..MAX_PREFIX_SAMPLES {
            if prefix.is_empty() {
                return None;
            }
            t += step;
            if t >= end {
                break;
            }
            prefix = common_prefix(&prefix, &render(t)?);
        }
    }
    (!prefix.is_empty()).then_some(prefix)
}

/// 대상 경로에 대한 셸 파이프라인 빌더
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    dir: String,
    base: String,
    sudo: bool,
    dialect: Dialect,
}

impl CommandBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new(target: &Target, sudo: bool, dialect: Dialect) -> Self {
        Self {
            dir: target.dir().to_owned(),
            base: target.base().to_owned(),
            sudo,
            dialect,
        }
    }

    fn sudo(&self) -> &'static str {
        if self.sudo { "sudo " } else { "" }
    }

    fn find(&self, newer_than: Option<DateTime<Utc>>) -> String {
        let dir = format!("{}/", self.dir.trim_end_matches('/'));
        let mut cmd = format!(
            "{}find {} -type f -name {}",
            self.sudo(),
            shell_quote(&dir),
            shell_quote(&self.base)
        );
        if let Some(start) = newer_than {
            let start = start.format("%Y-%m-%d %H:%M:%S +0000").to_string();
            cmd.push_str(&format!(" -newermt {}", shell_quote(&start)));
        }
        cmd
    }

    fn sorted(&self, newer_than: Option<DateTime<Utc>>) -> String {
        format!("{} | xargs -r {}ls -tr", self.find(newer_than), self.sudo())
    }

    fn decompress(&self) -> String {
        format!("xargs -r {}{} -f", self.sudo(), self.dialect.zcat())
    }

    /// 시간 창 범위의 파일 내용을 오래된 파일부터 출력하는 명령
    pub fn fetch(&self, window: &Window, grep_prefix: Option<&str>) -> String {
        let mut cmd = format!("{} | {}", self.sorted(window.start), self.decompress());
        if let Some(prefix) = grep_prefix {
            cmd.push_str(&format!(" | grep -aF {}", shell_quote(prefix)));
        }
        cmd
    }

    /// 가장 최근 파일을 따라가는 명령
    pub fn tail(&self) -> String {
        format!(
            "{} | tail -1 | xargs -r {}tail -F",
            self.sorted(None),
            self.sudo()
        )
    }

    /// 시간 창 이후 수정된 파일 목록 명령
    pub fn list(&self, window: &Window) -> String {
        self.sorted(window.start)
    }

    /// 최근 파일 끝에서 `depth`번째 줄 하나를 출력하는 명령
    ///
    /// 최신 파일이 비어 있을 수 있으므로 최근 두 파일을 대상으로 합니다.
    pub fn sample(&self, depth: usize) -> String {
        format!(
            "{} | tail -2 | {} | tail -n {} | head -n 1",
            self.sorted(None),
            self.decompress(),
            depth.max(1)
        )
    }

    /// 파일 하나를 그대로 출력하는 명령
    pub fn copy(&self, file_path: &str) -> String {
        format!("{}cat {}", self.sudo(), shell_quote(file_path))
    }
}
