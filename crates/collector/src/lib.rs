#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`transport`]: 로그 소스 접근 (로컬 셸, ssh, kubectl)
//! - [`parser`]: 라인 파서와 세션 단위 레코드 조립기
//! - [`collector`]: 트랜스포트와 파서를 묶은 대상 하나의 수집기
//! - [`orchestrator`]: 여러 대상을 제한된 동시성으로 실행
//! - [`config`]: 세션 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Orchestrator -> Collector (per target) -> Transport -> Parser -> Drain -> shared Sender<Record>
//!      |                                       |
//!  Semaphore(C)                         sh / ssh / kubectl
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod transport;

// --- 주요 타입 re-export ---

// 수집기
pub use collector::{Collector, Operation};

// 오케스트레이터
pub use orchestrator::{
    DefaultTransportFactory, Orchestrator, OrchestratorBuilder, RunSummary, TargetFailure,
    TransportFactory,
};

// 설정
pub use config::{SessionConfig, SessionConfigBuilder};

// 에러
pub use error::CollectError;

// 파서
pub use parser::{LineParser, NoneParser, RecordAssembler, RegexpParser, WindowGate};

// 트랜스포트
pub use transport::{TargetTransport, Transport};
