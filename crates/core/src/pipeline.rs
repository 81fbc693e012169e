//! 파이프라인 trait — 레코드 수신 지점 정의

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::PipelineError;
use crate::types::Record;

/// 조립된 레코드를 받는 싱크
///
/// 수집기는 레코드를 하나씩 `accept`로 전달합니다.
/// 에러를 반환하면 수집이 중단되어야 합니다 (싱크가 닫힘).
pub trait RecordSink: Send + Sync {
    /// 레코드 하나를 전달합니다.
    fn accept(&self, record: Record) -> impl Future<Output = Result<(), PipelineError>> + Send;
}

impl RecordSink for mpsc::Sender<Record> {
    async fn accept(&self, record: Record) -> Result<(), PipelineError> {
        self.send(record)
            .await
            .map_err(|e| PipelineError::ChannelSend(e.to_string()))
    }
}
