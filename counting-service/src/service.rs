//! 计数服务模块

use std::sync::Arc;

use common::errors::AppResult;
use common::models::CountResult;

use crate::store::CountStore;

/// Reports the current row count of the backing store.
pub struct CountingService {
    store: Arc<CountStore>,
    producer: String,
}

impl CountingService {
    /// 创建新的计数服务实例
    pub fn new(store: Arc<CountStore>, producer: impl Into<String>) -> Self {
        Self {
            store,
            producer: producer.into(),
        }
    }

    /// 查询当前计数
    pub async fn get_count(&self) -> AppResult<CountResult> {
        let valor_atual = self.store.count_rows().await?;
        tracing::debug!(valor_atual, dialect = %self.store.dialect(), "count retrieved");
        Ok(CountResult::new(valor_atual).with_producer(self.producer.clone()))
    }
}
