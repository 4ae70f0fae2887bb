use std::sync::Arc;

use shared::{
    domain::{BlockId, RecurrenceScope},
    protocol::{BlockInput, BlockQuery, TechnicianBlock},
};
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    error::{ClientError, ClientResult},
    latest::RequestGuard,
    notify::{reject, report, report_failure, Notifier},
    optimistic::OptimisticCollection,
    transport::SalonApi,
};

pub struct BlocksView {
    api: SalonApi,
    notifier: Arc<dyn Notifier>,
    guard: RequestGuard,
    blocks: Mutex<OptimisticCollection<TechnicianBlock>>,
}

impl BlocksView {
    pub fn new(api: SalonApi, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            notifier,
            guard: RequestGuard::new(),
            blocks: Mutex::new(OptimisticCollection::default()),
        }
    }

    pub async fn blocks(&self) -> Vec<TechnicianBlock> {
        self.blocks.lock().await.items().to_vec()
    }

    /// Load blocks for a technician and range. `Ok(None)` when superseded.
    pub async fn load(&self, query: &BlockQuery) -> ClientResult<Option<Vec<TechnicianBlock>>> {
        let Some(result) = self.guard.run(self.api.list_blocks(query)).await else {
            return Ok(None);
        };
        let blocks = report_failure(&*self.notifier, result, "Failed to load blocks")?;
        self.blocks.lock().await.replace_all(blocks.clone());
        Ok(Some(blocks))
    }

    pub async fn create(&self, mut input: BlockInput) -> ClientResult<TechnicianBlock> {
        if let Err(err) = input.validate() {
            return reject(&*self.notifier, err);
        }
        let result = self.api.create_block(&input).await;
        if let Ok(block) = &result {
            info!(
                "blocks: created block_id={} technician_id={} recurring={}",
                block.id,
                block.technician_id,
                block.recurrence_rule.is_some()
            );
            self.blocks.lock().await.upsert(block.clone());
        }
        report(
            &*self.notifier,
            result,
            |block| format!("Blocked time for {}", block.title),
            "Failed to create block",
        )
    }

    /// `this` removes only this occurrence locally; wider scopes also drop
    /// the loaded occurrences of the same series. What remains of the series
    /// comes from the next load.
    pub async fn delete(&self, id: &BlockId, scope: RecurrenceScope) -> ClientResult<()> {
        let Some(current) = self.blocks.lock().await.get(id).cloned() else {
            return reject(&*self.notifier, ClientError::rejected("Block is not loaded"));
        };
        let result = self.api.delete_block(id, scope).await;
        if result.is_ok() {
            let mut blocks = self.blocks.lock().await;
            blocks.retain(|block| {
                if &block.id == id {
                    return false;
                }
                let same_series =
                    current.series_id.is_some() && block.series_id == current.series_id;
                match scope {
                    RecurrenceScope::This => true,
                    RecurrenceScope::ThisAndFuture => {
                        !(same_series && block.start_time > current.start_time)
                    }
                    RecurrenceScope::All => !same_series,
                }
            });
        }
        report(
            &*self.notifier,
            result,
            |_| "Block removed".to_string(),
            "Failed to delete block",
        )
    }
}
