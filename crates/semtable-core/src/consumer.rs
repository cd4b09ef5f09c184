//! Consumer loop

use crate::bounded::BoundedTable;
use crate::cancel::CancellationToken;
use crate::config::LoopConfig;
use crate::producer::RunSummary;
use crate::table::Item;
use crate::{Error, Result};

/// Removes items from the table, newest first.
pub struct Consumer<'a> {
    table: &'a BoundedTable,
    config: LoopConfig,
}

impl<'a> Consumer<'a> {
    pub fn new(table: &'a BoundedTable, config: LoopConfig) -> Self {
        Self { table, config }
    }

    /// Run one iteration without pacing and return the item taken
    pub fn consume_one(&mut self, cancel: &CancellationToken) -> Result<Item> {
        log::debug!("waiting for an item");
        let item = self.table.consume(cancel, self.config.poll_interval)?;
        log::debug!("consumed item {}", item);
        Ok(item)
    }

    /// Consume until the configured limit is reached or `cancel` fires
    pub fn run<F>(&mut self, cancel: &CancellationToken, mut on_item: F) -> Result<RunSummary>
    where
        F: FnMut(Item),
    {
        let mut items = 0;
        while self.config.limit.map_or(true, |limit| items < limit) {
            match self.consume_one(cancel) {
                Ok(item) => on_item(item),
                Err(Error::Cancelled) => break,
                Err(e) => return Err(e),
            }
            items += 1;
            if self.config.limit == Some(items) {
                break;
            }
            if !cancel.sleep(self.config.pace, self.config.poll_interval) {
                break;
            }
        }
        let summary = RunSummary {
            items,
            cancelled: cancel.is_cancelled(),
        };
        log::info!("consumer stopped after {} items", summary.items);
        Ok(summary)
    }
}
