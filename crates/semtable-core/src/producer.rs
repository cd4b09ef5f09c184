//! Producer loop

use crate::bounded::BoundedTable;
use crate::cancel::CancellationToken;
use crate::config::LoopConfig;
use crate::table::Item;
use crate::{Error, Result};

/// First item a producer writes
pub const FIRST_ITEM: Item = 1;

/// How a loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Items moved through the table by this loop
    pub items: u64,
    /// Whether the loop stopped because of the token rather than the limit
    pub cancelled: bool,
}

/// Writes an increasing sequence of items into the table.
///
/// Each iteration waits for a free slot on `empty`, pushes under `mutex`
/// and signals `full`.
pub struct Producer<'a> {
    table: &'a BoundedTable,
    config: LoopConfig,
    /// `None` once `Item::MAX` has been written
    next_item: Option<Item>,
}

impl<'a> Producer<'a> {
    pub fn new(table: &'a BoundedTable, config: LoopConfig) -> Self {
        Self {
            table,
            config,
            next_item: Some(FIRST_ITEM),
        }
    }

    /// Continue a sequence from `item` instead of [`FIRST_ITEM`]
    pub fn starting_at(mut self, item: Item) -> Self {
        self.next_item = Some(item);
        self
    }

    /// Item the next successful iteration will write, `None` when exhausted
    pub fn next_item(&self) -> Option<Item> {
        self.next_item
    }

    /// Run one iteration without pacing and return the item written.
    ///
    /// The counter only advances when the item reached the table. Fails with
    /// [`Error::SequenceExhausted`] once `Item::MAX` has been written.
    pub fn produce_one(&mut self, cancel: &CancellationToken) -> Result<Item> {
        let item = self.next_item.ok_or(Error::SequenceExhausted)?;
        log::debug!("waiting for a free slot");
        self.table
            .produce(item, cancel, self.config.poll_interval)?;
        self.next_item = item.checked_add(1);
        log::debug!("produced item {}", item);
        Ok(item)
    }

    /// Produce until the configured limit is reached or `cancel` fires.
    ///
    /// `on_item` sees every item after it was signalled to the consumer.
    pub fn run<F>(&mut self, cancel: &CancellationToken, mut on_item: F) -> Result<RunSummary>
    where
        F: FnMut(Item),
    {
        let mut items = 0;
        while self.config.limit.map_or(true, |limit| items < limit) {
            match self.produce_one(cancel) {
                Ok(item) => on_item(item),
                Err(Error::Cancelled) => break,
                Err(Error::SequenceExhausted) => {
                    log::warn!("no items left after {}, stopping", Item::MAX);
                    break;
                }
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
        log::info!("producer stopped after {} items", summary.items);
        Ok(summary)
    }
}
