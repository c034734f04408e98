//! Order-Book Level Tracking
//!
//! Some venues publish L2 deltas keyed by opaque level ids whose update
//! rows omit the price. `OrderBookTracker` keeps an id-to-price map per
//! raw pair so those rows can be resolved into price levels.
//!
//! State machine per book: unsynced until a `Partial` snapshot arrives;
//! deltas before that are rejected with `NotSynced`. A delete for an
//! unknown id means the local map diverged from the venue; the book is
//! reset to unsynced and the error surfaced so the caller can report it
//! and wait for the next snapshot.

use std::collections::HashMap;

// =============================================================================
// Types
// =============================================================================

/// Kind of an L2 mutation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookAction {
    /// Full snapshot replacing all prior state.
    Partial,
    /// New level.
    Insert,
    /// Size change on an existing level.
    Update,
    /// Level removal.
    Delete,
}

/// One raw level mutation as decoded off the wire.
#[derive(Debug, Clone)]
pub struct LevelUpdate {
    /// Venue-assigned level id.
    pub id: u64,
    /// `true` = sell/ask, `false` = buy/bid.
    pub side: bool,
    /// Contract size at the level. Zero for deletes.
    pub size: f64,
    /// Price, present on snapshots and inserts, absent on most updates.
    pub price: Option<f64>,
}

/// A mutation resolved against tracked state.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedLevel {
    /// `true` = sell/ask, `false` = buy/bid.
    pub side: bool,
    /// Resolved price.
    pub price: f64,
    /// Size after the mutation. Zero means the level is gone.
    pub size: f64,
}

/// Errors from applying L2 mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookError {
    /// A delta arrived before any snapshot for the pair.
    #[error("order book for {raw_pair} has no snapshot yet")]
    NotSynced {
        /// Venue-native symbol.
        raw_pair: String,
    },

    /// A delete referenced an id the tracker never saw. Local state has
    /// diverged; the book is reset and must wait for a new snapshot.
    #[error("order book for {raw_pair} references unknown level id {id}")]
    UnknownId {
        /// Venue-native symbol.
        raw_pair: String,
        /// The offending level id.
        id: u64,
    },
}

#[derive(Debug, Default)]
struct BookState {
    id_price: HashMap<u64, f64>,
    synced: bool,
}

// =============================================================================
// Tracker
// =============================================================================

/// Per-pair id-to-price state for venues with id-keyed L2 feeds.
///
/// One tracker lives per connection and is rebuilt from scratch on
/// reconnect; ids are only meaningful within a single session.
#[derive(Debug, Default)]
pub struct OrderBookTracker {
    books: HashMap<String, BookState>,
}

impl OrderBookTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one mutation batch for `raw_pair` and resolve its levels.
    ///
    /// Deletes resolve to the remembered price with size zero. Updates
    /// whose id is unknown and that carry no price are silently dropped
    /// from the result; their state cannot be reconstructed.
    ///
    /// # Errors
    ///
    /// `NotSynced` when a delta precedes any snapshot; `UnknownId` when
    /// a delete references an untracked id (the book is reset first).
    pub fn apply(
        &mut self,
        raw_pair: &str,
        action: BookAction,
        updates: &[LevelUpdate],
    ) -> Result<Vec<AppliedLevel>, BookError> {
        let book = self.books.entry(raw_pair.to_string()).or_default();

        if action == BookAction::Partial {
            book.id_price.clear();
            book.synced = true;
        } else if !book.synced {
            return Err(BookError::NotSynced {
                raw_pair: raw_pair.to_string(),
            });
        }

        let mut applied = Vec::with_capacity(updates.len());
        for update in updates {
            match action {
                BookAction::Partial | BookAction::Insert => {
                    let Some(price) = update.price else { continue };
                    book.id_price.insert(update.id, price);
                    applied.push(AppliedLevel {
                        side: update.side,
                        price,
                        size: update.size,
                    });
                }
                BookAction::Update => {
                    let price = match update.price {
                        Some(price) => {
                            book.id_price.insert(update.id, price);
                            price
                        }
                        None => match book.id_price.get(&update.id) {
                            Some(price) => *price,
                            // Unknown id without a price: unrecoverable
                            // for this row alone, drop it.
                            None => continue,
                        },
                    };
                    applied.push(AppliedLevel {
                        side: update.side,
                        price,
                        size: update.size,
                    });
                }
                BookAction::Delete => {
                    let Some(price) = book.id_price.remove(&update.id) else {
                        book.id_price.clear();
                        book.synced = false;
                        return Err(BookError::UnknownId {
                            raw_pair: raw_pair.to_string(),
                            id: update.id,
                        });
                    };
                    applied.push(AppliedLevel {
                        side: update.side,
                        price,
                        size: 0.0,
                    });
                }
            }
        }
        Ok(applied)
    }

    /// Whether a snapshot has been seen for `raw_pair` this session.
    #[must_use]
    pub fn is_synced(&self, raw_pair: &str) -> bool {
        self.books.get(raw_pair).is_some_and(|b| b.synced)
    }
}
