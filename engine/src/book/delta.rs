//! Wire-adjacent types produced by the parser and consumed by the book.

use crate::decimal::{Price, Qty};

/// An incremental depth update. `first_id ..= last_id` is the inclusive
/// range of venue sequence numbers this single message represents (venues
/// may batch several internal updates into one wire message).
#[derive(Debug, Clone)]
pub struct Delta {
    pub first_id: u64,
    pub last_id: u64,
    pub bids: Vec<(Price, Qty)>,
    pub asks: Vec<(Price, Qty)>,
}

impl Delta {
    /// `true` if `first_id <= last_id`, the only structural invariant the
    /// parser is required to uphold before handing a `Delta` to the book.
    pub fn well_formed(&self) -> bool {
        self.first_id <= self.last_id
    }
}

/// A full book snapshot tagged with the sequence cursor at capture time.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub last_update_id: u64,
    pub bids: Vec<(Price, Qty)>,
    pub asks: Vec<(Price, Qty)>,
}
