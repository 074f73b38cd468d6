//! Converts an opaque `Frame` from the transport into a `Delta` the
//! BookEngine can apply, or a `StreamReset` sentinel.
//!
//! The parser never propagates a malformed frame as an error upward: it
//! counts it and returns `None`, so a single bad message cannot take down
//! the stage.

use rust_decimal::Decimal;
use serde_json::Value;

use crate::book::Delta;
use crate::counters::ParserCounters;
use crate::decimal::{Price, Qty};
use crate::ports::Frame;

/// Either a parsed delta or a transport event that the caller should react
/// to by re-entering `Syncing` (see `Book::start_syncing`).
pub enum ParsedFrame {
    Delta(Delta),
    StreamReset,
}

pub struct Parser {
    counters: ParserCounters,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            counters: ParserCounters::default(),
        }
    }

    pub fn counters(&self) -> &ParserCounters {
        &self.counters
    }

    /// Parse one frame. `None` means the frame was malformed and has
    /// already been counted; the caller should simply move on.
    pub fn parse(&self, frame: Frame) -> Option<ParsedFrame> {
        match frame {
            Frame::StreamReset => Some(ParsedFrame::StreamReset),
            Frame::Depth(value) => match parse_depth(&value) {
                Ok(delta) => Some(ParsedFrame::Delta(delta)),
                Err(_) => {
                    ParserCounters::bump(&self.counters.malformed_frames);
                    None
                }
            },
        }
    }
}

fn parse_depth(value: &Value) -> Result<Delta, &'static str> {
    let first_id = value
        .get("first_id")
        .and_then(Value::as_u64)
        .ok_or("missing first_id")?;
    let last_id = value
        .get("last_id")
        .and_then(Value::as_u64)
        .ok_or("missing last_id")?;

    let bids = parse_levels(value.get("bids"))?;
    let asks = parse_levels(value.get("asks"))?;

    let delta = Delta {
        first_id,
        last_id,
        bids,
        asks,
    };
    if !delta.well_formed() {
        return Err("first_id > last_id");
    }
    Ok(delta)
}

/// Sides are optional on the wire (a pure-bid or pure-ask update is legal);
/// an absent array parses as empty, not an error.
fn parse_levels(value: Option<&Value>) -> Result<Vec<(Price, Qty)>, &'static str> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let arr = value.as_array().ok_or("levels not an array")?;
    arr.iter()
        .map(|pair| {
            let pair = pair.as_array().ok_or("level not a pair")?;
            if pair.len() != 2 {
                return Err("level pair must have exactly two elements");
            }
            let price = parse_decimal(&pair[0])?;
            let qty = parse_decimal(&pair[1])?;
            Ok((Price(price), Qty(qty)))
        })
        .collect()
}

/// Venues send numeric fields as JSON strings to avoid float precision
/// loss in transit; a bare JSON number is also accepted.
fn parse_decimal(value: &Value) -> Result<Decimal, &'static str> {
    match value {
        Value::String(s) => s.parse::<Decimal>().map_err(|_| "non-numeric decimal"),
        Value::Number(n) => n
            .to_string()
            .parse::<Decimal>()
            .map_err(|_| "non-numeric decimal"),
        _ => Err("decimal field must be a string or number"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_well_formed_depth_frame() {
        let parser = Parser::new();
        let frame = Frame::Depth(json!({
            "first_id": 10,
            "last_id": 12,
            "bids": [["100.00", "1.5"]],
            "asks": [["101.00", "2.0"]],
        }));
        match parser.parse(frame) {
            Some(ParsedFrame::Delta(delta)) => {
                assert_eq!(delta.first_id, 10);
                assert_eq!(delta.last_id, 12);
                assert_eq!(delta.bids.len(), 1);
                assert_eq!(delta.asks.len(), 1);
            }
            _ => panic!("expected a parsed delta"),
        }
        assert_eq!(parser.counters().malformed_frames.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn missing_sequence_field_is_counted_and_dropped() {
        let parser = Parser::new();
        let frame = Frame::Depth(json!({ "last_id": 12 }));
        assert!(parser.parse(frame).is_none());
        assert_eq!(parser.counters().malformed_frames.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn non_numeric_price_is_malformed() {
        let parser = Parser::new();
        let frame = Frame::Depth(json!({
            "first_id": 1,
            "last_id": 1,
            "bids": [["not-a-number", "1.0"]],
        }));
        assert!(parser.parse(frame).is_none());
    }

    #[test]
    fn missing_sides_default_to_empty() {
        let parser = Parser::new();
        let frame = Frame::Depth(json!({ "first_id": 1, "last_id": 1 }));
        match parser.parse(frame) {
            Some(ParsedFrame::Delta(delta)) => {
                assert!(delta.bids.is_empty());
                assert!(delta.asks.is_empty());
            }
            _ => panic!("expected a parsed delta"),
        }
    }

    #[test]
    fn stream_reset_passes_through() {
        let parser = Parser::new();
        assert!(matches!(
            parser.parse(Frame::StreamReset),
            Some(ParsedFrame::StreamReset)
        ));
    }
}
