//! Segmentation of result sets and opaque payloads.
//!
//! Rows are packed greedily into JSON arrays whose serialized size stays
//! within the payload limit. Every reply has at least one segment, and
//! exactly one segment (the last) carries the final-block marker.

use atmos_ndn::{Component, Data, Name};
use serde_json::{json, Value};
use std::ops::Range;
use std::time::Duration;

/// What a reply segment lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Full dataset names (filter and prefix search).
    Results,
    /// Next-component candidates (autocomplete).
    Autocomplete {
        /// True when the listed component is the last name field.
        last_component: bool,
    },
}

/// Serialized size of `row` as a JSON string element.
fn element_size(row: &str) -> usize {
    serde_json::to_string(row).map_or(row.len() + 2, |s| s.len())
}

/// Splits `rows` into contiguous ranges, one per segment.
///
/// A row starts a new segment when appending it would push the serialized
/// array past `limit`. A single row larger than `limit` gets a segment of
/// its own. An empty row set yields one empty range.
pub fn plan_segments(rows: &[String], limit: usize) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut used = 2; // "[]"
    for (i, row) in rows.iter().enumerate() {
        let size = element_size(row);
        let separator = usize::from(i > start);
        if i > start && used + separator + size > limit {
            ranges.push(start..i);
            start = i;
            used = 2 + size;
        } else {
            used += separator + size;
        }
    }
    ranges.push(start..rows.len());
    ranges
}

/// Builds the JSON content of one reply segment.
///
/// `viewStart`/`viewEnd` are the inclusive 0-based row indexes covered;
/// both are 0 for an empty range.
pub fn reply_payload(rows: &[String], range: Range<usize>, kind: ReplyKind) -> Vec<u8> {
    let view_start = range.start;
    let view_end = range.end.saturating_sub(1).max(range.start);
    let items: Vec<Value> = rows[range].iter().map(|r| Value::String(r.clone())).collect();
    let mut body = json!({
        "resultCount": rows.len(),
        "viewStart": view_start,
        "viewEnd": view_end,
    });
    match kind {
        ReplyKind::Results => body["results"] = Value::Array(items),
        ReplyKind::Autocomplete { last_component } => {
            body["next"] = Value::Array(items);
            body["lastComponent"] = Value::Bool(last_component);
        }
    }
    body.to_string().into_bytes()
}

/// Builds every reply payload for `rows`.
pub fn reply_payloads(rows: &[String], limit: usize, kind: ReplyKind) -> Vec<Vec<u8>> {
    plan_segments(rows, limit)
        .into_iter()
        .map(|range| reply_payload(rows, range, kind))
        .collect()
}

/// Splits an opaque payload into chunks of at most `limit` bytes.
///
/// Always returns at least one (possibly empty) chunk.
pub fn chunk_payload(bytes: &[u8], limit: usize) -> Vec<Vec<u8>> {
    if bytes.is_empty() {
        return vec![Vec::new()];
    }
    bytes.chunks(limit.max(1)).map(<[u8]>::to_vec).collect()
}

/// Names and frames payloads as unsigned segments `<prefix>/<seg>`.
///
/// The last segment's FinalBlockId is its own segment component.
pub fn build_segments(prefix: &Name, payloads: Vec<Vec<u8>>, freshness: Duration) -> Vec<Data> {
    let last = payloads.len().saturating_sub(1) as u64;
    payloads
        .into_iter()
        .zip(0u64..)
        .map(|(payload, seg)| {
            let data = Data::new(prefix.clone().append_segment(seg))
                .with_content(payload)
                .with_freshness(freshness);
            if seg == last {
                data.with_final_block_id(Component::segment(seg))
            } else {
                data
            }
        })
        .collect()
}
