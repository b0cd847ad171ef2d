//! Parser for the worker's `status update` lines.
//!
//! A status update is a free-form log line carrying, in any order:
//!
//! - `segments="…"`: one glyph per tracked segment, chosen by the worker
//! - `downloads="…"`: one download-status glyph per segment (`✓` done,
//!   `▶` in progress, `!` error, anything else not requested)
//! - `queued=`, `in_progress=`, `done=`, `dl_requested=`, `dl_sent=`
//!   decimal counters
//!
//! Every field is optional. Missing strings parse as empty and missing or
//! unparseable counters as `0`, so a malformed line still yields a snapshot.

pub mod segment_map;

pub use segment_map::{render_segment_map, CellTag, SegmentCell};

pub const STATUS_MARKER: &str = "status update";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    pub queued: u64,
    pub in_progress: u64,
    pub done: u64,
    pub dl_requested: u64,
    pub dl_sent: u64,
}

impl TelemetryStats {
    /// Fixed-layout summary. Widths pad but never truncate.
    pub fn summary_line(&self) -> String {
        format!(
            "Seg: {:2}q  {:1}i {:2}d / DL: {:2}r  {:1}s",
            self.queued, self.in_progress, self.done, self.dl_requested, self.dl_sent
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub segments: String,
    pub downloads: String,
    pub stats: TelemetryStats,
}

impl TelemetrySnapshot {
    pub fn render(&self) -> RenderedTelemetry {
        RenderedTelemetry {
            cells: render_segment_map(&self.segments, &self.downloads),
            stats_line: self.stats.summary_line(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTelemetry {
    pub cells: Vec<SegmentCell>,
    pub stats_line: String,
}

pub fn is_status_update(line: &str) -> bool {
    line.contains(STATUS_MARKER)
}

pub fn parse_status_update(line: &str) -> Option<TelemetrySnapshot> {
    if !is_status_update(line) {
        return None;
    }
    let stats = TelemetryStats {
        queued: counter_value(line, "queued"),
        in_progress: counter_value(line, "in_progress"),
        done: counter_value(line, "done"),
        dl_requested: counter_value(line, "dl_requested"),
        dl_sent: counter_value(line, "dl_sent"),
    };
    Some(TelemetrySnapshot {
        segments: quoted_value(line, "segments").to_owned(),
        downloads: quoted_value(line, "downloads").to_owned(),
        stats,
    })
}

/// First non-empty `key="…"` value, or `""`.
fn quoted_value<'a>(line: &'a str, key: &str) -> &'a str {
    let needle = format!("{key}=\"");
    let mut rest = line;
    while let Some(pos) = rest.find(&needle) {
        let after = &rest[pos + needle.len()..];
        match after.find('"') {
            Some(0) => rest = after,
            Some(end) => return &after[..end],
            None => return "",
        }
    }
    ""
}

/// First `name=<digits>` occurrence. Absent or overflowing values read as 0.
fn counter_value(line: &str, name: &str) -> u64 {
    let needle = format!("{name}=");
    let mut rest = line;
    while let Some(pos) = rest.find(&needle) {
        let after = &rest[pos + needle.len()..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 {
            return after[..digits].parse::<u64>().unwrap_or(0);
        }
        rest = after;
    }
    0
}

#[cfg(test)]
#[path = "../tests/telemetry_tests.rs"]
mod tests;
