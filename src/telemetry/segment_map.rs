/// Stand-in for whichever side of the segment/download pair ran out first.
pub const FILLER_GLYPH: char = '–';
pub const FULL_BLOCK_GLYPHS: [char; 2] = ['█', '■'];

pub const DOWNLOAD_DONE: char = '✓';
pub const DOWNLOAD_IN_PROGRESS: char = '▶';
pub const DOWNLOAD_ERROR: char = '!';

/// Styling decision for one segment, independent of any presentation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellTag {
    /// Downloaded and the glyph is already a full block: foreground colour only.
    DoneFilled,
    Done,
    InProgress,
    Error,
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentCell {
    pub glyph: char,
    pub tag: CellTag,
}

pub fn classify(segment: char, download: char) -> CellTag {
    match download {
        DOWNLOAD_DONE if FULL_BLOCK_GLYPHS.contains(&segment) => CellTag::DoneFilled,
        DOWNLOAD_DONE => CellTag::Done,
        DOWNLOAD_IN_PROGRESS => CellTag::InProgress,
        DOWNLOAD_ERROR => CellTag::Error,
        _ => CellTag::Plain,
    }
}

/// Pairs both maps position by position, padding the shorter one with [`FILLER_GLYPH`].
pub fn render_segment_map(segments: &str, downloads: &str) -> Vec<SegmentCell> {
    let mut segment_glyphs = segments.chars();
    let mut download_glyphs = downloads.chars();
    let mut cells = Vec::with_capacity(segments.len().max(downloads.len()));
    loop {
        let (segment, download) = match (segment_glyphs.next(), download_glyphs.next()) {
            (None, None) => break,
            (segment, download) => (
                segment.unwrap_or(FILLER_GLYPH),
                download.unwrap_or(FILLER_GLYPH),
            ),
        };
        cells.push(SegmentCell {
            glyph: segment,
            tag: classify(segment, download),
        });
    }
    cells
}
