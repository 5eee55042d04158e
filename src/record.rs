use crate::button::Button;
use crate::formats;
use indexmap::IndexMap;
use log::{debug, info};

/// Button-record locator and format classifier.
///
/// The buffer is not self-describing: record lengths depend on the format
/// variant and several length fields lie. The only reliable anchor is the
/// 4-byte m-record marker, so the scan walks the whole buffer looking for
/// it and resumes one byte past a matched marker's *prefix* rather than
/// past the decoded record, so when a length heuristic misfires the next
/// adjacent record is still found. The price is the occasional false
/// positive on marker-shaped bytes inside a record body; those decode to
/// garbage and are rejected by the format decoders.

/// The m-record marker opening every button record.
pub const RECORD_MARKER: [u8; 4] = [0x00, 0x4D, 0x52, 0x43];

/// Marker, byte-swapped page id, sequence, discriminator.
const HEADER_LEN: usize = 8;

/// One located-but-not-yet-decoded record. Consumed immediately by a
/// format decoder, never persisted.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord {
    pub page_id: u16,
    pub sequence: u8,
    pub discriminator: u8,
    /// Byte offset of the marker in the buffer.
    pub offset: usize,
}

/// The five record layouts, selected by the discriminator byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// Format 1: length-prefixed name, optional icon and speech.
    Standard,
    /// Format 2: null-terminated span, name doubles as speech.
    NullTerminated,
    /// Format 3: offset name with an explicit 2-byte speech length.
    OffsetName,
    /// Format 4: line-terminated name, long speech, occasional split.
    SimpleSpeech,
    /// Format 5: function/marker-led body.
    Complex,
}

impl RecordFormat {
    /// Total over all 256 discriminator values; first match wins.
    pub fn classify(discriminator: u8) -> RecordFormat {
        match discriminator {
            0x87 | 0xAF | 0xCC | 0xFF => RecordFormat::Complex,
            0 => RecordFormat::NullTerminated,
            1..=49 => RecordFormat::Standard,
            50..=100 => RecordFormat::SimpleSpeech,
            _ => RecordFormat::OffsetName,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RecordFormat::Standard => "standard",
            RecordFormat::NullTerminated => "null_terminated",
            RecordFormat::OffsetName => "offset_name",
            RecordFormat::SimpleSpeech => "simple_speech",
            RecordFormat::Complex => "complex",
        }
    }
}

/// Everything the record scan recovered, plus the bookkeeping that lets
/// callers verify nothing was silently lost: decoded-per-format counts
/// plus the skip count always account for every marker hit.
pub struct ScanOutcome {
    pub buttons: Vec<Button>,
    pub format_stats: IndexMap<String, usize>,
    pub skipped_records: usize,
    pub marker_hits: usize,
}

/// Scan the whole buffer for button records and decode each one.
///
/// A decode failure is local: the record is logged, counted and skipped,
/// and scanning resumes at the next byte.
pub fn scan_records(buf: &[u8]) -> ScanOutcome {
    let mut out = ScanOutcome {
        buttons: Vec::new(),
        format_stats: IndexMap::new(),
        skipped_records: 0,
        marker_hits: 0,
    };

    let mut i = 0;
    while i + RECORD_MARKER.len() <= buf.len() {
        if buf[i..].starts_with(&RECORD_MARKER) {
            out.marker_hits += 1;
            match decode_record(buf, i) {
                Ok((format, decoded)) => {
                    *out
                        .format_stats
                        .entry(format.label().to_string())
                        .or_insert(0) += 1;
                    out.buttons.push(decoded.primary);
                    if let Some(second) = decoded.secondary {
                        out.buttons.push(second);
                    }
                }
                Err(e) => {
                    debug!("skipping record at {:#06x}: {}", i, e);
                    out.skipped_records += 1;
                }
            }
        }
        i += 1;
    }

    info!(
        "record scan: {} marker hits, {} buttons decoded, {} skipped",
        out.marker_hits,
        out.buttons.len(),
        out.skipped_records
    );
    out
}

fn decode_record(
    buf: &[u8],
    offset: usize,
) -> Result<(RecordFormat, formats::Decoded), String> {
    if offset + HEADER_LEN > buf.len() {
        return Err(format!("record header at {:#06x} truncated", offset));
    }

    // The device stores the page id byte-reversed relative to its logical
    // value: read little-endian, then swap the halves.
    let page_id = u16::from_le_bytes([buf[offset + 4], buf[offset + 5]]).swap_bytes();
    let rec = RawRecord {
        page_id,
        sequence: buf[offset + 6],
        discriminator: buf[offset + 7],
        offset,
    };

    let format = RecordFormat::classify(rec.discriminator);
    let decoded = match format {
        RecordFormat::Standard => formats::decode_standard(buf, &rec),
        RecordFormat::NullTerminated => formats::decode_null_terminated(buf, &rec),
        RecordFormat::OffsetName => formats::decode_offset_name(buf, &rec),
        RecordFormat::SimpleSpeech => formats::decode_simple_speech(buf, &rec),
        RecordFormat::Complex => formats::decode_complex(buf, &rec),
    }?;
    Ok((format, decoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// marker + stored page id + sequence + discriminator + body
    fn record(page_bytes: [u8; 2], seq: u8, disc: u8, body: &[u8]) -> Vec<u8> {
        let mut v = RECORD_MARKER.to_vec();
        v.extend_from_slice(&page_bytes);
        v.push(seq);
        v.push(disc);
        v.extend_from_slice(body);
        v
    }

    #[test]
    fn classification_is_total() {
        for disc in 0u8..=255 {
            // classify never panics and every value lands on one format
            let _ = RecordFormat::classify(disc);
        }
        assert_eq!(RecordFormat::classify(0), RecordFormat::NullTerminated);
        assert_eq!(RecordFormat::classify(1), RecordFormat::Standard);
        assert_eq!(RecordFormat::classify(49), RecordFormat::Standard);
        assert_eq!(RecordFormat::classify(50), RecordFormat::SimpleSpeech);
        assert_eq!(RecordFormat::classify(100), RecordFormat::SimpleSpeech);
        assert_eq!(RecordFormat::classify(101), RecordFormat::OffsetName);
        assert_eq!(RecordFormat::classify(0x87), RecordFormat::Complex);
        assert_eq!(RecordFormat::classify(0xAF), RecordFormat::Complex);
        assert_eq!(RecordFormat::classify(0xCC), RecordFormat::Complex);
        assert_eq!(RecordFormat::classify(0xFF), RecordFormat::Complex);
        assert_eq!(RecordFormat::classify(0x88), RecordFormat::OffsetName);
    }

    #[test]
    fn page_id_is_byte_swapped() {
        let buf = record([0x04, 0x00], 0, 0, b"Hello\x00");
        let out = scan_records(&buf);
        assert_eq!(out.buttons.len(), 1);
        assert_eq!(out.buttons[0].page_id, "0400");
    }

    #[test]
    fn malformed_record_is_skipped_and_next_decoded() {
        // a standard-format record whose body is unprintable junk, then a
        // valid record downstream
        let mut buf = record([0x04, 0x00], 0, 3, &[0x01, 0x01, 0x01, 0x01]);
        buf.extend_from_slice(&record([0x04, 0x00], 2, 0, b"Still here\x00"));
        let out = scan_records(&buf);
        assert_eq!(out.marker_hits, 2);
        assert_eq!(out.skipped_records, 1);
        assert_eq!(out.buttons.len(), 1);
        assert_eq!(out.buttons[0].name.as_deref(), Some("Still here"));
    }

    #[test]
    fn marker_at_end_of_buffer_is_skipped() {
        let mut buf = record([0x04, 0x00], 2, 0, b"Still here\x00");
        buf.extend_from_slice(&RECORD_MARKER);
        let out = scan_records(&buf);
        assert_eq!(out.marker_hits, 2);
        assert_eq!(out.skipped_records, 1);
        assert_eq!(out.buttons.len(), 1);
    }

    #[test]
    fn stats_plus_skips_account_for_every_marker() {
        let mut buf = record([0x04, 0x00], 0, 0, b"one\x00");
        buf.extend_from_slice(&record([0x04, 0x00], 1, 3, b"\x03two\x00"));
        buf.extend_from_slice(&RECORD_MARKER); // truncated tail marker
        let out = scan_records(&buf);
        let decoded: usize = out.format_stats.values().sum();
        assert_eq!(decoded + out.skipped_records, out.marker_hits);
        assert_eq!(out.format_stats.get("null_terminated"), Some(&1));
        assert_eq!(out.format_stats.get("standard"), Some(&1));
    }

    #[test]
    fn adjacent_records_are_both_found() {
        let mut buf = record([0x04, 0x00], 0, 0, b"first\x00");
        buf.extend_from_slice(&record([0x05, 0x00], 1, 0, b"second\x00"));
        let out = scan_records(&buf);
        assert_eq!(out.buttons.len(), 2);
        assert_eq!(out.buttons[1].page_id, "0500");
    }
}
