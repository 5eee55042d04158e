use crate::markers::{ESC_CLOSE, ESC_OPEN};
use log::{debug, trace};
use std::collections::HashMap;

/// Overlay-record scanner.
///
/// Overlay records supply "button name -> navigation target" overrides,
/// keyed by name rather than by page/sequence, and cluster in the back
/// quarter of the buffer. Record boundaries are no more discoverable here
/// than in the main stream, so the scan treats the overlay marker as the
/// only reliable anchor and resynchronizes one byte at a time; malformed
/// candidates are simply skipped.

/// 6-byte overlay marker, distinct from the button-record marker.
pub const OVERLAY_MARKER: [u8; 6] = [0x00, 0x4F, 0x56, 0x52, 0x4C, 0x59];

/// Type byte every genuine overlay record carries after the marker.
const OVERLAY_TYPE: u8 = 0x02;

const MAX_NAME_LEN: usize = 100;

/// How far past the name the set-page delimiter pair may sit.
const TARGET_WINDOW: usize = 48;

/// Captured target text must carry this prefix (permanent set-page);
/// anything else is not an override we know how to apply.
const PERMANENT_PREFIX: &str = "P:";

/// One navigation override. Built once by the scanner, read-only after.
#[derive(Debug, Clone)]
pub struct OverlayEntry {
    /// Lowercased button name, also the map key.
    pub button_name: String,
    pub navigation_target_name: String,
    /// Raw captured bytes, kept for diagnostics only.
    pub ref_bytes: Vec<u8>,
}

pub type OverlayMap = HashMap<String, OverlayEntry>;

/// Scan the back quarter of the buffer for overlay records.
pub fn scan_overlays(buf: &[u8]) -> OverlayMap {
    let mut map = OverlayMap::new();
    let start = buf.len() * 3 / 4;
    let mut i = start;
    while i + OVERLAY_MARKER.len() <= buf.len() {
        if buf[i..].starts_with(&OVERLAY_MARKER) {
            if let Some(entry) = parse_overlay(buf, i) {
                trace!(
                    "overlay: {:?} -> {:?}",
                    entry.button_name,
                    entry.navigation_target_name
                );
                map.insert(entry.button_name.clone(), entry);
            }
        }
        i += 1;
    }
    debug!("overlay scan: {} overrides", map.len());
    map
}

fn parse_overlay(buf: &[u8], offset: usize) -> Option<OverlayEntry> {
    let type_at = offset + OVERLAY_MARKER.len();
    if type_at + 2 > buf.len() || buf[type_at] != OVERLAY_TYPE {
        return None;
    }
    let name_len = buf[type_at + 1] as usize;
    if name_len == 0 || name_len > MAX_NAME_LEN {
        debug!(
            "overlay candidate at {:#06x}: rejected name length {}",
            offset, name_len
        );
        return None;
    }

    let name_start = type_at + 2;
    let name_end = name_start + name_len;
    if name_end > buf.len() {
        return None;
    }
    let name_bytes = &buf[name_start..name_end];
    if name_bytes.iter().any(|&b| b < 0x20) {
        debug!("overlay candidate at {:#06x}: name has control bytes", offset);
        return None;
    }
    let button_name: String = name_bytes
        .iter()
        .map(|b| (*b as char).to_ascii_lowercase())
        .collect();

    let window_end = buf.len().min(name_end + TARGET_WINDOW);
    let window = &buf[name_end..window_end];
    let open = window
        .windows(ESC_OPEN.len())
        .position(|w| w == ESC_OPEN)?;
    let after_open = open + ESC_OPEN.len();
    let close = window[after_open..]
        .windows(ESC_CLOSE.len())
        .position(|w| w == ESC_CLOSE)?;
    let captured = &window[after_open..after_open + close];

    let text: String = captured.iter().map(|b| *b as char).collect();
    let target = text.strip_prefix(PERMANENT_PREFIX)?;
    let target = target.trim();
    if target.is_empty() {
        return None;
    }

    Some(OverlayEntry {
        button_name,
        navigation_target_name: target.to_string(),
        ref_bytes: captured.to_vec(),
    })
}
