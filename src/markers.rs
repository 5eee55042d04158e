use crate::button::{Function, NavigationType, Permanence};
use log::{debug, trace};

/// In-band control-marker interpreter.
///
/// The source format mixes a small fixed vocabulary of control markers
/// directly into the name/speech byte spans of a record. Two families
/// exist: escape-led opcodes carrying an operand (open pair 1B 14, close
/// pair 1B 15), and fixed 3-4 byte sequences with no operand. This module
/// is the only place those byte values live; format decoders hand any
/// span that may contain markers to [`interpret`] and never pattern-match
/// marker bytes themselves.
///
/// Behavior pinned down from observed device output:
/// - GOTO-HOME wins over any SET-PAGE later in the same record; the
///   SET-PAGE is consumed but contributes nothing.
/// - When the first recognized marker in a span is SET-PAGE or GOTO-HOME,
///   any text accumulated before it is display-only junk and is dropped.
/// - A control byte outside the recognized vocabulary ends the span:
///   everything after it is record metadata, not text.

/// Escape pair opening an operand-carrying marker.
pub const ESC_OPEN: [u8; 2] = [0x1B, 0x14];
/// Matching close pair terminating an operand.
pub const ESC_CLOSE: [u8; 2] = [0x1B, 0x15];

/// GOTO-HOME always lands here, whatever the record says.
pub const HOME_PAGE_ID: &str = "0400";

const OP_SET_PAGE: u8 = b'P';
const OP_SET_PAGE_TEMP: u8 = b'p';
const OP_RANDOM: u8 = b'R';
const OP_VOICE: u8 = b'V';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixedMarker {
    ClearDisplay,
    GoBack,
    GotoHome,
    InsertDate,
    SpeakDate,
    InsertTime,
    SpeakTime,
    VoiceClear,
    Wait,
    Prompt,
}

lazy_static! {
    /// Fixed no-operand sequences, longest first so 4-byte markers are
    /// never shadowed by a 3-byte prefix.
    static ref FIXED_MARKERS: Vec<(&'static [u8], FixedMarker)> = vec![
        (&[0x1B, 0x48, 0x4D, 0x45][..], FixedMarker::GotoHome),
        (&[0x1B, 0x50, 0x4D, 0x54][..], FixedMarker::Prompt),
        (&[0x1B, 0x43, 0x44][..], FixedMarker::ClearDisplay),
        (&[0x1B, 0x42, 0x4B][..], FixedMarker::GoBack),
        (&[0x1B, 0x44, 0x31][..], FixedMarker::InsertDate),
        (&[0x1B, 0x44, 0x32][..], FixedMarker::SpeakDate),
        (&[0x1B, 0x54, 0x31][..], FixedMarker::InsertTime),
        (&[0x1B, 0x54, 0x32][..], FixedMarker::SpeakTime),
        (&[0x1B, 0x56, 0x58][..], FixedMarker::VoiceClear),
        (&[0x1B, 0x57, 0x54][..], FixedMarker::Wait),
    ];
}

/// What [`interpret`] recovered from one marker-bearing span.
#[derive(Debug, Clone, Default)]
pub struct MarkerOutcome {
    /// Recognized control actions, in encounter order.
    pub functions: Vec<Function>,
    /// Text left over once marker bytes are removed. Becomes speech.
    pub text: String,
    /// Name split off by a PROMPT marker, already filtered to alphabetic
    /// words. Overrides any name read from the record's fixed fields.
    pub prompt_name: Option<String>,
    /// Navigation implied by the markers, if any. GoBack never carries a
    /// target.
    pub navigation: Option<(NavigationType, Option<String>)>,
}

/// Decode one span that may interleave control markers with text.
pub fn interpret(span: &[u8]) -> MarkerOutcome {
    let mut out = MarkerOutcome::default();
    // bufs[0] collects speech text, bufs[1] collects the post-PROMPT name
    let mut bufs = [String::new(), String::new()];
    let mut active = 0usize;
    let mut any_marker = false;
    let mut goto_home_seen = false;

    let mut i = 0;
    'scan: while i < span.len() {
        let b = span[i];
        if b == 0x1B {
            if span[i..].starts_with(&ESC_OPEN) {
                if i + 2 >= span.len() {
                    debug!("escape pair at end of span, truncating");
                    break;
                }
                let op = span[i + 2];
                match op {
                    OP_SET_PAGE | OP_SET_PAGE_TEMP => {
                        let (operand, next) = match read_delimited(span, i + 3) {
                            Some(v) => v,
                            None => {
                                debug!("unterminated SET-PAGE marker, truncating span");
                                break 'scan;
                            }
                        };
                        let target = operand.trim().to_string();
                        if goto_home_seen {
                            trace!("SET-PAGE {:?} ignored, GOTO-HOME already seen", target);
                        } else {
                            let permanence = if op == OP_SET_PAGE {
                                Permanence::Permanent
                            } else {
                                Permanence::Temporary
                            };
                            let nav_type = if op == OP_SET_PAGE {
                                NavigationType::Permanent
                            } else {
                                NavigationType::Temporary
                            };
                            out.functions.push(Function::SetPage {
                                target: target.clone(),
                                permanence,
                            });
                            out.navigation = Some((nav_type, Some(target)));
                            if !any_marker {
                                bufs[active].clear();
                            }
                        }
                        any_marker = true;
                        i = next;
                        continue;
                    }
                    OP_RANDOM => {
                        let (page_ref, next) = match read_parenthesized(span, i + 3) {
                            Some(v) => v,
                            None => {
                                debug!("RANDOM marker without (page) operand, truncating");
                                break 'scan;
                            }
                        };
                        out.functions.push(Function::RandomChoice { page_ref });
                        any_marker = true;
                        i = next;
                        continue;
                    }
                    OP_VOICE => {
                        let (params, next) = match read_delimited(span, i + 3) {
                            Some(v) => v,
                            None => {
                                debug!("unterminated VOICE marker, truncating span");
                                break 'scan;
                            }
                        };
                        out.functions.push(Function::VoiceSetTemporary {
                            params: params.trim().to_string(),
                        });
                        any_marker = true;
                        i = next;
                        continue;
                    }
                    _ => {
                        debug!("unknown escape opcode {:#04x}, truncating span", op);
                        break 'scan;
                    }
                }
            }

            let mut matched = None;
            for (bytes, marker) in FIXED_MARKERS.iter() {
                if span[i..].starts_with(bytes) {
                    matched = Some((bytes.len(), *marker));
                    break;
                }
            }
            match matched {
                Some((len, marker)) => {
                    match marker {
                        FixedMarker::ClearDisplay => {
                            out.functions.push(Function::ClearDisplay)
                        }
                        FixedMarker::GoBack => {
                            out.functions.push(Function::GoBackPage);
                            out.navigation = Some((NavigationType::GoBack, None));
                        }
                        FixedMarker::GotoHome => {
                            goto_home_seen = true;
                            out.functions.push(Function::GotoHome);
                            out.navigation = Some((
                                NavigationType::Permanent,
                                Some(HOME_PAGE_ID.to_string()),
                            ));
                            if !any_marker {
                                bufs[active].clear();
                            }
                        }
                        FixedMarker::InsertDate => out.functions.push(Function::InsertDate),
                        FixedMarker::SpeakDate => out.functions.push(Function::SpeakDate),
                        FixedMarker::InsertTime => out.functions.push(Function::InsertTime),
                        FixedMarker::SpeakTime => out.functions.push(Function::SpeakTime),
                        FixedMarker::VoiceClear => {
                            out.functions.push(Function::VoiceClearTemporary)
                        }
                        // WAIT pauses playback on the device; nothing for
                        // the graph to carry, so it is stripped outright.
                        FixedMarker::Wait => {}
                        FixedMarker::Prompt => {
                            active = 1;
                        }
                    }
                    any_marker = true;
                    i += len;
                    continue;
                }
                None => {
                    debug!("unrecognized 0x1B sequence at span offset {}, truncating", i);
                    break;
                }
            }
        } else if b < 0x20 {
            // Record metadata follows the text; everything past here is
            // not ours to decode.
            trace!("control byte {:#04x} at span offset {}, truncating", b, i);
            break;
        } else {
            bufs[active].push(b as char);
            i += 1;
        }
    }

    out.text = bufs[0].trim().to_string();
    if active == 1 {
        let name = alphabetic_words(&bufs[1]);
        if !name.is_empty() {
            out.prompt_name = Some(name);
        }
    }
    out
}

/// Read an operand of the form `: text` terminated by the close pair.
/// Returns the operand text and the index just past the close pair.
fn read_delimited(span: &[u8], from: usize) -> Option<(String, usize)> {
    let mut start = from;
    if span.get(start) == Some(&b':') {
        start += 1;
    }
    let mut j = start;
    while j + 1 < span.len() {
        if span[j..].starts_with(&ESC_CLOSE) {
            return Some((latin1(&span[start..j]), j + ESC_CLOSE.len()));
        }
        j += 1;
    }
    None
}

/// Read a `(text)` operand. Returns the text and the index past `)`.
fn read_parenthesized(span: &[u8], from: usize) -> Option<(String, usize)> {
    if span.get(from) != Some(&b'(') {
        return None;
    }
    let start = from + 1;
    let mut j = start;
    while j < span.len() {
        if span[j] == b')' {
            return Some((latin1(&span[start..j]).trim().to_string(), j + 1));
        }
        j += 1;
    }
    None
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|b| *b as char).collect()
}

/// Keep alphabetic words and single spaces only; the device pads the
/// post-PROMPT name with assorted junk.
fn alphabetic_words(raw: &str) -> String {
    let filtered: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphabetic() || c == ' ' { c } else { ' ' })
        .collect();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}
