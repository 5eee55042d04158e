use crate::button::{Button, NavigationType};
use crate::markers::{self, MarkerOutcome};
use crate::record::RawRecord;
use log::{debug, trace};

/// Format-specific record body extractors.
///
/// Every decoder receives the whole buffer plus the located record header
/// and recovers name, icon, speech and raw control-marker spans from the
/// body, as far as the record alone allows. Cross-page resolution happens
/// later. The length fields in this format are unreliable: several
/// overlap, and one routinely overruns into the next record. Each decoder
/// applies its own empirically-determined recovery rules and returns `Err`
/// for bodies it cannot make sense of. The scan loop skips such records;
/// a single bad record never aborts the decode.
///
/// Record body starts 8 bytes past the marker (after marker, page id,
/// sequence and discriminator).

const BODY_OFFSET: usize = 8;

/// How far into a span a `!`/`^` separator can sit and still be treated
/// as an icon/text boundary.
const ICON_SEPARATOR_WINDOW: usize = 20;

/// Bound on null-terminated span scans so a missing terminator cannot
/// walk the rest of the buffer.
const MAX_SPAN: usize = 512;

pub struct Decoded {
    pub primary: Button,
    /// Format 4 occasionally splits one record into two buttons.
    pub secondary: Option<Button>,
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|b| *b as char).collect()
}

fn is_icon_char(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_' || b == b'~'
}

/// Length-prefixed icon token test: a leading byte below 0x20 followed by
/// that many uppercase/digit/underscore/tilde bytes is an icon, not text.
fn strip_icon_prefix(span: &[u8]) -> (Option<String>, &[u8]) {
    if span.is_empty() || span[0] == 0 || span[0] >= 0x20 {
        return (None, span);
    }
    let len = span[0] as usize;
    if 1 + len > span.len() {
        return (None, span);
    }
    let token = &span[1..1 + len];
    if token.iter().all(|&b| is_icon_char(b)) {
        (Some(latin1(token)), &span[1 + len..])
    } else {
        (None, span)
    }
}

/// Separator-based icon test: `!` or `^` early in the span with only
/// icon-token bytes before it marks an icon/text boundary.
fn strip_separator_icon(span: &[u8]) -> (Option<String>, &[u8]) {
    let window = span.len().min(ICON_SEPARATOR_WINDOW);
    for p in 1..window {
        if span[p] == b'!' || span[p] == b'^' {
            if span[..p].iter().all(|&b| is_icon_char(b)) {
                return (Some(latin1(&span[..p])), &span[p + 1..]);
            }
            return (None, span);
        }
    }
    (None, span)
}

fn extract_icon(span: &[u8]) -> (Option<String>, &[u8]) {
    let (icon, rest) = strip_icon_prefix(span);
    if icon.is_some() {
        return (icon, rest);
    }
    strip_separator_icon(span)
}

/// Text up to the first control byte; trailing bytes are record metadata.
fn clean_span(span: &[u8]) -> String {
    let end = span.iter().position(|&b| b < 0x20).unwrap_or(span.len());
    latin1(&span[..end])
}

/// A lone non-alphanumeric character preceded by a space at the end of
/// decoded text is a corruption artifact. Seen repeatedly in device
/// output; strip until the text ends cleanly.
pub fn strip_trailing_garbage(text: &str) -> String {
    let mut s = text.trim_end().to_string();
    loop {
        let chars: Vec<char> = s.chars().collect();
        let n = chars.len();
        if n >= 2 && !chars[n - 1].is_alphanumeric() && chars[n - 2] == ' ' {
            s = chars[..n - 2].iter().collect::<String>().trim_end().to_string();
        } else {
            break;
        }
    }
    s
}

/// Printable/space/newline only; the acceptance test for candidate
/// name-length fields.
fn printable_candidate(span: &[u8]) -> bool {
    span.iter()
        .all(|&b| b == b'\n' || b == b'\r' || (0x20..0x7f).contains(&b))
}

fn null_terminated(buf: &[u8], start: usize, max: usize) -> &[u8] {
    if start >= buf.len() {
        return &[];
    }
    let limit = buf.len().min(start + max);
    let end = buf[start..limit]
        .iter()
        .position(|&b| b == 0)
        .map(|p| start + p)
        .unwrap_or(limit);
    &buf[start..end]
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Fold a marker-interpreter outcome into a button: functions, implied
/// navigation, leftover text as speech, PROMPT name override.
fn apply_outcome(button: &mut Button, outcome: MarkerOutcome) {
    if let Some(name) = outcome.prompt_name {
        button.name = Some(name);
    }
    button.functions.extend(outcome.functions);
    if let Some((nav_type, target)) = outcome.navigation {
        button.navigation_type = nav_type;
        button.navigation_target = target;
    }
    button.speech = non_empty(strip_trailing_garbage(&outcome.text));
    // go-back buttons never speak and never carry a target
    if button.navigation_type == NavigationType::GoBack {
        button.speech = None;
        button.navigation_target = None;
    }
}

fn reject_empty(button: Button) -> Result<Decoded, String> {
    if button.name.is_none()
        && button.speech.is_none()
        && button.functions.is_empty()
        && button.navigation_type == NavigationType::None
    {
        return Err("record body decoded to nothing".to_string());
    }
    Ok(Decoded {
        primary: button,
        secondary: None,
    })
}

/// Format 1 (discriminator 1-49): length-prefixed name, optional icon,
/// optional length-prefixed speech.
///
/// Two length fields claim to describe the name and they disagree often
/// enough to matter. Try the discriminator-derived length first, then the
/// explicit length byte; accept whichever yields printable text.
pub fn decode_standard(buf: &[u8], rec: &RawRecord) -> Result<Decoded, String> {
    let body = rec.offset + BODY_OFFSET;
    if body + 1 >= buf.len() {
        return Err(format!("standard record at {:#06x} truncated", rec.offset));
    }
    let alt_len = buf[body] as usize;
    let name_start = body + 1;

    let mut chosen: Option<usize> = None;
    for cand in [rec.discriminator as usize, alt_len] {
        if cand > 0
            && name_start + cand <= buf.len()
            && printable_candidate(&buf[name_start..name_start + cand])
        {
            chosen = Some(cand);
            break;
        }
    }
    let name_len = chosen.ok_or_else(|| {
        format!(
            "no plausible name length at {:#06x} (candidates {} / {})",
            rec.offset, rec.discriminator, alt_len
        )
    })?;
    trace!(
        "standard record at {:#06x}: name length {} (disc {}, alt {})",
        rec.offset,
        name_len,
        rec.discriminator,
        alt_len
    );

    let mut button = Button::new(rec.page_id, rec.sequence);
    let (icon, name_span) = extract_icon(&buf[name_start..name_start + name_len]);
    button.icon = icon;
    button.name = non_empty(strip_trailing_garbage(&clean_span(name_span)));

    let speech_len_at = name_start + name_len;
    if speech_len_at < buf.len() {
        let speech_len = buf[speech_len_at] as usize;
        if speech_len > 0 {
            let start = speech_len_at + 1;
            let end = buf.len().min(start + speech_len);
            if start < end {
                apply_outcome(&mut button, markers::interpret(&buf[start..end]));
            }
        }
    }
    reject_empty(button)
}

/// Format 2 (discriminator 0): a single null-terminated span whose
/// cleaned text is both name and speech.
pub fn decode_null_terminated(buf: &[u8], rec: &RawRecord) -> Result<Decoded, String> {
    let body = rec.offset + BODY_OFFSET;
    let span = null_terminated(buf, body, MAX_SPAN);
    if span.is_empty() {
        return Err(format!(
            "null-terminated record at {:#06x} has empty body",
            rec.offset
        ));
    }

    let mut button = Button::new(rec.page_id, rec.sequence);
    let (icon, rest) = extract_icon(span);
    button.icon = icon;
    apply_outcome(&mut button, markers::interpret(rest));
    if button.name.is_none() {
        button.name = button.speech.clone();
    }
    reject_empty(button)
}

/// Format 3 (discriminator 101-255 outside the complex set): name behind
/// two length fields, speech with an explicit 16-bit length.
///
/// The 16-bit speech length is primary, but values over 200 are
/// implausible for this device and mean the high byte is actually record
/// metadata; fall back to the low byte alone.
pub fn decode_offset_name(buf: &[u8], rec: &RawRecord) -> Result<Decoded, String> {
    let body = rec.offset + BODY_OFFSET;
    if body + 3 > buf.len() {
        return Err(format!(
            "offset-name record at {:#06x} truncated",
            rec.offset
        ));
    }
    let name_len = buf[body] as usize;
    let wide = u16::from_le_bytes([buf[body + 1], buf[body + 2]]) as usize;
    let speech_len = if wide > 200 { buf[body + 1] as usize } else { wide };

    let name_start = body + 3;
    let name_end = buf.len().min(name_start + name_len);
    if name_start >= buf.len() {
        return Err(format!(
            "offset-name record at {:#06x} has no name bytes",
            rec.offset
        ));
    }

    let mut button = Button::new(rec.page_id, rec.sequence);
    let (icon, name_span) = extract_icon(&buf[name_start..name_end]);
    button.icon = icon;
    button.name = non_empty(strip_trailing_garbage(&clean_span(name_span)));

    let speech_start = name_start + name_len;
    if speech_len > 0 && speech_start < buf.len() {
        let end = buf.len().min(speech_start + speech_len);
        apply_outcome(&mut button, markers::interpret(&buf[speech_start..end]));
    }
    reject_empty(button)
}

/// Format 4 (discriminator 50-100): simple/long speech records. The
/// nominal name length regularly overruns into the next record, so the
/// name is cut at the first line terminator; the speech is the
/// null-terminated span after it. A caret-prefixed trailer carrying a
/// different name splits the record into two buttons sharing the speech.
pub fn decode_simple_speech(buf: &[u8], rec: &RawRecord) -> Result<Decoded, String> {
    let body = rec.offset + BODY_OFFSET;
    if body + 1 >= buf.len() {
        return Err(format!(
            "simple-speech record at {:#06x} truncated",
            rec.offset
        ));
    }
    let nominal = buf[body] as usize;
    let name_start = body + 1;
    let limit = buf.len().min(name_start + nominal);
    let name_raw = &buf[name_start..limit];

    let (name_span, speech_start) =
        match name_raw.iter().position(|&b| b == b'\r' || b == b'\n') {
            Some(p) => {
                // swallow a CRLF pair as one terminator
                let mut after = name_start + p + 1;
                if name_raw[p] == b'\r' && buf.get(after) == Some(&b'\n') {
                    after += 1;
                }
                (&name_raw[..p], after)
            }
            None => (name_raw, limit),
        };

    let mut button = Button::new(rec.page_id, rec.sequence);
    let (icon, name_span) = extract_icon(name_span);
    button.icon = icon;
    button.name = non_empty(strip_trailing_garbage(&clean_span(name_span)));

    let speech_span = null_terminated(buf, speech_start, MAX_SPAN);

    // A '^' inside the speech span may prefix a second button's name.
    let mut secondary_name: Option<String> = None;
    let mut speech_bytes = speech_span;
    if let Some(q) = speech_span.iter().position(|&b| b == b'^') {
        let cand = strip_trailing_garbage(&clean_span(&speech_span[q + 1..]));
        let duplicated = button
            .name
            .as_deref()
            .map(|n| n.eq_ignore_ascii_case(&cand))
            .unwrap_or(false);
        if !cand.is_empty() && !duplicated {
            secondary_name = Some(cand);
            speech_bytes = &speech_span[..q];
        }
    }

    apply_outcome(&mut button, markers::interpret(speech_bytes));

    let secondary = match secondary_name {
        Some(name) if rec.sequence == u8::MAX => {
            debug!(
                "simple-speech record at {:#06x}: dropping split-off button {:?}, sequence already 255",
                rec.offset, name
            );
            None
        }
        Some(name) => {
            let mut second = Button::new(rec.page_id, rec.sequence + 1);
            second.name = Some(name);
            second.speech = button.speech.clone();
            Some(second)
        }
        None => None,
    };

    let decoded = reject_empty(button)?;
    Ok(Decoded {
        secondary,
        ..decoded
    })
}

/// Format 5 (discriminator in the complex set): the body leads with
/// control markers; whatever text survives interpretation is the label.
pub fn decode_complex(buf: &[u8], rec: &RawRecord) -> Result<Decoded, String> {
    let body = rec.offset + BODY_OFFSET;
    let span = null_terminated(buf, body, MAX_SPAN);
    if span.is_empty() {
        return Err(format!("complex record at {:#06x} has empty body", rec.offset));
    }

    let mut button = Button::new(rec.page_id, rec.sequence);
    let outcome = markers::interpret(span);
    let label = non_empty(strip_trailing_garbage(&outcome.text));
    if let Some(name) = outcome.prompt_name.clone() {
        button.name = Some(name);
    } else {
        button.name = label;
    }
    button.functions.extend(outcome.functions);
    if let Some((nav_type, target)) = outcome.navigation {
        button.navigation_type = nav_type;
        button.navigation_target = target;
    }
    reject_empty(button)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::button::Function;
    use crate::markers::{ESC_CLOSE, ESC_OPEN};

    fn rec(disc: u8) -> RawRecord {
        RawRecord {
            page_id: 0x0400,
            sequence: 5,
            discriminator: disc,
            offset: 0,
        }
    }

    /// 8 filler header bytes, then the body.
    fn with_body(body: &[u8]) -> Vec<u8> {
        let mut buf = vec![0xEE; BODY_OFFSET];
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn standard_prefers_discriminator_length() {
        // disc 3 and alt length 5 both decode printable text; disc wins
        let buf = with_body(b"\x05catss tail");
        let d = decode_standard(&buf, &rec(3)).unwrap();
        assert_eq!(d.primary.name.as_deref(), Some("cat"));
    }

    #[test]
    fn standard_falls_back_to_alt_length() {
        // discriminator length would swallow a control byte; alt is clean
        let mut body = b"\x03dog".to_vec();
        body.push(0x01);
        body.extend_from_slice(b"xxxx");
        let buf = with_body(&body);
        let d = decode_standard(&buf, &rec(8)).unwrap();
        assert_eq!(d.primary.name.as_deref(), Some("dog"));
    }

    #[test]
    fn standard_reads_speech_after_name() {
        let mut body = b"\x03cat".to_vec();
        body.push(5); // speech length
        body.extend_from_slice(b"meows");
        let buf = with_body(&body);
        let d = decode_standard(&buf, &rec(3)).unwrap();
        assert_eq!(d.primary.name.as_deref(), Some("cat"));
        assert_eq!(d.primary.speech.as_deref(), Some("meows"));
    }

    #[test]
    fn standard_rejects_implausible_lengths() {
        let buf = with_body(&[0xF0, 0x01, 0x02]);
        assert!(decode_standard(&buf, &rec(40)).is_err());
    }

    #[test]
    fn null_terminated_name_doubles_as_speech() {
        let buf = with_body(b"Drinks\x00trailing");
        let d = decode_null_terminated(&buf, &rec(0)).unwrap();
        assert_eq!(d.primary.name.as_deref(), Some("Drinks"));
        assert_eq!(d.primary.speech.as_deref(), Some("Drinks"));
    }

    #[test]
    fn null_terminated_nav_only_keeps_no_speech() {
        let mut body = ESC_OPEN.to_vec();
        body.push(b'P');
        body.extend_from_slice(b":animals");
        body.extend_from_slice(&ESC_CLOSE);
        body.push(0);
        let buf = with_body(&body);
        let d = decode_null_terminated(&buf, &rec(0)).unwrap();
        assert_eq!(d.primary.speech, None);
        assert_eq!(
            d.primary.navigation_target.as_deref(),
            Some("animals")
        );
    }

    #[test]
    fn icon_prefix_is_stripped() {
        let buf = with_body(b"\x04CAT1Felix\x00");
        let d = decode_null_terminated(&buf, &rec(0)).unwrap();
        assert_eq!(d.primary.icon.as_deref(), Some("CAT1"));
        assert_eq!(d.primary.name.as_deref(), Some("Felix"));
    }

    #[test]
    fn separator_icon_is_stripped() {
        let buf = with_body(b"DOG_2!Rex\x00");
        let d = decode_null_terminated(&buf, &rec(0)).unwrap();
        assert_eq!(d.primary.icon.as_deref(), Some("DOG_2"));
        assert_eq!(d.primary.name.as_deref(), Some("Rex"));
    }

    #[test]
    fn offset_name_uses_wide_speech_length() {
        let mut body = vec![4u8]; // name length
        body.extend_from_slice(&6u16.to_le_bytes());
        body.extend_from_slice(b"Food");
        body.extend_from_slice(b"hungry");
        let buf = with_body(&body);
        let d = decode_offset_name(&buf, &rec(0xB0)).unwrap();
        assert_eq!(d.primary.name.as_deref(), Some("Food"));
        assert_eq!(d.primary.speech.as_deref(), Some("hungry"));
    }

    #[test]
    fn offset_name_falls_back_on_implausible_wide_length() {
        let mut body = vec![4u8];
        // wide value 0x0305 = 773 > 200, low byte 5 is the real length
        body.push(0x05);
        body.push(0x03);
        body.extend_from_slice(b"Food");
        body.extend_from_slice(b"yummy and more bytes");
        let buf = with_body(&body);
        let d = decode_offset_name(&buf, &rec(0xB0)).unwrap();
        assert_eq!(d.primary.speech.as_deref(), Some("yummy"));
    }

    #[test]
    fn simple_speech_truncates_name_at_line_terminator() {
        let mut body = vec![60u8]; // nominal length far past the real name
        body.extend_from_slice(b"Breakfast\r\nI want breakfast now\x00rest");
        let buf = with_body(&body);
        let d = decode_simple_speech(&buf, &rec(70)).unwrap();
        assert_eq!(d.primary.name.as_deref(), Some("Breakfast"));
        assert_eq!(d.primary.speech.as_deref(), Some("I want breakfast now"));
        assert!(d.secondary.is_none());
    }

    #[test]
    fn simple_speech_splits_caret_secondary() {
        let mut body = vec![6u8];
        body.extend_from_slice(b"Lunch\nlet us eat^Dinner\x00");
        let buf = with_body(&body);
        let d = decode_simple_speech(&buf, &rec(70)).unwrap();
        assert_eq!(d.primary.name.as_deref(), Some("Lunch"));
        assert_eq!(d.primary.speech.as_deref(), Some("let us eat"));
        let second = d.secondary.expect("split-off button");
        assert_eq!(second.name.as_deref(), Some("Dinner"));
        assert_eq!(second.speech.as_deref(), Some("let us eat"));
        assert_eq!(second.sequence, d.primary.sequence + 1);
    }

    #[test]
    fn simple_speech_ignores_duplicated_caret_name() {
        let mut body = vec![6u8];
        body.extend_from_slice(b"Lunch\nlet us eat^lunch\x00");
        let buf = with_body(&body);
        let d = decode_simple_speech(&buf, &rec(70)).unwrap();
        assert!(d.secondary.is_none());
        assert_eq!(d.primary.speech.as_deref(), Some("let us eat"));
    }

    #[test]
    fn simple_speech_drops_secondary_at_sequence_limit() {
        let mut body = vec![6u8];
        body.extend_from_slice(b"Lunch\nlet us eat^Dinner\x00");
        let buf = with_body(&body);
        let mut r = rec(70);
        r.sequence = u8::MAX;
        let d = decode_simple_speech(&buf, &r).unwrap();
        assert!(d.secondary.is_none());
    }

    #[test]
    fn complex_record_is_marker_led() {
        let mut body = vec![0x1B, 0x43, 0x44]; // CLEAR-DISPLAY
        body.extend_from_slice(b"Clear");
        body.push(0);
        let buf = with_body(&body);
        let d = decode_complex(&buf, &rec(0x87)).unwrap();
        assert_eq!(d.primary.functions, vec![Function::ClearDisplay]);
        assert_eq!(d.primary.name.as_deref(), Some("Clear"));
        assert_eq!(d.primary.speech, None);
    }

    #[test]
    fn go_back_buttons_never_keep_speech() {
        let mut body = b"bye now".to_vec();
        body.extend_from_slice(&[0x1B, 0x42, 0x4B]); // GO-BACK
        body.push(0);
        let buf = with_body(&body);
        let d = decode_null_terminated(&buf, &rec(0)).unwrap();
        assert_eq!(d.primary.navigation_type, NavigationType::GoBack);
        assert_eq!(d.primary.speech, None);
        assert_eq!(d.primary.navigation_target, None);
    }

    #[test]
    fn trailing_garbage_is_stripped() {
        assert_eq!(strip_trailing_garbage("hello ~"), "hello");
        assert_eq!(strip_trailing_garbage("hello ~ #"), "hello");
        assert_eq!(strip_trailing_garbage("hello"), "hello");
        assert_eq!(strip_trailing_garbage("ok 2"), "ok 2");
    }

    #[test]
    fn truncated_record_errors_instead_of_panicking() {
        let buf = vec![0xEE; BODY_OFFSET]; // marker present, body missing
        assert!(decode_standard(&buf, &rec(3)).is_err());
        assert!(decode_offset_name(&buf, &rec(0xB0)).is_err());
        assert!(decode_simple_speech(&buf, &rec(70)).is_err());
        assert!(decode_null_terminated(&buf, &rec(0)).is_err());
        assert!(decode_complex(&buf, &rec(0x87)).is_err());
    }
}
