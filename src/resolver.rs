use crate::button::{Button, NavigationType};
use crate::overlay::OverlayMap;
use log::{debug, trace, warn};
use std::collections::{HashMap, HashSet};

/// Navigation resolver / graph linker.
///
/// The source format stores forward references to pages as free text: a
/// page name embedded in speech, a name-keyed overlay override, a name
/// captured from a SET-PAGE marker. A second pass over the fully
/// decoded button set converts them into concrete page ids. The steps run
/// in a fixed order over immutable name-map snapshots; running the
/// resolver again on an already-resolved arena changes nothing.
///
/// Several of the text patterns below reproduce uncertain fixes for
/// specific corruption observed in device output. They are deliberately
/// not generalized past what was observed.

/// Stored page names sometimes carry this literal prefix; lookups
/// tolerate it on either side.
pub const ZERO_SPACE_PREFIX: &str = "0 ";

/// Metadata pages live at 0x4000-0x4fff and exist only to name others.
const METADATA_BASE: u16 = 0x4000;

pub fn is_metadata_id(page_id: &str) -> bool {
    page_id.starts_with('4')
}

/// Immutable snapshot of page names, built after decode completes and
/// before any lookup happens.
pub struct PageNames {
    /// page id -> inferred name, for pages actually named.
    names: HashMap<String, String>,
    /// normalized name (and zero-space-stripped variant) -> page id.
    by_name: HashMap<String, String>,
    /// every real page id present in the arena.
    known_ids: HashSet<String>,
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

impl PageNames {
    fn build(buttons: &[Button]) -> PageNames {
        let known_ids: HashSet<String> = buttons
            .iter()
            .filter(|b| !is_metadata_id(&b.page_id))
            .map(|b| b.page_id.clone())
            .collect();

        let mut names: HashMap<String, String> = HashMap::new();
        let mut by_name: HashMap<String, String> = HashMap::new();
        for b in buttons.iter().filter(|b| is_metadata_id(&b.page_id)) {
            let name = match &b.name {
                Some(n) => n,
                None => continue,
            };
            let meta = match u16::from_str_radix(&b.page_id, 16) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let real = ((meta - METADATA_BASE) & 0xff00) | b.sequence as u16;
            let real_id = format!("{:04x}", real);
            if !known_ids.contains(&real_id) {
                trace!(
                    "metadata name {:?} targets absent page {}, ignored",
                    name,
                    real_id
                );
                continue;
            }
            if names.contains_key(&real_id) {
                continue;
            }
            names.insert(real_id.clone(), name.clone());

            let key = normalize(name);
            if let Some(stripped) = key.strip_prefix(ZERO_SPACE_PREFIX) {
                by_name
                    .entry(stripped.trim().to_string())
                    .or_insert_with(|| real_id.clone());
            }
            by_name.entry(key).or_insert(real_id);
        }

        PageNames {
            names,
            by_name,
            known_ids,
        }
    }

    /// The inferred display name of a page, if one was assigned.
    pub fn inferred_name(&self, page_id: &str) -> Option<&str> {
        self.names.get(page_id).map(|s| s.as_str())
    }

    pub fn is_known_id(&self, id: &str) -> bool {
        self.known_ids.contains(id)
    }

    /// Resolve free text to a page id, tolerating the zero-space prefix.
    pub fn lookup(&self, text: &str) -> Option<&str> {
        let key = normalize(text);
        if let Some(id) = self.by_name.get(&key) {
            return Some(id);
        }
        key.strip_prefix(ZERO_SPACE_PREFIX)
            .and_then(|stripped| self.by_name.get(stripped.trim()))
            .map(|s| s.as_str())
    }
}

/// Run all resolution steps over the arena. Returns the page-name
/// snapshot so the assembler can label pages.
pub fn resolve(buttons: &mut [Button], overlays: &OverlayMap) -> PageNames {
    // step 1: name-keyed overlay overrides
    for b in buttons.iter_mut() {
        if let Some(name) = &b.name {
            if let Some(entry) = overlays.get(&name.to_lowercase()) {
                trace!(
                    "overlay override on {:?}: -> {:?}",
                    name,
                    entry.navigation_target_name
                );
                b.navigation_type = NavigationType::Permanent;
                b.navigation_target = Some(entry.navigation_target_name.clone());
            }
        }
    }

    // step 2: page-name snapshot from the metadata range
    let names = PageNames::build(buttons);

    // steps 3 and 4: implicit and speech-embedded navigation
    for b in buttons.iter_mut() {
        implicit_same_name(b, &names);
        speech_embedded(b, &names);
    }

    // step 5: raw targets -> page ids where possible
    for b in buttons.iter_mut() {
        normalize_target(b, &names);
    }

    names
}

/// A button that says exactly its own name and has no navigation is a
/// jump to the page of that name, if one exists.
fn implicit_same_name(b: &mut Button, names: &PageNames) {
    if b.navigation_type != NavigationType::None {
        return;
    }
    let (name, speech) = match (&b.name, &b.speech) {
        (Some(n), Some(s)) => (n, s),
        _ => return,
    };
    if !speech.eq_ignore_ascii_case(name) {
        return;
    }
    if let Some(id) = names.lookup(name) {
        b.navigation_target = Some(id.to_string());
        b.navigation_type = NavigationType::Permanent;
        b.speech = None;
    }
}

/// Ordered speech-pattern heuristics; the first whose captured text
/// resolves to a known page wins.
fn speech_embedded(b: &mut Button, names: &PageNames) {
    if b.navigation_type != NavigationType::None {
        return;
    }
    let speech = match &b.speech {
        Some(s) => s.clone(),
        None => return,
    };

    let hit = try_trailing_paren(&speech, names)
        .or_else(|| try_trailing_zero_name(&speech, names))
        .or_else(|| try_leading_colon(&speech, names))
        .or_else(|| try_colon_with_suffix(&speech, names))
        .or_else(|| try_stray_char(&speech, names))
        .or_else(|| try_trailing_words(&speech, names));

    if let Some((page_id, remaining)) = hit {
        debug!(
            "speech-embedded navigation on {:?}: {:?} -> {}",
            b.name, speech, page_id
        );
        b.navigation_type = NavigationType::Permanent;
        b.navigation_target = Some(page_id);
        let remaining = remaining.trim().to_string();
        b.speech = if remaining.is_empty() {
            None
        } else {
            Some(remaining)
        };
        clear_duplicate_speech(b, names);
    }
}

/// Trailing parenthesized page name: `pass the salt (Kitchen)`.
fn try_trailing_paren(s: &str, names: &PageNames) -> Option<(String, String)> {
    let trimmed = s.trim_end();
    if !trimmed.ends_with(')') {
        return None;
    }
    let open = trimmed.rfind('(')?;
    let inner = &trimmed[open + 1..trimmed.len() - 1];
    let id = names.lookup(inner)?;
    Some((id.to_string(), trimmed[..open].trim_end().to_string()))
}

/// Trailing `0 <name>`: the zero-space literal leaking into speech.
fn try_trailing_zero_name(s: &str, names: &PageNames) -> Option<(String, String)> {
    if let Some(pos) = s.rfind(" 0 ") {
        let cand = &s[pos + 3..];
        if let Some(id) = names.lookup(cand) {
            return Some((id.to_string(), s[..pos].to_string()));
        }
    }
    if let Some(cand) = s.strip_prefix(ZERO_SPACE_PREFIX) {
        let id = names.lookup(cand)?;
        return Some((id.to_string(), String::new()));
    }
    None
}

/// Leading colon with the whole remainder naming a page: `:Kitchen`.
fn try_leading_colon(s: &str, names: &PageNames) -> Option<(String, String)> {
    let rest = s.strip_prefix(':')?;
    let id = names.lookup(rest)?;
    Some((id.to_string(), String::new()))
}

/// Leading colon where the page name is followed by descriptive text:
/// `:Kitchen things we cook with`. Longest word-prefix wins.
fn try_colon_with_suffix(s: &str, names: &PageNames) -> Option<(String, String)> {
    let rest = s.strip_prefix(':')?;
    let words: Vec<&str> = rest.split_whitespace().collect();
    for k in (1..words.len()).rev() {
        let cand = words[..k].join(" ");
        if let Some(id) = names.lookup(&cand) {
            return Some((id.to_string(), words[k..].join(" ")));
        }
    }
    None
}

/// A single stray non-alphanumeric character at the end of an otherwise
/// exact page name: `Kitchen.`
fn try_stray_char(s: &str, names: &PageNames) -> Option<(String, String)> {
    let trimmed = s.trim_end();
    let last = trimmed.chars().last()?;
    if last.is_alphanumeric() || trimmed.chars().count() < 2 {
        return None;
    }
    let cand: String = trimmed[..trimmed.len() - last.len_utf8()].trim_end().to_string();
    let id = names.lookup(&cand)?;
    Some((id.to_string(), String::new()))
}

/// Trailing multi-word page name, possibly with one stray character
/// after it: `I want to see the 4 legged friends~` where the page is
/// `4 legged friends`. Longest suffix wins.
fn try_trailing_words(s: &str, names: &PageNames) -> Option<(String, String)> {
    let mut t = s.trim_end();
    if let Some(last) = t.chars().last() {
        if !last.is_alphanumeric() {
            t = t[..t.len() - last.len_utf8()].trim_end();
        }
    }
    let words: Vec<&str> = t.split_whitespace().collect();
    for start in 1..words.len() {
        let cand = words[start..].join(" ");
        if let Some(id) = names.lookup(&cand) {
            return Some((id.to_string(), words[..start].join(" ")));
        }
    }
    None
}

/// Step 5: a target that is not a known page id gets one more chance as
/// a page name; failing that it stays raw and is reported as data
/// quality, not as an error.
fn normalize_target(b: &mut Button, names: &PageNames) {
    let target = match &b.navigation_target {
        Some(t) => t.clone(),
        None => return,
    };
    if names.is_known_id(&target) {
        return;
    }
    match names.lookup(&target) {
        Some(id) => {
            b.navigation_target = Some(id.to_string());
            clear_duplicate_speech(b, names);
        }
        None => {
            warn!(
                "unresolved navigation target {:?} on page {} button {}",
                target, b.page_id, b.sequence
            );
        }
    }
}

/// Navigation-only buttons do not speak their destination: drop speech
/// that just repeats the target page's label.
fn clear_duplicate_speech(b: &mut Button, names: &PageNames) {
    let (speech, target) = match (&b.speech, &b.navigation_target) {
        (Some(s), Some(t)) => (s, t),
        _ => return,
    };
    if let Some(label) = names.inferred_name(target) {
        let label = normalize(label);
        let label = label.strip_prefix(ZERO_SPACE_PREFIX).unwrap_or(&label);
        let spoken = normalize(speech);
        if spoken == label {
            b.speech = None;
        }
    }
}
