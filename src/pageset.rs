use crate::button::Button;
use crate::container::{self, ContainerError};
use crate::overlay;
use crate::record;
use crate::resolver::{self, PageNames};
use indexmap::IndexMap;
use log::info;
use serde::Serialize;
use std::fmt;

/// Device-template pages carry these names and mean nothing to the end
/// user; they are dropped from the output entirely.
pub const PLACEHOLDER_PAGE_PREFIXES: [&str; 3] = ["untitled", "template", "scratch"];

/// One reconstructed page: its buttons in decode order plus the display
/// name inferred from the metadata range.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub page_id: String,
    pub inferred_name: String,
    pub button_count: usize,
    pub buttons: Vec<Button>,
}

/// The decoded page graph, the data contract downstream consumers
/// (schema mappers, exporters) build on.
#[derive(Debug, Serialize)]
pub struct PageSet {
    /// Real pages, keyed by id, in first-seen order.
    pub pages: IndexMap<String, Page>,
    /// Pages from the reserved 0x4xxx range; they only exist to supply
    /// names for real pages and are never navigable destinations.
    pub metadata_pages: IndexMap<String, Page>,
    /// Decoded-record count per format label.
    pub format_stats: IndexMap<String, usize>,
    /// Records whose marker was found but whose body would not decode.
    pub skipped_records: usize,
}

/// Decode one pageset file into its page/button graph.
///
/// Pure function from bytes to graph; the only fatal failure is a bad
/// container. Everything past the wrapper degrades per-record.
pub fn decode_page_set(bytes: &[u8]) -> Result<PageSet, ContainerError> {
    let buf = container::unwrap_container(bytes)?;
    let overlays = overlay::scan_overlays(&buf);
    let scan = record::scan_records(&buf);
    let mut buttons = scan.buttons;
    let names = resolver::resolve(&mut buttons, &overlays);
    let set = assemble(buttons, &names, scan.format_stats, scan.skipped_records);
    info!(
        "decoded {} pages ({} metadata), {} skipped records",
        set.pages.len(),
        set.metadata_pages.len(),
        set.skipped_records
    );
    Ok(set)
}

/// Group resolved buttons into pages and partition the output.
pub fn assemble(
    buttons: Vec<Button>,
    names: &PageNames,
    format_stats: IndexMap<String, usize>,
    skipped_records: usize,
) -> PageSet {
    let mut pages: IndexMap<String, Page> = IndexMap::new();
    let mut metadata_pages: IndexMap<String, Page> = IndexMap::new();

    for b in buttons {
        let bucket = if resolver::is_metadata_id(&b.page_id) {
            &mut metadata_pages
        } else {
            &mut pages
        };
        let page = bucket.entry(b.page_id.clone()).or_insert_with(|| Page {
            page_id: b.page_id.clone(),
            inferred_name: names
                .inferred_name(&b.page_id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("page {}", b.page_id)),
            button_count: 0,
            buttons: Vec::new(),
        });
        page.buttons.push(b);
        page.button_count += 1;
    }

    pages.retain(|_, page| {
        let name = page.inferred_name.to_lowercase();
        !PLACEHOLDER_PAGE_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
    });

    PageSet {
        pages,
        metadata_pages,
        format_stats,
        skipped_records,
    }
}

fn is_page_id(text: &str) -> bool {
    text.len() == 4 && text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

impl PageSet {
    /// Buttons whose navigation target never resolved to a page id.
    /// Dangling references are expected in real device output; they are
    /// surfaced as data, not errors.
    pub fn unresolved_targets(&self) -> Vec<(&str, u8, &str)> {
        let mut out = Vec::new();
        for page in self.pages.values() {
            for b in &page.buttons {
                if let Some(target) = &b.navigation_target {
                    if !is_page_id(target) {
                        out.push((page.page_id.as_str(), b.sequence, target.as_str()));
                    }
                }
            }
        }
        out
    }

    pub fn button_count(&self) -> usize {
        self.pages.values().map(|p| p.button_count).sum()
    }
}

impl fmt::Display for PageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pages:              {}", self.pages.len())?;
        writeln!(f, "Metadata pages:     {}", self.metadata_pages.len())?;
        writeln!(f, "Buttons:            {}", self.button_count())?;
        writeln!(f, "Skipped records:    {}", self.skipped_records)?;
        write!(f, "Formats:           ")?;
        for (label, count) in &self.format_stats {
            write!(f, " {}={}", label, count)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Unresolved targets: {}",
            self.unresolved_targets().len()
        )
    }
}
