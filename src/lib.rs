//! Decode-and-resolve pipeline for legacy talker pageset containers:
//! unwraps the compressed container, recovers button records from the
//! five known body layouts, interprets in-band control markers, and links
//! name-based navigation references into a concrete page graph.

#[macro_use]
extern crate lazy_static;

pub mod button;
pub mod container;
pub mod formats;
pub mod markers;
pub mod overlay;
pub mod pageset;
pub mod record;
pub mod resolver;

pub use crate::container::ContainerError;
pub use crate::pageset::{decode_page_set, Page, PageSet};
