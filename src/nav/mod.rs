//! Table of contents and page list.
//!
//! Both are built once from the navigation document (NCX) and are read-only
//! afterwards. A book without either is legal; the lists are simply empty.

mod ncx;

pub use ncx::parse_ncx;

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::smil::AudioClip;

/// A table of contents entry (hierarchical).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct Heading {
    pub id: String,
    /// Timing reference of the content this heading points at.
    pub timing_ref: String,
    /// Nesting depth; top-level headings are level 1.
    pub level: u8,
    pub text: String,
    #[cfg_attr(feature = "cli", serde(skip))]
    pub audio_clip: Option<AudioClip>,
    #[cfg_attr(feature = "cli", serde(skip_serializing_if = "Vec::is_empty"))]
    pub sub_headings: Vec<Heading>,
}

impl Heading {
    pub fn new(id: impl Into<String>, timing_ref: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timing_ref: timing_ref.into(),
            level: 0,
            text: text.into(),
            audio_clip: None,
            sub_headings: Vec::new(),
        }
    }

    pub fn with_sub_heading(mut self, heading: Heading) -> Self {
        self.sub_headings.push(heading);
        self
    }
}

/// The heading tree plus its pre-order linearization.
#[derive(Debug, Clone, Default)]
pub struct TableOfContents {
    headings: Vec<Heading>,
    /// Pre-order copy of every heading, without sub-headings.
    flat: Vec<Heading>,
    by_timing_ref: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
}

impl TableOfContents {
    /// Build from top-level headings, assigning levels and flattening.
    pub fn new(mut headings: Vec<Heading>) -> Self {
        assign_levels(&mut headings);
        let flat = flatten(&headings);

        let mut by_timing_ref = HashMap::new();
        let mut by_id = HashMap::new();
        for (index, heading) in flat.iter().enumerate() {
            by_timing_ref.entry(heading.timing_ref.clone()).or_insert(index);
            by_id.entry(heading.id.clone()).or_insert(index);
        }

        Self {
            headings,
            flat,
            by_timing_ref,
            by_id,
        }
    }

    /// Top-level headings.
    pub fn headings(&self) -> &[Heading] {
        &self.headings
    }

    /// All headings in depth-first document order.
    pub fn flat(&self) -> &[Heading] {
        &self.flat
    }

    pub fn len(&self) -> usize {
        self.flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    /// Index into [`TableOfContents::flat`] of the heading with this timing reference.
    pub fn index_of_timing_ref(&self, timing_ref: &str) -> Option<usize> {
        self.by_timing_ref.get(timing_ref).copied()
    }

    pub fn heading_by_id(&self, id: &str) -> Option<&Heading> {
        self.by_id.get(id).map(|&i| &self.flat[i])
    }
}

/// Set each heading's level from its depth, top level being 1.
fn assign_levels(headings: &mut [Heading]) {
    let mut stack: Vec<(&mut Heading, u8)> = headings.iter_mut().map(|h| (h, 1)).collect();
    while let Some((heading, level)) = stack.pop() {
        heading.level = level;
        let child_level = level.saturating_add(1);
        stack.extend(heading.sub_headings.iter_mut().map(|h| (h, child_level)));
    }
}

fn flatten(headings: &[Heading]) -> Vec<Heading> {
    let mut flat = Vec::new();
    let mut stack: Vec<&Heading> = headings.iter().rev().collect();
    while let Some(heading) = stack.pop() {
        flat.push(heading.clone_without_children());
        stack.extend(heading.sub_headings.iter().rev());
    }
    flat
}

impl Heading {
    fn clone_without_children(&self) -> Heading {
        Heading {
            id: self.id.clone(),
            timing_ref: self.timing_ref.clone(),
            level: self.level,
            text: self.text.clone(),
            audio_clip: self.audio_clip.clone(),
            sub_headings: Vec::new(),
        }
    }
}

/// Kind of page a page target marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
#[cfg_attr(feature = "cli", serde(rename_all = "lowercase"))]
pub enum PageType {
    Front,
    #[default]
    Normal,
    Special,
}

impl PageType {
    /// Parse an NCX `type` attribute; unknown values are normal pages.
    pub fn from_attr(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "front" => PageType::Front,
            "special" => PageType::Special,
            _ => PageType::Normal,
        }
    }
}

/// A navigable page boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(serde::Serialize))]
pub struct PageReference {
    /// Position in the book's overall play order.
    pub absolute_order: u32,
    /// Printed page number ("7", "iv").
    pub page_number: String,
    pub page_type: PageType,
    pub timing_ref: String,
    pub text: String,
    #[cfg_attr(feature = "cli", serde(skip))]
    pub audio_clip: Option<AudioClip>,
}

impl Ord for PageReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.absolute_order.cmp(&other.absolute_order)
    }
}

impl PartialOrd for PageReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Page references sorted by absolute play order.
#[derive(Debug, Clone, Default)]
pub struct PageList {
    pages: Vec<PageReference>,
}

impl PageList {
    /// Build from page references in any order.
    pub fn new(mut pages: Vec<PageReference>) -> Self {
        pages.sort();
        Self { pages }
    }

    pub fn pages(&self) -> &[PageReference] {
        &self.pages
    }

    /// Page by 1-based position in play order.
    pub fn page(&self, number: usize) -> Option<&PageReference> {
        number.checked_sub(1).and_then(|i| self.pages.get(i))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
