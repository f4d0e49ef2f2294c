//! Book navigation: the traversal state machine over the document tree,
//! the table of contents and the page list.
//!
//! The navigator always rests on a *speakable* element (one with an id and
//! either a timing reference or alt text, other than the title node). Plain
//! moves walk the document in pre-order, skipping everything that cannot be
//! spoken; heading and page moves jump through the navigation lists and then
//! resolve back to a speakable element.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::book::Book;
use crate::config::{MAX_HEADING_LEVELS, ReaderConfig};
use crate::dom::{Dom, NodeId};
use crate::error::{Error, Result};
use crate::nav::{Heading, PageReference};

/// Current position within a book.
#[derive(Debug, Clone)]
pub struct BookNavigator {
    book: Arc<Book>,
    current: Option<NodeId>,
    at_start: bool,
    at_end: bool,
    first: Option<NodeId>,
    last: Option<NodeId>,
    heading_levels: u8,
    /// Speakable element each page resolves to, parallel to the page list.
    page_elements: Vec<Option<NodeId>>,
}

/// Owning heading of the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SectionHeading {
    /// Index into the flattened heading list.
    index: usize,
    /// The current element is the heading's own content.
    at_boundary: bool,
}

impl BookNavigator {
    /// Start at the first speakable element of `book`.
    pub fn new(book: Arc<Book>, config: &ReaderConfig) -> Self {
        let dom = book.dom();
        let mut speakable = dom.elements().filter(|&n| dom.is_speakable(n));
        let first = speakable.next();
        let last = speakable.last().or(first);

        let page_elements = book
            .pages()
            .pages()
            .iter()
            .map(|page| resolve_timing_ref(dom, &page.timing_ref))
            .collect();

        Self {
            current: first,
            at_start: true,
            at_end: first.is_none(),
            first,
            last,
            heading_levels: config.heading_levels.min(MAX_HEADING_LEVELS),
            page_elements,
            book,
        }
    }

    pub fn book(&self) -> &Arc<Book> {
        &self.book
    }

    pub fn current_element(&self) -> Option<NodeId> {
        self.current
    }

    pub fn current_element_id(&self) -> Option<&str> {
        self.current.and_then(|n| self.book.dom().element_id(n))
    }

    /// Move to the element with this id; see [`BookNavigator::seek_to_element_id`].
    pub fn set_current_element_id(&mut self, id: &str) -> Result<()> {
        self.seek_to_element_id(id)
    }

    pub fn current_timing_ref(&self) -> Option<&str> {
        self.current.and_then(|n| self.book.dom().timing_ref(n))
    }

    pub fn at_start_of_book(&self) -> bool {
        self.at_start
    }

    pub fn at_end_of_book(&self) -> bool {
        self.at_end
    }

    /// First speakable element of the book.
    pub fn first_element(&self) -> Option<NodeId> {
        self.first
    }

    /// Last speakable element of the book.
    pub fn last_element(&self) -> Option<NodeId> {
        self.last
    }

    pub fn heading_levels(&self) -> u8 {
        self.heading_levels
    }

    /// Set the heading-levels setting, clamped to 0..=6.
    pub fn set_heading_levels(&mut self, levels: u8) {
        if levels > MAX_HEADING_LEVELS {
            warn!(levels, "heading levels out of range, clamping");
        }
        self.heading_levels = levels.min(MAX_HEADING_LEVELS);
    }

    fn set_position(&mut self, node: NodeId) {
        self.current = Some(node);
        self.at_start = false;
        self.at_end = false;
        debug!(id = self.current_element_id(), "navigator moved");
    }

    // ------------------------------------------------------------------
    // Sequential moves
    // ------------------------------------------------------------------

    /// Advance to the next speakable element in document order.
    ///
    /// Descendants of the current element come first, then following
    /// siblings of it and of its ancestors. With nothing left, the position
    /// is kept and the end-of-book flag is raised.
    pub fn move_next(&mut self) {
        if self.at_end {
            return;
        }
        let Some(current) = self.current else {
            self.at_end = true;
            return;
        };

        let dom = self.book.dom();
        let mut node = dom.next_in_order(current);
        while node.is_some() && !dom.is_speakable(node) {
            node = dom.next_in_order(node);
        }

        if node.is_some() {
            self.current = Some(node);
            self.at_start = false;
            debug!(id = self.current_element_id(), "move next");
        } else {
            self.at_end = true;
            debug!("end of book");
        }
    }

    /// Step back to the previous speakable element in document order.
    ///
    /// A preceding sibling contributes its last speakable descendant before
    /// itself; once the siblings are exhausted the parent is considered.
    pub fn move_previous(&mut self) {
        if self.at_start {
            return;
        }
        let Some(current) = self.current else {
            self.at_start = true;
            return;
        };

        let dom = self.book.dom();
        let mut node = dom.prev_in_order(current);
        while node.is_some() && !dom.is_speakable(node) {
            node = dom.prev_in_order(node);
        }

        if node.is_some() {
            self.current = Some(node);
            self.at_end = false;
            debug!(id = self.current_element_id(), "move previous");
        } else {
            self.at_start = true;
            debug!("start of book");
        }
    }

    /// Jump to the first speakable element.
    pub fn seek_to_start(&mut self) {
        if let Some(first) = self.first {
            self.set_position(first);
            self.at_start = true;
        }
    }

    /// Jump to the last speakable element.
    pub fn seek_to_end(&mut self) {
        if let Some(last) = self.last {
            self.set_position(last);
            self.at_end = true;
        }
    }

    // ------------------------------------------------------------------
    // Seeks
    // ------------------------------------------------------------------

    /// Move to the element with this id, or to its first speakable
    /// descendant when the element itself cannot be spoken.
    pub fn seek_to_element_id(&mut self, id: &str) -> Result<()> {
        let dom = self.book.dom();
        let node = dom
            .get_by_id(id)
            .ok_or_else(|| Error::NotFound(format!("no element with id {id}")))?;
        let target = dom
            .resolve_speakable(node)
            .ok_or_else(|| Error::NotFound(format!("no speakable content at element {id}")))?;
        self.set_position(target);
        Ok(())
    }

    /// Move to the first element carrying this timing reference that
    /// resolves to speakable content.
    pub fn seek_to_smil_reference(&mut self, timing_ref: &str) -> Result<()> {
        let target = resolve_timing_ref(self.book.dom(), timing_ref)
            .ok_or_else(|| Error::NotFound(format!("no element with timing reference {timing_ref}")))?;
        self.set_position(target);
        Ok(())
    }

    /// Move to the content of the heading with this id.
    pub fn seek_to_heading_by_id(&mut self, id: &str) -> Result<()> {
        let book = Arc::clone(&self.book);
        let heading = book
            .toc()
            .heading_by_id(id)
            .ok_or_else(|| Error::NotFound(format!("no heading with id {id}")))?;
        self.seek_to_heading(heading)
    }

    fn seek_to_heading(&mut self, heading: &Heading) -> Result<()> {
        self.seek_to_smil_reference(&heading.timing_ref)
            .map_err(|_| dangling("heading", &heading.id, &heading.timing_ref))
    }

    /// Move to page `number` (1-based, in play order). Returns false when
    /// the page does not exist or points at no speakable content.
    pub fn seek_to_page_num(&mut self, number: usize) -> bool {
        match number.checked_sub(1).and_then(|i| self.page_elements.get(i).copied()) {
            Some(Some(target)) => {
                self.set_position(target);
                true
            }
            Some(None) => {
                warn!(page = number, "page points at no speakable content");
                false
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Heading navigation
    // ------------------------------------------------------------------

    /// Heading of the section containing the current element.
    ///
    /// `None` when the current element precedes every heading, as front
    /// matter page numbers do.
    pub fn current_section_heading(&self) -> Option<&Heading> {
        self.section_heading()
            .map(|section| &self.book.toc().flat()[section.index])
    }

    fn section_heading(&self) -> Option<SectionHeading> {
        let current = self.current?;
        let dom = self.book.dom();
        let toc = self.book.toc();

        if let Some(timing_ref) = dom.timing_ref(current)
            && let Some(index) = toc.index_of_timing_ref(timing_ref)
        {
            return Some(SectionHeading {
                index,
                at_boundary: true,
            });
        }

        let current_order = dom.document_order(current);
        for ancestor in dom.ancestors(current).filter(|&a| is_level(dom, a)) {
            let found = dom
                .descendants(ancestor)
                .take_while(|&d| dom.document_order(d) <= current_order)
                .find_map(|d| dom.timing_ref(d).and_then(|r| toc.index_of_timing_ref(r)));
            if let Some(index) = found {
                return Some(SectionHeading {
                    index,
                    at_boundary: false,
                });
            }
        }
        None
    }

    /// Move up one heading.
    ///
    /// From inside a section this goes to the section's own heading; from a
    /// heading it goes to the previous heading. Before the first heading it
    /// steps backward until some content resolves to a section or the start
    /// of the book is reached.
    pub fn up_level(&mut self) {
        match self.section_heading() {
            Some(section) => {
                let target = if section.at_boundary {
                    match section.index.checked_sub(1) {
                        Some(previous) => previous,
                        None => return,
                    }
                } else {
                    section.index
                };
                self.seek_to_heading_index(target);
            }
            None => {
                // Each step either moves back one speakable element or
                // raises the start flag, so the element count bounds it.
                let limit = self.book.dom().len();
                for _ in 0..limit {
                    let before = self.current;
                    self.move_previous();
                    if self.at_start || self.current == before {
                        break;
                    }
                    if self.section_heading().is_some() {
                        break;
                    }
                }
            }
        }
    }

    /// Move to the heading after the current section's heading. Outside any
    /// listed section, move to the first heading that follows the current
    /// element. A no-op when no heading follows.
    pub fn down_level(&mut self) {
        let next = match self.section_heading() {
            Some(section) => Some(section.index + 1),
            None => self.first_heading_after_current(),
        };
        if let Some(next) = next
            && next < self.book.toc().len()
        {
            self.seek_to_heading_index(next);
        }
    }

    fn first_heading_after_current(&self) -> Option<usize> {
        let dom = self.book.dom();
        let current_order = self.current.map(|c| dom.document_order(c));
        self.book.toc().flat().iter().position(|heading| {
            resolve_timing_ref(dom, &heading.timing_ref)
                .map(|n| dom.document_order(n))
                .is_some_and(|order| current_order.is_none_or(|c| order > c))
        })
    }

    fn seek_to_heading_index(&mut self, index: usize) {
        let book = Arc::clone(&self.book);
        if let Some(heading) = book.toc().flat().get(index)
            && let Err(e) = self.seek_to_heading(heading)
        {
            warn!(error = %e, "heading navigation failed");
        }
    }

    // ------------------------------------------------------------------
    // Page navigation
    // ------------------------------------------------------------------

    /// Index of the page containing the current element: the last page
    /// boundary at or before it in document order.
    pub fn current_page(&self) -> Option<usize> {
        let current = self.current?;
        let dom = self.book.dom();
        let current_order = dom.document_order(current);
        self.page_elements
            .iter()
            .enumerate()
            .filter_map(|(i, el)| el.map(|el| (i, dom.document_order(el))))
            .filter(|&(_, order)| order <= current_order)
            .max_by_key(|&(i, order)| (order, i))
            .map(|(i, _)| i)
    }

    /// Page reference of the current page.
    pub fn current_page_reference(&self) -> Option<&PageReference> {
        self.current_page().and_then(|i| self.book.pages().pages().get(i))
    }

    /// Move to the start of the next page; a no-op at the last page.
    pub fn next_page(&mut self) {
        let start = self.current_page().map_or(0, |i| i + 1);
        let target = self.page_elements.iter().skip(start).find_map(|el| *el);
        if let Some(target) = target {
            self.set_position(target);
        }
    }

    /// Move to the start of the current page, or to the previous page when
    /// already on a page boundary.
    pub fn prev_page(&mut self) {
        let Some(page) = self.current_page() else {
            return;
        };
        let end = if self.page_elements[page] == self.current {
            page
        } else {
            page + 1
        };
        let target = self.page_elements[..end].iter().rev().find_map(|el| *el);
        if let Some(target) = target {
            self.set_position(target);
        }
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Elements with a timing reference whose text contains `query`,
    /// ignoring case, in document order. An empty query matches nothing.
    pub fn search_for_string(&self, query: &str) -> Vec<NodeId> {
        if query.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        let dom = self.book.dom();
        dom.elements()
            .filter(|&n| dom.timing_ref(n).is_some())
            .filter(|&n| dom.text_content(n).to_lowercase().contains(&needle))
            .collect()
    }
}

/// First element carrying `timing_ref` that is, or contains, speakable content.
fn resolve_timing_ref(dom: &Dom, timing_ref: &str) -> Option<NodeId> {
    dom.elements_with_timing_ref(timing_ref)
        .iter()
        .find_map(|&n| dom.resolve_speakable(n))
}

/// `level`, `level1` .. `level6` section containers.
fn is_level(dom: &Dom, node: NodeId) -> bool {
    dom.element_name(node)
        .and_then(|name| name.strip_prefix("level"))
        .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
}

fn dangling(kind: &str, id: &str, timing_ref: &str) -> Error {
    Error::StructuralInvariant(format!(
        "{kind} {id} points at {timing_ref}, which has no speakable content"
    ))
}
