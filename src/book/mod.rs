use std::path::Path;

use crate::config::ReaderConfig;
use crate::dom::{Dom, parse_dtbook};
use crate::error::Result;
use crate::nav::{PageList, TableOfContents, parse_ncx};
use crate::util::decode_xml;

/// A loaded talking book: the content document tree plus the navigation
/// structures built from the navigation document.
///
/// Immutable once constructed.
#[derive(Debug, Default)]
pub struct Book {
    dom: Dom,
    toc: TableOfContents,
    pages: PageList,
}

impl Book {
    /// Assemble a book from already-parsed parts.
    ///
    /// Elements with alt text but no id get ids with the default
    /// generated-id prefix.
    pub fn new(mut dom: Dom, toc: TableOfContents, pages: PageList) -> Self {
        dom.normalize_alt_ids(&ReaderConfig::default().generated_id_prefix);
        Self { dom, toc, pages }
    }

    /// Parse a content document and an optional navigation document.
    pub fn from_xml(content: &str, ncx: Option<&str>, config: &ReaderConfig) -> Result<Self> {
        let dom = parse_dtbook(content, config)?;
        let (toc, pages) = match ncx {
            Some(ncx) => parse_ncx(ncx)?,
            None => Default::default(),
        };
        Ok(Self { dom, toc, pages })
    }

    /// Read and parse the content and navigation documents from disk.
    pub fn open(
        content_path: impl AsRef<Path>,
        ncx_path: Option<&Path>,
        config: &ReaderConfig,
    ) -> Result<Self> {
        let content_bytes = std::fs::read(content_path.as_ref())?;
        let ncx_bytes = ncx_path.map(std::fs::read).transpose()?;
        let ncx = ncx_bytes.as_deref().map(decode_xml);
        Self::from_xml(&decode_xml(&content_bytes), ncx.as_deref(), config)
    }

    /// The content document tree.
    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn toc(&self) -> &TableOfContents {
        &self.toc
    }

    pub fn pages(&self) -> &PageList {
        &self.pages
    }
}
