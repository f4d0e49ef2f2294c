//! # talkbook
//!
//! Navigation and playback synchronization for DAISY talking books.
//!
//! ## Features
//!
//! - Parse DTBook content documents into an arena document tree
//! - Parse NCX navigation documents into a table of contents and page list
//! - Walk the book element by element, by heading or by page
//! - Resolve each position to its text and its audio clip through SMIL
//!   timing documents, discarding results made stale by newer moves
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use talkbook::{Book, BookNavigator, ReaderConfig};
//!
//! let config = ReaderConfig::default();
//! let book = Book::open("book/dtbook.xml", Some(Path::new("book/navigation.ncx")), &config).unwrap();
//! let mut navigator = BookNavigator::new(Arc::new(book), &config);
//!
//! navigator.down_level();
//! while !navigator.at_end_of_book() {
//!     println!("{:?}", navigator.current_element_id());
//!     navigator.move_next();
//! }
//! ```
//!
//! ## Building Phrases
//!
//! [`PlayerState`] turns the navigator's position into a [`Phrase`]. Timing
//! documents and audio are fetched through a [`ResourceLoader`]:
//!
//! ```
//! use std::sync::Arc;
//! use talkbook::{Book, BookNavigator, MemoryLoader, Phrase, PlayerState, ReaderConfig};
//!
//! let config = ReaderConfig::default();
//! let book = Book::from_xml(
//!     r#"<dtbook><book><p><sent id="s1" smilref="a.smil#s1">Kia ora.</sent></p></book></dtbook>"#,
//!     None,
//!     &config,
//! ).unwrap();
//! let navigator = BookNavigator::new(Arc::new(book), &config);
//!
//! let loader = MemoryLoader::new()
//!     .with("a.smil", r#"<smil><body><par id="s1"><audio src="a.mp3" clipBegin="0s" clipEnd="1s"/></par></body></smil>"#)
//!     .with("a.mp3", b"audio".to_vec());
//!
//! let mut spoken = Vec::new();
//! let mut player = PlayerState::new(
//!     Arc::new(loader),
//!     |phrase: Phrase, _resume: bool| spoken.push(phrase.text),
//!     &config,
//! );
//! player.request_phrase(&navigator);
//! futures::executor::block_on(player.settle());
//! drop(player);
//! assert_eq!(spoken, vec!["Kia ora.".to_string()]);
//! ```

pub mod book;
pub mod config;
pub mod dom;
pub mod error;
pub mod io;
pub mod nav;
pub mod navigator;
pub mod player;
pub mod smil;
pub(crate) mod util;

pub use book::Book;
pub use config::ReaderConfig;
pub use dom::{Dom, NodeId};
pub use error::{Error, Result};
pub use io::{DirectoryLoader, MemoryLoader, ResourceLoader};
pub use nav::{Heading, PageList, PageReference, PageType, TableOfContents};
pub use navigator::BookNavigator;
pub use player::{Phrase, PhraseConstructionKit, PhrasePresenter, PlayerMode, PlayerState, Stage};
pub use smil::{AudioClip, AudioSource, TimingDocument};
