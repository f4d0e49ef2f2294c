//! Document tree: arena storage and the content-document parser.

mod arena;
mod parser;

pub use arena::{ChildrenIter, Descendants, Dom, Element, Node, NodeData, NodeId, TITLE_TAG};
pub use parser::parse_dtbook;
