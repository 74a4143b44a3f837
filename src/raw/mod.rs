mod arena;
mod node;
mod raw_tree;

pub(crate) use arena::Handle;
pub(crate) use node::{Node, SearchResult};
pub(crate) use raw_tree::RawBPlusTree;
