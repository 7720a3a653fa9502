//! Property lists: the typed value tree, the XML writer and a strict reader.

pub mod reader;
pub mod value;
pub mod writer;

pub use reader::parse;
pub use value::{ConfigNode, Dict};
pub use writer::{escape, serialize};
