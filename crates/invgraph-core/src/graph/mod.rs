// In-process property graph and the interpreter that runs compiled
// traversals over it. Both the in-process and the script backends sit on
// top of this module.

pub mod interpreter;
pub mod store;

pub use store::{GraphSnapshot, InMemoryGraph};
