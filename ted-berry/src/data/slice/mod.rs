//! 标签体水平切片对象的操作.

mod core;

pub use core::{LabelSlice, LabelSliceMut};
