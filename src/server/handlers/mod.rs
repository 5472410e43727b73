//! 边界处理器

pub mod fileops;
pub mod terminal;
