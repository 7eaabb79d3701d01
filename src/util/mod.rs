//! Path helpers and test support

pub mod path;
pub mod testing;
