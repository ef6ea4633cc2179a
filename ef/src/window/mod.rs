//! Cyclic window reader
//!
//! A [`Cursor`] walks a fixed-size line range forward through the source and
//! wraps around; a [`WindowSource`] turns a range into numeric samples.

mod cursor;
mod reader;

pub use cursor::{Cursor, LineRange, WindowGeometry};
pub use reader::{
    IndexedReader, ReadStrategy, ScanReader, Window, WindowSource, open_source, parse_field, read_leading, write_window,
};
