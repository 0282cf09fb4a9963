//! Vector-animation container decoding.
//!
//! The on-disk format is a little-endian tag stream: byte-aligned tag headers
//! wrapping bit-packed geometry records, with all coordinates in twips
//! (1/20 px). [`parse::Movie::parse`] turns a byte slice into indexed shape
//! and sprite definitions plus the exported symbol table;
//! [`timeline::compile`] unrolls a sprite's control stream into frames.

pub mod parse;
pub mod shape;
pub(crate) mod tags;
pub mod timeline;

#[cfg(test)]
pub(crate) mod builder;
