//! Skeletal composition: flattening a compiled sprite frame against skeleton
//! tables and a character descriptor into an ordered draw list.

pub mod compose;
pub mod descriptor;
pub mod tables;
