//! Exact lattice arithmetic and the small dense factorizations used by the
//! trackers.

pub mod lattice;
pub mod linalg;
