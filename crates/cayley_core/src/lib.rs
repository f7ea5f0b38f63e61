//! The `cayley_core` crate computes every isolated complex solution of a
//! generic square sparse polynomial system with the polyhedral homotopy.
//!
//! Key components:
//! - **Geometry**: exact lattice arithmetic (`lattice`) and Givens QR based
//!   dense linear algebra over `f64` and `Complex<f64>` (`linalg`).
//! - **Subdivision**: Cayley embedding of the supports and an incremental
//!   placing triangulation whose mixed cells give the mixed volume.
//! - **Start systems**: binomial systems of mixed cells solved through a
//!   Hermite normal form.
//! - **Tracking**: an adaptive arclength tracker and an Euler/Newton tracker
//!   behind the `PathTracker` trait.
//! - **Solve**: `solve` ties everything together; `solutions` filters the
//!   endpoints.
pub mod aset;
pub mod binomial;
pub mod cayley;
pub mod geometry;
pub mod homotopy;
pub mod psys;
pub mod solutions;
pub mod solve;
pub mod subdivision;
pub mod tracker;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_utils;

pub use aset::{Aset, PointConfig, PointKey};
pub use homotopy::HomotopyPoint;
pub use solve::{solve, SolveReport, SolveRequest, SolveResult, SolveSettings};
