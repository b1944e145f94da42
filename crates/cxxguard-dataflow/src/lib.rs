//! CxxGuard dataflow — the boolean engine and environment model the
//! nullability analysis runs against.
//!
//! The analysis composes boolean formulas over atomic values into a flow
//! condition, and asks whether that condition implies a given formula. The
//! engine here decides implication exhaustively over the atoms that occur,
//! which is exact for the per-function formulas the analyzer builds.

pub mod env;
pub mod formula;

pub use env::{Arena, Environment, LocId, PointerNullState, Value, ValueId};
pub use formula::{BoolEngine, BoolId};
