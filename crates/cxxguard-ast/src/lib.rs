//! CxxGuard AST — the C++ surface consumed by the nullability analyzer.
//!
//! The AST is built in-process by the embedding frontend and handed to the
//! analyzer read-only. This crate provides:
//! - Interned, id-based types with eager canonicalization
//! - Declarations (records, templates, functions, variables, members)
//! - Expressions with a closed cast-kind table
//! - CFG navigation helpers

pub mod ast;
pub mod cfg;
