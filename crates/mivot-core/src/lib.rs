//! # MIVOT Core
//!
//! Foundational types shared by the MIVOT reader and the mapping engine:
//!
//! - [`tree`] - An arena of annotation nodes addressed by stable [`tree::NodeId`]s.
//! - [`vocabulary`] - MIVOT element and attribute names plus mapping sentinels.
//! - [`table`] - The tabular data model (resources, tables, fields, cell values).
//! - [`instance`] - Typed, role-addressable views over a resolved annotation.
//! - [`span`] - Byte ranges pointing back into annotation source text.

pub mod instance;
pub mod span;
pub mod table;
pub mod tree;
pub mod vocabulary;
