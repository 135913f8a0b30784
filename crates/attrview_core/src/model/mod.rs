//! Domain model for attribute views and the blocks they reference.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep the mutation protocol typed and decoded once at the boundary.
//!
//! # Invariants
//! - Rows, cells, columns, views and options carry stable string IDs.
//! - Rows reference document blocks by ID; blocks are never embedded.
//!
//! # See also
//! - docs/architecture/attribute-view.md

pub mod attribute_view;
pub mod block;
pub mod operation;
