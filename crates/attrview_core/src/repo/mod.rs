//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Attribute view writes enforce `AttributeView::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `RevisionConflict`)
//!   in addition to DB transport errors.

pub mod attribute_view_repo;
pub mod block_repo;
