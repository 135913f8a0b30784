//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store and block repository calls into mutation use-cases.
//! - Keep hosts decoupled from storage details.

pub mod attribute_mirror;
pub mod attribute_view_service;
pub mod transaction;
