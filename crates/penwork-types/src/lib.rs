//! Shared types for Penwork: session identity, form inputs with their
//! validation rules, and page arithmetic for listings.

pub mod api;
pub mod models;
pub mod pagination;
