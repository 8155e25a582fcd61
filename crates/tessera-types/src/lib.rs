//! Shared identity types for Tessera.
//!
//! This crate is the leaf of the workspace: model labels, primary keys, object
//! references and the lookup trait the persistence layer implements. It has
//! **no internal tessera dependencies**.
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`ModelLabel`]    | Which model type (`app.model`)               |
//! | [`Pk`]            | Primary key (integer or string)              |
//! | [`ObjectRef`]     | One stored object (model + pk)               |
//! | [`ObjectSummary`] | Resolved object (title, url)                 |
//! | [`ObjectLookup`]  | Resolve references against live storage     |
//! | [`OnDelete`]      | Deletion behaviour of a reference            |
//! |-------------------|----------------------------------------------|

pub mod ids;
pub mod object;

pub use ids::{IdError, ModelLabel, Pk};
pub use object::{ObjectLookup, ObjectRef, ObjectSummary, OnDelete};
