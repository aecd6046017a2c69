//! RootWise-Store: Backend Ports for RootWise
//!
//! This crate provides the persistence and session layer consumed by the
//! RootWise core. It defines the collaborator interfaces and ships two
//! families of implementations.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: typed boundaries, validated payloads, and query semantics.
//!
//! ## Key Components
//!
//! - `DocumentStore`, `BlobStore`, `SessionService`, `PreferenceStore`: the ports
//! - `fakes`: in-memory implementations used by tests and offline runs
//! - `AppwriteClient`: REST adapter for the hosted backend

pub mod appwrite;
mod error;
pub mod fakes;
pub mod storage_traits;

pub use appwrite::{AppwriteClient, AppwriteConfig, LoginToken};
pub use error::StorageError;
pub use storage_traits::{
    BlobStore, BlobUpload, Document, DocumentStore, NewDocumentId, PreferenceStore, Query,
    SessionService, StorageResult, UserIdentity, CREATED_AT, DOCUMENT_ID,
};
