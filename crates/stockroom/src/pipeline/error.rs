//! Fatal, run-aborting failures.
//!
//! Everything else — bad directory names, unparsable metadata, broken
//! images, a single rejected upsert — is recorded on the tracker and the
//! run continues with the next sibling item.

use thiserror::Error;

use crate::error::{ArchiveError, StructureError};
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum FatalError {
    #[error("File Error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Structure Error: {0}")]
    Structure(#[from] StructureError),

    #[error("Database Error: {0}")]
    Store(#[from] StoreError),
}
