//! The explorer: navigation and mutation of a bucket store.
//!
//! Every call resolves its level stack inside a fresh transaction, acts on
//! the target bucket, and commits (writes) or drops (reads) the transaction
//! before returning.

mod list;
mod mutate;

pub use list::LIST_LIMIT;

use crate::codec::ValueCodec;
use crate::config::ExplorerConfig;
use crate::db::{Db, DbStats};
use crate::error::{Result, StoreError};
use tracing::info;

/// Owns the store handle and the value codec for the life of the process.
pub struct Explorer {
    db: Option<Db>,
    codec: ValueCodec,
}

impl Explorer {
    /// Build the codec from `config`, then open the store file.
    pub fn open(config: ExplorerConfig) -> Result<Self> {
        let codec = ValueCodec::from_schema(config.schema().as_ref())?;
        let db = Db::open(&config.path, config.db_options())?;

        info!(codec = codec.description(), "explorer ready");
        Ok(Self::with_codec(db, codec))
    }

    /// Wrap an already-open store.
    pub fn with_codec(db: Db, codec: ValueCodec) -> Self {
        Self {
            db: Some(db),
            codec,
        }
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    /// The open store, or `Closed`.
    pub fn db(&self) -> Result<&Db> {
        self.db.as_ref().ok_or(StoreError::Closed)
    }

    pub fn stats(&self) -> Result<DbStats> {
        self.db()?.stats()
    }

    pub fn compact(&self) -> Result<()> {
        self.db()?.compact()
    }

    /// Close the store. Closing twice is fine.
    pub fn close(&mut self) -> Result<()> {
        match self.db.take() {
            Some(db) => db.close(),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.db.is_none()
    }
}
