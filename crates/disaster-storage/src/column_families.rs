//! Column family definitions for RocksDB.
//!
//! - events: Append-only event documents keyed by insertion sequence (Zstd)
//! - event_ids: Public ULID to insertion sequence
//! - meta: Schema values such as the embedding dimension
//! - checkpoints: Background job checkpoints

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for event documents
pub const CF_EVENTS: &str = "events";

/// Column family name for the id lookup
pub const CF_EVENT_IDS: &str = "event_ids";

/// Column family name for schema metadata
pub const CF_META: &str = "meta";

/// Column family name for background job checkpoints
pub const CF_CHECKPOINTS: &str = "checkpoints";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_EVENTS, CF_EVENT_IDS, CF_META, CF_CHECKPOINTS];

/// Events are written once and read in bulk; compress them.
fn events_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_EVENTS, events_options()),
        ColumnFamilyDescriptor::new(CF_EVENT_IDS, Options::default()),
        ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ColumnFamilyDescriptor::new(CF_CHECKPOINTS, Options::default()),
    ]
}
