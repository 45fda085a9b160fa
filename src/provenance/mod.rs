//! Provenance: canonical hashing, the bundle schema and the ledger.

pub mod hash;
pub mod ledger;
pub mod schema;

pub use hash::{hash_payload, hash_value, sha256_hex, snippet_hash};
pub use ledger::{EventFilter, IntegrityReport, LedgerError, LedgerStats, ProvenanceLedger};
pub use schema::{validate_event, SchemaValidationError};
