//! Query-side adapter over a pre-built LanceDB passage index.
//!
//! Index construction is someone else's job; this crate only opens an
//! existing table, runs nearest-neighbour queries, and resolves passage
//! metadata by chunk id.

pub mod schema;
pub mod search;
pub mod table;

pub use search::LancePolicyIndex;
