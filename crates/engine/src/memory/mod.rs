//! Semi-parametric memory: types learned for usage patterns, keyed by a
//! structural signature of the line an identifier is used on.

mod signature;
mod store;

pub use signature::{FOCUS, Signature};
pub use store::MemoryStore;
