pub mod enrich;
pub mod error;
pub mod mempool;
pub mod notify;
pub mod resolver;
pub mod rpc;
pub mod scripthash;
pub mod types;
pub mod wallet;

#[cfg(test)]
mod test_util;

pub use error::CoreError;
pub use types::{EnrichedTransaction, ScriptHash};
