//! Ledger records shared by the chain source, the store and the read path.
mod id;
mod model;
mod view;

pub use self::id::{BlockId, Hash, InvalidIdentifier};
pub use self::model::{payload_to_hex, Block, Log, Transaction};
pub use self::view::{BlockView, LogView, TransactionView};
