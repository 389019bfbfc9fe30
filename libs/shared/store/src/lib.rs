pub mod error;
pub mod ledger;
pub mod memory;
pub mod sections;

pub use error::StoreError;
pub use ledger::{LedgerError, SlotLedger};
pub use memory::{MemoryStore, PriceScope};
pub use sections::ScheduleSections;
