pub mod error;
pub mod event;
pub mod query;
pub mod writer;

pub use error::LedgerError;
pub use event::LedgerEvent;
pub use query::{LedgerQuery, SpendingBreakdown};
pub use writer::LedgerWriter;
