pub mod bucket;
pub mod defaults;
pub mod errors;
pub mod ids;
pub mod page;

pub use ids::{PgId, TxId};
