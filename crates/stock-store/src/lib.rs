pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStockRepository;
pub use postgres::PostgresStockRepository;
pub use store::StockRepository;
