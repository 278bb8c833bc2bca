pub mod client;
pub mod config;
pub mod migration;
pub mod models;
pub mod price_item_repository;

pub use client::PostgresClient;
pub use config::PostgresConfig;
pub use migration::MigrationRunner;
pub use models::PriceItemRow;
pub use price_item_repository::PostgresPriceItemRepository;
