pub mod csv_prices;
pub mod message_bus;
pub mod mock;
pub mod observability;
pub mod persistence;
pub mod repositories;

pub use csv_prices::CsvPriceDataService;
pub use message_bus::MessageBus;
pub use persistence::JsonModelStore;
pub use repositories::InMemoryModelRepository;
