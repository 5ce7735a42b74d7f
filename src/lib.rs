//! A networked key-value store organized as named stores, each backed by a
//! single append-only file. Serves HTTP reads and writes of MIME-typed
//! values, enumerates keys with content negotiation, and compacts stores
//! online via merge.

pub mod accept;
pub mod error;
pub mod record;
pub mod registry;
pub mod server;
pub mod store;

pub use error::Error;
pub use registry::Registry;
pub use server::ApiServer;
pub use store::Store;

pub type Result<T> = std::result::Result<T, Error>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
