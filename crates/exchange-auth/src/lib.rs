pub mod error;
pub mod lookup;
pub mod memory;
pub mod redis_store;

pub use error::AuthError;
pub use lookup::AuthLookup;
pub use memory::MemoryAuthStore;
pub use redis_store::{RedisAuthStore, StoreConfig};
