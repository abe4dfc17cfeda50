pub mod consumer;
pub mod dependencies;
pub mod events;
pub mod retry;
pub mod store;

pub use consumer::{consume, JobHandler};
pub use dependencies::dependencies_satisfied;
pub use events::{JobEvent, JobEvents};
pub use retry::RetryPolicy;
pub use store::PgJobStore;
