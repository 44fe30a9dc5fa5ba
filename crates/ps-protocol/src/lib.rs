pub mod category;
pub mod messages;
pub mod pubsub;
pub mod topics;

pub use category::*;
pub use messages::*;
pub use pubsub::*;
