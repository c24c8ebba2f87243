// rspc client
// Call-style facade over a link chain: typed queries and mutations,
// callback and stream subscriptions, a global error hook.

pub mod client;
pub mod error;
pub mod logging;
pub mod subscription;

pub use client::{Client, ClientBuilder, OperationOptions};
pub use error::ClientError;
pub use subscription::{Subscription, SubscriptionOptions, Unsubscribe};

pub use rspc_core::{Link, LinkError, OperationContext, RspcError};
pub use rspc_transport as transport;
