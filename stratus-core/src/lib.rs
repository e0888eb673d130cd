//! Stratus Core
//!
//! Building blocks shared by Stratus resource controllers: waiting for
//! asynchronous operations, retrying busy resources, and pulling values out
//! of API responses.

pub mod extract;
pub mod poller;
pub mod provider;
pub mod retry;

pub use poller::{
    BoxError, Observation, PollConfig, PollError, PollOutcome, PollResult, StatusLabels,
    StatusPoller, UnknownState,
};
pub use provider::{ProviderError, ProviderResult, ResourceId};
pub use retry::{Attempt, retry_with_wait};
pub use tokio_util::sync::CancellationToken;
