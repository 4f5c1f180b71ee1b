//! Chat AI routing and streaming types.

pub mod descriptor;
pub mod fragment;
pub mod keys;
pub mod request;

pub use descriptor::{BackendDescriptor, ChatChoice, DiscoveredModel, StudentChatChoice};
pub use fragment::{AnswerFragment, CorrelationTag, RelayItem};
pub use keys::{ActionId, BackendKey, ChannelId, ModelKey};
pub use request::{PriorTurn, PromptRequest, TurnScope};
