pub mod http;
pub mod traits;

pub use http::HttpChatClient;
pub use traits::{
    CallRequest, CallResult, ChatMessage, ChatTransport, FinishReason, ModelCatalog,
    ModelMetadata, Role,
};
