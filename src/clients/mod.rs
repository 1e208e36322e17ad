//! Collaborators at the edge of the engine: the chat transport, the link
//! shortener and the title search index.

pub mod gateway;
pub mod search_index;
pub mod shortener;

pub use gateway::{LogGateway, PresentationGateway, WebhookGateway};
pub use search_index::{SearchIndex, TitleIndex};
pub use shortener::{HttpShortener, PassthroughShortener, Shortener};
