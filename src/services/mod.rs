// Service layer

pub mod chat_gateway;
pub mod chat_message_store;
pub mod chat_notifications;
pub mod chat_service;
pub mod chat_sync;
pub mod chat_types;
pub mod config;
pub mod directory;
pub mod directory_api;
pub mod presence;
pub mod session;

pub use chat_gateway::{ChannelGateway, Gateway, SharedGateway};
pub use chat_notifications::{LogNotificationSink, NotificationSink};
pub use chat_service::ChatService;
pub use config::ConfigService;
pub use directory_api::{DirectoryApi, HttpDirectoryApi};
