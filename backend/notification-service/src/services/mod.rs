pub mod dispatcher;
pub mod fcm_client;
pub mod notification_service;
pub mod payload_builder;

pub use dispatcher::*;
pub use fcm_client::*;
pub use notification_service::*;
pub use payload_builder::*;
