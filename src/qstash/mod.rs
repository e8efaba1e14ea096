mod client;
mod error;

pub use client::{PublishResponse, QstashClient};
pub use error::QstashError;
