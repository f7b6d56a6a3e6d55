pub mod auth;
pub mod charge;
pub mod config;
pub mod email;
pub mod error;
pub mod extractors;
pub mod gateway;
pub mod handlers;
pub mod payments;
pub mod reconciler;
pub mod state;
pub mod types;
pub mod upsell;
pub mod webhooks;
