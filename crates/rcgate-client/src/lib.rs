//! Connection to the managed client.
//!
//! [`ManagedClient`] drives the connect state machine: it asks a
//! [`ConnectionStrategy`] for credentials, waits for the REST endpoint, opens
//! the event WebSocket and then hands every event to registered
//! [`RcuListener`]s through a [`Dispatcher`].

mod api;
mod config;
mod connection;
mod dispatch;
mod error;
mod listener;
mod strategy;
mod tls;

pub use api::{Api, ApiContext, CoreSdkApi};
pub use config::{ClientConfig, StrategyConfig, StrategyKind};
pub use connection::ManagedClient;
pub use dispatch::Dispatcher;
pub use error::{ConnectError, RequestError};
pub use listener::RcuListener;
pub use strategy::{
    ConnectionStrategy, LockfileStrategy, ProcessTakeoverStrategy, StrategyError,
    build_strategy, generate_parameters, parse_lockfile,
};
pub use tls::loopback_client_config;

pub use reqwest::Method;
