//! The managed-client session and its connect state machine.

use crate::tls::loopback_client_config;
use crate::{
    Api, ApiContext, ClientConfig, ConnectError, ConnectionStrategy, Dispatcher, RcuListener,
    RequestError, StrategyError,
};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use rcgate_core::{
    ApiResponse, AtomicConnectionState, ConnectionParameters, ConnectionState, poll_until,
    subscribe_frame,
};
use reqwest::Method;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};

use ConnectionState::*;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ApiCache = HashMap<&'static str, Arc<dyn Any + Send + Sync>>;

/// Handle to the managed-client connection. Cheap to clone.
#[derive(Clone)]
pub struct ManagedClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    strategy: Arc<dyn ConnectionStrategy>,
    state: AtomicConnectionState,
    params: RwLock<Option<ConnectionParameters>>,
    socket: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    apis: Mutex<ApiCache>,
    http: reqwest::Client,
    connector: Option<Connector>,
    dispatcher: Dispatcher,
}

impl ManagedClient {
    /// Build a disconnected client. Must be called inside a Tokio runtime.
    pub fn new(
        config: ClientConfig,
        strategy: Arc<dyn ConnectionStrategy>,
    ) -> Result<Self, ConnectError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.secure)
            .build()
            .map_err(|e| ConnectError::Internal(e.to_string()))?;
        let connector = if config.secure {
            let tls = loopback_client_config().map_err(|e| ConnectError::Internal(e.to_string()))?;
            Some(Connector::Rustls(Arc::new(tls)))
        } else {
            None
        };

        Ok(Self {
            inner: Arc::new(Inner {
                dispatcher: Dispatcher::spawn(config.dispatch_concurrency),
                config,
                strategy,
                state: AtomicConnectionState::new(),
                params: RwLock::new(None),
                socket: Mutex::new(None),
                apis: Mutex::new(HashMap::new()),
                http,
                connector,
            }),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.load()
    }

    pub fn add_listener(&self, listener: Arc<dyn RcuListener>) {
        self.inner.dispatcher.add_listener(listener);
    }

    /// Parameters of the live session, if one is committed.
    pub fn get_connection_parameters(&self) -> Option<ConnectionParameters> {
        self.inner.current_params()
    }

    /// Run the connect sequence to completion.
    ///
    /// Fails with `Conflict` immediately when another attempt is in flight or
    /// the client is already connected. Once admitted the attempt runs on its
    /// own task, so dropping the returned future does not cancel it.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        self.inner
            .state
            .transition(Disconnected, WaitingForProcess)
            .map_err(ConnectError::Conflict)?;

        let inner = self.inner.clone();
        match tokio::spawn(async move { inner.run_connect().await }).await {
            Ok(result) => result,
            Err(e) => {
                self.inner.clear_session();
                self.inner.state.reset();
                Err(ConnectError::Internal(e.to_string()))
            }
        }
    }

    /// Release the strategy's resources and close the socket with a normal
    /// closure. Teardown then follows the same path as a remote close, after
    /// the peer answers or the WebSocket timeout runs out.
    pub async fn disconnect(&self) -> Result<(), ConnectError> {
        let Some(socket) = self.inner.socket_sender() else {
            return Err(ConnectError::Conflict(self.state()));
        };
        if let Err(e) = self.inner.strategy.disconnect().await {
            tracing::warn!("connection strategy cleanup failed: {e}");
        }
        let close = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }));
        if socket.send(close).is_err() {
            tracing::debug!("socket already closed");
        }
        Ok(())
    }

    /// Request context for the live session.
    pub fn context(&self) -> Result<ApiContext, RequestError> {
        if self.state() != Connected {
            return Err(RequestError::NotConnected);
        }
        let params = self.inner.current_params().ok_or(RequestError::NotConnected)?;
        Ok(self.inner.context_for(params))
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse, RequestError> {
        self.context()?.send(method, path, body).await
    }

    /// The typed client `A` for the live session, built on first use.
    pub fn api<A: Api>(&self) -> Result<Arc<A>, RequestError> {
        let context = self.context()?;
        let mut apis = self
            .inner
            .apis
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(cached) = apis.get(A::NAME) {
            if let Ok(api) = cached.clone().downcast::<A>() {
                return Ok(api);
            }
            tracing::warn!(name = A::NAME, "typed API name registered with another type");
        }
        let api = Arc::new(A::new(context));
        apis.insert(A::NAME, api.clone());
        Ok(api)
    }

    /// Stop the dispatch task, letting queued notifications drain for up to
    /// `grace`.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.dispatcher.shutdown(grace).await;
    }
}

impl Inner {
    fn current_params(&self) -> Option<ConnectionParameters> {
        self.params
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_params(&self, params: Option<ConnectionParameters>) {
        *self
            .params
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = params;
    }

    fn socket_sender(&self) -> Option<mpsc::UnboundedSender<Message>> {
        self.socket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn context_for(&self, params: ConnectionParameters) -> ApiContext {
        ApiContext::new(
            self.http.clone(),
            self.config.base_url(params.port()),
            params,
            self.config.request_timeout(),
        )
    }

    /// Drop everything tied to the current session.
    fn clear_session(&self) {
        self.set_params(None);
        self.socket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        self.apis
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn fail(&self, error: ConnectError) -> ConnectError {
        tracing::warn!("connect failed: {error}");
        self.clear_session();
        self.state.reset();
        error
    }

    fn advance(&self, from: ConnectionState, to: ConnectionState) -> Result<(), ConnectError> {
        tracing::debug!(%from, %to, "connection state transition");
        self.state.transition(from, to).map_err(|actual| {
            self.fail(ConnectError::InconsistentState {
                expected: from,
                actual,
            })
        })
    }

    async fn run_connect(self: Arc<Self>) -> Result<(), ConnectError> {
        let params = match tokio::time::timeout(
            self.config.strategy_timeout(),
            self.strategy.connect(),
        )
        .await
        {
            Ok(Ok(params)) => params,
            Ok(Err(e)) => return Err(self.fail(ConnectError::ConnectFailed(e))),
            Err(_) => return Err(self.fail(ConnectError::ConnectFailed(StrategyError::Timeout))),
        };
        self.advance(WaitingForProcess, WaitingForRestReady)?;

        if !self.await_rest_ready(&params).await {
            return Err(self.fail(ConnectError::RestTimeout {
                attempts: self.config.rest_connect_attempts,
            }));
        }
        self.advance(WaitingForRestReady, WaitingForWebsocketConnection)?;
        self.set_params(Some(params.clone()));

        let ws = match tokio::time::timeout(
            self.config.websocket_timeout(),
            self.open_socket(&params),
        )
        .await
        {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => return Err(self.fail(ConnectError::WebSocketTimeout(e.to_string()))),
            Err(_) => {
                return Err(self.fail(ConnectError::WebSocketTimeout(format!(
                    "no handshake within {:?}",
                    self.config.websocket_timeout()
                ))));
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        *self
            .socket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(tx);
        self.advance(WaitingForWebsocketConnection, Connected)?;

        tracing::info!(port = params.port(), "connected to managed client");
        // Queued before the read loop starts so listeners see it ahead of any frame.
        self.dispatcher.notify_connected();
        tokio::spawn(self.clone().run_socket(ws, rx));
        Ok(())
    }

    async fn await_rest_ready(&self, params: &ConnectionParameters) -> bool {
        let context = self.context_for(params.clone());
        let context = &context;
        poll_until(
            self.config.rest_connect_attempts,
            self.config.rest_connect_delay(),
            |attempt| async move {
                match context.check_ready().await {
                    Ok(true) => Some(()),
                    Ok(false) => None,
                    Err(e) => {
                        tracing::debug!(attempt, "REST readiness check failed: {e}");
                        None
                    }
                }
            },
        )
        .await
        .is_some()
    }

    async fn open_socket(
        &self,
        params: &ConnectionParameters,
    ) -> Result<WsStream, tungstenite::Error> {
        let mut request = self.config.socket_url(params.port()).into_client_request()?;
        let header = HeaderValue::from_str(params.auth_header())
            .map_err(|e| tungstenite::Error::HttpFormat(e.into()))?;
        request.headers_mut().insert(AUTHORIZATION, header);

        let (mut ws, _) = tokio_tungstenite::connect_async_tls_with_config(
            request,
            None,
            false,
            self.connector.clone(),
        )
        .await?;
        ws.send(Message::Text(subscribe_frame().into())).await?;
        Ok(ws)
    }

    async fn run_socket(
        self: Arc<Self>,
        ws: WsStream,
        mut outbound: mpsc::UnboundedReceiver<Message>,
    ) {
        let (mut sink, mut stream) = ws.split();

        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.dispatcher.frame(text.to_string()),
                        Some(Ok(Message::Close(frame))) => {
                            tracing::debug!(?frame, "managed client closed the socket");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!("socket error: {e}");
                            break;
                        }
                        None => break,
                    }
                }

                msg = outbound.recv() => {
                    let Some(msg) = msg else { break };
                    let closing = matches!(msg, Message::Close(_));
                    if let Err(e) = sink.send(msg).await {
                        tracing::warn!("socket write failed: {e}");
                        break;
                    }
                    if closing {
                        self.await_close_reply(&mut stream).await;
                        break;
                    }
                }
            }
        }

        if tokio::time::timeout(self.config.websocket_timeout(), sink.close())
            .await
            .is_err()
        {
            tracing::debug!("socket close did not complete in time");
        }
        self.handle_socket_closed();
    }

    /// Wait for the peer's Close after we sent ours, up to the WebSocket
    /// timeout. Frames arriving meanwhile are dropped.
    async fn await_close_reply(&self, stream: &mut SplitStream<WsStream>) {
        let reply = async {
            while let Some(Ok(msg)) = stream.next().await {
                if matches!(msg, Message::Close(_)) {
                    break;
                }
            }
        };
        if tokio::time::timeout(self.config.websocket_timeout(), reply)
            .await
            .is_err()
        {
            tracing::warn!("managed client never answered the close handshake, closing anyway");
        }
    }

    fn handle_socket_closed(&self) {
        // Cleared first: whoever sees `Disconnected` must not see the old session.
        self.clear_session();
        if let Err(actual) = self.state.transition(Connected, Disconnected) {
            tracing::warn!(%actual, "socket closed while not connected");
        }
        tracing::info!("disconnected from managed client");
        self.dispatcher.notify_disconnected();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Pending;

    #[async_trait]
    impl ConnectionStrategy for Pending {
        async fn connect(&self) -> Result<ConnectionParameters, StrategyError> {
            std::future::pending().await
        }

        async fn disconnect(&self) -> Result<(), StrategyError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unexpected_state_resets_and_clears_session() {
        let config = ClientConfig {
            secure: false,
            ..ClientConfig::default()
        };
        let client = ManagedClient::new(config, Arc::new(Pending)).unwrap();
        let inner = &client.inner;
        inner
            .state
            .transition(Disconnected, WaitingForWebsocketConnection)
            .unwrap();
        inner.set_params(Some(ConnectionParameters::new("secret", 40000).unwrap()));

        let err = inner
            .advance(WaitingForRestReady, WaitingForWebsocketConnection)
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectError::InconsistentState {
                expected: ConnectionState::WaitingForRestReady,
                actual: ConnectionState::WaitingForWebsocketConnection,
            }
        ));
        assert_eq!(client.state(), Disconnected);
        assert!(client.get_connection_parameters().is_none());
    }
}
