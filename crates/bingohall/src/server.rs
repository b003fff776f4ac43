//! `HallServer` builder and server loop.
//!
//! This is the entry point for running a Bingo Hall server. It ties
//! together all the layers: transport → protocol → session → gateway → room.

use std::future::Future;
use std::sync::Arc;

use bingohall_protocol::JsonCodec;
use bingohall_room::{AlertSink, Clock, FailureDetector, RoomManager, RoomStore, Wallet};
use bingohall_session::Authenticator;
use bingohall_transport::{Transport, WebSocketTransport};
use tokio::sync::watch;

use crate::handler::handle_connection;
use crate::{Gateway, HallConfig, HallError, Watchdog};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<W: Wallet, A: Authenticator> {
    pub(crate) gateway: Gateway<W>,
    pub(crate) auth: A,
    pub(crate) codec: JsonCodec,
    pub(crate) config: HallConfig,
}

/// Builder for configuring and starting a Bingo Hall server.
///
/// # Example
///
/// ```rust,ignore
/// use bingohall::prelude::*;
///
/// let server = HallServerBuilder::new()
///     .config(HallConfig::default().bind("0.0.0.0:8080"))
///     .build(my_auth, Arc::new(MemoryWallet::new()))
///     .await?;
/// server.run().await
/// ```
#[derive(Default)]
pub struct HallServerBuilder {
    config: HallConfig,
    store: Option<Arc<RoomStore>>,
    clock: Option<Arc<dyn Clock>>,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl HallServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: HallConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Starts from an existing store, typically one restored from a
    /// snapshot.
    pub fn store(mut self, store: Arc<RoomStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Binds the listener and wires the engine together.
    pub async fn build<W, A>(self, auth: A, wallet: Arc<W>) -> Result<HallServer<W, A>, HallError>
    where
        W: Wallet,
        A: Authenticator,
    {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let mut manager = RoomManager::new(wallet).with_rules(self.config.rules.clone());
        if let Some(clock) = self.clock {
            manager = manager.with_clock(clock);
        }
        if let Some(store) = self.store {
            manager = manager.with_store(store);
        }
        let manager = Arc::new(manager);

        let mut detector = FailureDetector::new(Arc::clone(&manager), self.config.detector.clone());
        if let Some(alerts) = self.alerts {
            detector = detector.with_alerts(alerts);
        }

        let gateway = Gateway::new(manager, Arc::new(detector), self.config.session.clone());
        let state = Arc::new(ServerState {
            gateway,
            auth,
            codec: JsonCodec,
            config: self.config,
        });

        Ok(HallServer { transport, state })
    }
}

/// A bound Bingo Hall server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct HallServer<W: Wallet, A: Authenticator> {
    transport: WebSocketTransport,
    state: Arc<ServerState<W, A>>,
}

impl<W: Wallet, A: Authenticator> HallServer<W, A> {
    pub fn builder() -> HallServerBuilder {
        HallServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    pub fn gateway(&self) -> &Gateway<W> {
        &self.state.gateway
    }

    pub fn config(&self) -> &HallConfig {
        &self.state.config
    }

    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), HallError> {
        self.run_until(std::future::pending()).await
    }

    /// Recovers leftover rooms, starts the failure detector, and accepts
    /// connections until `shutdown` resolves.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), HallError> {
        let watchdog = Watchdog::new(self.state.gateway.clone());
        watchdog.recover().await;

        let (stop_tx, stop_rx) = watch::channel(false);
        let sweeper = watchdog.spawn(stop_rx);

        tracing::info!(addr = %self.state.config.bind_addr, "Bingo Hall server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("shutting down");
        let _ = stop_tx.send(true);
        let _ = sweeper.await;
        self.state.gateway.autocallers().stop_all();
        Ok(())
    }
}
