//! TCP lock server.
//!
//! Clients open a connection, identify with `CONN`, and then acquire and
//! release locks as that client id. Each connection runs on its own thread;
//! storage calls go through a [`StorageGate`] shared with the maintenance
//! scheduler. When a connection drops, its client's locks are scheduled for
//! release and can be reclaimed by reconnecting with the same id in time.
//!
//! Shutdown (via `SHUTDOWN` or [`LockServer::shutdown_token`]) stops the
//! accept loop, fences storage writes, dumps state, and closes every open
//! connection.

mod command;
mod connection;
mod reply;
mod socket;


pub use command::{Command, parse};
pub use connection::Connection;
pub use reply::{ErrorCode, Reply};
pub use socket::SocketSettings;

use crate::clock::{CancelToken, Clock};
use crate::config::Config;
use crate::error::{LeaseError, Result};
use crate::maintenance::MaintenanceScheduler;
use crate::release::ReleaseAllController;
use crate::signals::SignalChannel;
use crate::store::{LeaseStore, StorageGate};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Server knobs, normally derived from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
    pub release_all_timeout: Duration,
    /// Lease length for `AQ` without an explicit duration.
    pub session_lease_secs: u64,
    pub max_line_bytes: usize,
    pub shutdown_support: bool,
    pub maintenance_period: Duration,
    pub maintenance_budget: Duration,
    pub load_dump: bool,
    pub socket: SocketSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ServerSettings {
    fn from(config: &Config) -> Self {
        Self {
            bind: config.bind.clone(),
            port: config.port,
            release_all_timeout: Duration::from_secs(config.release_all_timeout_secs),
            session_lease_secs: config.session_lease_secs,
            max_line_bytes: config.max_line_bytes,
            shutdown_support: config.shutdown_support,
            maintenance_period: Duration::from_secs(config.maintenance_period_secs),
            maintenance_budget: Duration::from_millis(config.maintenance_timeout_ms),
            load_dump: !config.disable_dump_load,
            socket: SocketSettings {
                keepalive_time: Duration::from_secs(config.tcp_keepalive_time_secs),
                keepalive_interval: Duration::from_secs(config.tcp_keepalive_interval_secs),
                keepalive_probes: config.tcp_keepalive_probes,
                user_timeout: Duration::from_secs(config.tcp_user_timeout_secs),
                idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            },
        }
    }
}

/// State shared by every connection of one server.
pub struct ServerContext<S: LeaseStore + 'static> {
    pub(crate) gate: Arc<StorageGate<S>>,
    pub(crate) releases: ReleaseAllController<StorageGate<S>>,
    pub(crate) signals: SignalChannel<StorageGate<S>>,
    pub(crate) settings: ServerSettings,
    clock: Arc<dyn Clock>,
    stop: CancelToken,
    streams: Mutex<HashMap<u64, TcpStream>>,
    next_connection: AtomicU64,
}

impl<S: LeaseStore + 'static> ServerContext<S> {
    pub fn new(gate: Arc<StorageGate<S>>, clock: Arc<dyn Clock>, settings: ServerSettings) -> Self {
        Self {
            releases: ReleaseAllController::new(Arc::clone(&gate), settings.release_all_timeout),
            signals: SignalChannel::new(Arc::clone(&gate)),
            gate,
            settings,
            clock,
            stop: CancelToken::new(),
            streams: Mutex::new(HashMap::new()),
            next_connection: AtomicU64::new(1),
        }
    }

    pub fn gate(&self) -> &Arc<StorageGate<S>> {
        &self.gate
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn connection_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// `STATS` body: one `name value` line per counter.
    pub fn stats_lines(&self) -> Result<Vec<String>> {
        let stats = self.gate.stats()?;
        let oldest_age = stats
            .oldest_acquired_at
            .map(|at| self.clock.now().signed_duration_since(at).num_seconds().max(0))
            .unwrap_or(0);

        Ok(vec![
            format!("lock_count {}", stats.lock_count),
            format!("session_count {}", stats.session_count),
            format!("pending_release_count {}", stats.pending_release_count),
            format!("signal_count {}", stats.signal_count),
            format!("oldest_lock_age_secs {}", oldest_age),
            format!("connection_count {}", self.connection_count()),
        ])
    }

    /// Fence storage, dump, stop accepting, and drop every connection.
    pub fn shutdown(&self) -> Result<()> {
        let result = self.gate.terminate();
        self.stop.cancel();

        // Unblock readers; replies already being written still go out.
        for (_, stream) in self.streams.lock().drain() {
            let _ = stream.shutdown(Shutdown::Read);
        }
        result
    }

    fn register(&self, stream: &TcpStream) -> Option<u64> {
        let id = self.next_connection.fetch_add(1, Ordering::SeqCst);
        match stream.try_clone() {
            Ok(clone) => {
                self.streams.lock().insert(id, clone);
                Some(id)
            }
            Err(e) => {
                warn!(error = %e, "failed to track connection");
                None
            }
        }
    }

    fn deregister(&self, id: u64) {
        self.streams.lock().remove(&id);
    }
}

/// A lock server over any [`LeaseStore`].
pub struct LockServer<S: LeaseStore + 'static> {
    ctx: Arc<ServerContext<S>>,
}

impl<S: LeaseStore + 'static> LockServer<S> {
    /// Wrap `store`, restoring the last dump unless disabled.
    pub fn new(store: S, clock: Arc<dyn Clock>, settings: ServerSettings) -> Result<Self> {
        let gate = Arc::new(StorageGate::new(store));

        if settings.load_dump {
            let restored = gate.load_dump()?;
            info!(locks = restored, "locks loaded from dump");
        } else {
            debug!("dump loading disabled");
        }

        Ok(Self {
            ctx: Arc::new(ServerContext::new(gate, clock, settings)),
        })
    }

    pub fn context(&self) -> &Arc<ServerContext<S>> {
        &self.ctx
    }

    /// Cancelling this token stops [`LockServer::serve`] gracefully.
    pub fn shutdown_token(&self) -> CancelToken {
        self.ctx.stop.clone()
    }

    /// Bind the configured address.
    pub fn bind(&self) -> Result<TcpListener> {
        let address = format!("{}:{}", self.ctx.settings.bind, self.ctx.settings.port);
        TcpListener::bind(&address).map_err(|e| {
            LeaseError::Config(format!("failed to bind '{}': {}", address, e))
        })
    }

    /// Accept connections until shut down.
    pub fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener
            .local_addr()
            .map_err(|e| LeaseError::Backend(format!("listener has no address: {}", e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| LeaseError::Backend(format!("failed to configure listener: {}", e)))?;
        info!(address = %local, "lock server listening");
        debug!(settings = ?self.ctx.settings, "server settings");

        let maintenance = MaintenanceScheduler::new(
            Arc::clone(&self.ctx.gate),
            self.ctx.settings.maintenance_period,
            self.ctx.settings.maintenance_budget,
        )
        .spawn()?;

        while !self.ctx.stop.is_cancelled() {
            match listener.accept() {
                Ok((stream, peer)) => self.spawn_connection(stream, peer),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    self.ctx.stop.wait_timeout(ACCEPT_POLL);
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    self.ctx.stop.wait_timeout(ACCEPT_POLL);
                }
            }
        }

        maintenance.stop();
        if !self.ctx.gate.is_terminating() {
            self.ctx.shutdown()?;
        }
        info!("lock server stopped");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        if self.ctx.gate.is_terminating() {
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }
        if let Err(e) = stream.set_nonblocking(false) {
            warn!(%peer, error = %e, "failed to configure connection");
            return;
        }
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }
        if let Err(e) = socket::configure(&stream, &self.ctx.settings.socket) {
            warn!(%peer, error = %e, "failed to enable dead peer detection");
        }
        debug!(%peer, "connection accepted");

        let id = self.ctx.register(&stream);
        let ctx = Arc::clone(&self.ctx);
        let spawned = thread::Builder::new()
            .name(format!("leasehold-conn-{}", peer))
            .spawn(move || {
                Connection::new(Arc::clone(&ctx), peer).run(stream);
                if let Some(id) = id {
                    ctx.deregister(id);
                }
            });
        if let Err(e) = spawned {
            error!(%peer, error = %e, "failed to spawn connection thread");
            if let Some(id) = id {
                self.ctx.deregister(id);
            }
        }
    }
}
