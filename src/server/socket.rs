//! Per-connection socket options for noticing dead peers.
//!
//! A client that vanishes without closing its socket (power loss, network
//! partition) never produces EOF, so its locks would only lapse with their
//! leases. Keepalive probes and `TCP_USER_TIMEOUT` make the kernel fail the
//! read instead, which runs the normal disconnect path. The idle timeout is
//! the portable fallback.

use socket2::{SockRef, TcpKeepalive};
use std::io;
use std::net::TcpStream;
use std::time::Duration;

/// Dead-peer detection knobs. A zero duration disables that mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketSettings {
    pub keepalive_time: Duration,
    pub keepalive_interval: Duration,
    pub keepalive_probes: u32,
    pub user_timeout: Duration,
    pub idle_timeout: Duration,
}

impl SocketSettings {
    /// Nothing enabled; the stream behaves like a plain accepted socket.
    pub const DISABLED: Self = Self {
        keepalive_time: Duration::ZERO,
        keepalive_interval: Duration::ZERO,
        keepalive_probes: 0,
        user_timeout: Duration::ZERO,
        idle_timeout: Duration::ZERO,
    };
}

/// Apply `settings` to an accepted stream.
pub fn configure(stream: &TcpStream, settings: &SocketSettings) -> io::Result<()> {
    let socket = SockRef::from(stream);

    if !settings.keepalive_time.is_zero() {
        let keepalive = TcpKeepalive::new().with_time(settings.keepalive_time);
        #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
        let keepalive = keepalive
            .with_interval(settings.keepalive_interval)
            .with_retries(settings.keepalive_probes);
        socket.set_tcp_keepalive(&keepalive)?;
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    if !settings.user_timeout.is_zero() {
        socket.set_tcp_user_timeout(Some(settings.user_timeout))?;
    }

    if !settings.idle_timeout.is_zero() {
        stream.set_read_timeout(Some(settings.idle_timeout))?;
    }
    Ok(())
}
