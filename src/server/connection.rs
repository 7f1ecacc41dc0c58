//! One client connection: session state plus command dispatch.

use super::ServerContext;
use super::command::{self, Command};
use super::reply::{ErrorCode, Reply};
use crate::error::LeaseError;
use crate::lease::{
    AddSignalOutcome, ReleaseOutcome, RemoveSignalOutcome, new_lease_id, validate_client_id,
};
use crate::store::LeaseStore;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct Connection<S: LeaseStore + 'static> {
    ctx: Arc<ServerContext<S>>,
    peer: SocketAddr,
    client_id: Option<String>,
    client_info: Option<String>,
}

impl<S: LeaseStore + 'static> Connection<S> {
    pub fn new(ctx: Arc<ServerContext<S>>, peer: SocketAddr) -> Self {
        Self {
            ctx,
            peer,
            client_id: None,
            client_info: None,
        }
    }

    fn display(&self) -> String {
        format!(
            "{} ({}), client={}",
            self.peer,
            self.client_info.as_deref().unwrap_or("-"),
            self.client_id.as_deref().unwrap_or("-")
        )
    }

    /// Parse and execute one request line.
    pub fn handle_line(&mut self, line: &str) -> Reply {
        match command::parse(line) {
            Ok(command) => self.handle(command),
            Err(reply) => {
                debug!(peer = %self.peer, line, "rejected request");
                reply
            }
        }
    }

    pub fn handle(&mut self, command: Command) -> Reply {
        if self.ctx.gate.is_terminating() {
            return Reply::error(ErrorCode::Terminating);
        }
        debug!(verb = command.verb(), connection = %self.display(), "command");

        let Some(client_id) = self.client_id.clone() else {
            return match command {
                Command::Conn(resume) => self.connect(resume),
                Command::Ping => Reply::value("PONG"),
                _ => Reply::error(ErrorCode::ConnRequired),
            };
        };

        let result = match command {
            Command::Conn(_) => return Reply::error(ErrorCode::AlreadyConnected),
            Command::Ping => return Reply::value("PONG"),
            Command::ConnInfo(info) => {
                if let Some(previous) = &self.client_info
                    && previous != &info
                {
                    warn!(connection = %self.display(), info = %info, "client info changed");
                }
                self.client_info = Some(info);
                Ok(Reply::Bool(true))
            }
            Command::Acquire {
                lock_id,
                lease_secs,
                reentrant,
            } => {
                let lease = lease_secs.unwrap_or(self.ctx.settings.session_lease_secs);
                self.ctx
                    .gate
                    .acquire(&client_id, &lock_id, lease, reentrant)
                    .map(|outcome| Reply::Bool(outcome.is_acquired()))
            }
            Command::Release(lock_id) => self
                .ctx
                .gate
                .release(&client_id, &lock_id)
                .map(|outcome| Reply::Bool(outcome == ReleaseOutcome::Released)),
            Command::Locked(lock_id) => self.ctx.gate.locked(&lock_id).map(Reply::Bool),
            Command::SigSet { lock_id, signal } => self
                .ctx
                .signals
                .raise(&lock_id, &signal)
                .map(|outcome| Reply::Bool(outcome == AddSignalOutcome::Added)),
            Command::SigExists { lock_id, signal } => self
                .ctx
                .signals
                .is_raised(&lock_id, &signal)
                .map(Reply::Bool),
            Command::SigDel { lock_id, signal } => self
                .ctx
                .signals
                .clear(&lock_id, &signal)
                .map(|outcome| Reply::Bool(outcome == RemoveSignalOutcome::Removed)),
            Command::Find(pattern) => self.ctx.gate.find(&pattern).map(|found| {
                Reply::List(
                    found
                        .into_iter()
                        .map(|f| format!("{} {}", f.lock_id, f.acquired_at.timestamp()))
                        .collect(),
                )
            }),
            Command::Stats => self.ctx.stats_lines().map(Reply::List),
            Command::Shutdown => return self.shutdown(),
        };

        result.unwrap_or_else(|e| self.error_reply(e))
    }

    fn connect(&mut self, resume: Option<String>) -> Reply {
        let result = match resume {
            None => {
                let client_id = new_lease_id();
                self.ctx
                    .releases
                    .on_connect(&client_id, self.peer)
                    .map(|()| client_id)
            }
            Some(client_id) => validate_client_id(&client_id)
                .and_then(|()| self.ctx.releases.on_reconnect(&client_id, self.peer))
                .map(|report| {
                    if !report.too_late.is_empty() {
                        warn!(client_id = %client_id, too_late = ?report.too_late, "locks lapsed before reconnect");
                    }
                    client_id
                }),
        };

        match result {
            Ok(client_id) => {
                self.client_id = Some(client_id.clone());
                info!(connection = %self.display(), "session started");
                Reply::Value(client_id)
            }
            Err(e) => self.error_reply(e),
        }
    }

    fn shutdown(&mut self) -> Reply {
        if !self.ctx.settings.shutdown_support {
            return Reply::error(ErrorCode::UnknownCommand);
        }
        info!(connection = %self.display(), "SHUTDOWN requested");
        match self.ctx.shutdown() {
            Ok(()) => Reply::Bool(true),
            Err(e) => self.error_reply(e),
        }
    }

    fn error_reply(&self, err: LeaseError) -> Reply {
        match err {
            LeaseError::Validation(message) => Reply::error_with(ErrorCode::Invalid, message),
            LeaseError::Terminating => Reply::error(ErrorCode::Terminating),
            other => {
                error!(connection = %self.display(), error = %other, "command failed");
                Reply::error_with(ErrorCode::Internal, other.to_string())
            }
        }
    }

    /// The peer went away.
    pub fn close(&mut self) {
        if self.ctx.gate.is_terminating() {
            debug!(connection = %self.display(), "connection closed during shutdown");
            return;
        }
        let Some(client_id) = self.client_id.take() else {
            debug!(peer = %self.peer, "connection closed before CONN");
            return;
        };
        if let Err(e) = self.ctx.releases.on_disconnect(&client_id, self.peer) {
            error!(client_id = %client_id, peer = %self.peer, error = %e, "release-all failed");
        }
    }

    /// Serve requests from `stream` until EOF, error, or shutdown.
    pub fn run(mut self, stream: TcpStream) {
        let max_line = self.ctx.settings.max_line_bytes;
        let mut writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(e) => {
                error!(peer = %self.peer, error = %e, "failed to clone connection");
                return;
            }
        };
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            let read = reader
                .by_ref()
                .take(max_line as u64 + 1)
                .read_until(b'\n', &mut buf);
            match read {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    info!(connection = %self.display(), "closing idle connection");
                    break;
                }
                Err(e) => {
                    debug!(peer = %self.peer, error = %e, "read failed");
                    break;
                }
            }

            let reply = if !buf.ends_with(b"\n") && buf.len() > max_line {
                warn!(peer = %self.peer, max_line, "discarding oversized line");
                if !skip_line(&mut reader, max_line) {
                    break;
                }
                Reply::error(ErrorCode::LineTooLong)
            } else {
                match std::str::from_utf8(&buf) {
                    Ok(line) => self.handle_line(line.trim_end_matches(['\r', '\n'])),
                    Err(_) => Reply::error_with(ErrorCode::WrongArgs, "request is not UTF-8"),
                }
            };
            if let Err(e) = writer.write_all(reply.encode().as_bytes()) {
                debug!(peer = %self.peer, error = %e, "write failed");
                break;
            }
        }

        self.close();
    }
}

/// Consume the remainder of an oversized line. `false` on EOF or error.
fn skip_line<R: BufRead>(reader: &mut R, chunk: usize) -> bool {
    let mut scratch = Vec::with_capacity(chunk);
    loop {
        scratch.clear();
        match reader
            .by_ref()
            .take(chunk as u64 + 1)
            .read_until(b'\n', &mut scratch)
        {
            Ok(0) | Err(_) => return false,
            Ok(_) if scratch.ends_with(b"\n") => return true,
            Ok(_) => {}
        }
    }
}
