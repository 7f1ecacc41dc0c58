//! Parsing of request lines.

use super::reply::{ErrorCode, Reply};
use crate::lease::MAX_LEASE_SECS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start a session, resuming `client_id` when given.
    Conn(Option<String>),
    ConnInfo(String),
    Acquire {
        lock_id: String,
        lease_secs: Option<u64>,
        reentrant: bool,
    },
    Release(String),
    Locked(String),
    SigSet { lock_id: String, signal: String },
    SigExists { lock_id: String, signal: String },
    SigDel { lock_id: String, signal: String },
    Find(String),
    Ping,
    Stats,
    Shutdown,
}

impl Command {
    /// Upper-case verb, for logging.
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Conn(_) => "CONN",
            Command::ConnInfo(_) => "CONNINFO",
            Command::Acquire {
                reentrant: false, ..
            } => "AQ",
            Command::Acquire { reentrant: true, .. } => "AQR",
            Command::Release(_) => "RELEASE",
            Command::Locked(_) => "LOCKED",
            Command::SigSet { .. } => "SIGSET",
            Command::SigExists { .. } => "SIGEXISTS",
            Command::SigDel { .. } => "SIGDEL",
            Command::Find(_) => "FIND",
            Command::Ping => "PING",
            Command::Stats => "STATS",
            Command::Shutdown => "SHUTDOWN",
        }
    }

    /// Commands accepted before `CONN`.
    pub fn allowed_without_session(&self) -> bool {
        matches!(self, Command::Conn(_) | Command::Ping)
    }
}

/// Parse one line (without its terminator).
pub fn parse(line: &str) -> Result<Command, Reply> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim_start()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();
    let wrong_args = || Reply::error_with(ErrorCode::WrongArgs, format!("wrong arguments for {}", verb.to_uppercase()));

    let command = match verb.to_ascii_lowercase().as_str() {
        "conn" => match args.as_slice() {
            [] => Command::Conn(None),
            [client_id] => Command::Conn(Some(client_id.to_string())),
            _ => return Err(wrong_args()),
        },
        "conninfo" => {
            if rest.is_empty() {
                return Err(wrong_args());
            }
            Command::ConnInfo(rest.to_string())
        }
        verb @ ("aq" | "aqr") => {
            let reentrant = verb == "aqr";
            match args.as_slice() {
                [lock_id] => Command::Acquire {
                    lock_id: lock_id.to_string(),
                    lease_secs: None,
                    reentrant,
                },
                [lock_id, secs] => {
                    let secs: u64 = secs.parse().map_err(|_| wrong_args())?;
                    if secs == 0 || secs > MAX_LEASE_SECS {
                        return Err(wrong_args());
                    }
                    Command::Acquire {
                        lock_id: lock_id.to_string(),
                        lease_secs: Some(secs),
                        reentrant,
                    }
                }
                _ => return Err(wrong_args()),
            }
        }
        "release" => Command::Release(single(&args).ok_or_else(wrong_args)?),
        "locked" => Command::Locked(single(&args).ok_or_else(wrong_args)?),
        "find" => Command::Find(single(&args).ok_or_else(wrong_args)?),
        verb @ ("sigset" | "sigexists" | "sigdel") => {
            let [lock_id, signal] = args.as_slice() else {
                return Err(wrong_args());
            };
            let lock_id = lock_id.to_string();
            let signal = signal.to_string();
            match verb {
                "sigset" => Command::SigSet { lock_id, signal },
                "sigexists" => Command::SigExists { lock_id, signal },
                _ => Command::SigDel { lock_id, signal },
            }
        }
        "ping" if args.is_empty() => Command::Ping,
        "stats" if args.is_empty() => Command::Stats,
        "shutdown" if args.is_empty() => Command::Shutdown,
        "ping" | "stats" | "shutdown" => return Err(wrong_args()),
        "" => return Err(Reply::error(ErrorCode::UnknownCommand)),
        _ => {
            return Err(Reply::error_with(
                ErrorCode::UnknownCommand,
                format!("unknown command '{}'", verb),
            ));
        }
    };
    Ok(command)
}

fn single(args: &[&str]) -> Option<String> {
    match args {
        [value] => Some(value.to_string()),
        _ => None,
    }
}
