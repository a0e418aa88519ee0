use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use fdsel_selector::CancellationToken;
use fdsel_transport::{SocketType, DEFAULT_BACKLOG};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bind a socket, accept clients and print what they send.
    Serve(ServeArgs),
    /// Connect to a socket and send one message, optionally with a descriptor.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum SocketKind {
    Stream,
    Seqpacket,
}

impl From<SocketKind> for SocketType {
    fn from(kind: SocketKind) -> Self {
        match kind {
            SocketKind::Stream => SocketType::Stream,
            SocketKind::Seqpacket => SocketType::SeqPacket,
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind. A leading '@' selects the abstract namespace.
    pub path: String,
    /// Listen backlog.
    #[arg(long, default_value_t = DEFAULT_BACKLOG)]
    pub backlog: i32,
    /// Socket type.
    #[arg(long, value_enum, default_value = "stream")]
    pub socket_type: SocketKind,
    /// Permission bits for the socket file, in octal (e.g. 600).
    #[arg(long, value_name = "OCTAL")]
    pub mode: Option<String>,
    /// Remove a stale socket file left at the path by a dead server.
    #[arg(long)]
    pub remove_stale: bool,
    /// Expect descriptors alongside each message.
    #[arg(long)]
    pub fds: bool,
    /// Most descriptors accepted per message when --fds is set.
    #[arg(long, default_value_t = 1)]
    pub max_fds: usize,
    /// Bytes to read from each received descriptor.
    #[arg(long, default_value_t = 64)]
    pub read_fd_bytes: usize,
    /// Receive buffer size in bytes.
    #[arg(long, default_value_t = fdsel_fdpass::DEFAULT_BUFFER_CAPACITY)]
    pub buffer_size: usize,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// How long each poll waits before rechecking for shutdown (e.g. 500ms).
    #[arg(long, default_value = "500ms")]
    pub poll_timeout: String,
    /// Text sent to each client as soon as it is accepted.
    #[arg(long)]
    pub reply: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to. A leading '@' selects the abstract namespace.
    pub path: String,
    /// Payload text.
    #[arg(long, default_value = "hello from client\n")]
    pub data: String,
    /// Open this file and pass its descriptor with the payload.
    #[arg(long, value_name = "FILE")]
    pub fd_file: Option<PathBuf>,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// How long each poll waits (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub poll_timeout: String,
    /// Give up when the exchange takes longer than this (e.g. 5s).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Map the CLI spelling of a socket address to the one the transport takes.
///
/// `@name` becomes the abstract name `\0name`; anything else is a filesystem
/// path.
pub fn socket_path(input: &str) -> PathBuf {
    match input.strip_prefix('@') {
        Some(name) => {
            let mut raw = OsString::from("\0");
            raw.push(name);
            PathBuf::from(raw)
        }
        None => PathBuf::from(input),
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub fn parse_mode(input: &str) -> CliResult<u32> {
    let digits = input.trim().trim_start_matches("0o");
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .ok_or_else(|| CliError::new(USAGE, format!("invalid octal mode: {input}")))
}

/// Cancel `token` on Ctrl+C or SIGTERM.
pub fn install_signal_handler(token: CancellationToken) -> CliResult<()> {
    ctrlc::set_handler(move || token.cancel())
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
