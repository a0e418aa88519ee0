use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::time::{Duration, Instant};

use fdsel_fdpass::{DescriptorChannel, FdPassError, DEFAULT_BUFFER_CAPACITY};
use fdsel_selector::{CancellationToken, Selector, SelectorError, Token};
use fdsel_transport::{Interest, Selectable, UnixSocket};
use tracing::{debug, info};

use crate::cmd::{install_signal_handler, parse_duration, socket_path, SendArgs};
use crate::exit::{
    fdpass_error, io_error, selector_error, transport_error, CliError, CliResult, FAILURE,
    SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{print_message, Message, OutputFormat};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Connecting,
    Sending { offset: usize },
    Waiting,
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    if args.data.is_empty() {
        return Err(CliError::new(USAGE, "--data must not be empty"));
    }
    let poll_timeout = parse_duration(&args.poll_timeout)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;

    let mut file = args
        .fd_file
        .as_ref()
        .map(|path| {
            File::open(path)
                .map_err(|err| io_error(&format!("failed opening {}", path.display()), err))
        })
        .transpose()?;

    let path = socket_path(&args.path);
    let socket =
        UnixSocket::connect(&path).map_err(|err| transport_error("connect failed", err))?;
    socket
        .configure_blocking(false)
        .map_err(|err| transport_error("connect failed", err))?;

    let cancel = CancellationToken::new();
    install_signal_handler(cancel.clone())?;

    let token = Token(0);
    let mut sockets = vec![socket];
    let mut selector = Selector::new();
    selector
        .register(&mut sockets, token, Interest::CONNECT)
        .map_err(|err| selector_error("register failed", err))?;

    let payload = args.data.as_bytes();
    let deadline = Instant::now() + wait_timeout;
    let mut state = State::Connecting;

    loop {
        if cancel.is_cancelled() {
            return Err(CliError::new(FAILURE, "interrupted"));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CliError::new(
                TIMEOUT,
                format!("no progress within {} ({state:?})", args.wait_timeout),
            ));
        }
        if !poll_once(&mut selector, &mut sockets, poll_timeout.min(remaining))? {
            continue;
        }

        let socket = &sockets[token.0];
        match state {
            State::Connecting => {
                if !socket.is_connectable() {
                    continue;
                }
                if let Some(err) = socket
                    .take_error()
                    .map_err(|err| transport_error("connect failed", err))?
                {
                    return Err(io_error("connect failed", err));
                }
                debug!(path = %args.path, "connection established");
                selector.update_interest(&mut sockets, token, Interest::WRITE);
                state = State::Sending { offset: 0 };
            }
            State::Sending { offset } => {
                if !socket.is_writable() {
                    continue;
                }
                let sent = if offset == 0 {
                    let fds: Vec<BorrowedFd<'_>> = file.iter().map(AsFd::as_fd).collect();
                    match socket.send_with_fds(payload, &fds) {
                        Ok(sent) => sent,
                        Err(FdPassError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {
                            continue
                        }
                        Err(err) => return Err(fdpass_error("send failed", err)),
                    }
                } else {
                    match socket.send(&payload[offset..]) {
                        Ok(sent) => sent,
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                        Err(err) => return Err(io_error("send failed", err)),
                    }
                };

                let offset = offset + sent;
                if offset < payload.len() {
                    state = State::Sending { offset };
                    continue;
                }

                // The peer holds its own duplicate now.
                if let Some(file) = file.take() {
                    debug!("closing local copy of passed descriptor");
                    drop(file);
                }
                info!(bytes = payload.len(), fds = args.fd_file.is_some(), "message sent");

                if !args.wait {
                    return Ok(SUCCESS);
                }
                selector.update_interest(&mut sockets, token, Interest::READ);
                state = State::Waiting;
            }
            State::Waiting => {
                if !socket.is_readable() {
                    continue;
                }
                let mut buf = vec![0u8; DEFAULT_BUFFER_CAPACITY];
                let n = match socket.recv(&mut buf) {
                    Ok(0) => {
                        return Err(CliError::new(
                            FAILURE,
                            "server closed the connection before replying",
                        ))
                    }
                    Ok(n) => n,
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                    Err(err) => return Err(io_error("receive failed", err)),
                };
                print_message(
                    &Message {
                        peer: &args.path,
                        payload: &buf[..n],
                        descriptors: &[],
                    },
                    format,
                );
                return Ok(SUCCESS);
            }
        }
    }
}

fn poll_once(
    selector: &mut Selector,
    sockets: &mut Vec<UnixSocket>,
    timeout: Duration,
) -> CliResult<bool> {
    match selector.poll(sockets, Some(timeout)) {
        Ok(ready) => Ok(ready > 0),
        Err(SelectorError::Poll(err)) if err.kind() == io::ErrorKind::Interrupted => Ok(false),
        Err(err) => Err(selector_error("poll failed", err)),
    }
}
