use std::fs::File;
use std::io::{self, Read};
use std::time::Duration;

use fdsel_fdpass::{DescriptorChannel, FdPassError};
use fdsel_selector::{CancellationToken, Selector, SelectorError, Token};
use fdsel_transport::{BindConfig, Interest, Selectable, TransportError, UnixSocket};
use slab::Slab;
use tracing::{debug, info, warn};

use crate::cmd::{install_signal_handler, parse_duration, parse_mode, socket_path, ServeArgs};
use crate::exit::{
    fdpass_error, io_error, selector_error, transport_error, CliError, CliResult, SUCCESS, USAGE,
};
use crate::output::{print_message, Message, OutputFormat};

/// What one readable client produced.
enum Event {
    Message {
        payload: Vec<u8>,
        descriptors: Vec<Vec<u8>>,
    },
    /// Readiness was spurious; nothing to read yet.
    Idle,
    Closed,
}

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    if args.buffer_size == 0 {
        return Err(CliError::new(USAGE, "--buffer-size must be greater than zero"));
    }
    let poll_timeout = parse_duration(&args.poll_timeout)?;
    let config = BindConfig {
        socket_type: args.socket_type.into(),
        backlog: args.backlog,
        mode: args.mode.as_deref().map(parse_mode).transpose()?,
        remove_stale: args.remove_stale,
    };

    let path = socket_path(&args.path);
    let listener =
        UnixSocket::bind_with(&path, &config).map_err(|err| transport_error("bind failed", err))?;
    listener
        .configure_blocking(false)
        .map_err(|err| transport_error("bind failed", err))?;
    info!(path = %args.path, fds = args.fds, "listening");

    let cancel = CancellationToken::new();
    install_signal_handler(cancel.clone())?;

    let mut sockets = Slab::new();
    let listener_token = Token(sockets.insert(listener));
    let mut selector = Selector::new();
    selector
        .register(&mut sockets, listener_token, Interest::ACCEPT)
        .map_err(|err| selector_error("register failed", err))?;

    let mut printed = 0usize;
    while !cancel.is_cancelled() {
        if !poll_once(&mut selector, &mut sockets, poll_timeout)? {
            continue;
        }

        for token in selector.selected().to_vec() {
            if token == listener_token {
                if sockets[token.0].is_acceptable() {
                    accept_client(&mut selector, &mut sockets, token, &args)?;
                }
                continue;
            }

            let Some(socket) = sockets.get(token.0) else {
                continue;
            };
            if !socket.is_readable() {
                continue;
            }

            match receive(socket, &args) {
                Ok(Event::Message {
                    payload,
                    descriptors,
                }) => {
                    let peer = format!("client-{}", token.0);
                    print_message(
                        &Message {
                            peer: &peer,
                            payload: &payload,
                            descriptors: &descriptors,
                        },
                        format,
                    );
                    printed = printed.saturating_add(1);
                    if args.count.is_some_and(|count| printed >= count) {
                        return Ok(SUCCESS);
                    }
                }
                Ok(Event::Idle) => {}
                Ok(Event::Closed) => {
                    debug!(client = token.0, "client disconnected");
                    drop_client(&mut selector, &mut sockets, token);
                }
                Err(err) => {
                    warn!(client = token.0, code = err.code, error = %err, "dropping client");
                    drop_client(&mut selector, &mut sockets, token);
                }
            }
        }
    }

    info!("shutting down");
    Ok(SUCCESS)
}

/// One poll. `Ok(false)` means nothing to do this round.
fn poll_once(
    selector: &mut Selector,
    sockets: &mut Slab<UnixSocket>,
    timeout: Duration,
) -> CliResult<bool> {
    match selector.poll(sockets, Some(timeout)) {
        Ok(ready) => Ok(ready > 0),
        // A signal landed mid-poll; the loop condition decides what happens next.
        Err(SelectorError::Poll(err)) if err.kind() == io::ErrorKind::Interrupted => Ok(false),
        Err(err) => Err(selector_error("poll failed", err)),
    }
}

fn accept_client(
    selector: &mut Selector,
    sockets: &mut Slab<UnixSocket>,
    listener: Token,
    args: &ServeArgs,
) -> CliResult<()> {
    let client = match sockets[listener.0].accept() {
        Ok(client) => client,
        Err(TransportError::Accept(err)) if err.kind() == io::ErrorKind::WouldBlock => {
            return Ok(());
        }
        Err(err) => return Err(transport_error("accept failed", err)),
    };
    client
        .configure_blocking(false)
        .map_err(|err| transport_error("accept failed", err))?;

    if let Some(reply) = &args.reply {
        if let Err(err) = client.send(reply.as_bytes()) {
            warn!(error = %err, "failed to send reply");
        }
    }

    let token = Token(sockets.insert(client));
    selector
        .register(sockets, token, Interest::READ)
        .map_err(|err| selector_error("register failed", err))?;
    debug!(client = token.0, "accepted client");
    Ok(())
}

fn drop_client(selector: &mut Selector, sockets: &mut Slab<UnixSocket>, token: Token) {
    selector.unregister(token);
    if let Some(mut socket) = sockets.try_remove(token.0) {
        socket.close();
    }
}

fn receive(socket: &UnixSocket, args: &ServeArgs) -> CliResult<Event> {
    if !args.fds {
        let mut buf = vec![0u8; args.buffer_size];
        let n = match socket.recv(&mut buf) {
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(Event::Idle),
            Err(err) => return Err(io_error("receive failed", err)),
        };
        if n == 0 {
            return Ok(Event::Closed);
        }
        buf.truncate(n);
        return Ok(Event::Message {
            payload: buf,
            descriptors: Vec::new(),
        });
    }

    let mut received = match socket.recv_with_fds(args.buffer_size, args.max_fds) {
        Ok(received) => received,
        Err(FdPassError::ConnectionClosed) => return Ok(Event::Closed),
        Err(FdPassError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {
            return Ok(Event::Idle);
        }
        Err(err) => return Err(fdpass_error("receive failed", err)),
    };

    let mut descriptors = Vec::with_capacity(received.fds.len());
    for file in received.take_files() {
        let data = read_prefix(file, args.read_fd_bytes)
            .map_err(|err| io_error("reading received descriptor failed", err))?;
        descriptors.push(data);
    }
    Ok(Event::Message {
        payload: received.payload.to_vec(),
        descriptors,
    })
}

/// Read up to `limit` bytes from a received descriptor, then close it.
fn read_prefix(file: File, limit: usize) -> io::Result<Vec<u8>> {
    let mut data = Vec::with_capacity(limit.min(4096));
    file.take(limit as u64).read_to_end(&mut data)?;
    Ok(data)
}
