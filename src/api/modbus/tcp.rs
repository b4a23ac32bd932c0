use anyhow::{Context, Result};
use std::{
    io::{self, ErrorKind},
    net::SocketAddr,
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
    task::JoinSet,
};

use super::{
    handlers::ServerControl,
    traits::{notify, notify_error, HookChain, ServerEvent, TransportKind},
};
use crate::{
    protocol::{
        modbus::{build_read_response, build_tcp_response, MbapHeader, ReadRequest, MBAP_HEADER_LEN},
        register::SharedRegisterMap,
    },
    utils::format_hex_bytes,
};

/// Modbus/TCP listener: one task per accepted connection, accept polled so
/// the loop notices a stop request within one poll interval.
pub struct TcpServer {
    listener: TcpListener,
    map: SharedRegisterMap,
    hooks: HookChain,
    poll_interval: Duration,
}

impl TcpServer {
    pub async fn bind(
        addr: &str,
        map: SharedRegisterMap,
        hooks: HookChain,
        poll_interval: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind Modbus/TCP listener on {addr}"))?;
        Ok(Self {
            listener,
            map,
            hooks,
            poll_interval,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `control` is stopped, then close the
    /// listening socket and force-close every connection still open.
    pub async fn serve(self, control: ServerControl) -> Result<()> {
        let endpoint = self.local_addr()?;
        notify(
            &self.hooks,
            ServerEvent::Listening {
                transport: TransportKind::Tcp,
                endpoint: endpoint.to_string(),
            },
        );

        let mut connections = JoinSet::new();
        let mut result = Ok(());

        while control.is_running() {
            // Reap finished handlers so the set only tracks live connections.
            while connections.try_join_next().is_some() {}

            let (stream, peer) =
                match tokio::time::timeout(self.poll_interval, self.listener.accept()).await {
                    Err(_elapsed) => continue,
                    Ok(Ok(accepted)) => accepted,
                    Ok(Err(err)) if is_transient_accept_error(&err) => {
                        notify_error(
                            &self.hooks,
                            "Modbus/TCP accept",
                            &anyhow::Error::new(err),
                        );
                        tokio::time::sleep(self.poll_interval).await;
                        continue;
                    }
                    Ok(Err(err)) => {
                        result = Err(err).context("Failed to accept Modbus/TCP connection");
                        break;
                    }
                };

            if let Err(err) = stream.set_nodelay(true) {
                log::debug!("Failed to set TCP_NODELAY for {peer}: {err}");
            }
            notify(&self.hooks, ServerEvent::ConnectionOpened { peer });

            let map = self.map.clone();
            let hooks = self.hooks.clone();
            connections.spawn(async move {
                if let Err(err) = handle_connection(stream, peer, &map, &hooks).await {
                    notify_error(&hooks, &format!("Connection {peer}"), &err);
                }
                notify(&hooks, ServerEvent::ConnectionClosed { peer });
            });
        }

        drop(self.listener);
        if !connections.is_empty() {
            log::info!("Closing {} open connection(s)", connections.len());
        }
        connections.shutdown().await;

        notify(
            &self.hooks,
            ServerEvent::Stopped {
                transport: TransportKind::Tcp,
            },
        );
        result
    }
}

/// Accept failures that concern one pending connection or a temporary
/// resource shortage. The listening socket itself is still usable.
fn is_transient_accept_error(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::OutOfMemory
    ) {
        return true;
    }
    // ENFILE / EMFILE: out of file descriptors until some connections close.
    #[cfg(unix)]
    {
        matches!(err.raw_os_error(), Some(23 | 24))
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Serve one connection: read a request, answer it, repeat.
///
/// Returns `Ok(())` when the peer closes the connection between requests.
/// A truncated frame, an invalid length, an unsupported function code or an
/// out-of-range request ends the connection with an error and no response.
pub async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    map: &SharedRegisterMap,
    hooks: &HookChain,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let mut header_buf = [0u8; MBAP_HEADER_LEN];
        match stream.read_exact(&mut header_buf).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err).context("Failed to read MBAP header"),
        }
        let header = MbapHeader::parse(header_buf);

        let mut pdu = vec![0u8; header.pdu_len()?];
        stream
            .read_exact(&mut pdu)
            .await
            .context("Truncated Modbus/TCP PDU")?;
        log::debug!(
            "TCP request from {peer}: {} {}",
            format_hex_bytes(&header_buf),
            format_hex_bytes(&pdu)
        );

        let request = ReadRequest::parse(&pdu)?;
        let response = {
            let snapshot = map.snapshot();
            let pdu = build_read_response(&snapshot, &request, &mut rand::rng());
            build_tcp_response(&header, &pdu)
        };
        log::debug!("TCP response to {peer}: {}", format_hex_bytes(&response));

        stream
            .write_all(&response)
            .await
            .context("Failed to write Modbus/TCP response")?;
        notify(
            hooks,
            ServerEvent::served(TransportKind::Tcp, header.unit_id, &request),
        );
    }
}
