//! Observer interface between the transports and whatever renders server
//! status (log output, a status panel, tests).
//!
//! Hooks are called synchronously from the transport tasks, so
//! implementations must return quickly.
use anyhow::Error;
use serde::Serialize;
use std::{net::SocketAddr, sync::Arc};
use strum::Display;

use crate::protocol::{modbus::ReadRequest, register::FunctionCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "UPPERCASE")]
pub enum TransportKind {
    Tcp,
    Rtu,
}

/// Something that happened inside a running server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    Listening {
        transport: TransportKind,
        endpoint: String,
    },
    ConnectionOpened {
        peer: SocketAddr,
    },
    ConnectionClosed {
        peer: SocketAddr,
    },
    RequestServed {
        transport: TransportKind,
        unit_id: u8,
        function: FunctionCode,
        start: u16,
        quantity: u16,
        timestamp: String,
    },
    FrameDropped {
        transport: TransportKind,
        reason: String,
    },
    Stopped {
        transport: TransportKind,
    },
}

impl ServerEvent {
    pub(crate) fn served(transport: TransportKind, unit_id: u8, request: &ReadRequest) -> Self {
        Self::RequestServed {
            transport,
            unit_id,
            function: request.function,
            start: request.start,
            quantity: request.quantity,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub trait ServerHook: Send + Sync {
    fn on_event(&self, _event: &ServerEvent) {}

    /// Called for errors that end one connection or drop one frame.
    /// The server itself keeps running.
    fn on_error(&self, _source: &str, _error: &Error) {}
}

/// Ordered list of hooks shared by every task of one server.
pub type HookChain = Arc<[Arc<dyn ServerHook>]>;

pub(crate) fn notify(hooks: &HookChain, event: ServerEvent) {
    for hook in hooks.iter() {
        hook.on_event(&event);
    }
}

pub(crate) fn notify_error(hooks: &HookChain, source: &str, error: &Error) {
    for hook in hooks.iter() {
        hook.on_error(source, error);
    }
}

/// Renders server status through the `log` facade.
pub struct LoggingHook;

impl ServerHook for LoggingHook {
    fn on_event(&self, event: &ServerEvent) {
        match event {
            ServerEvent::Listening {
                transport,
                endpoint,
            } => log::info!("{transport} server listening on {endpoint}"),
            ServerEvent::ConnectionOpened { peer } => log::info!("Connection opened: {peer}"),
            ServerEvent::ConnectionClosed { peer } => log::info!("Connection closed: {peer}"),
            ServerEvent::RequestServed {
                transport,
                unit_id,
                function,
                start,
                quantity,
                ..
            } => log::debug!(
                "{transport} served function {function} for unit {unit_id}: start={start}, quantity={quantity}"
            ),
            ServerEvent::FrameDropped { transport, reason } => {
                log::debug!("{transport} frame dropped: {reason}")
            }
            ServerEvent::Stopped { transport } => log::info!("{transport} server stopped"),
        }
    }

    fn on_error(&self, source: &str, error: &Error) {
        log::warn!("{source}: {error:#}");
    }
}
