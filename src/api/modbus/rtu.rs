use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use std::io::{ErrorKind, Read, Write};

use super::{
    handlers::ServerControl,
    traits::{notify, notify_error, HookChain, ServerEvent, TransportKind},
};
use crate::{
    protocol::{
        modbus::{build_read_response, build_rtu_response, parse_rtu_request, ReadRequest, RtuFramer},
        register::{RegisterMap, SharedRegisterMap},
    },
    utils::format_hex_bytes,
};

/// Outcome of one complete RTU frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RtuReply {
    /// Response bytes to write back, with the request they answer.
    Respond(Bytes, ReadRequest),
    /// The frame is addressed to another unit.
    OtherUnit(u8),
    /// Wrong length or unsupported/invalid request.
    Invalid(String),
}

/// Turn one CRC-checked frame into the response this unit should send.
pub fn handle_rtu_frame(frame: &[u8], unit_id: u8, map: &RegisterMap) -> RtuReply {
    if frame.first() != Some(&unit_id) {
        return RtuReply::OtherUnit(frame.first().copied().unwrap_or_default());
    }
    let request = match parse_rtu_request(frame) {
        Ok((_, request)) => request,
        Err(err) => return RtuReply::Invalid(err.to_string()),
    };
    let pdu = build_read_response(map, &request, &mut rand::rng());
    RtuReply::Respond(build_rtu_response(unit_id, &pdu), request)
}

/// Serial reader loop for the RTU server.
///
/// Bytes are read one at a time and fed to an [`RtuFramer`]. Reads time out
/// (the port's configured timeout) so the loop re-checks `control` between
/// bytes. A response write in progress is never interrupted.
pub struct SerialReader<P> {
    port: P,
    unit_id: u8,
    framer: RtuFramer,
}

impl<P: Read + Write> SerialReader<P> {
    pub fn new(port: P, unit_id: u8) -> Self {
        Self {
            port,
            unit_id,
            framer: RtuFramer::new(),
        }
    }

    pub fn run(
        &mut self,
        map: &SharedRegisterMap,
        hooks: &HookChain,
        control: &ServerControl,
    ) -> Result<()> {
        let mut byte = [0u8; 1];
        while control.is_running() {
            match self.port.read(&mut byte) {
                Ok(0) => continue,
                Ok(_) => {}
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(err) => return Err(err).context("Serial read failed"),
            }

            let Some(frame) = self.framer.push(byte[0]) else {
                continue;
            };
            log::debug!("RTU frame: {}", format_hex_bytes(&frame));

            match handle_rtu_frame(&frame, self.unit_id, &map.snapshot()) {
                RtuReply::Respond(response, request) => {
                    log::debug!("RTU response: {}", format_hex_bytes(&response));
                    if let Err(err) = self
                        .port
                        .write_all(&response)
                        .and_then(|_| self.port.flush())
                    {
                        notify_error(hooks, "RTU write", &anyhow!(err));
                        continue;
                    }
                    notify(
                        hooks,
                        ServerEvent::served(TransportKind::Rtu, self.unit_id, &request),
                    );
                }
                RtuReply::OtherUnit(unit) => notify(
                    hooks,
                    ServerEvent::FrameDropped {
                        transport: TransportKind::Rtu,
                        reason: format!("addressed to unit {unit}"),
                    },
                ),
                RtuReply::Invalid(reason) => notify(
                    hooks,
                    ServerEvent::FrameDropped {
                        transport: TransportKind::Rtu,
                        reason,
                    },
                ),
            }
        }
        Ok(())
    }

    pub fn into_inner(self) -> P {
        self.port
    }
}
