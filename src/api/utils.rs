use anyhow::{anyhow, Result};
use std::time::Duration;

/// Open a serial port for the RTU server, enabling exclusive access on Unix systems.
///
/// `timeout` bounds every read so the serial reader can notice a stop request.
pub fn open_serial_port(
    port: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<Box<dyn serialport::SerialPort>> {
    if port.trim().is_empty() {
        return Err(anyhow!(
            "No serial port configured for RTU mode. Use --serial-port <PORT>."
        ));
    }

    let builder = serialport::new(port, baud_rate).timeout(timeout);

    #[cfg(unix)]
    {
        let mut handle = builder
            .open_native()
            .map_err(|err| anyhow!("Failed to open serial port {port}: {err}"))?;
        handle
            .set_exclusive(true)
            .map_err(|err| anyhow!("Failed to acquire exclusive access to {port}: {err}"))?;
        Ok(Box::new(handle))
    }

    #[cfg(not(unix))]
    {
        builder
            .open()
            .map_err(|err| anyhow!("Failed to open serial port {port}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_port_name_is_a_configuration_error() {
        let err = open_serial_port("", 9600, Duration::from_millis(100))
            .err()
            .unwrap();
        assert!(err.to_string().contains("--serial-port"));
    }

    #[test]
    fn nonexistent_port_fails_to_open() {
        assert!(open_serial_port("/dev/modsim-does-not-exist", 9600, Duration::from_millis(100)).is_err());
    }
}
