pub mod actions;
pub mod config;
pub mod csv;

use clap::{Arg, ArgMatches, Command};

/// Parse command line arguments and return ArgMatches.
pub fn parse_args() -> ArgMatches {
    command().get_matches()
}

pub fn command() -> Command {
    Command::new("modsim")
        .about("Modbus TCP/RTU slave emulator serving synthesized register values")
        .arg(
            Arg::new("mode")
                .long("mode")
                .short('m')
                .help("Transport to serve")
                .value_name("MODE")
                .value_parser(["tcp", "rtu"]),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .help("TCP listen address")
                .value_name("HOST"),
        )
        .arg(
            Arg::new("tcp-port")
                .long("tcp-port")
                .help("TCP listen port (default 502)")
                .value_name("PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("serial-port")
                .long("serial-port")
                .help("Serial device for RTU mode, e.g. /dev/ttyUSB0 or COM3")
                .value_name("PORT"),
        )
        .arg(
            Arg::new("baudrate")
                .long("baudrate")
                .help("Serial baud rate (default 9600)")
                .value_name("BAUD")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("unit-id")
                .long("unit-id")
                .help("RTU unit id answered by the emulator (default 1)")
                .value_name("ID")
                .value_parser(clap::value_parser!(u8)),
        )
        .arg(
            Arg::new("poll-interval-ms")
                .long("poll-interval-ms")
                .help("How often the server re-checks for shutdown (default 1000 for TCP, 100 for RTU)")
                .value_name("MS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("JSON simulator configuration")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("map")
                .long("map")
                .help("Import the register map from a CSV file (replaces entries from --config)")
                .value_name("CSV"),
        )
        .arg(
            Arg::new("export")
                .long("export")
                .help("Write the loaded register map to a CSV file and exit")
                .value_name("CSV"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Append log records to this file (also MODSIM_LOG_FILE)")
                .value_name("FILE"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_well_formed() {
        command().debug_assert();
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(command()
            .try_get_matches_from(["modsim", "--mode", "udp"])
            .is_err());
    }
}
