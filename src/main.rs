use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use orionbms_lib::transport::{ConnectionStrategy, TcpTransport};
use orionbms_lib::BmsClient;
use std::{ops::Deref, panic, time::Duration};

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Show per-cell voltages, probe temperatures and software version
    Voltage,
    /// Show pack current, protection flags, MOS and failure status
    CurrentStatus,
    /// Show state of charge, capacities and pack voltage summary
    CapacityStatus,
    /// Show the device serial number
    SerialNumber,
    /// Open the charge MOS
    AllowCharge,
    /// Close the charge MOS
    DisallowCharge,
    /// Open the discharge MOS
    AllowDischarge,
    /// Close the discharge MOS
    DisallowDischarge,
    /// Run every read command; failures are reported per command
    All,
}

const fn about_text() -> &'static str {
    "orion bms command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
struct CliArgs {
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// Hostname or IP of the serial-to-TCP bridge
    #[arg(long)]
    host: String,

    /// TCP port of the bridge
    #[arg(long, default_value_t = 8899)]
    port: u16,

    /// Device address on the bus
    #[arg(long, default_value_t = 0x01)]
    address: u8,

    #[command(subcommand)]
    command: CliCommands,

    /// Timeout for reading a response (e.g., "500ms", "3s")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "3s")]
    timeout: Duration,

    // The battery drops frames sent while it is still answering, so keep a
    // safe gap between requests.
    /// Minimum spacing between consecutive requests (e.g., "100ms")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "100ms")]
    min_spacing: Duration,

    /// Open a fresh connection per request instead of keeping one alive
    #[arg(long, action)]
    per_request: bool,
}

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

fn print_json<T: serde::Serialize>(label: &str, value: &T) -> Result<()> {
    println!(
        "{label}: {}",
        serde_json::to_string_pretty(value).with_context(|| "Cannot serialize response")?
    );
    Ok(())
}

macro_rules! print_voltage {
    ($bms:expr) => {
        print_json(
            "Voltage",
            &$bms
                .read_voltage_data()
                .with_context(|| "Cannot read voltage data")?,
        )?
    };
}
macro_rules! print_current_status {
    ($bms:expr) => {
        print_json(
            "Current status",
            &$bms
                .read_current_status()
                .with_context(|| "Cannot read current status")?,
        )?
    };
}
macro_rules! print_capacity_status {
    ($bms:expr) => {
        print_json(
            "Capacity status",
            &$bms
                .read_capacity_status()
                .with_context(|| "Cannot read capacity status")?,
        )?
    };
}
macro_rules! print_serial_number {
    ($bms:expr) => {
        print_json(
            "Serial number",
            &$bms
                .read_serial_number()
                .with_context(|| "Cannot read serial number")?,
        )?
    };
}

fn print_all(bms: &BmsClient) -> Result<()> {
    let mut failures = 0u32;
    match bms.read_voltage_data() {
        Ok(r) => print_json("Voltage", &r)?,
        Err(e) => {
            failures += 1;
            error!("Cannot read voltage data: {e}");
        }
    }
    match bms.read_current_status() {
        Ok(r) => print_json("Current status", &r)?,
        Err(e) => {
            failures += 1;
            error!("Cannot read current status: {e}");
        }
    }
    match bms.read_capacity_status() {
        Ok(r) => print_json("Capacity status", &r)?,
        Err(e) => {
            failures += 1;
            error!("Cannot read capacity status: {e}");
        }
    }
    match bms.read_serial_number() {
        Ok(r) => print_json("Serial number", &r)?,
        Err(e) => {
            failures += 1;
            error!("Cannot read serial number: {e}");
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} of 4 read commands failed");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());

    let strategy = if args.per_request {
        ConnectionStrategy::PerRequest
    } else {
        ConnectionStrategy::Persistent
    };
    let transport = TcpTransport::new(args.host.clone(), args.port)
        .with_read_timeout(args.timeout)
        .with_strategy(strategy);
    let bms = BmsClient::new(transport);
    bms.set_address(args.address);
    bms.set_min_spacing(args.min_spacing);

    match args.command {
        CliCommands::Voltage => print_voltage!(bms),
        CliCommands::CurrentStatus => print_current_status!(bms),
        CliCommands::CapacityStatus => print_capacity_status!(bms),
        CliCommands::SerialNumber => print_serial_number!(bms),
        CliCommands::AllowCharge => {
            bms.allow_charge().with_context(|| "Cannot allow charge")?;
            println!("Charge MOS opened");
        }
        CliCommands::DisallowCharge => {
            bms.disallow_charge()
                .with_context(|| "Cannot disallow charge")?;
            println!("Charge MOS closed");
        }
        CliCommands::AllowDischarge => {
            bms.allow_discharge()
                .with_context(|| "Cannot allow discharge")?;
            println!("Discharge MOS opened");
        }
        CliCommands::DisallowDischarge => {
            bms.disallow_discharge()
                .with_context(|| "Cannot disallow discharge")?;
            println!("Discharge MOS closed");
        }
        CliCommands::All => print_all(&bms)?,
    }

    Ok(())
}
