//! CLI entry point: parses flags, brings up logging, builds a
//! [`Coordinator`] and runs it to completion or fault (spec section 1.3).

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use t1c_core::coordinator::{CoreConfig, Coordinator};

/// Firmware core for a handheld thermal-imaging camera.
#[derive(Parser, Debug)]
#[command(name = "t1c-core", version, about)]
struct Args {
    /// Root of the persistent config store and correction-table assets.
    #[arg(long, default_value = "/var/lib/t1c-core")]
    config_dir: PathBuf,

    /// Serial device the T1C sensor is attached to.
    #[arg(long, default_value = "/dev/ttyACM0")]
    serial_device: String,

    /// Baud rate for the serial link.
    #[arg(long, default_value_t = 921_600)]
    serial_baud: u32,

    /// Bind address for the websocket remote-control/stream transport.
    /// Omit to run with no remote surface.
    #[arg(long)]
    ws_addr: Option<SocketAddr>,

    /// Run C4/C5 against in-memory fakes instead of real hardware.
    #[arg(long)]
    mock: bool,

    /// Increase log verbosity (stacks; overrides `RUST_LOG` when present).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Firmware version string reported over the command bus and
    /// embedded in file-save metadata.
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    firmware_version: String,
}

fn main() {
    let args = Args::parse();
    if args.verbose > 0 && std::env::var("RUST_LOG").is_err() {
        let level = match args.verbose {
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", level);
    }
    let _logging_guard = env_tracing_logger::init();

    let mac = read_mac_or_default();
    let config = CoreConfig {
        config_dir: args.config_dir,
        mac,
        mock: args.mock,
        serial_device: args.serial_device,
        serial_baud: args.serial_baud,
        ws_addr: args.ws_addr,
        firmware_version: args.firmware_version,
    };

    if let Err(e) = Coordinator::new(config).run() {
        tracing::error!(error = %e, "coordinator exited on fault");
        std::process::exit(1);
    }
}

/// Best-effort MAC address read, used only to seed the network record's
/// default AP SSID suffix (spec section 6). A mock/dev box with no real
/// interface falls back to a fixed placeholder.
fn read_mac_or_default() -> [u8; 6] {
    for iface in ["eth0", "wlan0", "end0"] {
        let path = format!("/sys/class/net/{iface}/address");
        if let Ok(s) = std::fs::read_to_string(&path) {
            let mut mac = [0u8; 6];
            let mut ok = true;
            for (i, byte) in s.trim().split(':').enumerate().take(6) {
                match u8::from_str_radix(byte, 16) {
                    Ok(b) => mac[i] = b,
                    Err(_) => {
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                return mac;
            }
        }
    }
    [0x02, 0x00, 0x00, 0x00, 0x00, 0x01]
}
