use std::path::PathBuf;

use clap::{Parser, Subcommand};

use spp::Address;


/// Default location of the method-channel socket
pub const DEFAULT_SOCKET: &str = "/tmp/sppctrl.sock";


/// Talk to Bluetooth serial port (SPP) devices from the command line
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Give up connecting after this many seconds (wait indefinitely if
    /// unspecified)
    #[arg(long, global=true, value_name="SECS")]
    pub connect_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List paired devices
    Devices {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Connect to a device and send data to it
    Send {
        /// Address of the device to connect to
        address: Address,

        /// Data to send
        data: String,

        /// Append a newline to the data
        #[arg(short, long)]
        newline: bool,
    },

    /// Serve the method channel on a Unix domain socket
    Serve {
        /// Path of the socket to listen on
        #[arg(short, long, default_value=DEFAULT_SOCKET)]
        socket: PathBuf,
    },

    /// Call a method on a running server
    Call {
        /// Path of the server socket
        #[arg(short, long, default_value=DEFAULT_SOCKET)]
        socket: PathBuf,

        /// Method to call (e.g. getPairedDevices, connectToDevice, sendData)
        method: String,

        /// Method arguments
        #[arg(value_name="KEY=VALUE", value_parser=parse_argument)]
        arguments: Vec<(String, String)>,
    },
}

fn parse_argument(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, _)) if key.is_empty() => Err("argument name must not be empty".to_string()),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
