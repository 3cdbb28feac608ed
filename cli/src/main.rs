mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use futures::Future;

use serde_json::{Map, Value};

use spp::channel::client::{Client, ClientHandle};
use spp::channel::server;
use spp::host::Granted;
use spp::host::bluez::BluezHost;
use spp::{Manager, ManagerConfig, ManagerHandle};

use tokio::net::{UnixListener, UnixStream};

use cli::*;


#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = ManagerConfig {
        connect_timeout: args.connect_timeout.map(Duration::from_secs),
        ..Default::default()
    };

    match args.command {
        Command::Devices { json } => {
            let manager = start_manager(config).await?;
            cmd_devices(manager, json).await
        },
        Command::Send { address, data, newline } => {
            let manager = start_manager(config).await?;
            cmd_send(manager, address, data, newline).await
        },
        Command::Serve { socket } => {
            let manager = start_manager(config).await?;
            cmd_serve(manager, &socket).await
        },
        Command::Call { socket, method, arguments } => {
            let stream = UnixStream::connect(&socket).await?;
            let client = Client::new(stream);
            let handle = client.handle();

            run(client, cmd_call(handle, method, arguments)).await
        },
    }
}

async fn start_manager(config: ManagerConfig) -> Result<ManagerHandle> {
    let host = BluezHost::new().await?;
    Ok(Manager::spawn(Arc::new(host), Arc::new(Granted), config))
}

async fn cmd_devices(manager: ManagerHandle, json: bool) -> Result<()> {
    let devices = manager.paired_devices().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if devices.is_empty() {
        println!("no paired devices");
    }

    for dev in devices {
        println!("{}  {}", dev.address, dev.name);
    }

    Ok(())
}

async fn cmd_send(manager: ManagerHandle, address: spp::Address, mut data: String, newline: bool) -> Result<()> {
    if newline {
        data.push('\n');
    }

    manager.connect_to(address).await?;
    tracing::debug!(address=%address, "connected");

    manager.send(&data).await?;
    manager.disconnect().await?;

    Ok(())
}

async fn cmd_serve(manager: ManagerHandle, socket: &Path) -> Result<()> {
    if socket.exists() {
        anyhow::bail!("socket {} already exists, is another instance running?", socket.display());
    }

    let listener = UnixListener::bind(socket)?;
    tracing::info!(socket=%socket.display(), "serving method channel");

    let result = tokio::select! {
        res = accept_loop(&listener, manager) => res,
        sig = tokio::signal::ctrl_c() => {
            tracing::trace!("server termination requested");
            sig.map_err(anyhow::Error::from)
        },
    };

    tokio::fs::remove_file(socket).await?;
    result
}

async fn accept_loop(listener: &UnixListener, manager: ManagerHandle) -> Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        tracing::debug!("client connected");

        let manager = manager.clone();
        tokio::spawn(async move {
            match server::serve(stream, manager).await {
                Ok(()) => tracing::debug!("client disconnected"),
                Err(err) => tracing::warn!(error=?err, "client connection failed"),
            }
        });
    }
}

async fn cmd_call(handle: ClientHandle<UnixStream>, method: String, arguments: Vec<(String, String)>) -> Result<()> {
    let arguments: Map<String, Value> = arguments.into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();

    let value = handle.call(&method, arguments).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);

    Ok(())
}

pub async fn run<F>(mut client: Client<UnixStream>, task: F) -> Result<()>
where
    F: Future<Output=Result<(), anyhow::Error>>,
{
    tokio::select! {
        res = client.run() => {
            res?;
            anyhow::bail!("server closed the connection unexpectedly");
        },
        res = task => {
            res?;
            tracing::trace!("task terminated successfully");
        }
        sig = tokio::signal::ctrl_c() => {
            sig?;
            tracing::trace!("client termination requested");
        },
    }

    Ok(())
}
