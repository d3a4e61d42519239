use std::future::Future;
use std::time::Duration;

use clap::{Parser, Subcommand};
use envelope::{ErrorObject, Notification};
use gns3_link::{ClientConfig, RpcError, Session, SessionHandle};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("could not connect to {url}")]
    Connect { url: String },
    #[error("rpc failed: {0}")]
    Rpc(#[from] RpcError),
    #[error("server returned error for {method}: {error}")]
    ServerError { method: String, error: ErrorObject },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("failed to wait for ctrl-c: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "gns3-cli", about = "JSON-RPC client for emulation servers")]
struct Cli {
    #[arg(long, help = "Server URL [env: GNS3_SERVER_URL] [default: ws://127.0.0.1:8000/]")]
    url: Option<String>,

    #[arg(long = "header", value_parser = parse_header, help = "Extra handshake header, NAME=VALUE")]
    headers: Vec<(String, String)>,

    #[arg(long = "protocol", help = "Websocket sub-protocol to offer")]
    protocols: Vec<String>,

    #[arg(long, help = "Ping interval, 0 disables [env: GNS3_HEARTBEAT_SECS]")]
    heartbeat_secs: Option<u64>,

    #[arg(long, help = "Handshake and reply timeout [env: GNS3_CONNECT_TIMEOUT_SECS] [default: 10]")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Layer command-line flags over `base`, normally [`ClientConfig::from_env`].
    fn client_config(&self, base: ClientConfig) -> ClientConfig {
        let mut config = base;
        if let Some(url) = &self.url {
            config.url.clone_from(url);
        }
        if let Some(secs) = self.heartbeat_secs {
            config = config.with_heartbeat(Duration::from_secs(secs));
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_connect_timeout(Duration::from_secs(secs));
        }
        for (name, value) in &self.headers {
            config = config.with_header(name, value);
        }
        for protocol in &self.protocols {
            config = config.with_protocol(protocol);
        }
        config
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call a method and print its result.
    Call {
        method: String,
        #[arg(long, help = "JSON params")]
        params: Option<String>,
    },
    /// Send a notification and exit.
    Notify {
        method: String,
        #[arg(long, help = "JSON params")]
        params: Option<String>,
    },
    /// Print server notifications as JSON lines.
    Listen {
        #[arg(long, help = "Stop after this many seconds")]
        duration_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.client_config(ClientConfig::from_env());
    match cli.command {
        Command::Call { method, params } => run_call(config, &method, params.as_deref()).await,
        Command::Notify { method, params } => {
            run_notify(config, &method, params.as_deref()).await
        }
        Command::Listen { duration_secs } => {
            run_listen(config, duration_secs.map(Duration::from_secs)).await
        }
    }
}

async fn run_call(config: ClientConfig, method: &str, params: Option<&str>) -> Result<(), CliError> {
    let params = parse_params(params)?;
    let timeout = config.connect_timeout;
    let url = config.url.clone();
    let session = Session::connect(config);
    connect(&session, &url).await?;

    let outcome = with_timeout(timeout, session.call(method, params)).await?;
    shutdown(&session, timeout).await;

    match outcome {
        Ok(result) => print_json(&result),
        Err(err) => {
            print_json(&err.payload())?;
            Err(match err {
                RpcError::Remote(error) => CliError::ServerError {
                    method: method.to_owned(),
                    error,
                },
                other => other.into(),
            })
        }
    }
}

async fn run_notify(config: ClientConfig, method: &str, params: Option<&str>) -> Result<(), CliError> {
    let params = parse_params(params)?;
    let timeout = config.connect_timeout;
    let url = config.url.clone();
    let session = Session::connect(config);
    connect(&session, &url).await?;

    session.notify(method, params).await?;
    shutdown(&session, timeout).await;
    Ok(())
}

async fn run_listen(config: ClientConfig, duration: Option<Duration>) -> Result<(), CliError> {
    let timeout = config.connect_timeout;
    let url = config.url.clone();
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    let session = Session::connect_with_sink(config, tx);
    connect(&session, &url).await?;
    eprintln!("listening on {url}");

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            notification = rx.recv() => {
                // Sink sender lives in the session; `None` means it ended.
                let Some(notification) = notification else { break };
                println!("{}", serde_json::to_string(&notification)?);
            }
            () = &mut deadline => break,
            result = &mut ctrl_c => {
                result?;
                break;
            }
        }
    }

    shutdown(&session, timeout).await;
    Ok(())
}

async fn connect(session: &SessionHandle, url: &str) -> Result<(), CliError> {
    // The handshake is already bounded by the connect timeout.
    session.wait_connected().await.map_err(|_| CliError::Connect {
        url: url.to_owned(),
    })?;
    tracing::debug!(conn_id = %session.conn_id(), "cli: connected");
    Ok(())
}

async fn shutdown(session: &SessionHandle, timeout: Duration) {
    session.close();
    if tokio::time::timeout(timeout, session.closed()).await.is_err() {
        tracing::warn!(conn_id = %session.conn_id(), "cli: session did not close in time");
    }
}

async fn with_timeout<T>(timeout: Duration, fut: impl Future<Output = T>) -> Result<T, CliError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| CliError::Timeout(timeout))
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let Some((name, value)) = raw.split_once('=') else {
        return Err(format!("invalid header `{raw}`; expected NAME=VALUE"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("invalid header `{raw}`; name is empty"));
    }
    Ok((name.to_owned(), value.trim().to_owned()))
}

fn parse_params(raw: Option<&str>) -> Result<Option<Value>, CliError> {
    raw.map(serde_json::from_str::<Value>)
        .transpose()
        .map_err(CliError::from)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
