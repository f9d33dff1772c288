use crate::protocol::{ClientRequest, RequestEnvelope, ResponseEnvelope, ServerResponse};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use thiserror::Error;
use tickerflow::{Aggregator, error::ConfigError};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

mod protocol;

/// Default listen address, overridden by `TICKERFLOW_SERVER_ADDR`.
const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:9010";

/// Pending responses buffered per client.
const CLIENT_BUFFER: usize = 64;

#[derive(Debug, Error)]
enum ServerError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid server address {0}: {1}")]
    Addr(String, std::net::AddrParseError),

    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),

    #[error("invalid request: {0}")]
    Request(#[from] serde_json::Error),

    #[error("ticker must not be empty")]
    EmptyTicker,
}

#[tokio::main]
async fn main() {
    // Best effort: a missing .env file is not an error
    let _ = dotenvy::dotenv();

    init_logging();

    if let Err(error) = run().await {
        error!(%error, "tickerflow-server terminated");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ServerError> {
    info!("Starting tickerflow WebSocket server");

    let aggregator = Aggregator::from_env()?;
    info!(?aggregator, "Aggregator initialised");

    let raw_addr = std::env::var("TICKERFLOW_SERVER_ADDR")
        .unwrap_or_else(|_| DEFAULT_SERVER_ADDR.to_string());
    let addr = raw_addr
        .parse::<SocketAddr>()
        .map_err(|error| ServerError::Addr(raw_addr.clone(), error))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|error| ServerError::Bind(addr, error))?;

    info!("WebSocket server listening on ws://{}", addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    info!("New WebSocket connection from {}", peer_addr);
                    tokio::spawn(handle_client(stream, peer_addr, aggregator.clone()));
                }
                Err(error) => warn!(%error, "failed to accept connection"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                return Ok(());
            }
        }
    }
}

/// Handle individual WebSocket client connection
async fn handle_client(stream: TcpStream, peer_addr: SocketAddr, aggregator: Aggregator) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", peer_addr, e);
            return;
        }
    };

    info!("WebSocket handshake completed for {}", peer_addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<ResponseEnvelope>(CLIENT_BUFFER);

    let welcome = ResponseEnvelope {
        id: None,
        response: ServerResponse::Welcome {
            message: "Connected to tickerflow".to_string(),
            timestamp: Utc::now(),
        },
    };
    let _ = tx.send(welcome).await;

    // Forward responses, in completion order, to this client
    let mut send_task = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            let json = match serde_json::to_string(&response) {
                Ok(json) => json,
                Err(error) => {
                    warn!(%error, "failed to serialise response");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Each request is served on its own task so a slow snapshot never blocks the connection
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_)) => {
                    debug!("Received ping from {}", peer_addr);
                }
                Ok(Message::Text(text)) => {
                    debug!("Received text from {}: {}", peer_addr, text);
                    let aggregator = aggregator.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let response = respond(&aggregator, text.as_str()).await;
                        let _ = tx.send(response).await;
                    });
                }
                Err(e) => {
                    error!("WebSocket error for {}: {}", peer_addr, e);
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            info!("Send task completed for {}", peer_addr);
            recv_task.abort();
        }
        _ = &mut recv_task => {
            info!("Receive task completed for {}", peer_addr);
            send_task.abort();
        }
    }

    info!("WebSocket connection closed for {}", peer_addr);
}

/// Parse and serve one request frame. Failures become `error` responses.
async fn respond(aggregator: &Aggregator, text: &str) -> ResponseEnvelope {
    let RequestEnvelope { id, request } = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(error) => {
            let error = ServerError::Request(error);
            debug!(%error, "rejecting request");
            return ResponseEnvelope {
                id: None,
                response: ServerResponse::error(error),
            };
        }
    };

    let kind = request.kind();
    let response = match serve(aggregator, request).await {
        Ok(response) => response,
        Err(error) => {
            debug!(kind, %error, "request failed");
            ServerResponse::error(error)
        }
    };

    ResponseEnvelope { id, response }
}

async fn serve(
    aggregator: &Aggregator,
    request: ClientRequest,
) -> Result<ServerResponse, ServerError> {
    let response = match request {
        ClientRequest::Snapshot(request) => {
            if request.ticker.is_empty() {
                return Err(ServerError::EmptyTicker);
            }
            ServerResponse::Snapshot(aggregator.snapshot(request).await)
        }
        ClientRequest::Invalidate { ticker, category } => {
            if ticker.is_empty() {
                return Err(ServerError::EmptyTicker);
            }
            let removed = match category {
                Some(category) => aggregator.invalidate(&ticker, category),
                None => aggregator.invalidate_ticker(&ticker),
            };
            ServerResponse::Invalidated {
                ticker,
                category,
                removed,
            }
        }
        ClientRequest::Filings { ticker, query } => {
            match aggregator.filings(&ticker, &query).await {
                Ok(filings) => ServerResponse::Filings {
                    key: ticker.to_string(),
                    filings,
                },
                Err(error) => ServerResponse::error(error),
            }
        }
        ClientRequest::InstitutionFilings { cik, force_refresh } => {
            match aggregator.institution_filings(&cik, force_refresh).await {
                Ok(filings) => ServerResponse::Filings {
                    key: cik.trim().to_string(),
                    filings,
                },
                Err(error) => ServerResponse::error(error),
            }
        }
    };

    Ok(response)
}

/// Initialise logging from `RUST_LOG`, defaulting to `info`.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
