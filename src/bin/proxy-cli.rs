use clap::{Parser, Subcommand};
use serde_json::Value;

use request_proxy::http::ErrorEnvelope;
use request_proxy::proxy::message::{ProxyOptions, ProxyRequest};
use request_proxy::proxy::payload::RequestPayload;
use request_proxy::proxy::transport::TransportOptions;
use request_proxy::{ProxyMessage, ProxyResult};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Command-line client for the request proxy service", long_about = None)]
struct Cli {
    /// Base URL of the service, including any API prefix.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a request through the proxy and print the result
    Send {
        /// HTTP method of the proxied request
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// URL the proxy should call
        #[arg(short, long)]
        target: String,

        /// Header line `name: value`; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body, sent as text
        #[arg(short, long)]
        data: Option<String>,

        /// Use the native transport (required for https targets)
        #[arg(long)]
        native: bool,

        /// Exchange timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Send {
            method,
            target,
            headers,
            data,
            native,
            timeout,
        } => {
            let message = ProxyMessage {
                request: Some(ProxyRequest {
                    method,
                    url: target,
                    headers: (!headers.is_empty()).then(|| headers.join("\n")),
                    payload: data.map(RequestPayload::Text),
                    blob: None,
                    multipart: None,
                }),
                config: Some(ProxyOptions {
                    native,
                    transport: TransportOptions {
                        timeout,
                        ..TransportOptions::default()
                    },
                }),
            };

            let res = client
                .post(format!("{}/proxy", cli.url.trim_end_matches('/')))
                .json(&message)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: proxy returned status {}", status);
        let text = res.text().await?;
        match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(envelope) => eprintln!("{}: {}", envelope.code, envelope.message),
            Err(_) => eprintln!("Response: {}", text),
        }
        return Ok(());
    }

    let result: ProxyResult = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&readable(&result)?)?);
    Ok(())
}

/// Result JSON with bodies shown as text when they are valid UTF-8.
fn readable(result: &ProxyResult) -> Result<Value, serde_json::Error> {
    let mut json = serde_json::to_value(result)?;
    if let Some(payload) = result.response.payload() {
        if let Ok(text) = std::str::from_utf8(payload.as_bytes()) {
            json["response"]["payload"] = Value::String(text.to_string());
        }
    }
    if let Some(message) = &result.transport.http_message {
        if let Ok(text) = std::str::from_utf8(message.as_bytes()) {
            json["transport"]["httpMessage"] = Value::String(text.to_string());
        }
    }
    Ok(json)
}
