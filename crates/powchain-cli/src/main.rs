use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use powchain_core::{Block, ProgressEvent};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "powchain-cli")]
#[command(about = "CLI client for the proof-of-work ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8000)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8000")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction to the pending pool
    Submit {
        /// Sender
        #[arg(long)]
        sender: String,
        /// Recipient
        #[arg(long)]
        recipient: String,
        /// Amount
        #[arg(long)]
        amount: f64,
    },
    /// Mine the pending pool into a new block and print it
    Mine,
    /// Mine while streaming every proof attempt
    Watch,
    /// Print the whole chain and pending pool
    Chain,
    /// Print one block by index
    Block { index: u64 },
    /// Find blocks whose transactions match a query
    Search { query: String },
    /// Ask the node to re-verify the chain
    Validate,
}

#[derive(Serialize)]
struct Tx {
    sender: String,
    recipient: String,
    amount: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let node = cli.node.trim_end_matches('/');
    match cli.cmd {
        Command::Submit {
            sender,
            recipient,
            amount,
        } => {
            let tx = Tx {
                sender,
                recipient,
                amount,
            };
            let res = client
                .post(format!("{node}/transactions/new"))
                .json(&tx)
                .send()
                .await?;
            print_response(res).await?;
        }
        Command::Mine => {
            let res = client.post(format!("{node}/mine")).send().await?;
            let block: Block = checked(res).await?.json().await?;
            println!("{}", serde_json::to_string_pretty(&block)?);
        }
        Command::Watch => watch(&client, node).await?,
        Command::Chain => print_get(&client, format!("{node}/chain")).await?,
        Command::Block { index } => print_get(&client, format!("{node}/blocks/{index}")).await?,
        Command::Search { query } => {
            let res = client
                .get(format!("{node}/search"))
                .query(&[("q", query)])
                .send()
                .await?;
            print_response(res).await?;
        }
        Command::Validate => print_get(&client, format!("{node}/chain/validate")).await?,
    }
    Ok(())
}

async fn checked(res: reqwest::Response) -> Result<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    bail!("node returned {status}: {body}")
}

async fn print_get(client: &reqwest::Client, url: String) -> Result<()> {
    debug!(%url, "GET");
    let res = client.get(url).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await?;
    println!("status: {status}");
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}

async fn watch(client: &reqwest::Client, node: &str) -> Result<()> {
    let res = client.get(format!("{node}/mine/stream")).send().await?;
    let mut body = checked(res).await?.bytes_stream();
    let mut decoder = SseDecoder::default();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("stream interrupted")?;
        for frame in decoder.push(&String::from_utf8_lossy(&chunk)) {
            if frame.event.as_deref() == Some("error") {
                bail!("mining failed: {}", frame.data);
            }
            let event: ProgressEvent = serde_json::from_str(&frame.data)
                .with_context(|| format!("bad progress event: {}", frame.data))?;
            println!(
                "block {:>3} attempt {:>7} proof {:>7} {} {}",
                event.block_index, event.attempt, event.proof, event.hash, event.message
            );
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct SseFrame {
    event: Option<String>,
    data: String,
}

/// Incremental `text/event-stream` parser. Chunks may split frames anywhere.
#[derive(Default)]
struct SseDecoder {
    buf: String,
}

impl SseDecoder {
    fn push(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buf.push_str(&chunk.replace("\r\n", "\n"));
        let mut frames = Vec::new();
        while let Some(end) = self.buf.find("\n\n") {
            let raw: String = self.buf.drain(..end + 2).collect();
            let mut event = None;
            let mut data = Vec::new();
            for line in raw.lines() {
                if let Some(v) = line.strip_prefix("data:") {
                    data.push(v.strip_prefix(' ').unwrap_or(v).to_string());
                } else if let Some(v) = line.strip_prefix("event:") {
                    event = Some(v.trim().to_string());
                }
            }
            // Comment-only frames (keep-alives) carry no data.
            if !data.is_empty() {
                frames.push(SseFrame {
                    event,
                    data: data.join("\n"),
                });
            }
        }
        frames
    }
}
