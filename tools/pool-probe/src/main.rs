//! Stratum pool connection probe.
//!
//! Connects to a running pool, subscribes the way a miner would, and
//! prints every announcement. Handy for checking a deployment end to end
//! without attaching real mining hardware.

use anyhow::{Context, Result};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

use ergopool::stratum::protocol::{self, JsonRpcMessage};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pool address to probe
    #[arg(default_value = "127.0.0.1:4444")]
    addr: String,

    /// Worker name sent with mining.authorize
    #[arg(short, long, default_value = "probe")]
    worker: String,

    /// Skip mining.authorize
    #[arg(long)]
    no_authorize: bool,

    /// Print raw lines instead of summaries
    #[arg(short, long)]
    raw: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.addr)
        .await
        .with_context(|| format!("connecting to {}", args.addr))?;
    println!("connected to {}", args.addr);
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(16 * 1024));

    send(
        &mut framed,
        json!({"id": 1, "method": "mining.subscribe", "params": []}),
    )
    .await?;
    if !args.no_authorize {
        send(
            &mut framed,
            json!({"id": 2, "method": "mining.authorize", "params": [args.worker, ""]}),
        )
        .await?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = framed.next() => match line {
                Some(Ok(line)) => {
                    if args.raw {
                        println!("{line}");
                    } else {
                        println!("{}", summarize(&line));
                    }
                }
                Some(Err(e)) => return Err(e).context("reading from pool"),
                None => {
                    println!("pool closed the connection");
                    break;
                }
            },
        }
    }
    Ok(())
}

async fn send(framed: &mut Framed<TcpStream, LinesCodec>, value: Value) -> Result<()> {
    framed
        .send(value.to_string())
        .await
        .context("sending request")
}

fn summarize(line: &str) -> String {
    let Ok(msg) = serde_json::from_str::<JsonRpcMessage>(line) else {
        return format!("unparseable: {line}");
    };
    match msg {
        JsonRpcMessage::Request { method, params, .. } => match method.as_str() {
            protocol::METHOD_NOTIFY => {
                let job_id = params.get(0).and_then(Value::as_str).unwrap_or("?");
                let height = params.get(1).and_then(Value::as_u64).unwrap_or(0);
                format!("job {job_id} at height {height}")
            }
            protocol::METHOD_SET_DIFFICULTY => format!("difficulty {params}"),
            other => format!("{other} {params}"),
        },
        JsonRpcMessage::Response { id, result, error } => match error {
            Some(error) => format!("request {id} failed: {error}"),
            None => format!("request {id} => {}", result.unwrap_or(Value::Null)),
        },
    }
}
