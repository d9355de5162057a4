use std::time::Duration;

use anyhow::anyhow;
use bytes::Bytes;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{error, info};

use common::{commands, TaskKind};
use standalone::args::parse_args;
use standalone::{ClusterClient, LocalCluster};

/// Turn one input line into a command kind and its arguments.
fn parse_command(line: &str) -> anyhow::Result<(u32, Vec<Bytes>)> {
    let mut words = line.split_whitespace();
    let name = words.next().ok_or_else(|| anyhow!("empty command"))?;
    let args = words.map(|w| Bytes::copy_from_slice(w.as_bytes())).collect();

    let kind = match name {
        "status" => commands::STATUS,
        name => TaskKind::try_named(name)
            .map(|kind| kind.command())
            .ok_or_else(|| anyhow!("unknown command `{}`", name))?,
    };

    Ok((kind, args))
}

async fn serve_stdin(client: ClusterClient) -> anyhow::Result<()> {
    let mut lines = BufReader::new(io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        let (kind, args) = match parse_command(line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        // Replies print as they come, so a second job can be refused while
        // the first one runs.
        let client = client.clone();
        tokio::spawn(async move {
            match client.request(kind, args).await {
                Ok(reply) => println!("{}", reply.to_text()),
                Err(e) => error!("{:#}", e),
            }
        });
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let (config, submissions) = parse_args().into_parts()?;
    let cluster = LocalCluster::start(config);

    if submissions.is_empty() {
        serve_stdin(cluster.client()).await?;
    } else {
        for n in submissions {
            println!("{}", cluster.count_primes(n).await?);
        }
        cluster.wait_idle(Duration::from_millis(1)).await?;
    }

    let report = cluster.shutdown().await?;
    info!("Coordinator stopped while {}", report.coordinator.status());

    Ok(())
}
