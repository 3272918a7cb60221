use gossip_sampling::gossip::service::{PeerSamplingService, ServiceConfig};
use gossip_sampling::view::SelectorKind;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> [--entry <addr:port>]... [--wait <secs>] [--timeout <secs>]",
            args[0]
        );
        eprintln!("Example: {} --bind 127.0.0.1:50000", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:50001 --entry 127.0.0.1:50000",
            args[0]
        );

        std::process::exit(1);
    }

    let mut bind_addr: Option<String> = None;
    let mut entry_points: Vec<String> = vec![];
    let mut wait_time_secs = 10u64;
    let mut timeout_secs = 2u64;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--entry" => {
                entry_points.push(args[i + 1].clone());
                i += 2;
            }
            "--wait" => {
                wait_time_secs = args[i + 1].parse()?;
                i += 2;
            }
            "--timeout" => {
                timeout_secs = args[i + 1].parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.expect("--bind is required");

    let view_size = env_or("VIEW_SIZE", 10);
    let healing = env_or("VIEW_HEALING", 3);
    let swap = env_or("VIEW_SWAP", 3);

    tracing::info!("Starting gossip node on {}", bind_addr);
    if !entry_points.is_empty() {
        tracing::info!("Entry points: {:?}", entry_points);
    } else {
        tracing::info!("Starting as entry node (new overlay)");
    }

    let service = Arc::new(PeerSamplingService::new(ServiceConfig {
        address: bind_addr,
        push: true,
        pull: true,
        wait_time_secs,
        timeout_secs,
        entry_points,
        selector: SelectorKind::Tail,
        view_size,
        healing,
        swap,
    }));

    if !service.enter().await {
        tracing::warn!("Could not reach any entry point; retrying in the background loop");
    }
    service.start().await?;

    // Application-side sampling: draw a random unseen peer twice per round.
    let subscriber = service
        .subscribe(SelectorKind::UniformRandomNoReplacement, None)
        .expect("subscriber creation cannot fail for unlogged kinds");
    let sample_view = service.view();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs((wait_time_secs / 2).max(1)));

        loop {
            interval.tick().await;
            match subscriber.select_peer() {
                Some(peer) => {
                    tracing::info!("Sampled peer {} (age {})", peer.address, peer.age)
                }
                None => tracing::info!("View is empty; nothing to sample"),
            }
            let nodes = sample_view.snapshot();
            tracing::info!("View holds {} descriptors", nodes.len());
            for node in nodes {
                tracing::debug!("  - {} (age {})", node.address, node.age);
            }
        }
    });

    tracing::info!("Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    service.stop().await;

    Ok(())
}

fn env_or(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}
