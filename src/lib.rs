use log::{info, warn};
use tokio::sync::mpsc;

pub use arguments::Arguments;
pub use errors::RelayError;
use fetcher::{FetcherConfig, TileFetchResult};
pub use tile::TileCoord;

mod arguments;
mod errors;
mod network;
mod server;

pub mod fetcher;
pub mod relay;
pub mod tile;

/// Either serve the relay endpoint (the default), or, when tile
/// coordinates were given with --fetch, act as a client of an already
/// running relay and download those tiles.
pub async fn run(args: &Arguments) -> Result<(), RelayError> {
    if args.fetch.is_empty() {
        run_relay(args).await
    } else {
        fetch_tiles(args).await
    }
}

/// Start the relay endpoint and block until shutdown
pub async fn run_relay(args: &Arguments) -> Result<(), RelayError> {
    if args.allowed_hosts.is_empty() {
        warn!(
            "No --allow-host given: the relay will forward requests to ANY host \
             for whoever can reach it"
        );
    }
    let state = relay::RelayState {
        http_client: network::client(args)?,
        allowed_hosts: args.allowed_hosts.clone(),
    };
    server::serve(relay::router(state), args.listen).await
}

/// Fetch the requested tiles through a running relay, saving each one to
/// `<outdir>/<x>_<y>.png`. A failed tile does not abort the others; the
/// batch reports a partial failure at the end instead.
pub async fn fetch_tiles(args: &Arguments) -> Result<(), RelayError> {
    let total_tiles = args.fetch.len() as u64;
    if total_tiles == 0 {
        return Ok(());
    }
    let client = network::client(args)?;
    let config = FetcherConfig {
        endpoint: args.endpoint.clone(),
        tile_template: args.tile_template.clone(),
        include_bytes: true,
    };
    tokio::fs::create_dir_all(&args.outdir).await?;

    let worker_count = args.parallelism.clamp(1, args.fetch.len());
    let (result_sender, mut results) = mpsc::channel(worker_count);
    let mut request_senders = Vec::with_capacity(worker_count);
    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let (sender, receiver) = mpsc::channel(1);
        workers.push(fetcher::spawn_fetcher(
            client.clone(),
            config.clone(),
            receiver,
            result_sender.clone(),
        ));
        request_senders.push(sender);
    }
    // The workers hold the remaining clones; dropping ours lets the result
    // channel close once they are all done.
    drop(result_sender);

    let positions = args.fetch.clone();
    tokio::spawn(async move {
        for (i, position) in positions.into_iter().enumerate() {
            if request_senders[i % worker_count].send(position).await.is_err() {
                break;
            }
        }
    });

    let mut successful_tiles = 0u64;
    while let Some(result) = results.recv().await {
        match result {
            TileFetchResult::Success {
                position, bytes, ..
            } => {
                if let Some(bytes) = bytes {
                    let path = args.outdir.join(format!("{}_{}.png", position.x, position.y));
                    tokio::fs::write(&path, &bytes).await?;
                    info!("Saved tile {} to {}", position, path.to_string_lossy());
                }
                successful_tiles += 1;
            }
            TileFetchResult::Failure { position, error } => {
                warn!("Tile {} failed: {}", position, error);
            }
        }
    }
    for worker in futures::future::join_all(workers).await {
        worker?;
    }

    if successful_tiles == 0 {
        Err(RelayError::NoTile)
    } else if successful_tiles < total_tiles {
        Err(RelayError::PartialFetch {
            successful_tiles,
            total_tiles,
        })
    } else {
        Ok(())
    }
}
