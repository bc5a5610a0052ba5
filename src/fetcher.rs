/**
The tile fetch worker: an isolated task that receives tile coordinates on a
channel, requests each tile once through the relay endpoint, and sends back
exactly one result message per request. Results carry the coordinate they
were requested with, so a caller running several workers at once can
correlate answers arriving in any order.
*/
use bytes::Bytes;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::RelayError;
use crate::tile::{self, TileCoord, DEFAULT_TILE_TEMPLATE};

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Base URL of the relay the worker fetches through
    pub endpoint: String,
    /// Template of the upstream tile URL routed through the relay
    pub tile_template: String,
    /// Whether success messages carry the fetched bytes.
    /// Callers that only care about tile availability can turn this off
    /// and keep result messages small.
    pub include_bytes: bool,
}

impl FetcherConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        FetcherConfig {
            endpoint: endpoint.into(),
            tile_template: DEFAULT_TILE_TEMPLATE.to_string(),
            include_bytes: true,
        }
    }
}

/// Outcome of a single tile request, echoing the requested position.
/// A non-2xx status relayed from upstream still counts as `Success`: the
/// worker reports what it could read, only transport failures are `Failure`.
#[derive(Debug, Clone, PartialEq)]
pub enum TileFetchResult {
    Success {
        position: TileCoord,
        proxied_url: String,
        bytes: Option<Bytes>,
    },
    Failure {
        position: TileCoord,
        error: String,
    },
}

impl TileFetchResult {
    pub fn position(&self) -> TileCoord {
        match *self {
            TileFetchResult::Success { position, .. } => position,
            TileFetchResult::Failure { position, .. } => position,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TileFetchResult::Success { .. })
    }
}

/// Spawn a worker task bound to a request/result channel pair.
///
/// The worker handles one request at a time and stops when the request
/// channel closes or when nobody listens to results anymore. There is no
/// way to abort a request once it is in flight.
pub fn spawn_fetcher(
    client: reqwest::Client,
    config: FetcherConfig,
    mut requests: mpsc::Receiver<TileCoord>,
    results: mpsc::Sender<TileFetchResult>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(position) = requests.recv().await {
            let result = fetch_tile(&client, &config, position).await;
            if results.send(result).await.is_err() {
                debug!("Result channel closed, stopping the fetch worker");
                break;
            }
        }
        debug!("Fetch worker done");
    })
}

/// Fetch a single tile through the relay. Infallible by design: errors are
/// turned into a `Failure` message for the caller to handle.
pub async fn fetch_tile(
    client: &reqwest::Client,
    config: &FetcherConfig,
    position: TileCoord,
) -> TileFetchResult {
    match try_fetch(client, config, position).await {
        Ok((proxied_url, bytes)) => {
            debug!("Fetched tile {} ({} bytes)", position, bytes.len());
            TileFetchResult::Success {
                position,
                proxied_url,
                bytes: config.include_bytes.then_some(bytes),
            }
        }
        Err(err) => {
            warn!("Unable to fetch tile {}: {}", position, err);
            TileFetchResult::Failure {
                position,
                error: err.to_string(),
            }
        }
    }
}

async fn try_fetch(
    client: &reqwest::Client,
    config: &FetcherConfig,
    position: TileCoord,
) -> Result<(String, Bytes), RelayError> {
    let upstream = tile::tile_url(&config.tile_template, position);
    let proxied_url = tile::proxied_url(&config.endpoint, &upstream)?;
    debug!("Requesting tile {} through '{}'", position, proxied_url);
    let response = client.get(&proxied_url).send().await?;
    let bytes = response.bytes().await?;
    Ok((proxied_url, bytes))
}
