use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use regex::Regex;

use crate::tile::{TileCoord, DEFAULT_TILE_TEMPLATE};

#[derive(Parser, Debug)]
#[command(author, about)]
pub struct Arguments {
    /// Socket address on which the relay endpoint listens
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// URL template of the upstream tile server.
    /// {{X}} and {{Y}} are replaced with the tile coordinates.
    #[arg(long, default_value = DEFAULT_TILE_TEMPLATE)]
    pub tile_template: String,

    /// Host the relay is allowed to forward requests to.
    /// This option can be repeated. When it is absent the relay forwards
    /// requests to ANY host, which exposes an open proxy to whoever can
    /// reach it.
    #[arg(long = "allow-host")]
    pub allowed_hosts: Vec<String>,

    /// Instead of serving, fetch the tile at the given 'x,y' coordinate
    /// through an already running relay and save it to the output
    /// directory. This option can be repeated.
    #[arg(long = "fetch", value_parser = parse_tile_coord)]
    pub fetch: Vec<TileCoord>,

    /// Base URL of the relay used by --fetch
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub endpoint: String,

    /// Directory where fetched tiles are saved
    #[arg(short, long, default_value = ".")]
    pub outdir: PathBuf,

    /// Degree of parallelism to use. At most this number of
    /// tiles will be fetched at the same time.
    #[arg(short = 'n', long, default_value = "8")]
    pub parallelism: usize,

    /// Sets an HTTP header to use on outbound requests.
    /// This option can be repeated in order to set multiple headers.
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Maximum number of idle connections per host allowed at the same time
    #[arg(long, default_value = "32")]
    pub max_idle_per_host: usize,

    /// Whether to accept connecting to insecure HTTPS servers
    #[arg(long)]
    pub accept_invalid_certs: bool,

    /// Maximum time between the beginning of a request and the end of a
    /// response before the request should be interrupted and considered failed
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Time after which we should give up when trying to connect to a server
    #[arg(long = "connect-timeout", default_value = "6s", value_parser = parse_duration)]
    pub connect_timeout: Duration,

    /// Level of logging verbosity. Set it to "debug" to get all logging messages.
    #[arg(long, default_value = "info")]
    pub logging: String,
}

impl Default for Arguments {
    fn default() -> Self {
        Arguments {
            listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
            tile_template: DEFAULT_TILE_TEMPLATE.to_string(),
            allowed_hosts: vec![],
            fetch: vec![],
            endpoint: "http://127.0.0.1:8080".to_string(),
            outdir: PathBuf::from("."),
            parallelism: 8,
            headers: vec![],
            max_idle_per_host: 32,
            accept_invalid_certs: false,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(6),
            logging: "info".to_string(),
        }
    }
}

fn parse_tile_coord(coord_str: &str) -> Result<TileCoord, crate::errors::RelayError> {
    coord_str.parse()
}

fn parse_header(header_str: &str) -> Result<(String, String), &'static str> {
    let mut parts = header_str.splitn(2, ':');
    match (parts.next(), parts.next()) {
        (Some(name), Some(value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err("malformed header string. Expected 'Name: Value'"),
    }
}

fn parse_duration(s: &str) -> Result<Duration, &'static str> {
    let err_msg = "Invalid duration. \
                   A duration is a number followed by a unit, such as '10ms' or '5s'";
    let re = Regex::new(r"^(\d+)\s*(min|s|ms|ns)$").unwrap();
    let caps = re.captures(s).ok_or(err_msg)?;
    let val: u64 = caps[1].parse().map_err(|_| err_msg)?;
    match &caps[2] {
        "min" => Ok(Duration::from_secs(60 * val)),
        "s" => Ok(Duration::from_secs(val)),
        "ms" => Ok(Duration::from_millis(val)),
        "ns" => Ok(Duration::from_nanos(val)),
        _ => Err(err_msg),
    }
}

#[test]
fn test_headers_and_tiles() {
    let args = Arguments::try_parse_from([
        "tilerelay",
        "--header",
        "Referer: http://test.com",
        "--header",
        "A:B",
        "--fetch",
        "3,4",
        "--fetch",
        "0,0",
    ])
    .unwrap();
    assert_eq!(
        args.headers,
        vec![
            ("Referer".into(), "http://test.com".into()),
            ("A".into(), "B".into()),
        ]
    );
    assert_eq!(
        args.fetch,
        vec![TileCoord { x: 3, y: 4 }, TileCoord { x: 0, y: 0 }]
    );
    assert!(args.allowed_hosts.is_empty());
}

#[test]
fn test_bad_header_is_rejected() {
    assert!(Arguments::try_parse_from(["tilerelay", "-H", "no-colon"]).is_err());
    assert!(Arguments::try_parse_from(["tilerelay", "--fetch", "3;4"]).is_err());
}

#[test]
fn test_parse_duration() {
    assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
    assert_eq!(parse_duration("29 s"), Ok(Duration::from_secs(29)));
    assert_eq!(parse_duration("2min"), Ok(Duration::from_secs(120)));
    assert_eq!(parse_duration("1000 ms"), Ok(Duration::from_secs(1)));
    assert!(parse_duration("1 2 ms").is_err());
    assert!(parse_duration("1 s s").is_err());
    assert!(parse_duration("ms").is_err());
    assert!(parse_duration("1j").is_err());
    assert!(parse_duration("").is_err());
}
