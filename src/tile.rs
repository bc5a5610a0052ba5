use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::RelayError;

/// Default upstream tile server. `{{X}}` and `{{Y}}` are replaced with the
/// tile coordinates.
pub const DEFAULT_TILE_TEMPLATE: &str =
    "https://backend.wplace.live/files/s0/tiles/{{X}}/{{Y}}.png";

/// Route under which the relay endpoint is mounted.
pub const PROXY_ROUTE: &str = "/api/proxy";

/// Position of a tile in the fixed upstream grid
#[derive(Debug, PartialEq, Eq, Hash, Default, Clone, Copy)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}

impl From<(u32, u32)> for TileCoord {
    fn from((x, y): (u32, u32)) -> Self {
        TileCoord { x, y }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for TileCoord {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || RelayError::MalformedTileCoord {
            coord_str: s.to_string(),
        };
        let (x, y) = s.split_once(',').ok_or_else(malformed)?;
        Ok(TileCoord {
            x: x.trim().parse().map_err(|_| malformed())?,
            y: y.trim().parse().map_err(|_| malformed())?,
        })
    }
}

lazy_static! {
    static ref TEMPLATE_RE: Regex = Regex::new(r"(?i)\{\{(?P<dimension>x|y)\}\}").unwrap();
}

/// Expand a tile URL template like
/// `https://example.com/tiles/{{X}}/{{Y}}.png` at the given position
pub fn tile_url(template: &str, position: TileCoord) -> String {
    TEMPLATE_RE
        .replace_all(template, |caps: &regex::Captures| {
            let dimension = caps
                .name("dimension")
                .expect("missing dimension")
                .as_str();
            if dimension.eq_ignore_ascii_case("x") {
                position.x.to_string()
            } else {
                position.y.to_string()
            }
        })
        .to_string()
}

/// Build the relay URL through which an upstream resource is requested.
/// The upstream URL ends up percent-encoded in the `url` query parameter.
pub fn proxied_url(endpoint: &str, upstream: &str) -> Result<String, RelayError> {
    let query = serde_urlencoded::to_string([("url", upstream)])?;
    Ok(format!(
        "{}{}?{}",
        endpoint.trim_end_matches('/'),
        PROXY_ROUTE,
        query
    ))
}

#[test]
fn test_tile_url() {
    let position = TileCoord { x: 3, y: 4 };
    assert_eq!(
        tile_url(DEFAULT_TILE_TEMPLATE, position),
        "https://backend.wplace.live/files/s0/tiles/3/4.png"
    );
    assert_eq!(
        tile_url("http://example.com/{{y}}/{{x}}", position),
        "http://example.com/4/3"
    );
    assert_eq!(tile_url("no placeholders", position), "no placeholders");
}

#[test]
fn test_proxied_url() {
    let url = proxied_url(
        "http://localhost:8080/",
        "https://backend.wplace.live/files/s0/tiles/3/4.png",
    )
    .unwrap();
    assert_eq!(
        url,
        "http://localhost:8080/api/proxy?\
         url=https%3A%2F%2Fbackend.wplace.live%2Ffiles%2Fs0%2Ftiles%2F3%2F4.png"
    );
}

#[test]
fn test_parse_tile_coord() {
    assert_eq!("3,4".parse::<TileCoord>().unwrap(), TileCoord { x: 3, y: 4 });
    assert_eq!("0, 0".parse::<TileCoord>().unwrap(), TileCoord { x: 0, y: 0 });
    assert!("3".parse::<TileCoord>().is_err());
    assert!("3,-4".parse::<TileCoord>().is_err());
    assert!("a,b".parse::<TileCoord>().is_err());
    assert!("".parse::<TileCoord>().is_err());
}
