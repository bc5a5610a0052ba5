use reqwest::{self, header};

use custom_error::custom_error;

custom_error! {
    pub RelayError
    Networking{source: reqwest::Error} = "network error: {source}",
    Io{source: std::io::Error} = "Input/Output error: {source}",
    InvalidHeaderName{source: header::InvalidHeaderName} = "Invalid header name: {source}",
    InvalidHeaderValue{source: header::InvalidHeaderValue} = "Invalid header value: {source}",
    AsyncError{source: tokio::task::JoinError} = "Unable to get the result from a task: {source}",
    UrlEncoding{source: serde_urlencoded::ser::Error} = "Unable to encode the target URL: {source}",
    MalformedTileCoord{coord_str: String} = "Malformed tile coordinate: '{coord_str}' \
                                             expected 'x,y'",
    MalformedTarget{url: String} = "Not a valid absolute URL: '{url}'",
    ForbiddenHost{host: String} = "Host '{host}' is not on the relay allow-list",
    NoTile = "Could not fetch any tile",
    PartialFetch{successful_tiles: u64, total_tiles: u64} =
        "Only {successful_tiles} tiles out of {total_tiles} could be fetched",
}
