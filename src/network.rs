use log::debug;
use reqwest::header;
use std::collections::HashMap;
use url::Url;

use crate::arguments::Arguments;
use crate::errors::RelayError;

/// Build the http client used for all outbound requests.
/// The default headers (most importantly the browser-like User-Agent
/// expected by tile servers) can be overridden with `-H` on the command line.
pub fn client(args: &Arguments) -> Result<reqwest::Client, RelayError> {
    let header_map = default_headers()
        .iter()
        .chain(args.headers.iter().map(|(k, v)| (k, v)))
        .map(|(name, value)| Ok((name.parse()?, value.parse()?)))
        .collect::<Result<header::HeaderMap, RelayError>>()?;
    debug!(
        "Creating an http client with the following headers: {:?}",
        header_map
    );
    let client = reqwest::Client::builder()
        .default_headers(header_map)
        .referer(false)
        .pool_max_idle_per_host(args.max_idle_per_host)
        .danger_accept_invalid_certs(args.accept_invalid_certs)
        .timeout(args.timeout)
        .connect_timeout(args.connect_timeout)
        .build()?;
    Ok(client)
}

pub fn default_headers() -> HashMap<String, String> {
    serde_yaml::from_str(include_str!("default_headers.yaml")).unwrap()
}

/// Refuse targets whose host is not on the allow-list.
/// An empty allow-list lets everything through: the relay is then fully
/// open, which is the historical behavior.
pub fn check_host(target: &str, allowed_hosts: &[String]) -> Result<(), RelayError> {
    if allowed_hosts.is_empty() {
        return Ok(());
    }
    let url = Url::parse(target).map_err(|_| RelayError::MalformedTarget {
        url: target.to_string(),
    })?;
    let host = url.host_str().unwrap_or_default();
    if allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)) {
        Ok(())
    } else {
        Err(RelayError::ForbiddenHost {
            host: host.to_string(),
        })
    }
}

#[test]
fn test_default_headers_contain_a_user_agent() {
    let headers = default_headers();
    let ua = headers.get("User-Agent").expect("no user agent");
    assert!(ua.starts_with("Mozilla/5.0"));
}

#[test]
fn test_check_host() {
    let allowed = vec!["backend.wplace.live".to_string()];
    assert!(check_host("https://backend.wplace.live/files/s0/tiles/0/0.png", &allowed).is_ok());
    assert!(check_host("https://BACKEND.WPLACE.LIVE/x", &allowed).is_ok());
    assert!(matches!(
        check_host("https://evil.example.com/x", &allowed),
        Err(RelayError::ForbiddenHost { host }) if host == "evil.example.com"
    ));
    assert!(matches!(
        check_host("not a url", &allowed),
        Err(RelayError::MalformedTarget { .. })
    ));
    // no allow-list: anything goes, even strings reqwest will choke on later
    assert!(check_host("https://anywhere.example/x", &[]).is_ok());
    assert!(check_host("not a url", &[]).is_ok());
}
