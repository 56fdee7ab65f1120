//! Test servers shared by the integration suites.
#![allow(dead_code)]

pub mod api;
pub mod relay;

use notely_collab::ClientConfig;

/// Client config pointed at the given throw-away servers.
pub fn config(api_base_url: &str, socket_base_url: &str) -> ClientConfig {
    ClientConfig {
        api_base_url: api_base_url.to_string(),
        socket_base_url: socket_base_url.to_string(),
        ..ClientConfig::default()
    }
}
