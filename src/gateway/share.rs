//! Client share links
//!
//! The share page hands clients a ready-made configuration URL pointing at
//! the public front host, carrying the identity and tunnel path.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use url::Url;

use crate::config::Config;
use crate::Result;

/// Port clients dial on the TLS-terminating front
pub const FRONT_PORT: u16 = 443;

/// Build the plain share URL
pub fn share_link(config: &Config) -> Result<String> {
    let identity = config.identity()?;
    let sni = &config.share.sni_host;

    let mut url = Url::parse(&format!(
        "vless://{}@{}:{}",
        identity.to_compact_string(),
        config.share.public_host,
        FRONT_PORT
    ))?;

    url.query_pairs_mut()
        .append_pair("type", "ws")
        .append_pair("path", &config.server.ws_path)
        .append_pair("host", sni)
        .append_pair("encryption", "none")
        .append_pair("sni", sni)
        .append_pair("fp", "chrome")
        .append_pair("security", "tls");
    url.set_fragment(Some(sni));

    Ok(url.to_string())
}

/// Share URL encoded with standard padded base64, as shown on the share page
pub fn encoded_share_link(config: &Config) -> Result<String> {
    Ok(STANDARD.encode(share_link(config)?))
}
