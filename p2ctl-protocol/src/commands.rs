//! Control payloads used by the connection lifecycle.
//!
//! These are the bodies placed inside an envelope; see [`crate::Encoder::wrap`].

use crate::environment::registration_name;

/// Login request, sent as soon as the TCP connection is up.
pub fn login(username: &str) -> String {
    format!("<Login>{}</Login>", quick_xml::escape::escape(username))
}

/// Environment query, sent once the auth token is known.
pub const ENV_QUERY: &str = r#"<Query Type="env"/>"#;

/// Keep-alive query sent on every supervisor tick.
pub const KEEP_ALIVE: &str = "<CamCtl>$KpAlive:?</CamCtl>";

/// Releases remote control.
pub const CONNECT_OFF: &str = "<CamCtl>$Connect:=Off</CamCtl>";

/// Takes remote control and registers the client name for `model_name`.
pub fn connect_on(model_name: &str) -> String {
    format!(
        "<CamCtl>$Connect:=On</CamCtl><CamCtl>$MyName:s{}</CamCtl>",
        registration_name(model_name)
    )
}
