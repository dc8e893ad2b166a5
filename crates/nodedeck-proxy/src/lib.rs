//! NodeDeck Proxy - nginx vhosts and Let's Encrypt certificates

pub mod certbot;
pub mod nginx;

pub use certbot::{extract_certbot_error, Certbot};
pub use nginx::{render_http, render_tls, NginxWriter, VhostMode};
