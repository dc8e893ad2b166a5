//! Local port probing

use tokio::net::TcpListener;

/// True when something already listens on `127.0.0.1:port`
pub async fn port_in_use(port: u16) -> bool {
    match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => {
            drop(listener);
            false
        }
        Err(_) => true,
    }
}
