//! NodeDeck Orchestrator - app lifecycle across git, nvm, PM2, nginx and certbot
//!
//! Every app is keyed by its row id: `app-{id}` on disk, `nodedeck-app-{id}`
//! in PM2 and `nodedeck-app-{id}.conf` in nginx. Deploy is all or nothing;
//! redeploy, update and teardown report partial failures as warnings.

mod cleanup;
mod deploy;
mod lifecycle;
pub mod locks;
mod orchestrator;
pub mod ports;
pub mod progress;

pub use locks::{ActionGuard, ActionLocks};
pub use orchestrator::Orchestrator;
pub use ports::allocate_port;
pub use progress::ProgressSink;
