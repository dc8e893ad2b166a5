//! NodeDeck Runtime - command execution and host probes
//!
//! Every external tool (git, unzip, bash with nvm, pm2, nginx, certbot) is
//! invoked through the [`Executor`] trait by argument vector.

pub mod exec;
pub mod nvm;
pub mod port;
pub mod system;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use exec::{CommandOutput, CommandSpec, Executor, LineStream};
pub use nvm::{NodeVersions, NvmShell};
pub use port::port_in_use;
pub use system::SystemExecutor;

use std::path::PathBuf;

/// Resolve a program on PATH, or accept an existing absolute path
pub fn locate(program: &str) -> Option<PathBuf> {
    match which::which(program) {
        Ok(path) => Some(path),
        Err(_) => {
            let path = PathBuf::from(program);
            (path.is_absolute() && path.exists()).then_some(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate() {
        assert!(locate("sh").is_some());
        assert!(locate("nodedeck-definitely-missing-binary").is_none());
        assert!(locate("/nonexistent/bin/tool").is_none());
    }
}
