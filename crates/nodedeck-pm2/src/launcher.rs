//! Launcher script PM2 runs for each app

use nodedeck_core::App;
use nodedeck_runtime::NvmShell;
use std::path::Path;

/// Script that selects the Node version, enters the app directory, exports
/// the allocated port and execs the start command
pub fn render(app: &App, dir: &Path, nvm: &NvmShell) -> String {
    format!(
        "#!/usr/bin/env bash\n{}\n{}\ncd \"{}\" || exit 1\nexport PORT={}\nexec {}\n",
        nvm.prelude(),
        nvm.use_line(&app.node_version),
        dir.display(),
        app.port,
        app.start_cmd
    )
}
