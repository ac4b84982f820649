//! Handoff to the sandboxed program.

use crate::config::types::{CordonError, Result};
use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

/// Environment variable naming the container.
pub const ENV_CONTAINER: &str = "CORDON_CONTAINER";
/// Environment variable pointing at the program's persistent state.
pub const ENV_STATE_DIR: &str = "CORDON_STATE_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Program followed by its arguments; never empty.
    pub command: Vec<OsString>,
    pub home: PathBuf,
    pub container: String,
    pub state_dir: PathBuf,
}

impl LaunchRequest {
    pub fn environment(&self) -> Vec<(&'static str, OsString)> {
        vec![
            ("HOME", self.home.clone().into_os_string()),
            (ENV_CONTAINER, OsString::from(&self.container)),
            (ENV_STATE_DIR, self.state_dir.clone().into_os_string()),
        ]
    }
}

pub trait Launcher {
    /// Replace the process image. Returns only on failure.
    fn launch(&mut self, request: &LaunchRequest) -> Result<()>;
}

/// `execvp(3)` with the inherited environment plus [`LaunchRequest::environment`].
#[derive(Debug, Default)]
pub struct ExecLauncher;

impl Launcher for ExecLauncher {
    fn launch(&mut self, request: &LaunchRequest) -> Result<()> {
        let (program, args) = request
            .command
            .split_first()
            .ok_or_else(|| CordonError::Usage("missing command".to_string()))?;

        let mut command = Command::new(program);
        command.args(args).envs(request.environment());
        if request.home.is_dir() {
            command.current_dir(&request.home);
        } else {
            log::debug!("{} is not a directory; keeping cwd", request.home.display());
        }

        log::info!("Executing {:?}", program);
        let err = command.exec();
        Err(CordonError::Filesystem(format!(
            "exec {}: {}",
            program.to_string_lossy(),
            err
        )))
    }
}
