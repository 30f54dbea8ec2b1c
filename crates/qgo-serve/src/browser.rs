use crate::{ServeError, ServeResult};
use std::process::{Command, Stdio};

/// Open `url` in the platform's default browser
pub fn open_browser(url: &str) -> ServeResult<()> {
    let mut command = if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/c", "start", url]);
        cmd
    } else if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(url);
        cmd
    } else {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(url);
        cmd
    };

    command
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|e| ServeError::Browser {
            url: url.to_string(),
            reason: e.to_string(),
        })
}
