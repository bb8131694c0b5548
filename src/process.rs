use std::io;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::time::timeout;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

// advisory only: the runtime may still be loading weights after this
const STARTUP_GRACE: Duration = Duration::from_millis(200);
#[cfg(unix)]
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

// only populated when the gateway launched the runtime itself
pub struct RuntimeProcess {
    port: u16,
    child: Mutex<Option<Child>>,
}

impl RuntimeProcess {

    pub fn new(port: u16) -> Self {
        RuntimeProcess {
            port,
            child: Mutex::new(None),
        }
    }

    // no-op while a child is already held
    pub async fn start(&self, path: &Path) -> io::Result<()> {

        let mut guard = self.child.lock().await;
        if guard.is_some() {
            debug!(path = %path.display(), "runtime process already started");
            return Ok(());
        }

        let child = Command::new(path)
            .arg("--port")
            .arg(self.port.to_string())
            .kill_on_drop(true)
            .spawn()?;

        info!(path = %path.display(), port = self.port, pid = ?child.id(), "launched runtime process");
        *guard = Some(child);
        drop(guard);

        sleep(STARTUP_GRACE).await;
        Ok(())

    }

    // SIGTERM first, SIGKILL once the grace period runs out; failures are only logged
    pub async fn stop(&self) {

        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        match terminate(&mut child).await {
            Ok(status) => info!(%status, "runtime process stopped"),
            Err(e) => warn!(error = %e, "failed to stop runtime process"),
        }

    }

    pub async fn is_running(&self) -> bool {

        match self.child.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }

    }

}

#[cfg(unix)]
async fn terminate(child: &mut Child) -> io::Result<ExitStatus> {

    // no pid means it has already been reaped
    let Some(pid) = child.id() else {
        return child.wait().await;
    };

    if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        if e == nix::errno::Errno::ESRCH {
            return child.wait().await;
        }
        return Err(io::Error::other(e));
    }

    if let Ok(result) = timeout(STOP_TIMEOUT, child.wait()).await {
        return result;
    }

    warn!("runtime process ignored SIGTERM for {:?}, killing", STOP_TIMEOUT);
    child.kill().await?;
    child.wait().await

}

#[cfg(not(unix))]
async fn terminate(child: &mut Child) -> io::Result<ExitStatus> {

    child.kill().await?;
    child.wait().await

}
