use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::providers::DisplaySurface;

const URL_PLACEHOLDER: &str = "@URL@";

#[derive(Debug, Clone)]
pub struct DisplayCommandPlan {
    /// Program followed by its arguments; `@URL@` is replaced by the URL to
    /// show, or the URL is appended when no argument mentions it.
    pub command: Vec<String>,
    /// How long to wait for the previous renderer to exit after killing it.
    pub teardown_timeout: Duration,
}

/// Display surface that runs one kiosk renderer process at a time.
///
/// Every `show` kills and reaps the running renderer before spawning the next
/// one, so two renderers never fight over the output.
#[derive(Clone)]
pub struct CommandDisplay {
    inner: Arc<CommandDisplayInner>,
}

struct CommandDisplayInner {
    template: CommandTemplate,
    teardown_timeout: Duration,
    current: Mutex<Option<Child>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CommandTemplate {
    program: String,
    args: Vec<String>,
    has_placeholder: bool,
}

impl fmt::Debug for CommandDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDisplay")
            .field("template", &self.inner.template)
            .field("teardown_timeout", &self.inner.teardown_timeout)
            .finish()
    }
}

impl CommandDisplay {
    pub fn new(plan: DisplayCommandPlan) -> Result<Self> {
        let DisplayCommandPlan {
            command,
            teardown_timeout,
        } = plan;
        let template = CommandTemplate::new(command)?;
        Ok(Self {
            inner: Arc::new(CommandDisplayInner {
                template,
                teardown_timeout,
                current: Mutex::new(None),
            }),
        })
    }

    /// Tears down the running renderer, if any.
    pub async fn close(&self) {
        let mut current = self.inner.current.lock().await;
        if let Some(child) = current.take() {
            self.inner.teardown(child).await;
        }
    }

    #[cfg(test)]
    async fn current_pid(&self) -> Option<u32> {
        self.inner.current.lock().await.as_ref().and_then(Child::id)
    }
}

impl CommandDisplayInner {
    async fn teardown(&self, mut child: Child) {
        let pid = child.id();
        if let Err(err) = child.start_kill() {
            debug!(?pid, error = %err, "renderer already gone");
        }
        match tokio::time::timeout(self.teardown_timeout, child.wait()).await {
            Ok(Ok(status)) => debug!(?pid, %status, "previous renderer exited"),
            Ok(Err(err)) => warn!(?pid, error = %err, "failed to reap previous renderer"),
            Err(_) => warn!(
                ?pid,
                timeout = %humantime::format_duration(self.teardown_timeout),
                "previous renderer did not exit in time"
            ),
        }
    }
}

#[async_trait]
impl DisplaySurface for CommandDisplay {
    async fn show(&self, url: &str) -> Result<()> {
        let mut current = self.inner.current.lock().await;
        if let Some(child) = current.take() {
            self.inner.teardown(child).await;
        }

        let args = self.inner.template.render(url);
        let child = Command::new(&self.inner.template.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn renderer {}", self.inner.template.program))?;
        info!(pid = child.id(), url, "renderer started");
        *current = Some(child);
        Ok(())
    }
}

impl CommandTemplate {
    fn new(command: Vec<String>) -> Result<Self> {
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("display command must not be empty"))?;
        ensure_not_blank(&program, "display command program")?;
        let args: Vec<String> = parts.collect();
        let has_placeholder = args.iter().any(|arg| arg.contains(URL_PLACEHOLDER));
        Ok(Self {
            program,
            args,
            has_placeholder,
        })
    }

    fn render(&self, url: &str) -> Vec<String> {
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(URL_PLACEHOLDER, url))
            .collect();
        if !self.has_placeholder {
            args.push(url.to_string());
        }
        args
    }
}

fn ensure_not_blank(value: &str, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(anyhow!("{label} must not be blank"))
    } else {
        Ok(())
    }
}
