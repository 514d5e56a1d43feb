//! Sink that prints each point as a JSON line.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::DataPoint;
use crate::plugin::Sink;
use crate::{Error, Result};

pub const SINK_TYPE: &str = "stdout";

#[derive(Debug, Default)]
pub struct StdoutSink {
    ready: AtomicBool,
}

/// Render a batch as newline-delimited JSON.
pub(crate) fn render_lines(points: &[DataPoint]) -> Result<String> {
    let mut out = String::new();
    for point in points {
        out.push_str(&serde_json::to_string(point)?);
        out.push('\n');
    }
    Ok(out)
}

#[async_trait]
impl Sink for StdoutSink {
    async fn initialize(&mut self, _config: &serde_json::Value) -> Result<()> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, points: &[DataPoint]) -> Result<()> {
        if !self.ready.load(Ordering::SeqCst) {
            return Err(Error::plugin(SINK_TYPE, "sink is not initialized"));
        }
        let lines = render_lines(points)?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(lines.as_bytes())?;
        stdout.flush()?;
        debug!(points = points.len(), "Wrote points to stdout");
        Ok(())
    }

    async fn health_check(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);
        std::io::stdout().flush()?;
        Ok(())
    }
}
