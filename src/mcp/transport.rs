//! Stdio transport binding
//!
//! Protocol frames travel on stdin/stdout only. Diagnostics must go to
//! stderr (see the tracing setup in the server binary).

use std::io::{self, StdinLock, StdoutLock, Write};

use crate::error::{CbError, Result};

/// A bound stdio channel. Holding one means the server is serving.
pub struct StdioTransport {
    reader: StdinLock<'static>,
    writer: StdoutLock<'static>,
}

impl StdioTransport {
    /// Bind to the process's stdin/stdout.
    ///
    /// Call once at startup; failure is fatal for the process.
    pub fn connect() -> Result<Self> {
        let mut writer = io::stdout().lock();
        writer
            .flush()
            .map_err(|e| CbError::TransportBind(format!("stdout is not writable: {}", e)))?;

        let reader = io::stdin().lock();

        tracing::debug!("Stdio transport bound");
        Ok(Self { reader, writer })
    }

    pub fn into_parts(self) -> (StdinLock<'static>, StdoutLock<'static>) {
        (self.reader, self.writer)
    }
}
