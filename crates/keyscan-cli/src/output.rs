//! JSON lines batch output.

use std::io::{self, BufWriter, Write};
use std::sync::Mutex;

use keyscan_engine::{Batch, EmitError, Emitter};

/// Writes each batch as one JSON object per line.
///
/// A batch is acknowledged once its line has been flushed to the
/// underlying writer, so the position only advances past rows that left
/// the process.
pub struct JsonLinesEmitter<W: Write + Send> {
    out: Mutex<BufWriter<W>>,
}

impl JsonLinesEmitter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> JsonLinesEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            out: Mutex::new(BufWriter::new(writer)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BufWriter<W>>, EmitError> {
        self.out
            .lock()
            .map_err(|_| EmitError::Rejected("output writer poisoned".to_string()))
    }
}

impl<W: Write + Send> Emitter for JsonLinesEmitter<W> {
    fn emit(&self, batch: Batch) -> Result<(), EmitError> {
        let mut out = self.lock()?;
        serde_json::to_writer(&mut *out, &batch)?;
        out.write_all(b"\n")?;
        out.flush()?;
        drop(out);
        batch.ack.relayed();
        Ok(())
    }

    fn close(&self) -> Result<(), EmitError> {
        self.lock()?.flush()?;
        Ok(())
    }
}
