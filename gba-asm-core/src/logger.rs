/// Sink for program-controlled diagnostic output (spec §5 "Shared-resource
/// policy": "The logger is a single function reference invoked synchronously
/// from pending-write evaluations (`printf`, `assert`, debug logging)").
///
/// Internal engineering logs (pass boundaries, pool allocation, CRC patch)
/// go through `tracing` instead — this trait exists only for the three
/// directives whose output text is authored by the assembled program, not
/// by the assembler itself (spec §6: `printf`, `debugLog`).
pub trait Logger {
    fn log(&self, message: &str, as_error: bool);
}

/// A [`Logger`] that forwards to `tracing`, the default when a caller
/// doesn't need to capture program output separately (e.g. the CLI binary,
/// which just wants `.printf` text to show up alongside its own
/// `tracing-subscriber` output).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, message: &str, as_error: bool) {
        if as_error {
            tracing::error!(target: "gba_asm::printf", "{message}");
        } else {
            tracing::info!(target: "gba_asm::printf", "{message}");
        }
    }
}
