// Logging
//
// `init_logging` installs the tracing subscriber for the CLI; `RunJournal`
// appends one JSON line per pipeline event so each run can be reconstructed
// after the fact.

mod journal;

pub use journal::{RunEvent, RunJournal};

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `quill=info` (`quill=debug` with
/// `verbose`). `json` switches to one JSON object per line.
pub fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_directive = if verbose { "quill=debug" } else { "quill=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let result = if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };

    result.map_err(|e| anyhow::anyhow!("tracing init failed: {}", e))
}
