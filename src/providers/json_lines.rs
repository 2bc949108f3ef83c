//! Feeds alerts encoded as JSON lines into a [`MemoryAlertSource`].

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use super::{memory::MemoryAlertSource, traits::SourceError};
use crate::models::Alert;

/// Reads one JSON encoded [`Alert`] per line from `reader` and puts it into
/// `source` until the input ends or `cancellation_token` fires.
///
/// Blank lines are ignored and undecodable lines are logged and skipped.
/// The source stays open when the input ends, so alerts already forwarded
/// keep being dispatched. Returns the number of alerts forwarded.
pub async fn forward_json_lines<R>(
    reader: R,
    source: &MemoryAlertSource,
    cancellation_token: CancellationToken,
) -> Result<usize, SourceError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0;

    loop {
        let line = tokio::select! {
            biased;

            _ = cancellation_token.cancelled() => {
                tracing::info!("Alert reader received shutdown signal.");
                break;
            }

            line = lines.next_line() => line.map_err(|e| SourceError::Io(e.to_string()))?,
        };

        let Some(line) = line else {
            tracing::info!(forwarded, "Alert input exhausted.");
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<Alert>(line) {
            Ok(alert) => {
                source.put([alert])?;
                forwarded += 1;
            }
            Err(e) => {
                tracing::warn!(error = %SourceError::Decode(e.to_string()), "Skipping malformed alert line.");
            }
        }
    }

    Ok(forwarded)
}
