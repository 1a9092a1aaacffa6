//! Printing of published snapshots

use std::io::Write;

use clap::ValueEnum;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use callstatus_core::StatusSnapshot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Summary line only
    #[default]
    Text,
    /// Whole snapshot as one JSON object per line
    Json,
}

pub fn render(snapshot: &StatusSnapshot, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Text => Ok(snapshot.summary_text.clone()),
        OutputFormat::Json => serde_json::to_string(snapshot),
    }
}

/// Print every snapshot that differs from the previous one.
pub async fn print_snapshots<W: Write>(
    mut snapshots: mpsc::UnboundedReceiver<StatusSnapshot>,
    format: OutputFormat,
    mut out: W,
) {
    let mut last: Option<StatusSnapshot> = None;

    while let Some(snapshot) = snapshots.recv().await {
        if last.as_ref() == Some(&snapshot) {
            continue;
        }

        match render(&snapshot, format) {
            Ok(line) => {
                if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
                    warn!("Failed to write status: {}", e);
                    break;
                }
            }
            Err(e) => warn!("Failed to render status: {}", e),
        }
        last = Some(snapshot);
    }
    debug!("Output task finished");
}

pub fn spawn_output_task(
    snapshots: mpsc::UnboundedReceiver<StatusSnapshot>,
    format: OutputFormat,
) -> JoinHandle<()> {
    tokio::spawn(print_snapshots(snapshots, format, std::io::stdout()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use callstatus_core::CallRecord;
    use pretty_assertions::assert_eq;

    fn busy() -> StatusSnapshot {
        StatusSnapshot::from_calls(&[CallRecord {
            caller_id_from: "Alice".to_string(),
            callee_to: "200".to_string(),
            raw_from: "100".to_string(),
            raw_to: "200".to_string(),
            legs: vec!["100(Up)".to_string()],
            channel: "100".to_string(),
            context: "from-internal".to_string(),
        }])
    }

    #[test]
    fn test_render_text() {
        assert_eq!(render(&busy(), OutputFormat::Text).unwrap(), "Alice->200 [100(Up)]");
        assert_eq!(render(&StatusSnapshot::idle(), OutputFormat::Text).unwrap(), "idle");
    }

    #[test]
    fn test_render_json_uses_status_key() {
        let value: serde_json::Value =
            serde_json::from_str(&render(&busy(), OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(value["status"], "Alice->200 [100(Up)]");
        assert_eq!(value["cids_from"][0], "Alice");
        assert_eq!(value["contexts"][0], "from-internal");
    }

    #[tokio::test]
    async fn test_unchanged_snapshots_printed_once() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(StatusSnapshot::idle()).unwrap();
        tx.send(StatusSnapshot::idle()).unwrap();
        tx.send(busy()).unwrap();
        tx.send(StatusSnapshot::idle()).unwrap();
        drop(tx);

        let mut out = Vec::new();
        print_snapshots(rx, OutputFormat::Text, &mut out).await;

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "idle\nAlice->200 [100(Up)]\nidle\n"
        );
    }
}
