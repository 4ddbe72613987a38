//! Newline-delimited JSON over stdio.
//!
//! Outbound events are written one per line to stdout. Inbound lines from
//! stdin are validated with [`parse_inbound`]; malformed lines are logged and
//! skipped. End of input asks the host to shut down.

use std::io::{BufRead, Write};
use std::sync::mpsc::{Receiver, Sender};

use critter_protocol::{parse_inbound, OutboundEvent};
use tracing::{debug, warn};

use crate::host::HostMessage;

/// Forwards inbound messages until EOF, then sends `Shutdown`.
pub fn pump_inbound<R: BufRead>(reader: R, host: Sender<HostMessage>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "Failed to read inbound line");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_inbound(&line) {
            Ok(message) => {
                if host.send(HostMessage::Inbound(message)).is_err() {
                    return;
                }
            }
            Err(err) => {
                warn!(code = %err.code, message = %err.message, "Skipping malformed inbound message");
            }
        }
    }
    debug!("Inbound stream closed");
    let _ = host.send(HostMessage::Shutdown);
}

/// Writes each event as one JSON line until every sender is gone.
pub fn pump_outbound<W: Write>(events: Receiver<OutboundEvent>, mut writer: W) {
    for event in events {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, event = event.name(), "Failed to serialize outbound event");
                continue;
            }
        };
        if writeln!(writer, "{}", line)
            .and_then(|_| writer.flush())
            .is_err()
        {
            debug!("Outbound stream closed");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use critter_protocol::InboundMessage;
    use std::io::Cursor;
    use std::sync::mpsc;

    #[test]
    fn inbound_skips_bad_lines_and_ends_with_shutdown() {
        let input = concat!(
            "{\"type\":\"save-requested\",\"snapshot\":{\"watchedPath\":\"/repo\"}}\n",
            "not json\n",
            "\n",
            "{\"type\":\"history-requested\",\"limit\":5}\n",
        );
        let (tx, rx) = mpsc::channel();
        pump_inbound(Cursor::new(input), tx);

        let messages: Vec<_> = rx.try_iter().collect();
        assert_eq!(messages.len(), 3);
        assert!(matches!(
            messages[0],
            HostMessage::Inbound(InboundMessage::SaveRequested { .. })
        ));
        assert!(matches!(
            messages[1],
            HostMessage::Inbound(InboundMessage::HistoryRequested { limit: Some(5) })
        ));
        assert!(matches!(messages[2], HostMessage::Shutdown));
    }

    #[test]
    fn outbound_writes_one_json_object_per_line() {
        let (tx, rx) = mpsc::channel();
        tx.send(OutboundEvent::FileAdded {
            path: "/repo/new.rs".to_string(),
            timestamp: 5,
        })
        .expect("send");
        tx.send(OutboundEvent::Commit {
            hash: "abcd".to_string(),
            message: "msg".to_string(),
            timestamp: 6,
        })
        .expect("send");
        drop(tx);

        let mut output = Vec::new();
        pump_outbound(rx, &mut output);
        let text = String::from_utf8(output).expect("utf8");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "file-added");
        assert_eq!(lines[1]["hash"], "abcd");
    }
}
