use crate::domain::payload::{RawUpdate, TransportPayload};
use crate::error::{DealflowError, Result};
use std::io::{BufRead, BufReader, Read};
use tracing::debug;

/// Reads raw updates, one JSON object per line, and categorizes them.
///
/// Blank lines are skipped, as are updates that categorize to nothing
/// (e.g. messages without text).
pub struct UpdateReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> UpdateReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Lazily yields payloads; a malformed line yields an error and reading
    /// continues with the next one.
    pub fn payloads(self) -> impl Iterator<Item = Result<TransportPayload>> {
        self.reader
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => return Some(Err(DealflowError::from(err))),
                };
                if line.trim().is_empty() {
                    return None;
                }
                let update = match serde_json::from_str::<RawUpdate>(&line) {
                    Ok(update) => update,
                    Err(err) => return Some(Err(err.into())),
                };
                let update_id = update.update_id;
                let payload = TransportPayload::categorize(update);
                if payload.is_none() {
                    debug!(line = index + 1, update_id, "Update carries nothing to handle");
                }
                payload.map(Ok)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = r#"{"update_id":1,"message":{"message_id":4,"chat_id":1,"from":{"id":1},"text":"Top up"}}

{"update_id":2,"callback_query":{"id":"c1","from":{"id":1},"data":"callback_deal_amount:1","message":{"message_id":5,"chat_id":1}}}
"#;
        let results: Vec<Result<TransportPayload>> = UpdateReader::new(data.as_bytes()).payloads().collect();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().kind(), "message");
        assert_eq!(results[1].as_ref().unwrap().kind(), "callback_query");
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "{not json}\n{\"update_id\":3,\"message\":{\"message_id\":1,\"chat_id\":1,\"from\":{\"id\":1}}}\n";
        let results: Vec<Result<TransportPayload>> = UpdateReader::new(data.as_bytes()).payloads().collect();

        // The text-less message is skipped, not reported.
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }
}
