//! Fluentd forward protocol (v1), the subset needed to emit events
//! and to receive them in tests and the mock collector.
//!
//! Emitted frames use message mode: `[tag, time, record]`, or
//! `[tag, time, record, {"chunk": id}]` when an ack is requested.
//! The receiving side answers a chunk with `{"ack": id}`.
//!
//! Only integer (unix seconds) event times are supported.

use std::io::{self, Cursor};

use rama::error::{BoxError, ErrorContext as _};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

mod client;

pub use self::client::ForwardClient;

/// Option key carrying the id a receiver must acknowledge.
pub const CHUNK_OPTION: &str = "chunk";

#[derive(Debug, Serialize)]
struct MessageOptions<'a> {
    chunk: &'a str,
}

/// Encode a single event in message mode.
pub fn encode_message<R>(
    tag: &str,
    time: u64,
    record: &R,
    chunk: Option<&str>,
) -> Result<Vec<u8>, BoxError>
where
    R: Serialize + ?Sized,
{
    let frame = match chunk {
        Some(chunk) => rmp_serde::to_vec_named(&(tag, time, record, MessageOptions { chunk })),
        None => rmp_serde::to_vec_named(&(tag, time, record)),
    }
    .context("msgpack encode forward message")?;
    Ok(frame)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    pub ack: String,
}

pub fn encode_ack(chunk: &str) -> Result<Vec<u8>, BoxError> {
    let frame = rmp_serde::to_vec_named(&AckResponse {
        ack: chunk.to_owned(),
    })
    .context("msgpack encode forward ack")?;
    Ok(frame)
}

/// Decode an ack from the front of `buf`.
///
/// Returns `None` while `buf` holds an incomplete response.
pub fn decode_ack(buf: &[u8]) -> Result<Option<(AckResponse, usize)>, BoxError> {
    let decoded = decode_frame(buf).context("msgpack decode forward ack")?;
    Ok(decoded)
}

/// One event as received by a collector.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardEntry {
    pub time: Option<u64>,
    pub record: Map<String, Value>,
}

/// A decoded message-mode or forward-mode frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardMessage {
    pub tag: String,
    pub entries: Vec<ForwardEntry>,
    pub chunk: Option<String>,
}

/// Decode one frame from the front of `buf`, returning it together
/// with the amount of bytes it occupied.
///
/// Returns `None` while `buf` holds an incomplete frame.
pub fn decode_message(buf: &[u8]) -> Result<Option<(ForwardMessage, usize)>, BoxError> {
    let decoded = decode_frame::<Value>(buf).context("msgpack decode forward frame")?;
    let Some((value, consumed)) = decoded else {
        return Ok(None);
    };
    let message = ForwardMessage::try_from_value(value)?;
    Ok(Some((message, consumed)))
}

fn decode_frame<T: DeserializeOwned>(
    buf: &[u8],
) -> Result<Option<(T, usize)>, rmp_serde::decode::Error> {
    if buf.is_empty() {
        return Ok(None);
    }

    let mut cursor = Cursor::new(buf);
    match rmp_serde::from_read::<_, T>(&mut cursor) {
        Ok(value) => Ok(Some((value, cursor.position() as usize))),
        Err(
            rmp_serde::decode::Error::InvalidMarkerRead(err)
            | rmp_serde::decode::Error::InvalidDataRead(err),
        ) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(err) => Err(err),
    }
}

impl ForwardMessage {
    fn try_from_value(value: Value) -> Result<Self, BoxError> {
        let Value::Array(items) = value else {
            return Err(BoxError::from("forward frame is not an array"));
        };
        let mut items = items.into_iter();

        let Some(Value::String(tag)) = items.next() else {
            return Err(BoxError::from("forward frame: tag missing or not a string"));
        };

        let entries = match items.next() {
            // forward mode: [tag, [[time, record], ...], option?]
            Some(Value::Array(raw_entries)) => raw_entries
                .into_iter()
                .map(ForwardEntry::try_from_value)
                .collect::<Result<Vec<_>, _>>()?,
            // message mode: [tag, time, record, option?]
            Some(Value::Number(time)) => {
                let Some(Value::Object(record)) = items.next() else {
                    return Err(BoxError::from("forward frame: record missing or not a map"));
                };
                vec![ForwardEntry {
                    time: time.as_u64(),
                    record,
                }]
            }
            _ => {
                return Err(BoxError::from(
                    "forward frame: expected event time or entries",
                ));
            }
        };

        let chunk = match items.next() {
            None | Some(Value::Null) => None,
            Some(Value::Object(mut option)) => match option.remove(CHUNK_OPTION) {
                Some(Value::String(chunk)) => Some(chunk),
                _ => None,
            },
            Some(_) => return Err(BoxError::from("forward frame: option is not a map")),
        };

        if items.next().is_some() {
            return Err(BoxError::from("forward frame: unexpected trailing elements"));
        }

        Ok(Self {
            tag,
            entries,
            chunk,
        })
    }
}

impl ForwardEntry {
    fn try_from_value(value: Value) -> Result<Self, BoxError> {
        let Value::Array(pair) = value else {
            return Err(BoxError::from("forward entry is not an array"));
        };
        let mut pair = pair.into_iter();
        match (pair.next(), pair.next(), pair.next()) {
            (Some(Value::Number(time)), Some(Value::Object(record)), None) => Ok(Self {
                time: time.as_u64(),
                record,
            }),
            _ => Err(BoxError::from("forward entry: expected [time, record]")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Event {
        msg: &'static str,
        count: u32,
    }

    #[test]
    fn test_message_mode_layout() {
        let frame = encode_message(
            "INFO.ops-test.dev.unspecified",
            1_700_000_000,
            &Event {
                msg: "ping",
                count: 3,
            },
            None,
        )
        .unwrap();

        // fixarray of 3 elements, then a fixstr tag
        assert_eq!(0x93, frame[0]);
        assert_eq!(0xa0 | 29, frame[1]);

        let (message, consumed) = decode_message(&frame).unwrap().unwrap();
        assert_eq!(frame.len(), consumed);
        assert_eq!("INFO.ops-test.dev.unspecified", message.tag);
        assert_eq!(None, message.chunk);
        assert_eq!(1, message.entries.len());
        assert_eq!(Some(1_700_000_000), message.entries[0].time);
        assert_eq!("ping", message.entries[0].record["msg"]);
        assert_eq!(3, message.entries[0].record["count"]);
    }

    #[test]
    fn test_message_mode_with_chunk() {
        let frame = encode_message(
            "connection_test",
            42,
            &serde_json::json!({"msg": "ping"}),
            Some("abc123"),
        )
        .unwrap();

        assert_eq!(0x94, frame[0]);

        let (message, consumed) = decode_message(&frame).unwrap().unwrap();
        assert_eq!(frame.len(), consumed);
        assert_eq!(Some("abc123".to_owned()), message.chunk);
    }

    #[test]
    fn test_forward_mode_is_decoded() {
        let frame = rmp_serde::to_vec_named(&(
            "app.logs",
            vec![
                (1u64, serde_json::json!({"a": 1})),
                (2u64, serde_json::json!({"b": 2})),
            ],
            serde_json::json!({"chunk": "c1"}),
        ))
        .unwrap();

        let (message, _) = decode_message(&frame).unwrap().unwrap();
        assert_eq!("app.logs", message.tag);
        assert_eq!(2, message.entries.len());
        assert_eq!(Some(2), message.entries[1].time);
        assert_eq!(Some("c1".to_owned()), message.chunk);
    }

    #[test]
    fn test_incomplete_frames_wait_for_more_bytes() {
        let frame = encode_message("t", 1, &serde_json::json!({"msg": "hello world"}), None)
            .unwrap();

        for cut in 0..frame.len() {
            assert!(
                decode_message(&frame[..cut]).unwrap().is_none(),
                "cut = {cut}"
            );
        }
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut buf = encode_message("a", 1, &serde_json::json!({"n": 1}), None).unwrap();
        let first_len = buf.len();
        buf.extend(encode_message("b", 2, &serde_json::json!({"n": 2}), Some("x")).unwrap());

        let (first, consumed) = decode_message(&buf).unwrap().unwrap();
        assert_eq!(first_len, consumed);
        assert_eq!("a", first.tag);

        let (second, _) = decode_message(&buf[consumed..]).unwrap().unwrap();
        assert_eq!("b", second.tag);
        assert_eq!(Some("x".to_owned()), second.chunk);
    }

    #[test]
    fn test_invalid_frames() {
        for value in [
            serde_json::json!("just a string"),
            serde_json::json!([1, 2, 3]),
            serde_json::json!(["tag", "not a time", {}]),
            serde_json::json!(["tag", 1, "not a record"]),
            serde_json::json!(["tag", 1, {}, "not an option"]),
            serde_json::json!(["tag", 1, {}, {}, "extra"]),
            serde_json::json!(["tag", [[1]]]),
        ] {
            let frame = rmp_serde::to_vec_named(&value).unwrap();
            assert!(decode_message(&frame).is_err(), "value: {value}");
        }
    }

    #[test]
    fn test_ack() {
        let frame = encode_ack("chunk-1").unwrap();
        let (ack, consumed) = decode_ack(&frame).unwrap().unwrap();
        assert_eq!(frame.len(), consumed);
        assert_eq!("chunk-1", ack.ack);

        assert!(decode_ack(&frame[..frame.len() - 1]).unwrap().is_none());
    }
}
