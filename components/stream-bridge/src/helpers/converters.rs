//! This module defines conversions between raw Redis replies and the bridge's store models.
//!
//! Replies are walked by hand instead of going through `StreamReadReply`, whose field map is a
//! `HashMap` and would lose the order fields were appended in.

// Local crates
use crate::{
    error::StoreError,
    store::models::{EntryId, Fields, RawEntry},
    tailer::models::Cursor,
};

// External crates
use bytes::Bytes;
use redis::Value;

/// Argument an `XREAD` expects for a cursor.
pub fn cursor_to_arg(cursor: &Cursor) -> String {
    match cursor {
        Cursor::Latest => "$".to_string(),
        Cursor::Beginning => "0-0".to_string(),
        Cursor::After(id) => id.to_string(),
    }
}

/// Convert an `XREAD` reply into entries, in the order the server sent them.
///
/// ```text
/// nil                                  -> no data this poll
/// [[stream, [[id, [k, v, ...]], ...]], ...]    (RESP2)
/// {stream: [[id, [k, v, ...]], ...], ...}      (RESP3)
/// ```
pub fn raw_entries_from_reply(reply: Value) -> Result<Vec<RawEntry>, StoreError> {
    let streams: Vec<(Value, Value)> = match reply {
        Value::Nil => return Ok(Vec::new()),
        Value::Map(pairs) => pairs,
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Array(pair) => into_pair(pair),
                other => Err(unexpected("stream reply", &other)),
            })
            .collect::<Result<_, _>>()?,
        other => return Err(unexpected("XREAD reply", &other)),
    };

    let mut entries = Vec::new();
    for (name, stream_entries) in streams {
        let stream = text(name)?;
        let stream_entries = match stream_entries {
            Value::Array(items) => items,
            Value::Nil => continue,
            other => return Err(unexpected("stream entries", &other)),
        };

        for entry in stream_entries {
            let (id, flat_fields) = match entry {
                Value::Array(pair) => into_pair(pair)?,
                other => return Err(unexpected("stream entry", &other)),
            };
            entries.push(RawEntry {
                stream: stream.clone(),
                id: text(id)?,
                fields: fields_from_flat(flat_fields)?,
            });
        }
    }

    Ok(entries)
}

/// Id of the single entry an `XREVRANGE name + - COUNT 1` reply holds.
///
/// ```text
/// []                       -> missing or empty stream, EntryId::MIN
/// [[id, [k, v, ...]]]      -> id
/// ```
pub fn last_id_from_reply(reply: Value) -> Result<EntryId, StoreError> {
    let items = match reply {
        Value::Nil => return Ok(EntryId::MIN),
        Value::Array(items) => items,
        other => return Err(unexpected("XREVRANGE reply", &other)),
    };

    let Some(newest) = items.into_iter().next() else {
        return Ok(EntryId::MIN);
    };
    let (id, _) = match newest {
        Value::Array(pair) => into_pair(pair)?,
        other => return Err(unexpected("stream entry", &other)),
    };

    let id = text(id)?;
    id.parse::<EntryId>()
        .map_err(|e| StoreError::Protocol(format!("XREVRANGE returned {e}")))
}

/// `[k1, v1, k2, v2, ...]` -> ordered [`Fields`]. A nil field list (trimmed entry) is empty.
fn fields_from_flat(value: Value) -> Result<Fields, StoreError> {
    let items = match value {
        Value::Array(items) => items,
        Value::Nil => return Ok(Fields::new()),
        other => return Err(unexpected("entry fields", &other)),
    };

    if items.len() % 2 != 0 {
        return Err(StoreError::Protocol(format!(
            "entry fields have odd length {}",
            items.len()
        )));
    }

    let mut fields = Fields::new();
    let mut items = items.into_iter();
    while let (Some(key), Some(value)) = (items.next(), items.next()) {
        fields.insert(text(key)?, bytes(value)?);
    }
    Ok(fields)
}

fn into_pair(items: Vec<Value>) -> Result<(Value, Value), StoreError> {
    let len = items.len();
    let mut items = items.into_iter();
    match (items.next(), items.next(), items.next()) {
        (Some(first), Some(second), None) => Ok((first, second)),
        _ => Err(StoreError::Protocol(format!(
            "expected a two element array, got {len} elements"
        ))),
    }
}

fn text(value: Value) -> Result<String, StoreError> {
    match value {
        Value::BulkString(raw) => Ok(String::from_utf8_lossy(&raw).into_owned()),
        Value::SimpleString(s) => Ok(s),
        Value::Int(i) => Ok(i.to_string()),
        other => Err(unexpected("text", &other)),
    }
}

fn bytes(value: Value) -> Result<Bytes, StoreError> {
    match value {
        Value::BulkString(raw) => Ok(Bytes::from(raw)),
        Value::SimpleString(s) => Ok(Bytes::from(s)),
        Value::Int(i) => Ok(Bytes::from(i.to_string())),
        other => Err(unexpected("field value", &other)),
    }
}

fn unexpected(what: &str, value: &Value) -> StoreError {
    StoreError::Protocol(format!("unexpected {what}: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    fn entry(id: &str, fields: &[(&str, &str)]) -> Value {
        let flat = fields
            .iter()
            .flat_map(|(k, v)| [bulk(k), bulk(v)])
            .collect();
        Value::Array(vec![bulk(id), Value::Array(flat)])
    }

    #[test]
    fn should_treat_nil_reply_as_empty_poll() {
        assert!(raw_entries_from_reply(Value::Nil).unwrap().is_empty());
    }

    #[test]
    fn should_preserve_server_and_field_order() {
        // given
        let reply = Value::Array(vec![
            Value::Array(vec![
                bulk("orders"),
                Value::Array(vec![
                    entry("1-0", &[("z", "last"), ("a", "first")]),
                    entry("2-0", &[("default", "x")]),
                ]),
            ]),
            Value::Array(vec![
                bulk("audit"),
                Value::Array(vec![entry("1-5", &[("k", "v")])]),
            ]),
        ]);

        // when
        let entries = raw_entries_from_reply(reply).unwrap();

        // then
        let ids: Vec<_> = entries
            .iter()
            .map(|e| (e.stream.as_str(), e.id.as_str()))
            .collect();
        assert_eq!(ids, vec![("orders", "1-0"), ("orders", "2-0"), ("audit", "1-5")]);
        let keys: Vec<_> = entries[0].fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn should_accept_resp3_map_reply() {
        let reply = Value::Map(vec![(
            bulk("x"),
            Value::Array(vec![entry("1700000000000-0", &[("default", "hello")])]),
        )]);

        let entries = raw_entries_from_reply(reply).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fields.get("default"), Some(&Bytes::from("hello")));
    }

    #[test]
    fn should_keep_non_utf8_values_verbatim() {
        let reply = Value::Array(vec![Value::Array(vec![
            bulk("bin"),
            Value::Array(vec![Value::Array(vec![
                bulk("3-0"),
                Value::Array(vec![bulk("k"), Value::BulkString(vec![0xff, 0x00, 0x41])]),
            ])]),
        ])]);

        let entries = raw_entries_from_reply(reply).unwrap();

        assert_eq!(
            entries[0].fields.get("k"),
            Some(&Bytes::from_static(&[0xff, 0x00, 0x41]))
        );
    }

    #[test]
    fn should_reject_odd_field_list() {
        let reply = Value::Array(vec![Value::Array(vec![
            bulk("x"),
            Value::Array(vec![Value::Array(vec![
                bulk("1-0"),
                Value::Array(vec![bulk("dangling")]),
            ])]),
        ])]);

        assert!(matches!(
            raw_entries_from_reply(reply),
            Err(StoreError::Protocol(_))
        ));
    }

    #[test]
    fn should_read_newest_id_or_min_for_empty_stream() {
        let newest = Value::Array(vec![entry("1700000000000-3", &[("default", "x")])]);

        assert_eq!(
            last_id_from_reply(newest).unwrap(),
            EntryId::new(1_700_000_000_000, 3)
        );
        assert_eq!(last_id_from_reply(Value::Array(Vec::new())).unwrap(), EntryId::MIN);
        assert!(matches!(
            last_id_from_reply(Value::Int(3)),
            Err(StoreError::Protocol(_))
        ));
    }

    #[test]
    fn should_map_cursors_to_xread_ids() {
        assert_eq!(cursor_to_arg(&Cursor::Latest), "$");
        assert_eq!(cursor_to_arg(&Cursor::Beginning), "0-0");
        assert_eq!(cursor_to_arg(&Cursor::After(EntryId::new(17, 2))), "17-2");
    }
}
