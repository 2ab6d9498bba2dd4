//! Reducers: functions folding one batch of writes into a channel's
//! current value (`spec.md` §4.1).

use serde_json::Value;

use crate::error::{Result, RuntimeError};
use crate::messages::{Message, MessageOp};

/// Folds a batch of writes into a channel's current value. Implementors
/// must be side-effect free: `apply` may be called speculatively by the
/// node cache and must not observe or mutate anything outside its
/// arguments.
pub trait Reducer: Send + Sync {
    /// Applies `writes`, in batch order, against `current`. On error no
    /// channel is modified by the caller (`spec.md`'s atomicity
    /// invariant is enforced one layer up, in the store).
    fn apply(&self, channel: &str, current: Value, writes: Vec<Value>) -> Result<Value>;
}

/// The final write in the batch wins. Combined with the `single` update
/// policy this is how most scalar/record channels behave.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWins;

impl Reducer for LastWriteWins {
    fn apply(&self, _channel: &str, current: Value, writes: Vec<Value>) -> Result<Value> {
        Ok(writes.into_iter().next_back().unwrap_or(current))
    }
}

/// Numeric deltas are added to the current value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Reducer for Sum {
    fn apply(&self, channel: &str, current: Value, writes: Vec<Value>) -> Result<Value> {
        let mut total = current.as_f64().ok_or_else(|| RuntimeError::ReducerFailed {
            channel: channel.to_string(),
            cause: "current value is not numeric".to_string(),
        })?;
        for write in writes {
            let delta = write.as_f64().ok_or_else(|| RuntimeError::ReducerFailed {
                channel: channel.to_string(),
                cause: "write is not numeric".to_string(),
            })?;
            total += delta;
        }
        Ok(Value::from(total))
    }
}

/// The typed custom reducer for the `messages` channel (`spec.md`
/// §4.1). Operates on `Vec<Message>`, merging by id, honoring
/// `removeAll`/`remove`/upsert semantics, and stripping the transient
/// `op` field from every retained message.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagesReducer;

impl Reducer for MessagesReducer {
    fn apply(&self, channel: &str, current: Value, writes: Vec<Value>) -> Result<Value> {
        let mut entries: Vec<Message> = serde_json::from_value(current)?;
        let mut updates: Vec<Message> = writes
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?;

        // Step 1: any removeAll with a non-sentinel id is malformed.
        for update in &updates {
            if update.op == Some(MessageOp::RemoveAll) && update.id != Message::REMOVE_ALL_SENTINEL {
                return Err(RuntimeError::InvalidMessagesUpdate(format!(
                    "removeAll entry carried non-sentinel id {}",
                    update.id
                )));
            }
        }

        // Step 2: if U contains a removeAll sentinel, reset C and
        // discard all U entries at or before the last removeAll.
        if let Some(last_remove_all) = updates.iter().rposition(|u| u.op == Some(MessageOp::RemoveAll)) {
            entries.clear();
            updates = updates.split_off(last_remove_all + 1);
        }

        // Step 3: merge by id.
        for update in updates {
            match update.op {
                Some(MessageOp::Remove) => {
                    let position = entries.iter().position(|m| m.id == update.id).ok_or_else(|| {
                        RuntimeError::InvalidMessagesUpdate(format!("remove of unknown id {}", update.id))
                    })?;
                    entries.remove(position);
                }
                Some(MessageOp::RemoveAll) => unreachable!("removeAll entries consumed in step 2"),
                None | Some(MessageOp::Upsert) => {
                    if let Some(existing) = entries.iter_mut().find(|m| m.id == update.id) {
                        *existing = update;
                    } else {
                        entries.push(update);
                    }
                }
            }
        }

        // Step 4: strip the transient op field.
        for entry in &mut entries {
            entry.op = None;
        }

        serde_json::to_value(entries).map_err(|e| RuntimeError::ReducerFailed {
            channel: channel.to_string(),
            cause: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Role;

    fn msgs(values: Vec<Message>) -> Value {
        serde_json::to_value(values).unwrap()
    }

    #[test]
    fn last_write_wins_picks_final_entry() {
        let result = LastWriteWins
            .apply("c", Value::from(0), vec![Value::from(1), Value::from(2)])
            .unwrap();
        assert_eq!(result, Value::from(2));
    }

    #[test]
    fn sum_adds_deltas() {
        let result = Sum.apply("c", Value::from(10), vec![Value::from(1), Value::from(-4)]).unwrap();
        assert_eq!(result.as_f64().unwrap(), 7.0);
    }

    #[test]
    fn sum_rejects_non_numeric_current() {
        let err = Sum.apply("c", Value::String("x".into()), vec![]);
        assert!(matches!(err, Err(RuntimeError::ReducerFailed { .. })));
    }

    #[test]
    fn messages_reducer_appends_new_ids() {
        let current = msgs(vec![Message::new("m1", Role::User, "hi")]);
        let write = serde_json::to_value(Message::new("m2", Role::Assistant, "hello")).unwrap();
        let result = MessagesReducer.apply("messages", current, vec![write]).unwrap();
        let out: Vec<Message> = serde_json::from_value(result).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].id, "m2");
        assert!(out.iter().all(|m| m.op.is_none()));
    }

    #[test]
    fn messages_reducer_upserts_by_id() {
        let current = msgs(vec![Message::new("m1", Role::User, "hi")]);
        let write = serde_json::to_value(Message::new("m1", Role::User, "hi again")).unwrap();
        let result = MessagesReducer.apply("messages", current, vec![write]).unwrap();
        let out: Vec<Message> = serde_json::from_value(result).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "hi again");
    }

    #[test]
    fn messages_reducer_removes_known_id() {
        let current = msgs(vec![Message::new("m1", Role::User, "hi"), Message::new("m2", Role::User, "bye")]);
        let write = serde_json::to_value(Message::remove("m1")).unwrap();
        let result = MessagesReducer.apply("messages", current, vec![write]).unwrap();
        let out: Vec<Message> = serde_json::from_value(result).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "m2");
    }

    #[test]
    fn messages_reducer_fails_remove_of_unknown_id() {
        let current = msgs(vec![]);
        let write = serde_json::to_value(Message::remove("ghost")).unwrap();
        let err = MessagesReducer.apply("messages", current, vec![write]);
        assert!(matches!(err, Err(RuntimeError::InvalidMessagesUpdate(_))));
    }

    #[test]
    fn messages_reducer_remove_all_resets_and_discards_prior_entries() {
        let current = msgs(vec![Message::new("m1", Role::User, "hi")]);
        let writes = vec![
            serde_json::to_value(Message::new("stale", Role::User, "should be discarded")).unwrap(),
            serde_json::to_value(Message::remove_all()).unwrap(),
            serde_json::to_value(Message::new("m2", Role::Assistant, "fresh")).unwrap(),
        ];
        let result = MessagesReducer.apply("messages", current, writes).unwrap();
        let out: Vec<Message> = serde_json::from_value(result).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "m2");
    }

    #[test]
    fn messages_reducer_rejects_remove_all_with_non_sentinel_id() {
        let mut bogus = Message::remove_all();
        bogus.id = "not-the-sentinel".to_string();
        let err = MessagesReducer.apply("messages", msgs(vec![]), vec![serde_json::to_value(bogus).unwrap()]);
        assert!(matches!(err, Err(RuntimeError::InvalidMessagesUpdate(_))));
    }
}
