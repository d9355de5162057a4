//! Payload format for the task list and result slots.
//!
//! Both are JSON. A missing or zero-length payload is what the store hands
//! back for a key nobody wrote yet, so it decodes to the empty value.

use bytes::Bytes;

use crate::error::CodecError;
use crate::task::{SlotState, Task};

pub fn encode_tasks(tasks: &[Task]) -> Result<Bytes, CodecError> {
    Ok(Bytes::from(serde_json::to_vec(tasks)?))
}

pub fn decode_tasks(payload: Option<&[u8]>) -> Result<Vec<Task>, CodecError> {
    match payload {
        None => Ok(Vec::new()),
        Some(bytes) if bytes.is_empty() => Ok(Vec::new()),
        Some(bytes) => Ok(serde_json::from_slice(bytes)?),
    }
}

pub fn encode_slot(state: &SlotState) -> Result<Bytes, CodecError> {
    Ok(Bytes::from(serde_json::to_vec(state)?))
}

pub fn decode_slot(payload: Option<&[u8]>) -> Result<SlotState, CodecError> {
    match payload {
        None => Ok(SlotState::Empty),
        Some(bytes) if bytes.is_empty() => Ok(SlotState::Empty),
        Some(bytes) => Ok(serde_json::from_slice(bytes)?),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::task::TaskKind;

    fn task(start: u64, end: u64, slot: u64) -> Task {
        Task {
            kind: TaskKind::CountPrimes,
            range_start: start,
            range_end: end,
            result_slot: slot,
        }
    }

    #[test]
    fn task_list_wire_format_is_stable() {
        let bytes = encode_tasks(&[task(1, 30, 10001)]).unwrap();
        assert_eq!(
            std::str::from_utf8(&bytes).unwrap(),
            r#"[{"kind":"count_primes","range_start":1,"range_end":30,"result_slot":10001}]"#
        );
    }

    #[test]
    fn encoding_is_deterministic_and_keeps_order() {
        let tasks = vec![task(20001, 25000, 10003), task(1, 10000, 10001)];
        let a = encode_tasks(&tasks).unwrap();
        let b = encode_tasks(&tasks).unwrap();
        assert_eq!(a, b);
        assert_eq!(decode_tasks(Some(&a[..])).unwrap(), tasks);
    }

    #[test]
    fn empty_list_and_missing_payload_decode_to_nothing() {
        let empty = encode_tasks(&[]).unwrap();
        assert_eq!(&empty[..], b"[]");
        assert!(decode_tasks(Some(&empty[..])).unwrap().is_empty());
        assert!(decode_tasks(None).unwrap().is_empty());
        assert!(decode_tasks(Some(&b""[..])).unwrap().is_empty());
    }

    #[test]
    fn slot_states_are_tagged() {
        let ready = encode_slot(&SlotState::Ready(1229)).unwrap();
        assert_eq!(&ready[..], br#"{"state":"ready","value":1229}"#);
        assert_eq!(decode_slot(Some(&ready[..])).unwrap(), SlotState::Ready(1229));

        let reclaimed = encode_slot(&SlotState::Reclaimed).unwrap();
        assert_eq!(decode_slot(Some(&reclaimed[..])).unwrap(), SlotState::Reclaimed);
        assert_eq!(decode_slot(None).unwrap(), SlotState::Empty);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_tasks(Some(&b"not json"[..])).is_err());
        assert!(decode_slot(Some(&br#"{"state":"gone"}"#[..])).is_err());
    }
}
