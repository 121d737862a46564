//! Property tests for message and channel semantics.

mod common;

use flowline::pipeline::{unbounded, Message};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_channel_delivers_each_value_once_in_order(
        values in prop::collection::vec(any::<i64>(), 0..200)
    ) {
        let (out, input) = unbounded();
        for v in &values {
            out.push(*v).unwrap();
        }
        drop(out);

        let received = common::drain_typed::<i64>(input);
        prop_assert_eq!(received, values);
    }

    #[test]
    fn test_clone_is_independent(
        original in prop::collection::vec(any::<u8>(), 0..64),
        appended in any::<u8>()
    ) {
        let message = Message::new(original.clone()).with(String::from("tag"));
        let mut copy = message.clone();

        if let Some(bytes) = copy.messages()[0].downcast_ref::<Vec<u8>>() {
            prop_assert_eq!(bytes, &original);
        }
        let mut mutated = copy.extract::<Vec<u8>>().unwrap();
        mutated.push(appended);

        prop_assert_eq!(copy.len(), 1);
        prop_assert_eq!(message.len(), 2);
        prop_assert_eq!(message.unpack::<Vec<u8>>().unwrap(), original);
    }

    #[test]
    fn test_tuple_extraction_ignores_chunk_order(
        number in any::<u32>(),
        text in ".{0,16}",
        flag in any::<bool>(),
        rotate in 0usize..3
    ) {
        let mut chunks = Message::from_tuple((number, text.clone(), flag)).take_messages();
        chunks.rotate_left(rotate);
        let message = Message::from_chunks(chunks);

        prop_assert!(message.convertible_to_all::<(bool, u32, String)>());
        let (f, n, t) = message.force_unpack_all::<(bool, u32, String)>().unwrap();
        prop_assert_eq!((n, t, f), (number, text, flag));
    }

    #[test]
    fn test_buffered_messages_survive_close(count in 0usize..100) {
        let (mut out, input) = unbounded();
        for i in 0..count {
            out.push(i).unwrap();
        }
        out.close();

        prop_assert!(out.push(0usize).is_err());
        prop_assert_eq!(common::drain_typed::<usize>(input), (0..count).collect::<Vec<_>>());
    }
}

#[test]
fn test_extraction_consumes_chunk() {
    let mut message = Message::new(5u16);
    assert_eq!(message.extract::<u16>(), Some(5));
    assert!(!message.convertible_to::<u16>());
    assert_eq!(message.extract::<u16>(), None);
}

#[test]
fn test_missing_tuple_member_leaves_message_intact() {
    let mut message = Message::new(1u8).with(2u16);
    assert!(message.extract_all::<(u8, u32)>().is_none());
    assert_eq!(message.len(), 2);
    assert!(message.force_unpack_all::<(u8, u32)>().is_err());
}
