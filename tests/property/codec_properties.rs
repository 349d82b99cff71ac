//! Property-based tests for the flat string codec.
//!
//! Uses proptest to verify:
//! 1. Every structured variant survives encode → decode.
//! 2. Free text without a reserved prefix decodes to itself as chat.
//! 3. Arbitrary strings and bytes never cause a panic in `decode`.
//! 4. Decoding is a fixed point: re-encoding a decoded payload and decoding
//!    again yields the same message.

use huddle_proto::codec;
use huddle_proto::message::{ALIVE_PREFIX, EXIT_PREFIX, JOIN_PREFIX, KICK_PREFIX, WireMessage};
use proptest::prelude::*;

/// Strategy for names that can appear in structured fields.
fn arb_name() -> impl Strategy<Value = String> {
    "[^:]{1,32}"
}

/// Strategy for the four structured variants.
fn arb_structured() -> impl Strategy<Value = WireMessage> {
    prop_oneof![
        arb_name().prop_map(|name| WireMessage::Join { name }),
        arb_name().prop_map(|name| WireMessage::Alive { name }),
        arb_name().prop_map(|name| WireMessage::Exit { name }),
        (arb_name(), arb_name()).prop_map(|(target, admin)| WireMessage::Kick { target, admin }),
    ]
}

fn has_reserved_prefix(text: &str) -> bool {
    [JOIN_PREFIX, ALIVE_PREFIX, EXIT_PREFIX, KICK_PREFIX]
        .iter()
        .any(|prefix| text.starts_with(prefix))
}

proptest! {
    #[test]
    fn structured_messages_round_trip(msg in arb_structured()) {
        let payload = codec::encode(&msg);
        prop_assert_eq!(codec::decode(&payload), msg);
    }

    #[test]
    fn kick_target_with_delimiter_round_trips(
        parts in prop::collection::vec("[^:]{1,8}", 1..4),
        admin in arb_name(),
    ) {
        let msg = WireMessage::Kick { target: parts.join(":"), admin };
        prop_assert_eq!(codec::decode(&codec::encode(&msg)), msg);
    }

    #[test]
    fn free_text_decodes_as_chat(text in ".*") {
        prop_assume!(!has_reserved_prefix(&text));
        prop_assert_eq!(
            codec::decode(&text),
            WireMessage::Chat { text: text.clone() }
        );
    }

    #[test]
    fn decode_is_total_on_prefixed_garbage(
        prefix in prop::sample::select(vec![JOIN_PREFIX, ALIVE_PREFIX, EXIT_PREFIX, KICK_PREFIX]),
        rest in ".{0,64}",
    ) {
        let payload = format!("{prefix}{rest}");
        let _ = codec::decode(&payload);
    }

    #[test]
    fn lossy_payloads_always_decode(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = codec::decode(&codec::payload_text(&bytes));
    }

    #[test]
    fn payload_text_keeps_valid_utf8(text in ".{0,64}") {
        prop_assert_eq!(codec::payload_text(text.as_bytes()), text);
    }

    #[test]
    fn decode_is_a_fixed_point(text in ".{0,64}") {
        let once = codec::decode(&text);
        let twice = codec::decode(&codec::encode(&once));
        prop_assert_eq!(once, twice);
    }
}
