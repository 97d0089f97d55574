//! Property-based testing for dvpl
//!
//! Uses proptest to check codec invariants across random payloads.

use ::dvpl::codec::{self, ContainerCodec, FallbackPolicy, FOOTER_SIZE, MARKER};
use ::dvpl::*;
use proptest::prelude::*;

fn writable_type() -> impl Strategy<Value = PayloadType> {
    prop_oneof![
        Just(PayloadType::None),
        Just(PayloadType::Lz4Hc),
        Just(PayloadType::Lz4),
    ]
}

/// Random bytes or repetitive text, so both fallback paths are hit
fn payload() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..4096),
        ("[a-c ]{1,16}", 1usize..200).prop_map(|(unit, n)| unit.repeat(n).into_bytes()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_round_trip(data in payload(), t in writable_type(), forced in any::<bool>()) {
        let choice = CompressionChoice { algorithm: t, forced };
        let packed = codec::pack(&data, choice).unwrap();
        let unpacked = codec::unpack(&packed.bytes, false).unwrap();
        prop_assert_eq!(unpacked.bytes, data);
        prop_assert_eq!(unpacked.payload_type, packed.payload_type);
    }

    #[test]
    fn prop_footer_describes_container(data in payload(), t in writable_type()) {
        let packed = codec::pack(&data, CompressionChoice::new(t)).unwrap();
        let footer = codec::inspect(&packed.bytes).unwrap();

        prop_assert_eq!(packed.bytes.len(), footer.stored_size as usize + FOOTER_SIZE);
        prop_assert_eq!(footer.uncompressed_size as usize, data.len());
        prop_assert_eq!(&packed.bytes[packed.bytes.len() - 4..], &MARKER[..]);

        let stored = &packed.bytes[..footer.stored_size as usize];
        prop_assert_eq!(footer.crc32, crc32fast::hash(stored));

        if footer.payload_type == PayloadType::None.as_u32() {
            prop_assert_eq!(stored, &data[..]);
        } else {
            prop_assert!(footer.stored_size as usize <= data.len());
        }
    }

    #[test]
    fn prop_unforced_never_grows(data in payload(), t in writable_type()) {
        let packed = codec::pack(&data, CompressionChoice::new(t)).unwrap();
        prop_assert!(packed.stored_size() <= data.len());
    }

    #[test]
    fn prop_larger_policy_allows_equal(data in payload()) {
        let codec = ContainerCodec::new(codec::CodecOptions {
            fallback: FallbackPolicy::Larger,
            ..Default::default()
        });
        let packed = codec.pack(&data, CompressionChoice::new(PayloadType::Lz4)).unwrap();
        prop_assert!(packed.stored_size() <= data.len());
        prop_assert_eq!(codec.unpack(&packed.bytes, false).unwrap().bytes, data);
    }

    #[test]
    fn prop_stored_byte_corruption_is_detected(
        data in prop::collection::vec(any::<u8>(), 1..2048),
        t in writable_type(),
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let mut container = codec::pack(&data, CompressionChoice::new(t)).unwrap().bytes;
        let stored_len = container.len() - FOOTER_SIZE;
        prop_assume!(stored_len > 0);

        let at = index.index(stored_len);
        container[at] ^= flip;

        let err = codec::unpack(&container, false).unwrap_err();
        let is_crc_mismatch = matches!(err, DvplError::ChecksumMismatch { .. });
        prop_assert!(is_crc_mismatch);
    }

    #[test]
    fn prop_truncated_containers_are_rejected(data in payload(), cut in 1usize..=FOOTER_SIZE) {
        let container = codec::pack(&data, CompressionChoice::default()).unwrap().bytes;
        let truncated = &container[..container.len() - cut];
        prop_assert!(codec::unpack(truncated, false).is_err());
    }
}
