//! Edge cases across decoding and typed extraction.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use bytes::Bytes;
use proptest::prelude::*;
use tds_protocol::{TypeId, TypeInfo};
use tds_types::{FromSql, SqlType, SqlValue, TypeError, decode_value};

fn charset() -> &'static encoding_rs::Encoding {
    encoding_rs::WINDOWS_1252
}

mod null_handling {
    use super::*;

    #[test]
    fn test_null_decodes_for_all_nullable_types() {
        for (id, width) in [
            (TypeId::IntN, 4),
            (TypeId::FloatN, 8),
            (TypeId::BigVarChar, 50),
            (TypeId::NVarChar, 0xFFFF),
            (TypeId::Text, 0x7FFF_FFFF),
            (TypeId::Guid, 16),
        ] {
            let info = TypeInfo::new(id).with_max_length(width);
            assert_eq!(decode_value(None, &info, charset()).unwrap(), SqlValue::Null);
        }
    }

    #[test]
    fn test_null_to_option() {
        assert_eq!(Option::<f64>::from_sql(&SqlValue::Null).unwrap(), None);
        assert!(matches!(
            f64::from_sql(&SqlValue::Null),
            Err(TypeError::UnexpectedNull)
        ));
    }
}

mod strings {
    use super::*;

    #[test]
    fn test_empty_varchar_is_empty_not_null() {
        let info = TypeInfo::new(TypeId::BigVarChar).with_max_length(10);
        let value = decode_value(Some(Bytes::new()), &info, charset()).unwrap();
        assert_eq!(value, SqlValue::String(String::new()));
    }

    #[test]
    fn test_surrogate_pairs() {
        let text = "ward 🏥 4";
        let bytes: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let info = TypeInfo::new(TypeId::NVarChar).with_max_length(100);
        let value = decode_value(Some(Bytes::from(bytes)), &info, charset()).unwrap();
        assert_eq!(String::from_sql(&value).unwrap(), text);
    }

    #[test]
    fn test_lone_surrogate_is_an_error() {
        let info = TypeInfo::new(TypeId::NChar).with_max_length(2);
        let result = decode_value(Some(Bytes::from_static(&[0x00, 0xD8])), &info, charset());
        assert!(matches!(result, Err(TypeError::InvalidEncoding(_))));
    }
}

mod semantic_types {
    use super::*;

    #[test]
    fn test_decoded_variant_matches_declared_type() {
        let cases = [
            (TypeId::IntN, 2, vec![1u8, 0], SqlType::SmallInt),
            (TypeId::FloatN, 4, 1.5f32.to_le_bytes().to_vec(), SqlType::Real),
            (TypeId::BitN, 1, vec![1], SqlType::Bit),
        ];
        for (id, width, data, expected) in cases {
            let info = TypeInfo::new(id).with_max_length(width);
            assert_eq!(SqlType::from_type_info(&info).unwrap(), expected);
            let value = decode_value(Some(Bytes::from(data)), &info, charset()).unwrap();
            assert!(!value.is_null(), "{expected} decoded to NULL");
        }
    }
}

proptest! {
    #[test]
    fn float_bits_survive_decoding(v in any::<f64>().prop_filter("not NaN", |v| !v.is_nan())) {
        let info = TypeInfo::new(TypeId::FloatN).with_max_length(8);
        let value = decode_value(Some(Bytes::copy_from_slice(&v.to_le_bytes())), &info, charset()).unwrap();
        prop_assert_eq!(value, SqlValue::Double(v));
    }

    #[test]
    fn arbitrary_bytes_never_panic(
        data in proptest::collection::vec(any::<u8>(), 0..40),
        id in proptest::sample::select(vec![
            TypeId::DateTimeN, TypeId::DecimalN, TypeId::Time, TypeId::DateTimeOffset,
            TypeId::Guid, TypeId::MoneyN, TypeId::NVarChar, TypeId::Date,
        ]),
    ) {
        let info = TypeInfo::new(id).with_max_length(8).with_precision(18, 7);
        let _ = decode_value(Some(Bytes::from(data)), &info, charset());
    }
}
