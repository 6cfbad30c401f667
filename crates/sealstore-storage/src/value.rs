use std::collections::HashSet;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("value decode failed: {reason}")]
pub struct ParseError {
    reason: String,
}

const TAG_STRING: u8 = b's';
const TAG_I32: u8 = b'i';
const TAG_I64: u8 = b'l';
const TAG_F32: u8 = b'f';
const TAG_BOOL: u8 = b'b';
const TAG_STRING_SET: u8 = b'S';

/// A value the encrypted store can persist.
///
/// Encodings are self-delimiting: one type-tag byte, then a payload that
/// carries its own lengths. Embedded separators in strings cannot corrupt
/// parsing, and a read under the wrong type fails instead of
/// reinterpreting bytes.
pub trait StoreValue: Sized {
    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Result<Self, ParseError>;
}

impl StoreValue for String {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.len());
        out.push(TAG_STRING);
        out.extend_from_slice(self.as_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        let payload = expect_tag(bytes, TAG_STRING)?;
        String::from_utf8(payload.to_vec()).map_err(|err| parse_err(format!("utf-8: {err}")))
    }
}

impl StoreValue for i32 {
    fn encode(&self) -> Vec<u8> {
        scalar(TAG_I32, &self.to_be_bytes())
    }

    fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        let payload = expect_tag(bytes, TAG_I32)?;
        Ok(i32::from_be_bytes(fixed::<4>(payload)?))
    }
}

impl StoreValue for i64 {
    fn encode(&self) -> Vec<u8> {
        scalar(TAG_I64, &self.to_be_bytes())
    }

    fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        let payload = expect_tag(bytes, TAG_I64)?;
        Ok(i64::from_be_bytes(fixed::<8>(payload)?))
    }
}

impl StoreValue for f32 {
    fn encode(&self) -> Vec<u8> {
        scalar(TAG_F32, &self.to_be_bytes())
    }

    fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        let payload = expect_tag(bytes, TAG_F32)?;
        Ok(f32::from_be_bytes(fixed::<4>(payload)?))
    }
}

impl StoreValue for bool {
    fn encode(&self) -> Vec<u8> {
        scalar(TAG_BOOL, &[u8::from(*self)])
    }

    fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        let payload = expect_tag(bytes, TAG_BOOL)?;
        match fixed::<1>(payload)? {
            [0] => Ok(false),
            [1] => Ok(true),
            [other] => Err(parse_err(format!("invalid boolean byte: {other:#04x}"))),
        }
    }
}

/// Members are length-prefixed, so commas, quotes, or any other separator
/// inside a member survive the round trip.
impl StoreValue for HashSet<String> {
    fn encode(&self) -> Vec<u8> {
        let mut out = vec![TAG_STRING_SET];
        out.extend_from_slice(&(self.len() as u32).to_be_bytes());
        for member in self {
            out.extend_from_slice(&(member.len() as u32).to_be_bytes());
            out.extend_from_slice(member.as_bytes());
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut payload = expect_tag(bytes, TAG_STRING_SET)?;
        let count = read_u32(&mut payload)?;

        let mut set = HashSet::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let len = read_u32(&mut payload)? as usize;
            if payload.len() < len {
                return Err(parse_err(format!(
                    "member length {len} exceeds remaining {} bytes",
                    payload.len()
                )));
            }
            let (member, rest) = payload.split_at(len);
            let member = String::from_utf8(member.to_vec())
                .map_err(|err| parse_err(format!("utf-8: {err}")))?;
            set.insert(member);
            payload = rest;
        }

        if !payload.is_empty() {
            return Err(parse_err(format!("{} trailing bytes", payload.len())));
        }
        Ok(set)
    }
}

fn scalar(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(tag);
    out.extend_from_slice(payload);
    out
}

fn expect_tag(bytes: &[u8], tag: u8) -> Result<&[u8], ParseError> {
    match bytes.split_first() {
        Some((&found, rest)) if found == tag => Ok(rest),
        Some((&found, _)) => Err(parse_err(format!(
            "type tag {found:#04x} does not match expected {tag:#04x}"
        ))),
        None => Err(parse_err("empty payload")),
    }
}

fn fixed<const N: usize>(payload: &[u8]) -> Result<[u8; N], ParseError> {
    if payload.len() != N {
        return Err(parse_err(format!(
            "expected {N} payload bytes, got {}",
            payload.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(payload);
    Ok(out)
}

fn read_u32(input: &mut &[u8]) -> Result<u32, ParseError> {
    if input.len() < 4 {
        return Err(parse_err("truncated length prefix"));
    }
    let (head, rest) = input.split_at(4);
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(head);
    *input = rest;
    Ok(u32::from_be_bytes(bytes))
}

fn parse_err(reason: impl Into<String>) -> ParseError {
    ParseError {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: StoreValue + PartialEq + std::fmt::Debug>(value: T) {
        let encoded = value.encode();
        assert_eq!(T::decode(&encoded).expect("decode"), value);
    }

    #[test]
    fn scalars_round_trip() {
        round_trip("plain text with, separators; inside".to_string());
        round_trip(String::new());
        round_trip(-42i32);
        round_trip(i64::MIN);
        round_trip(3.5f32);
        round_trip(true);
        round_trip(false);
    }

    #[test]
    fn string_sets_round_trip_with_embedded_delimiters() {
        let set: HashSet<String> = ["a,b", "c\"d", "", "plain"]
            .into_iter()
            .map(String::from)
            .collect();
        round_trip(set);
        round_trip(HashSet::<String>::new());
    }

    #[test]
    fn cross_type_reads_fail() {
        let encoded = 7i32.encode();
        assert!(String::decode(&encoded).is_err());
        assert!(i64::decode(&encoded).is_err());
        assert!(HashSet::<String>::decode(&encoded).is_err());
    }

    #[test]
    fn truncated_payloads_fail() {
        let encoded = 7i64.encode();
        assert!(i64::decode(&encoded[..5]).is_err());

        let set: HashSet<String> = ["abcdef"].into_iter().map(String::from).collect();
        let encoded = set.encode();
        assert!(HashSet::<String>::decode(&encoded[..encoded.len() - 2]).is_err());
    }

    #[test]
    fn trailing_bytes_fail() {
        let mut encoded = HashSet::<String>::new().encode();
        encoded.push(0xFF);
        assert!(HashSet::<String>::decode(&encoded).is_err());
    }

    #[test]
    fn invalid_boolean_byte_fails() {
        assert!(bool::decode(&[TAG_BOOL, 2]).is_err());
    }

    #[test]
    fn empty_payload_fails() {
        assert!(String::decode(&[]).is_err());
    }
}
