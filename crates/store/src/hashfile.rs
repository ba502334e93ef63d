//! Hash-file codec
//!
//! Property maps and node records are persisted as a sequence of
//! length-prefixed records terminated by a literal `END`:
//!
//! ```text
//! K <keylen>\n
//! <key>\n
//! V <vallen>\n
//! <value>\n
//! END\n
//! ```
//!
//! Keys are UTF-8; values are raw bytes. Because both are length
//! prefixed, embedded newlines and binary data are legal. A nil value
//! is encoded as omission of the record. Maps serialize in `BTreeMap`
//! key order, so the encoding is deterministic.

use tessera_core::{Error, PropMap, Result};

/// Terminator token
const END_TOKEN: &[u8] = b"END";

/// Serialize a property map to hash-file bytes
pub fn to_bytes(map: &PropMap) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in map {
        out.extend_from_slice(format!("K {}\n", key.len()).as_bytes());
        out.extend_from_slice(key.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(format!("V {}\n", value.len()).as_bytes());
        out.extend_from_slice(value);
        out.push(b'\n');
    }
    out.extend_from_slice(END_TOKEN);
    out.push(b'\n');
    out
}

/// Parse a hash-file that must occupy the whole input
pub fn from_bytes(bytes: &[u8]) -> Result<PropMap> {
    let (map, consumed) = parse_prefix(bytes)?;
    if consumed != bytes.len() {
        return Err(corrupt("trailing bytes after END"));
    }
    Ok(map)
}

/// Parse a hash-file from the front of `bytes`
///
/// Returns the map and the number of bytes consumed (including the
/// terminator line). Used when records are embedded at byte offsets
/// inside a larger file.
pub fn parse_prefix(bytes: &[u8]) -> Result<(PropMap, usize)> {
    let mut map = PropMap::new();
    let mut pos = 0;

    loop {
        let (line, after_line) = read_line(bytes, pos)?;

        if line == END_TOKEN {
            return Ok((map, after_line));
        }

        let key_len = parse_header(line, b'K')?;
        let (key_bytes, after_key) = read_exact(bytes, after_line, key_len)?;
        let key = std::str::from_utf8(key_bytes)
            .map_err(|_| corrupt("key is not valid UTF-8"))?
            .to_string();

        let (line, after_line) = read_line(bytes, after_key)?;
        let val_len = parse_header(line, b'V')?;
        let (val_bytes, after_val) = read_exact(bytes, after_line, val_len)?;

        map.insert(key, val_bytes.to_vec());
        pos = after_val;
    }
}

fn corrupt(details: &str) -> Error {
    Error::CorruptHashFile {
        details: details.to_string(),
    }
}

/// Read one `\n`-terminated line starting at `pos`; returns the line
/// without the newline and the position just past it.
fn read_line(bytes: &[u8], pos: usize) -> Result<(&[u8], usize)> {
    let rest = bytes.get(pos..).ok_or_else(|| corrupt("truncated input"))?;
    let nl = rest
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| corrupt("unterminated header line"))?;
    Ok((&rest[..nl], pos + nl + 1))
}

/// Read exactly `len` bytes at `pos` followed by a newline.
fn read_exact(bytes: &[u8], pos: usize, len: usize) -> Result<(&[u8], usize)> {
    let end = pos.checked_add(len).ok_or_else(|| corrupt("length overflow"))?;
    let data = bytes
        .get(pos..end)
        .ok_or_else(|| corrupt("truncated record body"))?;
    match bytes.get(end) {
        Some(b'\n') => Ok((data, end + 1)),
        _ => Err(corrupt("record body not newline-terminated")),
    }
}

/// Parse a `K <len>` / `V <len>` header line.
fn parse_header(line: &[u8], tag: u8) -> Result<usize> {
    if line.len() < 3 || line[0] != tag || line[1] != b' ' {
        return Err(corrupt("malformed record header"));
    }
    std::str::from_utf8(&line[2..])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| corrupt("malformed record length"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn map_of(pairs: &[(&str, &[u8])]) -> PropMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect()
    }

    #[test]
    fn test_empty_map() {
        let bytes = to_bytes(&PropMap::new());
        assert_eq!(bytes, b"END\n");
        assert!(from_bytes(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_known_encoding() {
        let map = map_of(&[("tsr:log", b"first")]);
        let bytes = to_bytes(&map);
        assert_eq!(bytes, b"K 7\ntsr:log\nV 5\nfirst\nEND\n");
    }

    #[test]
    fn test_round_trip_binary_value() {
        let map = map_of(&[("blob", &[0u8, 1, 2, b'\n', 255, b'E', b'N', b'D'])]);
        assert_eq!(from_bytes(&to_bytes(&map)).unwrap(), map);
    }

    #[test]
    fn test_round_trip_newline_in_key() {
        let map = map_of(&[("multi\nline", b"v")]);
        assert_eq!(from_bytes(&to_bytes(&map)).unwrap(), map);
    }

    #[test]
    fn test_parse_prefix_reports_consumed() {
        let map = map_of(&[("a", b"1")]);
        let mut bytes = to_bytes(&map);
        let len = bytes.len();
        bytes.extend_from_slice(b"unrelated trailing data");

        let (parsed, consumed) = parse_prefix(&bytes).unwrap();
        assert_eq!(parsed, map);
        assert_eq!(consumed, len);
    }

    #[test]
    fn test_from_bytes_rejects_trailing_bytes() {
        let mut bytes = to_bytes(&PropMap::new());
        bytes.push(b'x');
        assert!(matches!(
            from_bytes(&bytes),
            Err(Error::CorruptHashFile { .. })
        ));
    }

    #[test]
    fn test_rejects_truncated_input() {
        let bytes = to_bytes(&map_of(&[("key", b"value")]));
        for cut in 1..bytes.len() {
            let err = from_bytes(&bytes[..cut]).unwrap_err();
            assert!(matches!(err, Error::CorruptHashFile { .. }), "cut={}", cut);
        }
    }

    #[test]
    fn test_rejects_missing_end() {
        assert!(from_bytes(b"K 1\na\nV 1\nb\n").is_err());
    }

    #[test]
    fn test_rejects_garbage_header() {
        assert!(from_bytes(b"Q 1\na\nEND\n").is_err());
        assert!(from_bytes(b"K x\na\nEND\n").is_err());
    }

    proptest! {
        // Byte-exact round trip over arbitrary keys and binary values.
        #[test]
        fn prop_round_trip(map in proptest::collection::btree_map(
            "\\PC{0,24}",
            proptest::collection::vec(any::<u8>(), 0..64),
            0..8,
        )) {
            let encoded = to_bytes(&map);
            let decoded = from_bytes(&encoded).unwrap();
            prop_assert_eq!(decoded, map);
        }
    }
}
