//! Value encodings found in containerd's bolt databases.

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use std::borrow::Cow;
use std::fmt::Write;

pub type Reason = Cow<'static, str>;

/// Seconds from 0001-01-01 to 1970-01-01, the epoch shift of Go's `time.Time`.
const GO_UNIX_TO_INTERNAL: i64 = 62_135_596_800;

const MAX_VARINT_LEN: usize = 10;

/// Reads a Go `binary.Uvarint` prefix. Returns the value and the bytes read.
fn read_uvarint(b: &[u8]) -> Result<(u64, usize), Reason> {
  let mut x = 0u64;
  let mut s = 0u32;
  for (i, &byte) in b.iter().enumerate() {
    if i == MAX_VARINT_LEN {
      return Err("varint overflows 64 bits".into());
    }
    if byte < 0x80 {
      if i == MAX_VARINT_LEN - 1 && byte > 1 {
        return Err("varint overflows 64 bits".into());
      }
      return Ok((x | (byte as u64) << s, i + 1));
    }
    x |= ((byte & 0x7f) as u64) << s;
    s += 7;
  }
  Err(if b.is_empty() {
    "empty varint".into()
  } else {
    "truncated varint".into()
  })
}

/// Decodes a value that is exactly one unsigned varint.
pub fn uvarint(b: &[u8]) -> Result<u64, Reason> {
  let (x, n) = read_uvarint(b)?;
  if n != b.len() {
    return Err(format!("{} trailing bytes after varint", b.len() - n).into());
  }
  Ok(x)
}

/// Decodes a value that is exactly one zigzag signed varint, as written by
/// Go's `binary.PutVarint`.
pub fn varint(b: &[u8]) -> Result<i64, Reason> {
  let ux = uvarint(b)?;
  let x = (ux >> 1) as i64;
  Ok(if ux & 1 != 0 { !x } else { x })
}

/// Decodes the output of Go's `time.Time.MarshalBinary` into RFC 3339 with
/// nanoseconds.
///
/// Version 1 is 15 bytes, version 2 adds a byte of offset seconds. An offset
/// of -1 minutes marks UTC.
pub fn go_time(b: &[u8]) -> Result<String, Reason> {
  let (version, rest) = b.split_first().ok_or("empty timestamp")?;
  let expected = match version {
    1 => 14,
    2 => 15,
    v => return Err(format!("unsupported time encoding version {v}").into()),
  };
  if rest.len() != expected {
    return Err(format!("timestamp has {} bytes, expected {}", b.len(), expected + 1).into());
  }
  let sec = BigEndian::read_i64(&rest[0..8]);
  let nsec = BigEndian::read_i32(&rest[8..12]);
  let offset_min = BigEndian::read_i16(&rest[12..14]);
  let mut offset = offset_min as i32 * 60;
  if *version == 2 {
    offset += rest[14] as i8 as i32;
  }

  let unix = sec
    .checked_sub(GO_UNIX_TO_INTERNAL)
    .ok_or("timestamp out of range")?;
  let nsec = u32::try_from(nsec).map_err(|_| "negative nanoseconds")?;
  let utc = DateTime::from_timestamp(unix, nsec).ok_or("timestamp out of range")?;
  if offset_min == -1 {
    return Ok(utc.to_rfc3339_opts(SecondsFormat::Nanos, true));
  }
  let zone = FixedOffset::east_opt(offset).ok_or("zone offset out of range")?;
  Ok(
    utc
      .with_timezone(&zone)
      .to_rfc3339_opts(SecondsFormat::Nanos, true),
  )
}

/// Checks that `b` is an OCI digest `algorithm:encoded` and returns it.
pub fn digest(b: &[u8]) -> Result<&str, Reason> {
  let s = std::str::from_utf8(b).map_err(|_| "digest is not valid utf-8")?;
  let (algorithm, encoded) = s.split_once(':').ok_or("digest has no algorithm")?;
  let algorithm_ok = !algorithm.is_empty()
    && algorithm
      .split(|c| matches!(c, '+' | '.' | '_' | '-'))
      .all(|part| {
        !part.is_empty()
          && part
            .bytes()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
      });
  if !algorithm_ok {
    return Err(format!("invalid digest algorithm {algorithm:?}").into());
  }
  let hex_len = match algorithm {
    "sha256" => Some(64),
    "sha384" => Some(96),
    "sha512" => Some(128),
    _ => None,
  };
  let encoded_ok = match hex_len {
    Some(n) => {
      encoded.len() == n
        && encoded
          .bytes()
          .all(|c| c.is_ascii_digit() || (b'a'..=b'f').contains(&c))
    }
    None => {
      !encoded.is_empty()
        && encoded
          .bytes()
          .all(|c| c.is_ascii_alphanumeric() || matches!(c, b'=' | b'_' | b'-'))
    }
  };
  if !encoded_ok {
    return Err(format!("invalid {algorithm} digest encoding").into());
  }
  Ok(s)
}

/// Renders arbitrary bytes as text. Valid UTF-8 is kept as is, anything else
/// keeps printable ASCII and escapes the rest as `\xNN`.
pub fn printable(b: &[u8]) -> Cow<'_, str> {
  match std::str::from_utf8(b) {
    Ok(s) => Cow::Borrowed(s),
    Err(_) => Cow::Owned(escape(b)),
  }
}

fn escape(b: &[u8]) -> String {
  let mut out = String::with_capacity(b.len() * 2);
  for &c in b {
    if c.is_ascii_graphic() || c == b' ' {
      out.push(c as char);
    } else {
      let _ = write!(out, "\\x{c:02x}");
    }
  }
  out
}

/// Text that can be shown without escaping: UTF-8 with no control characters
/// other than common whitespace.
fn as_text(b: &[u8]) -> Option<&str> {
  std::str::from_utf8(b)
    .ok()
    .filter(|s| !s.chars().any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t')))
}

enum WireValue<'a> {
  Varint(u64),
  Fixed64(u64),
  Bytes(&'a [u8]),
  Fixed32(u32),
}

struct Field<'a> {
  number: u64,
  value: WireValue<'a>,
}

/// Splits a protobuf message into its fields.
fn fields(mut b: &[u8]) -> Result<Vec<Field<'_>>, Reason> {
  let mut out = vec![];
  while !b.is_empty() {
    let (tag, n) = read_uvarint(b)?;
    b = &b[n..];
    let number = tag >> 3;
    if number == 0 {
      return Err("protobuf field number 0".into());
    }
    let value = match tag & 0x7 {
      0 => {
        let (v, n) = read_uvarint(b)?;
        b = &b[n..];
        WireValue::Varint(v)
      }
      1 => {
        let v = b.get(..8).ok_or("truncated fixed64")?;
        b = &b[8..];
        WireValue::Fixed64(byteorder::LittleEndian::read_u64(v))
      }
      2 => {
        let (len, n) = read_uvarint(b)?;
        b = &b[n..];
        let len = usize::try_from(len).map_err(|_| "length overflows")?;
        let v = b.get(..len).ok_or("truncated length-delimited field")?;
        b = &b[len..];
        WireValue::Bytes(v)
      }
      5 => {
        let v = b.get(..4).ok_or("truncated fixed32")?;
        b = &b[4..];
        WireValue::Fixed32(byteorder::LittleEndian::read_u32(v))
      }
      t => return Err(format!("unsupported protobuf wire type {t}").into()),
    };
    out.push(Field { number, value });
  }
  Ok(out)
}

/// Nested messages below this depth are shown escaped.
const MAX_MESSAGE_DEPTH: usize = 32;

/// Renders a protobuf message with no schema as `{N:value ...}`, or `None`
/// if the bytes do not parse as one or `depth` is past [MAX_MESSAGE_DEPTH].
fn message(b: &[u8], depth: usize) -> Option<String> {
  if depth > MAX_MESSAGE_DEPTH {
    return None;
  }
  let fields = fields(b).ok()?;
  let mut out = String::from("{");
  for (i, f) in fields.iter().enumerate() {
    if i > 0 {
      out.push(' ');
    }
    let _ = write!(out, "{}:", f.number);
    let _ = match f.value {
      WireValue::Varint(v) => write!(out, "{v}"),
      WireValue::Fixed64(v) => write!(out, "{v:#x}"),
      WireValue::Fixed32(v) => write!(out, "{v:#x}"),
      WireValue::Bytes(v) => match as_text(v) {
        Some(s) => write!(out, "{s:?}"),
        None => match message(v, depth + 1).filter(|_| !v.is_empty()) {
          Some(m) => write!(out, "{m}"),
          None => write!(out, "\"{}\"", escape(v)),
        },
      },
    };
  }
  out.push('}');
  Some(out)
}

/// Decodes a `google.protobuf.Any` into `typeurl=<url>,value=<value>`.
///
/// The payload is shown as text when it is text (JSON specs), as a generic
/// protobuf rendering when it parses as one, and escaped otherwise.
pub fn any(b: &[u8]) -> Result<String, Reason> {
  let mut type_url: &[u8] = &[];
  let mut value: &[u8] = &[];
  for f in fields(b)? {
    match (f.number, f.value) {
      (1, WireValue::Bytes(v)) => type_url = v,
      (2, WireValue::Bytes(v)) => value = v,
      (1 | 2, _) => return Err("unexpected wire type in Any".into()),
      _ => {}
    }
  }
  let type_url = std::str::from_utf8(type_url).map_err(|_| "type url is not valid utf-8")?;
  let rendered = match as_text(value) {
    Some(s) => Cow::Borrowed(s),
    None => match message(value, 0) {
      Some(m) => Cow::Owned(m),
      None => Cow::Owned(escape(value)),
    },
  };
  Ok(format!("typeurl={type_url},value={rendered}"))
}

#[cfg(test)]
pub(crate) mod test {
  use super::*;
  use byteorder::WriteBytesExt;

  pub(crate) fn put_uvarint(mut x: u64) -> Vec<u8> {
    let mut out = vec![];
    while x >= 0x80 {
      out.push(x as u8 | 0x80);
      x >>= 7;
    }
    out.push(x as u8);
    out
  }

  pub(crate) fn put_varint(x: i64) -> Vec<u8> {
    let mut ux = (x as u64) << 1;
    if x < 0 {
      ux = !ux;
    }
    put_uvarint(ux)
  }

  /// Encodes a timestamp the way Go's `time.Time.MarshalBinary` does (version 1).
  pub(crate) fn put_go_time(unix: i64, nsec: i32, offset_min: i16) -> Vec<u8> {
    let mut out = vec![1u8];
    out.write_i64::<BigEndian>(unix + GO_UNIX_TO_INTERNAL).unwrap();
    out.write_i32::<BigEndian>(nsec).unwrap();
    out.write_i16::<BigEndian>(offset_min).unwrap();
    out
  }

  pub(crate) fn put_bytes_field(number: u64, b: &[u8]) -> Vec<u8> {
    let mut out = put_uvarint(number << 3 | 2);
    out.extend(put_uvarint(b.len() as u64));
    out.extend_from_slice(b);
    out
  }

  pub(crate) fn put_any(type_url: &str, value: &[u8]) -> Vec<u8> {
    let mut out = put_bytes_field(1, type_url.as_bytes());
    out.extend(put_bytes_field(2, value));
    out
  }

  #[test]
  fn test_uvarint() {
    assert_eq!(Ok(300), uvarint(&[0xac, 0x02]));
    assert_eq!(Ok(0), uvarint(&[0x00]));
    assert_eq!(Ok(u64::MAX), uvarint(&put_uvarint(u64::MAX)));
    assert!(uvarint(&[]).is_err());
    assert!(uvarint(&[0x80]).is_err());
    assert!(uvarint(&[0x01, 0x02]).is_err());
    assert!(uvarint(&[0xff; 11]).is_err());
  }

  #[test]
  fn test_varint() {
    assert_eq!(Ok(1), varint(&[0x02]));
    assert_eq!(Ok(-1), varint(&[0x01]));
    assert_eq!(Ok(300), varint(&[0xd8, 0x04]));
    for x in [0, 3, -64, 65, i64::MIN, i64::MAX, 1 << 40] {
      assert_eq!(Ok(x), varint(&put_varint(x)));
    }
  }

  #[test]
  fn test_go_time() {
    let utc = put_go_time(1_704_164_645, 6, -1);
    assert_eq!(Ok("2024-01-02T03:04:05.000000006Z".to_string()), go_time(&utc));

    let zoned = put_go_time(1_704_164_645, 0, 120);
    assert_eq!(
      Ok("2024-01-02T05:04:05.000000000+02:00".to_string()),
      go_time(&zoned)
    );

    let mut v2 = put_go_time(30, 0, 0);
    v2[0] = 2;
    v2.push(0);
    assert_eq!(Ok("1970-01-01T00:00:30.000000000Z".to_string()), go_time(&v2));

    assert!(go_time(&utc[..10]).is_err());
    let mut bad_version = utc.clone();
    bad_version[0] = 9;
    assert!(go_time(&bad_version).is_err());
  }

  #[test]
  fn test_digest() {
    let sha = format!("sha256:{}", "ab".repeat(32));
    assert_eq!(Ok(sha.as_str()), digest(sha.as_bytes()));
    assert!(digest(b"sha256:abc").is_err());
    assert!(digest(format!("sha256:{}", "AB".repeat(32)).as_bytes()).is_err());
    assert!(digest(b"no-colon").is_err());
    assert!(digest(b":abc").is_err());
    let multihash = "multihash+base58:QmRZxt2b1FVZPNqd8hsiykDL3TdBDeTSPX9Kv46HmX4Gx8";
    assert_eq!(Ok(multihash), digest(multihash.as_bytes()));
  }

  #[test]
  fn test_printable() {
    assert_eq!("plain", printable(b"plain"));
    assert_eq!("h\\x00i\\xff", printable(b"h\x00i\xff"));
  }

  #[test]
  fn test_any() -> Result<(), Reason> {
    let spec = put_any(
      "types.containerd.io/opencontainers/runtime-spec/1/Spec",
      br#"{"ociVersion":"1.1.0"}"#,
    );
    assert_eq!(
      r#"typeurl=types.containerd.io/opencontainers/runtime-spec/1/Spec,value={"ociVersion":"1.1.0"}"#,
      any(&spec)?
    );

    let mut options = put_bytes_field(1, b"runc");
    options.extend(put_uvarint(3 << 3));
    options.extend(put_uvarint(1));
    let wrapped = put_any("containerd.runc.v1.Options", &options);
    assert_eq!(
      r#"typeurl=containerd.runc.v1.Options,value={1:"runc" 3:1}"#,
      any(&wrapped)?
    );

    let raw = put_any("x", &[0x07]);
    assert_eq!("typeurl=x,value=\\x07", any(&raw)?);

    assert_eq!("typeurl=,value=", any(&[])?);
    assert!(any(&[0x0a, 0x05, b'a']).is_err());
    Ok(())
  }

  #[test]
  fn test_any_deeply_nested() -> Result<(), Reason> {
    // each level is `3:0xffffffff 1:<next level>`, built back to front
    let mut rev = vec![b'x'];
    for _ in 0..100_000 {
      let mut head = vec![(3 << 3) | 5, 0xff, 0xff, 0xff, 0xff];
      head.extend(put_uvarint(1 << 3 | 2));
      head.extend(put_uvarint(rev.len() as u64));
      rev.extend(head.iter().rev());
    }
    rev.reverse();
    let rendered = any(&put_any("t", &rev))?;
    let prefix = format!(
      "typeurl=t,value={}\"",
      "{3:0xffffffff 1:".repeat(MAX_MESSAGE_DEPTH + 1)
    );
    assert!(rendered.starts_with(&prefix));
    Ok(())
  }
}
