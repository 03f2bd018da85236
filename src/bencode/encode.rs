use super::error::BencodeError;
use super::value::Value;
use std::io::Write;

/// Encodes a value into its canonical bencoding.
///
/// Dictionary keys come out sorted by raw byte value (the map type keeps
/// them that way), which is the form the info-hash is computed over.
///
/// ```
/// use rswarm::bencode::{encode, Value};
/// use bytes::Bytes;
/// use std::collections::BTreeMap;
///
/// let mut dict = BTreeMap::new();
/// dict.insert(Bytes::from_static(b"b"), Value::Integer(1));
/// dict.insert(Bytes::from_static(b"a"), Value::Integer(2));
/// assert_eq!(encode(&Value::Dict(dict)).unwrap(), b"d1:ai2e1:bi1ee");
/// ```
pub fn encode(value: &Value) -> Result<Vec<u8>, BencodeError> {
    let mut buf = Vec::new();
    encode_to(value, &mut buf)?;
    Ok(buf)
}

/// Streams the encoding of `value` into `writer`.
pub fn encode_to<W: Write>(value: &Value, writer: &mut W) -> Result<(), BencodeError> {
    match value {
        Value::Integer(i) => {
            write!(writer, "i{}e", i)?;
        }
        Value::Bytes(b) => write_bytes(b, writer)?,
        Value::List(items) => {
            writer.write_all(b"l")?;
            for item in items {
                encode_to(item, writer)?;
            }
            writer.write_all(b"e")?;
        }
        Value::Dict(entries) => {
            writer.write_all(b"d")?;
            for (key, val) in entries {
                write_bytes(key, writer)?;
                encode_to(val, writer)?;
            }
            writer.write_all(b"e")?;
        }
    }
    Ok(())
}

fn write_bytes<W: Write>(bytes: &[u8], writer: &mut W) -> Result<(), BencodeError> {
    write!(writer, "{}:", bytes.len())?;
    writer.write_all(bytes)?;
    Ok(())
}
