//! Bencode encoding and decoding ([BEP-3]).
//!
//! Bencode is the serialization used by `.torrent` files and HTTP tracker
//! responses. Four value kinds exist:
//!
//! | Type | Format | Example |
//! |------|--------|---------|
//! | Integer | `i<number>e` | `i42e` → 42 |
//! | Byte String | `<length>:<data>` | `4:spam` → "spam" |
//! | List | `l<items>e` | `l4:spami42ee` → ["spam", 42] |
//! | Dictionary | `d<key><value>...e` | `d3:foo3:bare` → {"foo": "bar"} |
//!
//! Decoding is lenient about leading zeros in integers (`i03e` is 3), since
//! real-world torrents carry them. Encoding is canonical: dictionary keys
//! are emitted in raw-byte order, so re-encoding a decoded info dictionary
//! reproduces the bytes its hash was taken over.
//!
//! # Examples
//!
//! ```
//! use rswarm::bencode::{decode, decode_all, encode, Value};
//!
//! let value = decode(b"d3:foo3:bare").unwrap();
//! assert_eq!(value.get(b"foo").and_then(Value::as_str), Some("bar"));
//!
//! let values = decode_all(b"i1e4:spam").unwrap();
//! assert_eq!(values, vec![Value::Integer(1), Value::string("spam")]);
//!
//! assert_eq!(encode(&Value::Integer(-7)).unwrap(), b"i-7e");
//! ```
//!
//! # Errors
//!
//! Every decode failure reports the byte offset where it was detected; see
//! [`BencodeError`]. There is no "unsupported type" failure on the encode
//! side: [`Value`] can only hold the four encodable kinds.
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod decode;
mod encode;
mod error;
mod value;

pub use decode::{decode, decode_all};
pub use encode::{encode, encode_to};
pub use error::BencodeError;
pub use value::Value;
