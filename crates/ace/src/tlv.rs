//! BER-TLV codec
//!
//! Decodes the nested tag-length-value records read off the secure element
//! into a tree of [`Tlv`] nodes. Tags are a single byte; lengths use the BER
//! short form (high bit clear) or long form (high bit set, low seven bits
//! giving the number of big-endian length bytes that follow). Which tags are
//! containers is not self-describing in this format, so the caller passes
//! the container tag set (see [`crate::consts::FILE_CONTAINER_TAGS`]).
//!
//! Unknown tags are preserved as leaves rather than rejected, so files
//! written against a newer profile still decode. A `0xFF` byte in tag
//! position terminates decoding: elementary files are 0xFF-padded to their
//! allocated size (GPD 7.1.2).

use bytes::{BufMut, Bytes, BytesMut};

use crate::consts::tags;
use crate::error::{Error, Result};

/// A decoded TLV node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    /// The tag byte
    pub tag: u8,
    /// The decoded value
    pub value: Value,
}

/// Value of a TLV node: raw bytes for leaves, child nodes for containers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Leaf byte string
    Primitive(Bytes),
    /// Nested TLV list
    Constructed(Vec<Tlv>),
}

impl Tlv {
    /// Create a leaf node
    pub fn primitive(tag: u8, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: Value::Primitive(value.into()),
        }
    }

    /// Create a container node
    pub const fn constructed(tag: u8, children: Vec<Self>) -> Self {
        Self {
            tag,
            value: Value::Constructed(children),
        }
    }

    /// The leaf byte string, if this node is primitive
    pub const fn bytes(&self) -> Option<&Bytes> {
        match &self.value {
            Value::Primitive(bytes) => Some(bytes),
            Value::Constructed(_) => None,
        }
    }

    /// The child nodes, if this node is a container
    pub fn children(&self) -> Option<&[Self]> {
        match &self.value {
            Value::Primitive(_) => None,
            Value::Constructed(children) => Some(children),
        }
    }

    /// First child carrying `tag`
    pub fn find(&self, tag: u8) -> Option<&Self> {
        find(self.children().unwrap_or_default(), tag)
    }

    /// Descend through `path`, taking the first matching child at each step
    pub fn path(&self, path: &[u8]) -> Option<&Self> {
        descend(self.children().unwrap_or_default(), path)
    }
}

/// First node in `nodes` carrying `tag`
pub fn find(nodes: &[Tlv], tag: u8) -> Option<&Tlv> {
    nodes.iter().find(|node| node.tag == tag)
}

/// All nodes in `nodes` carrying `tag`
pub fn find_all<'a>(nodes: &'a [Tlv], tag: u8) -> impl Iterator<Item = &'a Tlv> {
    nodes.iter().filter(move |node| node.tag == tag)
}

/// Descend through `path` starting from a top-level node list, taking the
/// first matching node at each step
pub fn descend<'a>(nodes: &'a [Tlv], path: &[u8]) -> Option<&'a Tlv> {
    let (&tag, rest) = path.split_first()?;
    let node = find(nodes, tag)?;
    if rest.is_empty() {
        Some(node)
    } else {
        descend(node.children()?, rest)
    }
}

/// Read a BER length at the start of `input`. Returns the length and the
/// number of bytes it occupied.
pub(crate) fn read_length(input: &[u8]) -> Result<(usize, usize)> {
    let &first = input.first().ok_or(Error::Tlv("missing length"))?;
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let num_bytes = (first & 0x7F) as usize;
    if num_bytes == 0 || num_bytes > 4 {
        return Err(Error::Tlv("unsupported length encoding"));
    }
    if input.len() < 1 + num_bytes {
        return Err(Error::Tlv("truncated length"));
    }

    let mut length = 0usize;
    for &byte in &input[1..1 + num_bytes] {
        length = (length << 8) | byte as usize;
    }
    Ok((length, 1 + num_bytes))
}

/// Decode a complete BER-TLV byte sequence into a node list.
///
/// The entire input is consumed; an incomplete tag/length/value triple is an
/// error. Nodes whose tag appears in `container_tags` are decoded
/// recursively, all others become leaves.
pub fn decode(input: &[u8], container_tags: &[u8]) -> Result<Vec<Tlv>> {
    let mut nodes = Vec::new();
    let mut pos = 0;

    while pos < input.len() {
        let tag = input[pos];
        if tag == tags::PADDING {
            // Rest of an 0xFF-padded file.
            break;
        }
        pos += 1;

        let (length, length_bytes) = read_length(&input[pos..])?;
        pos += length_bytes;

        let end = pos
            .checked_add(length)
            .filter(|&end| end <= input.len())
            .ok_or(Error::Tlv("value exceeds buffer"))?;
        let value = &input[pos..end];
        pos = end;

        let node = if container_tags.contains(&tag) {
            Tlv::constructed(tag, decode(value, container_tags)?)
        } else {
            Tlv::primitive(tag, Bytes::copy_from_slice(value))
        };
        nodes.push(node);
    }

    Ok(nodes)
}

/// Encode a node list back into BER-TLV bytes
pub fn encode(nodes: &[Tlv]) -> Bytes {
    let mut out = BytesMut::new();
    for node in nodes {
        encode_node(node, &mut out);
    }
    out.freeze()
}

fn encode_node(node: &Tlv, out: &mut BytesMut) {
    let value = match &node.value {
        Value::Primitive(bytes) => bytes.clone(),
        Value::Constructed(children) => encode(children),
    };
    out.put_u8(node.tag);
    put_length(value.len(), out);
    out.put_slice(&value);
}

fn put_length(length: usize, out: &mut BytesMut) {
    if length < 0x80 {
        out.put_u8(length as u8);
    } else {
        let bytes = length.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        out.put_u8(0x80 | (bytes.len() - skip) as u8);
        out.put_slice(&bytes[skip..]);
    }
}
