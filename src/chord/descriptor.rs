use crate::chord::types::{IdSpace, Identifier};
use crate::error::MessageError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::hash::{Hash, Hasher};

/// The identity and address of a ring member.
///
/// The identifier is derived from `name` once, at construction. It is never
/// sent over the wire; the receiver re-hashes the name instead.
#[derive(Clone, Debug)]
pub struct PeerDescriptor {
    name: String,
    host: String,
    port: u16,
    id: Identifier,
}

impl PartialEq for PeerDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerDescriptor {}

impl Hash for PeerDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{} ({})", self.name, self.host, self.port, self.id)
    }
}

impl PeerDescriptor {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        space: &IdSpace,
    ) -> Result<Self, MessageError> {
        let name = name.into();
        let host = host.into();
        check_field_len("name", &name)?;
        check_field_len("host", &host)?;
        let id = space.identifier_of(&name);
        Ok(Self { name, host, port, id })
    }

    pub fn id(&self) -> Identifier {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, the form the transport dials.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.name.len() + self.host.len() + 8);
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Appends `nameLen name hostLen host portLen portDigits` to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        let port = self.port.to_string();
        for field in [self.name.as_bytes(), self.host.as_bytes(), port.as_bytes()] {
            // lengths were checked at construction
            buf.put_u8(field.len() as u8);
            buf.put_slice(field);
        }
    }

    /// Decodes exactly one descriptor; trailing bytes are rejected.
    pub fn deserialize(bytes: &[u8], space: &IdSpace) -> Result<Self, MessageError> {
        let mut buf = bytes;
        let peer = Self::decode_from(&mut buf, space)?;
        if buf.has_remaining() {
            return Err(MessageError::MalformedPeer(format!(
                "{} trailing bytes after descriptor",
                buf.remaining()
            )));
        }
        Ok(peer)
    }

    /// Decodes one descriptor from the front of `buf`, advancing past it.
    pub fn decode_from(buf: &mut impl Buf, space: &IdSpace) -> Result<Self, MessageError> {
        let name = read_field(buf, "name")?;
        let host = read_field(buf, "host")?;
        let port = read_field(buf, "port")?;
        let port = port
            .parse::<u16>()
            .map_err(|_| MessageError::MalformedPeer(format!("invalid port {:?}", port)))?;
        Self::new(name, host, port, space)
    }
}

fn check_field_len(field: &str, value: &str) -> Result<(), MessageError> {
    if value.len() > u8::MAX as usize {
        return Err(MessageError::MalformedPeer(format!(
            "{} is {} bytes, at most {} can be encoded",
            field,
            value.len(),
            u8::MAX
        )));
    }
    Ok(())
}

fn read_field(buf: &mut impl Buf, field: &str) -> Result<String, MessageError> {
    if !buf.has_remaining() {
        return Err(MessageError::MalformedPeer(format!("missing {} length", field)));
    }
    let len = buf.get_u8() as usize;
    if len > buf.remaining() {
        return Err(MessageError::MalformedPeer(format!(
            "{} length {} exceeds remaining {} bytes",
            field,
            len,
            buf.remaining()
        )));
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec())
        .map_err(|_| MessageError::MalformedPeer(format!("{} is not valid UTF-8", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space() -> IdSpace {
        IdSpace::new(16).unwrap()
    }

    #[test]
    fn serializes_byte_exact() {
        let peer = PeerDescriptor::new("ab", "h", 8080, &space()).unwrap();
        assert_eq!(
            peer.serialize().as_ref(),
            &[2, b'a', b'b', 1, b'h', 4, b'8', b'0', b'8', b'0']
        );
    }

    #[test]
    fn deserialize_restores_fields_and_identifier() {
        let space = space();
        let peer = PeerDescriptor::new("node-7", "10.0.0.7", 4000, &space).unwrap();
        let decoded = PeerDescriptor::deserialize(&peer.serialize(), &space).unwrap();
        assert_eq!(decoded.name(), "node-7");
        assert_eq!(decoded.host(), "10.0.0.7");
        assert_eq!(decoded.port(), 4000);
        assert_eq!(decoded.id(), peer.id());
    }

    #[test]
    fn equality_ignores_address() {
        let space = space();
        let a = PeerDescriptor::new("same", "10.0.0.1", 1, &space).unwrap();
        let b = PeerDescriptor::new("same", "10.0.0.2", 2, &space).unwrap();
        let c = PeerDescriptor::new("other", "10.0.0.1", 1, &space).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn name_length_beyond_buffer_is_malformed() {
        let err = PeerDescriptor::deserialize(&[200, b'a', b'b'], &space()).unwrap_err();
        assert!(matches!(err, MessageError::MalformedPeer(_)));
    }

    #[test]
    fn truncated_and_trailing_input_is_malformed() {
        let space = space();
        assert!(PeerDescriptor::deserialize(&[], &space).is_err());
        assert!(PeerDescriptor::deserialize(&[1, b'a', 1, b'h'], &space).is_err());

        let mut bytes = PeerDescriptor::new("a", "h", 1, &space).unwrap().serialize().to_vec();
        bytes.push(0);
        assert!(PeerDescriptor::deserialize(&bytes, &space).is_err());
    }

    #[test]
    fn bad_port_is_malformed() {
        let space = space();
        let bad_port = [1, b'a', 1, b'h', 5, b'9', b'9', b'9', b'9', b'9'];
        let err = PeerDescriptor::deserialize(&bad_port, &space).unwrap_err();
        assert!(matches!(err, MessageError::MalformedPeer(_)));
        assert!(PeerDescriptor::deserialize(&[1, b'a', 1, b'h', 2, b'x', b'1'], &space).is_err());
    }

    #[test]
    fn oversized_name_is_rejected() {
        let name = "n".repeat(256);
        assert!(PeerDescriptor::new(name, "h", 1, &space()).is_err());
    }

    #[test]
    fn decode_from_advances_past_one_descriptor() {
        let space = space();
        let a = PeerDescriptor::new("a", "h1", 1, &space).unwrap();
        let b = PeerDescriptor::new("b", "h2", 2, &space).unwrap();
        let mut buf = BytesMut::new();
        a.encode_into(&mut buf);
        b.encode_into(&mut buf);
        let mut bytes = buf.freeze();
        assert_eq!(PeerDescriptor::decode_from(&mut bytes, &space).unwrap().name(), "a");
        assert_eq!(PeerDescriptor::decode_from(&mut bytes, &space).unwrap().name(), "b");
        assert!(bytes.is_empty());
    }
}
