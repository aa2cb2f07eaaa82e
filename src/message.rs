use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use super::error::*;

// STUN header size
pub const HEADER_BYTE_SIZE: usize = 20;

// Attribute TLV header size (type + length)
pub const ATTR_HEADER_BYTE_SIZE: usize = 4;

// Address-valued attribute body size
pub const ADDRESS_BYTE_SIZE: usize = 8;

// Message types
pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_RESPONSE: u16 = 0x0101;
pub const BINDING_ERROR_RESPONSE: u16 = 0x0111;
pub const SHARED_SECRET_REQUEST: u16 = 0x0002;
pub const SHARED_SECRET_RESPONSE: u16 = 0x0102;
pub const SHARED_SECRET_ERROR: u16 = 0x0112;

// Attribute types
pub const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
pub const ATTR_RESPONSE_ADDRESS: u16 = 0x0002;
pub const ATTR_CHANGE_REQUEST: u16 = 0x0003;
pub const ATTR_SOURCE_ADDRESS: u16 = 0x0004;
pub const ATTR_CHANGED_ADDRESS: u16 = 0x0005;
pub const ATTR_USERNAME: u16 = 0x0006;
pub const ATTR_PASSWORD: u16 = 0x0007;
pub const ATTR_MESSAGE_INTEGRITY: u16 = 0x0008;
pub const ATTR_ERROR_CODE: u16 = 0x0009;
pub const ATTR_UNKNOWN_ATTRIBUTES: u16 = 0x000a;
pub const ATTR_REFLECTED_FROM: u16 = 0x000b;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x8020;
pub const ATTR_SERVER: u16 = 0x8022;
pub const ATTR_SECONDARY_ADDRESS: u16 = 0x8050;

// CHANGE-REQUEST flags (byte 3 of the value)
pub const CHANGE_IP_FLAG: u8 = 0x04;
pub const CHANGE_PORT_FLAG: u8 = 0x02;

const ADDRESS_FAMILY_IPV4: u8 = 0x01;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MessageType {
    BindingRequest,
    BindingResponse,
    BindingErrorResponse,
    SharedSecretRequest,
    SharedSecretResponse,
    SharedSecretError,
}

impl MessageType {
    /// An unknown message type code is a hard decode failure, unlike
    /// attribute codes.
    pub fn from_u16(message_type: u16) -> Result<Self, STUNError> {
        match message_type {
            BINDING_REQUEST => Ok(Self::BindingRequest),
            BINDING_RESPONSE => Ok(Self::BindingResponse),
            BINDING_ERROR_RESPONSE => Ok(Self::BindingErrorResponse),
            SHARED_SECRET_REQUEST => Ok(Self::SharedSecretRequest),
            SHARED_SECRET_RESPONSE => Ok(Self::SharedSecretResponse),
            SHARED_SECRET_ERROR => Ok(Self::SharedSecretError),
            _ => Err(STUNError::UnknownMessageType(message_type)),
        }
    }

    pub fn to_u16(&self) -> u16 {
        match self {
            Self::BindingRequest => BINDING_REQUEST,
            Self::BindingResponse => BINDING_RESPONSE,
            Self::BindingErrorResponse => BINDING_ERROR_RESPONSE,
            Self::SharedSecretRequest => SHARED_SECRET_REQUEST,
            Self::SharedSecretResponse => SHARED_SECRET_RESPONSE,
            Self::SharedSecretError => SHARED_SECRET_ERROR,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AttributeType {
    MappedAddress,
    ResponseAddress,
    ChangeRequest,
    SourceAddress,
    ChangedAddress,
    Username,
    Password,
    MessageIntegrity,
    ErrorCode,
    UnknownAttributes,
    ReflectedFrom,
    XORMappedAddress,
    Server,
    SecondaryAddress,
    Unknown(u16),
}

impl AttributeType {
    pub fn from_u16(attribute: u16) -> Self {
        match attribute {
            ATTR_MAPPED_ADDRESS => Self::MappedAddress,
            ATTR_RESPONSE_ADDRESS => Self::ResponseAddress,
            ATTR_CHANGE_REQUEST => Self::ChangeRequest,
            ATTR_SOURCE_ADDRESS => Self::SourceAddress,
            ATTR_CHANGED_ADDRESS => Self::ChangedAddress,
            ATTR_USERNAME => Self::Username,
            ATTR_PASSWORD => Self::Password,
            ATTR_MESSAGE_INTEGRITY => Self::MessageIntegrity,
            ATTR_ERROR_CODE => Self::ErrorCode,
            ATTR_UNKNOWN_ATTRIBUTES => Self::UnknownAttributes,
            ATTR_REFLECTED_FROM => Self::ReflectedFrom,
            ATTR_XOR_MAPPED_ADDRESS => Self::XORMappedAddress,
            ATTR_SERVER => Self::Server,
            ATTR_SECONDARY_ADDRESS => Self::SecondaryAddress,
            _ => Self::Unknown(attribute),
        }
    }

    pub fn to_u16(&self) -> u16 {
        match self {
            Self::MappedAddress => ATTR_MAPPED_ADDRESS,
            Self::ResponseAddress => ATTR_RESPONSE_ADDRESS,
            Self::ChangeRequest => ATTR_CHANGE_REQUEST,
            Self::SourceAddress => ATTR_SOURCE_ADDRESS,
            Self::ChangedAddress => ATTR_CHANGED_ADDRESS,
            Self::Username => ATTR_USERNAME,
            Self::Password => ATTR_PASSWORD,
            Self::MessageIntegrity => ATTR_MESSAGE_INTEGRITY,
            Self::ErrorCode => ATTR_ERROR_CODE,
            Self::UnknownAttributes => ATTR_UNKNOWN_ATTRIBUTES,
            Self::ReflectedFrom => ATTR_REFLECTED_FROM,
            Self::XORMappedAddress => ATTR_XOR_MAPPED_ADDRESS,
            Self::Server => ATTR_SERVER,
            Self::SecondaryAddress => ATTR_SECONDARY_ADDRESS,
            Self::Unknown(attribute) => *attribute,
        }
    }
}

/// 20-byte STUN header: type, body length and a 128-bit transaction id,
/// all big-endian on the wire.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    pub message_type: MessageType,
    pub length: u16,
    pub transaction_id: u128,
}

impl Header {
    pub fn new(message_type: MessageType) -> Header {
        Header {
            message_type,
            length: 0,
            transaction_id: rand::random(),
        }
    }

    /// Pre-set transaction id, for deterministic encoding.
    pub fn with_transaction_id(message_type: MessageType, transaction_id: u128) -> Header {
        Header {
            message_type,
            length: 0,
            transaction_id,
        }
    }

    pub fn from_raw(buf: &[u8]) -> Result<Header, STUNError> {
        if buf.len() != HEADER_BYTE_SIZE {
            return Err(STUNError::Truncated);
        }

        let message_type = MessageType::from_u16(u16::from_be_bytes([buf[0], buf[1]]))?;
        let length = u16::from_be_bytes([buf[2], buf[3]]);
        let mut tid = [0u8; 16];
        tid.copy_from_slice(&buf[4..HEADER_BYTE_SIZE]);

        Ok(Header {
            message_type,
            length,
            transaction_id: u128::from_be_bytes(tid),
        })
    }

    pub fn to_raw(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_BYTE_SIZE);
        bytes.extend(&self.message_type.to_u16().to_be_bytes());
        bytes.extend(&self.length.to_be_bytes());
        bytes.extend(&self.transaction_id.to_be_bytes());
        bytes
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "header: type={:?},length={},id={}",
            self.message_type, self.length, self.transaction_id
        )
    }
}

/// One TLV attribute. The length field is never stored; it is recomputed
/// from the value on encode.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    pub attr_type: AttributeType,
    pub value: Vec<u8>,
}

impl Attribute {
    pub fn new(attr_type: AttributeType, value: Vec<u8>) -> Attribute {
        Attribute { attr_type, value }
    }

    /// CHANGE-REQUEST: bit 2 of the last byte asks the server to reply from
    /// its alternate IP, bit 1 from its alternate port.
    pub fn change_request(change_ip: bool, change_port: bool) -> Attribute {
        let mut flags = 0u8;
        if change_ip {
            flags |= CHANGE_IP_FLAG;
        }
        if change_port {
            flags |= CHANGE_PORT_FLAG;
        }
        Attribute::new(AttributeType::ChangeRequest, vec![0, 0, 0, flags])
    }

    /// Address-valued attribute: reserved byte, family, port, IPv4 address.
    pub fn from_address(attr_type: AttributeType, addr: SocketAddrV4) -> Attribute {
        let mut value = Vec::with_capacity(ADDRESS_BYTE_SIZE);
        value.push(0);
        value.push(ADDRESS_FAMILY_IPV4);
        value.extend(&addr.port().to_be_bytes());
        value.extend(&addr.ip().octets());
        Attribute::new(attr_type, value)
    }

    pub fn to_raw(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(ATTR_HEADER_BYTE_SIZE + self.value.len());
        bytes.extend(&self.attr_type.to_u16().to_be_bytes());
        bytes.extend(&(self.value.len() as u16).to_be_bytes());
        bytes.extend(&self.value);
        bytes
    }

    pub fn is_address(&self) -> bool {
        self.value.len() == ADDRESS_BYTE_SIZE
            && matches!(
                self.attr_type,
                AttributeType::MappedAddress
                    | AttributeType::ResponseAddress
                    | AttributeType::ChangedAddress
            )
    }

    /// Parses the 8-byte address body. Returns `None` for any attribute
    /// that does not carry a plain address.
    pub fn address(&self) -> Option<SocketAddrV4> {
        if !self.is_address() {
            return None;
        }
        let v = &self.value;
        let port = u16::from_be_bytes([v[2], v[3]]);
        let ip = Ipv4Addr::new(v[4], v[5], v[6], v[7]);
        Some(SocketAddrV4::new(ip, port))
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address() {
            Some(addr) => write!(f, "attr: name={:?},address={}", self.attr_type, addr),
            None => write!(f, "attr: name={:?}", self.attr_type),
        }
    }
}

/// A full STUN datagram: header plus attributes in wire order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub header: Header,
    pub attributes: Vec<Attribute>,
}

impl Message {
    pub fn new(message_type: MessageType, attributes: Vec<Attribute>) -> Message {
        Message {
            header: Header::new(message_type),
            attributes,
        }
    }

    pub fn binding_request(attributes: Vec<Attribute>) -> Message {
        Message::new(MessageType::BindingRequest, attributes)
    }

    pub fn from_raw(buf: &[u8]) -> Result<Message, STUNError> {
        if buf.len() < HEADER_BYTE_SIZE {
            return Err(STUNError::Truncated);
        }

        let header = Header::from_raw(&buf[..HEADER_BYTE_SIZE])?;
        let body = &buf[HEADER_BYTE_SIZE..];
        if body.len() < header.length as usize {
            return Err(STUNError::Truncated);
        }

        let attributes = Message::decode_attrs(&body[..header.length as usize])?;
        Ok(Message { header, attributes })
    }

    /// Serializes all attributes, then writes the recomputed body length
    /// into the header.
    pub fn to_raw(&self) -> Vec<u8> {
        let mut body = vec![];
        for attr in &self.attributes {
            body.extend(attr.to_raw());
        }

        let mut header = self.header.clone();
        header.length = body.len() as u16;
        let mut bytes = header.to_raw();
        bytes.extend(body);
        bytes
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    /// First attribute of the given type, in wire order.
    pub fn get(&self, attr_type: AttributeType) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }

    fn decode_attrs(mut buf: &[u8]) -> Result<Vec<Attribute>, STUNError> {
        let mut attributes = Vec::new();

        while !buf.is_empty() {
            if buf.len() < ATTR_HEADER_BYTE_SIZE {
                return Err(STUNError::Truncated);
            }

            // Unknown attribute codes are preserved as-is rather than
            // rejected, so vendor attributes never abort a classification.
            let attr_type = AttributeType::from_u16(u16::from_be_bytes([buf[0], buf[1]]));
            let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;
            let rest = &buf[ATTR_HEADER_BYTE_SIZE..];
            if rest.len() < length {
                return Err(STUNError::LengthMismatch {
                    declared: length,
                    remaining: rest.len(),
                });
            }

            attributes.push(Attribute::new(attr_type, rest[..length].to_vec()));
            buf = &rest[length..];
        }

        Ok(attributes)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attrs: Vec<String> = self.attributes.iter().map(|a| a.to_string()).collect();
        write!(f, "{}: [{}]", self.header, attrs.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_binding_request_encodes_to_exact_bytes() {
        let msg = Message {
            header: Header::with_transaction_id(MessageType::BindingRequest, 0),
            attributes: vec![],
        };
        let mut expected = vec![0x00, 0x01, 0x00, 0x00];
        expected.extend([0u8; 16]);
        assert_eq!(msg.to_raw(), expected);
    }

    #[test]
    fn round_trip_preserves_header_and_attributes() {
        let mapped = SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 7), 54321);
        let changed = SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 8), 3479);
        let msg = Message::new(
            MessageType::BindingResponse,
            vec![
                Attribute::from_address(AttributeType::MappedAddress, mapped),
                Attribute::from_address(AttributeType::ChangedAddress, changed),
                Attribute::new(AttributeType::Server, b"test server".to_vec()),
            ],
        );

        let decoded = Message::from_raw(&msg.to_raw()).unwrap();
        assert_eq!(decoded.message_type(), MessageType::BindingResponse);
        assert_eq!(decoded.header.transaction_id, msg.header.transaction_id);
        assert_eq!(decoded.attributes, msg.attributes);
        assert_eq!(
            decoded.header.length as usize,
            msg.attributes
                .iter()
                .map(|a| ATTR_HEADER_BYTE_SIZE + a.value.len())
                .sum::<usize>()
        );
    }

    #[test]
    fn address_attribute_parses() {
        let attr = Attribute::new(
            AttributeType::MappedAddress,
            vec![0x00, 0x01, 0x1F, 0x90, 0x7F, 0x00, 0x00, 0x01],
        );
        assert_eq!(
            attr.address(),
            Some(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 8080))
        );
    }

    #[test]
    fn non_address_attributes_parse_to_none() {
        // wrong type
        let attr = Attribute::new(AttributeType::Username, vec![0; 8]);
        assert_eq!(attr.address(), None);
        // wrong length
        let attr = Attribute::new(AttributeType::MappedAddress, vec![0; 7]);
        assert_eq!(attr.address(), None);
    }

    #[test]
    fn change_request_flags() {
        assert_eq!(Attribute::change_request(true, true).value, [0, 0, 0, 6]);
        assert_eq!(Attribute::change_request(true, false).value, [0, 0, 0, 4]);
        assert_eq!(Attribute::change_request(false, true).value, [0, 0, 0, 2]);
        assert_eq!(Attribute::change_request(false, false).value, [0, 0, 0, 0]);
    }

    #[test]
    fn short_datagram_is_truncated() {
        let buf = [0u8; HEADER_BYTE_SIZE - 1];
        assert!(matches!(Message::from_raw(&buf), Err(STUNError::Truncated)));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let mut buf = vec![0x77, 0x77, 0x00, 0x00];
        buf.extend([0u8; 16]);
        assert!(matches!(
            Message::from_raw(&buf),
            Err(STUNError::UnknownMessageType(0x7777))
        ));
    }

    #[test]
    fn attribute_overrunning_body_is_rejected() {
        let msg = Message::new(
            MessageType::BindingResponse,
            vec![Attribute::new(AttributeType::Username, vec![1, 2, 3, 4])],
        );
        let mut raw = msg.to_raw();
        // claim more value bytes than the body holds
        raw[HEADER_BYTE_SIZE + 3] = 0xFF;
        assert!(matches!(
            Message::from_raw(&raw),
            Err(STUNError::LengthMismatch { declared: 255, .. })
        ));
    }

    #[test]
    fn body_shorter_than_declared_length_is_truncated() {
        let mut header = Header::with_transaction_id(MessageType::BindingResponse, 1);
        header.length = 8;
        assert!(matches!(
            Message::from_raw(&header.to_raw()),
            Err(STUNError::Truncated)
        ));
    }

    #[test]
    fn unknown_attribute_codes_are_preserved() {
        let msg = Message::new(
            MessageType::BindingResponse,
            vec![Attribute::new(AttributeType::Unknown(0x7FFF), vec![0xAB])],
        );
        let decoded = Message::from_raw(&msg.to_raw()).unwrap();
        assert_eq!(
            decoded.attributes[0].attr_type,
            AttributeType::Unknown(0x7FFF)
        );
        assert_eq!(decoded.attributes[0].value, [0xAB]);
    }

    #[test]
    fn get_returns_first_attribute_in_wire_order() {
        let first = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 1000);
        let second = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 2000);
        let msg = Message::new(
            MessageType::BindingResponse,
            vec![
                Attribute::from_address(AttributeType::MappedAddress, first),
                Attribute::from_address(AttributeType::MappedAddress, second),
            ],
        );
        let attr = msg.get(AttributeType::MappedAddress).unwrap();
        assert_eq!(attr.address(), Some(first));
        assert!(msg.get(AttributeType::ChangedAddress).is_none());
    }
}
