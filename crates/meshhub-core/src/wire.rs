//! meshhub wire format: the frame exchanged with every node in the mesh.
//!
//! A frame is a fixed 6-byte header followed by `data_length` payload bytes.
//! Every node firmware in the field parses this layout byte-for-byte, so the
//! field order and the packet type codes below must never change.
//!
//! ```text
//! [0] source  [1] dest  [2] ttl  [3] idempotency key  [4] type  [5] length  [6..] payload
//! ```
//!
//! The header is a #[repr(C, packed)] zerocopy struct; the payload is carried
//! as `Bytes`. There is no unsafe code in this module.

use std::fmt;

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Frame Header ─────────────────────────────────────────────────────────────

/// Fixed-layout frame header. Wire size: 6 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct PacketHeader {
    /// Node id of the sender. The hub is always `HUB_NODE_ID`.
    pub source: u8,

    /// Node id of the addressee. Nodes filter on this; links do not.
    pub dest: u8,

    /// Hop budget. Reserved for multi-hop routing, carried through unchanged.
    pub ttl: u8,

    /// Sender-assigned counter, wraps at 256.
    /// (source, idempotency_key) identifies one logical delivery.
    pub idempotency_key: u8,

    /// `PacketType` code.
    pub type_code: u8,

    /// Number of payload bytes following the header.
    pub data_length: u8,
}

assert_eq_size!(PacketHeader, [u8; 6]);

/// Header length in bytes.
pub const HEADER_LEN: usize = 6;

/// Largest payload the single-byte length field can describe.
pub const MAX_DATA_LEN: usize = u8::MAX as usize;

// ── Reserved Node Ids ────────────────────────────────────────────────────────

/// The hub's own node id.
pub const HUB_NODE_ID: u8 = 0;

/// Id a freshly booted node listens on until it is assigned its own.
pub const PROVISIONING_NODE_ID: u8 = 1;

/// First id the hub hands out to a node.
pub const FIRST_NODE_ID: u8 = 2;

/// TTL stamped on every frame the hub originates.
pub const PACKET_TTL: u8 = 5;

// ── Packet Types ─────────────────────────────────────────────────────────────

/// Closed set of frame types.
///
/// Request types have a fixed expected response type (see `response`).
/// Codes are grouped: 1-5 link management, 10-17 telemetry, 30-39 config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PacketType {
    NodeConnected = 1,
    NodeConnectedResp = 2,
    OtaUpdateReq = 3,
    OtaUpdateResp = 4,
    GoToSleep = 5,

    BatteryPctReq = 10,
    BatteryPctResp = 11,
    BatteryVoltageReq = 12,
    BatteryVoltageResp = 13,
    MoisturePctReq = 14,
    MoisturePctResp = 15,
    MoistureVoltageReq = 16,
    MoistureVoltageResp = 17,

    SensorHvUpdate = 30,
    SensorHvAck = 31,
    SensorLvUpdate = 32,
    SensorLvAck = 33,
    BatteryHvUpdate = 34,
    BatteryHvAck = 35,
    BatteryLvUpdate = 36,
    BatteryLvAck = 37,
    SleepDurationUpdate = 38,
    SleepDurationAck = 39,
}

impl PacketType {
    /// Every registered type, in code order.
    pub const ALL: [PacketType; 23] = [
        PacketType::NodeConnected,
        PacketType::NodeConnectedResp,
        PacketType::OtaUpdateReq,
        PacketType::OtaUpdateResp,
        PacketType::GoToSleep,
        PacketType::BatteryPctReq,
        PacketType::BatteryPctResp,
        PacketType::BatteryVoltageReq,
        PacketType::BatteryVoltageResp,
        PacketType::MoisturePctReq,
        PacketType::MoisturePctResp,
        PacketType::MoistureVoltageReq,
        PacketType::MoistureVoltageResp,
        PacketType::SensorHvUpdate,
        PacketType::SensorHvAck,
        PacketType::SensorLvUpdate,
        PacketType::SensorLvAck,
        PacketType::BatteryHvUpdate,
        PacketType::BatteryHvAck,
        PacketType::BatteryLvUpdate,
        PacketType::BatteryLvAck,
        PacketType::SleepDurationUpdate,
        PacketType::SleepDurationAck,
    ];

    /// The on-wire type code.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// The response a request type expects. `None` for non-request types.
    pub const fn response(self) -> Option<PacketType> {
        use PacketType::*;
        match self {
            OtaUpdateReq => Some(OtaUpdateResp),
            BatteryPctReq => Some(BatteryPctResp),
            BatteryVoltageReq => Some(BatteryVoltageResp),
            MoisturePctReq => Some(MoisturePctResp),
            MoistureVoltageReq => Some(MoistureVoltageResp),
            SensorHvUpdate => Some(SensorHvAck),
            SensorLvUpdate => Some(SensorLvAck),
            BatteryHvUpdate => Some(BatteryHvAck),
            BatteryLvUpdate => Some(BatteryLvAck),
            SleepDurationUpdate => Some(SleepDurationAck),
            _ => None,
        }
    }

    /// Requests are tracked until their response arrives.
    pub const fn is_request(self) -> bool {
        self.response().is_some()
    }

    pub const fn name(self) -> &'static str {
        use PacketType::*;
        match self {
            NodeConnected => "NodeConnected",
            NodeConnectedResp => "NodeConnectedResp",
            OtaUpdateReq => "OtaUpdateReq",
            OtaUpdateResp => "OtaUpdateResp",
            GoToSleep => "GoToSleep",
            BatteryPctReq => "BatteryPctReq",
            BatteryPctResp => "BatteryPctResp",
            BatteryVoltageReq => "BatteryVoltageReq",
            BatteryVoltageResp => "BatteryVoltageResp",
            MoisturePctReq => "MoisturePctReq",
            MoisturePctResp => "MoisturePctResp",
            MoistureVoltageReq => "MoistureVoltageReq",
            MoistureVoltageResp => "MoistureVoltageResp",
            SensorHvUpdate => "SensorHvUpdate",
            SensorHvAck => "SensorHvAck",
            SensorLvUpdate => "SensorLvUpdate",
            SensorLvAck => "SensorLvAck",
            BatteryHvUpdate => "BatteryHvUpdate",
            BatteryHvAck => "BatteryHvAck",
            BatteryLvUpdate => "BatteryLvUpdate",
            BatteryLvAck => "BatteryLvAck",
            SleepDurationUpdate => "SleepDurationUpdate",
            SleepDurationAck => "SleepDurationAck",
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use PacketType::*;
        match value {
            1 => Ok(NodeConnected),
            2 => Ok(NodeConnectedResp),
            3 => Ok(OtaUpdateReq),
            4 => Ok(OtaUpdateResp),
            5 => Ok(GoToSleep),
            10 => Ok(BatteryPctReq),
            11 => Ok(BatteryPctResp),
            12 => Ok(BatteryVoltageReq),
            13 => Ok(BatteryVoltageResp),
            14 => Ok(MoisturePctReq),
            15 => Ok(MoisturePctResp),
            16 => Ok(MoistureVoltageReq),
            17 => Ok(MoistureVoltageResp),
            30 => Ok(SensorHvUpdate),
            31 => Ok(SensorHvAck),
            32 => Ok(SensorLvUpdate),
            33 => Ok(SensorLvAck),
            34 => Ok(BatteryHvUpdate),
            35 => Ok(BatteryHvAck),
            36 => Ok(BatteryLvUpdate),
            37 => Ok(BatteryLvAck),
            38 => Ok(SleepDurationUpdate),
            39 => Ok(SleepDurationAck),
            other => Err(WireError::UnknownPacketType(other)),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(t: PacketType) -> u8 {
        t as u8
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{:02x}]", self.name(), self.code())
    }
}

// ── Packet ───────────────────────────────────────────────────────────────────

/// Identifies one logical delivery. Retransmissions of the same frame share it.
pub type DeliveryKey = (u8, u8);

/// A decoded or ready-to-send frame. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    source: u8,
    dest: u8,
    ttl: u8,
    idempotency_key: u8,
    packet_type: PacketType,
    data: Bytes,
}

impl Packet {
    /// Build an outbound packet. Fails if the payload does not fit the
    /// single-byte length field.
    pub fn new(
        source: u8,
        dest: u8,
        ttl: u8,
        idempotency_key: u8,
        packet_type: PacketType,
        data: impl Into<Bytes>,
    ) -> Result<Self, WireError> {
        let data = data.into();
        if data.len() > MAX_DATA_LEN {
            return Err(WireError::PayloadTooLarge(data.len()));
        }
        Ok(Self {
            source,
            dest,
            ttl,
            idempotency_key,
            packet_type,
            data,
        })
    }

    /// Parse a frame. Bytes past `HEADER_LEN + data_length` are ignored.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        let header = PacketHeader::read_from_prefix(frame).ok_or(WireError::Truncated {
            needed: HEADER_LEN,
            got: frame.len(),
        })?;
        let packet_type = PacketType::try_from(header.type_code)?;

        let end = HEADER_LEN + header.data_length as usize;
        if frame.len() < end {
            return Err(WireError::Truncated {
                needed: end,
                got: frame.len(),
            });
        }

        Ok(Self {
            source: header.source,
            dest: header.dest,
            ttl: header.ttl,
            idempotency_key: header.idempotency_key,
            packet_type,
            data: Bytes::copy_from_slice(&frame[HEADER_LEN..end]),
        })
    }

    /// Serialize to exactly `HEADER_LEN + data_length` bytes.
    pub fn encode(&self) -> Vec<u8> {
        let header = PacketHeader {
            source: self.source,
            dest: self.dest,
            ttl: self.ttl,
            idempotency_key: self.idempotency_key,
            type_code: self.packet_type.code(),
            data_length: self.data_length(),
        };
        let mut frame = Vec::with_capacity(HEADER_LEN + self.data.len());
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(&self.data);
        frame
    }

    pub fn source(&self) -> u8 {
        self.source
    }

    pub fn dest(&self) -> u8 {
        self.dest
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn idempotency_key(&self) -> u8 {
        self.idempotency_key
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn data_length(&self) -> u8 {
        // Bounded by MAX_DATA_LEN at construction.
        self.data.len() as u8
    }

    /// Two packets with the same key are the same logical delivery,
    /// whatever their payloads.
    pub fn delivery_key(&self) -> DeliveryKey {
        (self.source, self.idempotency_key)
    }

    /// Total frame length on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.data.len()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet(source={}, dest={}, ttl={}, key={}, type={}, len={}, data={})",
            self.source,
            self.dest,
            self.ttl,
            self.idempotency_key,
            self.packet_type,
            self.data.len(),
            format_address(&self.data),
        )
    }
}

// ── Payload Conventions ──────────────────────────────────────────────────────

/// Read a little-endian i32 from the first four payload bytes.
pub fn read_i32_le(data: &[u8]) -> Result<i32, WireError> {
    let bytes: [u8; 4] = data
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(WireError::InvalidInteger(data.len()))?;
    Ok(i32::from_le_bytes(bytes))
}

/// Render bytes as colon-separated upper-case hex pairs, in order.
pub fn format_address(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Render a little-endian address field (as sent in `NodeConnected`)
/// in conventional most-significant-first order.
pub fn format_address_le(bytes: &[u8]) -> String {
    let reversed: Vec<u8> = bytes.iter().rev().copied().collect();
    format_address(&reversed)
}

/// Parse colon-separated hex pairs back into bytes, in order.
pub fn parse_address(address: &str) -> Result<Vec<u8>, WireError> {
    address
        .split(':')
        .map(|pair| {
            if pair.len() != 2 {
                return Err(WireError::InvalidAddress(address.to_string()));
            }
            hex::decode(pair)
                .map(|b| b[0])
                .map_err(|_| WireError::InvalidAddress(address.to_string()))
        })
        .collect()
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown packet type byte: 0x{0:02x}")]
    UnknownPacketType(u8),

    #[error("truncated frame: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    #[error("payload length {0} exceeds maximum {}", MAX_DATA_LEN)]
    PayloadTooLarge(usize),

    #[error("integer payload needs 4 bytes, got {0}")]
    InvalidInteger(usize),

    #[error("malformed address: {0:?}")]
    InvalidAddress(String),
}

// ── Tests ────────────────────────────────────────────────────────────────────
