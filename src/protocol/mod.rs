//! LLRP wire protocol
//!
//! LLRP (Low Level Reader Protocol) frames every message with a 10-byte
//! binary header: 3 reserved bits, a 3-bit protocol version, a 10-bit
//! message type, a 4-byte total length (header included) and a 4-byte
//! message id used to correlate requests with responses.

mod header;
mod messages;

pub use header::*;
pub use messages::*;

use serde::{Deserialize, Serialize};

/// Default TCP port LLRP readers listen on.
pub const DEFAULT_PORT: u16 = 5084;

/// Lowest legal message type code.
pub const MIN_MESSAGE_TYPE: u16 = 1;

/// Highest legal message type code (CustomMessage).
pub const MAX_MESSAGE_TYPE: u16 = 1023;

/// Returns true if the type code sits in the band reserved for ISO/IEC 24791-5.
pub fn is_reserved_type(message_type: u16) -> bool {
    (900..=999).contains(&message_type)
}

/// LLRP protocol versions this library speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProtocolVersion {
    V1_0_1 = 1,
    V1_1 = 2,
}

impl ProtocolVersion {
    /// Oldest version every reader understands; also the handshake fallback.
    pub const MIN: ProtocolVersion = ProtocolVersion::V1_0_1;

    /// Newest version this library implements.
    pub const MAX: ProtocolVersion = ProtocolVersion::V1_1;

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::V1_0_1),
            2 => Some(Self::V1_1),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V1_0_1 => write!(f, "1.0.1"),
            Self::V1_1 => write!(f, "1.1"),
        }
    }
}

/// The closed set of LLRP message type codes.
///
/// Codes follow the published LLRP assignments; anything outside this set
/// (including the 900-999 reserved band) decodes to `None` via
/// [`MessageKind::from_u16`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum MessageKind {
    GetReaderCapabilities = 1,
    GetReaderConfig = 2,
    SetReaderConfig = 3,
    CloseConnectionResponse = 4,
    GetReaderCapabilitiesResponse = 11,
    GetReaderConfigResponse = 12,
    SetReaderConfigResponse = 13,
    CloseConnection = 14,
    AddRoSpec = 20,
    DeleteRoSpec = 21,
    StartRoSpec = 22,
    StopRoSpec = 23,
    EnableRoSpec = 24,
    DisableRoSpec = 25,
    GetRoSpecs = 26,
    AddRoSpecResponse = 30,
    DeleteRoSpecResponse = 31,
    StartRoSpecResponse = 32,
    StopRoSpecResponse = 33,
    EnableRoSpecResponse = 34,
    DisableRoSpecResponse = 35,
    GetRoSpecsResponse = 36,
    AddAccessSpec = 40,
    DeleteAccessSpec = 41,
    EnableAccessSpec = 42,
    DisableAccessSpec = 43,
    GetAccessSpecs = 44,
    ClientRequestOp = 45,
    GetSupportedVersion = 46,
    SetProtocolVersion = 47,
    AddAccessSpecResponse = 50,
    DeleteAccessSpecResponse = 51,
    EnableAccessSpecResponse = 52,
    DisableAccessSpecResponse = 53,
    GetAccessSpecsResponse = 54,
    ClientRequestOpResponse = 55,
    GetSupportedVersionResponse = 56,
    SetProtocolVersionResponse = 57,
    GetReport = 60,
    RoAccessReport = 61,
    KeepAlive = 62,
    ReaderEventNotification = 63,
    EnableEventsAndReports = 64,
    KeepAliveAck = 72,
    ErrorMessage = 100,
    CustomMessage = 1023,
}

impl MessageKind {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::GetReaderCapabilities),
            2 => Some(Self::GetReaderConfig),
            3 => Some(Self::SetReaderConfig),
            4 => Some(Self::CloseConnectionResponse),
            11 => Some(Self::GetReaderCapabilitiesResponse),
            12 => Some(Self::GetReaderConfigResponse),
            13 => Some(Self::SetReaderConfigResponse),
            14 => Some(Self::CloseConnection),
            20 => Some(Self::AddRoSpec),
            21 => Some(Self::DeleteRoSpec),
            22 => Some(Self::StartRoSpec),
            23 => Some(Self::StopRoSpec),
            24 => Some(Self::EnableRoSpec),
            25 => Some(Self::DisableRoSpec),
            26 => Some(Self::GetRoSpecs),
            30 => Some(Self::AddRoSpecResponse),
            31 => Some(Self::DeleteRoSpecResponse),
            32 => Some(Self::StartRoSpecResponse),
            33 => Some(Self::StopRoSpecResponse),
            34 => Some(Self::EnableRoSpecResponse),
            35 => Some(Self::DisableRoSpecResponse),
            36 => Some(Self::GetRoSpecsResponse),
            40 => Some(Self::AddAccessSpec),
            41 => Some(Self::DeleteAccessSpec),
            42 => Some(Self::EnableAccessSpec),
            43 => Some(Self::DisableAccessSpec),
            44 => Some(Self::GetAccessSpecs),
            45 => Some(Self::ClientRequestOp),
            46 => Some(Self::GetSupportedVersion),
            47 => Some(Self::SetProtocolVersion),
            50 => Some(Self::AddAccessSpecResponse),
            51 => Some(Self::DeleteAccessSpecResponse),
            52 => Some(Self::EnableAccessSpecResponse),
            53 => Some(Self::DisableAccessSpecResponse),
            54 => Some(Self::GetAccessSpecsResponse),
            55 => Some(Self::ClientRequestOpResponse),
            56 => Some(Self::GetSupportedVersionResponse),
            57 => Some(Self::SetProtocolVersionResponse),
            60 => Some(Self::GetReport),
            61 => Some(Self::RoAccessReport),
            62 => Some(Self::KeepAlive),
            63 => Some(Self::ReaderEventNotification),
            64 => Some(Self::EnableEventsAndReports),
            72 => Some(Self::KeepAliveAck),
            100 => Some(Self::ErrorMessage),
            1023 => Some(Self::CustomMessage),
            _ => None,
        }
    }

    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// The response type paired with this request type, if it has one.
    ///
    /// Kinds without a pairing cannot be used on the correlated send path.
    /// CustomMessage answers itself; correlation falls to the message id.
    pub fn response_kind(self) -> Option<MessageKind> {
        match self {
            Self::GetReaderCapabilities => Some(Self::GetReaderCapabilitiesResponse),
            Self::GetReaderConfig => Some(Self::GetReaderConfigResponse),
            Self::SetReaderConfig => Some(Self::SetReaderConfigResponse),
            Self::CloseConnection => Some(Self::CloseConnectionResponse),
            Self::AddRoSpec => Some(Self::AddRoSpecResponse),
            Self::DeleteRoSpec => Some(Self::DeleteRoSpecResponse),
            Self::StartRoSpec => Some(Self::StartRoSpecResponse),
            Self::StopRoSpec => Some(Self::StopRoSpecResponse),
            Self::EnableRoSpec => Some(Self::EnableRoSpecResponse),
            Self::DisableRoSpec => Some(Self::DisableRoSpecResponse),
            Self::GetRoSpecs => Some(Self::GetRoSpecsResponse),
            Self::AddAccessSpec => Some(Self::AddAccessSpecResponse),
            Self::DeleteAccessSpec => Some(Self::DeleteAccessSpecResponse),
            Self::EnableAccessSpec => Some(Self::EnableAccessSpecResponse),
            Self::DisableAccessSpec => Some(Self::DisableAccessSpecResponse),
            Self::GetAccessSpecs => Some(Self::GetAccessSpecsResponse),
            Self::ClientRequestOp => Some(Self::ClientRequestOpResponse),
            Self::GetSupportedVersion => Some(Self::GetSupportedVersionResponse),
            Self::SetProtocolVersion => Some(Self::SetProtocolVersionResponse),
            Self::CustomMessage => Some(Self::CustomMessage),
            _ => None,
        }
    }

    /// True for kinds readers send without a matching outstanding request.
    pub fn is_notification(self) -> bool {
        matches!(
            self,
            Self::ReaderEventNotification | Self::RoAccessReport | Self::KeepAlive
        )
    }
}
