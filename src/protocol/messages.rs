//! Typed LLRP messages
//!
//! The catalog of messages the service understands: each type knows its
//! numeric code, how to put its payload on the wire (or lift it back off)
//! and, for requests, which response type it pairs with.
//!
//! Only the fields the adapter interprets are modelled structurally (ids,
//! version numbers, the status block); everything else a payload carries is
//! kept as raw TLV parameters and passed through untouched.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::{CodecError, CodecResult, MessageKind};

/// TLV parameter type of the LLRPStatus block.
pub const PARAM_LLRP_STATUS: u16 = 287;

/// TLV parameter type of an ROSpec.
pub const PARAM_RO_SPEC: u16 = 177;

/// An LLRP message this service can put on the wire.
pub trait OutboundMessage {
    const KIND: MessageKind;

    /// Appends the message payload (everything after the header) to `buf`.
    fn encode(&self, buf: &mut BytesMut) -> CodecResult<()>;

    /// Encodes the payload into a fresh buffer.
    fn to_bytes(&self) -> CodecResult<Bytes> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// An LLRP message this service understands off the wire.
pub trait InboundMessage: Sized {
    const KIND: MessageKind;

    /// Decodes the message from its payload bytes.
    fn decode(payload: Bytes) -> CodecResult<Self>;

    /// The status block, for messages that carry one.
    fn status(&self) -> Option<&LlrpStatus> {
        None
    }
}

/// A request with a registered response pairing.
pub trait Request: OutboundMessage {
    type Response: InboundMessage;
}

/// Verifies an incoming type code against the pairing table for `request`.
pub fn check_response_kind(request: MessageKind, got: u16) -> CodecResult<()> {
    let expected = request
        .response_kind()
        .ok_or(CodecError::UnknownRequestType {
            typ: request.as_u16(),
        })?;
    if got != expected.as_u16() {
        return Err(CodecError::ResponseTypeMismatch {
            expected: expected.as_u16(),
            got,
        });
    }
    Ok(())
}

/// Numeric status code carried by an LLRPStatus block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(0);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.0 {
            0 => "Success",
            100 => "ParameterError",
            101 => "FieldError",
            102 => "UnexpectedParameter",
            103 => "MissingParameter",
            109 => "UnsupportedMessage",
            110 => "UnsupportedVersion",
            111 => "UnsupportedParameter",
            401 => "DeviceError",
            _ => return write!(f, "Status({})", self.0),
        };
        write!(f, "{} ({})", name, self.0)
    }
}

/// An uninterpreted TLV parameter: the 10-bit type plus its body bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawParameter {
    pub param_type: u16,
    pub data: Vec<u8>,
}

/// The LLRPStatus block most responses lead with (parameter type 287).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlrpStatus {
    pub code: StatusCode,
    #[serde(default)]
    pub description: String,
    /// FieldError/ParameterError detail the reader may attach.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detail: Vec<RawParameter>,
}

impl LlrpStatus {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Appends this status as a TLV parameter; used by simulators and tests.
    pub fn encode_into(&self, buf: &mut BytesMut) -> CodecResult<()> {
        let mut body = BytesMut::new();
        body.put_u16(self.code.0);
        body.put_u16(self.description.len() as u16);
        body.put_slice(self.description.as_bytes());
        for param in &self.detail {
            put_tlv(&mut body, param.param_type, &param.data)?;
        }
        put_tlv(buf, PARAM_LLRP_STATUS, &body)
    }

    fn decode(data: &[u8]) -> CodecResult<Self> {
        if data.len() < 4 {
            return Err(CodecError::TruncatedParameter {
                need: 4,
                have: data.len(),
            });
        }

        let code = StatusCode(u16::from_be_bytes([data[0], data[1]]));
        let desc_len = u16::from_be_bytes([data[2], data[3]]) as usize;
        if data.len() < 4 + desc_len {
            return Err(CodecError::TruncatedParameter {
                need: 4 + desc_len,
                have: data.len(),
            });
        }

        let description = String::from_utf8_lossy(&data[4..4 + desc_len]).into_owned();
        let detail = split_parameters(Bytes::copy_from_slice(&data[4 + desc_len..]))?;

        Ok(Self {
            code,
            description,
            detail,
        })
    }
}

/// Appends a TLV parameter: reserved bits + 10-bit type, u16 length
/// (header included), body.
pub fn put_tlv(buf: &mut BytesMut, param_type: u16, body: &[u8]) -> CodecResult<()> {
    let wire_len = body.len() + 4;
    if wire_len > usize::from(u16::MAX) {
        return Err(CodecError::OversizePayload {
            len: wire_len as u64,
        });
    }
    buf.put_u16(param_type & 0x3FF);
    buf.put_u16(wire_len as u16);
    buf.put_slice(body);
    Ok(())
}

/// Splits a payload into its top-level TLV parameters.
///
/// Top-level LLRP parameters are always TLV-encoded; a TV-encoded one (high
/// bit of the first byte set) means we've lost framing and is an error.
pub fn split_parameters(mut buf: Bytes) -> CodecResult<Vec<RawParameter>> {
    let mut params = Vec::new();
    while !buf.is_empty() {
        if buf[0] & 0x80 != 0 {
            return Err(CodecError::UnexpectedTvParameter {
                typ: buf[0] & 0x7F,
            });
        }
        if buf.len() < 4 {
            return Err(CodecError::TruncatedParameter {
                need: 4,
                have: buf.len(),
            });
        }

        let param_type = u16::from_be_bytes([buf[0], buf[1]]) & 0x3FF;
        let wire_len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        if wire_len < 4 {
            return Err(CodecError::TruncatedParameter {
                need: 4,
                have: wire_len,
            });
        }
        if wire_len > buf.len() {
            return Err(CodecError::TruncatedParameter {
                need: wire_len,
                have: buf.len(),
            });
        }

        let mut param = buf.split_to(wire_len);
        param.advance(4);
        params.push(RawParameter {
            param_type,
            data: param.to_vec(),
        });
    }
    Ok(params)
}

/// Decodes a payload whose first parameter must be the LLRPStatus block.
fn decode_status_payload(payload: Bytes) -> CodecResult<(LlrpStatus, Vec<RawParameter>)> {
    let mut params = split_parameters(payload)?;
    if params.first().map(|p| p.param_type) != Some(PARAM_LLRP_STATUS) {
        return Err(CodecError::MissingParameter {
            typ: PARAM_LLRP_STATUS,
        });
    }
    let status = LlrpStatus::decode(&params.remove(0).data)?;
    Ok((status, params))
}

macro_rules! empty_request {
    ($(#[$doc:meta])* $name:ident, $kind:ident => $response:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name;

        impl OutboundMessage for $name {
            const KIND: MessageKind = MessageKind::$kind;

            fn encode(&self, _buf: &mut BytesMut) -> CodecResult<()> {
                Ok(())
            }
        }

        impl Request for $name {
            type Response = $response;
        }
    };
}

macro_rules! id_request {
    ($(#[$doc:meta])* $name:ident { $field:ident }, $kind:ident => $response:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct $name {
            pub $field: u32,
        }

        impl OutboundMessage for $name {
            const KIND: MessageKind = MessageKind::$kind;

            fn encode(&self, buf: &mut BytesMut) -> CodecResult<()> {
                buf.put_u32(self.$field);
                Ok(())
            }
        }

        impl Request for $name {
            type Response = $response;
        }
    };
}

macro_rules! status_response {
    ($(#[$doc:meta])* $name:ident, $kind:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub status: LlrpStatus,
        }

        impl InboundMessage for $name {
            const KIND: MessageKind = MessageKind::$kind;

            fn decode(payload: Bytes) -> CodecResult<Self> {
                let (status, _) = decode_status_payload(payload)?;
                Ok(Self { status })
            }

            fn status(&self) -> Option<&LlrpStatus> {
                Some(&self.status)
            }
        }
    };
}

macro_rules! status_params_response {
    ($(#[$doc:meta])* $name:ident, $kind:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            pub status: LlrpStatus,
            #[serde(default)]
            pub params: Vec<RawParameter>,
        }

        impl InboundMessage for $name {
            const KIND: MessageKind = MessageKind::$kind;

            fn decode(payload: Bytes) -> CodecResult<Self> {
                let (status, params) = decode_status_payload(payload)?;
                Ok(Self { status, params })
            }

            fn status(&self) -> Option<&LlrpStatus> {
                Some(&self.status)
            }
        }
    };
}

/// Queries the reader's current configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetReaderConfig {
    #[serde(default)]
    pub antenna_id: u16,
    #[serde(default)]
    pub requested_data: u8,
    #[serde(default)]
    pub gpi_port: u16,
    #[serde(default)]
    pub gpo_port: u16,
}

impl OutboundMessage for GetReaderConfig {
    const KIND: MessageKind = MessageKind::GetReaderConfig;

    fn encode(&self, buf: &mut BytesMut) -> CodecResult<()> {
        buf.put_u16(self.antenna_id);
        buf.put_u8(self.requested_data);
        buf.put_u16(self.gpi_port);
        buf.put_u16(self.gpo_port);
        Ok(())
    }
}

impl Request for GetReaderConfig {
    type Response = GetReaderConfigResponse;
}

/// Queries the reader's capability set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetReaderCapabilities {
    #[serde(default)]
    pub requested_data: u8,
}

impl OutboundMessage for GetReaderCapabilities {
    const KIND: MessageKind = MessageKind::GetReaderCapabilities;

    fn encode(&self, buf: &mut BytesMut) -> CodecResult<()> {
        buf.put_u8(self.requested_data);
        Ok(())
    }
}

impl Request for GetReaderCapabilities {
    type Response = GetReaderCapabilitiesResponse;
}

/// Applies configuration to the reader.
///
/// The individual settings stay as raw parameters; only the factory-reset
/// flag is lifted out because it occupies the fixed part of the payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetReaderConfig {
    #[serde(default)]
    pub reset_to_factory_defaults: bool,
    #[serde(default)]
    pub params: Vec<RawParameter>,
}

impl OutboundMessage for SetReaderConfig {
    const KIND: MessageKind = MessageKind::SetReaderConfig;

    fn encode(&self, buf: &mut BytesMut) -> CodecResult<()> {
        buf.put_u8(if self.reset_to_factory_defaults {
            0b1000_0000
        } else {
            0
        });
        for param in &self.params {
            put_tlv(buf, param.param_type, &param.data)?;
        }
        Ok(())
    }
}

impl Request for SetReaderConfig {
    type Response = SetReaderConfigResponse;
}

/// A reader operation spec, encoded as TLV parameter 177.
///
/// The boundary and operation sub-parameters are not interpreted here; the
/// host supplies them and the reader validates them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoSpec {
    pub ro_spec_id: u32,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub current_state: u8,
    #[serde(default)]
    pub params: Vec<RawParameter>,
}

impl RoSpec {
    fn encode_into(&self, buf: &mut BytesMut) -> CodecResult<()> {
        let mut body = BytesMut::new();
        body.put_u32(self.ro_spec_id);
        body.put_u8(self.priority);
        body.put_u8(self.current_state);
        for param in &self.params {
            put_tlv(&mut body, param.param_type, &param.data)?;
        }
        put_tlv(buf, PARAM_RO_SPEC, &body)
    }
}

/// Installs a new ROSpec on the reader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddRoSpec {
    pub ro_spec: RoSpec,
}

impl OutboundMessage for AddRoSpec {
    const KIND: MessageKind = MessageKind::AddRoSpec;

    fn encode(&self, buf: &mut BytesMut) -> CodecResult<()> {
        self.ro_spec.encode_into(buf)
    }
}

impl Request for AddRoSpec {
    type Response = AddRoSpecResponse;
}

empty_request!(
    /// Lists the ROSpecs installed on the reader.
    GetRoSpecs, GetRoSpecs => GetRoSpecsResponse
);
empty_request!(
    /// Lists the access specs installed on the reader.
    GetAccessSpecs, GetAccessSpecs => GetAccessSpecsResponse
);
empty_request!(
    /// Probes the newest protocol version the reader supports.
    GetSupportedVersion, GetSupportedVersion => GetSupportedVersionResponse
);
empty_request!(
    /// Announces an orderly disconnect.
    CloseConnection, CloseConnection => CloseConnectionResponse
);

id_request!(EnableRoSpec { ro_spec_id }, EnableRoSpec => EnableRoSpecResponse);
id_request!(StartRoSpec { ro_spec_id }, StartRoSpec => StartRoSpecResponse);
id_request!(StopRoSpec { ro_spec_id }, StopRoSpec => StopRoSpecResponse);
id_request!(DisableRoSpec { ro_spec_id }, DisableRoSpec => DisableRoSpecResponse);
id_request!(DeleteRoSpec { ro_spec_id }, DeleteRoSpec => DeleteRoSpecResponse);

id_request!(EnableAccessSpec { access_spec_id }, EnableAccessSpec => EnableAccessSpecResponse);
id_request!(DisableAccessSpec { access_spec_id }, DisableAccessSpec => DisableAccessSpecResponse);
id_request!(DeleteAccessSpec { access_spec_id }, DeleteAccessSpec => DeleteAccessSpecResponse);

/// Switches the connection to the negotiated protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetProtocolVersion {
    pub version: u8,
}

impl OutboundMessage for SetProtocolVersion {
    const KIND: MessageKind = MessageKind::SetProtocolVersion;

    fn encode(&self, buf: &mut BytesMut) -> CodecResult<()> {
        buf.put_u8(self.version);
        Ok(())
    }
}

impl Request for SetProtocolVersion {
    type Response = SetProtocolVersionResponse;
}

/// Vendor-defined message; the reader answers with another CustomMessage,
/// so correlation rests on the message id alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomMessage {
    pub vendor_id: u32,
    pub message_subtype: u8,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl OutboundMessage for CustomMessage {
    const KIND: MessageKind = MessageKind::CustomMessage;

    fn encode(&self, buf: &mut BytesMut) -> CodecResult<()> {
        buf.put_u32(self.vendor_id);
        buf.put_u8(self.message_subtype);
        buf.put_slice(&self.data);
        Ok(())
    }
}

impl InboundMessage for CustomMessage {
    const KIND: MessageKind = MessageKind::CustomMessage;

    fn decode(mut payload: Bytes) -> CodecResult<Self> {
        if payload.len() < 5 {
            return Err(CodecError::TruncatedParameter {
                need: 5,
                have: payload.len(),
            });
        }
        let vendor_id = payload.get_u32();
        let message_subtype = payload.get_u8();
        Ok(Self {
            vendor_id,
            message_subtype,
            data: payload.to_vec(),
        })
    }
}

impl Request for CustomMessage {
    type Response = CustomMessage;
}

status_params_response!(
    /// Current configuration; settings stay as raw parameters.
    GetReaderConfigResponse, GetReaderConfigResponse
);
status_params_response!(
    /// Capability report; capability sets stay as raw parameters.
    GetReaderCapabilitiesResponse, GetReaderCapabilitiesResponse
);
status_params_response!(
    /// Installed ROSpecs as raw parameters.
    GetRoSpecsResponse, GetRoSpecsResponse
);
status_params_response!(
    /// Installed access specs as raw parameters.
    GetAccessSpecsResponse, GetAccessSpecsResponse
);

status_response!(SetReaderConfigResponse, SetReaderConfigResponse);
status_response!(AddRoSpecResponse, AddRoSpecResponse);
status_response!(EnableRoSpecResponse, EnableRoSpecResponse);
status_response!(StartRoSpecResponse, StartRoSpecResponse);
status_response!(StopRoSpecResponse, StopRoSpecResponse);
status_response!(DisableRoSpecResponse, DisableRoSpecResponse);
status_response!(DeleteRoSpecResponse, DeleteRoSpecResponse);
status_response!(EnableAccessSpecResponse, EnableAccessSpecResponse);
status_response!(DisableAccessSpecResponse, DisableAccessSpecResponse);
status_response!(DeleteAccessSpecResponse, DeleteAccessSpecResponse);
status_response!(SetProtocolVersionResponse, SetProtocolVersionResponse);
status_response!(CloseConnectionResponse, CloseConnectionResponse);
status_response!(
    /// Sent by the reader when it cannot parse a request at all.
    ErrorMessage, ErrorMessage
);

/// The reader's answer to a version probe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetSupportedVersionResponse {
    pub current_version: u8,
    pub supported_version: u8,
    pub status: LlrpStatus,
}

impl InboundMessage for GetSupportedVersionResponse {
    const KIND: MessageKind = MessageKind::GetSupportedVersionResponse;

    fn decode(mut payload: Bytes) -> CodecResult<Self> {
        if payload.len() < 2 {
            return Err(CodecError::TruncatedParameter {
                need: 2,
                have: payload.len(),
            });
        }
        let current_version = payload.get_u8();
        let supported_version = payload.get_u8();
        let (status, _) = decode_status_payload(payload)?;
        Ok(Self {
            current_version,
            supported_version,
            status,
        })
    }

    fn status(&self) -> Option<&LlrpStatus> {
        Some(&self.status)
    }
}

/// Unsolicited reader event; the event data stays raw.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderEventNotification {
    pub data: Vec<u8>,
}

impl InboundMessage for ReaderEventNotification {
    const KIND: MessageKind = MessageKind::ReaderEventNotification;

    fn decode(payload: Bytes) -> CodecResult<Self> {
        Ok(Self {
            data: payload.to_vec(),
        })
    }
}

/// Unsolicited tag report; the tag data stays raw.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoAccessReport {
    pub data: Vec<u8>,
}

impl InboundMessage for RoAccessReport {
    const KIND: MessageKind = MessageKind::RoAccessReport;

    fn decode(payload: Bytes) -> CodecResult<Self> {
        Ok(Self {
            data: payload.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_payload(status: &LlrpStatus) -> Bytes {
        let mut buf = BytesMut::new();
        status.encode_into(&mut buf).unwrap();
        buf.freeze()
    }

    #[test]
    fn status_roundtrip() {
        let status = LlrpStatus {
            code: StatusCode(101),
            description: "bad field".to_string(),
            detail: vec![RawParameter {
                param_type: 288,
                data: vec![0x00, 0x01, 0x00, 0x64],
            }],
        };

        let decoded = LlrpStatus::decode(&status_payload(&status)[4..]).unwrap();
        assert_eq!(decoded, status);
        assert!(!decoded.is_success());
    }

    #[test]
    fn status_led_response_decodes_extra_params() {
        let mut buf = BytesMut::new();
        LlrpStatus::success().encode_into(&mut buf).unwrap();
        put_tlv(&mut buf, PARAM_RO_SPEC, &[0, 0, 0, 1, 0, 0]).unwrap();

        let response = GetRoSpecsResponse::decode(buf.freeze()).unwrap();
        assert!(response.status.is_success());
        assert_eq!(response.params.len(), 1);
        assert_eq!(response.params[0].param_type, PARAM_RO_SPEC);
    }

    #[test]
    fn status_must_come_first() {
        let mut buf = BytesMut::new();
        put_tlv(&mut buf, PARAM_RO_SPEC, &[0, 0, 0, 1, 0, 0]).unwrap();

        assert_eq!(
            GetRoSpecsResponse::decode(buf.freeze()),
            Err(CodecError::MissingParameter {
                typ: PARAM_LLRP_STATUS
            })
        );
    }

    #[test]
    fn tv_parameter_at_top_level_is_rejected() {
        let payload = Bytes::from_static(&[0x81, 0x00, 0x01]);
        assert_eq!(
            split_parameters(payload),
            Err(CodecError::UnexpectedTvParameter { typ: 1 })
        );
    }

    #[test]
    fn truncated_parameter_is_rejected() {
        // declares 12 bytes but only 6 are present
        let payload = Bytes::from_static(&[0x01, 0x1F, 0x00, 0x0C, 0x00, 0x00]);
        assert_eq!(
            split_parameters(payload),
            Err(CodecError::TruncatedParameter { need: 12, have: 6 })
        );
    }

    #[test]
    fn id_request_encodes_big_endian() {
        let request = EnableRoSpec {
            ro_spec_id: 0x0102_0304,
        };
        assert_eq!(
            request.to_bytes().unwrap().as_ref(),
            &[0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn add_ro_spec_encodes_tlv_wrapper() {
        let request = AddRoSpec {
            ro_spec: RoSpec {
                ro_spec_id: 1,
                priority: 0,
                current_state: 0,
                params: vec![],
            },
        };

        let bytes = request.to_bytes().unwrap();
        // parameter 177, length 10 (4 header + 4 id + priority + state)
        assert_eq!(
            bytes.as_ref(),
            &[0x00, 0xB1, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn set_reader_config_encodes_reset_flag() {
        let request = SetReaderConfig {
            reset_to_factory_defaults: true,
            params: vec![],
        };
        assert_eq!(request.to_bytes().unwrap().as_ref(), &[0x80]);

        let request = SetReaderConfig::default();
        assert_eq!(request.to_bytes().unwrap().as_ref(), &[0x00]);
    }

    #[test]
    fn set_reader_config_rejects_unknown_json_fields() {
        let result: Result<SetReaderConfig, _> =
            serde_json::from_str(r#"{"reset_to_factory_defaults":true,"bogus":1}"#);
        assert!(result.is_err());

        let parsed: SetReaderConfig =
            serde_json::from_str(r#"{"reset_to_factory_defaults":true}"#).unwrap();
        assert!(parsed.reset_to_factory_defaults);
    }

    #[test]
    fn ro_spec_parses_from_bare_json() {
        let parsed: RoSpec = serde_json::from_str(r#"{"ro_spec_id":7,"priority":2}"#).unwrap();
        assert_eq!(parsed.ro_spec_id, 7);
        assert_eq!(parsed.priority, 2);
        assert_eq!(parsed.current_state, 0);
    }

    #[test]
    fn supported_version_response_roundtrip() {
        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_u8(2);
        LlrpStatus::success().encode_into(&mut buf).unwrap();

        let response = GetSupportedVersionResponse::decode(buf.freeze()).unwrap();
        assert_eq!(response.current_version, 1);
        assert_eq!(response.supported_version, 2);
        assert!(response.status.is_success());
    }

    #[test]
    fn custom_message_roundtrip() {
        let message = CustomMessage {
            vendor_id: 25882,
            message_subtype: 3,
            data: vec![0xDE, 0xAD],
        };

        let decoded = CustomMessage::decode(message.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn response_pairing_check() {
        assert!(check_response_kind(
            MessageKind::GetRoSpecs,
            MessageKind::GetRoSpecsResponse.as_u16()
        )
        .is_ok());

        // a GetReaderConfigResponse is not an answer to GetRoSpecs
        assert_eq!(
            check_response_kind(
                MessageKind::GetRoSpecs,
                MessageKind::GetReaderConfigResponse.as_u16()
            ),
            Err(CodecError::ResponseTypeMismatch {
                expected: 36,
                got: 12
            })
        );

        // notifications cannot be used as requests
        assert_eq!(
            check_response_kind(MessageKind::RoAccessReport, 0),
            Err(CodecError::UnknownRequestType { typ: 61 })
        );
    }

    #[test]
    fn error_message_carries_status() {
        let status = LlrpStatus {
            code: StatusCode(109),
            description: "unsupported".to_string(),
            detail: vec![],
        };

        let decoded = ErrorMessage::decode(status_payload(&status)).unwrap();
        assert_eq!(decoded.status.code, StatusCode(109));
        assert_eq!(decoded.status().unwrap().description, "unsupported");
    }
}
