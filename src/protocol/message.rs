//! The JSON wire format of protocol messages.
//!
//! Binary fields are `0x`-prefixed lowercase hex. Unknown fields round-trip:
//! both the top-level record and `customData` keep whatever extra keys a
//! newer peer sent, so forwarding a message never drops information.

use super::{ProcessId, ProtocolName};
use crate::channel::{AppInstance, PublicIdentifier};
use crate::encode::types::{Address, Hash, Signature};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Sequence number of a protocol message, with the unassigned sentinel.
///
/// On the wire the sentinel is `-1`; assigned values are non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqNo {
    Assigned(u32),
    Unassigned,
}

/// The sentinel used by reply messages that resume a waiting engine rather
/// than starting a new one.
pub const UNASSIGNED_SEQ_NO: SeqNo = SeqNo::Unassigned;

impl Serialize for SeqNo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SeqNo::Assigned(n) => serializer.serialize_i64(*n as i64),
            SeqNo::Unassigned => serializer.serialize_i64(-1),
        }
    }
}

impl<'de> Deserialize<'de> for SeqNo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = i64::deserialize(deserializer)?;
        match v {
            -1 => Ok(SeqNo::Unassigned),
            n if (0..=u32::MAX as i64).contains(&n) => Ok(SeqNo::Assigned(n as u32)),
            other => Err(de::Error::custom(format!("invalid seq {other}"))),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("message carries protocol {actual:?}, expected {expected:?}")]
    WrongProtocol {
        expected: ProtocolName,
        actual: ProtocolName,
    },
    #[error("message is missing the protocol params")]
    MissingParams,
    #[error("custom data does not decode: {0}")]
    MalformedCustomData(String),
    #[error("message belongs to process {actual}, expected {expected}")]
    ProcessMismatch { expected: ProcessId, actual: ProcessId },
    #[error("unexpected sequence number {0:?} for a fresh dispatch")]
    UnexpectedSeq(SeqNo),
}

/// Parameters of an install run, exchanged in the first message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstallParams {
    pub initiator_identifier: PublicIdentifier,
    pub responder_identifier: PublicIdentifier,
    pub multisig_address: Address,
    pub proposal: AppInstance,
    /// Must equal `proposal.identity_hash()`; the engine rejects skew.
    pub app_identity_hash: Hash,
}

/// Protocol-specific parameter payload.
///
/// Serialized untagged: the sibling `protocol` field of the enclosing
/// message identifies the variant, and decoders check that tag before
/// projecting (see [ProtocolMessageData::install_params]).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ProtocolParams {
    Install(InstallParams),
}

/// Typed view of the install protocol's `customData`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstallCustomData {
    pub signature: Signature,
}

/// One protocol message on the wire.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMessageData {
    #[serde(rename = "processID")]
    pub process_id: ProcessId,
    pub protocol: ProtocolName,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub params: Option<ProtocolParams>,
    pub to: PublicIdentifier,
    pub seq: SeqNo,
    #[serde(default)]
    pub custom_data: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProtocolMessageData {
    /// First-round install message (sequence number 1, params included).
    pub fn install_round_one(
        process_id: ProcessId,
        to: PublicIdentifier,
        params: InstallParams,
        signature: Signature,
    ) -> Self {
        ProtocolMessageData {
            process_id,
            protocol: ProtocolName::Install,
            params: Some(ProtocolParams::Install(params)),
            to,
            seq: SeqNo::Assigned(1),
            custom_data: custom_data_with_signature(signature),
            extra: Map::new(),
        }
    }

    /// Reply resuming the waiting initiator (unassigned sequence number,
    /// params omitted).
    pub fn install_reply(
        process_id: ProcessId,
        to: PublicIdentifier,
        signature: Signature,
    ) -> Self {
        ProtocolMessageData {
            process_id,
            protocol: ProtocolName::Install,
            params: None,
            to,
            seq: UNASSIGNED_SEQ_NO,
            custom_data: custom_data_with_signature(signature),
            extra: Map::new(),
        }
    }

    fn expect_install(&self) -> Result<(), MessageError> {
        if self.protocol != ProtocolName::Install {
            return Err(MessageError::WrongProtocol {
                expected: ProtocolName::Install,
                actual: self.protocol,
            });
        }
        Ok(())
    }

    pub fn install_params(&self) -> Result<&InstallParams, MessageError> {
        self.expect_install()?;
        match &self.params {
            Some(ProtocolParams::Install(p)) => Ok(p),
            None => Err(MessageError::MissingParams),
        }
    }

    /// Project `customData`, checking the protocol tag first.
    pub fn install_custom_data(&self) -> Result<InstallCustomData, MessageError> {
        self.expect_install()?;
        serde_json::from_value(Value::Object(self.custom_data.clone()))
            .map_err(|e| MessageError::MalformedCustomData(e.to_string()))
    }
}

fn custom_data_with_signature(signature: Signature) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(
        "signature".into(),
        serde_json::to_value(signature).expect("hex string serialization"),
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_install_params;

    fn identifier() -> PublicIdentifier {
        "0x02ba5734d8f7091719471e7f7ed6b9df170dc70cc661ca05e688601ad984f068b0"
            .parse()
            .unwrap()
    }

    #[test]
    fn seq_no_wire_representation() {
        assert_eq!(serde_json::to_string(&SeqNo::Assigned(1)).unwrap(), "1");
        assert_eq!(serde_json::to_string(&SeqNo::Unassigned).unwrap(), "-1");
        assert_eq!(serde_json::from_str::<SeqNo>("-1").unwrap(), SeqNo::Unassigned);
        assert!(serde_json::from_str::<SeqNo>("-2").is_err());
    }

    #[test]
    fn round_one_message_json_shape() {
        let params = test_install_params();
        let msg = ProtocolMessageData::install_round_one(
            ProcessId("p-1".into()),
            identifier(),
            params,
            Signature::new(&[0x11; 64], 27),
        );

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["processID"], "p-1");
        assert_eq!(json["protocol"], "install");
        assert_eq!(json["seq"], 1);
        assert!(json["params"]["proposal"].is_object());
        assert!(json["customData"]["signature"]
            .as_str()
            .unwrap()
            .starts_with("0x"));

        let back: ProtocolMessageData = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn reply_message_omits_params() {
        let msg = ProtocolMessageData::install_reply(
            ProcessId("p-1".into()),
            identifier(),
            Signature::new(&[0x22; 64], 28),
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["seq"], -1);
        assert!(json.get("params").is_none());

        let back: ProtocolMessageData = serde_json::from_value(json).unwrap();
        assert_eq!(back.install_custom_data().unwrap().signature, Signature::new(&[0x22; 64], 28));
        assert_eq!(back.install_params().unwrap_err(), MessageError::MissingParams);
    }

    #[test]
    fn unknown_fields_round_trip() {
        let mut msg = ProtocolMessageData::install_reply(
            ProcessId("p-2".into()),
            identifier(),
            Signature::new(&[0x33; 64], 27),
        );
        msg.extra
            .insert("futureField".into(), Value::String("kept".into()));
        msg.custom_data
            .insert("futureNested".into(), Value::from(42));

        let json = serde_json::to_string(&msg).unwrap();
        let back: ProtocolMessageData = serde_json::from_str(&json).unwrap();
        assert_eq!(back.extra["futureField"], "kept");
        assert_eq!(back.custom_data["futureNested"], 42);
        // The typed projection still works with unknown siblings present.
        back.install_custom_data().unwrap();
    }

    #[test]
    fn projection_checks_protocol_tag() {
        let mut msg = ProtocolMessageData::install_reply(
            ProcessId("p-3".into()),
            identifier(),
            Signature::new(&[0x44; 64], 27),
        );
        msg.protocol = ProtocolName::Update;
        assert!(matches!(
            msg.install_custom_data(),
            Err(MessageError::WrongProtocol { .. })
        ));
    }
}
