use crate::error::ProtocolError;
use crate::ring::RowColor;
use crate::token::GroupToken;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CMD_INIT_INFO: &str = "init_info";
pub const CMD_PRINT: &str = "print";
pub const CMD_OPEN_GROUP: &str = "open_group";
pub const CMD_CLOSE_GROUP: &str = "close_group";

/// The `{cmd, val}` frame as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub cmd: String,
    #[serde(default)]
    pub val: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct InitInfo {
    pub labels: Vec<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrintLine {
    pub col_idx: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_id: Option<String>,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<RowColor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenGroup {
    pub col_idx: usize,
    pub special_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloseGroup {
    pub special_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_idx: Option<usize>,
}

/// A decoded inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    InitInfo(InitInfo),
    Print(PrintLine),
    OpenGroup(OpenGroup),
    CloseGroup(CloseGroup),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::InitInfo(_) => CMD_INIT_INFO,
            Command::Print(_) => CMD_PRINT,
            Command::OpenGroup(_) => CMD_OPEN_GROUP,
            Command::CloseGroup(_) => CMD_CLOSE_GROUP,
        }
    }

    /// Decodes one text frame: the tag first, then the payload of that tag.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|err| ProtocolError::InvalidEnvelope(err.to_string()))?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        match envelope.cmd.as_str() {
            CMD_INIT_INFO => payload(CMD_INIT_INFO, envelope.val).map(Command::InitInfo),
            CMD_PRINT => payload(CMD_PRINT, envelope.val).map(Command::Print),
            CMD_OPEN_GROUP => payload(CMD_OPEN_GROUP, envelope.val).map(Command::OpenGroup),
            CMD_CLOSE_GROUP => payload(CMD_CLOSE_GROUP, envelope.val).map(Command::CloseGroup),
            _ => Err(ProtocolError::UnknownCommand(envelope.cmd)),
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        let val = match self {
            Command::InitInfo(payload) => serde_json::to_value(payload),
            Command::Print(payload) => serde_json::to_value(payload),
            Command::OpenGroup(payload) => serde_json::to_value(payload),
            Command::CloseGroup(payload) => serde_json::to_value(payload),
        }
        .map_err(|err| ProtocolError::MalformedPayload {
            cmd: self.name(),
            reason: err.to_string(),
        })?;
        Ok(Envelope {
            cmd: self.name().to_string(),
            val,
        })
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        let envelope = self.to_envelope()?;
        serde_json::to_string(&envelope).map_err(|err| ProtocolError::MalformedPayload {
            cmd: self.name(),
            reason: err.to_string(),
        })
    }
}

impl PrintLine {
    /// The addressed group, `None` for column output.
    pub fn group_token(&self) -> Result<Option<GroupToken>, ProtocolError> {
        GroupToken::parse_optional(self.special_id.as_deref())
    }
}

impl OpenGroup {
    pub fn group_token(&self) -> Result<Option<GroupToken>, ProtocolError> {
        GroupToken::parse_optional(Some(&self.special_id))
    }
}

impl CloseGroup {
    pub fn group_token(&self) -> Result<Option<GroupToken>, ProtocolError> {
        GroupToken::parse_optional(Some(&self.special_id))
    }
}

fn payload<T: DeserializeOwned>(cmd: &'static str, val: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(val).map_err(|err| ProtocolError::MalformedPayload {
        cmd,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_each_known_command() {
        let init = Command::decode(r#"{"cmd":"init_info","val":["worker-a",null]}"#)
            .expect("init_info");
        assert_eq!(
            init,
            Command::InitInfo(InitInfo {
                labels: vec![Some("worker-a".to_string()), None],
            })
        );

        let print = Command::decode(
            r##"{"cmd":"print","val":{"col_idx":1,"special_id":"00000000000000000000000000000000","self_name":null,"data":"hi","color":"#ff0000"}}"##,
        )
        .expect("print");
        let Command::Print(line) = print else {
            panic!("expected print command");
        };
        assert_eq!(line.col_idx, 1);
        assert_eq!(line.data, "hi");
        assert_eq!(line.color, Some(RowColor("#ff0000".to_string())));
        assert_eq!(line.group_token().expect("token"), None);

        let open = Command::decode(
            r#"{"cmd":"open_group","val":{"col_idx":0,"special_id":"0123456789abcdef0123456789abcdef","data":"ignored"}}"#,
        )
        .expect("open_group");
        assert!(matches!(open, Command::OpenGroup(OpenGroup { col_idx: 0, .. })));

        let close = Command::decode(
            r#"{"cmd":"close_group","val":{"special_id":"0123456789abcdef0123456789abcdef"}}"#,
        )
        .expect("close_group");
        assert_eq!(close.name(), CMD_CLOSE_GROUP);
    }

    #[test]
    fn unknown_command_is_typed_error() {
        let err = Command::decode(r#"{"cmd":"explode","val":{}}"#).expect_err("unknown");
        assert_eq!(err, ProtocolError::UnknownCommand("explode".to_string()));
    }

    #[test]
    fn missing_fields_are_malformed_payloads() {
        let err = Command::decode(r#"{"cmd":"print","val":{"col_idx":0}}"#).expect_err("no data");
        assert!(matches!(
            err,
            ProtocolError::MalformedPayload { cmd: "print", .. }
        ));

        let err = Command::decode(r#"{"cmd":"open_group","val":{"special_id":"x"}}"#)
            .expect_err("no col_idx");
        assert!(matches!(
            err,
            ProtocolError::MalformedPayload {
                cmd: "open_group",
                ..
            }
        ));

        let err = Command::decode(r#"{"cmd":"print","val":{"col_idx":-1,"data":"x"}}"#)
            .expect_err("negative index");
        assert!(matches!(err, ProtocolError::MalformedPayload { .. }));
    }

    #[test]
    fn garbage_is_invalid_envelope() {
        assert!(matches!(
            Command::decode("not json"),
            Err(ProtocolError::InvalidEnvelope(_))
        ));
        assert!(matches!(
            Command::decode(r#"{"val":[]}"#),
            Err(ProtocolError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn encode_produces_cmd_val_shape() {
        let command = Command::Print(PrintLine {
            col_idx: 2,
            special_id: None,
            data: "line".to_string(),
            color: None,
        });
        let text = command.encode().expect("encode");
        let value: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["cmd"], "print");
        assert_eq!(value["val"]["col_idx"], 2);
        assert_eq!(value["val"]["data"], "line");
        assert!(value["val"].get("special_id").is_none());
        assert_eq!(Command::decode(&text).expect("decode"), command);
    }
}
