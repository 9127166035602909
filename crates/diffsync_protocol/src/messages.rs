//! Protocol messages for differential sync.

use crate::codec::Fields;
use crate::document::DocumentKey;
use crate::edit::{Diff, Edit, Operation};
use crate::error::{DecodeError, DecodeResult};
use serde_json::{json, Map, Value};

/// A sync protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    /// A client registers a document with the server.
    Add(AddMessage),
    /// One or more edits for a document.
    Patch(PatchMessage),
    /// A client stops synchronizing a document.
    Detach(DetachMessage),
}

impl SyncMessage {
    /// Returns the `msgType` discriminator.
    pub fn msg_type(&self) -> &'static str {
        match self {
            SyncMessage::Add(_) => "add",
            SyncMessage::Patch(_) => "patch",
            SyncMessage::Detach(_) => "detach",
        }
    }

    /// Returns the key the message is addressed to.
    pub fn key(&self) -> DocumentKey {
        match self {
            SyncMessage::Add(m) => DocumentKey::new(m.document_id.clone(), m.client_id.clone()),
            SyncMessage::Patch(m) => m.key(),
            SyncMessage::Detach(m) => DocumentKey::new(m.document_id.clone(), m.client_id.clone()),
        }
    }

    /// Converts to a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            SyncMessage::Add(m) => m.to_value(),
            SyncMessage::Patch(m) => m.to_value(),
            SyncMessage::Detach(m) => m.to_value(),
        }
    }

    /// Encodes to JSON text.
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    /// Decodes from a JSON value, dispatching on `msgType`.
    pub fn from_value(value: &Value) -> DecodeResult<Self> {
        let fields = Fields::object(value, "message")?;
        match fields.str("msgType")? {
            "add" => AddMessage::from_value(value).map(SyncMessage::Add),
            "patch" => PatchMessage::from_value(value).map(SyncMessage::Patch),
            "detach" => DetachMessage::from_value(value).map(SyncMessage::Detach),
            other => Err(DecodeError::UnknownMessageType(other.to_string())),
        }
    }

    /// Decodes from JSON text.
    pub fn decode(text: &str) -> DecodeResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }
}

fn expect_msg_type(fields: &Fields<'_>, expected: &str) -> DecodeResult<()> {
    let found = fields.str("msgType")?;
    if found == expected {
        Ok(())
    } else {
        Err(DecodeError::malformed(
            fields.context().to_string(),
            format!("expected msgType `{expected}`, found `{found}`"),
        ))
    }
}

/// Registers a document and its initial content with the server.
#[derive(Debug, Clone, PartialEq)]
pub struct AddMessage {
    /// Document identifier.
    pub document_id: String,
    /// Client identifier.
    pub client_id: String,
    /// Serialized document content.
    pub content: Value,
}

impl AddMessage {
    /// Creates a new add message.
    pub fn new(document_id: impl Into<String>, client_id: impl Into<String>, content: Value) -> Self {
        Self {
            document_id: document_id.into(),
            client_id: client_id.into(),
            content,
        }
    }

    /// Converts to a JSON value.
    pub fn to_value(&self) -> Value {
        json!({
            "msgType": "add",
            "id": self.document_id,
            "clientId": self.client_id,
            "content": self.content,
        })
    }

    /// Decodes from a JSON value.
    pub fn from_value(value: &Value) -> DecodeResult<Self> {
        let fields = Fields::object(value, "add message")?;
        expect_msg_type(&fields, "add")?;
        Ok(Self {
            document_id: fields.str("id")?.to_string(),
            client_id: fields.str("clientId")?.to_string(),
            content: fields.any("content")?.clone(),
        })
    }
}

/// Tells the server a client no longer synchronizes a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachMessage {
    /// Document identifier.
    pub document_id: String,
    /// Client identifier.
    pub client_id: String,
}

impl DetachMessage {
    /// Creates a new detach message.
    pub fn new(document_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            client_id: client_id.into(),
        }
    }

    /// Converts to a JSON value.
    pub fn to_value(&self) -> Value {
        json!({
            "msgType": "detach",
            "id": self.document_id,
            "clientId": self.client_id,
        })
    }

    /// Decodes from a JSON value.
    pub fn from_value(value: &Value) -> DecodeResult<Self> {
        let fields = Fields::object(value, "detach message")?;
        expect_msg_type(&fields, "detach")?;
        Ok(Self {
            document_id: fields.str("id")?.to_string(),
            client_id: fields.str("clientId")?.to_string(),
        })
    }
}

/// The unit exchanged over the transport: all edits for one pair.
///
/// A patch message may carry several edits, which is how unacknowledged
/// edits are retransmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchMessage {
    /// Document identifier.
    pub document_id: String,
    /// Client identifier.
    pub client_id: String,
    /// Edits in the order they must be applied.
    pub edits: Vec<Edit>,
}

impl PatchMessage {
    /// Creates a new patch message.
    pub fn new(document_id: impl Into<String>, client_id: impl Into<String>, edits: Vec<Edit>) -> Self {
        Self {
            document_id: document_id.into(),
            client_id: client_id.into(),
            edits,
        }
    }

    /// Returns the key the message is addressed to.
    pub fn key(&self) -> DocumentKey {
        DocumentKey::new(self.document_id.clone(), self.client_id.clone())
    }

    /// Converts to a JSON value.
    pub fn to_value(&self) -> Value {
        let edits: Vec<Value> = self.edits.iter().map(edit_to_value).collect();
        json!({
            "msgType": "patch",
            "id": self.document_id,
            "clientId": self.client_id,
            "edits": edits,
        })
    }

    /// Encodes to JSON text.
    pub fn encode(&self) -> String {
        self.to_value().to_string()
    }

    /// Decodes from a JSON value.
    pub fn from_value(value: &Value) -> DecodeResult<Self> {
        let fields = Fields::object(value, "patch message")?;
        expect_msg_type(&fields, "patch")?;

        let document_id = fields.str("id")?.to_string();
        let client_id = fields.str("clientId")?.to_string();

        let edits = fields
            .array("edits")?
            .iter()
            .enumerate()
            .map(|(index, edit)| {
                edit_from_value(edit, format!("edits[{index}]"), &document_id, &client_id)
            })
            .collect::<DecodeResult<Vec<_>>>()?;

        Ok(Self {
            document_id,
            client_id,
            edits,
        })
    }

    /// Decodes from JSON text.
    pub fn decode(text: &str) -> DecodeResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }
}

fn edit_to_value(edit: &Edit) -> Value {
    let diffs: Vec<Value> = edit.diffs.iter().map(diff_to_value).collect();
    json!({
        "clientVersion": edit.client_version,
        "serverVersion": edit.server_version,
        "checksum": edit.checksum,
        "diffs": diffs,
    })
}

fn diff_to_value(diff: &Diff) -> Value {
    let mut map = Map::new();
    map.insert("op".into(), Value::String(diff.operation.as_str().into()));
    map.insert("path".into(), Value::String(diff.path.clone()));
    if let Some(value) = &diff.value {
        map.insert("value".into(), Value::String(value.clone()));
    }
    Value::Object(map)
}

fn edit_from_value(
    value: &Value,
    context: String,
    document_id: &str,
    client_id: &str,
) -> DecodeResult<Edit> {
    let fields = Fields::object(value, context)?;

    let client_version = fields.u64("clientVersion")?;
    let server_version = fields.u64("serverVersion")?;
    let checksum = fields.str("checksum")?.to_string();

    let diffs = fields
        .array("diffs")?
        .iter()
        .enumerate()
        .map(|(index, diff)| diff_from_value(diff, format!("{}.diffs[{index}]", fields.context())))
        .collect::<DecodeResult<Vec<_>>>()?;

    Ok(Edit {
        document_id: document_id.to_string(),
        client_id: client_id.to_string(),
        client_version,
        server_version,
        checksum,
        diffs,
    })
}

fn diff_from_value(value: &Value, context: String) -> DecodeResult<Diff> {
    let fields = Fields::object(value, context)?;

    let op = fields.str("op")?;
    let operation = Operation::parse(op).ok_or_else(|| DecodeError::UnknownOperation {
        op: op.to_string(),
        context: fields.context().to_string(),
    })?;

    let path = fields.str("path")?.to_string();
    let value = fields.opt_str("value")?.map(str::to_string);

    Ok(Diff {
        operation,
        path,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_patch() -> PatchMessage {
        PatchMessage::new(
            "doc-1",
            "client-1",
            vec![
                Edit::new("doc-1", "client-1", 0, 0, "aa").with_diffs(vec![
                    Diff::add("/3", "bar"),
                    Diff::remove("/0", Some("f".into())),
                ]),
                Edit::new("doc-1", "client-1", 1, 0, "bb"),
            ],
        )
    }

    #[test]
    fn message_type_codes() {
        let patch = SyncMessage::Patch(sample_patch());
        assert_eq!(patch.msg_type(), "patch");
        assert_eq!(
            SyncMessage::Detach(DetachMessage::new("d", "c")).msg_type(),
            "detach"
        );
        assert_eq!(
            SyncMessage::Add(AddMessage::new("d", "c", Value::Null)).msg_type(),
            "add"
        );
    }

    #[test]
    fn patch_wire_shape() {
        let value = sample_patch().to_value();
        assert_eq!(value["msgType"], "patch");
        assert_eq!(value["id"], "doc-1");
        assert_eq!(value["clientId"], "client-1");
        assert_eq!(value["edits"][0]["clientVersion"], 0);
        assert_eq!(value["edits"][0]["diffs"][0]["op"], "add");
        assert_eq!(value["edits"][0]["diffs"][1]["value"], "f");
        assert!(value["edits"][1]["diffs"].as_array().unwrap().is_empty());
    }

    #[test]
    fn patch_roundtrip_preserves_order_and_absent_values() {
        let message = PatchMessage::new(
            "doc-1",
            "client-1",
            vec![Edit::new("doc-1", "client-1", 2, 5, "cc").with_diffs(vec![
                Diff::remove("/a", None),
                Diff::add("/b", ""),
                Diff::test("/c", "1"),
                Diff::replace("/d", "2"),
            ])],
        );

        let decoded = PatchMessage::decode(&message.encode()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.edits[0].diffs[0].value, None);
        assert_eq!(decoded.edits[0].diffs[1].value.as_deref(), Some(""));
    }

    #[test]
    fn decoded_edits_inherit_message_key() {
        let decoded = PatchMessage::decode(&sample_patch().encode()).unwrap();
        for edit in &decoded.edits {
            assert_eq!(edit.key(), decoded.key());
        }
    }

    #[test]
    fn add_and_detach_roundtrip() {
        let add = SyncMessage::Add(AddMessage::new("d", "c", json!({ "title": "x" })));
        assert_eq!(SyncMessage::decode(&add.encode()).unwrap(), add);

        let detach = SyncMessage::Detach(DetachMessage::new("d", "c"));
        assert_eq!(SyncMessage::decode(&detach.encode()).unwrap(), detach);
    }

    #[test]
    fn unknown_message_type() {
        let err = SyncMessage::decode(r#"{"msgType":"sideways","id":"d","clientId":"c"}"#)
            .unwrap_err();
        assert_eq!(err, DecodeError::UnknownMessageType("sideways".into()));
    }

    #[test]
    fn missing_field_reports_location() {
        let text = r#"{"msgType":"patch","id":"d","clientId":"c",
            "edits":[{"clientVersion":0,"serverVersion":0,"diffs":[]}]}"#;
        let err = PatchMessage::decode(text).unwrap_err();
        assert_eq!(err, DecodeError::missing("checksum", "edits[0]"));
    }

    #[test]
    fn wrong_type_is_distinguished() {
        let text = r#"{"msgType":"patch","id":"d","clientId":"c",
            "edits":[{"clientVersion":"0","serverVersion":0,"checksum":"","diffs":[]}]}"#;
        let err = PatchMessage::decode(text).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::WrongType { ref field, found: "string", .. } if field == "clientVersion"
        ));
    }

    #[test]
    fn negative_version_rejected() {
        let text = r#"{"msgType":"patch","id":"d","clientId":"c",
            "edits":[{"clientVersion":-1,"serverVersion":0,"checksum":"","diffs":[]}]}"#;
        assert!(matches!(
            PatchMessage::decode(text),
            Err(DecodeError::WrongType { .. })
        ));
    }

    #[test]
    fn unknown_operation_reports_location() {
        let text = r#"{"msgType":"patch","id":"d","clientId":"c",
            "edits":[{"clientVersion":0,"serverVersion":0,"checksum":"",
                      "diffs":[{"op":"move","path":"/a"}]}]}"#;
        let err = PatchMessage::decode(text).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnknownOperation {
                op: "move".into(),
                context: "edits[0].diffs[0]".into(),
            }
        );
    }

    #[test]
    fn malformed_structures() {
        assert!(matches!(
            PatchMessage::decode("[]"),
            Err(DecodeError::Malformed { .. })
        ));
        assert!(matches!(
            PatchMessage::decode(r#"{"msgType":"patch","id":"d","clientId":"c","edits":[3]}"#),
            Err(DecodeError::Malformed { .. })
        ));
        assert!(matches!(
            PatchMessage::decode(r#"{"msgType":"detach","id":"d","clientId":"c"}"#),
            Err(DecodeError::Malformed { .. })
        ));
        assert!(matches!(
            PatchMessage::decode("{not json"),
            Err(DecodeError::Syntax { .. })
        ));
    }
}
