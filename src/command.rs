//! The schema command model.
//!
//! A [`Command`] is one requested schema change, deserialized from the wire
//! as a tagged object (`{"op": "CREATE_TABLE", ...}`). The enum is closed:
//! dispatch in [`crate::ops`] is an exhaustive match, so adding an operation
//! is a compile-time checked change, not a registry lookup.
//!
//! Commands are immutable input and do not outlive one batch request.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SchemaError};

/// `{table, column}` pair a foreign key points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnReference {
    pub table: String,
    pub column: String,
}

/// One column in a CREATE_TABLE / ADD_COLUMN payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    #[serde(default)]
    pub unique: bool,
    /// Inline foreign key on the column (CREATE_TABLE only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ColumnReference>,
}

/// Referential action allow-list for foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    #[serde(rename = "NO ACTION")]
    NoAction,
    #[serde(rename = "RESTRICT")]
    Restrict,
    #[serde(rename = "CASCADE")]
    Cascade,
    #[serde(rename = "SET NULL")]
    SetNull,
    #[serde(rename = "SET DEFAULT")]
    SetDefault,
}

impl ReferentialAction {
    /// Parses a wire value, case-insensitively, against the allow-list.
    pub fn parse(raw: &str) -> Result<Self, SchemaError> {
        match raw.to_uppercase().as_str() {
            "NO ACTION" => Ok(ReferentialAction::NoAction),
            "RESTRICT" => Ok(ReferentialAction::Restrict),
            "CASCADE" => Ok(ReferentialAction::Cascade),
            "SET NULL" => Ok(ReferentialAction::SetNull),
            "SET DEFAULT" => Ok(ReferentialAction::SetDefault),
            other => Err(SchemaError::validation(format!(
                "Invalid referential action: {}",
                other
            ))),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// Shared payload of ADD_FOREIGN_KEY and UPDATE_FOREIGN_KEY.
///
/// `on_delete`/`on_update` stay as raw strings here; the operation validates
/// them against [`ReferentialAction`] so a bad rule surfaces as a structured
/// operation error rather than a deserialization failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeySpec {
    pub table: String,
    pub column: String,
    #[serde(rename = "ref")]
    pub reference: ColumnReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint_name: Option<String>,
}

/// One schema-change command, tagged by operation name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Command {
    #[serde(rename = "CREATE_TABLE")]
    CreateTable {
        name: String,
        columns: Vec<ColumnDefinition>,
    },
    #[serde(rename = "DROP_TABLE", rename_all = "camelCase")]
    DropTable {
        name: String,
        #[serde(default)]
        cascade: bool,
        #[serde(default)]
        if_exists: bool,
    },
    #[serde(rename = "RENAME_TABLE")]
    RenameTable { from: String, to: String },
    #[serde(rename = "ADD_COLUMN")]
    AddColumn {
        table: String,
        column: ColumnDefinition,
    },
    #[serde(rename = "DROP_COLUMN")]
    DropColumn {
        table: String,
        column: String,
        #[serde(default)]
        cascade: bool,
    },
    #[serde(rename = "RENAME_COLUMN")]
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    #[serde(rename = "CHANGE_COLUMN_TYPE", rename_all = "camelCase")]
    ChangeColumnType {
        table: String,
        column: String,
        new_type: String,
        #[serde(default)]
        using: Option<String>,
    },
    #[serde(rename = "ADD_FOREIGN_KEY")]
    AddForeignKey(ForeignKeySpec),
    #[serde(rename = "DROP_FOREIGN_KEY")]
    DropForeignKey { table: String, column: String },
    #[serde(rename = "UPDATE_FOREIGN_KEY")]
    UpdateForeignKey(ForeignKeySpec),
}

const KNOWN_OPS: &[&str] = &[
    "CREATE_TABLE",
    "DROP_TABLE",
    "RENAME_TABLE",
    "ADD_COLUMN",
    "DROP_COLUMN",
    "RENAME_COLUMN",
    "CHANGE_COLUMN_TYPE",
    "ADD_FOREIGN_KEY",
    "DROP_FOREIGN_KEY",
    "UPDATE_FOREIGN_KEY",
];

impl Command {
    /// Wire name of the operation, used in batch result entries.
    pub fn op_name(&self) -> &'static str {
        match self {
            Command::CreateTable { .. } => "CREATE_TABLE",
            Command::DropTable { .. } => "DROP_TABLE",
            Command::RenameTable { .. } => "RENAME_TABLE",
            Command::AddColumn { .. } => "ADD_COLUMN",
            Command::DropColumn { .. } => "DROP_COLUMN",
            Command::RenameColumn { .. } => "RENAME_COLUMN",
            Command::ChangeColumnType { .. } => "CHANGE_COLUMN_TYPE",
            Command::AddForeignKey(_) => "ADD_FOREIGN_KEY",
            Command::DropForeignKey { .. } => "DROP_FOREIGN_KEY",
            Command::UpdateForeignKey(_) => "UPDATE_FOREIGN_KEY",
        }
    }

    /// Parses one command from a JSON object.
    ///
    /// An `op` tag outside the registry maps to [`ErrorKind::UnknownOp`];
    /// a malformed payload for a known operation maps to a validation error.
    pub fn from_json(value: serde_json::Value) -> Result<Command, SchemaError> {
        let op = value
            .get("op")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        match op.as_deref() {
            None => Err(SchemaError::validation(
                "Each command must carry a string \"op\" field",
            )),
            Some(op) if !KNOWN_OPS.contains(&op) => Err(SchemaError::new(
                ErrorKind::UnknownOp,
                format!("Unsupported operation: {}", op),
            )),
            Some(_) => serde_json::from_value(value)
                .map_err(|e| SchemaError::validation(format!("Malformed command payload: {}", e))),
        }
    }

    /// Parses a `commands` array. The array must be non-empty.
    pub fn parse_many(value: serde_json::Value) -> Result<Vec<Command>, SchemaError> {
        let serde_json::Value::Array(items) = value else {
            return Err(SchemaError::validation(
                "\"commands\" must be a non-empty array",
            ));
        };
        if items.is_empty() {
            return Err(SchemaError::validation(
                "\"commands\" must be a non-empty array",
            ));
        }
        items.into_iter().map(Command::from_json).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tagged_parse_create_table() {
        let cmd = Command::from_json(json!({
            "op": "CREATE_TABLE",
            "name": "users",
            "columns": [
                {"name": "id", "type": "INT", "isPrimary": true},
                {"name": "email", "type": "VARCHAR(255)", "isNullable": false, "unique": true}
            ]
        }))
        .unwrap();

        let Command::CreateTable { name, columns } = cmd else {
            panic!("expected CreateTable");
        };
        assert_eq!(name, "users");
        assert_eq!(columns.len(), 2);
        assert!(columns[0].is_primary);
        assert!(!columns[0].is_nullable);
        assert_eq!(columns[1].data_type, "VARCHAR(255)");
        assert!(columns[1].unique);
    }

    #[test]
    fn test_camel_case_fields() {
        let cmd = Command::from_json(json!({
            "op": "CHANGE_COLUMN_TYPE",
            "table": "users",
            "column": "age",
            "newType": "BIGINT",
            "using": "age::bigint"
        }))
        .unwrap();
        assert_eq!(
            cmd,
            Command::ChangeColumnType {
                table: "users".into(),
                column: "age".into(),
                new_type: "BIGINT".into(),
                using: Some("age::bigint".into()),
            }
        );

        let cmd = Command::from_json(json!({
            "op": "DROP_TABLE",
            "name": "tmp",
            "ifExists": true
        }))
        .unwrap();
        assert_eq!(
            cmd,
            Command::DropTable {
                name: "tmp".into(),
                cascade: false,
                if_exists: true,
            }
        );
    }

    #[test]
    fn test_foreign_key_spec_parse() {
        let cmd = Command::from_json(json!({
            "op": "ADD_FOREIGN_KEY",
            "table": "orders",
            "column": "user_id",
            "ref": {"table": "users", "column": "id"},
            "onDelete": "cascade"
        }))
        .unwrap();
        let Command::AddForeignKey(spec) = cmd else {
            panic!("expected AddForeignKey");
        };
        assert_eq!(spec.reference.table, "users");
        assert_eq!(spec.on_delete.as_deref(), Some("cascade"));
        assert!(spec.constraint_name.is_none());
    }

    #[test]
    fn test_unknown_op_is_structured() {
        let err = Command::from_json(json!({"op": "TRUNCATE_TABLE", "name": "users"})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownOp);
        assert!(err.message.contains("TRUNCATE_TABLE"));
    }

    #[test]
    fn test_missing_op_tag() {
        let err = Command::from_json(json!({"name": "users"})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_parse_many_rejects_empty_and_non_array() {
        assert!(Command::parse_many(json!([])).is_err());
        assert!(Command::parse_many(json!({"op": "DROP_TABLE"})).is_err());
    }

    #[test]
    fn test_referential_action_allow_list() {
        assert_eq!(
            ReferentialAction::parse("cascade").unwrap(),
            ReferentialAction::Cascade
        );
        assert_eq!(
            ReferentialAction::parse("set null").unwrap().as_sql(),
            "SET NULL"
        );
        assert!(ReferentialAction::parse("SET ZERO").is_err());
    }
}
