//! Deterministic schema snapshots and the schema hash.
//!
//! A snapshot captures the `public` schema (tables, columns, constraints,
//! indexes) in a normalized shape: tables sorted by name, columns by ordinal
//! position, constraints and indexes by name. The hash is SHA-256 over the
//! canonical JSON rendering of the `schema` object only; `generatedAt` never
//! participates, so two snapshots of the same schema always hash equal.
//!
//! The hash is the optimistic-concurrency token: callers pass it back as
//! `expectedHash` and the engine refuses to apply a batch when the live
//! schema has moved.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::SchemaError;
use crate::executor::SchemaExecutor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSnapshot {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// The table's primary key, named: renaming the constraint out-of-band is
/// schema drift and must move the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKeySnapshot {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueSnapshot {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSnapshot {
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeySnapshot {
    pub name: String,
    pub column: String,
    pub references: ReferencedColumn,
    pub on_delete: String,
    pub on_update: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferencedColumn {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSnapshot {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<ColumnSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKeySnapshot>,
    pub uniques: Vec<UniqueSnapshot>,
    pub checks: Vec<CheckSnapshot>,
    pub foreign_keys: Vec<ForeignKeySnapshot>,
    pub indexes: Vec<IndexSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaBody {
    pub tables: Vec<TableSnapshot>,
}

/// A point-in-time view of the schema plus its hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    pub schema_hash: String,
    pub generated_at: String,
    pub schema: SchemaBody,
}

/// Captures a snapshot over the executor, optionally scoped to one table.
pub fn capture(
    executor: &dyn SchemaExecutor,
    table: Option<&str>,
) -> Result<SchemaSnapshot, SchemaError> {
    let table_names = list_tables(executor, table)?;

    let mut tables = Vec::with_capacity(table_names.len());
    for name in table_names {
        tables.push(capture_table(executor, &name)?);
    }

    let schema = SchemaBody { tables };
    let schema_hash = hash_schema(&schema)?;
    log::debug!("schema snapshot captured, hash {}", schema_hash);

    Ok(SchemaSnapshot {
        schema_hash,
        generated_at: Utc::now().to_rfc3339(),
        schema,
    })
}

/// SHA-256 of the canonical JSON rendering of the schema body.
pub fn hash_schema(schema: &SchemaBody) -> Result<String, SchemaError> {
    let value = serde_json::to_value(schema)
        .map_err(|e| SchemaError::internal(format!("snapshot serialization failed: {}", e)))?;
    let canonical = canonical_json(&value);
    Ok(format!("{:x}", Sha256::digest(canonical.as_bytes())))
}

fn list_tables(
    executor: &dyn SchemaExecutor,
    table: Option<&str>,
) -> Result<Vec<String>, SchemaError> {
    let rows = match table {
        Some(name) => executor.query_all(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
               AND table_name = $1 \
             ORDER BY table_name",
            &[&name],
        )?,
        None => executor.query_all(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
            &[],
        )?,
    };
    Ok(rows.iter().map(|r| r.get(0)).collect())
}

fn capture_table(executor: &dyn SchemaExecutor, table: &str) -> Result<TableSnapshot, SchemaError> {
    let columns = read_columns(executor, table)?;
    let (primary_key, uniques) = read_key_constraints(executor, table)?;
    let checks = read_checks(executor, table)?;
    let foreign_keys = read_foreign_keys(executor, table)?;
    let indexes = read_indexes(executor, table)?;

    Ok(TableSnapshot {
        name: table.to_string(),
        columns,
        primary_key,
        uniques,
        checks,
        foreign_keys,
        indexes,
    })
}

fn read_columns(
    executor: &dyn SchemaExecutor,
    table: &str,
) -> Result<Vec<ColumnSnapshot>, SchemaError> {
    let rows = executor.query_all(
        "SELECT column_name, data_type, is_nullable, column_default \
         FROM information_schema.columns \
         WHERE table_schema = 'public' AND table_name = $1 \
         ORDER BY ordinal_position",
        &[&table],
    )?;

    Ok(rows
        .iter()
        .map(|row| {
            let nullable: String = row.get(2);
            ColumnSnapshot {
                name: row.get(0),
                data_type: row.get(1),
                is_nullable: nullable == "YES",
                default: row.get(3),
            }
        })
        .collect())
}

/// Reads PRIMARY KEY and UNIQUE constraints, grouped by constraint name with
/// in-constraint column order preserved.
fn read_key_constraints(
    executor: &dyn SchemaExecutor,
    table: &str,
) -> Result<(Option<PrimaryKeySnapshot>, Vec<UniqueSnapshot>), SchemaError> {
    let rows = executor.query_all(
        "SELECT tc.constraint_name, tc.constraint_type, kcu.column_name \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON kcu.constraint_name = tc.constraint_name \
          AND kcu.table_schema = tc.table_schema \
         WHERE tc.table_schema = 'public' AND tc.table_name = $1 \
           AND tc.constraint_type IN ('PRIMARY KEY', 'UNIQUE') \
         ORDER BY tc.constraint_name, kcu.ordinal_position",
        &[&table],
    )?;

    let mut primary_key: Option<PrimaryKeySnapshot> = None;
    let mut uniques: Vec<UniqueSnapshot> = Vec::new();

    for row in &rows {
        let name: String = row.get(0);
        let kind: String = row.get(1);
        let column: String = row.get(2);

        if kind == "PRIMARY KEY" {
            primary_key
                .get_or_insert_with(|| PrimaryKeySnapshot {
                    name,
                    columns: Vec::new(),
                })
                .columns
                .push(column);
        } else {
            match uniques.last_mut() {
                Some(last) if last.name == name => last.columns.push(column),
                _ => uniques.push(UniqueSnapshot {
                    name,
                    columns: vec![column],
                }),
            }
        }
    }

    uniques.sort_by(|a, b| a.name.cmp(&b.name));
    Ok((primary_key, uniques))
}

fn read_checks(
    executor: &dyn SchemaExecutor,
    table: &str,
) -> Result<Vec<CheckSnapshot>, SchemaError> {
    // implicit NOT NULL checks are excluded; nullability is already carried
    // on the column entries
    let rows = executor.query_all(
        "SELECT tc.constraint_name, cc.check_clause \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.check_constraints cc \
           ON cc.constraint_name = tc.constraint_name \
          AND cc.constraint_schema = tc.table_schema \
         WHERE tc.table_schema = 'public' AND tc.table_name = $1 \
           AND tc.constraint_type = 'CHECK' \
           AND tc.constraint_name NOT LIKE '%_not_null' \
         ORDER BY tc.constraint_name",
        &[&table],
    )?;

    Ok(rows
        .iter()
        .map(|row| CheckSnapshot {
            name: row.get(0),
            expression: row.get(1),
        })
        .collect())
}

fn read_foreign_keys(
    executor: &dyn SchemaExecutor,
    table: &str,
) -> Result<Vec<ForeignKeySnapshot>, SchemaError> {
    let rows = executor.query_all(
        "SELECT tc.constraint_name, kcu.column_name, \
                ccu.table_name, ccu.column_name, \
                rc.delete_rule, rc.update_rule \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu \
           ON kcu.constraint_name = tc.constraint_name \
          AND kcu.table_schema = tc.table_schema \
         JOIN information_schema.constraint_column_usage ccu \
           ON ccu.constraint_name = tc.constraint_name \
          AND ccu.table_schema = tc.table_schema \
         JOIN information_schema.referential_constraints rc \
           ON rc.constraint_name = tc.constraint_name \
          AND rc.constraint_schema = tc.table_schema \
         WHERE tc.table_schema = 'public' AND tc.table_name = $1 \
           AND tc.constraint_type = 'FOREIGN KEY' \
         ORDER BY tc.constraint_name",
        &[&table],
    )?;

    Ok(rows
        .iter()
        .map(|row| ForeignKeySnapshot {
            name: row.get(0),
            column: row.get(1),
            references: ReferencedColumn {
                table: row.get(2),
                column: row.get(3),
            },
            on_delete: row.get(4),
            on_update: row.get(5),
        })
        .collect())
}

fn read_indexes(
    executor: &dyn SchemaExecutor,
    table: &str,
) -> Result<Vec<IndexSnapshot>, SchemaError> {
    let rows = executor.query_all(
        "SELECT indexname, indexdef \
         FROM pg_indexes \
         WHERE schemaname = 'public' AND tablename = $1 \
         ORDER BY indexname",
        &[&table],
    )?;

    Ok(rows
        .iter()
        .map(|row| {
            let definition: String = row.get(1);
            IndexSnapshot {
                name: row.get(0),
                unique: definition.starts_with("CREATE UNIQUE INDEX"),
                columns: extract_index_columns(&definition),
                definition,
            }
        })
        .collect())
}

static INDEX_COLUMNS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^)]*)\)\s*$").expect("index columns regex"));

/// Parses the column list out of a `pg_indexes` definition string.
fn extract_index_columns(definition: &str) -> Vec<String> {
    INDEX_COLUMNS_RE
        .captures(definition)
        .map(|c| {
            c[1].split(',')
                .map(|s| s.trim().trim_matches('"').to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Renders a JSON value with lexicographically sorted object keys and no
/// whitespace. This is the string the hash is computed over; it must stay
/// byte-stable across releases.
pub fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(k.clone()),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        serde_json::Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users_table() -> TableSnapshot {
        TableSnapshot {
            name: "users".into(),
            columns: vec![
                ColumnSnapshot {
                    name: "id".into(),
                    data_type: "integer".into(),
                    is_nullable: false,
                    default: None,
                },
                ColumnSnapshot {
                    name: "email".into(),
                    data_type: "character varying".into(),
                    is_nullable: false,
                    default: None,
                },
            ],
            primary_key: Some(PrimaryKeySnapshot {
                name: "users_pkey".into(),
                columns: vec!["id".into()],
            }),
            uniques: vec![UniqueSnapshot {
                name: "users_email_key".into(),
                columns: vec!["email".into()],
            }],
            checks: vec![],
            foreign_keys: vec![],
            indexes: vec![],
        }
    }

    #[test]
    fn test_hash_is_stable_for_equal_schemas() {
        let a = SchemaBody {
            tables: vec![users_table()],
        };
        let b = SchemaBody {
            tables: vec![users_table()],
        };
        assert_eq!(hash_schema(&a).unwrap(), hash_schema(&b).unwrap());
    }

    #[test]
    fn test_hash_changes_with_schema_shape() {
        let base = SchemaBody {
            tables: vec![users_table()],
        };
        let mut changed = base.clone();
        changed.tables[0].columns[0].data_type = "bigint".into();
        assert_ne!(hash_schema(&base).unwrap(), hash_schema(&changed).unwrap());
    }

    #[test]
    fn test_hash_ignores_generated_at() {
        let schema = SchemaBody {
            tables: vec![users_table()],
        };
        let hash = hash_schema(&schema).unwrap();

        let early = SchemaSnapshot {
            schema_hash: hash.clone(),
            generated_at: "2026-01-01T00:00:00Z".into(),
            schema: schema.clone(),
        };
        let late = SchemaSnapshot {
            schema_hash: hash,
            generated_at: "2026-06-01T12:34:56Z".into(),
            schema,
        };
        assert_eq!(
            hash_schema(&early.schema).unwrap(),
            hash_schema(&late.schema).unwrap()
        );
    }

    #[test]
    fn test_canonical_json_sorts_keys_recursively() {
        let v = json!({"b": 1, "a": {"z": true, "m": [2, 1]}});
        assert_eq!(canonical_json(&v), r#"{"a":{"m":[2,1],"z":true},"b":1}"#);
    }

    #[test]
    fn test_extract_index_columns() {
        assert_eq!(
            extract_index_columns(
                "CREATE UNIQUE INDEX users_email_key ON public.users USING btree (email)"
            ),
            vec!["email"]
        );
        assert_eq!(
            extract_index_columns(
                "CREATE INDEX orders_idx ON public.orders USING btree (user_id, created_at)"
            ),
            vec!["user_id", "created_at"]
        );
        assert!(extract_index_columns("garbage").is_empty());
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let schema = SchemaBody {
            tables: vec![users_table()],
        };
        let v = serde_json::to_value(&schema).unwrap();
        let table = &v["tables"][0];
        assert_eq!(table["columns"][0]["dataType"], "integer");
        assert_eq!(table["columns"][0]["isNullable"], false);
        assert_eq!(table["primaryKey"]["name"], "users_pkey");
        assert_eq!(table["primaryKey"]["columns"][0], "id");
        assert_eq!(table["uniques"][0]["name"], "users_email_key");
    }

    #[test]
    fn test_hash_changes_when_primary_key_constraint_is_renamed() {
        let base = SchemaBody {
            tables: vec![users_table()],
        };
        let mut renamed = base.clone();
        renamed.tables[0].primary_key.as_mut().unwrap().name = "users_pk_renamed".into();
        assert_ne!(hash_schema(&base).unwrap(), hash_schema(&renamed).unwrap());
    }

    #[test]
    fn test_hash_changes_when_unique_constraint_is_renamed() {
        let base = SchemaBody {
            tables: vec![users_table()],
        };
        let mut renamed = base.clone();
        renamed.tables[0].uniques[0].name = "users_email_uq".into();
        assert_ne!(hash_schema(&base).unwrap(), hash_schema(&renamed).unwrap());
    }
}
