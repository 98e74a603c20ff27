//! DDL input validation: identifier syntax, column-definition shape, the
//! column type allow-list, default-value policy and the type-conversion
//! heuristic.
//!
//! Identifiers are validated against a strict allow-list pattern and only
//! then spliced (double-quoted) into statement text. Values never travel
//! through this path: literals are escaped, everything else is parameter
//! bound by the caller.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::command::ColumnDefinition;
use crate::error::SchemaError;

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier regex"));

static PARAM_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+\(\d+(,\d+)?\)$").expect("parameterized type regex"));

static FUNC_DEFAULT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+\s*\(").expect("function default regex"));

static NUMERIC_LITERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("numeric literal regex"));

/// Base types accepted without parameters.
const SIMPLE_TYPES: &[&str] = &[
    "INT", "INTEGER", "BIGINT", "TEXT", "BOOLEAN", "DATE", "TIMESTAMP", "SERIAL",
];

/// Base types that require a parameter list, e.g. `VARCHAR(255)`.
const PARAM_TYPES: &[&str] = &["VARCHAR", "CHAR", "DECIMAL", "NUMERIC", "FLOAT"];

/// Default expressions accepted verbatim (no quoting). Anything else that
/// looks like a function call is rejected: the default clause is the one
/// place a value could smuggle SQL into DDL text.
const ALLOWED_GENERATOR_DEFAULTS: &[&str] = &["gen_random_uuid()", "now()"];

/// Keyword defaults accepted verbatim.
const KEYWORD_DEFAULTS: &[&str] = &["current_timestamp", "current_date", "null"];

/// True if `name` is a syntactically valid SQL identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENT_RE.is_match(name)
}

/// Validates an identifier, naming `what` (e.g. "table", "column") in the
/// rejection message.
pub fn validate_identifier(name: &str, what: &str) -> Result<(), SchemaError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(SchemaError::validation(format!(
            "Invalid {} name \"{}\". Use [A-Za-z_][A-Za-z0-9_]{{0,62}}",
            what, name
        )))
    }
}

/// Validates a table name.
pub fn validate_table_name(name: &str) -> Result<(), SchemaError> {
    validate_identifier(name, "table")
}

/// Double-quotes a previously validated identifier for statement text.
///
/// Must only be called after [`validate_identifier`]; the pattern excludes
/// embedded quotes so no escaping is needed.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Validates a column type against the allow-list.
///
/// Returns the uppercased type for statement text.
pub fn validate_column_type(ty: &str) -> Result<String, SchemaError> {
    let upper = ty.trim().to_uppercase();
    let base = upper.split('(').next().unwrap_or("");

    let valid_simple = SIMPLE_TYPES.contains(&base) && base == upper;
    let valid_param = PARAM_TYPES.contains(&base) && PARAM_TYPE_RE.is_match(&upper);

    if valid_simple || valid_param {
        Ok(upper)
    } else {
        Err(SchemaError::validation(format!(
            "Type \"{}\" is not allowed or is malformed",
            ty
        )))
    }
}

/// Renders a default value for a column definition.
///
/// Accepts three shapes: an allow-listed generator expression (verbatim), a
/// bare numeric/boolean/keyword literal (verbatim), or a string literal
/// (single-quoted with embedded quotes doubled). Any other function-shaped
/// expression is rejected.
pub fn render_default(raw: &str) -> Result<String, SchemaError> {
    let trimmed = raw.trim();
    let lowered = trimmed.to_lowercase();

    if KEYWORD_DEFAULTS.contains(&lowered.as_str()) {
        return Ok(trimmed.to_string());
    }

    if FUNC_DEFAULT_RE.is_match(trimmed) {
        if ALLOWED_GENERATOR_DEFAULTS.contains(&lowered.as_str()) {
            return Ok(lowered);
        }
        return Err(SchemaError::validation(format!(
            "Default expression \"{}\" is not allowed; only {} are accepted",
            trimmed,
            ALLOWED_GENERATOR_DEFAULTS.join(", ")
        )));
    }

    if NUMERIC_LITERAL_RE.is_match(trimmed) || lowered == "true" || lowered == "false" {
        return Ok(trimmed.to_string());
    }

    Ok(format!("'{}'", trimmed.replace('\'', "''")))
}

/// Validates a column definition.
///
/// `index` is the zero-based position in the submitted column list, used in
/// rejection messages.
pub fn validate_column(column: &ColumnDefinition, index: usize) -> Result<(), SchemaError> {
    let context = format!("Column #{}", index + 1);

    if column.name.is_empty() {
        return Err(SchemaError::validation(format!(
            "{}: \"name\" is required",
            context
        )));
    }
    validate_identifier(&column.name, "column")?;
    validate_column_type(&column.data_type)
        .map_err(|e| SchemaError::validation(format!("{}: {}", context, e.message)))?;

    if column.is_primary && column.is_nullable {
        return Err(SchemaError::validation(format!(
            "{}: a primary key column cannot be nullable",
            context
        )));
    }

    if let Some(default) = &column.default {
        render_default(default)
            .map_err(|e| SchemaError::validation(format!("{}: {}", context, e.message)))?;
    }

    if let Some(check) = &column.check {
        if check.contains(';') || check.contains("--") {
            return Err(SchemaError::validation(format!(
                "{}: check expression contains disallowed characters",
                context
            )));
        }
    }

    Ok(())
}

/// Type families the conversion heuristic reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeFamily {
    Numeric,
    Textual,
    Boolean,
    Temporal,
    Uuid,
    Unknown,
}

/// Normalizes a type name for family comparison: lowercased, parameters
/// stripped, common aliases folded.
fn normalize_type_name(ty: &str) -> String {
    let lowered = ty.trim().to_lowercase();
    let base = lowered.split('(').next().unwrap_or("").trim().to_string();
    match base.as_str() {
        "int" | "int4" => "integer".to_string(),
        "int2" => "smallint".to_string(),
        "int8" => "bigint".to_string(),
        "varchar" => "character varying".to_string(),
        "char" | "bpchar" => "character".to_string(),
        "bool" => "boolean".to_string(),
        "float" | "float8" => "double precision".to_string(),
        "float4" => "real".to_string(),
        "timestamptz" => "timestamp with time zone".to_string(),
        "timestamp" => "timestamp without time zone".to_string(),
        "time" => "time without time zone".to_string(),
        other => other.to_string(),
    }
}

fn family_of(normalized: &str) -> TypeFamily {
    match normalized {
        "smallint" | "integer" | "bigint" | "numeric" | "decimal" | "real"
        | "double precision" | "serial" | "bigserial" => TypeFamily::Numeric,
        "text" | "character varying" | "character" => TypeFamily::Textual,
        "boolean" => TypeFamily::Boolean,
        "date"
        | "timestamp without time zone"
        | "timestamp with time zone"
        | "time without time zone"
        | "time with time zone" => TypeFamily::Temporal,
        "uuid" => TypeFamily::Uuid,
        _ => TypeFamily::Unknown,
    }
}

/// Decides whether a column type change needs an explicit `USING` cast.
///
/// Hand-maintained family table: textual sources converting to
/// numeric/boolean/temporal/uuid and numeric sources converting to
/// boolean/temporal always need a cast. The table is necessarily incomplete
/// for exotic pairs, so it fails closed: when either side's family is
/// unknown and the types differ, a cast is required.
pub fn requires_using(from_type: &str, to_type: &str) -> bool {
    let from = normalize_type_name(from_type);
    let to = normalize_type_name(to_type);
    if from == to {
        return false;
    }

    let from_family = family_of(&from);
    let to_family = family_of(&to);

    if from_family == TypeFamily::Unknown || to_family == TypeFamily::Unknown {
        return true;
    }

    match (from_family, to_family) {
        (
            TypeFamily::Textual,
            TypeFamily::Numeric | TypeFamily::Boolean | TypeFamily::Temporal | TypeFamily::Uuid,
        ) => true,
        (TypeFamily::Numeric, TypeFamily::Boolean | TypeFamily::Temporal) => true,
        _ => false,
    }
}
