//! Warehouse Schema Mapping
//!
//! フィールド仕様からSDKスキーマへの変換

use serde::{Deserialize, Serialize};

use google_cloud_bigquery::http::table::{
    TableFieldMode, TableFieldSchema, TableFieldType, TableSchema,
};

use crate::error::{Result, TransferError};

/// 宛先テーブルのフィールド仕様
///
/// 設定ファイルやコードから与えるスキーマ表現。RECORD型は `fields` で
/// 入れ子にする。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl FieldSpec {
    /// 必須フィールド仕様を作成
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            mode: None,
            fields: Vec::new(),
        }
    }

    /// モードを指定した仕様を返す
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// 入れ子フィールドを指定した仕様を返す
    pub fn with_fields(mut self, fields: Vec<FieldSpec>) -> Self {
        self.fields = fields;
        self
    }
}

fn parse_type(name: &str) -> Result<TableFieldType> {
    match name.to_ascii_uppercase().as_str() {
        "STRING" => Ok(TableFieldType::String),
        "BYTES" => Ok(TableFieldType::Bytes),
        "INTEGER" | "INT64" => Ok(TableFieldType::Integer),
        "FLOAT" | "FLOAT64" => Ok(TableFieldType::Float),
        "NUMERIC" => Ok(TableFieldType::Numeric),
        "BOOLEAN" | "BOOL" => Ok(TableFieldType::Boolean),
        "TIMESTAMP" => Ok(TableFieldType::Timestamp),
        "DATE" => Ok(TableFieldType::Date),
        "TIME" => Ok(TableFieldType::Time),
        "DATETIME" => Ok(TableFieldType::Datetime),
        "RECORD" | "STRUCT" => Ok(TableFieldType::Record),
        other => Err(TransferError::Configuration(format!(
            "unsupported field type: {}",
            other
        ))),
    }
}

fn parse_mode(name: &str) -> Result<TableFieldMode> {
    match name.to_ascii_uppercase().as_str() {
        "NULLABLE" => Ok(TableFieldMode::Nullable),
        "REQUIRED" => Ok(TableFieldMode::Required),
        "REPEATED" => Ok(TableFieldMode::Repeated),
        other => Err(TransferError::Configuration(format!(
            "unsupported field mode: {}",
            other
        ))),
    }
}

fn to_field_schema(spec: &FieldSpec) -> Result<TableFieldSchema> {
    let data_type = parse_type(&spec.field_type)?;
    let nested = if spec.fields.is_empty() {
        None
    } else {
        if !matches!(data_type, TableFieldType::Record) {
            return Err(TransferError::Configuration(format!(
                "field {} has nested fields but is not a RECORD",
                spec.name
            )));
        }
        Some(
            spec.fields
                .iter()
                .map(to_field_schema)
                .collect::<Result<Vec<_>>>()?,
        )
    };

    Ok(TableFieldSchema {
        name: spec.name.clone(),
        data_type,
        mode: spec.mode.as_deref().map(parse_mode).transpose()?,
        fields: nested,
        ..Default::default()
    })
}

/// Convert a field spec tree to the SDK's table schema.
pub fn to_table_schema(specs: &[FieldSpec]) -> Result<TableSchema> {
    Ok(TableSchema {
        fields: specs
            .iter()
            .map(to_field_schema)
            .collect::<Result<Vec<_>>>()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_schema() {
        let specs = vec![
            FieldSpec::new("id", "INTEGER").with_mode("REQUIRED"),
            FieldSpec::new("name", "STRING"),
        ];
        let schema = to_table_schema(&specs).unwrap();

        assert_eq!(schema.fields.len(), 2);
        assert_eq!(schema.fields[0].name, "id");
        assert!(matches!(schema.fields[0].data_type, TableFieldType::Integer));
        assert!(matches!(
            schema.fields[0].mode,
            Some(TableFieldMode::Required)
        ));
        assert!(schema.fields[1].mode.is_none());
    }

    #[test]
    fn test_nested_record_schema() {
        let specs = vec![FieldSpec::new("payload", "RECORD").with_fields(vec![
            FieldSpec::new("key", "STRING"),
            FieldSpec::new("value", "STRING"),
        ])];
        let schema = to_table_schema(&specs).unwrap();

        let nested = schema.fields[0].fields.as_ref().unwrap();
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].name, "key");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let specs = vec![FieldSpec::new("x", "BLOB")];
        assert!(matches!(
            to_table_schema(&specs),
            Err(TransferError::Configuration(_))
        ));
    }

    #[test]
    fn test_nested_fields_on_scalar_rejected() {
        let specs =
            vec![FieldSpec::new("x", "STRING").with_fields(vec![FieldSpec::new("y", "STRING")])];
        assert!(matches!(
            to_table_schema(&specs),
            Err(TransferError::Configuration(_))
        ));
    }

    #[test]
    fn test_field_spec_deserializes_from_json() {
        let json = r#"{"name": "id", "type": "INT64", "mode": "REQUIRED"}"#;
        let spec: FieldSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.name, "id");
        assert_eq!(spec.field_type, "INT64");
        assert!(spec.fields.is_empty());
    }
}
