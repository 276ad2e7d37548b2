//! PostgreSQL type conversion utilities

use crate::backend::{blob_to_json, float_to_json};
use crate::error::{DbError, DbResult};
use crate::row::Row;
use crate::value::{SqlValue, iso_timestamp};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::error::Error;
use tokio_postgres::types::{FromSqlOwned, IsNull, Kind, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn Error + Sync + Send>;

/// Binds a [`SqlValue`] to whatever type the server inferred for its placeholder.
///
/// Normalized payloads carry timestamps, JSON and UUIDs as text, so text is
/// parsed into the target type when the column is not textual. A value with
/// no sensible encoding for the target type is rejected before it is sent.
#[derive(Debug)]
pub struct PgParam<'a>(pub &'a SqlValue);

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self.0 {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                Type::JSON | Type::JSONB => JsonValue::Bool(*b).to_sql(ty, out),
                _ if is_textual(ty) => b.to_string().as_str().to_sql(ty, out),
                _ => Err(unsupported("a boolean", ty)),
            },
            SqlValue::Int(i) => int_to_sql(*i, ty, out),
            SqlValue::Float(f) => float_to_sql(*f, ty, out),
            SqlValue::Text(s) => text_to_sql(s, ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn unsupported(what: &str, ty: &Type) -> BoxError {
    format!("cannot bind {what} to a parameter of type {ty}").into()
}

/// Types that take a value's text as-is.
fn is_textual(ty: &Type) -> bool {
    <&str as ToSql>::accepts(ty) || matches!(ty.kind(), Kind::Enum(_))
}

fn int_to_sql(i: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::INT8 => i.to_sql(ty, out),
        Type::OID => u32::try_from(i)?.to_sql(ty, out),
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(i).to_sql(ty, out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        Type::JSON | Type::JSONB => JsonValue::from(i).to_sql(ty, out),
        _ if is_textual(ty) => i.to_string().as_str().to_sql(ty, out),
        _ => Err(unsupported("an integer", ty)),
    }
}

fn float_to_sql(f: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::FLOAT8 => f.to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(f)?.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 if f.fract() == 0.0 => int_to_sql(f as i64, ty, out),
        Type::JSON | Type::JSONB => float_to_json(f).to_sql(ty, out),
        _ if is_textual(ty) => f.to_string().as_str().to_sql(ty, out),
        _ => Err(unsupported("a float", ty)),
    }
}

fn text_to_sql(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::JSON | Type::JSONB => serde_json::from_str::<JsonValue>(s)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(s)?
            .with_timezone(&Utc)
            .to_sql(ty, out),
        Type::TIMESTAMP => parse_naive_timestamp(s)?.to_sql(ty, out),
        Type::DATE => parse_date(s)?.to_sql(ty, out),
        Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => {
            int_to_sql(s.trim().parse::<i64>()?, ty, out)
        }
        Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => s.trim().parse::<Decimal>()?.to_sql(ty, out),
        Type::BOOL => s.trim().parse::<bool>()?.to_sql(ty, out),
        Type::BYTEA => s.as_bytes().to_sql(ty, out),
        _ if is_textual(ty) => s.to_sql(ty, out),
        _ => Err(unsupported("text", ty)),
    }
}

fn parse_naive_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
}

fn parse_date(s: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc).date_naive()))
}

/// Wrap normalized params for binding.
pub fn to_pg_params(params: &[SqlValue]) -> Vec<PgParam<'_>> {
    params.iter().map(PgParam).collect()
}

/// Build parameter references for query execution
pub fn params_as_refs<'a>(params: &'a [PgParam<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

/// Convert a tokio-postgres row into a [`Row`].
pub fn from_pg_row(row: &tokio_postgres::Row) -> DbResult<Row> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..columns.len())
        .map(|i| from_pg_value(row, i))
        .collect::<DbResult<Vec<_>>>()?;
    Ok(Row::new(columns, values))
}

/// A NUMERIC as a JSON number, or as text when JSON cannot hold it.
pub fn numeric_to_json(d: Decimal) -> JsonValue {
    let text = d.to_string();
    text.parse::<serde_json::Number>()
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::String(text))
}

fn timestamptz_to_json(ts: DateTime<Utc>) -> JsonValue {
    JsonValue::String(iso_timestamp(&ts))
}

fn timestamp_to_json(ts: NaiveDateTime) -> JsonValue {
    JsonValue::String(ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
}

fn date_to_json(d: NaiveDate) -> JsonValue {
    JsonValue::String(d.to_string())
}

fn uuid_to_json(u: uuid::Uuid) -> JsonValue {
    JsonValue::String(u.to_string())
}

/// Decode a one-dimensional array column; NULL elements stay `null`.
fn array<T: FromSqlOwned>(
    row: &tokio_postgres::Row,
    index: usize,
    element: impl Fn(T) -> JsonValue,
) -> DbResult<Option<JsonValue>> {
    let items = row.try_get::<_, Option<Vec<Option<T>>>>(index)?;
    Ok(items.map(|items| {
        JsonValue::Array(
            items
                .into_iter()
                .map(|item| item.map(&element).unwrap_or(JsonValue::Null))
                .collect(),
        )
    }))
}

/// Convert one PostgreSQL column value to JSON.
fn from_pg_value(row: &tokio_postgres::Row, index: usize) -> DbResult<JsonValue> {
    let column = &row.columns()[index];
    let ty = column.type_();

    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(index)?.map(JsonValue::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(index)?.map(JsonValue::from),
        Type::INT4 => row.try_get::<_, Option<i32>>(index)?.map(JsonValue::from),
        Type::INT8 => row.try_get::<_, Option<i64>>(index)?.map(JsonValue::from),
        Type::OID => row.try_get::<_, Option<u32>>(index)?.map(JsonValue::from),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(index)?
            .map(|v| float_to_json(v as f64)),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index)?.map(float_to_json),
        Type::NUMERIC => row.try_get::<_, Option<Decimal>>(index)?.map(numeric_to_json),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => row
            .try_get::<_, Option<String>>(index)?
            .map(JsonValue::String),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<JsonValue>>(index)?,
        Type::UUID => row.try_get::<_, Option<uuid::Uuid>>(index)?.map(uuid_to_json),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)?
            .map(timestamptz_to_json),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)?
            .map(timestamp_to_json),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(index)?.map(date_to_json),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(index)?
            .map(|b| blob_to_json(&b)),
        Type::BOOL_ARRAY => array(row, index, JsonValue::Bool)?,
        Type::INT2_ARRAY => array::<i16>(row, index, JsonValue::from)?,
        Type::INT4_ARRAY => array::<i32>(row, index, JsonValue::from)?,
        Type::INT8_ARRAY => array::<i64>(row, index, JsonValue::from)?,
        Type::FLOAT4_ARRAY => array::<f32>(row, index, |v| float_to_json(v as f64))?,
        Type::FLOAT8_ARRAY => array(row, index, float_to_json)?,
        Type::NUMERIC_ARRAY => array(row, index, numeric_to_json)?,
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::BPCHAR_ARRAY | Type::NAME_ARRAY => {
            array(row, index, JsonValue::String)?
        }
        Type::JSON_ARRAY | Type::JSONB_ARRAY => array(row, index, |v: JsonValue| v)?,
        Type::UUID_ARRAY => array(row, index, uuid_to_json)?,
        Type::TIMESTAMPTZ_ARRAY => array(row, index, timestamptz_to_json)?,
        Type::TIMESTAMP_ARRAY => array(row, index, timestamp_to_json)?,
        Type::DATE_ARRAY => array(row, index, date_to_json)?,
        // citext and friends decode as text; anything else has no JSON mapping
        _ => row
            .try_get::<_, Option<String>>(index)
            .map_err(|_| {
                DbError::Serialization(format!(
                    "column '{}': no JSON mapping for type {}",
                    column.name(),
                    ty
                ))
            })?
            .map(JsonValue::String),
    };

    Ok(value.unwrap_or(JsonValue::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_postgres::types::FromSql;

    fn encode(value: SqlValue, ty: &Type) -> Result<(IsNull, BytesMut), BoxError> {
        let mut out = BytesMut::new();
        let is_null = PgParam(&value).to_sql(ty, &mut out)?;
        Ok((is_null, out))
    }

    fn decode_numeric(value: SqlValue) -> Decimal {
        let (_, out) = encode(value, &Type::NUMERIC).unwrap();
        Decimal::from_sql(&Type::NUMERIC, &out).unwrap()
    }

    #[test]
    fn null_binds_as_null() {
        let (is_null, out) = encode(SqlValue::Null, &Type::INT4).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());
    }

    #[test]
    fn ints_follow_column_width() {
        assert_eq!(encode(SqlValue::Int(7), &Type::INT2).unwrap().1.len(), 2);
        assert_eq!(encode(SqlValue::Int(7), &Type::INT4).unwrap().1.len(), 4);
        assert_eq!(encode(SqlValue::Int(7), &Type::INT8).unwrap().1.len(), 8);
        assert!(encode(SqlValue::Int(i64::MAX), &Type::INT4).is_err());
    }

    #[test]
    fn numeric_columns_use_decimal_encoding() {
        assert_eq!(decode_numeric(SqlValue::Int(5)), Decimal::from(5));
        assert_eq!(decode_numeric(SqlValue::from("5")), Decimal::from(5));
        assert_eq!(decode_numeric(SqlValue::Float(12.5)), Decimal::new(125, 1));
        assert_eq!(decode_numeric(SqlValue::from("12.5")), Decimal::new(125, 1));

        assert!(encode(SqlValue::from("twelve"), &Type::NUMERIC).is_err());
        assert!(encode(SqlValue::Float(f64::NAN), &Type::NUMERIC).is_err());
    }

    #[test]
    fn mismatched_scalars_are_rejected() {
        assert!(encode(SqlValue::Int(5), &Type::TIMESTAMPTZ).is_err());
        assert!(encode(SqlValue::Int(5), &Type::UUID).is_err());
        assert!(encode(SqlValue::Float(1.5), &Type::DATE).is_err());
        assert!(encode(SqlValue::Bool(true), &Type::INT4).is_err());
        assert!(encode(SqlValue::from("x"), &Type::INT4_ARRAY).is_err());
    }

    #[test]
    fn text_is_parsed_for_typed_columns() {
        let (_, out) = encode(SqlValue::from(r#"{"name":"Jhon"}"#), &Type::JSONB).unwrap();
        // jsonb binary format: version byte then the JSON text
        assert_eq!(out[0], 1);
        assert_eq!(&out[1..], br#"{"name":"Jhon"}"#);

        let (_, out) = encode(SqlValue::from("2024-08-10T00:00:00.000Z"), &Type::TIMESTAMPTZ).unwrap();
        assert_eq!(out.len(), 8);

        assert!(encode(SqlValue::from("not a date"), &Type::TIMESTAMPTZ).is_err());
        assert!(encode(SqlValue::from("nope"), &Type::UUID).is_err());
    }

    #[test]
    fn scalars_stay_text_for_text_columns() {
        let (_, out) = encode(SqlValue::from("data"), &Type::TEXT).unwrap();
        assert_eq!(&out[..], b"data");

        let (_, out) = encode(SqlValue::Int(42), &Type::VARCHAR).unwrap();
        assert_eq!(&out[..], b"42");
    }

    #[test]
    fn numeric_reads_as_json_number() {
        assert_eq!(numeric_to_json(Decimal::new(15, 1)), json!(1.5));
        assert_eq!(numeric_to_json(Decimal::from(7)), json!(7));
        assert_eq!(numeric_to_json(Decimal::new(-250, 2)), json!(-2.5));
    }

    #[test]
    fn params_keep_order() {
        let params = vec![SqlValue::from("a"), SqlValue::Int(1)];
        let wrapped = to_pg_params(&params);
        assert_eq!(params_as_refs(&wrapped).len(), 2);
        assert_eq!(wrapped[1].0, &SqlValue::Int(1));
    }
}
