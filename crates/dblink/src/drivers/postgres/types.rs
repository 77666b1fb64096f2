//! Conversions between [`SqlValue`] and PostgreSQL wire values.

use std::error::Error;

use bytes::BytesMut;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

use crate::core::schema::ColumnMeta;
use crate::core::value::{Row, SqlValue};

type BoxError = Box<dyn Error + Sync + Send>;

/// Integers are widened or narrowed to the parameter's declared type so
/// callers need not know whether a column is `int4` or `int8`.
impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::I16(v) => integer_to_sql(i64::from(*v), ty, out),
            SqlValue::I32(v) => integer_to_sql(i64::from(*v), ty, out),
            SqlValue::I64(v) => integer_to_sql(*v, ty, out),
            SqlValue::F32(v) => match *ty {
                Type::FLOAT8 => f64::from(*v).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            SqlValue::F64(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            SqlValue::Decimal(v) => v.to_sql(ty, out),
            SqlValue::Text(v) => match *ty {
                Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(v)?.to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            SqlValue::Bytes(v) => v.to_sql(ty, out),
            SqlValue::Uuid(v) => v.to_sql(ty, out),
            SqlValue::Date(v) => v.to_sql(ty, out),
            SqlValue::Time(v) => v.to_sql(ty, out),
            SqlValue::DateTime(v) => v.to_sql(ty, out),
            SqlValue::DateTimeOffset(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn integer_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::TEXT | Type::VARCHAR => v.to_string().to_sql(ty, out),
        _ => v.to_sql(ty, out),
    }
}

/// Borrow values as driver parameters.
pub(crate) fn params(values: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

/// Column shape as reported by a prepared statement.
pub(crate) fn column_meta(column: &tokio_postgres::Column) -> ColumnMeta {
    ColumnMeta::new(column.name(), column.type_().name())
}

/// Decode a whole row.
pub(crate) fn decode_row(row: &tokio_postgres::Row) -> Row {
    (0..row.len()).map(|idx| decode_value(row, idx)).collect()
}

fn decode_value(row: &tokio_postgres::Row, idx: usize) -> SqlValue {
    let ty = row.columns()[idx].type_().clone();
    let value = match ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx).map(|v| v.map(SqlValue::Bool)),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx).map(|v| v.map(SqlValue::I16)),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx).map(|v| v.map(SqlValue::I32)),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx).map(|v| v.map(SqlValue::I64)),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx).map(|v| v.map(SqlValue::F32)),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).map(|v| v.map(SqlValue::F64)),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)
            .map(|v| v.map(SqlValue::Decimal)),
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)
            .map(|v| v.map(SqlValue::Uuid)),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .map(|v| v.map(SqlValue::Date)),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(idx)
            .map(|v| v.map(SqlValue::Time)),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .map(|v| v.map(SqlValue::DateTime)),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<FixedOffset>>>(idx)
            .map(|v| v.map(SqlValue::DateTimeOffset)),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map(|v| v.map(SqlValue::Bytes)),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .map(|v| v.map(|j| SqlValue::Text(j.to_string()))),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .map(|v| v.map(SqlValue::Text)),
    };
    // Types without a native mapping (arrays, ranges, ...) come back as NULL.
    value.ok().flatten().unwrap_or(SqlValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &SqlValue, ty: &Type) -> Option<Vec<u8>> {
        let mut buf = BytesMut::new();
        match value.to_sql_checked(ty, &mut buf).unwrap() {
            IsNull::Yes => None,
            IsNull::No => Some(buf.to_vec()),
        }
    }

    #[test]
    fn test_integers_fit_declared_width() {
        assert_eq!(encode(&SqlValue::I64(7), &Type::INT4), Some(vec![0, 0, 0, 7]));
        assert_eq!(encode(&SqlValue::I32(7), &Type::INT8), Some(vec![0, 0, 0, 0, 0, 0, 0, 7]));
        assert_eq!(encode(&SqlValue::I16(1), &Type::INT2), Some(vec![0, 1]));

        let mut buf = BytesMut::new();
        assert!(SqlValue::I64(1 << 40).to_sql_checked(&Type::INT4, &mut buf).is_err());
    }

    #[test]
    fn test_null_and_text() {
        assert_eq!(encode(&SqlValue::Null, &Type::INT4), None);
        assert_eq!(
            encode(&SqlValue::Text("ab".into()), &Type::TEXT),
            Some(b"ab".to_vec())
        );
    }
}
