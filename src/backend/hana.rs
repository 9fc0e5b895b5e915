use std::io;

use odbc_api::{ColumnDescription, Connection, ConnectionOptions, DataType};
use secrecy::{ExposeSecret, SecretString};

use crate::backend::pool::{Pooled, Slots};
use crate::backend::{self, ColumnMeta, ConnectionPool, Cursor, RawValue};
use crate::config::DataSourceInfo;
use crate::error::HanaframeError;

const DRIVER: &str = "HDBODBC";

/// SQLSTATEs raised when the exchange with the server never completed.
const NETWORK_SQLSTATES: [&str; 5] = ["08001", "08S01", "08004", "HYT00", "HYT01"];

/// Connection pool for SAP HANA over the HDBODBC driver.
pub struct HanaPool {
    connection_string: SecretString,
    login_timeout_secs: u32,
    slots: Slots<Connection<'static>>,
}

impl HanaPool {
    pub fn new(datasource: &DataSourceInfo) -> Self {
        Self {
            connection_string: connection_string(datasource),
            login_timeout_secs: u32::try_from(datasource.connection_timeout_secs)
                .unwrap_or(u32::MAX),
            slots: Slots::new(datasource.pool),
        }
    }

    fn acquire(&self) -> Result<Lease<'_>, HanaframeError> {
        let pooled = self.slots.checkout(|| self.connect())?;
        Ok(Lease {
            slots: &self.slots,
            pooled: Some(pooled),
            reusable: true,
        })
    }

    fn connect(&self) -> Result<Connection<'static>, HanaframeError> {
        let env = odbc_api::environment().map_err(|e| HanaframeError::Query {
            message: format!("ODBC environment error: {e}"),
        })?;
        tracing::debug!(driver = DRIVER, "opening connection");
        env.connect_with_connection_string(
            self.connection_string.expose_secret(),
            ConnectionOptions {
                login_timeout_sec: Some(self.login_timeout_secs),
                ..Default::default()
            },
        )
        .map_err(|e| map_odbc_error("connection failed", e))
    }
}

/// A borrowed connection, checked back in on drop.
struct Lease<'p> {
    slots: &'p Slots<Connection<'static>>,
    pooled: Option<Pooled<Connection<'static>>>,
    reusable: bool,
}

impl Lease<'_> {
    fn connection(&self) -> Result<&Connection<'static>, HanaframeError> {
        self.pooled
            .as_ref()
            .map(|p| &p.item)
            .ok_or_else(|| HanaframeError::Query {
                message: "connection already released".to_string(),
            })
    }

    fn discard(&mut self) {
        self.reusable = false;
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if let Some(pooled) = self.pooled.take() {
            self.slots.checkin(pooled, self.reusable);
        }
    }
}

impl ConnectionPool for HanaPool {
    fn ping(&self) -> Result<(), HanaframeError> {
        let mut lease = self.acquire()?;
        let dead = lease
            .connection()?
            .is_dead()
            .map_err(|e| map_odbc_error("ping failed", e));
        match dead {
            Ok(false) => Ok(()),
            Ok(true) => {
                lease.discard();
                Err(HanaframeError::Network {
                    message: "connection is no longer alive".to_string(),
                    source: Some(io::Error::from(io::ErrorKind::NotConnected)),
                })
            }
            Err(err) => {
                lease.discard();
                Err(err)
            }
        }
    }

    fn with_cursor<R>(
        &self,
        sql: &str,
        timeout_secs: Option<u64>,
        consume: impl FnOnce(&mut dyn Cursor) -> Result<R, HanaframeError>,
    ) -> Result<R, HanaframeError> {
        let mut lease = self.acquire()?;
        let result = run_statement(lease.connection()?, sql, timeout_secs, consume);
        if matches!(result, Err(HanaframeError::Network { .. })) {
            lease.discard();
        }
        result
    }
}

fn run_statement<R>(
    conn: &Connection<'static>,
    sql: &str,
    timeout_secs: Option<u64>,
    consume: impl FnOnce(&mut dyn Cursor) -> Result<R, HanaframeError>,
) -> Result<R, HanaframeError> {
    let timeout = timeout_secs.map(|s| usize::try_from(s).unwrap_or(usize::MAX));
    let cursor = conn
        .execute(sql, (), timeout)
        .map_err(|e| map_odbc_error("query execution failed", e))?;

    match cursor {
        Some(cursor) => {
            let mut cursor = OdbcCursor::new(cursor)?;
            consume(&mut cursor)
        }
        None => consume(&mut NoResultSet),
    }
}

/// Row-at-a-time reader over an ODBC cursor, normalizing cells to [`RawValue`].
struct OdbcCursor<C> {
    inner: C,
    columns: Vec<ColumnMeta>,
    decimal: Vec<bool>,
    buf: Vec<u8>,
}

impl<C: odbc_api::Cursor> OdbcCursor<C> {
    fn new(mut inner: C) -> Result<Self, HanaframeError> {
        let num_cols = inner
            .num_result_cols()
            .map_err(|e| map_odbc_error("failed to get column count", e))?;
        let num_cols = u16::try_from(num_cols).unwrap_or(0);

        let mut columns = Vec::with_capacity(num_cols as usize);
        let mut decimal = Vec::with_capacity(num_cols as usize);
        for i in 1..=num_cols {
            let mut desc = ColumnDescription::default();
            inner
                .describe_col(i, &mut desc)
                .map_err(|e| map_odbc_error("failed to describe column", e))?;
            let name = desc.name_to_string().map_err(|e| HanaframeError::Query {
                message: format!("failed to decode column name {i}: {e}"),
            })?;
            decimal.push(matches!(
                desc.data_type,
                DataType::Decimal { .. } | DataType::Numeric { .. }
            ));
            columns.push(ColumnMeta::new(name, hana_type_name(&desc.data_type)));
        }

        Ok(Self {
            inner,
            columns,
            decimal,
            buf: Vec::new(),
        })
    }
}

impl<C: odbc_api::Cursor> Cursor for OdbcCursor<C> {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Vec<RawValue>>, HanaframeError> {
        let Self {
            inner,
            columns,
            decimal,
            buf,
        } = self;
        let Some(mut row) = odbc_api::Cursor::next_row(inner)
            .map_err(|e| map_odbc_error("fetch error", e))?
        else {
            return Ok(None);
        };

        let mut values = Vec::with_capacity(columns.len());
        for (idx, meta) in columns.iter().enumerate() {
            buf.clear();
            let col = idx as u16 + 1;
            let present = row
                .get_text(col, buf)
                .map_err(|e| map_odbc_error("fetch error", e))?;
            if !present {
                values.push(RawValue::Null);
                continue;
            }
            let text = String::from_utf8_lossy(buf).into_owned();
            if decimal[idx] {
                let value =
                    RawValue::parse_decimal(&text).ok_or_else(|| HanaframeError::Query {
                        message: format!("column '{}' returned a malformed decimal", meta.name),
                    })?;
                values.push(value);
            } else {
                values.push(RawValue::Text(text));
            }
        }
        Ok(Some(values))
    }
}

/// Stand-in cursor for statements that produce no result set.
struct NoResultSet;

impl Cursor for NoResultSet {
    fn columns(&self) -> &[ColumnMeta] {
        &[]
    }

    fn next_row(&mut self) -> Result<Option<Vec<RawValue>>, HanaframeError> {
        Ok(None)
    }
}

/// HANA's own name for an ODBC column type, as used by the converter registry.
fn hana_type_name(data_type: &DataType) -> String {
    let name = match data_type {
        DataType::Decimal { precision, .. } | DataType::Numeric { precision, .. } => {
            backend::fixed_point_type_name(*precision)
        }
        DataType::BigInt => "BIGINT",
        DataType::Integer => "INT",
        DataType::SmallInt => "SMALLINT",
        DataType::TinyInt => "TINYINT",
        DataType::Double => "DOUBLE",
        DataType::Float { .. } => "FLOAT",
        DataType::Real => "REAL",
        DataType::Timestamp { .. } => "TIMESTAMP",
        DataType::Date => "DATE",
        DataType::Time { .. } => "TIME",
        DataType::Bit => "BOOLEAN",
        DataType::Char { .. } => "CHAR",
        DataType::WChar { .. } => "NCHAR",
        DataType::Varchar { .. } => "VARCHAR",
        DataType::WVarchar { .. } => "NVARCHAR",
        DataType::LongVarchar { .. } => "CLOB",
        DataType::Binary { .. } => "BINARY",
        DataType::Varbinary { .. } => "VARBINARY",
        DataType::LongVarbinary { .. } => "BLOB",
        other => return format!("{other:?}"),
    };
    name.to_string()
}

fn map_odbc_error(context: &str, err: odbc_api::Error) -> HanaframeError {
    let odbc_api::Error::Diagnostics { record, .. } = &err else {
        return HanaframeError::Query {
            message: format!("{context}: {err}"),
        };
    };

    let state = record.state.as_str();
    if NETWORK_SQLSTATES.contains(&state) {
        let kind = if state.starts_with("HYT") {
            io::ErrorKind::TimedOut
        } else {
            io::ErrorKind::ConnectionRefused
        };
        return HanaframeError::Network {
            message: context.to_string(),
            source: Some(io::Error::new(kind, err.to_string())),
        };
    }

    HanaframeError::Driver {
        code: record.native_error,
        message: format!("{context}: {err}"),
        source: None,
    }
}

fn connection_string(ds: &DataSourceInfo) -> SecretString {
    let mut parts = vec![
        format!("Driver={{{DRIVER}}}"),
        format!("ServerNode={}", odbc_api::escape_attribute_value(&ds.url)),
        format!("UID={}", odbc_api::escape_attribute_value(&ds.user)),
        format!(
            "PWD={}",
            odbc_api::escape_attribute_value(ds.password.expose_secret())
        ),
    ];

    if !ds.database.is_empty() {
        parts.push(format!(
            "DATABASENAME={}",
            odbc_api::escape_attribute_value(&ds.database)
        ));
    }
    if let Some(ref schema) = ds.default_schema {
        parts.push(format!(
            "CURRENTSCHEMA={}",
            odbc_api::escape_attribute_value(schema)
        ));
    }

    if ds.tls.encrypt {
        parts.push("encrypt=TRUE".to_string());
        parts.push(format!(
            "sslValidateCertificate={}",
            if ds.tls.skip_verify { "FALSE" } else { "TRUE" }
        ));
        if let Some(ref name) = ds.tls.server_name {
            parts.push(format!(
                "sslHostNameInCertificate={}",
                odbc_api::escape_attribute_value(name)
            ));
        }
        if let Some(ref path) = ds.tls.root_cert_file {
            parts.push(format!(
                "sslTrustStore={}",
                odbc_api::escape_attribute_value(&path.to_string_lossy())
            ));
        }
    }

    SecretString::from(parts.join(";") + ";")
}
