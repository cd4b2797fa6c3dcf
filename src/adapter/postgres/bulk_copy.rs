//! PostgreSQL Bulk Copy
//!
//! PostgreSQLネイティブCOPYプロトコルによるバルク転送
//!
//! Streams between delimited files and tables over `COPY ... TO STDOUT` /
//! `COPY ... FROM STDIN`, with format options built from a
//! [`TransferConfig`]. The `tokio_postgres::Client` is owned by the caller
//! and borrowed per operation; no pooling lives here. Truncate-and-load runs
//! inside one transaction so a failed load rolls the truncate back.

use std::path::Path;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use log::debug;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_postgres::error::SqlState;
use tokio_postgres::Client;

use crate::domain::entities::record_set::RecordSet;
use crate::domain::entities::transfer_config::TransferConfig;
use crate::domain::services::row_codec::RowCodec;
use crate::error::{Result, TransferError};

/// Read/send chunk size for COPY streaming.
const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Quote a PostgreSQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name.
fn quote_table(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// Quote a string as a SQL literal.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn format_options(config: &TransferConfig) -> Result<String> {
    let delimiter = config.delimiter_byte()? as char;
    Ok(format!(
        "FORMAT CSV, HEADER {header}, NULL {null}, DELIMITER {delimiter}, ENCODING {encoding}",
        header = config.header,
        null = sql_literal(&config.null_token),
        delimiter = sql_literal(&delimiter.to_string()),
        encoding = sql_literal(&config.encoding),
    ))
}

fn column_list(config: &TransferConfig) -> String {
    match &config.columns {
        Some(columns) => format!(
            " ({})",
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
        ),
        None => String::new(),
    }
}

/// Build the `COPY (query) TO STDOUT` statement for a query extract.
pub fn copy_out_query_sql(query: &str, config: &TransferConfig) -> Result<String> {
    Ok(format!(
        "COPY ({}) TO STDOUT WITH ({})",
        query,
        format_options(config)?
    ))
}

/// Build the `COPY table TO STDOUT` statement for a table dump.
pub fn copy_out_table_sql(table: &str, config: &TransferConfig) -> Result<String> {
    Ok(format!(
        "COPY {}{} TO STDOUT WITH ({})",
        quote_table(table),
        column_list(config),
        format_options(config)?
    ))
}

/// Build the `COPY table FROM STDIN` statement for a load.
pub fn copy_in_sql(table: &str, config: &TransferConfig) -> Result<String> {
    Ok(format!(
        "COPY {}{} FROM STDIN WITH ({})",
        quote_table(table),
        column_list(config),
        format_options(config)?
    ))
}

/// Map an error raised while starting a COPY or executing a statement.
fn query_error(e: tokio_postgres::Error) -> TransferError {
    match e.as_db_error() {
        Some(db) => TransferError::Query(db.message().to_string()),
        None => TransferError::Remote(e.to_string()),
    }
}

/// Map an error raised while feeding or finishing a COPY FROM STDIN.
/// PostgreSQL reports the offending row as `COPY table, line N` context.
fn load_error(table: &str, e: tokio_postgres::Error) -> TransferError {
    match e.as_db_error() {
        Some(db) if *db.code() == SqlState::BAD_COPY_FILE_FORMAT
            || *db.code() == SqlState::UNDEFINED_COLUMN =>
        {
            TransferError::Schema(db.message().to_string())
        }
        Some(db) => {
            let message = match db.where_() {
                Some(context) => format!("{} ({})", db.message(), context),
                None => db.message().to_string(),
            };
            TransferError::load(table, message)
        }
        None => TransferError::Remote(e.to_string()),
    }
}

/// Execute a single SQL statement, returning the affected row count.
pub async fn execute(client: &Client, sql: &str) -> Result<u64> {
    client.execute(sql, &[]).await.map_err(query_error)
}

/// Truncate a table.
pub async fn truncate(client: &Client, table: &str) -> Result<()> {
    let sql = format!("TRUNCATE TABLE {}", quote_table(table));
    execute(client, &sql).await?;
    Ok(())
}

/// Extract the result of a SELECT query into an async writer as delimited
/// text, delegating to the server's native bulk export. Returns the number
/// of bytes written.
pub async fn extract_to_writer<W>(
    client: &Client,
    query: &str,
    mut writer: W,
    config: &TransferConfig,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let sql = copy_out_query_sql(query, config)?;
    copy_out(client, &sql, &mut writer).await
}

/// Extract the result of a SELECT query into a file.
pub async fn extract_to_path(
    client: &Client,
    query: &str,
    path: &Path,
    config: &TransferConfig,
) -> Result<u64> {
    let file = tokio::fs::File::create(path).await?;
    let mut writer = tokio::io::BufWriter::new(file);
    let bytes = extract_to_writer(client, query, &mut writer, config).await?;
    writer.flush().await?;
    Ok(bytes)
}

/// Dump a table (optionally restricted to `config.columns`) into a file.
pub async fn dump_to_path(
    client: &Client,
    table: &str,
    path: &Path,
    config: &TransferConfig,
) -> Result<u64> {
    let sql = copy_out_table_sql(table, config)?;
    let file = tokio::fs::File::create(path).await?;
    let mut writer = tokio::io::BufWriter::new(file);
    let bytes = copy_out(client, &sql, &mut writer).await?;
    writer.flush().await?;
    Ok(bytes)
}

async fn copy_out<W>(client: &Client, sql: &str, writer: &mut W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    debug!("starting bulk export: {}", sql);
    let stream = client.copy_out(sql).await.map_err(query_error)?;
    tokio::pin!(stream);

    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|e| TransferError::Remote(e.to_string()))?;
        writer.write_all(&bytes).await?;
        written += bytes.len() as u64;
    }
    Ok(written)
}

/// Load delimited text from an async reader into a table.
///
/// Runs one scoped transaction: an optional `TRUNCATE` (when
/// `config.truncate_destination`) followed by `COPY ... FROM STDIN`. The
/// commit happens only after the COPY completes, so a failed load leaves a
/// truncated table rolled back. Returns the number of rows loaded.
pub async fn load_from_reader<R>(
    client: &mut Client,
    table: &str,
    mut reader: R,
    config: &TransferConfig,
) -> Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    // With a header present, a column-count mismatch against
    // `config.columns` is detectable before anything is sent.
    let mut header_line: Vec<u8> = Vec::new();
    if config.header {
        reader.read_until(b'\n', &mut header_line).await?;
        if !header_line.is_empty() {
            if let Some(expected) = config.column_count() {
                let found = count_header_fields(&header_line, config)?;
                if found != expected {
                    return Err(TransferError::Schema(format!(
                        "source has {} header fields but {} columns were requested",
                        found, expected
                    )));
                }
            }
        }
    }

    let sql = copy_in_sql(table, config)?;
    debug!("starting bulk load: {}", sql);

    let tx = client
        .transaction()
        .await
        .map_err(|e| TransferError::Remote(e.to_string()))?;

    if config.truncate_destination {
        let truncate_sql = format!("TRUNCATE TABLE {}", quote_table(table));
        tx.execute(&truncate_sql, &[]).await.map_err(query_error)?;
    }

    let sink = tx.copy_in(&sql).await.map_err(query_error)?;
    tokio::pin!(sink);

    // The header line was consumed for validation; the server still skips
    // it via HEADER true, so it is forwarded as-is.
    if !header_line.is_empty() {
        sink.send(bytes::Bytes::from(header_line))
            .await
            .map_err(|e| load_error(table, e))?;
    }

    let mut buf = BytesMut::with_capacity(COPY_CHUNK_SIZE);
    loop {
        let n = reader.read_buf(&mut buf).await?;
        if n == 0 {
            break;
        }
        sink.send(buf.split().freeze())
            .await
            .map_err(|e| load_error(table, e))?;
    }

    let rows = sink.finish().await.map_err(|e| load_error(table, e))?;
    tx.commit()
        .await
        .map_err(|e| TransferError::Remote(e.to_string()))?;

    debug!("loaded {} rows into {}", rows, table);
    Ok(rows)
}

/// Load delimited text from a file into a table.
pub async fn load_from_path(
    client: &mut Client,
    table: &str,
    path: &Path,
    config: &TransferConfig,
) -> Result<u64> {
    let file = tokio::fs::File::open(path).await?;
    load_from_reader(client, table, tokio::io::BufReader::new(file), config).await
}

/// Load an in-memory record set into a table via a scoped temporary file.
/// The temporary file is deleted on every exit path.
pub async fn load_records(
    client: &mut Client,
    table: &str,
    records: &RecordSet,
    config: &TransferConfig,
) -> Result<u64> {
    let mut temp = NamedTempFile::new()?;
    RowCodec::encode_to_writer(records, config, temp.as_file_mut())?;
    load_from_path(client, table, temp.path(), config).await
}

/// Load every regular file under `dir` (sorted by path) into a table.
/// When `config.truncate_destination` is set, only the first shard
/// truncates; later shards append.
pub async fn load_from_dir(
    client: &mut Client,
    table: &str,
    dir: &Path,
    config: &TransferConfig,
) -> Result<u64> {
    let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(TransferError::Configuration(format!(
            "no shard files found under {}",
            dir.display()
        )));
    }

    let mut total = 0u64;
    let append_config = config.clone().with_truncate(false);
    for (i, path) in paths.iter().enumerate() {
        let shard_config = if i == 0 { config } else { &append_config };
        total += load_from_path(client, table, path, shard_config).await?;
    }
    Ok(total)
}

fn count_header_fields(header_line: &[u8], config: &TransferConfig) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter_byte()?)
        .has_headers(false)
        .from_reader(header_line);
    let mut record = csv::StringRecord::new();
    reader.read_record(&mut record)?;
    Ok(record.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("events"), "\"events\"");
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn test_quote_table_qualified() {
        assert_eq!(quote_table("analytics.events"), "\"analytics\".\"events\"");
        assert_eq!(quote_table("events"), "\"events\"");
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(sql_literal(""), "''");
        assert_eq!(sql_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_copy_out_query_sql() {
        let config = TransferConfig::new().with_delimiter(',');
        let sql = copy_out_query_sql("SELECT id, name FROM t", &config).unwrap();
        assert_eq!(
            sql,
            "COPY (SELECT id, name FROM t) TO STDOUT WITH \
             (FORMAT CSV, HEADER true, NULL '', DELIMITER ',', ENCODING 'UTF8')"
        );
    }

    #[test]
    fn test_copy_out_table_sql_with_columns() {
        let config = TransferConfig::new()
            .with_columns(vec!["a".to_string(), "c".to_string()]);
        let sql = copy_out_table_sql("t", &config).unwrap();
        assert!(sql.starts_with("COPY \"t\" (\"a\", \"c\") TO STDOUT"));
    }

    #[test]
    fn test_copy_in_sql_column_subset() {
        let config = TransferConfig::new()
            .with_delimiter(',')
            .with_columns(vec!["a".to_string(), "c".to_string()]);
        let sql = copy_in_sql("t", &config).unwrap();
        assert_eq!(
            sql,
            "COPY \"t\" (\"a\", \"c\") FROM STDIN WITH \
             (FORMAT CSV, HEADER true, NULL '', DELIMITER ',', ENCODING 'UTF8')"
        );
    }

    #[test]
    fn test_copy_in_sql_no_header_custom_null() {
        let config = TransferConfig::new()
            .with_header(false)
            .with_null_token("\\N");
        let sql = copy_in_sql("t", &config).unwrap();
        assert!(sql.contains("HEADER false"));
        assert!(sql.contains("NULL '\\N'"));
        assert!(sql.contains("DELIMITER '\t'"));
    }

    #[test]
    fn test_count_header_fields() {
        let config = TransferConfig::new().with_delimiter(',');
        assert_eq!(count_header_fields(b"a,b,c\n", &config).unwrap(), 3);
        assert_eq!(count_header_fields(b"\"x,y\",b\n", &config).unwrap(), 2);
    }
}
