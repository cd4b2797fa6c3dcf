//! # Delimited Row Codec
//!
//! レコードセットと区切りテキストストリームの相互変換サービス
//!
//! 値の型変換は行わず、すべてテキストのまま往復させる。既知の制限:
//! NULLトークンが空文字列のとき、空フィールドと欠損値はデコード時に
//! 区別できない。実データに現れないNULLトークンを選ぶのは呼び出し側の
//! 責任。

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::domain::entities::record_set::{Record, RecordSet};
use crate::domain::entities::transfer_config::TransferConfig;
use crate::error::{Result, TransferError};

/// 区切りテキストコーデック
pub struct RowCodec;

impl RowCodec {
    /// レコードセットをライターへエンコード
    ///
    /// ヘッダ行は `config.columns`、なければレコードセットのカラム名を
    /// 使う。`None` フィールドはNULLトークンとして書き出される。
    pub fn encode_to_writer<W: Write>(
        records: &RecordSet,
        config: &TransferConfig,
        writer: W,
    ) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(config.delimiter_byte()?)
            .from_writer(writer);

        if config.header {
            let columns = config
                .columns
                .as_deref()
                .or_else(|| records.columns())
                .ok_or_else(|| {
                    TransferError::Configuration(
                        "header requested but no column names available".to_string(),
                    )
                })?;
            csv_writer.write_record(columns)?;
        }

        for record in records.records() {
            let fields = record
                .iter()
                .map(|field| field.as_deref().unwrap_or(&config.null_token));
            csv_writer.write_record(fields)?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    /// レコードセットをファイルへエンコード
    pub fn encode_to_path(
        records: &RecordSet,
        config: &TransferConfig,
        path: &Path,
    ) -> Result<()> {
        let file = File::create(path)?;
        Self::encode_to_writer(records, config, BufWriter::new(file))
    }

    /// ストリームから全レコードをデコード
    pub fn decode_from_reader<R: Read>(reader: R, config: &TransferConfig) -> Result<RecordSet> {
        let mut record_reader = RecordReader::new(reader, config)?;
        let mut records = Vec::new();
        for record in &mut record_reader {
            records.push(record?);
        }
        Ok(match record_reader.into_columns() {
            Some(columns) => RecordSet::with_columns(columns, records),
            None => RecordSet::new(records),
        })
    }

    /// ファイルから全レコードをデコード
    pub fn decode_from_path(path: &Path, config: &TransferConfig) -> Result<RecordSet> {
        let file = File::open(path)?;
        Self::decode_from_reader(BufReader::new(file), config)
    }
}

/// 遅延デコード用のレコードリーダ
///
/// `config.header` が有効な場合、先頭行をカラム名として消費する。
/// イテレーション途中の巻き戻しはできず、やり直すにはストリームを
/// 開き直す。
pub struct RecordReader<R: Read> {
    reader: csv::Reader<R>,
    columns: Option<Vec<String>>,
    null_token: String,
}

impl<R: Read> RecordReader<R> {
    /// リーダを作成し、設定に応じてヘッダ行を消費する
    pub fn new(reader: R, config: &TransferConfig) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(config.delimiter_byte()?)
            .has_headers(config.header)
            .from_reader(reader);

        let columns = if config.header {
            let headers = csv_reader.headers()?;
            Some(headers.iter().map(|h| h.to_string()).collect())
        } else {
            None
        };

        Ok(Self {
            reader: csv_reader,
            columns,
            null_token: config.null_token.clone(),
        })
    }

    /// ヘッダ行から読み取ったカラム名を返す
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// カラム名の所有権を移動して返す
    pub fn into_columns(self) -> Option<Vec<String>> {
        self.columns
    }

    fn convert(&self, raw: &csv::StringRecord) -> Record {
        raw.iter()
            .map(|field| {
                if field == self.null_token {
                    None
                } else {
                    Some(field.to_string())
                }
            })
            .collect()
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut raw = csv::StringRecord::new();
        match self.reader.read_record(&mut raw) {
            Ok(true) => Some(Ok(self.convert(&raw))),
            Ok(false) => None,
            Err(e) => Some(Err(e.into())),
        }
    }
}
