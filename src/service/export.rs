use crate::models::InvoiceRecord;
use std::io::Write;

const CSV_HEADER: &[&str] = &[
    "id",
    "user_id",
    "vendor_name",
    "invoice_number",
    "invoice_date",
    "total_amount",
    "currency",
    "email",
    "status",
];

/// 流式 CSV 导出器
///
/// 消费的是已校验、已持久化的记录 (通常来自搜索结果), 逐行写出,
/// 大结果集不要求整体驻留内存。
pub struct CsvExporter<W: Write> {
    writer: csv::Writer<W>,
    rows: u64,
}

impl<W: Write> CsvExporter<W> {
    pub fn new(out: W) -> Result<Self, csv::Error> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(CSV_HEADER)?;
        Ok(Self { writer, rows: 0 })
    }

    /// 续写块: 不输出表头, 用于分页导出的第二块起
    pub fn append(out: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
            rows: 0,
        }
    }

    pub fn write_record(&mut self, r: &InvoiceRecord) -> Result<(), csv::Error> {
        self.writer.write_record(&[
            r.id.to_string(),
            r.user_id.to_string(),
            r.vendor_name.clone(),
            r.invoice_number.clone(),
            r.invoice_date.map(|d| d.to_string()).unwrap_or_default(),
            r.total_amount.to_string(),
            r.currency.clone(),
            r.email.clone().unwrap_or_default(),
            r.status.clone(),
        ])?;
        self.rows += 1;
        Ok(())
    }

    /// 刷出缓冲并返回写出的数据行数 (不含表头)
    pub fn finish(mut self) -> Result<u64, csv::Error> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}

impl CsvExporter<Vec<u8>> {
    /// 刷出缓冲, 取回编码好的字节块
    pub fn into_bytes(mut self) -> Result<Vec<u8>, csv::Error> {
        self.writer.flush()?;
        self.writer.into_inner().map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()).into()
        })
    }
}
