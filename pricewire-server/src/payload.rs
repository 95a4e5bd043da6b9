//! Job payloads and the delivery wire format.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::table::CellValue;

/// Descriptor handed from the poll handler to the CSV split handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileJob {
    /// Transport-scoped id of the originating e-mail.
    pub email_id: String,
    /// Attachment file name as sent.
    pub filename: String,
    /// Sender address, for the completion receipt.
    pub sender: String,
    /// Original subject line.
    pub subject: String,
    /// When the e-mail was received.
    pub received_at: DateTime<Utc>,
    /// Where the attachment bytes were stored.
    pub object_key: String,
}

/// Descriptor handed from the split handler to the batch dispatcher.
///
/// Rows are positional against `header`, preserving the file's column
/// order through the job store round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    #[serde(flatten)]
    pub file: FileJob,
    /// 1-based position within the file's batch sequence.
    pub batch_number: usize,
    /// Total batches produced from the file.
    pub total_batches: usize,
    /// Column names from the CSV header row.
    pub header: Vec<String>,
    /// Typed cell values, one vector per row.
    pub rows: Vec<Vec<CellValue>>,
}

impl BatchJob {
    /// Whether this is the terminal batch of its file.
    pub fn is_last(&self) -> bool {
        self.batch_number == self.total_batches
    }
}

/// The JSON body posted to the delivery endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPayload<'a> {
    pub file_name: &'a str,
    pub sender_email: &'a str,
    pub subject: &'a str,
    pub received_at: DateTime<Utc>,
    pub data: Vec<RowObject<'a>>,
    pub is_last: bool,
}

impl<'a> ApiPayload<'a> {
    /// Build the wire payload for one batch.
    pub fn from_batch(batch: &'a BatchJob) -> Self {
        Self {
            file_name: &batch.file.filename,
            sender_email: &batch.file.sender,
            subject: &batch.file.subject,
            received_at: batch.file.received_at,
            data: batch
                .rows
                .iter()
                .map(|row| RowObject {
                    header: &batch.header,
                    row,
                })
                .collect(),
            is_last: batch.is_last(),
        }
    }
}

/// One data row, serialized as a JSON object in column order.
#[derive(Debug)]
pub struct RowObject<'a> {
    header: &'a [String],
    row: &'a [CellValue],
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.header.len()))?;
        for (column, value) in self.header.iter().zip(self.row.iter()) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}
