use sluice_protocol::WireRecord;
use std::collections::HashMap;

/// One application-visible record.
///
/// `partition` and `offset` are only meaningful on the consumer side; the
/// producer path ignores them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub headers: HashMap<String, String>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Envelope {
            topic: topic.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Producer-side wire form. Partition and offset are left for the broker to assign.
    pub fn into_produce_record(self, timestamp: u64) -> WireRecord {
        WireRecord {
            headers: wire_headers(&self.headers),
            topic: self.topic,
            partition: 0,
            offset: 0,
            timestamp,
            key: (!self.key.is_empty()).then_some(self.key),
            value: self.value,
        }
    }
}

impl From<WireRecord> for Envelope {
    fn from(record: WireRecord) -> Self {
        let headers = record
            .headers
            .into_iter()
            .map(|(k, v)| (k, String::from_utf8_lossy(&v).into_owned()))
            .collect();

        Envelope {
            headers,
            key: record.key.unwrap_or_default(),
            value: record.value,
            topic: record.topic,
            partition: record.partition,
            offset: record.offset,
        }
    }
}

// sorted so the same envelope always encodes to the same bytes
fn wire_headers(headers: &HashMap<String, String>) -> Vec<(String, Vec<u8>)> {
    let mut out: Vec<_> = headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone().into_bytes()))
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}
