use crate::application::response::{
    GatewayRequest, PayRequest, QueryRequest, RefundQueryRequest, RefundRequest,
};
use crate::domain::channel::Channel;
use crate::error::InputError;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOp {
    Pay,
    Query,
    Cancel,
    Refund,
    RefundQuery,
}

/// One CSV row. Columns an operation does not use may be left empty or omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestRecord {
    pub op: RequestOp,
    pub store_id: Option<String>,
    pub out_trade_no: Option<String>,
    #[serde(default)]
    pub out_refund_no: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub auth_code: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub total_fee: Option<i64>,
    #[serde(default)]
    pub refund_fee: Option<i64>,
    #[serde(default)]
    pub operator_id: Option<String>,
    #[serde(default)]
    pub terminal_id: Option<String>,
    #[serde(default)]
    pub attach: Option<String>,
}

impl TryFrom<RequestRecord> for GatewayRequest {
    type Error = InputError;

    fn try_from(r: RequestRecord) -> Result<Self, Self::Error> {
        let store_id = r.store_id.unwrap_or_default();
        let out_trade_no = r.out_trade_no.unwrap_or_default();
        let out_refund_no = r.out_refund_no.unwrap_or_default();

        Ok(match r.op {
            RequestOp::Pay => {
                let channel = r
                    .channel
                    .filter(|c| !c.is_empty())
                    .map(|c| c.parse::<Channel>())
                    .transpose()?;
                GatewayRequest::Pay(PayRequest {
                    store_id,
                    channel,
                    auth_code: r.auth_code.unwrap_or_default(),
                    title: r.title.unwrap_or_default(),
                    out_trade_no,
                    total_fee: r.total_fee.unwrap_or_default(),
                    operator_id: r.operator_id,
                    terminal_id: r.terminal_id,
                    attach: r.attach,
                })
            }
            RequestOp::Query => GatewayRequest::Query(QueryRequest {
                store_id,
                out_trade_no,
            }),
            RequestOp::Cancel => GatewayRequest::Cancel(QueryRequest {
                store_id,
                out_trade_no,
            }),
            RequestOp::Refund => GatewayRequest::Refund(RefundRequest {
                store_id,
                out_trade_no,
                out_refund_no,
                refund_fee: r.refund_fee.unwrap_or_default(),
            }),
            RequestOp::RefundQuery => GatewayRequest::RefundQuery(RefundQueryRequest {
                store_id,
                out_trade_no,
                out_refund_no,
            }),
        })
    }
}

/// Reads gateway requests from a CSV source.
///
/// Whitespace is trimmed and rows may omit trailing columns.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and converts each row.
    pub fn requests(self) -> impl Iterator<Item = Result<GatewayRequest, InputError>> {
        self.reader.into_deserialize::<RequestRecord>().map(|row| {
            let record = row?;
            GatewayRequest::try_from(record)
        })
    }
}
