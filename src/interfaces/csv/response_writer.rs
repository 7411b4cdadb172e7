use crate::application::response::{GatewayResponse, TradeStatus};
use crate::domain::channel::Channel;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct ResponseRow<'a> {
    op: &'a str,
    store_id: &'a str,
    status: Option<TradeStatus>,
    channel: Option<Channel>,
    out_trade_no: &'a str,
    out_refund_no: Option<&'a str>,
    trade_no: Option<&'a str>,
    total_fee: i64,
    refund_fee: Option<i64>,
    error_code: Option<&'a str>,
    error_message: Option<&'a str>,
}

/// Writes one CSV row per gateway response.
pub struct ResponseWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ResponseWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write(&mut self, op: &str, store_id: &str, response: &GatewayResponse) -> csv::Result<()> {
        let row = match response {
            GatewayResponse::Trade(r) => ResponseRow {
                op,
                store_id,
                status: r.status,
                channel: r.channel,
                out_trade_no: &r.out_trade_no,
                out_refund_no: None,
                trade_no: r.trade_no.as_deref(),
                total_fee: r.total_fee,
                refund_fee: r.refund_fee,
                error_code: r.error_code.as_deref(),
                error_message: r.error_message.as_deref(),
            },
            GatewayResponse::Refund(r) => ResponseRow {
                op,
                store_id,
                status: r.status,
                channel: None,
                out_trade_no: &r.out_trade_no,
                out_refund_no: Some(&r.out_refund_no),
                trade_no: r.trade_no.as_deref(),
                total_fee: r.total_fee,
                refund_fee: Some(r.refund_fee),
                error_code: r.error_code.as_deref(),
                error_message: r.error_message.as_deref(),
            },
        };
        self.writer.serialize(row)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
