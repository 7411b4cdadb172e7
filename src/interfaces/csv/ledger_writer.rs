use crate::domain::channel::Channel;
use crate::domain::order::Order;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct LedgerRow<'a> {
    store_id: &'a str,
    out_trade_no: &'a str,
    channel: Channel,
    status: String,
    total_fee: i64,
    fee: i64,
    refund_fee: i64,
    trade_no: Option<&'a str>,
    link_id: Option<String>,
}

/// Writes stored orders as CSV, one row per order.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders<'a>(&mut self, orders: impl IntoIterator<Item = &'a Order>) -> csv::Result<()> {
        for order in orders {
            self.writer.serialize(LedgerRow {
                store_id: &order.store_id,
                out_trade_no: &order.out_trade_no,
                channel: order.channel,
                status: order.status.to_string(),
                total_fee: order.total_fee,
                fee: order.fee,
                refund_fee: order.refund_fee,
                trade_no: order.trade_no.as_deref(),
                link_id: order.link_id.map(|id| id.to_string()),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
