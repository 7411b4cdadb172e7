//! Refund ledger: refunds are new, linked orders with a negative amount, and the original
//! payment's `refund_fee` is always recomputed from the successful ones.

use super::engine::{Exchange, TradeEngine, declined, log_failure, out_of_sync};
use super::response::{RefundQueryRequest, RefundRequest, RefundResponse};
use super::validator::{validate_refund, validate_refund_query};
use crate::domain::fee::FeeRate;
use crate::domain::merchant::MerchantConfig;
use crate::domain::order::{Order, OrderDraft, OrderStatus};
use crate::domain::provider::{Operation, Outcome, ProviderResponse};
use crate::error::{GatewayError, RefundPolicyError, Result};
use tracing::info;

impl TradeEngine {
    /// Refunds `refund_fee` (or everything still refundable when zero) of a paid order.
    ///
    /// Retrying with the same `out_refund_no` reuses the refund order; a refund that
    /// already succeeded is answered from the ledger.
    pub async fn refund(&self, req: RefundRequest) -> RefundResponse {
        let (config, mut original, mut refund) = match self.open_refund(&req).await {
            Ok(opened) => opened,
            Err(err) => {
                log_failure(&req.store_id, &req.out_refund_no, &err);
                return RefundResponse::rejected(&req.out_trade_no, &req.out_refund_no, &err);
            }
        };

        match refund.status {
            OrderStatus::Success => {
                return RefundResponse::from_orders(&original, &refund);
            }
            OrderStatus::Closed => {
                let err = GatewayError::OrderClosed(refund.out_trade_no.clone());
                return respond(&original, &refund, None, Err(err));
            }
            OrderStatus::Pending => {}
        }

        let mut exchange = None;
        let result = self
            .settle_refund(&config, &mut original, &mut refund, &mut exchange)
            .await;
        respond(&original, &refund, exchange.as_ref(), result)
    }

    /// Asks the provider for the status of a refund and applies it to both orders.
    pub async fn refund_query(&self, req: RefundQueryRequest) -> RefundResponse {
        let (config, mut original, mut refund) = match self.load_refund(&req).await {
            Ok(loaded) => loaded,
            Err(err) => {
                log_failure(&req.store_id, &req.out_refund_no, &err);
                return RefundResponse::rejected(&req.out_trade_no, &req.out_refund_no, &err);
            }
        };

        let mut exchange = None;
        let result = self
            .reconcile_refund(&config, &mut original, &mut refund, &mut exchange)
            .await;
        respond(&original, &refund, exchange.as_ref(), result)
    }

    async fn open_refund(&self, req: &RefundRequest) -> Result<(MerchantConfig, Order, Order)> {
        validate_refund(req)?;
        let config = self.resolver.load(&req.store_id).await?;
        let original = self.find(&req.store_id, &req.out_trade_no).await?;
        if original.is_refund() {
            return Err(RefundPolicyError::RefundOfRefund.into());
        }

        let existing = self
            .orders
            .get_by_store_and_out_trade_no(&req.store_id, &req.out_refund_no)
            .await?;
        if let Some(refund) = existing {
            let amount_differs = req.refund_fee != 0 && -refund.total_fee != req.refund_fee;
            if refund.link_id != Some(original.id) || amount_differs {
                return Err(GatewayError::OrderConflict(refund.out_trade_no));
            }
            return Ok((config, original, refund));
        }

        let reserved = self.orders.sum_open_refunds(original.id).await?;
        let amount = refundable_amount(&original, reserved, req.refund_fee)?;
        let draft = OrderDraft::refund_of(&original, &req.out_refund_no, amount);
        let refund = self.get_or_create(draft).await?;
        Ok((config, original, refund))
    }

    async fn load_refund(&self, req: &RefundQueryRequest) -> Result<(MerchantConfig, Order, Order)> {
        validate_refund_query(req)?;
        let config = self.resolver.load(&req.store_id).await?;
        let original = self.find(&req.store_id, &req.out_trade_no).await?;
        let refund = self.find(&req.store_id, &req.out_refund_no).await?;
        if refund.link_id != Some(original.id) {
            return Err(GatewayError::OrderConflict(refund.out_trade_no));
        }
        Ok((config, original, refund))
    }

    async fn settle_refund(
        &self,
        config: &MerchantConfig,
        original: &mut Order,
        refund: &mut Order,
        exchange: &mut Option<Exchange>,
    ) -> Result<()> {
        let channel = original.channel;
        let creds = config.credentials(channel);
        let reply = self
            .channels
            .get(channel)
            .refund(&creds, refund, original)
            .await
            .map_err(|source| GatewayError::ProviderCommunication { channel, source })?;

        let exchange = exchange.insert(Exchange::new(reply));
        let response = ProviderResponse::decode(channel, &exchange.reply)?;
        exchange.details = response.details();

        match response.outcome(Operation::Refund)? {
            Outcome::Success => {
                let trade_no = exchange.details.trade_no.clone();
                self.complete_refund(original, refund, trade_no, creds.fee_rate())
                    .await
            }
            Outcome::Pending => Ok(()),
            Outcome::Closed => {
                self.mark_closed(refund).await?;
                Err(declined(&response))
            }
            Outcome::Declined => Err(declined(&response)),
        }
    }

    async fn reconcile_refund(
        &self,
        config: &MerchantConfig,
        original: &mut Order,
        refund: &mut Order,
        exchange: &mut Option<Exchange>,
    ) -> Result<()> {
        let channel = original.channel;
        let creds = config.credentials(channel);
        let reply = self
            .channels
            .get(channel)
            .refund_query(&creds, &original.out_trade_no, &refund.out_trade_no)
            .await
            .map_err(|source| GatewayError::ProviderCommunication { channel, source })?;

        let exchange = exchange.insert(Exchange::new(reply));
        let response = ProviderResponse::decode(channel, &exchange.reply)?;
        exchange.details = response.details();

        match response.outcome(Operation::RefundQuery)? {
            Outcome::Success => {
                let trade_no = exchange.details.trade_no.clone();
                self.complete_refund(original, refund, trade_no, creds.fee_rate())
                    .await
            }
            Outcome::Pending => Ok(()),
            Outcome::Closed => self.mark_closed(refund).await,
            Outcome::Declined => Err(declined(&response)),
        }
    }

    /// Marks the refund SUCCESS and stores it together with the original's `refund_fee`,
    /// recomputed from every successful refund linked to it.
    async fn complete_refund(
        &self,
        original: &mut Order,
        refund: &mut Order,
        trade_no: Option<String>,
        rate: FeeRate,
    ) -> Result<()> {
        match refund.succeed(trade_no, rate) {
            Ok(true) => info!(
                store_id = %refund.store_id,
                out_trade_no = %refund.out_trade_no,
                total_fee = refund.total_fee,
                "refund succeeded"
            ),
            Ok(false) => {}
            Err(stored) => {
                return Err(GatewayError::StatusConflict {
                    out_trade_no: refund.out_trade_no.clone(),
                    stored,
                    reported: OrderStatus::Success,
                });
            }
        }

        let previous = original.refund_fee;
        *original = self
            .orders
            .apply_refund(refund)
            .await
            .map_err(|source| out_of_sync(refund, source))?;
        if original.refund_fee != previous {
            info!(
                store_id = %original.store_id,
                out_trade_no = %original.out_trade_no,
                from = previous,
                to = original.refund_fee,
                "refund total updated"
            );
        }
        Ok(())
    }
}

/// Checks refund policy against the original and returns the amount to refund.
///
/// `reserved` is what open refunds already hold against the payment.
fn refundable_amount(original: &Order, reserved: i64, requested: i64) -> Result<i64> {
    if original.status != OrderStatus::Success {
        return Err(RefundPolicyError::NotPaid(original.status).into());
    }
    let refundable = original.total_fee - reserved;
    if refundable <= 0 {
        return Err(RefundPolicyError::FullyRefunded.into());
    }
    let amount = if requested == 0 { refundable } else { requested };
    if amount > refundable {
        return Err(RefundPolicyError::ExceedsRefundable {
            requested: amount,
            refundable,
        }
        .into());
    }
    Ok(amount)
}

fn respond(
    original: &Order,
    refund: &Order,
    exchange: Option<&Exchange>,
    result: Result<()>,
) -> RefundResponse {
    let mut resp = RefundResponse::from_orders(original, refund);
    if let Some(exchange) = exchange {
        resp = resp.with_reply(&exchange.reply);
    }
    if let Err(err) = result {
        log_failure(&refund.store_id, &refund.out_trade_no, &err);
        resp = resp.with_error(&err);
    }
    resp
}
