use super::resolver::ConfigResolver;
use super::response::{GatewayRequest, GatewayResponse, PayRequest, QueryRequest, TradeResponse};
use super::validator::{validate_pay, validate_query};
use crate::domain::channel::PayContent;
use crate::domain::fee::FeeRate;
use crate::domain::merchant::MerchantConfig;
use crate::domain::order::{Order, OrderDraft, OrderStatus};
use crate::domain::ports::{ChannelSet, OrderRepositoryBox};
use crate::domain::provider::{Operation, Outcome, ProviderReply, ProviderResponse, TradeDetails};
use crate::error::{GatewayError, Result, StoreError};
use tracing::{debug, error, info, warn};

/// A raw provider reply together with whatever could be read out of it.
pub(super) struct Exchange {
    pub(super) reply: ProviderReply,
    pub(super) details: TradeDetails,
}

impl Exchange {
    pub(super) fn new(reply: ProviderReply) -> Self {
        Self {
            reply,
            details: TradeDetails::default(),
        }
    }
}

/// The order reconciliation and channel-dispatch engine.
///
/// `TradeEngine` owns the order ledger and drives every order through
/// PENDING -> SUCCESS | CLOSED. It holds no per-request state; the repository's
/// uniqueness constraint is the only serialization point between concurrent calls for
/// the same order key.
///
/// Public operations never fail: every error is folded into the returned response.
pub struct TradeEngine {
    pub(super) orders: OrderRepositoryBox,
    pub(super) resolver: ConfigResolver,
    pub(super) channels: ChannelSet,
}

impl TradeEngine {
    /// Creates a new `TradeEngine`.
    ///
    /// # Arguments
    ///
    /// * `orders` - The order ledger.
    /// * `resolver` - Merchant configuration and credential resolution.
    /// * `channels` - One client per payment channel.
    pub fn new(orders: OrderRepositoryBox, resolver: ConfigResolver, channels: ChannelSet) -> Self {
        Self {
            orders,
            resolver,
            channels,
        }
    }

    pub async fn handle(&self, request: GatewayRequest) -> GatewayResponse {
        match request {
            GatewayRequest::Pay(req) => GatewayResponse::Trade(self.pay(req).await),
            GatewayRequest::Query(req) => GatewayResponse::Trade(self.query(req).await),
            GatewayRequest::Cancel(req) => GatewayResponse::Trade(self.cancel(req).await),
            GatewayRequest::Refund(req) => GatewayResponse::Refund(self.refund(req).await),
            GatewayRequest::RefundQuery(req) => {
                GatewayResponse::Refund(self.refund_query(req).await)
            }
        }
    }

    /// Merchant-scans-buyer payment.
    ///
    /// A retry with the same `(store_id, out_trade_no)` reuses the stored order. A stored
    /// SUCCESS answers from the ledger without calling the provider.
    pub async fn pay(&self, req: PayRequest) -> TradeResponse {
        let (config, mut order) = match self.open_payment(&req).await {
            Ok(opened) => opened,
            Err(err) => return rejected(&req.store_id, &req.out_trade_no, &err),
        };

        match order.status {
            OrderStatus::Success => {
                debug!(store_id = %order.store_id, out_trade_no = %order.out_trade_no, "order already paid");
                return TradeResponse::from_order(&order);
            }
            OrderStatus::Closed => {
                let err = GatewayError::OrderClosed(order.out_trade_no.clone());
                return respond(&order, None, Err(err));
            }
            OrderStatus::Pending => {}
        }

        let mut exchange = None;
        let result = self.settle_payment(&config, &mut order, &mut exchange).await;
        respond(&order, exchange.as_ref(), result)
    }

    /// Asks the provider for the authoritative status of a payment and applies it.
    pub async fn query(&self, req: QueryRequest) -> TradeResponse {
        let (config, mut order) = match self.load_payment(&req).await {
            Ok(loaded) => loaded,
            Err(err) => return rejected(&req.store_id, &req.out_trade_no, &err),
        };

        let mut exchange = None;
        let result = self.reconcile(&config, &mut order, &mut exchange).await;
        let mut resp = respond(&order, exchange.as_ref(), result);
        resp.refund_fee = Some(order.refund_fee);
        resp
    }

    /// Revokes a payment that is still pending at the provider.
    pub async fn cancel(&self, req: QueryRequest) -> TradeResponse {
        let (config, mut order) = match self.load_payment(&req).await {
            Ok(loaded) => loaded,
            Err(err) => return rejected(&req.store_id, &req.out_trade_no, &err),
        };

        let mut exchange = None;
        let result = self.revoke(&config, &mut order, &mut exchange).await;
        respond(&order, exchange.as_ref(), result)
    }

    /// Every order recorded for a merchant.
    pub async fn ledger(&self, store_id: &str) -> Result<Vec<Order>> {
        Ok(self.orders.list_by_store(store_id).await?)
    }

    async fn open_payment(&self, req: &PayRequest) -> Result<(MerchantConfig, Order)> {
        validate_pay(req)?;
        let config = self.resolver.load(&req.store_id).await?;
        let channel = ConfigResolver::resolve_channel(&config, req.channel, &req.auth_code)?;
        let draft = OrderDraft {
            store_id: req.store_id.clone(),
            out_trade_no: req.out_trade_no.clone(),
            channel,
            total_fee: req.total_fee,
            title: req.title.clone(),
            auth_code: Some(req.auth_code.clone()),
            link_id: None,
            operator_id: req.operator_id.clone(),
            terminal_id: req.terminal_id.clone(),
            attach: req.attach.clone(),
        };
        let order = self.get_or_create(draft).await?;
        Ok((config, order))
    }

    async fn load_payment(&self, req: &QueryRequest) -> Result<(MerchantConfig, Order)> {
        validate_query(req)?;
        let config = self.resolver.load(&req.store_id).await?;
        let order = self.find(&req.store_id, &req.out_trade_no).await?;
        if order.is_refund() {
            return Err(GatewayError::RefundOrder(order.out_trade_no));
        }
        Ok((config, order))
    }

    pub(super) async fn find(&self, store_id: &str, out_trade_no: &str) -> Result<Order> {
        self.orders
            .get_by_store_and_out_trade_no(store_id, out_trade_no)
            .await?
            .ok_or_else(|| GatewayError::OrderNotFound(out_trade_no.to_string()))
    }

    /// Returns the order stored under the draft's key, creating it as PENDING if absent.
    ///
    /// Creation goes through `create_if_absent`; a caller that loses the race to a
    /// concurrent create re-reads the winner's row exactly once.
    pub(super) async fn get_or_create(&self, draft: OrderDraft) -> Result<Order> {
        let existing = self
            .orders
            .get_by_store_and_out_trade_no(&draft.store_id, &draft.out_trade_no)
            .await?;

        let order = match existing {
            Some(order) => order,
            None => {
                let candidate = draft.clone().into_order();
                match self.orders.create_if_absent(candidate.clone()).await {
                    Ok(()) => {
                        info!(
                            store_id = %candidate.store_id,
                            out_trade_no = %candidate.out_trade_no,
                            channel = %candidate.channel,
                            total_fee = candidate.total_fee,
                            "order created"
                        );
                        candidate
                    }
                    Err(StoreError::DuplicateKey { .. }) => {
                        debug!(out_trade_no = %draft.out_trade_no, "lost creation race, re-reading");
                        self.orders
                            .get_by_store_and_out_trade_no(&draft.store_id, &draft.out_trade_no)
                            .await?
                            .ok_or_else(|| StoreError::Missing(draft.out_trade_no.clone()))?
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        if order.channel != draft.channel {
            return Err(GatewayError::ChannelMismatch {
                out_trade_no: order.out_trade_no,
                requested: draft.channel,
                existing: order.channel,
            });
        }
        if order.total_fee != draft.total_fee || order.link_id != draft.link_id {
            return Err(GatewayError::OrderConflict(order.out_trade_no));
        }
        Ok(order)
    }

    async fn settle_payment(
        &self,
        config: &MerchantConfig,
        order: &mut Order,
        exchange: &mut Option<Exchange>,
    ) -> Result<()> {
        let channel = order.channel;
        let creds = config.credentials(channel);
        let reply = self
            .channels
            .get(channel)
            .pay(&creds, &PayContent::for_order(order))
            .await
            .map_err(|source| GatewayError::ProviderCommunication { channel, source })?;

        let exchange = exchange.insert(Exchange::new(reply));
        let response = ProviderResponse::decode(channel, &exchange.reply)?;
        exchange.details = response.details();

        // Only a full success moves the order; anything else stays open for a query.
        match response.outcome(Operation::Pay)? {
            Outcome::Success => {
                self.mark_success(order, exchange.details.trade_no.clone(), creds.fee_rate())
                    .await
            }
            Outcome::Pending => Ok(()),
            Outcome::Closed | Outcome::Declined => Err(declined(&response)),
        }
    }

    async fn reconcile(
        &self,
        config: &MerchantConfig,
        order: &mut Order,
        exchange: &mut Option<Exchange>,
    ) -> Result<()> {
        let channel = order.channel;
        let creds = config.credentials(channel);
        let reply = self
            .channels
            .get(channel)
            .query(&creds, &order.out_trade_no)
            .await
            .map_err(|source| GatewayError::ProviderCommunication { channel, source })?;

        let exchange = exchange.insert(Exchange::new(reply));
        let response = ProviderResponse::decode(channel, &exchange.reply)?;
        exchange.details = response.details();

        match response.outcome(Operation::Query)? {
            Outcome::Success => {
                self.mark_success(order, exchange.details.trade_no.clone(), creds.fee_rate())
                    .await
            }
            Outcome::Pending => Ok(()),
            Outcome::Closed => self.mark_closed(order).await,
            Outcome::Declined => Err(declined(&response)),
        }
    }

    async fn revoke(
        &self,
        config: &MerchantConfig,
        order: &mut Order,
        exchange: &mut Option<Exchange>,
    ) -> Result<()> {
        let channel = order.channel;
        if !channel.supports_cancel() {
            return Err(GatewayError::ChannelUnsupported {
                channel,
                operation: "cancel",
            });
        }
        if order.status != OrderStatus::Pending {
            return Err(GatewayError::NotPending(order.out_trade_no.clone()));
        }

        let creds = config.credentials(channel);
        let reply = self
            .channels
            .get(channel)
            .cancel(&creds, &order.out_trade_no)
            .await
            .map_err(|source| GatewayError::ProviderCommunication { channel, source })?;

        let exchange = exchange.insert(Exchange::new(reply));
        let response = ProviderResponse::decode(channel, &exchange.reply)?;
        exchange.details = response.details();

        match response.outcome(Operation::Cancel)? {
            Outcome::Success | Outcome::Closed => self.mark_closed(order).await,
            Outcome::Pending => Ok(()),
            Outcome::Declined => Err(declined(&response)),
        }
    }

    /// PENDING -> SUCCESS with the fee computed once. Re-applying to a SUCCESS order is a
    /// no-op; a CLOSED order is left alone and reported as a conflict.
    pub(super) async fn mark_success(
        &self,
        order: &mut Order,
        trade_no: Option<String>,
        rate: FeeRate,
    ) -> Result<()> {
        match order.succeed(trade_no, rate) {
            Ok(true) => {
                info!(
                    store_id = %order.store_id,
                    out_trade_no = %order.out_trade_no,
                    fee = order.fee,
                    "order succeeded"
                );
                self.persist(order).await
            }
            Ok(false) => Ok(()),
            Err(stored) => Err(GatewayError::StatusConflict {
                out_trade_no: order.out_trade_no.clone(),
                stored,
                reported: OrderStatus::Success,
            }),
        }
    }

    /// PENDING -> CLOSED. A payment that already carries refunds is reported closed by
    /// some providers and is left as it is.
    pub(super) async fn mark_closed(&self, order: &mut Order) -> Result<()> {
        match order.close() {
            Ok(true) => {
                info!(store_id = %order.store_id, out_trade_no = %order.out_trade_no, "order closed");
                self.persist(order).await
            }
            Ok(false) => Ok(()),
            Err(_) if order.refund_fee > 0 => Ok(()),
            Err(stored) => Err(GatewayError::StatusConflict {
                out_trade_no: order.out_trade_no.clone(),
                stored,
                reported: OrderStatus::Closed,
            }),
        }
    }

    /// Writes a provider-confirmed transition. A failure here means the provider and the
    /// ledger disagree and must be reconciled out of band.
    pub(super) async fn persist(&self, order: &Order) -> Result<()> {
        self.orders
            .update(order)
            .await
            .map_err(|source| out_of_sync(order, source))
    }
}

/// The provider already acted on `order`; the ledger did not follow.
pub(super) fn out_of_sync(order: &Order, source: StoreError) -> GatewayError {
    error!(
        store_id = %order.store_id,
        out_trade_no = %order.out_trade_no,
        status = %order.status,
        error = %source,
        "provider confirmed but the ledger update failed"
    );
    GatewayError::LedgerOutOfSync {
        out_trade_no: order.out_trade_no.clone(),
        source,
    }
}

pub(super) fn declined(response: &ProviderResponse) -> GatewayError {
    let (code, message) = response.reason();
    GatewayError::ProviderBusiness {
        channel: response.channel(),
        code,
        message,
    }
}

pub(super) fn log_failure(store_id: &str, out_trade_no: &str, err: &GatewayError) {
    // Ledger failures are logged at error where they happen.
    if !matches!(err, GatewayError::LedgerOutOfSync { .. }) {
        warn!(store_id, out_trade_no, code = %err.code(), "{err}");
    }
}

fn rejected(store_id: &str, out_trade_no: &str, err: &GatewayError) -> TradeResponse {
    log_failure(store_id, out_trade_no, err);
    TradeResponse::rejected(out_trade_no, err)
}

fn respond(order: &Order, exchange: Option<&Exchange>, result: Result<()>) -> TradeResponse {
    let mut resp = TradeResponse::from_order(order);
    if let Some(exchange) = exchange {
        resp = resp.with_reply(&exchange.reply, exchange.details.clone());
    }
    if let Err(err) = result {
        log_failure(&order.store_id, &order.out_trade_no, &err);
        resp = resp.with_error(&err);
    }
    resp
}
