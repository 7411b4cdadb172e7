mod common;

use common::*;
use paygate::application::response::{PayRequest, RefundQueryRequest, RefundRequest, TradeStatus};
use paygate::domain::order::{OrderDraft, OrderStatus};
use paygate::domain::ports::OrderRepository;
use serde_json::json;

fn refund(out_refund_no: &str, refund_fee: i64) -> RefundRequest {
    RefundRequest {
        store_id: "S1".to_string(),
        out_trade_no: "O1".to_string(),
        out_refund_no: out_refund_no.to_string(),
        refund_fee,
    }
}

fn refund_query(out_refund_no: &str) -> RefundQueryRequest {
    RefundQueryRequest {
        store_id: "S1".to_string(),
        out_trade_no: "O1".to_string(),
        out_refund_no: out_refund_no.to_string(),
    }
}

async fn paid_order(h: &Harness, total_fee: i64) {
    h.channel.reply(alipay_paid("2024T1"));
    let resp = h.engine.pay(pay_request("O1", total_fee)).await;
    assert_eq!(resp.status, Some(TradeStatus::Success));
}

#[tokio::test]
async fn test_full_refund_with_zero_amount() {
    let h = Harness::new();
    paid_order(&h, 100).await;
    h.channel.reply(alipay_refunded());

    let resp = h.engine.refund(refund("O1_R1", 0)).await;

    assert!(resp.is_ok(), "{resp:?}");
    assert_eq!(resp.status, Some(TradeStatus::Success));
    assert_eq!(resp.refund_fee, 100);
    assert_eq!(resp.total_fee, 100);
    assert_eq!(resp.trade_no.as_deref(), Some("2024T1"));

    let original = h.order("O1").await;
    let refund_row = h.order("O1_R1").await;
    assert_eq!(original.refund_fee, 100);
    assert_eq!(original.status, OrderStatus::Success);
    assert_eq!(refund_row.total_fee, -100);
    assert_eq!(refund_row.link_id, Some(original.id));
    assert_eq!(refund_row.status, OrderStatus::Success);
    assert_eq!(refund_row.channel, original.channel);
}

#[tokio::test]
async fn test_refunds_never_exceed_the_payment() {
    let h = Harness::new();
    paid_order(&h, 100).await;
    h.channel.always(alipay_refunded());

    let resp = h.engine.refund(refund("R0", 150)).await;
    assert_eq!(resp.error_code.as_deref(), Some("Refund.ExceedsRefundable"));

    let resp = h.engine.refund(refund("R1", 60)).await;
    assert!(resp.is_ok(), "{resp:?}");
    assert_eq!(h.order("O1").await.refund_fee, 60);

    let resp = h.engine.refund(refund("R2", 50)).await;
    assert_eq!(resp.error_code.as_deref(), Some("Refund.ExceedsRefundable"));
    assert_eq!(h.order("O1").await.refund_fee, 60);

    let resp = h.engine.refund(refund("R3", 0)).await;
    assert!(resp.is_ok(), "{resp:?}");
    assert_eq!(resp.refund_fee, 40);
    assert_eq!(h.order("O1").await.refund_fee, 100);

    let resp = h.engine.refund(refund("R4", 0)).await;
    assert_eq!(resp.error_code.as_deref(), Some("Refund.FullyRefunded"));

    // Rejected refunds leave no rows behind.
    assert_eq!(h.rows().await.len(), 3);
    assert_eq!(h.channel.calls_of("refund"), 2);
}

#[tokio::test]
async fn test_refund_fee_is_charged_negatively() {
    let h = Harness::new();
    paid_order(&h, 10_000).await;
    h.channel.reply(alipay_refunded());

    h.engine.refund(refund("O1_R1", 10_000)).await;

    assert_eq!(h.order("O1").await.fee, 38);
    assert_eq!(h.order("O1_R1").await.fee, -38);
}

#[tokio::test]
async fn test_retried_refund_is_answered_from_the_ledger() {
    let h = Harness::new();
    paid_order(&h, 100).await;
    h.channel.reply(alipay_refunded());
    h.engine.refund(refund("O1_R1", 30)).await;

    let resp = h.engine.refund(refund("O1_R1", 30)).await;

    assert!(resp.is_ok());
    assert_eq!(resp.status, Some(TradeStatus::Success));
    assert_eq!(resp.refund_fee, 30);
    assert_eq!(h.channel.calls_of("refund"), 1);
    assert_eq!(h.order("O1").await.refund_fee, 30);
}

#[tokio::test]
async fn test_retry_with_a_different_amount_conflicts() {
    let h = Harness::new();
    paid_order(&h, 100).await;
    h.channel.reply(alipay_refunded());
    h.engine.refund(refund("O1_R1", 30)).await;

    let resp = h.engine.refund(refund("O1_R1", 40)).await;

    assert_eq!(resp.error_code.as_deref(), Some("Order.Conflict"));
    assert_eq!(h.order("O1_R1").await.total_fee, -30);
}

#[tokio::test]
async fn test_refund_number_reused_across_payments_conflicts() {
    let h = Harness::new();
    paid_order(&h, 100).await;
    h.channel.reply(alipay_paid("2024T2"));
    h.engine.pay(pay_request("O2", 100)).await;
    h.channel.reply(alipay_refunded());
    h.engine.refund(refund("R1", 30)).await;

    let resp = h
        .engine
        .refund(RefundRequest {
            out_trade_no: "O2".to_string(),
            ..refund("R1", 30)
        })
        .await;

    assert_eq!(resp.error_code.as_deref(), Some("Order.Conflict"));
}

#[tokio::test]
async fn test_unpaid_orders_cannot_be_refunded() {
    let h = Harness::new();
    h.channel.reply(alipay_paying());
    h.engine.pay(pay_request("O1", 100)).await;

    let resp = h.engine.refund(refund("O1_R1", 0)).await;

    assert_eq!(resp.error_code.as_deref(), Some("Refund.NotPaid"));
    assert_eq!(h.channel.calls_of("refund"), 0);
}

#[tokio::test]
async fn test_refund_of_a_refund_is_rejected() {
    let h = Harness::new();
    paid_order(&h, 100).await;
    h.channel.reply(alipay_refunded());
    h.engine.refund(refund("O1_R1", 30)).await;

    let resp = h
        .engine
        .refund(RefundRequest {
            out_trade_no: "O1_R1".to_string(),
            ..refund("O1_R2", 10)
        })
        .await;

    assert_eq!(resp.error_code.as_deref(), Some("Refund.OfRefund"));
}

#[tokio::test]
async fn test_refund_of_unknown_order() {
    let h = Harness::new();

    let resp = h.engine.refund(refund("O1_R1", 10)).await;

    assert_eq!(resp.error_code.as_deref(), Some("Order.NotFound"));
    assert!(h.rows().await.is_empty());
}

#[tokio::test]
async fn test_interrupted_refund_settles_through_refund_query() {
    let h = Harness::new();
    paid_order(&h, 100).await;
    h.channel.fail("read timeout");

    let resp = h.engine.refund(refund("O1_R1", 60)).await;
    assert_eq!(resp.error_code.as_deref(), Some("Provider.alipay.Error"));
    assert_eq!(resp.status, Some(TradeStatus::UserPaying));
    assert_eq!(h.order("O1_R1").await.status, OrderStatus::Pending);
    assert_eq!(h.order("O1").await.refund_fee, 0);

    h.channel.reply(json!({"code": "10000", "msg": "Success"}));
    let resp = h.engine.refund_query(refund_query("O1_R1")).await;
    assert_eq!(resp.status, Some(TradeStatus::UserPaying));
    assert!(resp.is_ok());

    h.channel.reply(json!({
        "code": "10000",
        "msg": "Success",
        "trade_no": "2024T1",
        "refund_status": "REFUND_SUCCESS",
    }));
    let resp = h.engine.refund_query(refund_query("O1_R1")).await;
    assert_eq!(resp.status, Some(TradeStatus::Success), "{resp:?}");
    assert_eq!(resp.refund_fee, 60);
    assert_eq!(h.order("O1").await.refund_fee, 60);
}

#[tokio::test]
async fn test_provider_closed_refund_is_closed() {
    let h = Harness::new();
    paid_order(&h, 100).await;
    h.channel.reply(json!({
        "code": "40004",
        "msg": "Business Failed",
        "sub_code": "ACQ.TRADE_HAS_CLOSE",
        "sub_msg": "trade closed",
    }));

    let resp = h.engine.refund(refund("O1_R1", 60)).await;

    assert_eq!(resp.error_code.as_deref(), Some("Provider.alipay.Declined"));
    assert_eq!(resp.status, Some(TradeStatus::Closed));
    assert_eq!(h.order("O1_R1").await.status, OrderStatus::Closed);
    assert_eq!(h.order("O1").await.refund_fee, 0);

    let resp = h.engine.refund(refund("O1_R1", 60)).await;
    assert_eq!(resp.error_code.as_deref(), Some("Order.Closed"));
    assert_eq!(h.channel.calls_of("refund"), 1);
}

#[tokio::test]
async fn test_wechat_refund_query_vocabulary() {
    let h = Harness::new();
    h.channel.reply(json!({
        "return_code": "SUCCESS",
        "result_code": "SUCCESS",
        "transaction_id": "WX1",
    }));
    h.engine
        .pay(PayRequest {
            auth_code: WECHAT_CODE.to_string(),
            ..pay_request("O1", 100)
        })
        .await;
    h.channel.fail("connection refused");
    h.engine.refund(refund("O1_R1", 100)).await;

    h.channel.reply(json!({
        "return_code": "SUCCESS",
        "result_code": "SUCCESS",
        "refund_status_0": "PROCESSING",
    }));
    let resp = h.engine.refund_query(refund_query("O1_R1")).await;
    assert_eq!(resp.status, Some(TradeStatus::UserPaying));

    h.channel.reply(json!({
        "return_code": "SUCCESS",
        "result_code": "SUCCESS",
        "refund_status_0": "REFUNDCLOSE",
    }));
    let resp = h.engine.refund_query(refund_query("O1_R1")).await;
    assert_eq!(resp.status, Some(TradeStatus::Closed));
    assert_eq!(h.order("O1_R1").await.status, OrderStatus::Closed);
    assert_eq!(h.order("O1").await.refund_fee, 0);
}

#[tokio::test]
async fn test_refund_total_is_recomputed_from_the_ledger() {
    let h = Harness::new();
    paid_order(&h, 100).await;
    h.channel.reply(alipay_refunded());
    h.engine.refund(refund("R1", 20)).await;
    h.channel.fail("read timeout");
    h.engine.refund(refund("R2", 30)).await;

    // A stale aggregate is corrected on the next confirmation.
    let mut original = h.order("O1").await;
    original.refund_fee = 999;
    h.store.inner.update(&original).await.unwrap();

    h.channel.reply(json!({"code": "10000", "msg": "Success", "refund_status": "REFUND_SUCCESS"}));
    h.engine.refund_query(refund_query("R2")).await;

    assert_eq!(h.order("O1").await.refund_fee, 50);
}

#[tokio::test]
async fn test_refund_query_for_mismatched_orders() {
    let h = Harness::new();
    paid_order(&h, 100).await;
    h.channel.reply(alipay_paid("2024T2"));
    h.engine.pay(pay_request("O2", 100)).await;

    let resp = h
        .engine
        .refund_query(RefundQueryRequest {
            out_refund_no: "O2".to_string(),
            ..refund_query("")
        })
        .await;

    assert_eq!(resp.error_code.as_deref(), Some("Order.Conflict"));
}

#[tokio::test]
async fn test_ledger_failure_during_refund_reports_waiting() {
    let h = Harness::new();
    paid_order(&h, 100).await;
    h.channel.reply(alipay_refunded());
    h.store.fail_updates(true);

    let resp = h.engine.refund(refund("O1_R1", 40)).await;

    assert_eq!(resp.status, Some(TradeStatus::Waiting));
    assert_eq!(resp.error_code.as_deref(), Some("Ledger.OutOfSync"));
    assert_eq!(h.order("O1").await.refund_fee, 0);
}

#[tokio::test]
async fn test_pending_refund_holds_its_amount() {
    let h = Harness::new();
    paid_order(&h, 100).await;
    h.channel.fail("read timeout");
    h.engine.refund(refund("R1", 60)).await;
    assert_eq!(h.order("R1").await.status, OrderStatus::Pending);

    let resp = h.engine.refund(refund("R2", 60)).await;
    assert_eq!(resp.error_code.as_deref(), Some("Refund.ExceedsRefundable"));
    assert_eq!(h.channel.calls_of("refund"), 1);

    h.channel.reply(alipay_refunded());
    let resp = h.engine.refund(refund("R3", 0)).await;
    assert!(resp.is_ok(), "{resp:?}");
    assert_eq!(resp.refund_fee, 40);

    h.channel.reply(json!({"code": "10000", "msg": "Success", "refund_status": "REFUND_SUCCESS"}));
    let resp = h.engine.refund_query(refund_query("R1")).await;
    assert_eq!(resp.status, Some(TradeStatus::Success), "{resp:?}");
    assert_eq!(h.order("O1").await.refund_fee, 100);
}

#[tokio::test]
async fn test_confirmed_refund_beyond_the_payment_is_not_recorded() {
    let h = Harness::new();
    paid_order(&h, 100).await;
    h.channel.reply(alipay_refunded());
    h.engine.refund(refund("R1", 60)).await;

    // A second open refund written behind the engine's back.
    let original = h.order("O1").await;
    let stray = OrderDraft::refund_of(&original, "R2", 60).into_order();
    h.store.inner.create_if_absent(stray).await.unwrap();

    h.channel.reply(json!({"code": "10000", "msg": "Success", "refund_status": "REFUND_SUCCESS"}));
    let resp = h.engine.refund_query(refund_query("R2")).await;

    assert_eq!(resp.status, Some(TradeStatus::Waiting));
    assert_eq!(resp.error_code.as_deref(), Some("Ledger.OutOfSync"));
    assert_eq!(h.order("O1").await.refund_fee, 60);
    assert_eq!(h.order("R2").await.status, OrderStatus::Pending);
}
