//! Structural checks run before anything touches the ledger or a provider.

use super::response::{PayRequest, QueryRequest, RefundQueryRequest, RefundRequest};
use crate::error::ValidationError;

fn require(value: &str, err: ValidationError) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(err)
    } else {
        Ok(())
    }
}

pub fn validate_pay(req: &PayRequest) -> Result<(), ValidationError> {
    require(&req.store_id, ValidationError::MissingStoreId)?;
    require(&req.auth_code, ValidationError::MissingAuthCode)?;
    require(&req.title, ValidationError::MissingTitle)?;
    require(&req.out_trade_no, ValidationError::MissingOutTradeNo)?;
    if req.total_fee <= 0 {
        return Err(ValidationError::NonPositiveTotalFee(req.total_fee));
    }
    Ok(())
}

pub fn validate_query(req: &QueryRequest) -> Result<(), ValidationError> {
    require(&req.store_id, ValidationError::MissingStoreId)?;
    require(&req.out_trade_no, ValidationError::MissingOutTradeNo)
}

pub fn validate_refund(req: &RefundRequest) -> Result<(), ValidationError> {
    require(&req.store_id, ValidationError::MissingStoreId)?;
    require(&req.out_trade_no, ValidationError::MissingOutTradeNo)?;
    require(&req.out_refund_no, ValidationError::MissingOutRefundNo)?;
    if req.refund_fee < 0 {
        return Err(ValidationError::NegativeRefundFee(req.refund_fee));
    }
    Ok(())
}

pub fn validate_refund_query(req: &RefundQueryRequest) -> Result<(), ValidationError> {
    require(&req.store_id, ValidationError::MissingStoreId)?;
    require(&req.out_trade_no, ValidationError::MissingOutTradeNo)?;
    require(&req.out_refund_no, ValidationError::MissingOutRefundNo)
}
