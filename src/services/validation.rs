use rust_decimal::Decimal;

use crate::error::PayError;
use crate::models::{Economics, PaymentDetail, PaymentTarget, UserId};

/// Checks amount and the detail-cost law:
/// a line with `quantity > 0` costs exactly `quantity * unit_price` and more than
/// zero, and when lines are present their costs add up to `amount`.
pub fn validate_economics(economics: &Economics) -> Result<(), PayError> {
    if economics.amount <= Decimal::ZERO {
        return Err(PayError::validation("amount must be greater than zero"));
    }
    if let Some(rate) = economics.hourly_rate {
        if rate < Decimal::ZERO {
            return Err(PayError::validation("hourly_rate cannot be negative"));
        }
    }

    if economics.details.is_empty() {
        return Ok(());
    }

    let mut total = Decimal::ZERO;
    for (index, detail) in economics.details.iter().enumerate() {
        validate_detail(index, detail, economics.hourly_rate)?;
        total += detail.cost;
    }

    if total != economics.amount {
        return Err(PayError::Validation(format!(
            "detail costs add up to {} but amount is {}",
            total, economics.amount
        )));
    }

    Ok(())
}

fn validate_detail(
    index: usize,
    detail: &PaymentDetail,
    hourly_rate: Option<Decimal>,
) -> Result<(), PayError> {
    if detail.quantity < Decimal::ZERO {
        return Err(PayError::Validation(format!(
            "detail {} has a negative quantity",
            index
        )));
    }
    if detail.quantity.is_zero() {
        return Ok(());
    }

    let unit_price = unit_price(detail, hourly_rate).ok_or_else(|| {
        PayError::Validation(format!("detail {} has a quantity but no unit price", index))
    })?;

    let expected = detail.quantity * unit_price;
    if detail.cost != expected {
        return Err(PayError::Validation(format!(
            "detail {} costs {} but {} x {} is {}",
            index, detail.cost, detail.quantity, unit_price, expected
        )));
    }
    if detail.cost <= Decimal::ZERO {
        return Err(PayError::Validation(format!(
            "detail {} must cost more than zero",
            index
        )));
    }

    Ok(())
}

/// Explicit line price when set, otherwise the payment's hourly rate.
pub fn unit_price(detail: &PaymentDetail, hourly_rate: Option<Decimal>) -> Option<Decimal> {
    detail
        .price
        .filter(|price| !price.is_zero())
        .or(hourly_rate)
}

pub fn validate_target(sender_id: UserId, target: &PaymentTarget) -> Result<(), PayError> {
    match target {
        PaymentTarget::Internal { receiver_id } => {
            if *receiver_id <= 0 {
                return Err(PayError::validation("receiver_id must reference a user"));
            }
            if *receiver_id == sender_id {
                return Err(PayError::validation("cannot request a payment from yourself"));
            }
        }
        PaymentTarget::Email { email } => {
            let email = email.trim();
            if email.is_empty() {
                return Err(PayError::validation("email is required for email contacts"));
            }
            if !email.contains('@') {
                return Err(PayError::Validation(format!("invalid email address: {}", email)));
            }
        }
    }
    Ok(())
}
