//! Order Placement Transaction
//!
//! Persists one [`OrderIntent`] as Payment → Order → (Order_Line, License)×n
//! inside a single scoped transaction. Either the whole bundle commits or
//! nothing from the attempt is visible.
//!
//! # Guarantees
//! - payment amount is the intent total rounded to 2 places, so it equals
//!   the sum of the persisted line totals by construction
//! - line numbers are `1..=n` in cart order
//! - one license per line, owned by the ordering user
//! - every error after `begin` triggers an explicit rollback before it is
//!   returned

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::core_types::{LineId, OrderId};
use crate::error::BenchError;
use crate::models::{
    NewLicense, NewOrder, NewOrderLine, NewPayment, OrderIntent, OrderStatus, PaymentMethod,
};
use crate::store::{OrderTx, Session};

/// Payment timestamp offset from the order time, seconds
pub const PAYMENT_DELAY_SECS: std::ops::RangeInclusive<i64> = 1..=600;

/// License code suffix range
pub const LICENSE_SUFFIX: std::ops::RangeInclusive<u16> = 1000..=9999;

/// Place an order stamped with the current time.
pub async fn place_order<R: Rng + Send>(
    session: &mut dyn Session,
    intent: &OrderIntent,
    rng: &mut R,
    download_base_url: &str,
) -> Result<OrderId, BenchError> {
    place_order_at(session, intent, Utc::now(), rng, download_base_url).await
}

/// Place an order with an explicit order timestamp.
pub async fn place_order_at<R: Rng + Send>(
    session: &mut dyn Session,
    intent: &OrderIntent,
    ordered_at: DateTime<Utc>,
    rng: &mut R,
    download_base_url: &str,
) -> Result<OrderId, BenchError> {
    let method = *PaymentMethod::ALL
        .choose(rng)
        .ok_or_else(|| BenchError::SynthesisFailure("no payment methods".into()))?;
    let paid_at = ordered_at + Duration::seconds(rng.gen_range(PAYMENT_DELAY_SECS));
    let payment = NewPayment {
        method,
        amount: intent.payment_amount(),
        paid_at,
    };

    let mut tx = session.begin().await?;

    let written = write_bundle(
        tx.as_mut(),
        intent,
        &payment,
        ordered_at,
        rng,
        download_base_url,
    )
    .await;

    match written {
        Ok(order_id) => {
            // A failed commit leaves nothing behind; the store aborts it.
            tx.commit().await?;
            tracing::debug!(
                order_id,
                lines = intent.lines().len(),
                total = %payment.amount,
                "Order committed"
            );
            Ok(order_id)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(
                    error = %rollback_err,
                    "Rollback failed; store discards the transaction on disconnect"
                );
            }
            Err(e)
        }
    }
}

async fn write_bundle<R: Rng + Send>(
    tx: &mut dyn OrderTx,
    intent: &OrderIntent,
    payment: &NewPayment,
    ordered_at: DateTime<Utc>,
    rng: &mut R,
    download_base_url: &str,
) -> Result<OrderId, BenchError> {
    let payment_id = tx.insert_payment(payment).await?;

    let order_id = tx
        .insert_order(&NewOrder {
            user_id: intent.user_id(),
            payment_id,
            status: OrderStatus::Paid,
            ordered_at,
        })
        .await?;

    for (idx, line) in intent.lines().iter().enumerate() {
        let order_line = NewOrderLine {
            order_id,
            line_id: idx as LineId + 1,
            product_id: line.product_id,
            unit_price: line.unit_price,
            quantity: line.quantity,
        };
        tx.insert_order_line(&order_line).await?;

        let suffix = rng.gen_range(LICENSE_SUFFIX);
        let license =
            NewLicense::for_line(&order_line, intent.user_id(), suffix, download_base_url);
        tx.insert_license(&license).await?;
    }

    Ok(order_id)
}
