//! Customer-facing message bodies.

use rust_decimal::Decimal;

use crate::entities::{order, order_item, OrderStatus};

fn garment_label(item: &order_item::Model) -> String {
    let name = item.garment_type.to_string();
    let mut chars = name.chars();
    let title = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name,
    };
    match &item.description {
        Some(desc) if !desc.trim().is_empty() => format!("{} ({})", title, desc.trim()),
        _ => title,
    }
}

fn amount_due_line(order: &order::Model) -> Option<String> {
    if order.balance_amount > Decimal::ZERO {
        Some(format!("Amount due: Rs. {}", order.balance_amount.round_dp(2)))
    } else {
        None
    }
}

pub fn order_created_text(shop: &str, order: &order::Model) -> String {
    format!(
        "Hi {}, thank you for your order with {}! Order ID: {}. Track your order: {}",
        order.customer_name, shop, order.barcode, order.tracking_link
    )
}

pub fn status_update_text(shop: &str, order: &order::Model, status: OrderStatus) -> String {
    format!(
        "{}: your order {} is now {}. Track it here: {}",
        shop,
        order.barcode,
        status.label(),
        order.tracking_link
    )
}

pub fn ready_text(shop: &str, order: &order::Model) -> String {
    let mut text = format!(
        "Good news {}! Your order {} from {} is ready for pickup.",
        order.customer_name, order.barcode, shop
    );
    if let Some(due) = amount_due_line(order) {
        text.push(' ');
        text.push_str(&due);
        text.push('.');
    }
    text
}

/// Subject and plain-text body of the "ready for pickup" email.
pub fn ready_email(
    shop: &str,
    order: &order::Model,
    items: &[order_item::Model],
) -> (String, String) {
    let subject = format!("Your order {} is ready for pickup", order.barcode);

    let mut body = format!(
        "Dear {},\n\nYour order {} is ready for pickup at {}.\n\n",
        order.customer_name, order.barcode, shop
    );
    if items.is_empty() {
        if let Some(garment) = order.garment_type {
            body.push_str(&format!("Item: {}\n", garment));
        }
    } else {
        body.push_str("Items:\n");
        for item in items {
            body.push_str(&format!(
                "- {} x{}: Rs. {}\n",
                garment_label(item),
                item.quantity,
                item.line_total().round_dp(2)
            ));
        }
    }
    body.push_str(&format!("\nTotal: Rs. {}\n", order.amount.round_dp(2)));
    if let Some(due) = amount_due_line(order) {
        body.push_str(&due);
        body.push('\n');
    }
    body.push_str(&format!("\nTrack your order: {}\n\n{}", order.tracking_link, shop));

    (subject, body)
}

pub fn broadcast_email(shop: &str, title: &str, message: &str) -> (String, String) {
    (
        format!("{}: {}", shop, title),
        format!("{}\n\n{}\n\nSee all updates in your {} account.", title, message, shop),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{GarmentType, PaymentStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn order(balance: Decimal) -> order::Model {
        let now = Utc::now();
        order::Model {
            id: Uuid::new_v4(),
            order_number: "TT-20240309-0001".into(),
            barcode: "TTABC12345".into(),
            customer_id: None,
            customer_name: "Asha".into(),
            phone_number: "+919876543210".into(),
            email: None,
            address: None,
            garment_type: None,
            measurements: None,
            subtotal: dec!(500),
            discount: dec!(50),
            amount: dec!(450),
            advance_amount: dec!(450) - balance,
            balance_amount: balance,
            payment_status: PaymentStatus::Partial,
            status: OrderStatus::Ready,
            expected_delivery_date: None,
            delivery_date: None,
            tracking_link: "https://shop.example.com/track/TTABC12345".into(),
            notes: None,
            sms_sent: false,
            sms_sent_at: None,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn item() -> order_item::Model {
        order_item::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            position: 0,
            garment_type: GarmentType::Shirt,
            description: Some("linen".into()),
            measurements: None,
            quantity: 1,
            price: dec!(500),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn created_text_has_link_and_barcode() {
        let text = order_created_text("Stitch Co", &order(dec!(450)));
        assert!(text.contains("TTABC12345"));
        assert!(text.contains("https://shop.example.com/track/TTABC12345"));
    }

    #[test]
    fn status_text_uses_label() {
        let text = status_update_text("Stitch Co", &order(dec!(0)), OrderStatus::CuttingDone);
        assert!(text.contains("Cutting Done"));
    }

    #[test]
    fn ready_email_lists_items_and_amount_due() {
        let (subject, body) = ready_email("Stitch Co", &order(dec!(200)), &[item()]);
        assert!(subject.contains("TTABC12345"));
        assert!(body.contains("- Shirt (linen) x1: Rs. 500"));
        assert!(body.contains("Amount due: Rs. 200"));
    }

    #[test]
    fn paid_orders_show_no_amount_due() {
        let text = ready_text("Stitch Co", &order(dec!(0)));
        assert!(!text.contains("Amount due"));
    }
}
