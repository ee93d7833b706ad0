// Payment intent reference grammar tests
// The external_reference string is the only context shared between checkout
// creation and webhook processing, so both directions are exercised here.

use convenio_backend::models::coupon::Coupon;
use convenio_backend::models::payment::PaymentIntent;
use convenio_backend::services::coupon::CouponService;
use uuid::Uuid;

#[test]
fn test_subscription_reference_round_trip() {
    let user_id = Uuid::new_v4();

    let plain = PaymentIntent::Subscription {
        user_id,
        coupon_id: None,
    };
    assert_eq!(plain.to_reference(), format!("subscription:{}", user_id));
    assert_eq!(PaymentIntent::parse(&plain.to_reference()), Some(plain));

    let coupon_id = Uuid::new_v4();
    let with_coupon = PaymentIntent::Subscription {
        user_id,
        coupon_id: Some(coupon_id),
    };
    assert_eq!(
        with_coupon.to_reference(),
        format!("subscription:{}:{}", user_id, coupon_id)
    );
    assert_eq!(
        PaymentIntent::parse(&with_coupon.to_reference()),
        Some(with_coupon)
    );
}

#[test]
fn test_dependent_and_agenda_references() {
    let dependent_id = Uuid::new_v4();
    let intent = PaymentIntent::Dependent {
        dependent_id,
        coupon_id: None,
    };
    assert_eq!(PaymentIntent::parse(&intent.to_reference()), Some(intent));

    let professional_id = Uuid::new_v4();
    let agenda = PaymentIntent::AgendaAccess {
        professional_id,
        duration_days: 90,
    };
    assert_eq!(
        agenda.to_reference(),
        format!("agenda:{}:90", professional_id)
    );
    assert_eq!(PaymentIntent::parse(&agenda.to_reference()), Some(agenda));
}

#[test]
fn test_malformed_references_are_rejected() {
    // A webhook carrying any of these must acknowledge without acting
    let id = Uuid::new_v4();
    let cases = [
        "".to_string(),
        "subscription".to_string(),
        "subscription:not-a-uuid".to_string(),
        format!("subscription:{}:not-a-uuid", id),
        format!("subscription:{}:{}:{}", id, id, id),
        format!("agenda:{}", id),
        format!("agenda:{}:0", id),
        format!("agenda:{}:-30", id),
        format!("agenda:{}:90:extra", id),
        format!("payout:{}", id),
    ];

    for reference in &cases {
        assert_eq!(
            PaymentIntent::parse(reference),
            None,
            "expected rejection of {:?}",
            reference
        );
    }
}

fn coupon(discount_type: &str, coupon_type: &str, value_cents: i64, unlimited: bool) -> Coupon {
    Coupon {
        id: Uuid::new_v4(),
        code: "REIS60".to_string(),
        discount_type: discount_type.to_string(),
        discount_value_cents: value_cents,
        coupon_type: coupon_type.to_string(),
        unlimited_use: unlimited,
        is_active: true,
        description: None,
        created_at: chrono::Utc::now(),
    }
}

#[test]
fn test_unlimited_dependent_coupon_discount() {
    // REIS60: R$40 off each dependent activation, reusable
    let reis60 = coupon("fixed", "dependente", 4_000, true);

    let first = CouponService::apply_discount(10_000, &reis60);
    assert_eq!(first.final_cents, 6_000);

    // A second activation with the same coupon gets the same price
    let second = CouponService::apply_discount(10_000, &reis60);
    assert_eq!(second.final_cents, 6_000);
}

#[test]
fn test_full_discount_drives_price_to_zero() {
    let full = coupon("percentage", "titular", 100, false);
    let applied = CouponService::apply_discount(60_000, &full);
    assert_eq!(applied.discount_cents, 60_000);
    assert_eq!(applied.final_cents, 0);
}
