use cucumber::{then, when};
use hpg_common::{Amount, CurrencyCode};
use hpg_payment_engine::{
    db_types::{OrderId, PaymentTransaction},
    helpers::TokenCodec,
    ReconciliationValidator,
};
use serde_json::json;

use crate::cucumber::{
    payment_world::{APPLICATION_ID, MERCHANT_ID},
    PaymentWorld,
};

fn gateway_payload(codec: &TokenCodec, tx: &PaymentTransaction, result: i32, amount: &Amount) -> String {
    let token = codec.issue(amount, &tx.merchant_reference, None).expect("Error issuing gateway token");
    let success = matches!(result, 0 | 1);
    json!({
        "Result": result,
        "Status": if success { "Approved" } else { "Declined" },
        "MerchantReference": tx.merchant_reference.as_str(),
        "TransactionIndex": format!("GW-{}", tx.id),
        "ErrorCode": if success { None } else { Some("05") },
        "ErrorMessage": if success { None } else { Some("Do not honour") },
        "Amount": amount.to_canonical_string(),
        "CurrencyCode": tx.currency.as_str(),
        "Token": token,
    })
    .to_string()
}

async fn deliver(world: &mut PaymentWorld, order_id: String, payload: String) {
    let webhooks = &world.system().webhooks;
    let id = webhooks.ingest(&payload, "payment.result").await.expect("Error ingesting notification");
    let outcome = webhooks.process(id).await.expect("Error processing notification");
    world.last_outcome = Some(outcome);
    world.payloads.insert(order_id, payload);
}

#[when(expr = "I initiate a payment for order {word} of {word} {word}")]
async fn initiate_payment(world: &mut PaymentWorld, order_id: String, amount: String, currency: String) {
    let amount = amount.parse::<Amount>().expect("Not a valid amount");
    let currency = currency.parse::<CurrencyCode>().expect("Not a valid currency");
    let (tx, _) = world
        .system()
        .flow
        .initiate_payment(OrderId::from(order_id.as_str()), amount, currency)
        .await
        .expect("Error initiating payment");
    world.transactions.insert(order_id, tx);
}

#[when(expr = "the gateway notifies result {int} for order {word}")]
async fn notify(world: &mut PaymentWorld, result: i32, order_id: String) {
    let tx = world.transaction(&order_id);
    let payload = gateway_payload(world.system().codec(), &tx, result, &tx.amount);
    deliver(world, order_id, payload).await;
}

#[when(expr = "the gateway notifies result {int} for order {word} with amount {word}")]
async fn notify_with_amount(world: &mut PaymentWorld, result: i32, order_id: String, amount: String) {
    let tx = world.transaction(&order_id);
    let amount = amount.parse::<Amount>().expect("Not a valid amount");
    let payload = gateway_payload(world.system().codec(), &tx, result, &amount);
    deliver(world, order_id, payload).await;
}

#[when(expr = "the gateway delivers the last notification for order {word} again")]
async fn notify_again(world: &mut PaymentWorld, order_id: String) {
    let payload = world.payloads.get(&order_id).cloned().expect("Nothing was delivered for this order yet");
    deliver(world, order_id, payload).await;
}

#[then(expr = "the outbound token for order {word} verifies with amount {word}")]
async fn outbound_token_verifies(world: &mut PaymentWorld, order_id: String, amount: String) {
    let tx = world.transaction(&order_id);
    let amount = amount.parse::<Amount>().expect("Not a valid amount");
    let claims = world
        .system()
        .codec()
        .verify(&tx.outbound_token, &amount, &tx.merchant_reference)
        .expect("The outbound token did not verify");
    assert_eq!(claims.amount, amount.to_canonical_string());
    assert_eq!(claims.mref, tx.merchant_reference.as_str());
}

#[then(expr = "the outbound token reconciles with the payment for order {word}")]
async fn outbound_token_reconciles(world: &mut PaymentWorld, order_id: String) {
    let tx = world.transaction(&order_id);
    let codec = world.system().codec();
    let claims = codec.decode(&tx.outbound_token).expect("The outbound token did not decode");
    assert_eq!(claims.cuid, MERCHANT_ID);
    assert_eq!(claims.auid, APPLICATION_ID);
    ReconciliationValidator::new(codec.config()).validate(&tx, &claims).expect("Claims do not reconcile");
}

async fn fresh_transaction(world: &PaymentWorld, order_id: &str) -> PaymentTransaction {
    let tx = world.transaction(order_id);
    world.system().flow.ledger().get(tx.id).await.expect("Error fetching transaction")
}

#[then(expr = "the payment for order {word} has status {word}")]
async fn check_status(world: &mut PaymentWorld, order_id: String, status: String) {
    let tx = fresh_transaction(world, &order_id).await;
    assert_eq!(tx.status.to_string(), status, "Unexpected status for order {order_id}");
}

#[then(expr = "the payment for order {word} is successful")]
async fn check_success(world: &mut PaymentWorld, order_id: String) {
    let tx = fresh_transaction(world, &order_id).await;
    assert!(tx.success, "Payment for {order_id} is not marked as successful");
    assert!(tx.completed_at.is_some());
}

#[then(expr = "the payment for order {word} is not successful")]
async fn check_not_success(world: &mut PaymentWorld, order_id: String) {
    let tx = fresh_transaction(world, &order_id).await;
    assert!(!tx.success, "Payment for {order_id} is marked as successful");
}

#[then(expr = "the payment for order {word} has error code {string}")]
async fn check_error_code(world: &mut PaymentWorld, order_id: String, code: String) {
    let tx = fresh_transaction(world, &order_id).await;
    assert_eq!(tx.error_code.as_deref(), Some(code.as_str()));
    assert!(tx.error_message.is_some());
}

#[then(expr = "the last notification outcome is {string}")]
async fn check_outcome(world: &mut PaymentWorld, label: String) {
    let outcome = world.last_outcome.as_ref().expect("No notification has been processed");
    assert_eq!(outcome.label(), label, "Outcome was {outcome}");
}

#[then(expr = "the last rejection mentions {string}")]
async fn check_rejection_reason(world: &mut PaymentWorld, text: String) {
    let outcome = world.last_outcome.as_ref().expect("No notification has been processed");
    let reason = outcome.failure_reason().expect("The last notification was not rejected");
    assert!(reason.contains(&text), "'{reason}' does not mention '{text}'");
}

#[then(expr = "order {word} has {int} notifications on record")]
async fn check_notification_count(world: &mut PaymentWorld, order_id: String, count: usize) {
    let tx = world.transaction(&order_id);
    let trail = world.system().webhooks.notifications_for_transaction(tx.id).await.expect("Error fetching notifications");
    assert_eq!(trail.len(), count);
    assert!(trail.iter().all(|n| n.processed));
}
