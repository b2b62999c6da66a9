//! Router behaviour against in-memory brokerage and language fakes.

mod common;

use common::{BrokerCall, FakeBroker, FakeLanguage};
use std::sync::Arc;
use std::time::Duration;
use teletrader::bot::{
    DispatchError, InboundMessage, OutboundResponse, Router, EMPTY_TEXT_PROMPT,
    INVALID_BUTTON_TEXT, NOT_AUTHORIZED_TEXT, UNKNOWN_COMMAND_TEXT,
};
use teletrader::llm::LlmError;
use teletrader::market::Direction;
use tokio_util::sync::CancellationToken;

const CHAT: i64 = 4242;

struct Harness {
    broker: Arc<FakeBroker>,
    language: Arc<FakeLanguage>,
    router: Router,
}

fn harness_with(broker: FakeBroker, secret: Option<&str>) -> Harness {
    harness_full(broker, FakeLanguage::replying("R_50 looks calm today."), secret)
}

fn harness_full(broker: FakeBroker, language: FakeLanguage, secret: Option<&str>) -> Harness {
    let broker = Arc::new(broker);
    let language = Arc::new(language);
    let router = Router::builder(broker.clone(), language.clone())
        .allowed_users(["@Alice", "bob"])
        .symbols(vec!["R_10".into(), "R_50".into()])
        .callback_secret(secret)
        .build();
    Harness {
        broker,
        language,
        router,
    }
}

fn harness() -> Harness {
    harness_with(FakeBroker::with_price(123.45), None)
}

fn cmd(user: &str, name: &str, args: &[&str]) -> InboundMessage {
    InboundMessage::command(
        CHAT,
        10,
        user,
        name,
        args.iter().map(|a| a.to_string()).collect(),
    )
}

async fn dispatch(h: &Harness, msg: &InboundMessage) -> OutboundResponse {
    h.router
        .dispatch(&CancellationToken::new(), msg)
        .await
        .expect("dispatch")
}

#[tokio::test]
async fn unauthorized_users_get_warning_and_no_collaborator_calls() {
    let h = harness();
    for user in ["", "mallory", "alice_", "@", "b0b"] {
        for msg in [
            cmd(user, "balance", &[]),
            cmd(user, "buy", &["R_50", "10"]),
            InboundMessage::text(CHAT, 1, user, "hi"),
            InboundMessage::callback(CHAT, 1, user, "trade:R_50:10.00:up"),
        ] {
            let resp = dispatch(&h, &msg).await;
            assert_eq!(resp.text, NOT_AUTHORIZED_TEXT, "user {:?}", user);
            assert!(resp.buttons.is_empty());
        }
    }
    assert!(h.broker.calls().is_empty());
    assert!(h.language.inputs().is_empty());
}

#[tokio::test]
async fn allow_list_ignores_case_and_at_sign() {
    let h = harness();
    let resp = dispatch(&h, &cmd("alice", "help", &[])).await;
    assert_ne!(resp.text, NOT_AUTHORIZED_TEXT);
    let resp = dispatch(&h, &cmd("@BOB", "help", &[])).await;
    assert_ne!(resp.text, NOT_AUTHORIZED_TEXT);
}

#[tokio::test]
async fn malformed_amounts_never_trade() {
    let h = harness();
    for amount in ["ten", "1,5", "12abc", "$5"] {
        let resp = dispatch(&h, &cmd("alice", "buy", &["R_50", amount])).await;
        assert_eq!(
            resp.text, "❌ Invalid amount format. Please provide a number.",
            "amount {:?}",
            amount
        );
        assert!(resp.buttons.is_empty());
    }
    assert!(h.broker.calls().is_empty());
}

#[tokio::test]
async fn buy_without_arguments_shows_usage() {
    let h = harness();
    let resp = dispatch(&h, &cmd("alice", "buy", &["R_50"])).await;
    assert!(resp.text.contains("/buy R_50 10.50"));
    assert!(h.broker.calls().is_empty());
}

#[tokio::test]
async fn help_and_start_are_idempotent() {
    let h = harness();
    for name in ["help", "start"] {
        let first = dispatch(&h, &cmd("alice", name, &[])).await.text;
        for _ in 0..3 {
            assert_eq!(dispatch(&h, &cmd("alice", name, &[])).await.text, first);
        }
    }
    let help = dispatch(&h, &cmd("alice", "help", &[])).await.text;
    assert!(help.contains("/buy <symbol> <amount>"));
    assert!(!help.contains("/sell"));
    assert!(h.broker.calls().is_empty());
}

#[tokio::test]
async fn price_scenario() {
    let h = harness();
    let resp = dispatch(&h, &cmd("alice", "price", &["R_50"])).await;
    assert_eq!(resp.text, "💹 R_50 price: 123.45");
    assert_eq!(resp.chat_id, CHAT);
    assert_eq!(resp.reply_to_message_id, 10);
    assert_eq!(h.broker.calls(), vec![BrokerCall::Price("R_50".into())]);
}

#[tokio::test]
async fn balance_position_and_symbols() {
    let h = harness();
    assert_eq!(
        dispatch(&h, &cmd("alice", "balance", &[])).await.text,
        "💰 Balance: 1000.00 USD"
    );
    assert_eq!(
        dispatch(&h, &cmd("alice", "position", &[])).await.text,
        "📊 Current positions:\n\nNo open positions"
    );
    assert_eq!(
        dispatch(&h, &cmd("alice", "symbols", &[])).await.text,
        "Available symbols:\n\nR_10\nR_50"
    );
}

#[tokio::test]
async fn buy_offers_up_and_down_buttons() {
    let h = harness();
    let resp = dispatch(&h, &cmd("alice", "buy", &["R_50", "10.5"])).await;
    assert_eq!(resp.text, "Choose direction for R_50 $10.50:");
    let data: Vec<&str> = resp
        .buttons
        .iter()
        .flatten()
        .map(|b| b.callback_data.as_str())
        .collect();
    assert_eq!(data, vec!["trade:R_50:10.50:up", "trade:R_50:10.50:down"]);
    assert!(h.broker.calls().is_empty());
}

#[tokio::test]
async fn clicking_up_places_call_trade() {
    let h = harness();
    let click = InboundMessage::callback(CHAT, 11, "alice", "trade:R_50:10.50:up");
    let resp = dispatch(&h, &click).await;
    assert_eq!(
        h.broker.calls(),
        vec![BrokerCall::PlaceTrade("R_50".into(), 10.5, Direction::Call)]
    );
    assert!(resp.text.contains('⬆'));
    assert!(resp.text.contains("$10.50"));
    assert_eq!(resp.reply_to_message_id, 11);
}

#[tokio::test]
async fn clicking_down_places_put_trade() {
    let h = harness();
    let click = InboundMessage::callback(CHAT, 11, "alice", "trade:R_50:10.50:down");
    let resp = dispatch(&h, &click).await;
    assert_eq!(
        h.broker.calls(),
        vec![BrokerCall::PlaceTrade("R_50".into(), 10.5, Direction::Put)]
    );
    assert!(resp.text.contains('⬇'));
}

#[tokio::test]
async fn button_round_trip_rounds_to_cents() {
    for secret in [None, Some("s3cret")] {
        let h = harness_with(FakeBroker::default(), secret);
        let offer = dispatch(&h, &cmd("alice", "buy", &["R_75", "7.129"])).await;
        let up = offer.buttons[0][0].callback_data.clone();
        dispatch(&h, &InboundMessage::callback(CHAT, 12, "alice", up)).await;
        assert_eq!(
            h.broker.calls(),
            vec![BrokerCall::PlaceTrade("R_75".into(), 7.13, Direction::Call)]
        );
    }
}

#[tokio::test]
async fn signed_buttons_are_bound_to_their_chat() {
    let h = harness_with(FakeBroker::default(), Some("s3cret"));
    let offer = dispatch(&h, &cmd("alice", "buy", &["R_50", "1"])).await;
    let up = offer.buttons[0][0].callback_data.clone();
    assert_eq!(up.split(':').count(), 5);

    let elsewhere = InboundMessage::callback(CHAT + 1, 12, "alice", up);
    assert_eq!(dispatch(&h, &elsewhere).await.text, INVALID_BUTTON_TEXT);
    let unsigned = InboundMessage::callback(CHAT, 12, "alice", "trade:R_50:1.00:up");
    assert_eq!(dispatch(&h, &unsigned).await.text, INVALID_BUTTON_TEXT);
    assert!(h.broker.calls().is_empty());
}

#[tokio::test]
async fn malformed_or_foreign_callbacks_are_rejected() {
    let h = harness();
    for data in [
        "garbage",
        "trade:R_50:abc:up",
        "trade:R_50:1.00:sideways",
        "trade:R_50:-5.00:up",
        "chart:R_50:1.00:up",
    ] {
        let resp = dispatch(&h, &InboundMessage::callback(CHAT, 1, "alice", data)).await;
        assert_eq!(resp.text, INVALID_BUTTON_TEXT, "data {:?}", data);
    }
    assert!(h.broker.calls().is_empty());
}

#[tokio::test]
async fn unknown_command_reply() {
    let h = harness();
    let resp = dispatch(&h, &cmd("alice", "sell", &["R_50", "1"])).await;
    assert_eq!(resp.text, UNKNOWN_COMMAND_TEXT);
}

#[tokio::test]
async fn free_text_goes_to_language_backend() {
    let h = harness();
    let resp = dispatch(&h, &InboundMessage::text(CHAT, 3, "bob", "how is R_50?")).await;
    assert_eq!(resp.text, "R_50 looks calm today.");
    assert_eq!(h.language.inputs(), vec!["how is R_50?".to_string()]);

    let resp = dispatch(&h, &InboundMessage::text(CHAT, 4, "bob", "   ")).await;
    assert_eq!(resp.text, EMPTY_TEXT_PROMPT);
    assert_eq!(h.language.inputs().len(), 1);
}

#[tokio::test]
async fn brokerage_failure_is_a_dispatch_error() {
    let h = harness_with(FakeBroker::failing(), None);
    let err = h
        .router
        .dispatch(&CancellationToken::new(), &cmd("alice", "balance", &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Brokerage { op: "get balance", .. }));

    for (name, args, expected) in [
        ("price", &["R_50"][..], "get price"),
        ("position", &[][..], "get position"),
    ] {
        let err = h
            .router
            .dispatch(&CancellationToken::new(), &cmd("alice", name, args))
            .await
            .unwrap_err();
        assert!(
            matches!(err, DispatchError::Brokerage { op, .. } if op == expected),
            "{name}: {err}"
        );
    }

    let click = InboundMessage::callback(CHAT, 1, "alice", "trade:R_50:2.00:up");
    let err = h
        .router
        .dispatch(&CancellationToken::new(), &click)
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("failed to place trade"));
}

#[tokio::test]
async fn language_failure_is_a_dispatch_error() {
    let h = harness_full(FakeBroker::default(), FakeLanguage::failing(), None);
    let err = h
        .router
        .dispatch(
            &CancellationToken::new(),
            &InboundMessage::text(CHAT, 5, "bob", "what's the weather?"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Language(LlmError::UnknownFunction(_))));
    assert_eq!(h.language.inputs(), vec!["what's the weather?".to_string()]);
    assert!(h.broker.calls().is_empty());
}

#[tokio::test]
async fn cancellation_aborts_pending_call() {
    let h = harness_with(FakeBroker::slow(Duration::from_secs(30)), None);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let started = std::time::Instant::now();
    let err = h
        .router
        .dispatch(&cancel, &cmd("alice", "price", &["R_50"]))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
}
