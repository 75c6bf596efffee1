use std::time::Duration;

use banter_bots::FALLBACK_REPLY;
use banter_config::Settings;
use banter_core::{BotConfig, ChatMessage, MessageKind};
use banter_session::TransportEvent;

use crate::fixtures::{TestRoom, wait_until};
use crate::fixtures::transport::LOCAL_IDENTITY;

fn bot_settings() -> Settings {
    let mut settings = Settings::default();
    let mut bota = BotConfig::new("BotA");
    bota.triggers = vec!["bota".into()];
    bota.shyness = 0.0;
    settings.bots.roster.push(bota);
    settings
}

fn bot_messages(room: &TestRoom) -> Vec<ChatMessage> {
    room.chat
        .history()
        .into_iter()
        .filter(|m| m.kind == MessageKind::Bot)
        .collect()
}

fn local_user_message(content: &str) -> ChatMessage {
    ChatMessage {
        id: nanoid(),
        sender_id: LOCAL_IDENTITY.to_string(),
        sender_name: "Local".to_string(),
        content: content.to_string(),
        timestamp: 1,
        kind: MessageKind::User,
    }
}

fn nanoid() -> String {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    format!("bot-fixture-{}", NEXT.fetch_add(1, Ordering::SeqCst))
}

#[tokio::test]
async fn mention_triggers_with_certainty_and_cooldown_holds() {
    let room = TestRoom::with_settings(bot_settings());
    room.connect().await.unwrap();
    room.generator.enqueue_reply("BotA at your service");

    // Mentions bypass the probabilistic path entirely.
    room.chat
        .send_message("@BotA hello", MessageKind::User)
        .await
        .unwrap();
    assert!(
        wait_until(Duration::from_secs(1), || bot_messages(&room).len() == 1).await
    );
    let reply = &bot_messages(&room)[0];
    assert_eq!(reply.sender_name, "BotA");
    assert_eq!(reply.content, "BotA at your service");

    // Alone with the bot the spontaneous probability is 1.0, so only the
    // cooldown explains silence on the next message.
    room.chat
        .send_message("what a nice day", MessageKind::User)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(bot_messages(&room).len(), 1);
    assert_eq!(room.generator.calls(), 1);
}

#[tokio::test]
async fn mention_wins_regardless_of_crowd_size() {
    let room = TestRoom::with_settings(bot_settings());
    room.connect().await.unwrap();
    for i in 0..6 {
        room.session().emit(TransportEvent::ParticipantJoined {
            identity: format!("guest-{i}"),
            display_name: format!("Guest {i}"),
        });
    }
    assert!(
        wait_until(Duration::from_secs(1), || {
            room.controller.participant_count() == 7
        })
        .await
    );

    room.generator.enqueue_reply("summoned");
    room.chat
        .send_message("hey bota, settle this", MessageKind::User)
        .await
        .unwrap();
    assert!(
        wait_until(Duration::from_secs(1), || bot_messages(&room).len() == 1).await
    );
}

#[tokio::test]
async fn generation_failure_substitutes_the_fallback() {
    let room = TestRoom::with_settings(bot_settings());
    room.connect().await.unwrap();
    room.generator.enqueue_failure("model overloaded");

    room.chat
        .send_message("@BotA are you there?", MessageKind::User)
        .await
        .unwrap();
    assert!(
        wait_until(Duration::from_secs(1), || bot_messages(&room).len() == 1).await
    );
    assert_eq!(bot_messages(&room)[0].content, FALLBACK_REPLY);
}

#[tokio::test]
async fn blank_generation_result_substitutes_the_fallback() {
    let room = TestRoom::with_settings(bot_settings());
    room.connect().await.unwrap();
    room.generator.enqueue_reply("   ");

    room.chat
        .send_message("@BotA ping", MessageKind::User)
        .await
        .unwrap();
    assert!(
        wait_until(Duration::from_secs(1), || bot_messages(&room).len() == 1).await
    );
    assert_eq!(bot_messages(&room)[0].content, FALLBACK_REPLY);
}

#[tokio::test]
async fn disabled_bot_stays_silent_even_when_mentioned() {
    let room = TestRoom::with_settings(bot_settings());
    room.connect().await.unwrap();
    assert!(room.engine.set_enabled("BotA", false));

    room.chat
        .send_message("@BotA hello?", MessageKind::User)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(bot_messages(&room).is_empty());
    assert_eq!(room.generator.calls(), 0);
}

#[tokio::test]
async fn evaluate_ignores_non_user_messages() {
    let room = TestRoom::with_settings(bot_settings());
    room.connect().await.unwrap();

    let mut msg = local_user_message("@BotA hi");
    msg.kind = MessageKind::System;
    assert!(room.engine.evaluate(&msg).await.is_none());
    assert_eq!(room.generator.calls(), 0);
}

#[tokio::test]
async fn alone_with_the_bot_every_user_message_draws_a_reply() {
    let room = TestRoom::with_settings(bot_settings());
    room.connect().await.unwrap();
    room.generator.enqueue_reply("of course");

    // Direct evaluation, bypassing the attach task, with no mention in the
    // content: participant count 1 forces probability 1.0.
    let sent = room
        .engine
        .evaluate(&local_user_message("anyone around"))
        .await;
    assert!(sent.is_some());
    assert_eq!(sent.unwrap().content, "of course");
}

#[tokio::test]
async fn reply_for_a_superseded_session_is_discarded() {
    let room = TestRoom::with_settings(bot_settings());
    room.connect().await.unwrap();
    room.generator.set_delay(Duration::from_millis(200));
    room.generator.enqueue_reply("too late");

    room.chat
        .send_message("@BotA slow down", MessageKind::User)
        .await
        .unwrap();

    // Tear the session down while the generation request is in flight.
    tokio::time::sleep(Duration::from_millis(50)).await;
    room.controller.disconnect().await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(
        bot_messages(&room).is_empty(),
        "a stale continuation must not publish into a newer session"
    );
}

#[tokio::test]
async fn cooldowns_are_cleared_when_the_session_ends() {
    let room = TestRoom::with_settings(bot_settings());
    room.connect().await.unwrap();
    room.generator.enqueue_reply("first");
    room.generator.enqueue_reply("second");

    room.chat
        .send_message("@BotA one", MessageKind::User)
        .await
        .unwrap();
    assert!(
        wait_until(Duration::from_secs(1), || bot_messages(&room).len() == 1).await
    );

    // Cooldown is now armed, but it belongs to the torn-down session;
    // the next session starts fresh.
    room.controller.disconnect().await;
    room.connect().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(1), || {
            // Cooldown reset happens on the engine's event task.
            room.controller.is_connected()
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    room.chat
        .send_message("@BotA two", MessageKind::User)
        .await
        .unwrap();
    assert!(
        wait_until(Duration::from_secs(1), || bot_messages(&room).len() == 2).await
    );
}
