mod common;

use common::{advance, wait_for, Harness};
use hd_domain::recipient::Recipient;
use hd_domain::transport::TransportEvent;
use hd_sessions::SessionConfig;

#[tokio::test(start_paused = true)]
async fn single_user_gets_qualified_address_and_one_send_per_cycle() {
    let h = Harness::manual();
    let handle = h
        .registry
        .start("s1", h.users(&["9876543210"], &["hi"], 1))
        .unwrap();
    assert!(!h.registry.status("s1").connected);

    wait_for(|| h.transport.connect_count() == 1).await;
    h.transport.emit(TransportEvent::Open).await;
    wait_for(|| h.registry.status("s1").connected).await;

    wait_for(|| !h.transport.sent().is_empty()).await;
    let first = &h.transport.sent()[0];
    assert_eq!(first.address, "919876543210@s.whatsapp.net");
    assert_eq!(first.text, "hi");

    // A cycle is 450 ms pacing plus the 1 s interval.
    let before = h.transport.sent().len();
    advance(3).await;
    let after = h.transport.sent().len();
    assert!((2..=3).contains(&(after - before)), "sent {} in 3s", after - before);
    assert!(h.logged("s1", "Sent -> 919876543210@s.whatsapp.net (id: msg-1)"));

    handle.request_stop();
}

#[tokio::test(start_paused = true)]
async fn every_target_is_visited_before_the_template_advances() {
    let h = Harness::new();
    let handle = h
        .registry
        .start(
            "rot",
            h.users(&["9000000001", "9000000002"], &["a", "b", "c"], 2),
        )
        .unwrap();

    // Each completed cycle moves the cursor forward one template, wrapping.
    wait_for(|| handle.cursor() == 1).await;
    assert!(h.transport.sent().len() >= 2);
    wait_for(|| handle.cursor() == 2).await;
    assert!(h.transport.sent().len() >= 4);
    wait_for(|| handle.cursor() == 0).await;
    assert!(h.transport.sent().len() >= 6);

    wait_for(|| h.transport.sent().len() >= 7).await;
    let sent = h.transport.sent();

    let texts: Vec<_> = sent.iter().take(7).map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["a", "a", "b", "b", "c", "c", "a"]);
    for pair in sent[..6].chunks(2) {
        assert_eq!(pair[0].address, "919000000001@s.whatsapp.net");
        assert_eq!(pair[1].address, "919000000002@s.whatsapp.net");
    }

    handle.request_stop();
}

#[tokio::test(start_paused = true)]
async fn failed_recipient_does_not_block_the_rest() {
    let h = Harness::new();
    h.transport.fail_address("919000000002@s.whatsapp.net");
    let handle = h
        .registry
        .start(
            "iso",
            h.users(&["9000000001", "9000000002", "9000000003"], &["hello"], 5),
        )
        .unwrap();

    wait_for(|| h.transport.sent().len() >= 2).await;
    let addresses: Vec<_> = h.transport.sent().into_iter().map(|m| m.address).collect();
    assert_eq!(
        addresses[..2],
        [
            "919000000001@s.whatsapp.net".to_string(),
            "919000000003@s.whatsapp.net".to_string()
        ]
    );
    assert!(h.logged(
        "iso",
        "Failed -> 919000000002@s.whatsapp.net | recipient rejected"
    ));

    handle.request_stop();
}

#[tokio::test(start_paused = true)]
async fn prefix_is_joined_and_groups_use_group_suffix() {
    let h = Harness::new();
    let cfg = SessionConfig {
        targets: vec![
            Recipient::Group("120363001".into()),
            Recipient::Group("team@g.us".into()),
        ],
        templates: vec!["standup in 5".into()],
        prefix: "Bot:".into(),
        interval_secs: 1,
    };
    let handle = h.registry.start("grp", cfg).unwrap();

    wait_for(|| h.transport.sent().len() >= 2).await;
    let sent = h.transport.sent();
    assert_eq!(sent[0].address, "120363001@g.us");
    assert_eq!(sent[1].address, "team@g.us");
    assert!(sent.iter().all(|m| m.text == "Bot: standup in 5"));

    handle.request_stop();
}

#[tokio::test(start_paused = true)]
async fn stop_finishes_in_flight_cycle_step_then_tears_down() {
    let h = Harness::new();
    let handle = h
        .registry
        .start("s1", h.users(&["9876543210"], &["hi"], 1))
        .unwrap();
    wait_for(|| !h.transport.sent().is_empty()).await;

    h.registry.stop("s1").unwrap();
    assert!(!h.registry.status("s1").running);

    wait_for(|| h.registry.get("s1").is_none()).await;
    assert!(h.logged("s1", "Session stopped by user."));
    assert!(h.logged("s1", "Session ended."));
    assert_eq!(h.transport.logout_count(), 1);
    assert!(h.transport.close_count() >= 1);
    assert!(!handle.is_connected());

    // Logs outlive the session.
    assert!(!h.logs("s1").is_empty());
}
