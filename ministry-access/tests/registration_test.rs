//! Integration tests for RSVP, cancellation and waiting-list promotion.

mod common;

use common::{event_details, TestApp};
use ministry_access::models::{CancelOutcome, RegistrationStatus, Role, RsvpStatus};
use std::collections::HashSet;

async fn create_event(app: &TestApp, capacity: Option<u32>) -> String {
    app.sign_in("organizer", Role::CoreMember).await;
    app.app
        .events
        .create_event(event_details("Night of Worship", capacity))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_cancel_promotes_waiter_into_freed_seat() {
    let app = TestApp::new();
    let id = create_event(&app, Some(1)).await;
    let registrations = &app.app.registrations;

    assert_eq!(registrations.rsvp(&id, "a").await.unwrap(), RsvpStatus::Registered);
    assert_eq!(registrations.rsvp(&id, "b").await.unwrap(), RsvpStatus::WaitingList);

    assert_eq!(
        registrations.cancel(&id, "a").await.unwrap(),
        CancelOutcome::Cancelled {
            promoted: Some("b".to_string())
        }
    );

    let event = app.stored_event(&id).await;
    assert_eq!(event.attendees, vec!["b".to_string()]);
    assert!(event.waiting_list.is_empty());
}

#[tokio::test]
async fn test_waiting_list_is_fifo() {
    let app = TestApp::new();
    let id = create_event(&app, Some(1)).await;
    let registrations = &app.app.registrations;

    for user in ["a", "b", "c", "d"] {
        registrations.rsvp(&id, user).await.unwrap();
    }
    assert_eq!(
        registrations.status(&id, "d").await.unwrap(),
        RegistrationStatus::WaitingList { position: 3 }
    );

    registrations.cancel(&id, "a").await.unwrap();
    assert_eq!(app.stored_event(&id).await.attendees, vec!["b".to_string()]);
    registrations.cancel(&id, "b").await.unwrap();
    assert_eq!(app.stored_event(&id).await.attendees, vec!["c".to_string()]);
    assert_eq!(
        registrations.status(&id, "d").await.unwrap(),
        RegistrationStatus::WaitingList { position: 1 }
    );
}

#[tokio::test]
async fn test_cancel_and_rsvp_are_idempotent() {
    let app = TestApp::new();
    let id = create_event(&app, Some(2)).await;
    let registrations = &app.app.registrations;

    registrations.rsvp(&id, "a").await.unwrap();
    registrations.rsvp(&id, "a").await.unwrap();
    assert_eq!(app.stored_event(&id).await.attendees, vec!["a".to_string()]);

    assert_eq!(
        registrations.cancel(&id, "a").await.unwrap(),
        CancelOutcome::Cancelled { promoted: None }
    );
    assert_eq!(
        registrations.cancel(&id, "a").await.unwrap(),
        CancelOutcome::NotRegistered
    );
    assert!(app.stored_event(&id).await.attendees.is_empty());
}

#[tokio::test]
async fn test_leaving_waiting_list_promotes_nobody() {
    let app = TestApp::new();
    let id = create_event(&app, Some(1)).await;
    let registrations = &app.app.registrations;

    registrations.rsvp(&id, "a").await.unwrap();
    registrations.rsvp(&id, "b").await.unwrap();
    registrations.rsvp(&id, "c").await.unwrap();

    assert_eq!(
        registrations.cancel(&id, "b").await.unwrap(),
        CancelOutcome::LeftWaitingList
    );
    let event = app.stored_event(&id).await;
    assert_eq!(event.attendees, vec!["a".to_string()]);
    assert_eq!(event.waiting_list, vec!["c".to_string()]);
}

#[tokio::test]
async fn test_unbounded_event_seats_everyone() {
    let app = TestApp::new();
    let id = create_event(&app, None).await;
    for i in 0..50 {
        let status = app
            .app
            .registrations
            .rsvp(&id, &format!("user-{}", i))
            .await
            .unwrap();
        assert_eq!(status, RsvpStatus::Registered);
    }
    assert_eq!(app.stored_event(&id).await.attendees.len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rsvps_never_exceed_capacity() {
    const CAPACITY: u32 = 5;
    const USERS: u32 = 24;

    let app = TestApp::for_contention(USERS);
    let id = create_event(&app, Some(CAPACITY)).await;

    let handles: Vec<_> = (0..USERS)
        .map(|i| {
            let registrations = app.app.registrations.clone();
            let id = id.clone();
            tokio::spawn(async move { registrations.rsvp(&id, &format!("user-{}", i)).await })
        })
        .collect();

    let mut registered = 0;
    let mut waiting = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            RsvpStatus::Registered => registered += 1,
            RsvpStatus::WaitingList => waiting += 1,
        }
    }
    assert_eq!(registered, CAPACITY);
    assert_eq!(waiting, USERS - CAPACITY);

    let event = app.stored_event(&id).await;
    assert_eq!(event.attendees.len(), CAPACITY as usize);
    assert_eq!(event.waiting_list.len(), (USERS - CAPACITY) as usize);
    assert!(event.roster_is_consistent());

    let everyone: HashSet<_> = event.attendees.iter().chain(&event.waiting_list).collect();
    assert_eq!(everyone.len(), USERS as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancellations_promote_in_order() {
    let app = TestApp::for_contention(3);
    let id = create_event(&app, Some(3)).await;
    let registrations = app.app.registrations.clone();
    for user in ["a1", "a2", "a3", "w1", "w2", "w3", "w4"] {
        registrations.rsvp(&id, user).await.unwrap();
    }

    let handles: Vec<_> = ["a1", "a2", "a3"]
        .into_iter()
        .map(|user| {
            let registrations = registrations.clone();
            let id = id.clone();
            tokio::spawn(async move { registrations.cancel(&id, user).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let event = app.stored_event(&id).await;
    assert_eq!(event.attendees, vec!["w1", "w2", "w3"]);
    assert_eq!(event.waiting_list, vec!["w4"]);
}

#[tokio::test]
async fn test_fill_open_seats_and_events_for_user() {
    let app = TestApp::new();
    let id = create_event(&app, Some(1)).await;
    let other = create_event(&app, None).await;
    let registrations = &app.app.registrations;

    registrations.rsvp(&id, "a").await.unwrap();
    registrations.rsvp(&id, "b").await.unwrap();
    registrations.rsvp(&other, "b").await.unwrap();

    // Nothing to fill while the cap holds.
    assert!(registrations.fill_open_seats(&id).await.unwrap().is_empty());

    let mine = app.app.events.events_for_user("b").await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(app.app.events.events_for_user("z").await.unwrap().is_empty());
}
