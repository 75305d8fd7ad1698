use super::*;
use crate::completion::Role;

#[test]
fn guest_id_format() {
    let id = generate_guest_id();

    // "%y%m%d%H%M" prefix, dash, six hex chars
    let (prefix, suffix) = id.split_once('-').expect("guest id should contain a dash");
    assert_eq!(prefix.len(), 10);
    assert!(prefix.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(suffix.len(), 6);
    assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn guest_ids_are_unique() {
    let a = generate_guest_id();
    let b = generate_guest_id();
    assert_ne!(a, b);
}

#[test]
fn session_starts_unauthenticated() {
    let ctx = SessionContext::new(3);
    assert!(!ctx.is_active());
    assert_eq!(ctx.guest_id(), None);
    assert!(ctx.messages().is_empty());
    assert!(!ctx.welcome_sent());
}

#[test]
fn start_session_transitions_to_active() {
    let mut ctx = SessionContext::new(3);
    let id = ctx.start_session().to_string();

    assert!(ctx.is_active());
    assert_eq!(ctx.guest_id(), Some(id.as_str()));

    // Terminal state: starting again keeps the same identifier
    let again = ctx.start_session().to_string();
    assert_eq!(again, id);
}

#[test]
fn recent_history_windows_the_tail() {
    let mut ctx = SessionContext::new(3);
    for i in 0..20 {
        ctx.push_user(format!("u{i}"));
        ctx.push_assistant(format!("a{i}"));
    }

    let recent = ctx.recent_history(12);
    assert_eq!(recent.len(), 12);
    assert_eq!(recent[0].content, "u14");
    assert_eq!(recent[11].content, "a19");

    // Window larger than the transcript returns everything
    let all = ctx.recent_history(100);
    assert_eq!(all.len(), 40);
}

#[test]
fn messages_preserve_append_order_and_roles() {
    let mut ctx = SessionContext::new(3);
    ctx.push_user("hello");
    ctx.push_assistant("hi there");

    let messages = ctx.messages();
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "hi there");
}

#[test]
fn unsaved_welcome_is_taken_once() {
    let mut ctx = SessionContext::new(3);
    ctx.set_unsaved_welcome("Hello, I am the assistant");

    assert!(ctx.welcome_sent());
    assert_eq!(
        ctx.take_unsaved_welcome().as_deref(),
        Some("Hello, I am the assistant")
    );
    assert_eq!(ctx.take_unsaved_welcome(), None);
}

#[test]
fn mark_welcome_sent_without_message() {
    let mut ctx = SessionContext::new(3);
    ctx.mark_welcome_sent();

    assert!(ctx.welcome_sent());
    assert_eq!(ctx.take_unsaved_welcome(), None);
}
