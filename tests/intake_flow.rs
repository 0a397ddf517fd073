//! End-to-end intake conversations through the public API, against an
//! in-memory or file-backed libSQL store.

use std::sync::Arc;

use intake_desk::codec::FieldCodec;
use intake_desk::intake::prompts;
use intake_desk::intake::{Field, IntakeManager, IntakeStep, SessionStore};
use intake_desk::store::{LibSqlBackend, RecordStore, Table};

struct Harness {
    manager: IntakeManager,
    store: Arc<LibSqlBackend>,
    codec: FieldCodec,
}

async fn harness() -> Harness {
    let codec = FieldCodec::from_base64_key(&FieldCodec::generate_key()).unwrap();
    let store = Arc::new(LibSqlBackend::new_memory(codec.clone()).await.unwrap());
    let manager = IntakeManager::new(store.clone(), SessionStore::new(None));
    Harness {
        manager,
        store,
        codec,
    }
}

impl Harness {
    async fn say(&self, user: &str, request_id: &str, text: &str) -> String {
        self.manager
            .on_text_event(user, request_id, text)
            .await
            .unwrap()
            .expect("reply while a flow is active")
            .text
    }
}

#[tokio::test]
async fn scenario_a_full_flow_persists_records() {
    let h = harness().await;
    assert_eq!(h.manager.on_start_flow("U1").await, prompts::PROBLEM_PROMPT);

    let replies = [
        h.say("U1", "e1", "printer broken").await,
        h.say("U1", "e2", "Ann").await,
        h.say("U1", "e3", "+79991234567").await,
        h.say("U1", "e4", "tomorrow 10am").await,
    ];
    assert_eq!(replies[0], prompts::NAME_PROMPT);
    assert_eq!(replies[1], prompts::phone_prompt("Ann"));
    assert_eq!(replies[2], prompts::TIME_PROMPT);
    assert!(replies[3].contains("Ann"));
    assert_eq!(replies[3], prompts::confirmation("Ann"));

    let user = h.store.get_user("U1").await.unwrap().unwrap();
    assert_eq!(user.user_name, "Ann");
    assert_eq!(user.contact_info, "+79991234567");

    let requests = h.store.list_user_requests("U1").await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].request_id, "e4");
    assert_eq!(requests[0].problem_description, "printer broken");
    assert_eq!(requests[0].contact_time, "tomorrow 10am");

    // Session is gone; further text is ignored.
    assert!(h.manager.on_text_event("U1", "e5", "thanks").await.unwrap().is_none());
}

#[tokio::test]
async fn scenario_b_invalid_name_reprompts() {
    let h = harness().await;
    h.manager.on_start_flow("U1").await;
    h.say("U1", "e1", "broken").await;

    assert_eq!(h.say("U1", "e2", "Ann1").await, prompts::NAME_ERROR);
    let session = h.manager.sessions().get("U1").await.unwrap();
    assert_eq!(session.step, IntakeStep::AwaitingName);
    assert_eq!(session.draft.len(), 1);

    assert_eq!(h.say("U1", "e3", "Ann").await, prompts::phone_prompt("Ann"));
    assert_eq!(h.manager.current_step("U1").await, Some(IntakeStep::AwaitingPhone));
}

#[tokio::test]
async fn scenario_c_invalid_phone_reprompts() {
    let h = harness().await;
    h.manager.on_start_flow("U1").await;
    h.say("U1", "e1", "broken").await;
    h.say("U1", "e2", "Ann").await;

    assert_eq!(h.say("U1", "e3", "12345").await, prompts::PHONE_ERROR);
    assert_eq!(h.manager.current_step("U1").await, Some(IntakeStep::AwaitingPhone));

    assert_eq!(h.say("U1", "e4", "89991234567").await, prompts::TIME_PROMPT);
    let session = h.manager.sessions().get("U1").await.unwrap();
    assert_eq!(session.draft.get(Field::ContactInfo), Some("89991234567"));
}

#[tokio::test]
async fn scenario_d_concurrent_users_are_isolated() {
    let h = Arc::new(harness().await);
    h.manager.on_start_flow("U1").await;
    h.manager.on_start_flow("U2").await;

    let run = |user: &'static str, problem: &'static str, name: &'static str| {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            let mut replies = Vec::new();
            for (i, text) in [problem, name, "89991234567", "evening"].iter().enumerate() {
                replies.push(h.say(user, &format!("{user}-{i}"), text).await);
                tokio::task::yield_now().await;
            }
            replies
        })
    };

    let (u1, u2) = tokio::join!(run("U1", "printer", "ann"), run("U2", "scanner", "bob"));
    let (u1, u2) = (u1.unwrap(), u2.unwrap());

    assert_eq!(u1[1], prompts::phone_prompt("Ann"));
    assert_eq!(u2[1], prompts::phone_prompt("Bob"));
    assert_eq!(u1[3], prompts::confirmation("Ann"));
    assert_eq!(u2[3], prompts::confirmation("Bob"));

    let r1 = h.store.list_user_requests("U1").await.unwrap();
    let r2 = h.store.list_user_requests("U2").await.unwrap();
    assert_eq!(r1[0].problem_description, "printer");
    assert_eq!(r2[0].problem_description, "scanner");
    assert_eq!(h.store.get_user("U2").await.unwrap().unwrap().user_name, "Bob");
}

#[tokio::test]
async fn restart_treats_next_message_as_problem() {
    let h = harness().await;
    h.manager.on_start_flow("U1").await;
    h.say("U1", "e1", "old problem").await;
    h.say("U1", "e2", "Ann").await;

    h.manager.on_start_flow("U1").await;
    assert_eq!(h.say("U1", "e3", "new problem").await, prompts::NAME_PROMPT);
    let session = h.manager.sessions().get("U1").await.unwrap();
    assert_eq!(session.draft.get(Field::ProblemDescription), Some("new problem"));
    assert_eq!(session.draft.get(Field::UserName), None);
}

#[tokio::test]
async fn repeat_submission_overwrites_user_and_keeps_history() {
    let h = harness().await;
    for (round, (problem, name, phone)) in [
        ("printer broken", "ann", "+79991234567"),
        ("scanner broken", "anna", "89990001122"),
    ]
    .into_iter()
    .enumerate()
    {
        h.manager.on_start_flow("U1").await;
        h.say("U1", "x", problem).await;
        h.say("U1", "x", name).await;
        h.say("U1", "x", phone).await;
        h.say("U1", &format!("final-{round}"), "noon").await;
    }

    let user = h.store.get_user("U1").await.unwrap().unwrap();
    assert_eq!(user.user_name, "Anna");
    assert_eq!(user.contact_info, "89990001122");

    let problems: Vec<_> = h
        .store
        .list_user_requests("U1")
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.problem_description)
        .collect();
    assert_eq!(problems, vec!["printer broken", "scanner broken"]);
}

#[tokio::test]
async fn stored_columns_are_ciphertext() {
    let h = harness().await;
    h.manager.on_start_flow("U1").await;
    for text in ["printer broken", "Ann", "+79991234567"] {
        h.say("U1", "e", text).await;
    }
    h.say("U1", "e-final", "tomorrow").await;

    let users = h.store.list_rows(Table::Users).await.unwrap();
    let name = users[0].get("user_name").unwrap();
    assert_ne!(name, "Ann");
    assert_eq!(h.codec.decrypt(name).unwrap(), "Ann");

    let requests = h.store.list_rows(Table::Requests).await.unwrap();
    assert_eq!(requests[0].get("request_id"), Some("e-final"));
    assert_ne!(requests[0].get("problem_description"), Some("printer broken"));
}

#[tokio::test]
async fn phone_step_accepts_only_exact_pattern() {
    let h = harness().await;
    let valid = ["+70000000000", "80000000000", "+79999999999"];
    let invalid = ["7 9991234567", "+7999123456", "899912345678", "+7-999-123-45-67", "phone"];

    for (i, phone) in valid.iter().enumerate() {
        let user = format!("valid-{i}");
        h.manager.on_start_flow(&user).await;
        h.say(&user, "e", "broken").await;
        h.say(&user, "e", "Ann").await;
        assert_eq!(h.say(&user, "e", phone).await, prompts::TIME_PROMPT, "{phone}");
    }

    for (i, phone) in invalid.iter().enumerate() {
        let user = format!("invalid-{i}");
        h.manager.on_start_flow(&user).await;
        h.say(&user, "e", "broken").await;
        h.say(&user, "e", "Ann").await;
        assert_eq!(h.say(&user, "e", phone).await, prompts::PHONE_ERROR, "{phone}");
        let session = h.manager.sessions().get(&user).await.unwrap();
        assert_eq!(session.draft.len(), 2);
    }
}

#[tokio::test]
async fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("intake.db");
    let key = FieldCodec::generate_key();

    {
        let codec = FieldCodec::from_base64_key(&key).unwrap();
        let store = Arc::new(LibSqlBackend::new_local(&path, codec).await.unwrap());
        let manager = IntakeManager::new(store, SessionStore::new(None));
        manager.on_start_flow("U1").await;
        for text in ["broken", "Ann", "89991234567"] {
            manager.on_text_event("U1", "e", text).await.unwrap();
        }
        manager.on_text_event("U1", "r-1", "noon").await.unwrap();
    }

    let codec = FieldCodec::from_base64_key(&key).unwrap();
    let store = LibSqlBackend::new_local(&path, codec).await.unwrap();
    let user = store.get_user("U1").await.unwrap().unwrap();
    assert_eq!(user.user_name, "Ann");
    assert_eq!(store.list_user_requests("U1").await.unwrap().len(), 1);
}
