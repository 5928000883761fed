//! Full-turn routing: the classifier's verdict selects exactly one subflow,
//! and anything outside the closed intent set aborts the turn.

mod common;

use campusflow::message::Message;
use campusflow::node::NodeError;
use campusflow::runtime::{RunnerError, TurnOutcome};
use campusflow::types::Intent;
use serde_json::json;

use common::{MockLlm, ToolScript, router_decision, student_thread, test_app, turn};

#[tokio::test]
async fn chat_intent_reaches_the_smalltalk_node() {
    let ctx = test_app(
        MockLlm::new()
            .structured_reply(router_decision("chat"))
            .chat_reply("你好！今天有什么可以帮你的吗？"),
    );

    let outcome = ctx.app.chat(turn("你好")).await.unwrap();
    let TurnOutcome::Completed { state } = outcome else {
        panic!("smalltalk never suspends");
    };
    assert_eq!(state.intent, Some(Intent::Chat));
    let reply = state.messages.last().unwrap();
    assert_eq!(reply.content, "你好！今天有什么可以帮你的吗？");
}

#[tokio::test]
async fn academic_intent_reaches_the_tool_loop() {
    let ctx = test_app(
        MockLlm::new()
            .structured_reply(router_decision("academic"))
            .tool_script(
                ToolScript::reply("你的高等数学成绩是 91 分。").call("get_grades", json!({})),
            ),
    );

    let state = ctx
        .app
        .chat(turn("我这学期的成绩怎么样？"))
        .await
        .unwrap()
        .state()
        .clone();
    assert_eq!(state.intent, Some(Intent::Academic));
    assert!(state.structured_data.is_some());
}

#[tokio::test]
async fn info_intent_runs_the_retrieval_pipeline() {
    let ctx = test_app(
        MockLlm::new()
            .structured_reply(router_decision("info"))
            .structured_reply(json!({
                "hyde_doc": "The library's weekday closing time is 22:00.",
                "keywords": ["library", "closing time"],
                "domain": "campus_life",
            }))
            .chat_reply("图书馆工作日 22:00 闭馆。"),
    );

    let state = ctx
        .app
        .chat(turn("图书馆几点关门？"))
        .await
        .unwrap()
        .state()
        .clone();
    assert_eq!(state.intent, Some(Intent::Info));
    assert!(state.rag_query_results.is_some());
}

#[tokio::test]
async fn admin_intent_reaches_leave_intake() {
    let ctx = test_app(
        MockLlm::new()
            .structured_reply(router_decision("admin"))
            .structured_reply(json!({
                "leave_type": null,
                "start_date": null,
                "end_date": null,
                "reason": null,
            })),
    );

    // With nothing extracted the intake node asks for the missing fields
    // instead of suspending.
    let outcome = ctx.app.chat(turn("我想请假")).await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Completed { .. }));
    assert_eq!(outcome.state().intent, Some(Intent::Admin));
}

#[tokio::test]
async fn unknown_destination_aborts_instead_of_defaulting() {
    let ctx = test_app(MockLlm::new().structured_reply(router_decision("weather")));

    let err = ctx.app.chat(turn("今天天气如何？")).await.unwrap_err();
    assert!(matches!(
        err,
        RunnerError::Node(NodeError::Classification { .. })
    ));
}

#[tokio::test]
async fn each_turn_persists_a_bounded_checkpoint_trail() {
    let ctx = test_app(
        MockLlm::new()
            .structured_reply(router_decision("chat"))
            .chat_reply("hi"),
    );
    ctx.app.chat(turn("hello")).await.unwrap();

    // One checkpoint before the router, one before smalltalk, one at End.
    let history = ctx.checkpointer.history(&student_thread());
    assert_eq!(history.len(), 3);
    assert_eq!(
        history.iter().map(|cp| cp.seq).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(history.last().unwrap().next.is_end());
}

#[tokio::test]
async fn new_turns_clear_the_previous_turn_scratch() {
    let ctx = test_app(
        MockLlm::new()
            .structured_reply(router_decision("info"))
            .structured_reply(json!({
                "hyde_doc": "Admission policy for graduate recommendation.",
                "keywords": ["GPA"],
                "domain": "admission_policy",
            }))
            .chat_reply("需要 GPA 排名前 20%。")
            .structured_reply(router_decision("chat"))
            .chat_reply("不客气！"),
    );

    let first = ctx.app.chat(turn("保研需要什么条件？")).await.unwrap();
    assert!(first.state().rag_query_results.is_some());

    let second = ctx.app.chat(turn("谢谢")).await.unwrap();
    let state = second.state();
    assert!(state.rag_query_params.is_none());
    assert!(state.rag_query_results.is_none());
    assert!(state.structured_data.is_none());
    // The transcript itself is append-only across turns.
    assert_eq!(
        state
            .messages
            .iter()
            .filter(|m| m.has_role(Message::USER))
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>(),
        vec!["保研需要什么条件？", "谢谢"]
    );
}
