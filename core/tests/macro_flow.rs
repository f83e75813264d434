//! Macro executor flows over the scripted fake host.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use core_test_support::FakeSystem;
use core_test_support::FakeWindow;
use core_test_support::RecordedCall;
use macos_use_core::element_registry::ElementRegistry;
use macos_use_core::error::reason;
use macos_use_core::macro_executor::MacroExecutor;
use macos_use_core::platform::Rect;
use macos_use_core::resource_name::ApplicationScope;
use macos_use_proto::macosusesdk::v1::AssignAction;
use macos_use_proto::macosusesdk::v1::ConditionalAction;
use macos_use_proto::macosusesdk::v1::ForEachSource;
use macos_use_proto::macosusesdk::v1::LoopAction;
use macos_use_proto::macosusesdk::v1::Macro;
use macos_use_proto::macosusesdk::v1::MacroAction;
use macos_use_proto::macosusesdk::v1::MacroCondition;
use macos_use_proto::macosusesdk::v1::MacroParameter;
use macos_use_proto::macosusesdk::v1::MethodCallAction;
use macos_use_proto::macosusesdk::v1::WaitAction;
use macos_use_proto::macosusesdk::v1::assign_action;
use macos_use_proto::macosusesdk::v1::for_each_source;
use macos_use_proto::macosusesdk::v1::loop_action;
use macos_use_proto::macosusesdk::v1::macro_action;
use macos_use_proto::macosusesdk::v1::macro_condition;
use macos_use_proto::macosusesdk::v1::wait_action;

const TIMEOUT: Duration = Duration::from_secs(30);

fn assign_literal(variable: &str, value: &str) -> MacroAction {
    MacroAction {
        kind: Some(macro_action::Kind::Assign(AssignAction {
            variable: variable.to_string(),
            source: Some(assign_action::Source::Literal(value.to_string())),
        })),
    }
}

fn type_text_call(text: &str) -> MacroAction {
    MacroAction {
        kind: Some(macro_action::Kind::MethodCall(MethodCallAction {
            method: "TypeText".to_string(),
            arguments: [("text".to_string(), text.to_string())].into(),
        })),
    }
}

fn harness() -> (Arc<FakeSystem>, Arc<ElementRegistry>, MacroExecutor) {
    let fake = Arc::new(FakeSystem::new());
    let elements = Arc::new(ElementRegistry::new());
    let system: Arc<dyn macos_use_core::platform::SystemOperations> =
        Arc::clone(&fake) as Arc<dyn macos_use_core::platform::SystemOperations>;
    let executor = MacroExecutor::new(system, Arc::clone(&elements));
    (fake, elements, executor)
}

#[tokio::test]
async fn assignment_feeds_substitution_into_method_calls() {
    let (fake, _, executor) = harness();

    let definition = Macro {
        name: "macros/hello".to_string(),
        actions: vec![assign_literal("t", "Hello"), type_text_call("${t} World")],
        ..Default::default()
    };

    let outcome = executor
        .execute(&definition, HashMap::new(), ApplicationScope::All, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(outcome.actions_executed, 2);
    assert_eq!(
        fake.calls(),
        vec![RecordedCall::TypeText("Hello World".to_string())]
    );
    assert_eq!(outcome.variables.get("t").map(String::as_str), Some("Hello"));
}

#[tokio::test]
async fn required_parameters_are_validated_and_defaults_fill_in() {
    let (fake, _, executor) = harness();

    let definition = Macro {
        name: "macros/params".to_string(),
        parameters: vec![
            MacroParameter {
                name: "needed".to_string(),
                required: true,
                default_value: String::new(),
                description: String::new(),
            },
            MacroParameter {
                name: "greeting".to_string(),
                required: false,
                default_value: "hi".to_string(),
                description: String::new(),
            },
        ],
        actions: vec![type_text_call("${greeting} ${needed}")],
        ..Default::default()
    };

    let err = executor
        .execute(&definition, HashMap::new(), ApplicationScope::All, TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), reason::REQUIRED_FIELD_MISSING);

    executor
        .execute(
            &definition,
            [("needed".to_string(), "there".to_string())].into(),
            ApplicationScope::All,
            TIMEOUT,
        )
        .await
        .unwrap();
    assert_eq!(
        fake.calls(),
        vec![RecordedCall::TypeText("hi there".to_string())]
    );
}

#[tokio::test]
async fn for_each_binds_the_item_variable() {
    let (fake, _, executor) = harness();

    let definition = Macro {
        name: "macros/loop".to_string(),
        actions: vec![MacroAction {
            kind: Some(macro_action::Kind::LoopAction(LoopAction {
                kind: Some(loop_action::Kind::ForEach(ForEachSource {
                    item_variable: "x".to_string(),
                    source: Some(for_each_source::Source::Values("a, b, c".to_string())),
                })),
                actions: vec![type_text_call("${x}")],
            })),
        }],
        ..Default::default()
    };

    let outcome = executor
        .execute(&definition, HashMap::new(), ApplicationScope::All, TIMEOUT)
        .await
        .unwrap();

    // One for the loop action itself plus one per iteration.
    assert_eq!(outcome.actions_executed, 4);
    assert_eq!(
        fake.calls(),
        vec![
            RecordedCall::TypeText("a".to_string()),
            RecordedCall::TypeText("b".to_string()),
            RecordedCall::TypeText("c".to_string()),
        ]
    );
}

#[tokio::test]
async fn conditionals_pick_the_branch_from_live_window_state() {
    let (fake, _, executor) = harness();
    fake.push_window(FakeWindow::new(
        1,
        4,
        Rect::new(0.0, 0.0, 100.0, 100.0),
        "Report — Editor",
        0,
    ));

    let conditional = |pattern: &str, then_text: &str, else_text: &str| MacroAction {
        kind: Some(macro_action::Kind::Conditional(ConditionalAction {
            condition: Some(MacroCondition {
                kind: Some(macro_condition::Kind::WindowExists(pattern.to_string())),
            }),
            then_actions: vec![type_text_call(then_text)],
            else_actions: vec![type_text_call(else_text)],
        })),
    };

    let definition = Macro {
        name: "macros/cond".to_string(),
        actions: vec![
            conditional("Editor", "found", "missing"),
            conditional("Nope", "wrong", "fallback"),
        ],
        ..Default::default()
    };

    executor
        .execute(&definition, HashMap::new(), ApplicationScope::All, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(
        fake.calls(),
        vec![
            RecordedCall::TypeText("found".to_string()),
            RecordedCall::TypeText("fallback".to_string()),
        ]
    );
}

#[tokio::test]
async fn click_element_resolves_through_the_registry() {
    let (fake, elements, executor) = harness();

    let mut record = macos_use_core::element_registry::new_element(4, "elem_1_000001");
    record.bounds = Some(macos_use_proto::macosusesdk::v1::Rect {
        x: 10.0,
        y: 20.0,
        width: 100.0,
        height: 40.0,
    });
    elements.register(record, None).await;

    let definition = Macro {
        name: "macros/click".to_string(),
        actions: vec![MacroAction {
            kind: Some(macro_action::Kind::MethodCall(MethodCallAction {
                method: "ClickElement".to_string(),
                arguments: [("elementId".to_string(), "elem_1_000001".to_string())].into(),
            })),
        }],
        ..Default::default()
    };

    executor
        .execute(&definition, HashMap::new(), ApplicationScope::Pid(4), TIMEOUT)
        .await
        .unwrap();

    match fake.calls().as_slice() {
        [RecordedCall::Click {
            point,
            click_count: 1,
            ..
        }] => {
            assert_eq!((point.x, point.y), (60.0, 40.0));
        }
        other => panic!("unexpected calls: {other:?}"),
    }
}

#[tokio::test]
async fn unknown_methods_and_element_attribute_assigns_are_rejected() {
    let (_, _, executor) = harness();

    let unknown = Macro {
        name: "macros/unknown".to_string(),
        actions: vec![MacroAction {
            kind: Some(macro_action::Kind::MethodCall(MethodCallAction {
                method: "LaunchMissiles".to_string(),
                arguments: HashMap::new(),
            })),
        }],
        ..Default::default()
    };
    let err = executor
        .execute(&unknown, HashMap::new(), ApplicationScope::All, TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), reason::INVALID_ACTION);

    let attribute_assign = Macro {
        name: "macros/attr".to_string(),
        actions: vec![MacroAction {
            kind: Some(macro_action::Kind::Assign(AssignAction {
                variable: "v".to_string(),
                source: Some(assign_action::Source::ElementAttribute(
                    "elem_1/AXValue".to_string(),
                )),
            })),
        }],
        ..Default::default()
    };
    let err = executor
        .execute(
            &attribute_assign,
            HashMap::new(),
            ApplicationScope::All,
            TIMEOUT,
        )
        .await
        .unwrap_err();
    assert_eq!(err.reason(), reason::INVALID_ACTION);
}

#[tokio::test]
async fn the_deadline_cuts_off_later_actions() {
    let (fake, _, executor) = harness();

    let definition = Macro {
        name: "macros/slow".to_string(),
        actions: vec![
            MacroAction {
                kind: Some(macro_action::Kind::Wait(WaitAction {
                    kind: Some(wait_action::Kind::Duration(0.2)),
                })),
            },
            type_text_call("too late"),
        ],
        ..Default::default()
    };

    let err = executor
        .execute(
            &definition,
            HashMap::new(),
            ApplicationScope::All,
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
    assert_eq!(err.reason(), reason::TIMEOUT);
    assert!(fake.calls().is_empty());
}
