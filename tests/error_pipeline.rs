//! Property tests for the failure normalization pipeline.

use javelin::report::{
    to_formatted, to_runtime_response, FailureValue, OPAQUE_FAILURE_TYPE,
};
use proptest::prelude::*;

fn arbitrary_failure() -> impl Strategy<Value = FailureValue> {
    prop_oneof![
        (any::<String>(), any::<String>(), proptest::option::of(any::<String>())).prop_map(
            |(name, message, stack)| FailureValue::Error {
                name,
                message,
                stack,
                properties: None,
            }
        ),
        (any::<String>(), any::<String>())
            .prop_map(|(type_name, display)| FailureValue::Value { type_name, display }),
        Just(FailureValue::Opaque),
    ]
}

proptest! {
    #[test]
    fn normalization_is_total_and_encodable(failure in arbitrary_failure()) {
        let report = to_runtime_response(&failure);
        let encoded = serde_json::to_string(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        prop_assert!(value["errorType"].is_string());
        prop_assert!(value["errorMessage"].is_string());
        prop_assert!(value["trace"].is_array());
    }

    #[test]
    fn formatted_is_tab_prefixed_json(failure in arbitrary_failure()) {
        let line = to_formatted(&failure);
        prop_assert!(line.starts_with('\t'));
        let parsed: serde_json::Value = serde_json::from_str(&line[1..]).unwrap();
        prop_assert!(parsed.is_object());
    }

    #[test]
    fn trace_joins_back_to_the_stack(stack in "[ -~]{0,40}(\n[ -~]{0,40}){0,5}") {
        let failure = FailureValue::Error {
            name: "Error".to_owned(),
            message: "m".to_owned(),
            stack: Some(stack.clone()),
            properties: None,
        };
        let report = to_runtime_response(&failure);
        prop_assert_eq!(report.trace.join("\n"), stack);
    }
}

#[test]
fn opaque_normalization_is_fixed() {
    let report = to_runtime_response(&FailureValue::Opaque);
    assert_eq!(report.error_type, OPAQUE_FAILURE_TYPE);
    assert!(report.error_message.contains("message, name, and stack"));
}
