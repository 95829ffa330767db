use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use cellscript::{
    library,
    output::{build_output, detect_output, NO_OUTPUT},
    protocol::{decode_request, OutputEnvelope},
    CellError, Context, ExecuteRequest, ExecutionHost, Output, Request, Response, Value, Worker,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn expect_result(response: Response) -> (Output, Context) {
    match response {
        Response::Result {
            output: OutputEnvelope { output, .. },
            context,
            ..
        } => (output, context),
        Response::Error { message, .. } => panic!("expected a result, got error: {message}"),
    }
}

fn expect_error(response: Response) -> (String, Context) {
    match response {
        Response::Error {
            message, context, ..
        } => (message, context),
        Response::Result { output, .. } => panic!("expected an error, got {output:?}"),
    }
}

#[test]
fn runtime_is_initialized_once_across_requests() {
    let host = ExecutionHost::standard();
    assert!(!host.is_initialized());
    for n in 0..3 {
        let response = host.execute(ExecuteRequest::new(n, "1 + 1"));
        assert!(!response.is_error());
    }
    assert!(host.is_initialized());
    assert_eq!(host.initializations(), 1);
}

#[test]
fn reset_forces_a_fresh_initialization() {
    let mut host = ExecutionHost::standard();
    host.execute(ExecuteRequest::new(1, "1"));
    host.reset();
    assert!(!host.is_initialized());
    host.execute(ExecuteRequest::new(2, "2"));
    assert_eq!(host.initializations(), 2);
}

#[test]
fn failed_initialization_becomes_an_error_response() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let host = ExecutionHost::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(CellError::HostInit("native module missing".into()))
    });
    let context = Context::from_entries([("x".to_string(), Value::Number(1.0))]);
    let response = host.execute(ExecuteRequest::new("c1", "x").with_context(context.clone()));
    assert_eq!(response.cell_id(), &json!("c1"));
    let (message, returned) = expect_error(response);
    assert_eq!(
        message,
        "host runtime failed to initialize: native module missing"
    );
    assert_eq!(returned, context);
    assert!(!host.is_initialized());

    host.execute(ExecuteRequest::new("c2", "x"));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn context_carries_between_cells() {
    let host = ExecutionHost::standard();
    let (_, context) = expect_result(host.execute(ExecuteRequest::new(1, "let seq = \"GGCC\"")));
    let (output, context) = expect_result(
        host.execute(ExecuteRequest::new(2, "seq |> Seq.gcContent()").with_context(context)),
    );
    assert_eq!(output, Output::text("1"));
    assert_eq!(context.get("seq"), Some(&Value::string("GGCC")));
}

#[test]
fn error_response_keeps_bindings_made_before_the_fault() {
    let host = ExecutionHost::standard();
    let (message, context) = expect_error(host.execute(ExecuteRequest::new(
        "cell-9",
        "let a = 1\nlet b = a / 0\nlet c = 3",
    )));
    assert_eq!(message, "Line 2: Division by zero");
    assert_eq!(context.get("a"), Some(&Value::Number(1.0)));
    assert!(!context.contains("b"));
    assert!(!context.contains("c"));
}

#[test]
fn empty_cell_reports_no_output() {
    let host = ExecutionHost::standard();
    let (output, _) = expect_result(host.execute(ExecuteRequest::new(1, "")));
    assert_eq!(output, Output::text(NO_OUTPUT));
}

#[test]
fn result_response_json_shape() {
    let host = ExecutionHost::standard();
    let line = host
        .handle_json(r#"{"type":"execute","cellId":"c1","code":"1 + 2","context":[]}"#)
        .expect("execute produces a response");
    let mut response: serde_json::Value = serde_json::from_str(&line).expect("valid json");
    assert!(response["output"]["timing_ms"].is_u64());
    response["output"]
        .as_object_mut()
        .expect("output object")
        .remove("timing_ms");
    assert_eq!(
        response,
        json!({
            "type": "result",
            "cellId": "c1",
            "output": {"type": "text", "data": "3"},
            "context": []
        })
    );
}

#[test]
fn context_is_encoded_as_ordered_pairs() {
    let host = ExecutionHost::standard();
    let line = host
        .handle_json(
            r#"{"type":"execute","cellId":7,"code":"let z = 1\nlet a = [1, 2]","context":[["m",{"k":true}]]}"#,
        )
        .expect("response");
    let response: serde_json::Value = serde_json::from_str(&line).expect("valid json");
    assert_eq!(response["cellId"], json!(7));
    assert_eq!(
        response["context"],
        json!([["m", {"k": true}], ["z", 1], ["a", [1, 2]]])
    );
}

#[test]
fn error_response_json_shape() {
    let host = ExecutionHost::standard();
    let line = host
        .handle_json(r#"{"type":"execute","cellId":"c2","code":"missing"}"#)
        .expect("response");
    let response: serde_json::Value = serde_json::from_str(&line).expect("valid json");
    assert_eq!(
        response,
        json!({
            "type": "error",
            "cellId": "c2",
            "message": "Line 1: Undefined variable: missing",
            "context": []
        })
    );
}

#[test]
fn non_execute_messages_are_ignored() {
    let host = ExecutionHost::standard();
    assert_eq!(host.handle_json(r#"{"type":"ping"}"#), None);
    assert_eq!(
        decode_request(r#"{"type":"interrupt","cellId":1}"#).expect("decodes"),
        Request::Unknown
    );
    assert!(!host.is_initialized());
}

#[test]
fn malformed_messages_get_an_error_with_null_cell_id() {
    let host = ExecutionHost::standard();
    let line = host.handle_json("{not json").expect("error response");
    let response: serde_json::Value = serde_json::from_str(&line).expect("valid json");
    assert_eq!(response["type"], json!("error"));
    assert_eq!(response["cellId"], json!(null));
    assert!(response["message"]
        .as_str()
        .expect("message")
        .starts_with("malformed message: "));
}

#[test]
fn undecodable_context_still_echoes_the_cell_id() {
    let host = ExecutionHost::standard();
    let line = host
        .handle_json(r#"{"type":"execute","cellId":"c9","code":"1","context":[["x"]]}"#)
        .expect("error response");
    let response: serde_json::Value = serde_json::from_str(&line).expect("valid json");
    assert_eq!(response["type"], json!("error"));
    assert_eq!(response["cellId"], json!("c9"));
    assert!(response["message"]
        .as_str()
        .expect("message")
        .starts_with("malformed message: "));
}

#[test]
fn serve_answers_each_line_in_order() {
    let input = concat!(
        r#"{"type":"execute","cellId":1,"code":"let x = 20"}"#,
        "\n\n",
        r#"{"type":"ping"}"#,
        "\n",
        r#"{"type":"execute","cellId":2,"code":"x * 2","context":[["x",21]]}"#,
        "\n",
    );
    let mut out = Vec::new();
    ExecutionHost::standard()
        .serve(Cursor::new(input), &mut out)
        .expect("serve loop");
    let lines: Vec<serde_json::Value> = String::from_utf8(out)
        .expect("utf8")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["cellId"], json!(1));
    assert_eq!(lines[0]["output"]["data"], json!("20"));
    assert_eq!(lines[1]["cellId"], json!(2));
    assert_eq!(lines[1]["output"]["data"], json!("42"));
}

#[test]
fn worker_handles_requests_in_order() {
    let worker = Worker::spawn(ExecutionHost::standard()).expect("spawn worker");
    for n in 0..4 {
        worker
            .post(ExecuteRequest::new(n, format!("{n} * 10")))
            .expect("post");
    }
    for n in 0..4 {
        let response = worker.recv().expect("response");
        assert_eq!(response.cell_id(), &json!(n));
        let (output, _) = expect_result(response);
        assert_eq!(output, Output::text((n * 10).to_string()));
    }
}

#[test]
fn worker_execute_round_trips_context() {
    let worker = Worker::spawn(ExecutionHost::standard()).expect("spawn worker");
    let first = worker
        .execute(ExecuteRequest::new("a", "let total = Stats.sum([1, 2, 3])"))
        .expect("first");
    let (_, context) = expect_result(first);
    let second = worker
        .execute(ExecuteRequest::new("b", "total + 1").with_context(context))
        .expect("second");
    let (output, _) = expect_result(second);
    assert_eq!(output, Output::text("7"));
    drop(worker);
}

#[test]
fn scalars_are_detected_as_text() {
    assert_eq!(detect_output(&Value::Number(2.5)), Output::text("2.5"));
    assert_eq!(detect_output(&Value::Bool(true)), Output::text("true"));
    assert_eq!(detect_output(&Value::Null), Output::text("null"));
    assert_eq!(detect_output(&Value::string("hi")), Output::text("hi"));
}

#[test]
fn arrays_of_records_are_tables() {
    let rows = Value::array(vec![Value::object([("id", Value::string("s1"))])]);
    assert_eq!(detect_output(&rows), Output::new("table", rows.clone()));

    let flat = Value::array(vec![Value::Number(1.0), Value::Number(2.0)]);
    assert_eq!(detect_output(&flat), Output::text("[\n  1,\n  2\n]"));
    assert_eq!(detect_output(&Value::array(vec![])), Output::text("[]"));
}

#[test]
fn objects_are_classified_by_their_keys() {
    let bridge = library::shared();
    let align = bridge.resolve("Align").expect("Align registered");
    let alignment = bridge
        .dispatch(align, "alignDna", &[Value::string("AC"), Value::string("AC")])
        .expect("aligns");
    assert_eq!(detect_output(&alignment).kind, "alignment");

    let summary = Value::object([("mean", Value::Number(1.0))]);
    assert_eq!(
        detect_output(&summary),
        Output::new("table", Value::array(vec![summary.clone()]))
    );

    let empty_alignment = Value::object([
        ("aligned_query", Value::string("")),
        ("aligned_target", Value::string("")),
    ]);
    assert!(detect_output(&empty_alignment).is_text());

    let plain = Value::object([("name", Value::string("x"))]);
    assert_eq!(
        detect_output(&plain),
        Output::text("{\n  \"name\": \"x\"\n}")
    );
}

#[test]
fn explicit_output_types_override_detection() {
    let value = Value::array(vec![Value::Number(1.0)]);
    assert_eq!(build_output(&value, Some("text")), Output::text("[\n  1\n]"));
    assert_eq!(
        build_output(&value, Some("chart")),
        Output::new("chart", value.clone())
    );
    assert_eq!(build_output(&Value::Number(4.0), Some("")), Output::text("4"));
    assert_eq!(build_output(&Value::Number(4.0), None), Output::text("4"));
}

#[test]
fn deeply_nested_cells_become_error_responses() {
    let nested = format!("{}1{}", "[".repeat(10_000), "]".repeat(10_000));
    let host = ExecutionHost::standard();
    let (message, _) = expect_error(host.execute(ExecuteRequest::new("deep", nested.clone())));
    assert!(message.starts_with("Line 1: expression nested more than"));

    let worker = Worker::spawn(ExecutionHost::standard()).expect("spawn worker");
    let response = worker
        .execute(ExecuteRequest::new("deep", nested))
        .expect("worker survives");
    assert!(response.is_error());
    let (output, _) = expect_result(
        worker
            .execute(ExecuteRequest::new("after", "1 + 1"))
            .expect("worker still running"),
    );
    assert_eq!(output, Output::text("2"));
}
