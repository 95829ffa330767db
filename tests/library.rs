use cellscript::{
    host::{HostBridge, HostError, HostNamespace, NativeNamespace},
    library, Value,
};
use pretty_assertions::assert_eq;

fn call(namespace: &str, function: &str, args: Vec<Value>) -> Result<Value, HostError> {
    let bridge = library::shared();
    let handle = bridge
        .resolve(namespace)
        .unwrap_or_else(|| panic!("namespace {namespace} should be registered"));
    bridge.dispatch(handle, function, &args)
}

fn ok(namespace: &str, function: &str, args: Vec<Value>) -> Value {
    call(namespace, function, args)
        .unwrap_or_else(|err| panic!("{namespace}.{function} failed: {err}"))
}

fn numbers(values: &[f64]) -> Value {
    Value::array(values.iter().copied().map(Value::Number).collect())
}

fn number(value: Value) -> f64 {
    value.as_number().expect("numeric result")
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, found {actual}"
    );
}

#[test]
fn standard_bridge_registers_all_namespaces() {
    let bridge = library::standard_bridge();
    assert_eq!(
        bridge.namespaces().collect::<Vec<_>>(),
        vec!["Core", "Seq", "Stats", "Align"]
    );
    assert!(bridge.resolve("Chem").is_none());
}

#[test]
fn arity_is_checked_before_dispatch() {
    let err = call("Core", "len", vec![]).expect_err("missing argument");
    assert_eq!(
        err.to_string(),
        "`Core.len` expected 1 arguments but received 0"
    );
    let err = call("Core", "range", vec![Value::Number(1.0)]).expect_err("range needs an end");
    assert_eq!(
        err,
        HostError::Arity {
            function: "Core.range".into(),
            expected: "2 to 3".into(),
            received: 1,
        }
    );
}

#[test]
fn unknown_function_names_namespace_and_function() {
    let err = call("Seq", "translate", vec![]).expect_err("not provided");
    assert_eq!(err.to_string(), "Unknown function: Seq.translate");
}

#[test]
fn core_collections() {
    assert_eq!(ok("Core", "len", vec![Value::string("héllo")]), Value::Number(5.0));
    assert_eq!(ok("Core", "len", vec![numbers(&[1.0, 2.0])]), Value::Number(2.0));
    assert_eq!(
        ok("Core", "range", vec![Value::Number(0.0), Value::Number(3.0)]),
        numbers(&[0.0, 1.0, 2.0])
    );
    assert_eq!(
        ok(
            "Core",
            "range",
            vec![Value::Number(5.0), Value::Number(0.0), Value::Number(-2.0)]
        ),
        numbers(&[5.0, 3.0, 1.0])
    );
    assert!(call(
        "Core",
        "range",
        vec![Value::Number(0.0), Value::Number(3.0), Value::Number(0.0)]
    )
    .is_err());

    let object = Value::object([("b", Value::Number(1.0)), ("a", Value::Number(2.0))]);
    assert_eq!(
        ok("Core", "keys", vec![object.clone()]),
        Value::array(vec![Value::string("b"), Value::string("a")])
    );
    assert_eq!(ok("Core", "values", vec![object]), numbers(&[1.0, 2.0]));

    let original = numbers(&[1.0]);
    assert_eq!(
        ok("Core", "push", vec![original.clone(), Value::Number(2.0)]),
        numbers(&[1.0, 2.0])
    );
    assert_eq!(original, numbers(&[1.0]));
}

#[test]
fn core_math_and_strings() {
    assert_eq!(
        ok("Core", "round", vec![Value::Number(3.14159), Value::Number(2.0)]),
        Value::Number(3.14)
    );
    assert_eq!(ok("Core", "round", vec![Value::Number(2.5)]), Value::Number(3.0));
    assert_eq!(ok("Core", "abs", vec![Value::Number(-4.0)]), Value::Number(4.0));
    assert_eq!(ok("Core", "sqrt", vec![Value::Number(16.0)]), Value::Number(4.0));
    assert_eq!(
        ok("Core", "pow", vec![Value::Number(2.0), Value::Number(8.0)]),
        Value::Number(256.0)
    );
    assert_eq!(
        ok("Core", "join", vec![Value::array(vec![Value::Number(1.0), Value::string("a")])]),
        Value::string("1,a")
    );
    assert_eq!(
        ok(
            "Core",
            "split",
            vec![Value::string("a-b-c"), Value::string("-")]
        ),
        Value::array(vec![Value::string("a"), Value::string("b"), Value::string("c")])
    );
    assert_eq!(ok("Core", "upper", vec![Value::string("acgt")]), Value::string("ACGT"));
    assert_eq!(ok("Core", "lower", vec![Value::string("ACGT")]), Value::string("acgt"));
    assert_eq!(ok("Core", "typeOf", vec![Value::Null]), Value::string("null"));
    assert_eq!(
        ok("Core", "sha256", vec![Value::string("hello world")]),
        Value::string("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
    );
}

#[test]
fn argument_types_are_checked() {
    let err = call("Core", "upper", vec![Value::Number(1.0)]).expect_err("needs a string");
    assert_eq!(err.to_string(), "`Core.upper` expected string but found number");
    let err = call("Stats", "sum", vec![Value::array(vec![Value::string("x")])])
        .expect_err("needs numbers");
    assert!(matches!(err, HostError::ArgumentType { expected: "number", .. }));
}

#[test]
fn sequence_functions() {
    assert_eq!(ok("Seq", "gcContent", vec![Value::string("ACGT")]), Value::Number(0.5));
    assert_eq!(ok("Seq", "gcContent", vec![Value::string("")]), Value::Number(0.0));
    assert_eq!(
        ok("Seq", "reverseComplement", vec![Value::string("AACGTt")]),
        Value::string("aCAGTT")
    );
    assert!(call("Seq", "reverseComplement", vec![Value::string("AXG")]).is_err());
    assert_eq!(ok("Seq", "transcribe", vec![Value::string("ATGt")]), Value::string("AUGu"));
    assert_eq!(ok("Seq", "validate", vec![Value::string("acgtn")]), Value::Bool(true));
    assert_eq!(ok("Seq", "validate", vec![Value::string("ACGU")]), Value::Bool(false));
    assert_eq!(
        ok("Seq", "validate", vec![Value::string("ACGU"), Value::string("rna")]),
        Value::Bool(true)
    );
    assert_eq!(
        ok("Seq", "kmerCount", vec![Value::string("ATATG"), Value::Number(2.0)]),
        Value::object([
            ("AT", Value::Number(2.0)),
            ("TA", Value::Number(1.0)),
            ("TG", Value::Number(1.0)),
        ])
    );
    assert!(call("Seq", "kmerCount", vec![Value::string("AT"), Value::Number(0.0)]).is_err());
}

#[test]
fn parse_fasta_collects_records() {
    let fasta = ">seq1 first read\nACGT\nAC\n\n>seq2\nGGGG\n";
    let records = ok("Seq", "parseFasta", vec![Value::string(fasta)]);
    let records = records.as_array().expect("array of records");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("id"), Some(&Value::string("seq1")));
    assert_eq!(records[0].get("description"), Some(&Value::string("first read")));
    assert_eq!(records[0].get("sequence"), Some(&Value::string("ACGTAC")));
    assert_eq!(records[0].get("length"), Some(&Value::Number(6.0)));
    assert_eq!(records[1].get("description"), Some(&Value::string("")));

    let err = call("Seq", "parseFasta", vec![Value::string("ACGT")]).expect_err("no header");
    assert!(err.to_string().contains("header"));
}

#[test]
fn summary_statistics() {
    let data = numbers(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
    assert_eq!(ok("Stats", "sum", vec![data.clone()]), Value::Number(40.0));
    assert_eq!(ok("Stats", "mean", vec![data.clone()]), Value::Number(5.0));
    assert_eq!(ok("Stats", "median", vec![data.clone()]), Value::Number(4.5));
    assert_eq!(ok("Stats", "min", vec![data.clone()]), Value::Number(2.0));
    assert_eq!(ok("Stats", "max", vec![data.clone()]), Value::Number(9.0));
    assert_close(number(ok("Stats", "variance", vec![data.clone()])), 32.0 / 7.0);
    assert_close(
        number(ok("Stats", "stdDev", vec![data.clone()])),
        (32.0f64 / 7.0).sqrt(),
    );
    assert_eq!(ok("Stats", "sum", vec![numbers(&[])]), Value::Number(0.0));
    assert!(call("Stats", "median", vec![numbers(&[])]).is_err());
    assert_eq!(ok("Stats", "variance", vec![numbers(&[3.0])]), Value::Number(0.0));
}

#[test]
fn describe_reports_named_fields() {
    let summary = ok("Stats", "describe", vec![numbers(&[1.0, 2.0, 3.0, 4.0])]);
    let map = summary.as_object().expect("object");
    assert_eq!(
        map.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["count", "mean", "std_dev", "min", "max", "median"]
    );
    assert_eq!(map["count"], Value::Number(4.0));
    assert_eq!(map["mean"], Value::Number(2.5));
    assert_eq!(map["median"], Value::Number(2.5));
}

#[test]
fn pearson_correlation() {
    let xs = numbers(&[1.0, 2.0, 3.0, 4.0]);
    assert_close(number(ok("Stats", "pearson", vec![xs.clone(), numbers(&[2.0, 4.0, 6.0, 8.0])])), 1.0);
    assert_close(number(ok("Stats", "pearson", vec![xs.clone(), numbers(&[8.0, 6.0, 4.0, 2.0])])), -1.0);
    assert!(call("Stats", "pearson", vec![xs.clone(), numbers(&[1.0])]).is_err());
    assert!(call("Stats", "pearson", vec![xs, numbers(&[1.0, 1.0, 1.0, 1.0])]).is_err());
}

#[test]
fn global_alignment_of_identical_sequences() {
    let result = ok("Align", "alignDna", vec![Value::string("ACGT"), Value::string("acgt")]);
    assert_eq!(result.get("aligned_query"), Some(&Value::string("ACGT")));
    assert_eq!(result.get("aligned_target"), Some(&Value::string("ACGT")));
    assert_eq!(result.get("score"), Some(&Value::Number(8.0)));
    assert_eq!(result.get("identity"), Some(&Value::Number(1.0)));
}

#[test]
fn global_alignment_inserts_gaps() {
    let result = ok("Align", "alignDna", vec![Value::string("ACGT"), Value::string("AGT")]);
    assert_eq!(result.get("aligned_query"), Some(&Value::string("ACGT")));
    assert_eq!(result.get("aligned_target"), Some(&Value::string("A-GT")));
    assert_eq!(result.get("score"), Some(&Value::Number(4.0)));
    assert_eq!(result.get("identity"), Some(&Value::Number(0.75)));
}

#[test]
fn local_alignment_finds_shared_core() {
    let result = ok(
        "Align",
        "alignDna",
        vec![Value::string("TTTACGTTTT"), Value::string("GGACGGG"), Value::string("local")],
    );
    assert_eq!(result.get("aligned_query"), Some(&Value::string("ACG")));
    assert_eq!(result.get("aligned_target"), Some(&Value::string("ACG")));
    assert_eq!(result.get("score"), Some(&Value::Number(6.0)));

    let err = call(
        "Align",
        "alignDna",
        vec![Value::string("A"), Value::string("A"), Value::string("semi")],
    )
    .expect_err("unknown mode");
    assert!(err.to_string().contains("semi"));
}

struct Echo;

impl HostNamespace for Echo {
    fn name(&self) -> &str {
        "Echo"
    }

    fn has_function(&self, function: &str) -> bool {
        function == "first"
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value, HostError> {
        match function {
            "first" => Ok(args.first().cloned().unwrap_or_default()),
            other => Err(HostError::UnknownFunction {
                namespace: "Echo".into(),
                function: other.into(),
            }),
        }
    }
}

#[test]
fn custom_namespaces_plug_into_the_bridge() {
    let mut bridge = HostBridge::new();
    bridge.register(Echo).register(NativeNamespace::new("Empty"));
    let echo = bridge.resolve("Echo").expect("registered");
    assert!(echo.has_function("first"));
    assert_eq!(
        bridge.dispatch(echo, "first", &[Value::Number(7.0)]),
        Ok(Value::Number(7.0))
    );
    let empty = bridge.resolve("Empty").expect("registered");
    assert!(empty.functions().is_empty());
}

#[test]
fn oversized_alignments_are_refused() {
    let long = Value::string("ACGT".repeat(1_250));
    let err = call("Align", "alignDna", vec![long.clone(), long.clone()])
        .expect_err("matrix too large");
    assert_eq!(
        err.to_string(),
        format!(
            "`Align.alignDna` inputs of length 5000 and 5000 exceed the limit of {} matrix cells",
            library::MAX_ALIGN_CELLS
        )
    );
    assert!(call("Align", "alignDna", vec![long, Value::string("ACGT")]).is_ok());
}
