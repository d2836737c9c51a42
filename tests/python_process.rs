//! Runs against a real `python3`. Each test returns early, with a note on
//! stderr, when the interpreter (or `dill`, for snapshots) is not installed.

use std::process::Command;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use pysession::{
    error::Error,
    execution::{ExecutionRequest, ExecutionResult, Orchestrator, OrchestratorOptions},
    process::{
        python::{PythonOptions, PythonProcess},
        Interpreter, SkipInstaller,
    },
    serializer::{serialize, PyDateTime, PyObject, PyValue},
    session::{SessionName, SessionStore},
};
use serde_json::{json, Value};

fn python_runs(args: &[&str]) -> bool {
    Command::new("python3")
        .args(args)
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn have_python() -> bool {
    let found = python_runs(&["--version"]);
    if !found {
        eprintln!("python3 not found, skipping");
    }
    found
}

fn have_dill() -> bool {
    let found = have_python() && python_runs(&["-c", "import dill"]);
    if !found {
        eprintln!("dill not importable, skipping");
    }
    found
}

async fn spawn() -> PythonProcess {
    PythonProcess::spawn(&PythonOptions::default()).await.unwrap()
}

async fn eval(process: &mut PythonProcess, code: &str) -> PyValue {
    process.execute(code).await.unwrap()
}

#[tokio::test]
async fn every_value_shape_is_reported() {
    if !have_python() {
        return;
    }
    let mut py = spawn().await;

    assert_eq!(eval(&mut py, "None").await, PyValue::None);
    assert_eq!(eval(&mut py, "1 == 1").await, PyValue::Bool(true));
    assert_eq!(eval(&mut py, "2 ** 40").await, PyValue::Int(1 << 40));
    assert_eq!(eval(&mut py, "2 ** 64").await, PyValue::BigInt("18446744073709551616".into()));
    assert_eq!(eval(&mut py, "3 / 2").await, PyValue::Float(1.5));
    assert_eq!(eval(&mut py, r"'a\x85b'").await, PyValue::Str("a\u{85}b".into()));
    assert_eq!(
        eval(&mut py, "[1, 'x']").await,
        PyValue::List(vec![PyValue::Int(1), PyValue::Str("x".into())])
    );
    assert_eq!(eval(&mut py, "(1,)").await, PyValue::Tuple(vec![PyValue::Int(1)]));
    assert_eq!(eval(&mut py, "{3}").await, PyValue::Set(vec![PyValue::Int(3)]));
    assert_eq!(eval(&mut py, "frozenset([3])").await, PyValue::FrozenSet(vec![PyValue::Int(3)]));
    assert_eq!(
        eval(&mut py, "{1: 'a', (1, 2): None, 'k': True}").await,
        PyValue::Dict(vec![
            ("1".into(), PyValue::Str("a".into())),
            ("(1, 2)".into(), PyValue::None),
            ("k".into(), PyValue::Bool(true)),
        ])
    );

    let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let date = eval(&mut py, "import datetime\ndatetime.date(2024, 1, 2)").await;
    assert_eq!(date, PyValue::Date(day));
    let aware = "datetime.datetime(2024, 1, 2, 3, 4, 5, 500, \
                 tzinfo=datetime.timezone(datetime.timedelta(hours=2)))";
    assert_eq!(
        eval(&mut py, aware).await,
        PyValue::DateTime(PyDateTime {
            naive: day.and_hms_micro_opt(3, 4, 5, 500).unwrap(),
            utcoffset: Some(7200),
        })
    );

    assert_eq!(
        eval(&mut py, "len").await,
        PyValue::Object(PyObject::new(
            "builtin_function_or_method",
            Some("<built-in function len>".into())
        ))
    );
    assert_eq!(
        eval(&mut py, "float('nan')").await,
        PyValue::Object(PyObject::new("float", Some("nan".into())))
    );

    py.shutdown().await.unwrap();
}

#[tokio::test]
async fn broken_repr_becomes_a_placeholder() {
    if !have_python() {
        return;
    }
    let mut py = spawn().await;
    let code = "\
class Broken:
    def __repr__(self):
        raise RuntimeError('no repr')
Broken()
";
    let value = eval(&mut py, code).await;
    assert_eq!(value, PyValue::Object(PyObject::new("Broken", None)));
    assert_eq!(
        serialize(&value),
        json!({"type": "not serializable", "repr": "<unrepresentable Broken object>"})
    );
    py.shutdown().await.unwrap();
}

#[tokio::test]
async fn raising_snippet_leaves_the_interpreter_usable() {
    if !have_python() {
        return;
    }
    let mut py = spawn().await;
    match py.execute("x = 1\n1 / 0").await {
        Err(Error::Raised(message)) => {
            assert!(message.contains("ZeroDivisionError"), "{message}")
        }
        other => panic!("expected a raised error, got {other:?}"),
    }
    assert_eq!(eval(&mut py, "x").await, PyValue::Int(1));
    py.shutdown().await.unwrap();
}

#[tokio::test]
async fn nested_results_keep_their_depth() {
    if !have_python() {
        return;
    }
    let mut py = spawn().await;
    let value = eval(&mut py, "x = 0\nfor _ in range(120):\n    x = [x]\nx").await;
    let mut out = serialize(&value);
    let mut depth = 0;
    while out.is_array() {
        depth += 1;
        out = out[0].take();
    }
    assert_eq!(depth, 120);
    assert_eq!(out, json!(0));
    py.shutdown().await.unwrap();
}

#[tokio::test]
async fn result_rules_follow_the_last_statement() {
    if !have_python() {
        return;
    }
    let mut py = spawn().await;
    assert_eq!(eval(&mut py, "1 + 1;").await, PyValue::None);
    assert_eq!(eval(&mut py, "y = 4").await, PyValue::Int(4));
    assert_eq!(eval(&mut py, "y += 1  # bump").await, PyValue::Int(5));
    assert_eq!(eval(&mut py, "print('to stderr')").await, PyValue::None);
    py.shutdown().await.unwrap();
}

#[tokio::test]
async fn importable_reports_only_present_modules() {
    if !have_python() {
        return;
    }
    let mut py = spawn().await;
    let modules = vec!["json".to_string(), "no_such_module_for_pysession".to_string()];
    let found = py.importable(&modules).await.unwrap();
    assert_eq!(found.into_iter().collect::<Vec<_>>(), vec!["json"]);
    py.shutdown().await.unwrap();
}

async fn run_in_fresh_process(
    store: &SessionStore,
    request: &ExecutionRequest,
) -> ExecutionResult {
    let options = OrchestratorOptions::default();
    let mut orchestrator = Orchestrator::new(spawn().await, SkipInstaller, store.clone(), options);
    let result = orchestrator.run(request).await;
    let (interpreter, _) = orchestrator.into_parts();
    interpreter.shutdown().await.unwrap();
    result
}

#[tokio::test]
async fn session_survives_a_process_restart() {
    if !have_dill() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::create(dir.path()).unwrap();
    let t1: SessionName = "t1".parse().unwrap();

    let first = ExecutionRequest::new("x = 1 + 1").with_session(t1.clone());
    assert_eq!(run_in_fresh_process(&store, &first).await, ExecutionResult::ok(json!(2)));
    for file in ["t1.pkl", "t1.json", "t1_result.json"] {
        assert!(dir.path().join(file).exists(), "{file}");
    }

    let second = ExecutionRequest::new("y = x + 1").with_session(t1.clone());
    assert_eq!(run_in_fresh_process(&store, &second).await, ExecutionResult::ok(json!(3)));
    assert_eq!(store.read_result(&t1).unwrap(), Some(json!(3)));

    let third = ExecutionRequest::new("[x, y]").with_session(t1.clone());
    let result = run_in_fresh_process(&store, &third).await;
    assert_eq!(result.result, Some(Value::from(vec![2, 3])));
}
