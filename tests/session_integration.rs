//! End-to-end tests: scripted keystrokes through the tokenizer, session and
//! engine client to a stand-in engine listening on loopback TCP.
//!
//! The stand-in engines are real library REP sockets that keep an RPN stack,
//! so replies change the way a real engine's would. One is a libzmq REP
//! socket speaking raw text that stops answering on `quit`; the other is an
//! nng REP0 socket speaking JSON that answers `quit` with a quit signal.
//!
//! # Running
//!
//! ```bash
//! cargo test --test session_integration -- --nocapture
//! ```

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use nng::options::{Options, RecvTimeout};
use pretty_assertions::assert_eq;

use rpn_term::backend::BackendClient;
use rpn_term::ipc::{endpoint, EngineClient, IpcError, TransportKind, WireProtocol};
use rpn_term::session::{ExitReason, Session, SessionError};
use rpn_term::tokenizer::ReaderInput;

type Requests = Arc<Mutex<Vec<String>>>;

/// How long a stand-in engine waits for the next request before giving up.
const ENGINE_IDLE: Duration = Duration::from_secs(5);

/// Apply one request to the stack. `None` means the engine quits.
fn evaluate(stack: &mut Vec<f64>, request: &str) -> Option<String> {
    let binary = |stack: &mut Vec<f64>, op: fn(f64, f64) -> f64| -> Result<(), String> {
        if stack.len() < 2 {
            return Err("Error: Not enough items on stack".to_string());
        }
        let b = stack.pop().unwrap_or_default();
        let a = stack.pop().unwrap_or_default();
        stack.push(op(a, b));
        Ok(())
    };

    let result = match request {
        "quit" => return None,
        "add" => binary(stack, |a, b| a + b),
        "subtract" => binary(stack, |a, b| a - b),
        "multiply" => binary(stack, |a, b| a * b),
        "divide" => binary(stack, |a, b| a / b),
        "dup" => match stack.last().copied() {
            Some(top) => {
                stack.push(top);
                Ok(())
            }
            None => Err("Error: Not enough items on stack".to_string()),
        },
        operand => match operand.parse::<f64>() {
            Ok(value) => {
                stack.push(value);
                Ok(())
            }
            Err(_) => Err(format!("Error: Invalid operand {}", operand)),
        },
    };

    Some(match result {
        Ok(()) => stack
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(","),
        Err(message) => message,
    })
}

/// Raw-text engine on a libzmq REP socket. Stops without replying on `quit`.
fn zmq_raw_engine(requests: Requests) -> String {
    let context = zmq::Context::new();
    let socket = context.socket(zmq::REP).unwrap();
    socket.set_rcvtimeo(ENGINE_IDLE.as_millis() as i32).unwrap();
    socket.bind("tcp://127.0.0.1:*").unwrap();
    let address = socket
        .get_last_endpoint()
        .unwrap()
        .unwrap()
        .trim_start_matches("tcp://")
        .to_string();

    thread::spawn(move || {
        let _context = context;
        let mut stack = Vec::new();
        while let Ok(message) = socket.recv_bytes(0) {
            let request = String::from_utf8_lossy(&message).into_owned();
            requests.lock().unwrap().push(request.clone());

            let Some(reply) = evaluate(&mut stack, &request) else {
                return;
            };
            socket.send(reply.as_bytes(), 0).unwrap();
        }
    });
    address
}

/// JSON engine on an nng REP0 socket. Answers `quit` with a quit signal.
fn nng_json_engine(requests: Requests) -> String {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let address = format!("127.0.0.1:{}", port);
    let socket = nng::Socket::new(nng::Protocol::Rep0).unwrap();
    socket.set_opt::<RecvTimeout>(Some(ENGINE_IDLE)).unwrap();
    socket.listen(&endpoint(&address)).unwrap();

    thread::spawn(move || {
        let mut stack = Vec::new();
        while let Ok(message) = socket.recv() {
            let envelope: serde_json::Value = serde_json::from_slice(&message).unwrap();
            assert_eq!(envelope["request_type"], "input");
            let request = envelope["payload"].as_str().unwrap().to_string();
            requests.lock().unwrap().push(request.clone());

            let reply = match evaluate(&mut stack, &request) {
                None => serde_json::json!({"response_type": "quitsig", "payload": {"quitsig": null}}),
                Some(text) if text.starts_with("Error") => {
                    serde_json::json!({"response_type": "error", "payload": {"error": text}})
                }
                Some(_) => {
                    serde_json::json!({"response_type": "stack", "payload": {"stack": stack}})
                }
            };
            socket.send(reply.to_string().as_bytes()).unwrap();
        }
    });
    address
}

fn connect(address: &str, kind: TransportKind, protocol: WireProtocol) -> BackendClient {
    let mut client =
        EngineClient::connect_with_retry(address, kind, protocol, 5).expect("connect failed");
    client.set_timeout(Duration::from_secs(2));
    let mut backend = BackendClient::new(client);
    backend.set_quit_timeout(Duration::from_millis(300));
    backend
}

fn script(keys: &str) -> ReaderInput<Cursor<Vec<u8>>> {
    ReaderInput::new(Cursor::new(keys.as_bytes().to_vec()))
}

#[test]
fn test_raw_session_over_zeromq() {
    let requests = Requests::default();
    let address = zmq_raw_engine(Arc::clone(&requests));

    let backend = connect(&address, TransportKind::Zmtp, WireProtocol::Raw);
    let mut session = Session::new(script("3\n4+quit"), backend, Vec::new());

    let reason = session.run().expect("session failed");
    assert_eq!(reason, ExitReason::EngineQuit);

    assert_eq!(*requests.lock().unwrap(), vec!["3", "4", "add", "quit"]);

    // The silent quit prints nothing
    let output = String::from_utf8(session.output_mut().clone()).unwrap();
    assert_eq!(output, "3\n\n3\n4+\n3,4\n7\nquit\n");

    let stats = session.stats();
    assert_eq!(stats.tokens, 3);
    assert_eq!(stats.requests, 4);
    assert_eq!(stats.noops, 1);
}

#[test]
fn test_enter_on_empty_operand_duplicates() {
    let requests = Requests::default();
    let address = zmq_raw_engine(Arc::clone(&requests));

    let backend = connect(&address, TransportKind::Zmtp, WireProtocol::Raw);
    let mut session = Session::new(script("3+4\n\n"), backend, Vec::new());

    // Input runs out before quit
    assert_eq!(session.run().unwrap(), ExitReason::InputClosed);
    assert_eq!(*requests.lock().unwrap(), vec!["3", "add", "4", "dup"]);

    // "add" on a one-item stack is rejected by the engine, not locally
    let output = String::from_utf8(session.output_mut().clone()).unwrap();
    assert!(output.contains("Error: Not enough items on stack"));
    assert!(output.ends_with("3,4,4\n"));
}

#[test]
fn test_json_session_over_nng() {
    let requests = Requests::default();
    let address = nng_json_engine(Arc::clone(&requests));

    let backend = connect(&address, TransportKind::Sp, WireProtocol::Json);
    let mut session = Session::new(script("6\n3/quit"), backend, Vec::new());

    assert_eq!(session.run().unwrap(), ExitReason::EngineQuit);
    assert_eq!(*requests.lock().unwrap(), vec!["6", "3", "divide", "quit"]);

    let output = String::from_utf8(session.output_mut().clone()).unwrap();
    assert!(output.contains(r#""response_type":"quitsig""#));
    assert!(output.contains(r#"{"stack":[2.0]}"#));
}

#[test]
fn test_engine_crash_mid_session_is_fatal() {
    let address = zmq_dying_engine();

    let backend = connect(&address, TransportKind::Zmtp, WireProtocol::Raw);
    let mut session = Session::new(script("5\n6\n"), backend, Vec::new());

    let result = session.run();
    assert!(matches!(
        result,
        Err(SessionError::Backend(IpcError::Timeout(_)))
    ));
}

/// libzmq REP socket that reads one request and goes away without a reply.
fn zmq_dying_engine() -> String {
    let context = zmq::Context::new();
    let socket = context.socket(zmq::REP).unwrap();
    socket.set_rcvtimeo(ENGINE_IDLE.as_millis() as i32).unwrap();
    socket.bind("tcp://127.0.0.1:*").unwrap();
    let address = socket
        .get_last_endpoint()
        .unwrap()
        .unwrap()
        .trim_start_matches("tcp://")
        .to_string();

    thread::spawn(move || {
        let _context = context;
        let _ = socket.recv_bytes(0);
    });
    address
}

#[test]
fn test_unreachable_nng_engine_fails_after_retries() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let result = EngineClient::connect_with_retry(
        &format!("127.0.0.1:{}", port),
        TransportKind::Sp,
        WireProtocol::Json,
        3,
    );
    assert!(matches!(result, Err(IpcError::ConnectionFailed { .. })));
}
