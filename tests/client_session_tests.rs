//! `ClientSession` driven through scripted client transcripts.

mod common;

use common::{banner, lines, loc, present_response, search_response, ScriptedTransport};
use marcsearch::transport::Response;
use marcsearch::{
    CancelToken, ClientSession, EngineError, ErrorKind, MarcParser, ProtocolSession, SearchQuery,
    SessionPhase,
};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

fn response(text: &str) -> Response {
    Response {
        lines: lines(text),
        closed: false,
    }
}

#[test]
fn test_search_and_fetch_transcript() {
    let transport = ScriptedTransport::new(vec![
        banner(),
        search_response(3),
        present_response(2),
    ]);
    let sent = transport.sent.clone();
    let terminated = transport.terminated.clone();
    let cancel = CancelToken::new();

    let mut session = ClientSession::connect(loc(), transport, &cancel).unwrap();
    assert_eq!(session.state().phase(), SessionPhase::Connected);

    let query = SearchQuery::isbn("0-7432-7356-7").unwrap();
    assert_eq!(session.search(&query, &cancel).unwrap(), 3);
    assert_eq!(session.hit_count(), Some(3));

    let raw = session.fetch_record(2).unwrap();
    let record = MarcParser::new().parse(&raw).unwrap();
    assert_eq!(record.tags(), vec!["020", "100", "245", "260"]);
    assert_eq!(record.title(), Some("The great Gatsby, part 2 /"));
    assert_eq!(session.state().cursor(), Some(2));

    assert_eq!(
        *sent.lock().unwrap(),
        vec![
            "find @attr 1=7 @attr 4=1 \"0743273567\"".to_string(),
            "show 2".to_string(),
        ]
    );

    session.close();
    session.close();
    assert!(terminated.load(Ordering::SeqCst));
    assert_eq!(session.state().phase(), SessionPhase::Closed);
}

#[test]
fn test_zero_hits_is_success() {
    let transport = ScriptedTransport::new(vec![
        banner(),
        response("Sent searchRequest.\nReceived SearchResponse.\nSearch was a success.\nNumber of hits: 0"),
    ]);
    let cancel = CancelToken::new();
    let mut session = ClientSession::connect(loc(), transport, &cancel).unwrap();
    let query = SearchQuery::title_author("Gatsby", "Fitzgerald").unwrap();
    assert_eq!(session.search(&query, &cancel).unwrap(), 0);
    assert_eq!(session.state().phase(), SessionPhase::Ready);
}

#[test]
fn test_missing_hits_line_with_success_means_zero() {
    let transport = ScriptedTransport::new(vec![
        banner(),
        response("Sent searchRequest.\nReceived SearchResponse.\nSearch was a success."),
    ]);
    let cancel = CancelToken::new();
    let mut session = ClientSession::connect(loc(), transport, &cancel).unwrap();
    let query = SearchQuery::title_author("Gatsby", "Fitzgerald").unwrap();
    assert_eq!(session.search(&query, &cancel).unwrap(), 0);
}

#[test]
fn test_refused_banner_terminates_client() {
    let transport = ScriptedTransport::new(vec![response(
        "Connecting...error = System (lower-layer) error: Connection refused",
    )]);
    let terminated = transport.terminated.clone();
    let err = ClientSession::connect(loc(), transport, &CancelToken::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(terminated.load(Ordering::SeqCst));
}

#[test]
fn test_rejected_search_fails_session() {
    let transport = ScriptedTransport::new(vec![
        banner(),
        response("Sent searchRequest.\nReceived SearchResponse.\nSearch was a bloomin' failure.\nDiagnostic message(s) from database:\n    [114] Unsupported Use attribute -- v2 addinfo '1003'"),
    ]);
    let cancel = CancelToken::new();
    let mut session = ClientSession::connect(loc(), transport, &cancel).unwrap();
    let query = SearchQuery::title_author("Gatsby", "Fitzgerald").unwrap();
    let err = session.search(&query, &cancel).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(session.state().phase(), SessionPhase::Failed);
    assert!(matches!(
        session.fetch_record(1),
        Err(EngineError::Protocol { .. })
    ));
}

#[test]
fn test_unrecognized_search_response() {
    let transport = ScriptedTransport::new(vec![banner(), response("Unknown command: find")]);
    let cancel = CancelToken::new();
    let mut session = ClientSession::connect(loc(), transport, &cancel).unwrap();
    let query = SearchQuery::isbn("0743273567").unwrap();
    let err = session.search(&query, &cancel).unwrap_err();
    assert!(err.to_string().contains("unrecognized search response"));
}

#[test]
fn test_fetch_past_hits_never_contacts_client() {
    let transport = ScriptedTransport::new(vec![banner(), search_response(2)]);
    let sent = transport.sent.clone();
    let cancel = CancelToken::new();
    let mut session = ClientSession::connect(loc(), transport, &cancel).unwrap();
    let query = SearchQuery::isbn("0743273567").unwrap();
    session.search(&query, &cancel).unwrap();

    assert!(matches!(
        session.fetch_record(3),
        Err(EngineError::Bounds { index: 3, hits: 2 })
    ));
    assert!(matches!(
        session.fetch_record(0),
        Err(EngineError::Bounds { index: 0, hits: 2 })
    ));
    assert_eq!(sent.lock().unwrap().len(), 1);
    assert_eq!(session.state().phase(), SessionPhase::Ready);
}

#[test]
fn test_present_out_of_range_is_bounds_error() {
    let transport = ScriptedTransport::new(vec![
        banner(),
        search_response(5),
        response("Sent presentRequest (4+1).\nPresent request out of range"),
        present_response(1),
    ]);
    let cancel = CancelToken::new();
    let mut session = ClientSession::connect(loc(), transport, &cancel).unwrap();
    let query = SearchQuery::isbn("0743273567").unwrap();
    session.search(&query, &cancel).unwrap();

    let err = session.fetch_record(4).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Bounds);
    // The session survives a fetch-local error.
    assert!(session.fetch_record(1).is_ok());
}

#[test]
fn test_unparseable_record_keeps_session_ready() {
    let transport = ScriptedTransport::new(vec![
        banner(),
        search_response(1),
        response("Sent presentRequest (1+1).\nDiagnostic message(s) from database:\n    [238] Record not available in requested syntax"),
    ]);
    let cancel = CancelToken::new();
    let mut session = ClientSession::connect(loc(), transport, &cancel).unwrap();
    let query = SearchQuery::isbn("0743273567").unwrap();
    session.search(&query, &cancel).unwrap();

    let raw = session.fetch_record(1).unwrap();
    let err = MarcParser::new().parse(&raw).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(session.state().phase(), SessionPhase::Ready);
}

#[test]
fn test_cancel_while_searching_closes_session() {
    let transport = ScriptedTransport::new(vec![banner()]).blocking();
    let terminated = transport.terminated.clone();
    let cancel = CancelToken::new();
    let mut session = ClientSession::connect(loc(), transport, &cancel).unwrap();

    let canceller = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        })
    };
    let query = SearchQuery::isbn("0743273567").unwrap();
    let err = session.search(&query, &cancel).unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(session.state().phase(), SessionPhase::Closed);
    assert!(terminated.load(Ordering::SeqCst));
}

#[test]
fn test_cancel_while_fetching_closes_session() {
    let transport = ScriptedTransport::new(vec![banner(), search_response(2)]).blocking();
    let terminated = transport.terminated.clone();
    let cancel = CancelToken::new();
    let mut session = ClientSession::connect(loc(), transport, &cancel).unwrap();
    let query = SearchQuery::isbn("0743273567").unwrap();
    assert_eq!(session.search(&query, &cancel).unwrap(), 2);

    let canceller = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            cancel.cancel();
        })
    };
    let err = session.fetch_record_cancellable(1, &cancel).unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(session.state().phase(), SessionPhase::Closed);
    assert!(terminated.load(Ordering::SeqCst));
}

#[test]
fn test_client_exit_mid_fetch_fails_session() {
    let transport = ScriptedTransport::new(vec![banner(), search_response(4)]);
    let cancel = CancelToken::new();
    let mut session = ClientSession::connect(loc(), transport, &cancel).unwrap();
    let query = SearchQuery::isbn("0743273567").unwrap();
    session.search(&query, &cancel).unwrap();

    let err = session.fetch_record(1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(session.state().phase(), SessionPhase::Failed);
}

#[test]
fn test_drop_terminates_client() {
    let transport = ScriptedTransport::new(vec![banner()]);
    let terminated = transport.terminated.clone();
    let session = ClientSession::connect(loc(), transport, &CancelToken::new()).unwrap();
    drop(session);
    assert!(terminated.load(Ordering::SeqCst));
}
