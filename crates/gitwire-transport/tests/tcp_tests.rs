//! `git://` sessions against an in-process fake daemon.

use gitwire_protocol::{
    Acknowledgement, AdvRefs, Capabilities, Endpoint, ObjectId, PktLine, PktLineReader,
    UploadPackRequest,
};
use gitwire_transport::transport::tcp::TcpCommander;
use gitwire_transport::transport::CommandTransport;
use gitwire_transport::{Transport, TransportError};
use pretty_assertions::assert_eq;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;

const MAIN: &str = "95d09f2b10159347eece71399a7e2e907ea3df4f";
const PACK: &[u8] = b"PACK\x00\x00\x00\x02\x00\x00\x00\x00";

/// Serves one connection: advertisement, then NAK and a raw pack once the
/// client sends `done`. Returns the handshake and the request lines.
fn spawn_daemon(listener: TcpListener, refs: bool) -> JoinHandle<(PktLine, Vec<String>)> {
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = PktLineReader::new(stream.try_clone().unwrap());
        let handshake = reader.read_packet().unwrap();

        let mut adv = AdvRefs::new();
        if refs {
            let id: ObjectId = MAIN.parse().unwrap();
            adv.head = Some(id);
            adv.references.insert("refs/heads/main".into(), id);
            adv.capabilities = Capabilities::parse("multi_ack thin-pack ofs-delta shallow");
            adv.encode(&mut stream, None).unwrap();
        } else {
            stream.write_all(b"0000").unwrap();
            return (handshake, Vec::new());
        }

        let mut lines = Vec::new();
        while let Ok(Some(pkt)) = reader.read() {
            let line = pkt.as_str().unwrap_or("<flush>").to_string();
            let done = line == "done";
            lines.push(line);
            if done {
                Acknowledgement::Nak.encode(&mut stream).unwrap();
                stream.write_all(PACK).unwrap();
                break;
            }
        }
        (handshake, lines)
    })
}

fn daemon_endpoint(listener: &TcpListener) -> Endpoint {
    let port = listener.local_addr().unwrap().port();
    Endpoint::parse(&format!("git://127.0.0.1:{port}/project.git")).unwrap()
}

#[test]
fn test_fetch_over_git_protocol() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let ep = daemon_endpoint(&listener);
    let daemon = spawn_daemon(listener, true);

    let transport = CommandTransport::new(TcpCommander::default());
    let mut session = transport.new_fetch_pack_session(&ep, None).unwrap();
    let adv = session.advertised_references().unwrap();
    assert_eq!(adv.capabilities.to_string(), "ofs-delta shallow");
    let head = adv.head.unwrap();

    let request = UploadPackRequest::new().want(head);
    let mut response = session.fetch_pack(&request).unwrap();
    let mut pack = Vec::new();
    response.read_to_end(&mut pack).unwrap();
    drop(response);
    assert_eq!(pack, PACK);

    assert!(matches!(
        session.fetch_pack(&request),
        Err(TransportError::InvalidState(_))
    ));
    session.close().unwrap();
    session.close().unwrap();
    assert!(matches!(
        session.advertised_references(),
        Err(TransportError::SessionClosed)
    ));

    let (handshake, lines) = daemon.join().unwrap();
    let port = ep.port().unwrap();
    assert_eq!(
        handshake.as_str(),
        Some(format!("git-upload-pack /project.git\0host=127.0.0.1:{port}\0").as_str())
    );
    assert_eq!(
        lines,
        vec![format!("want {MAIN}"), "<flush>".to_string(), "done".to_string()]
    );
}

#[test]
fn test_empty_repository_over_git_protocol() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let ep = daemon_endpoint(&listener);
    let daemon = spawn_daemon(listener, false);

    let transport = CommandTransport::new(TcpCommander::default());
    let mut session = transport.new_fetch_pack_session(&ep, None).unwrap();
    assert!(matches!(
        session.advertised_references(),
        Err(TransportError::EmptyRemoteRepository)
    ));
    session.close().unwrap();
    daemon.join().unwrap();
}

#[test]
fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let ep = daemon_endpoint(&listener);
    drop(listener);

    let transport = CommandTransport::new(TcpCommander::default());
    let err = transport
        .new_fetch_pack_session(&ep, None)
        .err()
        .expect("connecting to a closed port should fail");
    assert!(matches!(err, TransportError::Io { phase: "connect", .. }));
}
