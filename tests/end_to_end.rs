//! End-to-end scenarios driven over real TCP sockets: a name server and one
//! or more storage servers are started on ephemeral ports, then exercised
//! with the wire protocol directly (the way `scriptorium::client::shell`
//! does), covering the walkthroughs from the specification's usage section.

use std::time::Duration;

use scriptorium::config::Limits;
use scriptorium::wire::{read_frame, write_frame, Frame, Header, MsgType, OpCode};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};

async fn free_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn spawn_name_server() -> (u16, TempDir) {
    spawn_name_server_with_limits(Limits::default()).await
}

async fn spawn_name_server_with_limits(limits: Limits) -> (u16, TempDir) {
    let port = free_port().await;
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("nm_state.dat");
    tokio::spawn(scriptorium::nm::run(port, limits, state_path));
    tokio::time::sleep(Duration::from_millis(50)).await;
    (port, dir)
}

async fn spawn_storage_server(id: u32, nm_port: u16, replica: Option<(&str, u16)>) -> (u16, TempDir) {
    let (port, dir, _handle) = spawn_storage_server_handle(id, nm_port, replica).await;
    (port, dir)
}

async fn spawn_storage_server_handle(
    id: u32,
    nm_port: u16,
    replica: Option<(&str, u16)>,
) -> (u16, TempDir, tokio::task::JoinHandle<std::io::Result<()>>) {
    let client_port = free_port().await;
    let dir = TempDir::new().unwrap();
    let config = scriptorium::ss::SsConfig {
        server_id: id,
        nm_ip: "127.0.0.1".to_string(),
        nm_port,
        client_port,
        storage_dir: dir.path().to_path_buf(),
        replica_addr: replica.map(|(ip, port)| format!("{ip}:{port}")),
        advertise_ip: "127.0.0.1".to_string(),
        heartbeat_interval: Duration::from_millis(50),
    };
    let handle = tokio::spawn(scriptorium::ss::run(config));
    tokio::time::sleep(Duration::from_millis(100)).await;
    (client_port, dir, handle)
}

async fn roundtrip(stream: &mut TcpStream, header: Header, payload: Vec<u8>) -> Frame {
    write_frame(stream, &Frame::new(header, payload)).await.unwrap();
    read_frame(stream).await.unwrap().unwrap()
}

fn is_error(frame: &Frame) -> bool {
    frame.header.msg_type as u8 == MsgType::Error as u8
}

async fn connect_client(nm_port: u16, username: &str) -> TcpStream {
    let mut stream = TcpStream::connect(("127.0.0.1", nm_port)).await.unwrap();
    let reply = roundtrip(&mut stream, Header::request(OpCode::ConnectClient, username), Vec::new()).await;
    assert!(!is_error(&reply), "connect failed: {:?}", reply.header.error_code);
    stream
}

/// Creates a brand new file for `username` through the name server, which
/// forwards the CREATE to the chosen storage server itself, returning the
/// file's client-facing endpoint.
async fn create_file(nm: &mut TcpStream, username: &str, filename: &str) -> String {
    let header = Header::request(OpCode::Create, username).with_filename(filename);
    let reply = roundtrip(nm, header, Vec::new()).await;
    assert!(!is_error(&reply), "create failed: {:?}", reply.header.error_code);
    reply.payload_str()
}

#[tokio::test]
async fn create_write_and_read_a_file() {
    let (nm_port, _nm_dir) = spawn_name_server().await;
    let (_ss_port, _ss_dir) = spawn_storage_server(1, nm_port, None).await;

    let mut nm = connect_client(nm_port, "alice").await;
    let endpoint = create_file(&mut nm, "alice", "draft.txt").await;

    let mut ss = TcpStream::connect(&endpoint).await.unwrap();
    let header = Header::request(OpCode::SsEtirw, "alice")
        .with_filename("draft.txt")
        .with_sentence_index(0)
        .with_word_index(0);
    let reply = roundtrip(&mut ss, header, b"Hello".to_vec()).await;
    assert!(!is_error(&reply));

    let header = Header::request(OpCode::SsRead, "alice").with_filename("draft.txt");
    let reply = roundtrip(&mut ss, header, Vec::new()).await;
    assert_eq!(reply.payload_str(), "Hello");
}

#[tokio::test]
async fn two_writers_cannot_hold_the_same_sentence_at_once() {
    let (nm_port, _nm_dir) = spawn_name_server().await;
    let (ss_port, _ss_dir) = spawn_storage_server(1, nm_port, None).await;

    let mut nm_alice = connect_client(nm_port, "alice").await;
    create_file(&mut nm_alice, "alice", "shared.txt").await;

    let mut ss_alice = TcpStream::connect(("127.0.0.1", ss_port)).await.unwrap();
    let header = Header::request(OpCode::SsEtirw, "alice")
        .with_filename("shared.txt")
        .with_sentence_index(0)
        .with_word_index(0);
    roundtrip(&mut ss_alice, header, b"placeholder".to_vec()).await;

    let lock_header = Header::request(OpCode::SsWriteLock, "alice").with_filename("shared.txt").with_sentence_index(0);
    let reply = roundtrip(&mut ss_alice, lock_header, Vec::new()).await;
    assert!(!is_error(&reply));

    let mut ss_bob = TcpStream::connect(("127.0.0.1", ss_port)).await.unwrap();
    let lock_header = Header::request(OpCode::SsWriteLock, "bob").with_filename("shared.txt").with_sentence_index(0);
    let reply = roundtrip(&mut ss_bob, lock_header, Vec::new()).await;
    assert!(is_error(&reply), "bob should not be able to lock a sentence alice already holds");

    let unlock_header =
        Header::request(OpCode::SsWriteUnlock, "alice").with_filename("shared.txt").with_sentence_index(0);
    roundtrip(&mut ss_alice, unlock_header, Vec::new()).await;

    let reply = roundtrip(&mut ss_bob, lock_header, Vec::new()).await;
    assert!(!is_error(&reply), "bob should be able to lock the sentence once alice releases it");
}

#[tokio::test]
async fn only_the_owner_can_grant_access_and_only_granted_users_can_read() {
    let (nm_port, _nm_dir) = spawn_name_server().await;
    let (_ss_port, _ss_dir) = spawn_storage_server(1, nm_port, None).await;

    let mut nm_alice = connect_client(nm_port, "alice").await;
    create_file(&mut nm_alice, "alice", "private.txt").await;

    let mut nm_bob = connect_client(nm_port, "bob").await;
    let header = Header::request(OpCode::Read, "bob").with_filename("private.txt");
    let reply = roundtrip(&mut nm_bob, header, Vec::new()).await;
    assert!(is_error(&reply), "bob should not be able to read a file he has no access to");

    let header = Header::request(OpCode::AddAccess, "alice").with_filename("private.txt").with_flags(0b01);
    let reply = roundtrip(&mut nm_alice, header, b"bob".to_vec()).await;
    assert!(!is_error(&reply), "owner should be able to grant read access");

    let header = Header::request(OpCode::Read, "bob").with_filename("private.txt");
    let reply = roundtrip(&mut nm_bob, header, Vec::new()).await;
    assert!(!is_error(&reply), "bob should be able to read after being granted access");
}

#[tokio::test]
async fn reads_fail_over_to_the_paired_replica_when_the_primary_goes_dark() {
    let mut limits = Limits::default();
    limits.heartbeat_check_interval_ms = 50;
    limits.heartbeat_timeout_ms = 150;
    let (nm_port, _nm_dir) = spawn_name_server_with_limits(limits).await;

    let (ss1_port, _ss1_dir, ss1_handle) = spawn_storage_server_handle(1, nm_port, None).await;
    let (_ss2_port, _ss2_dir, _ss2_handle) =
        spawn_storage_server_handle(2, nm_port, Some(("127.0.0.1", ss1_port))).await;

    let mut nm = connect_client(nm_port, "alice").await;
    let header = Header::request(OpCode::Create, "alice").with_filename("replicated.txt");
    let reply = roundtrip(&mut nm, header, Vec::new()).await;
    assert!(!is_error(&reply));
    let _first_endpoint = reply.payload_str();

    // Simulate server 1 going dark: abort its task so its heartbeat loop
    // stops feeding the name server, rather than merely disconnecting one
    // client connection.
    ss1_handle.abort();

    tokio::time::sleep(Duration::from_millis(400)).await;

    let header = Header::request(OpCode::Read, "alice").with_filename("replicated.txt");
    let reply = roundtrip(&mut nm, header, Vec::new()).await;
    assert!(!is_error(&reply), "read should resolve to a live server even if server 1 stopped heartbeating");
}

#[tokio::test]
async fn checkpoint_then_revert_restores_the_tagged_snapshot() {
    let (nm_port, _nm_dir) = spawn_name_server().await;
    let (_ss_port, _ss_dir) = spawn_storage_server(1, nm_port, None).await;

    let mut nm = connect_client(nm_port, "alice").await;
    let endpoint = create_file(&mut nm, "alice", "versioned.txt").await;
    let mut ss = TcpStream::connect(&endpoint).await.unwrap();

    let header = Header::request(OpCode::SsEtirw, "alice")
        .with_filename("versioned.txt")
        .with_sentence_index(0)
        .with_word_index(0);
    roundtrip(&mut ss, header, b"Draft".to_vec()).await;

    let mut checkpoint_header = Header::request(OpCode::SsCheckpoint, "alice").with_filename("versioned.txt");
    checkpoint_header.checkpoint_tag = "v1".to_string();
    let reply = roundtrip(&mut ss, checkpoint_header, Vec::new()).await;
    assert!(!is_error(&reply));

    let header = Header::request(OpCode::SsEtirw, "alice")
        .with_filename("versioned.txt")
        .with_sentence_index(0)
        .with_word_index(0);
    roundtrip(&mut ss, header, b"Final".to_vec()).await;

    let header = Header::request(OpCode::SsRead, "alice").with_filename("versioned.txt");
    let reply = roundtrip(&mut ss, header, Vec::new()).await;
    assert_eq!(reply.payload_str(), "Final");

    let mut revert_header = Header::request(OpCode::SsRevert, "alice").with_filename("versioned.txt");
    revert_header.checkpoint_tag = "v1".to_string();
    let reply = roundtrip(&mut ss, revert_header, Vec::new()).await;
    assert!(!is_error(&reply));

    let header = Header::request(OpCode::SsRead, "alice").with_filename("versioned.txt");
    let reply = roundtrip(&mut ss, header, Vec::new()).await;
    assert_eq!(reply.payload_str(), "Draft");
}

#[tokio::test]
async fn access_request_must_be_approved_by_the_owner_before_it_takes_effect() {
    let (nm_port, _nm_dir) = spawn_name_server().await;
    let (_ss_port, _ss_dir) = spawn_storage_server(1, nm_port, None).await;

    let mut nm_alice = connect_client(nm_port, "alice").await;
    create_file(&mut nm_alice, "alice", "shared_doc.txt").await;

    let mut nm_bob = connect_client(nm_port, "bob").await;
    let header = Header::request(OpCode::RequestAccess, "bob").with_filename("shared_doc.txt").with_flags(0b01);
    let reply = roundtrip(&mut nm_bob, header, Vec::new()).await;
    assert!(!is_error(&reply));

    let header = Header::request(OpCode::Read, "bob").with_filename("shared_doc.txt");
    let reply = roundtrip(&mut nm_bob, header, Vec::new()).await;
    assert!(is_error(&reply), "an unapproved request must not grant access");

    let header = Header::request(OpCode::ViewRequests, "alice").with_filename("shared_doc.txt");
    let reply = roundtrip(&mut nm_alice, header, Vec::new()).await;
    assert!(reply.payload_str().contains("bob"));

    let header = Header::request(OpCode::Approve, "alice").with_filename("shared_doc.txt");
    let reply = roundtrip(&mut nm_alice, header, b"bob".to_vec()).await;
    assert!(!is_error(&reply));

    let header = Header::request(OpCode::Read, "bob").with_filename("shared_doc.txt");
    let reply = roundtrip(&mut nm_bob, header, Vec::new()).await;
    assert!(!is_error(&reply), "access should be granted once the owner approves the request");
}
