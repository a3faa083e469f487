//! Local-exec sessions against real repositories.
//!
//! These tests need the `git` binaries and skip themselves without them.

use gitwire_protocol::{
    Endpoint, ObjectId, PackHeader, RefUpdateCommand, ReferenceUpdateRequest, UploadPackRequest,
};
use gitwire_transport::{AuthMethod, Client, TransportConfig, TransportError};
use pretty_assertions::assert_eq;
use std::io::{Cursor, Read};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn git_available() -> bool {
    ["git", "git-upload-pack", "git-receive-pack"]
        .iter()
        .all(|bin| Command::new(bin).arg("--version").output().is_ok())
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.name=Gitwire Test",
            "-c",
            "user.email=test@gitwire.dev",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// Creates `remote.git` with one commit on `refs/heads/main`.
fn bare_repo_with_commit(tmp: &TempDir) -> (Endpoint, ObjectId) {
    let remote = tmp.path().join("remote.git");
    let work = tmp.path().join("work");
    git(tmp.path(), &["init", "-q", "--bare", remote.to_str().unwrap()]);
    git(tmp.path(), &["init", "-q", work.to_str().unwrap()]);
    std::fs::write(work.join("README"), "hello\n").unwrap();
    git(&work, &["add", "README"]);
    git(&work, &["commit", "-q", "-m", "initial"]);
    git(&work, &["push", "-q", remote.to_str().unwrap(), "HEAD:refs/heads/main"]);
    let head = git(&work, &["rev-parse", "HEAD"]).parse().unwrap();
    (file_endpoint(&remote), head)
}

fn file_endpoint(path: &Path) -> Endpoint {
    Endpoint::parse(&format!("file://{}", path.display())).unwrap()
}

fn client() -> Client {
    Client::new(&TransportConfig::default()).unwrap()
}

fn fetch_pack(ep: &Endpoint, want: ObjectId) -> Vec<u8> {
    let client = client();
    let mut session = client.new_fetch_pack_session(ep, None).unwrap();
    let adv = session.advertised_references().unwrap();
    let request = UploadPackRequest::for_server(&adv.capabilities).want(want);
    let mut pack = Vec::new();
    session
        .fetch_pack(&request)
        .unwrap()
        .read_to_end(&mut pack)
        .unwrap();
    session.close().unwrap();
    pack
}

#[test]
fn test_fetch_from_local_bare_repository() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let (ep, head) = bare_repo_with_commit(&tmp);

    let client = client();
    let mut session = client.new_fetch_pack_session(&ep, None).unwrap();
    let adv = session.advertised_references().unwrap();
    assert_eq!(adv.references.len(), 1);
    assert_eq!(adv.references.get("refs/heads/main"), Some(&head));
    assert!(!adv.capabilities.is_empty());
    assert!(!adv.capabilities.supports("multi_ack"));
    assert!(!adv.capabilities.supports("thin-pack"));
    session.close().unwrap();
    session.close().unwrap();

    let pack = fetch_pack(&ep, head);
    assert!(pack.starts_with(b"PACK"));
    // commit, tree and blob
    assert_eq!(PackHeader::parse(&pack).unwrap().object_count, 3);
}

#[test]
fn test_push_into_empty_repository() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let (source, head) = bare_repo_with_commit(&tmp);
    let pack = fetch_pack(&source, head);

    let mirror = tmp.path().join("mirror.git");
    git(tmp.path(), &["init", "-q", "--bare", mirror.to_str().unwrap()]);
    let ep = file_endpoint(&mirror);

    let client = client();
    let mut session = client.new_send_pack_session(&ep, None).unwrap();
    let adv = session.advertised_references().unwrap();
    assert!(adv.references.is_empty());
    let request = ReferenceUpdateRequest::for_server(&adv.capabilities)
        .command(RefUpdateCommand::new(ObjectId::zero(), head, "refs/heads/main"))
        .with_pack(Cursor::new(pack));
    let report = session.send_pack(request).unwrap();
    session.close().unwrap();

    assert!(report.is_ok(), "push failed: {report:?}");
    assert_eq!(report.command_statuses[0].ref_name, "refs/heads/main");
    assert_eq!(git(&mirror, &["rev-parse", "refs/heads/main"]), head.to_hex());
}

#[test]
fn test_empty_repository() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let empty = tmp.path().join("empty.git");
    git(tmp.path(), &["init", "-q", "--bare", empty.to_str().unwrap()]);

    let client = client();
    let mut session = client
        .new_fetch_pack_session(&file_endpoint(&empty), None)
        .unwrap();
    assert!(matches!(
        session.advertised_references(),
        Err(TransportError::EmptyRemoteRepository)
    ));
}

#[test]
fn test_missing_repository() {
    if !git_available() {
        eprintln!("git not found, skipping");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let client = client();
    let mut session = client
        .new_fetch_pack_session(&file_endpoint(&tmp.path().join("nope.git")), None)
        .unwrap();
    assert!(matches!(
        session.advertised_references(),
        Err(TransportError::RepositoryNotFound)
    ));
}

#[test]
fn test_auth_rejected_for_local_repository() {
    let tmp = TempDir::new().unwrap();
    let client = client();
    let result = client.new_fetch_pack_session(
        &file_endpoint(tmp.path()),
        Some(AuthMethod::basic("user", "pass")),
    );
    assert!(matches!(result, Err(TransportError::InvalidAuthMethod)));
}
