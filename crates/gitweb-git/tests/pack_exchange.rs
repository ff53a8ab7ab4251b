//! End-to-end tests for pack exchanges against real git processes.
//!
//! Repository fixtures are created with the `git` binary; the process
//! lifecycle tests use small shell scripts standing in for git.

#![cfg(unix)]

use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use futures::TryStreamExt;
use gitweb_git::{
    ClientPayload, ContentEncoding, GitCommand, GitError, PackExchangeRequest, PackService,
    PackStream, PktLine, PktLineReader,
};
use std::io::{Cursor, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::TempDir;

const ZERO_ID: &str = "0000000000000000000000000000000000000000";

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(["-c", "init.defaultBranch=main"])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

/// Creates `<tmp>/repo.git` holding one commit on `main` and a `topic` branch.
fn bare_repo_with_commit() -> (TempDir, PathBuf, String) {
    let tmp = TempDir::new().unwrap();
    let work = tmp.path().join("work");
    std::fs::create_dir(&work).unwrap();
    git(&work, &["init", "-q"]);
    std::fs::write(work.join("README.md"), "# hello\n").unwrap();
    git(&work, &["add", "README.md"]);
    git(&work, &["commit", "-q", "-m", "initial"]);
    git(&work, &["branch", "topic"]);
    let head = git(&work, &["rev-parse", "HEAD"]);

    let bare = tmp.path().join("repo.git");
    git(
        tmp.path(),
        &["clone", "-q", "--bare", work.to_str().unwrap(), bare.to_str().unwrap()],
    );
    (tmp, bare, head)
}

fn stand_in(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn pkt(line: &str) -> Vec<u8> {
    PktLine::data(line.as_bytes()).unwrap().encode()
}

fn upload_request(want: &str) -> Vec<u8> {
    let mut body = pkt(&format!("want {want} side-band-64k\n"));
    body.extend(PktLine::Flush.encode());
    body.extend(pkt("done\n"));
    body
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

async fn collect(stream: PackStream) -> gitweb_git::Result<Vec<u8>> {
    let chunks: Vec<Bytes> = stream.try_collect().await?;
    Ok(chunks.concat())
}

/// Splits collected output into data until an error or the end.
async fn collect_partial(mut stream: PackStream) -> (Vec<u8>, Option<GitError>) {
    let mut out = Vec::new();
    loop {
        match stream.try_next().await {
            Ok(Some(chunk)) => out.extend_from_slice(&chunk),
            Ok(None) => return (out, None),
            Err(e) => return (out, Some(e)),
        }
    }
}

/// Parses an upload-pack response: `NAK`, side-band packets, flush.
fn pack_from_sideband(output: &[u8]) -> Vec<u8> {
    let mut reader = PktLineReader::new(Cursor::new(output.to_vec()));
    assert_eq!(reader.read().unwrap().unwrap().as_str(), Some("NAK"));

    let mut pack = Vec::new();
    loop {
        match reader.read().unwrap() {
            Some(PktLine::Data(data)) => {
                if data[0] == 1 {
                    pack.extend_from_slice(&data[1..]);
                }
            }
            Some(PktLine::Flush) => break,
            other => panic!("unexpected packet {other:?}"),
        }
    }
    assert!(reader.read().unwrap().is_none(), "data after final flush");
    pack
}

fn pack_object_count(pack: &[u8]) -> u32 {
    assert_eq!(&pack[..4], b"PACK");
    u32::from_be_bytes([pack[8], pack[9], pack[10], pack[11]])
}

#[tokio::test]
async fn test_upload_pack_advertisement() {
    let (_tmp, bare, head) = bare_repo_with_commit();

    let request = PackExchangeRequest::advertise(&bare, PackService::UploadPack);
    let output = collect(GitCommand::default().spawn(request).unwrap())
        .await
        .unwrap();

    assert!(output.starts_with(b"001e# service=git-upload-pack\n0000"));

    let mut reader = PktLineReader::new(Cursor::new(output[34..].to_vec()));
    let refs = reader.read_until_flush().unwrap();
    let first = refs[0].as_str().unwrap();
    assert!(first.starts_with(&head), "first ref line: {first:?}");
    assert!(refs
        .iter()
        .any(|r| r.as_str().unwrap().ends_with("refs/heads/topic")));
    assert!(reader.read().unwrap().is_none());
}

#[tokio::test]
async fn test_receive_pack_advertisement() {
    let (_tmp, bare, _head) = bare_repo_with_commit();

    let request = PackExchangeRequest::advertise(&bare, PackService::ReceivePack);
    let output = collect(GitCommand::default().spawn(request).unwrap())
        .await
        .unwrap();

    assert!(output.starts_with(b"001f# service=git-receive-pack\n0000"));
    assert!(output.ends_with(b"0000"));
    assert!(String::from_utf8_lossy(&output).contains("report-status"));
}

#[tokio::test]
async fn test_upload_pack_returns_pack() {
    let (_tmp, bare, head) = bare_repo_with_commit();

    let request = PackExchangeRequest::exchange(
        &bare,
        PackService::UploadPack,
        ClientPayload::from_bytes(upload_request(&head), ContentEncoding::Identity),
    );
    let output = collect(GitCommand::default().spawn(request).unwrap())
        .await
        .unwrap();

    let pack = pack_from_sideband(&output);
    // commit, tree, blob
    assert_eq!(pack_object_count(&pack), 3);
}

#[tokio::test]
async fn test_gzip_request_matches_plain_request() {
    let (_tmp, bare, head) = bare_repo_with_commit();
    let body = upload_request(&head);

    let plain = PackExchangeRequest::exchange(
        &bare,
        PackService::UploadPack,
        ClientPayload::from_bytes(body.clone(), ContentEncoding::Identity),
    );
    let gzipped = PackExchangeRequest::exchange(
        &bare,
        PackService::UploadPack,
        ClientPayload::from_bytes(gzip(&body), ContentEncoding::Gzip),
    );

    let git = GitCommand::default();
    let plain = pack_from_sideband(&collect(git.spawn(plain).unwrap()).await.unwrap());
    let gzipped = pack_from_sideband(&collect(git.spawn(gzipped).unwrap()).await.unwrap());

    assert_eq!(pack_object_count(&plain), pack_object_count(&gzipped));
}

#[tokio::test]
async fn test_receive_pack_empty_body_does_not_hang() {
    let (_tmp, bare, _head) = bare_repo_with_commit();

    let request = PackExchangeRequest::exchange(
        &bare,
        PackService::ReceivePack,
        ClientPayload::from_bytes(Vec::new(), ContentEncoding::Identity),
    );
    let stream = GitCommand::default().spawn(request).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(30), collect_partial(stream)).await;
    let (_, error) = result.expect("receive-pack hung on an empty body");
    assert!(!matches!(error, Some(GitError::ExchangeTimeout(_))));
}

#[tokio::test]
async fn test_receive_pack_flush_only_body() {
    let (_tmp, bare, _head) = bare_repo_with_commit();

    let request = PackExchangeRequest::exchange(
        &bare,
        PackService::ReceivePack,
        ClientPayload::from_bytes(PktLine::Flush.encode(), ContentEncoding::Identity),
    );
    let output = tokio::time::timeout(
        Duration::from_secs(30),
        collect(GitCommand::default().spawn(request).unwrap()),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(output.is_empty());
}

#[tokio::test]
async fn test_receive_pack_ref_deletion_without_objects() {
    let (_tmp, bare, head) = bare_repo_with_commit();

    let mut body = pkt(&format!(
        "{head} {ZERO_ID} refs/heads/topic\0report-status delete-refs\n"
    ));
    body.extend(PktLine::Flush.encode());

    let request = PackExchangeRequest::exchange(
        &bare,
        PackService::ReceivePack,
        ClientPayload::from_bytes(body, ContentEncoding::Identity),
    );
    let output = collect(GitCommand::default().spawn(request).unwrap())
        .await
        .unwrap();

    assert!(String::from_utf8_lossy(&output).contains("ok refs/heads/topic"));
    let refs = git(&bare, &["for-each-ref", "--format=%(refname)"]);
    assert!(!refs.contains("refs/heads/topic"));
    assert!(refs.contains("refs/heads/main"));
}

#[tokio::test]
async fn test_missing_repository_fails_after_announcement() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nothing-here.git");

    let request = PackExchangeRequest::advertise(&missing, PackService::UploadPack);
    let (output, error) = collect_partial(GitCommand::default().spawn(request).unwrap()).await;

    assert_eq!(output, b"001e# service=git-upload-pack\n0000");
    match error {
        Some(GitError::PackProcess { exit_code, stderr }) => {
            assert_ne!(exit_code, Some(0));
            assert!(!stderr.is_empty());
        }
        other => panic!("expected PackProcess, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failure_reported_after_streamed_output() {
    let tmp = TempDir::new().unwrap();
    let program = stand_in(
        tmp.path(),
        "failing-git",
        "printf 'partial output'\necho 'fatal: broken repository' >&2\nexit 3",
    );

    let request = PackExchangeRequest::exchange(
        tmp.path(),
        PackService::UploadPack,
        ClientPayload::Empty,
    );
    let (output, error) = collect_partial(GitCommand::new(program).spawn(request).unwrap()).await;

    assert_eq!(output, b"partial output");
    match error {
        Some(GitError::PackProcess { exit_code, stderr }) => {
            assert_eq!(exit_code, Some(3));
            assert_eq!(stderr, b"fatal: broken repository\n");
        }
        other => panic!("expected PackProcess, got {other:?}"),
    }
}

#[tokio::test]
async fn test_payload_reaches_stdin_and_is_closed() {
    let tmp = TempDir::new().unwrap();
    let program = stand_in(tmp.path(), "echo-git", "exec cat");
    let plain: Vec<u8> = (0..200_000u32).flat_map(|i| i.to_be_bytes()).collect();

    let chunks: Vec<gitweb_git::Result<Bytes>> = gzip(&plain)
        .chunks(1000)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    let request = PackExchangeRequest::exchange(
        tmp.path(),
        PackService::ReceivePack,
        ClientPayload::from_stream(futures::stream::iter(chunks), ContentEncoding::Gzip),
    );

    let output = tokio::time::timeout(
        Duration::from_secs(30),
        collect(GitCommand::new(program).spawn(request).unwrap()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(output, plain);
}

#[tokio::test]
async fn test_invalid_gzip_fails_exchange() {
    let tmp = TempDir::new().unwrap();
    let program = stand_in(tmp.path(), "echo-git", "exec cat");

    let request = PackExchangeRequest::exchange(
        tmp.path(),
        PackService::UploadPack,
        ClientPayload::from_bytes(&b"definitely not gzip"[..], ContentEncoding::Gzip),
    );
    let (_, error) = collect_partial(GitCommand::new(program).spawn(request).unwrap()).await;
    assert!(matches!(error, Some(GitError::InvalidGzip(_))));
}

#[cfg(target_os = "linux")]
fn is_terminated(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // state is the field after the parenthesised command name
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| matches!(rest.trim_start().chars().next(), Some('Z' | 'X')))
            .unwrap_or(true),
        Err(_) => true,
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_dropping_stream_kills_process() {
    let tmp = TempDir::new().unwrap();
    let pid_file = tmp.path().join("pid");
    let program = stand_in(
        tmp.path(),
        "slow-git",
        &format!("echo $$ > '{}'\nexec sleep 30", pid_file.display()),
    );

    let request = PackExchangeRequest::advertise(tmp.path(), PackService::UploadPack);
    let mut stream = GitCommand::new(program).spawn(request).unwrap();

    // The announcement is produced without waiting on the process.
    let first = stream.try_next().await.unwrap().unwrap();
    assert!(first.starts_with(b"001e"));

    let pid = loop {
        if let Ok(pid) = std::fs::read_to_string(&pid_file) {
            if let Ok(pid) = pid.trim().parse::<u32>() {
                break pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    assert!(!is_terminated(pid));

    drop(stream);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !is_terminated(pid) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "pack process {pid} still running after the stream was dropped"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
