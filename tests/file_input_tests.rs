/// End-to-end tests for the file-tailing pipeline: FileInput drives a
/// reader service that splits appended bytes into records, wraps them into
/// messages, and pushes them through the shared bounded buffer.
use logship::buffer::MessageBuffer;
use logship::config::types::{InitialReadPosition, InputConfig, InputType, RetryConfig};
use logship::input::{FileInput, Input};
use logship::message::Message;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

fn input_config(path: PathBuf, position: InitialReadPosition) -> InputConfig {
    InputConfig {
        input_type: InputType::File,
        path,
        initial_position: position,
        include_rotated: true,
        poll_interval: Duration::from_millis(20),
        outputs: vec!["console".to_string()],
        retry: RetryConfig::default(),
    }
}

fn append(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
}

async fn next_message(buffer: &MessageBuffer) -> Message {
    timeout(Duration::from_secs(5), buffer.pop())
        .await
        .expect("timed out waiting for message")
        .expect("buffer closed unexpectedly")
}

async fn assert_no_message(buffer: &MessageBuffer, wait: Duration) {
    assert!(
        timeout(wait, buffer.pop()).await.is_err(),
        "unexpected message in buffer"
    );
}

#[tokio::test]
async fn end_position_emits_only_new_complete_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    append(&path, b"");

    let buffer = MessageBuffer::new(16);
    let input = FileInput::new(
        "tail-end",
        input_config(path.clone(), InitialReadPosition::End),
        buffer.clone(),
    );
    Arc::clone(&input).start().await.unwrap();

    // Give the reader a moment to open at the current end of file.
    tokio::time::sleep(Duration::from_millis(100)).await;

    append(&path, b"a\n");
    append(&path, b"b\n");
    append(&path, b"c");

    assert_eq!(next_message(&buffer).await.message(), "a");
    assert_eq!(next_message(&buffer).await.message(), "b");

    // "c" has no delimiter yet; it must not be emitted.
    assert_no_message(&buffer, Duration::from_millis(200)).await;

    append(&path, b"\n");
    assert_eq!(next_message(&buffer).await.message(), "c");

    input.stop().await.unwrap();
}

#[tokio::test]
async fn incomplete_trailing_record_discarded_at_shutdown() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    append(&path, b"whole\npartial");

    let buffer = MessageBuffer::new(16);
    let input = FileInput::new(
        "tail-stop",
        input_config(path.clone(), InitialReadPosition::Start),
        buffer.clone(),
    );
    Arc::clone(&input).start().await.unwrap();

    assert_eq!(next_message(&buffer).await.message(), "whole");
    input.stop().await.unwrap();

    buffer.close();
    assert!(buffer.pop().await.is_none());
}

#[tokio::test]
async fn rotated_content_delivered_before_new_file_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    append(&path, b"one\ntwo\n");

    let buffer = MessageBuffer::new(64);
    let input = FileInput::new(
        "tail-rotate",
        input_config(path.clone(), InitialReadPosition::Start),
        buffer.clone(),
    );
    Arc::clone(&input).start().await.unwrap();

    assert_eq!(next_message(&buffer).await.message(), "one");
    assert_eq!(next_message(&buffer).await.message(), "two");

    // Rotate with unread bytes still in the old file.
    append(&path, b"three\nfour\n");
    std::fs::rename(&path, dir.path().join("app.log.1")).unwrap();
    append(&path, b"five\n");

    // Old-handle bytes precede anything written to the replacement,
    // regardless of when the reader noticed the rotation.
    assert_eq!(next_message(&buffer).await.message(), "three");
    assert_eq!(next_message(&buffer).await.message(), "four");
    assert_eq!(next_message(&buffer).await.message(), "five");

    input.stop().await.unwrap();
}

#[tokio::test]
async fn repeated_rotations_preserve_byte_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    append(&path, b"");

    let buffer = MessageBuffer::new(64);
    let input = FileInput::new(
        "tail-repeat",
        input_config(path.clone(), InitialReadPosition::Start),
        buffer.clone(),
    );
    Arc::clone(&input).start().await.unwrap();

    // Let the reader open the live file before the first rotation.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut expected = Vec::new();
    for generation in 0..3 {
        for line in 0..4 {
            let text = format!("gen{}-line{}", generation, line);
            append(&path, format!("{}\n", text).as_bytes());
            expected.push(text);
        }
        // Shift older rotations up, then move the live file aside.
        let older = dir.path().join("app.log.2");
        let newer = dir.path().join("app.log.1");
        if newer.exists() {
            std::fs::rename(&newer, &older).unwrap();
        }
        std::fs::rename(&path, &newer).unwrap();
        append(&path, b"");
        tokio::time::sleep(Duration::from_millis(80)).await;
    }

    for text in &expected {
        assert_eq!(next_message(&buffer).await.message(), text.as_str());
    }

    input.stop().await.unwrap();
}

#[tokio::test]
async fn delivered_messages_carry_routing_metadata() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    append(&path, b"payload\n");

    let buffer = MessageBuffer::new(16);
    let input = FileInput::new(
        "meta",
        input_config(path.clone(), InitialReadPosition::Start),
        buffer.clone(),
    );
    Arc::clone(&input).start().await.unwrap();

    let message = next_message(&buffer).await;
    assert_eq!(message.message(), "payload");
    assert_eq!(message.input(), "meta");
    assert_eq!(message.source(), path.display().to_string());
    assert!(message.outputs().contains("console"));
    assert!(message.level().is_none());

    input.stop().await.unwrap();
}

#[tokio::test]
async fn small_buffer_applies_backpressure_without_loss() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.log");
    for i in 0..50 {
        append(&path, format!("line-{}\n", i).as_bytes());
    }

    // Capacity far below the record count: the reader must block on the
    // full buffer and resume as the consumer drains it.
    let buffer = MessageBuffer::new(4);
    let input = FileInput::new(
        "backpressure",
        input_config(path.clone(), InitialReadPosition::Start),
        buffer.clone(),
    );
    Arc::clone(&input).start().await.unwrap();

    for i in 0..50 {
        assert!(buffer.len() <= 4);
        let message = next_message(&buffer).await;
        assert_eq!(message.message(), format!("line-{}", i));
    }

    input.stop().await.unwrap();
}
