use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use super::FileStream;
use crate::logstream::LogStream;
use crate::logstream::test_support::Harness;
use crate::metrics;

fn append(path: &Path, data: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(data.as_bytes())
}

#[tokio::test]
async fn reads_every_line_from_start() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log");
    std::fs::write(&path, "a\nb\nc\n")?;

    let mut h = Harness::new();
    let stream = FileStream::open(&h.cx, &path, true)?;

    assert_eq!(h.next_line().await?, "a");
    assert_eq!(h.next_line().await?, "b");
    assert_eq!(h.next_line().await?, "c");

    stream.stop();
    h.wait_complete(&stream).await?;
    h.expect_no_line().await?;
    Ok(())
}

#[tokio::test]
async fn starts_at_end_skips_existing_content() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log");
    std::fs::write(&path, "old\n")?;

    let mut h = Harness::new();
    let stream = FileStream::open(&h.cx, &path, false)?;
    h.waker.awaken(1).await;

    append(&path, "new\n")?;
    assert_eq!(h.next_line().await?, "new");
    assert_eq!(stream.pathname(), path.as_path());
    Ok(())
}

#[tokio::test]
async fn partial_line_is_completed_by_later_append() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log");
    std::fs::write(&path, "foo\nbar")?;

    let mut h = Harness::new();
    let _stream = FileStream::open(&h.cx, &path, true)?;
    assert_eq!(h.next_line().await?, "foo");
    h.expect_no_line().await?;

    append(&path, "baz\n")?;
    assert_eq!(h.next_line().await?, "barbaz");
    h.expect_no_line().await?;
    Ok(())
}

#[tokio::test]
async fn truncation_flushes_partial_and_rereads() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log");
    std::fs::write(&path, "line 1\nline")?;

    let mut h = Harness::new();
    let stream = FileStream::open(&h.cx, &path, true)?;
    assert_eq!(h.next_line().await?, "line 1");

    let mut file = OpenOptions::new().write(true).truncate(true).open(&path)?;
    file.write_all(b"A\n")?;
    drop(file);

    assert_eq!(h.next_line().await?, "line");
    assert_eq!(h.next_line().await?, "A");
    assert!(metrics::global().file_truncates.get(&path) >= 1);
    assert!(!stream.is_complete());
    Ok(())
}

#[tokio::test]
async fn rotation_follows_new_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log");
    std::fs::write(&path, "1\n")?;

    let mut h = Harness::new();
    let stream = FileStream::open(&h.cx, &path, true)?;
    assert_eq!(h.next_line().await?, "1");

    std::fs::rename(&path, dir.path().join("log.1"))?;
    std::fs::write(&path, "2\n")?;

    assert_eq!(h.next_line().await?, "2");
    assert_eq!(metrics::global().file_rotations.get(&path), 1);
    assert!(!stream.is_complete());

    // The handle still controls the stream after the hand-off.
    stream.stop();
    h.wait_complete(&stream).await?;
    h.cx.wait().await;
    Ok(())
}

#[tokio::test]
async fn rotation_drains_old_file_before_new() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log");
    let rotated = dir.path().join("log.1");
    std::fs::write(&path, "1\npart")?;

    let mut h = Harness::new();
    let _stream = FileStream::open(&h.cx, &path, true)?;
    assert_eq!(h.next_line().await?, "1");

    // Nothing re-reads until kicked, so all three writes land first.
    h.wait_parked(1).await?;
    std::fs::rename(&path, &rotated)?;
    append(&rotated, "ial\nold2\n")?;
    std::fs::write(&path, "new\n")?;

    assert_eq!(h.next_line().await?, "partial");
    assert_eq!(h.next_line().await?, "old2");
    assert_eq!(h.next_line().await?, "new");
    Ok(())
}

#[tokio::test]
async fn rotation_drops_unfinished_line_of_old_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log");
    std::fs::write(&path, "1\npart")?;

    let mut h = Harness::new();
    let stream = FileStream::open(&h.cx, &path, true)?;
    assert_eq!(h.next_line().await?, "1");

    h.wait_parked(1).await?;
    std::fs::rename(&path, dir.path().join("log.1"))?;
    std::fs::write(&path, "new\n")?;

    assert_eq!(h.next_line().await?, "new");
    h.expect_no_line().await?;
    assert!(!stream.is_complete());
    Ok(())
}

#[tokio::test]
async fn stop_while_idle_delivers_data_written_alongside() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log");
    std::fs::write(&path, "a\n")?;

    let mut h = Harness::new();
    let stream = FileStream::open(&h.cx, &path, true)?;
    assert_eq!(h.next_line().await?, "a");

    h.wait_parked(1).await?;
    append(&path, "late\n")?;
    stream.stop();

    assert_eq!(h.next_line().await?, "late");
    h.wait_complete(&stream).await?;
    h.expect_no_line().await?;
    Ok(())
}

#[tokio::test]
async fn stop_flushes_partial_exactly_once() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log");
    std::fs::write(&path, "foo\nbar")?;

    let mut h = Harness::new();
    let stream = FileStream::open(&h.cx, &path, true)?;
    assert_eq!(h.next_line().await?, "foo");

    stream.stop();
    stream.stop();
    assert_eq!(h.next_line().await?, "bar");
    h.wait_complete(&stream).await?;
    h.expect_no_line().await?;
    Ok(())
}

#[tokio::test]
async fn cancellation_flushes_and_completes_for_good() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log");
    std::fs::write(&path, "x\npart")?;

    let mut h = Harness::new();
    let stream = FileStream::open(&h.cx, &path, true)?;
    assert_eq!(h.next_line().await?, "x");

    h.cx.cancel();
    assert_eq!(h.next_line().await?, "part");
    h.wait_complete(&stream).await?;
    tokio::time::timeout(Duration::from_secs(5), h.cx.wait()).await?;

    append(&path, "after\n")?;
    h.expect_no_line().await?;
    assert!(stream.is_complete());
    Ok(())
}

#[tokio::test]
async fn deleted_file_idles_until_stopped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log");
    std::fs::write(&path, "x\n")?;

    let mut h = Harness::new();
    let stream = FileStream::open(&h.cx, &path, true)?;
    assert_eq!(h.next_line().await?, "x");

    std::fs::remove_file(&path)?;
    h.expect_no_line().await?;
    assert!(!stream.is_complete());
    assert_eq!(metrics::global().log_errors.get(&path), 0);

    stream.stop();
    h.wait_complete(&stream).await?;
    Ok(())
}

#[tokio::test]
async fn last_read_time_advances_on_read() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log");
    std::fs::write(&path, "")?;

    let mut h = Harness::new();
    let stream = FileStream::open(&h.cx, &path, true)?;
    let before = stream.last_read_time();

    tokio::time::sleep(Duration::from_millis(20)).await;
    append(&path, "hello\n")?;
    assert_eq!(h.next_line().await?, "hello");
    assert!(stream.last_read_time() > before);
    Ok(())
}

#[tokio::test]
async fn missing_file_is_an_open_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("missing");

    let h = Harness::new();
    let err = FileStream::open(&h.cx, &path, true).err();
    assert!(matches!(err, Some(crate::StreamError::Open { .. })));
    assert_eq!(metrics::global().log_errors.get(&path), 1);
    Ok(())
}

#[tokio::test]
async fn closed_sink_completes_stream() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("log");
    std::fs::write(&path, "a\nb\n")?;

    let h = Harness::new();
    let Harness { cx, waker: _, rx } = h;
    drop(rx);
    let stream = FileStream::open(&cx, &path, true)?;
    tokio::time::timeout(Duration::from_secs(5), cx.wait()).await?;
    assert!(stream.is_complete());
    Ok(())
}
