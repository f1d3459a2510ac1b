use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::process::Command;
use std::ptr;
use std::thread;
use std::time::{Duration, Instant};

use super::spsc_tests::SequencedMessage;
use super::unique_identifier;
use crate::core::Segment;
use crate::{reader, writer};
use crate::{Role, ShmQueue};

/// Set only in the environment of the spawned consumer process.
const CHILD_IDENTIFIER: &str = "SHMQUEUE_TEST_CHILD_IDENTIFIER";
const CHILD_CAPACITY: u32 = 256;
const CHILD_MESSAGES: u64 = 5_000;
const CHILD_TEST: &str = "tests::process_tests::consumer_process";

/// Two independent mappings of one segment, as two processes would hold.
#[test]
fn separate_mappings_share_one_ring() -> Result<(), Box<dyn Error>> {
    let (_dir, path) = unique_identifier();
    let producer = Segment::create_or_open(&path, 100)?;
    let consumer = Segment::open(&path, 100)?;
    assert!(producer.created());
    assert!(!consumer.created());
    assert!(!ptr::eq(producer.write_cursor(), consumer.write_cursor()));

    // Park both cursors at 80 so the next frame wraps.
    writer::put(&producer, &[9u8; 76])?;
    assert_eq!(consumer.cursors(), (80, 0));
    assert_eq!(reader::get(&consumer, 76)?, vec![9u8; 76]);
    assert_eq!(producer.cursors(), (80, 80));

    let message: Vec<u8> = (0..30u8).collect();
    writer::put(&producer, &message)?;
    assert_eq!(reader::peek_len(&consumer)?, Some(30));
    assert_eq!(reader::get(&consumer, 64)?, message);
    assert_eq!(producer.cursors(), (114, 114));
    assert!(reader::get(&consumer, 64)?.is_empty());

    producer.unlink()?;
    assert!(!path.exists());
    assert!(!consumer.is_linked());
    Ok(())
}

/// Consumer half of `child_process_reads_in_order`. Does nothing unless that
/// test spawned this process.
#[test]
fn consumer_process() -> Result<(), Box<dyn Error>> {
    let path = match env::var_os(CHILD_IDENTIFIER) {
        Some(path) => PathBuf::from(path),
        None => return Ok(()),
    };
    let mut consumer = ShmQueue::attach(&path, CHILD_CAPACITY, Role::Consumer)?;
    assert!(!consumer.is_owner());

    let deadline = Instant::now() + Duration::from_secs(60);
    let mut expected = 0u64;
    while expected < CHILD_MESSAGES {
        assert!(Instant::now() < deadline, "timed out waiting for message {}", expected);
        let bytes = consumer.get(128)?;
        if bytes.is_empty() {
            thread::yield_now();
            continue;
        }
        let msg = SequencedMessage::from_bytes(&bytes).expect("truncated message");
        assert_eq!(msg, SequencedMessage::new(expected));
        expected += 1;
    }
    consumer.destroy()?;
    Ok(())
}

#[test]
fn child_process_reads_in_order() -> Result<(), Box<dyn Error>> {
    let (_dir, path) = unique_identifier();
    let mut producer = ShmQueue::open_or_create(&path, CHILD_CAPACITY, Role::Producer)?;
    let mut child = Command::new(env::current_exe()?)
        .args(&[CHILD_TEST, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_IDENTIFIER, &path)
        .spawn()?;

    let deadline = Instant::now() + Duration::from_secs(60);
    for id in 0..CHILD_MESSAGES {
        let bytes = SequencedMessage::new(id).to_bytes();
        loop {
            match producer.put(&bytes) {
                Ok(_) => break,
                Err(e) if e.is_queue_full() => {
                    if Instant::now() >= deadline || child.try_wait()?.is_some() {
                        let _ = child.kill();
                        producer.destroy()?;
                        panic!("consumer process stopped reading at message {}", id);
                    }
                    thread::yield_now();
                }
                Err(e) => {
                    let _ = child.kill();
                    return Err(e.into());
                }
            }
        }
    }

    let status = child.wait()?;
    assert!(status.success(), "consumer process failed: {}", status);
    assert!(producer.empty()?);
    producer.destroy()?;
    assert!(!path.exists());
    Ok(())
}
