#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use pushwire_gateway::server::WriteDeadline;

#[tokio::test]
async fn stalled_write_fails_with_timed_out() {
    // 64-byte pipe and nobody reading the other end
    let (near, _far) = tokio::io::duplex(64);
    let mut io = WriteDeadline::new(near, Duration::from_millis(100));

    let res = tokio::time::timeout(Duration::from_secs(2), io.write_all(&[0u8; 4096]))
        .await
        .expect("write must fail rather than hang");
    assert_eq!(res.unwrap_err().kind(), io::ErrorKind::TimedOut);
}

#[tokio::test]
async fn slow_reader_making_progress_is_not_cut_off() {
    let (near, mut far) = tokio::io::duplex(64);
    let mut io = WriteDeadline::new(near, Duration::from_millis(200));

    let reader = tokio::spawn(async move {
        let mut got = Vec::new();
        let mut buf = [0u8; 32];
        loop {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let n = far.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }
        got
    });

    // each stall is ~20ms, well inside the deadline, though the whole write
    // takes longer than it
    io.write_all(&[7u8; 1024]).await.unwrap();
    io.shutdown().await.unwrap();
    drop(io);

    let got = reader.await.unwrap();
    assert_eq!(got.len(), 1024);
    assert!(got.iter().all(|b| *b == 7));
}
