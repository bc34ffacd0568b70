// Copyright 2025 the rheo authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use futures::StreamExt;
use rheo_core::RheoError;
use rheo_stream::{from_iter, from_values, PublisherExt, ReplayProcessor};
use rheo_test_utils::TestPublisher;

#[tokio::test]
async fn yields_every_value_in_order() -> anyhow::Result<()> {
    let stream = from_values((1..=50).collect::<Vec<_>>()).into_stream(8);

    let values: Vec<i32> = stream.map(|item| item.unwrap()).collect().await;
    assert_eq!(values, (1..=50).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn replenishes_in_prefetch_batches() -> anyhow::Result<()> {
    // More values than the prefetch window forces mid-stream replenishment.
    let stream = from_values((1..=1000).collect::<Vec<_>>()).into_stream(16);

    let values: Vec<i32> = stream.map(|item| item.unwrap()).collect().await;
    assert_eq!(values.len(), 1000);
    Ok(())
}

#[tokio::test]
async fn surfaces_the_terminal_error() -> anyhow::Result<()> {
    let source = from_iter(|| {
        vec![Ok(1), Ok(2), Err(RheoError::failed("boom"))]
    });
    let mut stream = source.into_stream(4);

    assert_eq!(stream.next().await.transpose().unwrap(), Some(1));
    assert_eq!(stream.next().await.transpose().unwrap(), Some(2));
    let failure = stream.next().await;
    assert!(matches!(failure, Some(Err(_))));
    assert!(stream.next().await.is_none());
    Ok(())
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_subscription() -> anyhow::Result<()> {
    let upstream = TestPublisher::<i32>::new();
    let stream = upstream.clone().into_stream(4);
    assert_eq!(upstream.requests(), vec![4]);

    drop(stream);
    assert!(upstream.is_cancelled());
    Ok(())
}

#[tokio::test]
async fn bridges_a_hot_replay_processor() -> anyhow::Result<()> {
    let replay = ReplayProcessor::unbounded();
    replay.next(1);
    replay.next(2);

    let mut stream = replay.clone().into_stream(8);
    assert_eq!(stream.next().await.transpose().unwrap(), Some(1));
    assert_eq!(stream.next().await.transpose().unwrap(), Some(2));

    replay.next(3);
    replay.complete();
    assert_eq!(stream.next().await.transpose().unwrap(), Some(3));
    assert!(stream.next().await.is_none());
    Ok(())
}
