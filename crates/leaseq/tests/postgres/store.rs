//! Queue engine tests against PgStore.

use std::collections::HashSet;
use std::time::Duration;

use leaseq::{DeadLetterQuery, MessageId, PgStore, Queue, QueueConfig};
use test_utils::db_test;

use crate::support::{init_test_tracing, test_queue};

db_test!(round_trip_preserves_body, |pool| {
    let queue = test_queue(pool, "round-trip")?;
    let body: Vec<u8> = vec![0, 159, 146, 150, b'o', b'k'];

    let id = queue.send(&body, Duration::ZERO).await?;
    let message = queue.receive().await?.expect("message should be visible");

    assert_eq!(message.id, id);
    assert_eq!(message.body, body);
    assert_eq!(message.received_count, 1);
    Ok(())
});

db_test!(send_receive_extend_receive_scenario, |pool| {
    init_test_tracing();
    let queue = test_queue(pool, "scenario")?;

    let id = queue.send("A", Duration::ZERO).await?;
    let first = queue.receive().await?.expect("A should be visible");
    assert_eq!(first.received_count, 1);

    queue.extend(&id, Duration::from_secs(1)).await?;
    assert!(queue.receive().await?.is_none());

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let second = queue.receive().await?.expect("A should be visible again");
    assert_eq!(second.id, id);
    assert_eq!(second.body, b"A");
    assert_eq!(second.received_count, 2);
    Ok(())
});

db_test!(delete_is_permanent, |pool| {
    let queue = test_queue(pool, "delete")?;

    let id = queue.send("gone", Duration::ZERO).await?;
    queue.receive().await?.expect("claim");
    queue.delete(&id).await?;

    assert!(queue.receive().await?.is_none());
    assert!(queue.extend(&id, Duration::from_secs(1)).await.unwrap_err().is_not_found());
    queue.delete(&id).await?;
    Ok(())
});

db_test!(concurrent_receivers_never_share_a_message, |pool| {
    let queue = test_queue(pool, "contended")?;
    let total = 50;

    for i in 0..total {
        queue.send(format!("msg-{i}"), Duration::ZERO).await?;
    }

    let mut tasks = Vec::new();
    for _ in 0..5 {
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(message) = queue.receive().await? {
                claimed.push(message.id);
            }
            Ok::<_, leaseq::Error>(claimed)
        }));
    }

    let mut all = Vec::new();
    for task in tasks {
        all.extend(task.await??);
    }
    let unique: HashSet<_> = all.iter().cloned().collect();

    assert_eq!(all.len(), total);
    assert_eq!(unique.len(), total);
    Ok(())
});

db_test!(dead_letters_and_redrive, |pool| {
    let config = QueueConfig {
        visibility_timeout: Duration::from_millis(200),
        max_receive_count: Some(1),
        ..QueueConfig::named("dead")
    };
    let queue = Queue::new(PgStore::new(pool.clone()), config)?;

    let exhausted = queue.send("flaky", Duration::ZERO).await?;
    let buried = queue.send("poison", Duration::ZERO).await?;

    queue.receive().await?.expect("claim exhausted");
    assert!(queue.dead_letter(&buried, "cannot parse").await?);
    assert!(!queue.dead_letter(&MessageId::new("missing"), "nope").await?);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(queue.receive().await?.is_none());

    assert_eq!(queue.count_dead_letters(DeadLetterQuery::new()).await?, 2);
    let only_buried = queue
        .fetch_dead_letters(DeadLetterQuery::new().buried_only())
        .await?;
    assert_eq!(only_buried.len(), 1);
    assert_eq!(only_buried[0].id, buried);
    assert_eq!(only_buried[0].last_error.as_deref(), Some("cannot parse"));

    assert!(queue.redrive(&exhausted).await?);
    let redriven = queue.receive().await?.expect("redriven message");
    assert_eq!(redriven.id, exhausted);
    assert_eq!(redriven.received_count, 1);
    Ok(())
});

db_test!(migrate_is_idempotent, |pool| {
    PgStore::new(pool.clone()).migrate().await?;
    Ok(())
});
